use crate::shared::{ErrorType, NetworkError, NetworkResult, SizedWrite};
use crate::NUM_RESERVED_PORTS;
use ballast::session::PublicKey;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Read;

/// Control packet ids. The first plaintext byte of every record; ids at or above
/// `NUM_RESERVED_PORTS` address routed connections instead.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Kind {
    RouteRequest = 0,
    RouteResponse = 1,
    ConnectNotification = 2,
    DisconnectNotification = 3,
    PingRequest = 4,
    PongResponse = 5,
    OnionRequest = 8,
    OnionResponse = 9,
}

impl From<Kind> for u8 {
    #[inline]
    fn from(kind: Kind) -> Self {
        kind as u8
    }
}

/// Packets the relay sends to the client. Payload-bearing variants borrow from the
/// decrypted record.
#[derive(Debug, Eq, PartialEq)]
pub enum Frame<'a> {
    RouteResponse {
        connection_id: u8,
        public_key: PublicKey,
    },
    ConnectNotification(u8),
    DisconnectNotification(u8),
    Ping(u64),
    Pong(u64),
    OnionResponse(&'a [u8]),
    Data {
        connection_id: u8,
        payload: &'a [u8],
    },
}

impl<'a> Frame<'a> {
    /// Parses a decrypted record. Ids the relay must not send (the client-to-server ids
    /// and the reserved band) and bodies of the wrong size are fatal.
    pub fn read(buffer: &'a [u8]) -> NetworkResult<Frame<'a>> {
        if buffer.is_empty() {
            return Err(NetworkError::Fatal(ErrorType::EmptyPayload));
        }

        let kind = buffer[0];
        let mut body = &buffer[1..];

        if kind >= NUM_RESERVED_PORTS {
            return Ok(Frame::Data {
                connection_id: kind - NUM_RESERVED_PORTS,
                payload: body,
            });
        }

        Ok(match kind {
            1 => {
                if body.len() != 1 + PublicKey::SIZE {
                    return Err(NetworkError::Fatal(ErrorType::Malformed));
                }

                let connection_id = body.read_u8()?;
                let mut public_key = [0u8; PublicKey::SIZE];
                body.read_exact(&mut public_key)?;

                Frame::RouteResponse {
                    connection_id,
                    public_key: PublicKey::new(public_key),
                }
            }
            2 => {
                if body.len() != 1 {
                    return Err(NetworkError::Fatal(ErrorType::Malformed));
                }

                Frame::ConnectNotification(body.read_u8()?)
            }
            3 => {
                if body.len() != 1 {
                    return Err(NetworkError::Fatal(ErrorType::Malformed));
                }

                Frame::DisconnectNotification(body.read_u8()?)
            }
            4 => {
                if body.len() != 8 {
                    return Err(NetworkError::Fatal(ErrorType::Malformed));
                }

                Frame::Ping(body.read_u64::<BigEndian>()?)
            }
            5 => {
                if body.len() != 8 {
                    return Err(NetworkError::Fatal(ErrorType::Malformed));
                }

                Frame::Pong(body.read_u64::<BigEndian>()?)
            }
            9 => Frame::OnionResponse(body),
            _ => return Err(NetworkError::Fatal(ErrorType::Malformed)),
        })
    }
}

/// Packets the client sends to the relay.
#[derive(Debug)]
pub enum Command<'a> {
    RouteRequest(&'a PublicKey),
    DisconnectNotification(u8),
    Ping(u64),
    Pong(u64),
    OnionRequest(&'a [u8]),
    Data { connection_id: u8, payload: &'a [u8] },
}

impl<'a> Command<'a> {
    #[inline]
    pub fn kind_byte(&self) -> u8 {
        match self {
            Command::RouteRequest(_) => Kind::RouteRequest.into(),
            Command::DisconnectNotification(_) => Kind::DisconnectNotification.into(),
            Command::Ping(_) => Kind::PingRequest.into(),
            Command::Pong(_) => Kind::PongResponse.into(),
            Command::OnionRequest(_) => Kind::OnionRequest.into(),
            Command::Data { connection_id, .. } => NUM_RESERVED_PORTS + connection_id,
        }
    }

    /// Serializes the command into the stream. A body that cannot fit the remaining
    /// capacity means the payload exceeds what a single record can carry.
    pub fn write<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < self.size() {
            return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
        }

        stream.write_u8(self.kind_byte())?;

        match self {
            Command::RouteRequest(public_key) => stream.write_all(&public_key[..])?,
            Command::DisconnectNotification(connection_id) => stream.write_u8(*connection_id)?,
            Command::Ping(ping_id) => stream.write_u64::<BigEndian>(*ping_id)?,
            Command::Pong(ping_id) => stream.write_u64::<BigEndian>(*ping_id)?,
            Command::OnionRequest(payload) => stream.write_all(payload)?,
            Command::Data { payload, .. } => stream.write_all(payload)?,
        }

        Ok(())
    }

    /// Total serialized size, kind byte included.
    #[inline]
    pub fn size(&self) -> usize {
        1 + match self {
            Command::RouteRequest(_) => PublicKey::SIZE,
            Command::DisconnectNotification(_) => 1,
            Command::Ping(_) | Command::Pong(_) => 8,
            Command::OnionRequest(payload) => payload.len(),
            Command::Data { payload, .. } => payload.len(),
        }
    }
}
