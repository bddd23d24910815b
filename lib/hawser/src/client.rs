use crate::channel::Channel;
use crate::config::Config;
use crate::frame::{Command, Frame};
use crate::handshake::{Handshake, SERVER_HANDSHAKE_SIZE};
use crate::shared::{ErrorType, ErrorUtils, NetworkError, NetworkResult};
use crate::socket;
use crate::MAX_PLAIN_SIZE;
use ballast::crypto;
use ballast::logging;
use ballast::session::{PublicKey, SecretKey};
use mio::net::TcpStream;
use std::io::{Cursor, Read, Write};
use std::net::SocketAddr;
use std::time::Instant;

/// Lifecycle of a relay session. `Disconnected` is terminal; the owner observes it through
/// `status` and drops the engine.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Status {
    Connecting,
    Unconfirmed,
    Confirmed,
    Disconnected,
}

/// Relay-to-client happenings the owner drains after each tick.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Event {
    RouteResponse {
        connection_id: u8,
        public_key: PublicKey,
    },
    ConnectNotification(u8),
    DisconnectNotification(u8),
    Data {
        connection_id: u8,
        payload: Vec<u8>,
    },
}

/// Client engine of one encrypted relay session.
///
/// The engine is driven exclusively by the owner's periodic [`tick`](Client::tick); it
/// never blocks and never spawns. All socket I/O is non-blocking, with "not yet" surfacing
/// as [`NetworkError::Wait`] and silently retried on a later tick. The opening handshake
/// packet is parked in the send slot at construction; draining it doubles as detecting
/// that the TCP connect completed.
pub struct Client<S = TcpStream> {
    status: Status,
    channel: Channel<S>,
    handshake: Option<Handshake>,
    config: Config,
    last_pinged: Instant,
    ping_id: u64,
    kill_at: Instant,
    onion_handler: Option<Box<dyn FnMut(&[u8])>>,
    events: Vec<Event>,
    log: logging::Logger,
}

impl Client<TcpStream> {
    /// Opens a non-blocking connection toward the relay at `address` (`<ip>:<port>`) and
    /// prepares the handshake. The engine makes no progress until ticked.
    pub fn connect<'a, L: Into<Option<&'a logging::Logger>>>(
        address: &str,
        relay_public_key: &PublicKey,
        self_public_key: &PublicKey,
        self_secret_key: &SecretKey,
        config: Config,
        now: Instant,
        log: L,
    ) -> NetworkResult<Client<TcpStream>> {
        let stream = socket::connect(&address.parse::<SocketAddr>()?)?;

        Client::new(
            stream,
            relay_public_key,
            self_public_key,
            self_secret_key,
            config,
            now,
            log,
        )
    }

    /// Registers the session's socket on the supplied poll.
    #[inline]
    pub fn register(&self, token: mio::Token, poll: &mio::Poll) -> NetworkResult<()> {
        poll.register(
            &self.channel.stream,
            token,
            mio::Ready::readable() | mio::Ready::writable(),
            mio::PollOpt::edge(),
        )
        .map_err(Into::into)
    }

    /// Deregisters the session's socket from the supplied poll.
    #[inline]
    pub fn deregister(&self, poll: &mio::Poll) -> NetworkResult<()> {
        poll.deregister(&self.channel.stream).map_err(Into::into)
    }
}

impl<S: Read + Write> Client<S> {
    /// Builds an engine over an already opened stream. The handshake packet is generated
    /// here and parked for the first ticks to push out.
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(
        stream: S,
        relay_public_key: &PublicKey,
        self_public_key: &PublicKey,
        self_secret_key: &SecretKey,
        config: Config,
        now: Instant,
        log: L,
    ) -> NetworkResult<Client<S>> {
        let log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        let (handshake, packet, send_base_nonce) =
            Handshake::initiate(self_public_key, self_secret_key, relay_public_key)?;

        let mut channel = Channel::new(stream, send_base_nonce);
        channel.stash_raw(&packet);

        Ok(Client {
            status: Status::Connecting,
            channel,
            handshake: Some(handshake),
            config,
            last_pinged: now,
            ping_id: 0,
            kill_at: now + config.connection_timeout(),
            onion_handler: None,
            events: Vec::new(),
            log,
        })
    }

    /// Current lifecycle state.
    #[inline]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Installs the handler invoked with the payload of every onion response.
    #[inline]
    pub fn set_onion_handler<F: FnMut(&[u8]) + 'static>(&mut self, handler: F) {
        self.onion_handler = Some(Box::new(handler));
    }

    /// Drains the events accumulated since the last tick.
    #[inline]
    pub fn events(&mut self) -> impl Iterator<Item = Event> + '_ {
        self.events.drain(..)
    }

    /// Asks the relay to route packets between this session and the peer owning
    /// `public_key`.
    #[inline]
    pub fn send_route_request(&mut self, public_key: &PublicKey) -> NetworkResult<()> {
        self.send_checked(Command::RouteRequest(public_key))
    }

    /// Tunnels an opaque onion packet through the relay.
    #[inline]
    pub fn send_onion_request(&mut self, data: &[u8]) -> NetworkResult<()> {
        self.send_checked(Command::OnionRequest(data))
    }

    /// Tells the relay a routed connection is no longer wanted.
    #[inline]
    pub fn send_disconnect_notification(&mut self, connection_id: u8) -> NetworkResult<()> {
        self.send_checked(Command::DisconnectNotification(connection_id))
    }

    /// Sends a routed user packet on an established connection id.
    #[inline]
    pub fn send_data(&mut self, connection_id: u8, payload: &[u8]) -> NetworkResult<()> {
        self.send_checked(Command::Data {
            connection_id,
            payload,
        })
    }

    /// Drives the session: drains pending output, advances the handshake, runs the
    /// liveness timers and dispatches every record the relay delivered.
    pub fn tick(&mut self, now: Instant) {
        if self.status == Status::Disconnected {
            return;
        }

        if self.status == Status::Connecting {
            match self.channel.flush_pending() {
                Ok(true) => {
                    logging::debug!(self.log, "handshake pushed, awaiting relay reply";
                                    "context" => "tick");
                    self.status = Status::Unconfirmed;
                }
                Ok(false) => (),
                Err(_) => self.kill(),
            }
        }

        if self.status == Status::Unconfirmed {
            self.do_unconfirmed(now);
        }

        if self.status == Status::Confirmed {
            self.do_confirmed(now);
        }

        if self.status != Status::Disconnected && now >= self.kill_at {
            logging::debug!(self.log, "connection deadline reached"; "context" => "tick");
            self.kill();
        }
    }

    fn do_unconfirmed(&mut self, now: Instant) {
        let result = match self.channel.read_raw(SERVER_HANDSHAKE_SIZE) {
            Ok(Some(reply)) => {
                let handshake = self
                    .handshake
                    .take()
                    .expect("Handshake state must be present while unconfirmed");
                handshake.finalize(reply)
            }
            Ok(None) => return,
            Err(_) => {
                self.kill();
                return;
            }
        };

        match result {
            Ok(session) => {
                self.channel.consume_raw();
                self.channel.confirm(session);
                self.status = Status::Confirmed;
                self.kill_at = now + self.config.connection_timeout();

                logging::debug!(self.log, "relay session confirmed"; "context" => "handshake");
            }
            Err(_) => {
                logging::debug!(self.log, "relay reply rejected"; "context" => "handshake");

                // Immediate reap; there is nothing left to wait for.
                self.kill_at = now;
                self.kill();
            }
        }
    }

    fn do_confirmed(&mut self, now: Instant) {
        if self.channel.flush_pending().has_failed() {
            self.kill();
            return;
        }

        if self.ping_id == 0
            && now.duration_since(self.last_pinged) >= self.config.ping_frequency()
        {
            let mut ping_id = crypto::random_u64();

            if ping_id == 0 {
                ping_id = 1;
            }

            match self.send_command(Command::Ping(ping_id)) {
                Ok(()) => {
                    logging::trace!(self.log, "ping sent"; "context" => "tick", "ping_id" => ping_id);
                    self.last_pinged = now;
                    self.ping_id = ping_id;
                }
                Err(NetworkError::Wait) => (),
                Err(_) => {
                    self.kill();
                    return;
                }
            }
        }

        if self.ping_id != 0 && now.duration_since(self.last_pinged) >= self.config.ping_timeout()
        {
            logging::debug!(self.log, "ping timed out"; "context" => "tick", "ping_id" => self.ping_id);
            self.kill();
            return;
        }

        let mut plain = [0u8; MAX_PLAIN_SIZE];

        loop {
            let size = match self.channel.read_frame(&mut plain) {
                Ok(size) => size,
                Err(NetworkError::Wait) => break,
                Err(_) => {
                    self.kill();
                    return;
                }
            };

            // A live record stream keeps pushing the deadline out.
            self.kill_at = now + self.config.connection_timeout();

            if self.handle_frame(&plain[..size]).has_failed() {
                self.kill();
                return;
            }
        }
    }

    fn handle_frame(&mut self, plain: &[u8]) -> NetworkResult<()> {
        match Frame::read(plain)? {
            Frame::Ping(ping_id) => {
                // A pong that cannot go out right now is dropped; the relay pings again.
                match self.send_command(Command::Pong(ping_id)) {
                    Err(err @ NetworkError::Fatal(_)) => Err(err),
                    _ => Ok(()),
                }
            }
            Frame::Pong(ping_id) => {
                if ping_id != 0 && ping_id == self.ping_id {
                    self.ping_id = 0;
                    Ok(())
                } else {
                    Err(NetworkError::Fatal(ErrorType::PingIdMismatch))
                }
            }
            Frame::OnionResponse(payload) => {
                if let Some(handler) = self.onion_handler.as_mut() {
                    handler(payload);
                }

                Ok(())
            }
            Frame::RouteResponse {
                connection_id,
                public_key,
            } => {
                self.events.push(Event::RouteResponse {
                    connection_id,
                    public_key,
                });

                Ok(())
            }
            Frame::ConnectNotification(connection_id) => {
                self.events.push(Event::ConnectNotification(connection_id));

                Ok(())
            }
            Frame::DisconnectNotification(connection_id) => {
                self.events
                    .push(Event::DisconnectNotification(connection_id));

                Ok(())
            }
            Frame::Data {
                connection_id,
                payload,
            } => {
                self.events.push(Event::Data {
                    connection_id,
                    payload: payload.to_vec(),
                });

                Ok(())
            }
        }
    }

    /// Serializes and commits a command, collapsing the engine on fatal errors.
    fn send_command(&mut self, command: Command) -> NetworkResult<()> {
        let mut scratch = [0u8; MAX_PLAIN_SIZE];
        let size = {
            let mut cursor = Cursor::new(&mut scratch[..]);
            command.write(&mut cursor)?;
            cursor.position() as usize
        };

        match self.channel.write_frame(&scratch[..size]) {
            Err(err @ NetworkError::Fatal(_)) => {
                self.kill();
                Err(err)
            }
            result => result,
        }
    }

    fn send_checked(&mut self, command: Command) -> NetworkResult<()> {
        match self.status {
            Status::Confirmed => self.send_command(command),
            Status::Disconnected => Err(NetworkError::Fatal(ErrorType::Closed)),
            _ => Err(NetworkError::Wait),
        }
    }

    fn kill(&mut self) {
        if self.status != Status::Disconnected {
            logging::debug!(self.log, "relay session terminated"; "context" => "kill");
            self.status = Status::Disconnected;
        }
    }
}
