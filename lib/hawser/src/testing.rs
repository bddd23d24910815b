//! Scripted in-memory stream standing in for the non-blocking relay socket in tests, plus
//! a minimal relay-side counterpart for completing handshakes and framing records.

use crate::handshake::{CLIENT_HANDSHAKE_SIZE, SERVER_HANDSHAKE_SIZE};
use crate::{LENGTH_SIZE, MAX_FRAME_SIZE};
use ballast::crypto;
use ballast::session::SecretKey;
use byteorder::{BigEndian, ByteOrder};
use std::cmp::min;
use std::io;
use std::mem;

/// Mock stream with tunable read/write chunk sizes. Reads past the fed data and writes past
/// the accepted capacity behave like a non-blocking socket and return `WouldBlock`.
pub struct MockStream {
    pub incoming: Vec<u8>,
    pub cursor: usize,
    pub outgoing: Vec<u8>,
    pub read_chunk: usize,
    pub write_chunk: usize,
    pub write_capacity: usize,
    pub closed: bool,
}

impl MockStream {
    pub fn new() -> MockStream {
        MockStream {
            incoming: Vec::new(),
            cursor: 0,
            outgoing: Vec::new(),
            read_chunk: usize::max_value(),
            write_chunk: usize::max_value(),
            write_capacity: usize::max_value(),
            closed: false,
        }
    }

    /// Queues bytes for the engine to read.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.incoming.extend_from_slice(bytes);
    }

    /// Takes everything the engine has written so far.
    pub fn take_outgoing(&mut self) -> Vec<u8> {
        mem::replace(&mut self.outgoing, Vec::new())
    }
}

impl io::Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cursor == self.incoming.len() {
            if self.closed {
                return Ok(0);
            }

            return Err(io::ErrorKind::WouldBlock.into());
        }

        let count = min(
            min(self.read_chunk, buf.len()),
            self.incoming.len() - self.cursor,
        );
        buf[..count].copy_from_slice(&self.incoming[self.cursor..self.cursor + count]);
        self.cursor += count;

        Ok(count)
    }
}

impl io::Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.outgoing.len() >= self.write_capacity {
            return Err(io::ErrorKind::WouldBlock.into());
        }

        let count = min(
            min(self.write_chunk, buf.len()),
            self.write_capacity - self.outgoing.len(),
        );
        self.outgoing.extend(&buf[..count]);

        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The relay's half of the key exchange, reconstructed from the client's opening packet.
pub struct RelayHandshake {
    pub session_key: [u8; crypto::SHARED_KEY_SIZE],
    pub base_nonce: [u8; crypto::NONCE_SIZE],
    pub client_base_nonce: [u8; crypto::NONCE_SIZE],
    pub reply: [u8; SERVER_HANDSHAKE_SIZE],
}

impl RelayHandshake {
    /// Encrypts a record toward the client, advancing the relay's send nonce.
    pub fn encrypt_record(&mut self, plain: &[u8]) -> Vec<u8> {
        let mut record = vec![0u8; LENGTH_SIZE + plain.len() + crypto::MAC_SIZE];
        BigEndian::write_u16(
            &mut record[..LENGTH_SIZE],
            (plain.len() + crypto::MAC_SIZE) as u16,
        );

        assert!(crypto::encrypt(
            &mut record[LENGTH_SIZE..],
            plain,
            &self.base_nonce,
            &self.session_key
        ));
        crypto::increment_nonce(&mut self.base_nonce);

        record
    }

    /// Decrypts the record at the head of the raw bytes the client sent, advancing the
    /// relay's receive nonce. Returns the plaintext and the total record size consumed.
    pub fn decrypt_record(&mut self, raw: &[u8]) -> (Vec<u8>, usize) {
        let length = BigEndian::read_u16(&raw[..LENGTH_SIZE]) as usize;
        assert!(length > crypto::MAC_SIZE && length <= MAX_FRAME_SIZE);

        let mut plain = vec![0u8; length - crypto::MAC_SIZE];
        assert!(crypto::decrypt(
            &mut plain,
            &raw[LENGTH_SIZE..LENGTH_SIZE + length],
            &self.client_base_nonce,
            &self.session_key
        ));
        crypto::increment_nonce(&mut self.client_base_nonce);

        (plain, LENGTH_SIZE + length)
    }
}

/// Performs the relay side of the handshake: validates the client packet and produces the
/// reply along with the agreed session material.
pub fn accept_handshake(packet: &[u8], relay_secret_key: &SecretKey) -> Option<RelayHandshake> {
    const PLAIN_SIZE: usize = crypto::PUBLIC_KEY_SIZE + crypto::NONCE_SIZE;

    assert_eq!(packet.len(), CLIENT_HANDSHAKE_SIZE);

    let mut client_public = [0u8; crypto::PUBLIC_KEY_SIZE];
    client_public.copy_from_slice(&packet[..crypto::PUBLIC_KEY_SIZE]);

    let mut handshake_nonce = [0u8; crypto::NONCE_SIZE];
    handshake_nonce.copy_from_slice(
        &packet[crypto::PUBLIC_KEY_SIZE..crypto::PUBLIC_KEY_SIZE + crypto::NONCE_SIZE],
    );

    let mut shared_key = [0u8; crypto::SHARED_KEY_SIZE];
    assert!(crypto::precompute(
        &mut shared_key,
        &client_public,
        relay_secret_key
    ));

    let mut plain = [0u8; PLAIN_SIZE];

    if !crypto::decrypt(
        &mut plain,
        &packet[crypto::PUBLIC_KEY_SIZE + crypto::NONCE_SIZE..],
        &handshake_nonce,
        &shared_key,
    ) {
        return None;
    }

    let mut client_temp_public = [0u8; crypto::PUBLIC_KEY_SIZE];
    client_temp_public.copy_from_slice(&plain[..crypto::PUBLIC_KEY_SIZE]);

    let mut client_base_nonce = [0u8; crypto::NONCE_SIZE];
    client_base_nonce.copy_from_slice(&plain[crypto::PUBLIC_KEY_SIZE..]);

    let mut temp_public = [0u8; crypto::PUBLIC_KEY_SIZE];
    let mut temp_secret = [0u8; crypto::SECRET_KEY_SIZE];
    crypto::keypair(&mut temp_public, &mut temp_secret);

    let mut session_key = [0u8; crypto::SHARED_KEY_SIZE];
    assert!(crypto::precompute(
        &mut session_key,
        &client_temp_public,
        &temp_secret
    ));

    let mut base_nonce = [0u8; crypto::NONCE_SIZE];
    crypto::random_bytes(&mut base_nonce);

    let mut reply_plain = [0u8; PLAIN_SIZE];
    reply_plain[..crypto::PUBLIC_KEY_SIZE].copy_from_slice(&temp_public);
    reply_plain[crypto::PUBLIC_KEY_SIZE..].copy_from_slice(&base_nonce);

    let mut reply_nonce = [0u8; crypto::NONCE_SIZE];
    crypto::random_bytes(&mut reply_nonce);

    let mut reply = [0u8; SERVER_HANDSHAKE_SIZE];
    reply[..crypto::NONCE_SIZE].copy_from_slice(&reply_nonce);
    assert!(crypto::encrypt(
        &mut reply[crypto::NONCE_SIZE..],
        &reply_plain,
        &reply_nonce,
        &shared_key
    ));

    Some(RelayHandshake {
        session_key,
        base_nonce,
        client_base_nonce,
        reply,
    })
}
