//! Opening key exchange of a relay session. The client sends its long term public key, a
//! handshake nonce and a box holding a fresh ephemeral public key plus the base nonce that
//! seeds its half of the record stream. The relay answers in kind; both sides then derive
//! the forward-secret session key from the ephemeral pair and discard the ephemerals.

use crate::shared::{ErrorType, NetworkError, NetworkResult};
use ballast::crypto;
use ballast::session::{PublicKey, SecretKey};

/// Boxed payload carried by either handshake packet: ephemeral public key + base nonce.
const PLAIN_SIZE: usize = crypto::PUBLIC_KEY_SIZE + crypto::NONCE_SIZE;

/// Size of the packet the client opens with.
pub const CLIENT_HANDSHAKE_SIZE: usize =
    crypto::PUBLIC_KEY_SIZE + crypto::NONCE_SIZE + PLAIN_SIZE + crypto::MAC_SIZE;
/// Size of the relay's reply.
pub const SERVER_HANDSHAKE_SIZE: usize = crypto::NONCE_SIZE + PLAIN_SIZE + crypto::MAC_SIZE;

/// In-flight handshake state. Holds the long term shared key and the ephemeral secret until
/// the relay replies; both are scrubbed on drop whether or not the handshake completes.
pub struct Handshake {
    shared_key: [u8; crypto::SHARED_KEY_SIZE],
    temp_secret: [u8; crypto::SECRET_KEY_SIZE],
}

/// Material a validated relay reply yields. Scrubbed on drop; the channel copies it out
/// when the session is confirmed.
#[derive(Debug)]
pub struct Session {
    pub session_key: [u8; crypto::SHARED_KEY_SIZE],
    pub recv_nonce: [u8; crypto::NONCE_SIZE],
}

impl Drop for Session {
    fn drop(&mut self) {
        crypto::memzero(&mut self.session_key);
        crypto::memzero(&mut self.recv_nonce);
    }
}

impl Handshake {
    /// Builds the opening packet. Returns the handshake state, the packet to put on the
    /// wire and the freshly generated base nonce seeding the outgoing record stream.
    pub fn initiate(
        self_public_key: &PublicKey,
        self_secret_key: &SecretKey,
        relay_public_key: &PublicKey,
    ) -> NetworkResult<(
        Handshake,
        [u8; CLIENT_HANDSHAKE_SIZE],
        [u8; crypto::NONCE_SIZE],
    )> {
        let mut shared_key = [0u8; crypto::SHARED_KEY_SIZE];

        if !crypto::precompute(&mut shared_key, relay_public_key, self_secret_key) {
            return Err(NetworkError::Fatal(ErrorType::Crypto));
        }

        let mut temp_public = [0u8; crypto::PUBLIC_KEY_SIZE];
        let mut temp_secret = [0u8; crypto::SECRET_KEY_SIZE];
        crypto::keypair(&mut temp_public, &mut temp_secret);

        let state = Handshake {
            shared_key,
            temp_secret,
        };

        let mut base_nonce = [0u8; crypto::NONCE_SIZE];
        crypto::random_bytes(&mut base_nonce);

        let mut plain = [0u8; PLAIN_SIZE];
        plain[..crypto::PUBLIC_KEY_SIZE].copy_from_slice(&temp_public);
        plain[crypto::PUBLIC_KEY_SIZE..].copy_from_slice(&base_nonce);

        let mut handshake_nonce = [0u8; crypto::NONCE_SIZE];
        crypto::random_bytes(&mut handshake_nonce);

        let mut packet = [0u8; CLIENT_HANDSHAKE_SIZE];
        packet[..crypto::PUBLIC_KEY_SIZE].copy_from_slice(&**self_public_key);
        packet[crypto::PUBLIC_KEY_SIZE..crypto::PUBLIC_KEY_SIZE + crypto::NONCE_SIZE]
            .copy_from_slice(&handshake_nonce);

        if !crypto::encrypt(
            &mut packet[crypto::PUBLIC_KEY_SIZE + crypto::NONCE_SIZE..],
            &plain,
            &handshake_nonce,
            &state.shared_key,
        ) {
            return Err(NetworkError::Fatal(ErrorType::Crypto));
        }

        Ok((state, packet, base_nonce))
    }

    /// Validates the relay's reply and derives the session material. The reply must be
    /// exactly `SERVER_HANDSHAKE_SIZE` bytes; a size or MAC failure rejects the handshake.
    pub fn finalize(self, reply: &[u8]) -> NetworkResult<Session> {
        if reply.len() != SERVER_HANDSHAKE_SIZE {
            return Err(NetworkError::Fatal(ErrorType::Crypto));
        }

        let mut nonce = [0u8; crypto::NONCE_SIZE];
        nonce.copy_from_slice(&reply[..crypto::NONCE_SIZE]);

        let mut plain = [0u8; PLAIN_SIZE];

        if !crypto::decrypt(
            &mut plain,
            &reply[crypto::NONCE_SIZE..],
            &nonce,
            &self.shared_key,
        ) {
            return Err(NetworkError::Fatal(ErrorType::Crypto));
        }

        let mut server_temp_public = [0u8; crypto::PUBLIC_KEY_SIZE];
        server_temp_public.copy_from_slice(&plain[..crypto::PUBLIC_KEY_SIZE]);

        let mut session = Session {
            session_key: [0u8; crypto::SHARED_KEY_SIZE],
            recv_nonce: [0u8; crypto::NONCE_SIZE],
        };
        session
            .recv_nonce
            .copy_from_slice(&plain[crypto::PUBLIC_KEY_SIZE..]);

        if !crypto::precompute(&mut session.session_key, &server_temp_public, &self.temp_secret) {
            return Err(NetworkError::Fatal(ErrorType::Crypto));
        }

        Ok(session)
    }
}

impl Drop for Handshake {
    fn drop(&mut self) {
        crypto::memzero(&mut self.temp_secret);
        crypto::memzero(&mut self.shared_key);
    }
}
