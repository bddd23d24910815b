use crate::buffer::{RecvSlot, SendSlot};
use crate::handshake::Session;
use crate::shared::{ErrorType, NetworkError, NetworkResult};
use crate::{LENGTH_SIZE, MAX_FRAME_SIZE, MAX_PACKET_SIZE, MAX_PLAIN_SIZE};
use ballast::crypto;
use byteorder::{BigEndian, ByteOrder};
use std::io::{Read, Write};

/// Framed cipher stream of one relay session. Owns the stream, the session key and both
/// counter nonces. Until the session is confirmed the key slot holds random bytes and the
/// stream only carries the raw handshake packets.
///
/// Records on the wire are `[ length_be (2) ][ ciphertext (length) ]` where the ciphertext
/// is the boxed payload plus its 16 byte MAC. The send nonce advances exactly once per
/// record committed to the cipher stream, even when the bytes are still parked in the send
/// slot; the receive nonce advances exactly once per record surfaced to the caller.
pub struct Channel<S> {
    pub(crate) stream: S,
    pub(crate) shared_key: [u8; crypto::SHARED_KEY_SIZE],
    pub(crate) send_nonce: [u8; crypto::NONCE_SIZE],
    pub(crate) recv_nonce: [u8; crypto::NONCE_SIZE],
    pub(crate) send_slot: SendSlot,
    pub(crate) recv_slot: RecvSlot,
    pub(crate) next_frame_length: usize,
}

impl<S> Channel<S> {
    pub fn new(stream: S, send_base_nonce: [u8; crypto::NONCE_SIZE]) -> Channel<S> {
        let mut shared_key = [0u8; crypto::SHARED_KEY_SIZE];
        let mut recv_nonce = [0u8; crypto::NONCE_SIZE];

        // Random placeholders until the handshake completes; never all-zero.
        crypto::random_bytes(&mut shared_key);
        crypto::random_bytes(&mut recv_nonce);

        Channel {
            stream,
            shared_key,
            send_nonce: send_base_nonce,
            recv_nonce,
            send_slot: SendSlot::new(),
            recv_slot: RecvSlot::new(),
            next_frame_length: 0,
        }
    }

    /// Parks raw bytes for transmission outside the record framing. Used once, for the
    /// opening handshake packet.
    #[inline]
    pub fn stash_raw(&mut self, bytes: &[u8]) {
        self.send_slot.stash(bytes, 0);
    }

    /// Swaps in the post-handshake session material. All subsequent records use the
    /// session key and the relay's base nonce.
    #[inline]
    pub fn confirm(&mut self, session: Session) {
        self.shared_key.copy_from_slice(&session.session_key);
        self.recv_nonce.copy_from_slice(&session.recv_nonce);
    }
}

impl<S: Read + Write> Channel<S> {
    /// Drains the send slot. Returns true once no bytes are pending.
    #[inline]
    pub fn flush_pending(&mut self) -> NetworkResult<bool> {
        self.send_slot.flush(&mut self.stream)
    }

    /// Commits a payload to the cipher stream. `Ok` means the record is accepted and its
    /// nonce consumed even if part of the ciphertext is still parked in the send slot;
    /// `Wait` means the slot is occupied by an earlier frame and the payload was not
    /// touched.
    pub fn write_frame(&mut self, plain: &[u8]) -> NetworkResult<()> {
        if plain.len() > MAX_PLAIN_SIZE {
            return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
        }

        if !self.flush_pending()? {
            return Err(NetworkError::Wait);
        }

        let frame_size = LENGTH_SIZE + plain.len() + crypto::MAC_SIZE;
        let mut frame = [0u8; MAX_PACKET_SIZE];

        BigEndian::write_u16(
            &mut frame[..LENGTH_SIZE],
            (plain.len() + crypto::MAC_SIZE) as u16,
        );

        if !crypto::encrypt(
            &mut frame[LENGTH_SIZE..frame_size],
            plain,
            &self.send_nonce,
            &self.shared_key,
        ) {
            return Err(NetworkError::Fatal(ErrorType::Crypto));
        }

        // The record exists in the cipher stream from here on; partial socket writes must
        // never re-encrypt under a fresh nonce.
        crypto::increment_nonce(&mut self.send_nonce);

        match self.stream.write(&frame[..frame_size]) {
            Ok(sent) if sent == frame_size => Ok(()),
            Ok(sent) => {
                self.send_slot.stash(&frame[..frame_size], sent);
                Ok(())
            }
            Err(err) => match NetworkError::from(err) {
                NetworkError::Wait => {
                    self.send_slot.stash(&frame[..frame_size], 0);
                    Ok(())
                }
                fatal => Err(fatal),
            },
        }
    }

    /// Reads the next record off the stream into `plain`, returning the plaintext size.
    /// `Wait` means the length prefix or the ciphertext has not fully arrived yet.
    pub fn read_frame(&mut self, plain: &mut [u8]) -> NetworkResult<usize> {
        if self.next_frame_length == 0 {
            let length = match self.recv_slot.read_exact(&mut self.stream, LENGTH_SIZE)? {
                Some(prefix) => BigEndian::read_u16(prefix) as usize,
                None => return Err(NetworkError::Wait),
            };

            if length <= crypto::MAC_SIZE {
                return Err(NetworkError::Fatal(ErrorType::EmptyPayload));
            }

            if length > MAX_FRAME_SIZE {
                return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
            }

            self.recv_slot.consume();
            self.next_frame_length = length;
        }

        let length = self.next_frame_length;
        let size = length - crypto::MAC_SIZE;

        let decrypted = match self.recv_slot.read_exact(&mut self.stream, length)? {
            Some(cipher) => crypto::decrypt(
                &mut plain[..size],
                cipher,
                &self.recv_nonce,
                &self.shared_key,
            ),
            None => return Err(NetworkError::Wait),
        };

        if !decrypted {
            return Err(NetworkError::Fatal(ErrorType::Crypto));
        }

        crypto::increment_nonce(&mut self.recv_nonce);
        self.recv_slot.consume();
        self.next_frame_length = 0;

        Ok(size)
    }

    /// Reads exactly `size` raw bytes outside the record framing. Used once, for the
    /// relay's handshake reply.
    #[inline]
    pub fn read_raw(&mut self, size: usize) -> NetworkResult<Option<&[u8]>> {
        self.recv_slot.read_exact(&mut self.stream, size)
    }

    /// Discards the raw bytes surfaced by `read_raw`.
    #[inline]
    pub fn consume_raw(&mut self) {
        self.recv_slot.consume();
    }
}

impl<S> Drop for Channel<S> {
    fn drop(&mut self) {
        crypto::memzero(&mut self.shared_key);
        crypto::memzero(&mut self.send_nonce);
        crypto::memzero(&mut self.recv_nonce);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStream;

    fn session(key: [u8; crypto::SHARED_KEY_SIZE], recv_nonce: [u8; crypto::NONCE_SIZE]) -> Session {
        Session {
            session_key: key,
            recv_nonce,
        }
    }

    /// A channel pair with mirrored key material, as if both ends completed a handshake.
    fn confirmed_pair() -> (Channel<MockStream>, Channel<MockStream>) {
        let mut key = [0u8; crypto::SHARED_KEY_SIZE];
        crypto::random_bytes(&mut key);

        let mut nonce_a = [0u8; crypto::NONCE_SIZE];
        let mut nonce_b = [0u8; crypto::NONCE_SIZE];
        crypto::random_bytes(&mut nonce_a);
        crypto::random_bytes(&mut nonce_b);

        let mut side_a = Channel::new(MockStream::new(), nonce_a);
        side_a.confirm(session(key, nonce_b));

        let mut side_b = Channel::new(MockStream::new(), nonce_b);
        side_b.confirm(session(key, nonce_a));

        (side_a, side_b)
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (mut side_a, mut side_b) = confirmed_pair();

        side_a.write_frame(&[4, 0, 0, 0, 0, 0, 0, 0, 123]).unwrap();
        side_b.stream.feed(&side_a.stream.take_outgoing());

        let mut plain = [0u8; MAX_PLAIN_SIZE];
        let size = side_b.read_frame(&mut plain).unwrap();

        assert_eq!(&plain[..size], &[4, 0, 0, 0, 0, 0, 0, 0, 123]);
    }

    #[test]
    fn test_nonces_advance_by_one_per_record() {
        let (mut side_a, mut side_b) = confirmed_pair();

        let mut expected_send = side_a.send_nonce;
        let mut expected_recv = side_b.recv_nonce;

        for byte in 0..3u8 {
            side_a.write_frame(&[byte + 1]).unwrap();
            crypto::increment_nonce(&mut expected_send);
            assert_eq!(side_a.send_nonce, expected_send);
        }

        side_b.stream.feed(&side_a.stream.take_outgoing());

        let mut plain = [0u8; MAX_PLAIN_SIZE];
        for byte in 0..3u8 {
            let size = side_b.read_frame(&mut plain).unwrap();
            assert_eq!(&plain[..size], &[byte + 1]);
            crypto::increment_nonce(&mut expected_recv);
            assert_eq!(side_b.recv_nonce, expected_recv);
        }
    }

    #[test]
    fn test_partial_write_stashes_without_nonce_reuse() {
        let (mut side_a, mut side_b) = confirmed_pair();
        side_a.stream.write_chunk = 10;
        side_a.stream.write_capacity = 10;

        let mut expected_send = side_a.send_nonce;

        // Accepted in full even though only ten bytes hit the wire.
        side_a.write_frame(&[9u8; 20]).unwrap();
        crypto::increment_nonce(&mut expected_send);
        assert_eq!(side_a.send_nonce, expected_send);
        assert!(!side_a.send_slot.is_empty());

        // A second frame must wait for the slot.
        assert_eq!(side_a.write_frame(&[1]).unwrap_err(), NetworkError::Wait);
        assert_eq!(side_a.send_nonce, expected_send);

        side_a.stream.write_capacity = usize::max_value();
        assert!(side_a.flush_pending().unwrap());

        side_b.stream.feed(&side_a.stream.take_outgoing());

        let mut plain = [0u8; MAX_PLAIN_SIZE];
        let size = side_b.read_frame(&mut plain).unwrap();
        assert_eq!(&plain[..size], &[9u8; 20]);
    }

    #[test]
    fn test_blocked_write_stashes_whole_frame() {
        let (mut side_a, mut side_b) = confirmed_pair();
        side_a.stream.write_capacity = 0;

        side_a.write_frame(&[7, 7, 7]).unwrap();
        assert!(!side_a.send_slot.is_empty());

        side_a.stream.write_capacity = usize::max_value();
        assert!(side_a.flush_pending().unwrap());

        side_b.stream.feed(&side_a.stream.take_outgoing());

        let mut plain = [0u8; MAX_PLAIN_SIZE];
        let size = side_b.read_frame(&mut plain).unwrap();
        assert_eq!(&plain[..size], &[7, 7, 7]);
    }

    #[test]
    fn test_write_rejects_oversized_payload() {
        let (mut side_a, _) = confirmed_pair();

        assert_eq!(
            side_a.write_frame(&[0u8; MAX_PLAIN_SIZE + 1]).unwrap_err(),
            NetworkError::Fatal(ErrorType::PayloadTooLarge)
        );
    }

    #[test]
    fn test_read_waits_for_prefix_and_body() {
        let (mut side_a, mut side_b) = confirmed_pair();

        side_a.write_frame(&[5; 30]).unwrap();
        let record = side_a.stream.take_outgoing();

        let mut plain = [0u8; MAX_PLAIN_SIZE];

        // One byte of the prefix only.
        side_b.stream.feed(&record[..1]);
        assert_eq!(side_b.read_frame(&mut plain).unwrap_err(), NetworkError::Wait);

        // Prefix complete, body still short.
        side_b.stream.feed(&record[1..10]);
        assert_eq!(side_b.read_frame(&mut plain).unwrap_err(), NetworkError::Wait);

        side_b.stream.feed(&record[10..]);
        let size = side_b.read_frame(&mut plain).unwrap();
        assert_eq!(&plain[..size], &[5; 30]);
    }

    #[test]
    fn test_read_rejects_empty_record() {
        let (_, mut side_b) = confirmed_pair();

        // A ciphertext of MAC size alone carries no plaintext.
        side_b.stream.feed(&[0, crypto::MAC_SIZE as u8]);

        let mut plain = [0u8; MAX_PLAIN_SIZE];
        assert_eq!(
            side_b.read_frame(&mut plain).unwrap_err(),
            NetworkError::Fatal(ErrorType::EmptyPayload)
        );
    }

    #[test]
    fn test_read_rejects_oversized_record() {
        let (_, mut side_b) = confirmed_pair();

        let length = (MAX_FRAME_SIZE + 1) as u16;
        side_b.stream.feed(&[(length >> 8) as u8, length as u8]);

        let mut plain = [0u8; MAX_PLAIN_SIZE];
        assert_eq!(
            side_b.read_frame(&mut plain).unwrap_err(),
            NetworkError::Fatal(ErrorType::PayloadTooLarge)
        );
    }

    #[test]
    fn test_read_rejects_corrupt_mac() {
        let (mut side_a, mut side_b) = confirmed_pair();

        side_a.write_frame(&[1, 2, 3]).unwrap();
        let mut record = side_a.stream.take_outgoing();
        let last = record.len() - 1;
        record[last] ^= 0xff;

        side_b.stream.feed(&record);

        let mut plain = [0u8; MAX_PLAIN_SIZE];
        assert_eq!(
            side_b.read_frame(&mut plain).unwrap_err(),
            NetworkError::Fatal(ErrorType::Crypto)
        );
    }

    #[test]
    fn test_key_material_scrubbed_on_drop() {
        use std::mem::ManuallyDrop;

        let (side_a, _) = confirmed_pair();

        let mut side_a = ManuallyDrop::new(side_a);
        unsafe { ManuallyDrop::drop(&mut side_a) };

        assert_eq!(side_a.shared_key, [0u8; crypto::SHARED_KEY_SIZE]);
        assert_eq!(side_a.send_nonce, [0u8; crypto::NONCE_SIZE]);
        assert_eq!(side_a.recv_nonce, [0u8; crypto::NONCE_SIZE]);
    }
}
