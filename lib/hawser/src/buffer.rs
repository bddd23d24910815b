use crate::shared::{ErrorType, NetworkError, NetworkResult};
use crate::MAX_PACKET_SIZE;
use std::io;

/// Staging slot for at most one outgoing frame. A frame that could not be pushed onto the
/// wire in full is parked here and drained on subsequent ticks; new frames must wait until
/// the slot is empty again.
pub struct SendSlot {
    data: [u8; MAX_PACKET_SIZE],
    length: usize,
    sent: usize,
}

impl SendSlot {
    #[inline]
    pub fn new() -> SendSlot {
        SendSlot {
            data: [0; MAX_PACKET_SIZE],
            length: 0,
            sent: 0,
        }
    }

    /// Returns true when no frame is parked.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Parks a frame of which `sent` bytes are already on the wire.
    #[inline]
    pub fn stash(&mut self, frame: &[u8], sent: usize) {
        if !self.is_empty() {
            panic!("Attempted to stash a frame into an occupied send slot");
        }

        self.data[..frame.len()].copy_from_slice(frame);
        self.length = frame.len();
        self.sent = sent;
    }

    /// Pushes the parked bytes onto the writer. Returns true once the slot is fully drained,
    /// false when the writer stopped accepting data mid-frame.
    pub fn flush<W: io::Write>(&mut self, writer: &mut W) -> NetworkResult<bool> {
        while self.sent < self.length {
            match writer.write(&self.data[self.sent..self.length]) {
                Ok(0) => return Err(NetworkError::Fatal(ErrorType::Io(io::ErrorKind::WriteZero))),
                Ok(count) => self.sent += count,
                Err(err) => {
                    return match NetworkError::from(err) {
                        NetworkError::Wait => Ok(false),
                        fatal => Err(fatal),
                    };
                }
            }
        }

        self.length = 0;
        self.sent = 0;

        Ok(true)
    }
}

/// Staging slot for one incoming item read off a non-blocking stream in exact sizes.
/// Bytes accumulate across ticks until the requested count is present.
pub struct RecvSlot {
    data: [u8; MAX_PACKET_SIZE],
    filled: usize,
}

impl RecvSlot {
    #[inline]
    pub fn new() -> RecvSlot {
        RecvSlot {
            data: [0; MAX_PACKET_SIZE],
            filled: 0,
        }
    }

    /// Reads until exactly `size` bytes are buffered. Returns `None` while the stream has
    /// not yet delivered enough; an orderly EOF is fatal.
    pub fn read_exact<R: io::Read>(
        &mut self,
        reader: &mut R,
        size: usize,
    ) -> NetworkResult<Option<&[u8]>> {
        while self.filled < size {
            match reader.read(&mut self.data[self.filled..size]) {
                Ok(0) => return Err(NetworkError::Fatal(ErrorType::Closed)),
                Ok(count) => self.filled += count,
                Err(err) => {
                    return match NetworkError::from(err) {
                        NetworkError::Wait => Ok(None),
                        fatal => Err(fatal),
                    };
                }
            }
        }

        Ok(Some(&self.data[..size]))
    }

    /// Discards the buffered item, readying the slot for the next one.
    #[inline]
    pub fn consume(&mut self) {
        self.filled = 0;
    }
}
