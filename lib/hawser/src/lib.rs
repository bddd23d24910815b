//! Client engine for an encrypted TCP relay session. A peer that cannot reach another peer
//! directly opens a relay session, requests routing toward the other peer and exchanges
//! length-prefixed authenticated-encrypted records over the stream. One [`client::Client`]
//! instance represents one relay session and is driven by the owner's periodic tick.

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod buffer;
pub mod channel;
pub mod client;
pub mod config;
pub mod frame;
pub mod handshake;
pub mod shared;
pub mod socket;

pub mod prelude;

#[cfg(test)]
pub(crate) mod testing;

use ballast::crypto;

/// Hard ceiling for a single length-prefixed record on the wire, prefix included.
pub const MAX_PACKET_SIZE: usize = 2048;
/// Size of the big-endian ciphertext length prefix.
pub const LENGTH_SIZE: usize = 2;
/// Largest ciphertext a record may carry.
pub const MAX_FRAME_SIZE: usize = MAX_PACKET_SIZE - LENGTH_SIZE;
/// Largest plaintext a record may carry.
pub const MAX_PLAIN_SIZE: usize = MAX_FRAME_SIZE - crypto::MAC_SIZE;
/// Packet ids below this value are control packets. Ids at or above it carry routed data
/// for connection `id - NUM_RESERVED_PORTS`.
pub const NUM_RESERVED_PORTS: u8 = 16;
