//! Key material identifying the two ends of a relay session. Keys travel in config files as
//! base64 strings.

use crate::crypto;
use serde::{de, Deserialize, Deserializer, Serializer};
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};

const KEY_SIZE: usize = 32;

#[inline]
fn serialize_b64_key<S>(key: &[u8; KEY_SIZE], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&base64::encode(&key[..]))
}

#[inline]
fn deserialize_b64_key<'de, D>(deserializer: D) -> Result<[u8; KEY_SIZE], D::Error>
where
    D: Deserializer<'de>,
{
    let s = <&str>::deserialize(deserializer)?;
    let decoded_raw = base64::decode(s).map_err(de::Error::custom)?;

    if decoded_raw.len() != KEY_SIZE {
        return Err(de::Error::custom("key must decode to exactly 32 bytes"));
    }

    let mut decoded = [0u8; KEY_SIZE];
    decoded.copy_from_slice(&decoded_raw);

    Ok(decoded)
}

/// Long term curve25519 public key of a peer or relay.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct PublicKey(
    #[serde(
        serialize_with = "serialize_b64_key",
        deserialize_with = "deserialize_b64_key"
    )]
    [u8; KEY_SIZE],
);

impl PublicKey {
    pub const SIZE: usize = KEY_SIZE;

    #[inline]
    pub fn new(key: [u8; Self::SIZE]) -> PublicKey {
        PublicKey(key)
    }
}

impl Deref for PublicKey {
    type Target = [u8; PublicKey::SIZE];

    #[inline]
    fn deref(&self) -> &[u8; PublicKey::SIZE] {
        &self.0
    }
}

impl DerefMut for PublicKey {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8; PublicKey::SIZE] {
        &mut self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PublicKey({})", base64::encode(&self.0[..]))
    }
}

/// Long term curve25519 secret key. Scrubbed on drop.
#[derive(Serialize, Deserialize, Clone)]
pub struct SecretKey(
    #[serde(
        serialize_with = "serialize_b64_key",
        deserialize_with = "deserialize_b64_key"
    )]
    [u8; KEY_SIZE],
);

impl SecretKey {
    pub const SIZE: usize = KEY_SIZE;

    #[inline]
    pub fn new(key: [u8; Self::SIZE]) -> SecretKey {
        SecretKey(key)
    }
}

impl Deref for SecretKey {
    type Target = [u8; SecretKey::SIZE];

    #[inline]
    fn deref(&self) -> &[u8; SecretKey::SIZE] {
        &self.0
    }
}

impl DerefMut for SecretKey {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8; SecretKey::SIZE] {
        &mut self.0
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        crypto::memzero(&mut self.0);
    }
}

/// Generates a fresh identity keypair.
#[inline]
pub fn generate_keypair() -> (PublicKey, SecretKey) {
    let mut public_key = [0u8; KEY_SIZE];
    let mut secret_key = [0u8; KEY_SIZE];

    crypto::keypair(&mut public_key, &mut secret_key);

    (PublicKey::new(public_key), SecretKey::new(secret_key))
}
