use byteorder::{ByteOrder, NativeEndian};
use ctor::ctor;
use libsodium_sys;

pub const PUBLIC_KEY_SIZE: usize = libsodium_sys::crypto_box_PUBLICKEYBYTES as usize;
pub const SECRET_KEY_SIZE: usize = libsodium_sys::crypto_box_SECRETKEYBYTES as usize;
pub const SHARED_KEY_SIZE: usize = libsodium_sys::crypto_box_BEFORENMBYTES as usize;
pub const NONCE_SIZE: usize = libsodium_sys::crypto_box_NONCEBYTES as usize;
pub const MAC_SIZE: usize = libsodium_sys::crypto_box_MACBYTES as usize;

/// Initialize the sodium infrastructure
#[ctor]
fn INIT_SODIUM() {
    unsafe {
        if libsodium_sys::sodium_init() < 0 {
            panic!("Cryptography initialization failed")
        }
    }
}

/// Generates a fresh curve25519 keypair into the supplied buffers.
#[inline]
pub fn keypair(public_key: &mut [u8; PUBLIC_KEY_SIZE], secret_key: &mut [u8; SECRET_KEY_SIZE]) {
    unsafe {
        libsodium_sys::crypto_box_keypair(public_key.as_mut_ptr(), secret_key.as_mut_ptr());
    }
}

/// Derives the shared key for the (public key, secret key) pair. The result is symmetric:
/// precomputing with (pk_a, sk_b) and (pk_b, sk_a) yields the same key.
#[inline]
pub fn precompute(
    shared_key: &mut [u8; SHARED_KEY_SIZE],
    public_key: &[u8; PUBLIC_KEY_SIZE],
    secret_key: &[u8; SECRET_KEY_SIZE],
) -> bool {
    unsafe {
        libsodium_sys::crypto_box_beforenm(
            shared_key.as_mut_ptr(),
            public_key.as_ptr(),
            secret_key.as_ptr(),
        ) >= 0
    }
}

/// Encrypts the provided plain text into the cipher buffer. The encrypted message size will be
/// the plain text size plus the MAC size (16 bytes). The function will fail if the cipher slice
/// is not exactly that large.
///
/// The nonce and key must match those used during decryption, the decryption will fail otherwise.
#[inline]
pub fn encrypt(
    cipher: &mut [u8],
    plain: &[u8],
    nonce: &[u8; NONCE_SIZE],
    key: &[u8; SHARED_KEY_SIZE],
) -> bool {
    if cipher.len() != plain.len() + MAC_SIZE {
        panic!(
            "Encryption: cipher data length ({}) must be plain data length ({}) + MAC size ({})",
            cipher.len(),
            plain.len(),
            MAC_SIZE
        )
    }

    unsafe {
        let result = libsodium_sys::crypto_box_easy_afternm(
            cipher.as_mut_ptr(),
            plain.as_ptr(),
            plain.len() as u64,
            nonce.as_ptr(),
            key.as_ptr(),
        );

        result >= 0
    }
}

/// Decrypts the provided ciphertext into the plain buffer. The decoded message size is equal to
/// the cipher text length minus the MAC (16 bytes). The function will fail if the sizes do not
/// match.
///
/// The nonce and key must match those used during encryption, the decryption will fail otherwise.
#[inline]
pub fn decrypt(
    plain: &mut [u8],
    cipher: &[u8],
    nonce: &[u8; NONCE_SIZE],
    key: &[u8; SHARED_KEY_SIZE],
) -> bool {
    if cipher.len() != plain.len() + MAC_SIZE {
        panic!(
            "Decryption: cipher data length ({}) must be plain data length ({}) + MAC size ({})",
            cipher.len(),
            plain.len(),
            MAC_SIZE
        )
    }

    unsafe {
        let result = libsodium_sys::crypto_box_open_easy_afternm(
            plain.as_mut_ptr(),
            cipher.as_ptr(),
            cipher.len() as u64,
            nonce.as_ptr(),
            key.as_ptr(),
        );

        result >= 0
    }
}

/// Fills the provided buffer with cryptographically secure random bytes
#[inline]
pub fn random_bytes(out: &mut [u8]) {
    unsafe {
        libsodium_sys::randombytes_buf(out.as_mut_ptr() as *mut ::std::ffi::c_void, out.len());
    }
}

/// Generates a random 64 bit integer.
#[inline]
pub fn random_u64() -> u64 {
    let mut bytes = [0u8; 8];
    random_bytes(&mut bytes);
    NativeEndian::read_u64(&bytes)
}

/// Increments the nonce by one, treating the buffer as a big-endian counter.
#[inline]
pub fn increment_nonce(nonce: &mut [u8; NONCE_SIZE]) {
    for byte in nonce.iter_mut().rev() {
        *byte = byte.wrapping_add(1);

        if *byte != 0 {
            break;
        }
    }
}

/// Overwrites the buffer with zeroes. Used to scrub key material before release.
#[inline]
pub fn memzero(bytes: &mut [u8]) {
    unsafe {
        libsodium_sys::sodium_memzero(bytes.as_mut_ptr() as *mut ::std::ffi::c_void, bytes.len());
    }
}
