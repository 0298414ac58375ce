//! RFC 3394 AES key-wrap of the two master keys under a key-encryption key.
//!
//! This intentionally reaches for the `aes-kw` crate rather than a hand-rolled
//! key-wrap loop: RFC 3394 has enough subtlety (the A₀ integrity check value,
//! the six-round Feistel-like wrapping schedule) that a from-scratch
//! implementation is a poor place to save a dependency.

use aes::Aes256;
use aes_kw::Kek;
use generic_array::GenericArray;
use thiserror::Error;
use zeroize::Zeroizing;

/// Size in bytes of an RFC 3394-wrapped 256-bit key (32-byte key plus an 8-byte integrity check value).
pub const WRAPPED_KEY_LENGTH: usize = 40;

/// Failure modes for wrapping/unwrapping a master key.
#[derive(Debug, Error)]
pub enum KeyWrapError {
    /// The wrapped ciphertext failed RFC 3394's integrity check. This is the
    /// expected failure mode for a wrong password; it is reclassified as
    /// such at the [`crate::keyfile`] boundary. [USER ERROR, once reclassified]
    #[error("key unwrap failed: incorrect password or corrupted key file")]
    UnwrapIntegrityFailed,
    /// The ciphertext was not the length of a wrapped 256-bit key. [file corruption]
    #[error("invalid wrapped key length: expected {WRAPPED_KEY_LENGTH}, got {0}")]
    InvalidLength(usize),
}

fn kek_cipher(kek: &[u8; 32]) -> Kek<Aes256> {
    Kek::new(GenericArray::from_slice(kek))
}

/// Wrap a 256-bit key under `kek` (also 256 bits), per RFC 3394.
pub fn wrap_key(kek: &[u8; 32], key: &[u8; 32]) -> Vec<u8> {
    kek_cipher(kek)
        .wrap_vec(key)
        .expect("RFC 3394 wrap of a 32-byte key cannot fail")
}

/// Unwrap a previously wrapped 256-bit key under `kek`.
pub fn unwrap_key(kek: &[u8; 32], wrapped: &[u8]) -> Result<Zeroizing<[u8; 32]>, KeyWrapError> {
    if wrapped.len() != WRAPPED_KEY_LENGTH {
        return Err(KeyWrapError::InvalidLength(wrapped.len()));
    }
    let unwrapped = kek_cipher(kek)
        .unwrap_vec(wrapped)
        .map_err(|_| KeyWrapError::UnwrapIntegrityFailed)?;

    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(&unwrapped);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_unwrap_roundtrip() {
        let kek = [0x42u8; 32];
        let key = [0x13u8; 32];

        let wrapped = wrap_key(&kek, &key);
        assert_eq!(wrapped.len(), WRAPPED_KEY_LENGTH);

        let unwrapped = unwrap_key(&kek, &wrapped).unwrap();
        assert_eq!(*unwrapped, key);
    }

    #[test]
    fn unwrap_with_wrong_kek_fails() {
        let key = [0x13u8; 32];
        let wrapped = wrap_key(&[0x01u8; 32], &key);
        assert!(matches!(
            unwrap_key(&[0x02u8; 32], &wrapped),
            Err(KeyWrapError::UnwrapIntegrityFailed)
        ));
    }

    #[test]
    fn unwrap_rejects_wrong_length() {
        assert!(matches!(
            unwrap_key(&[0u8; 32], &[0u8; 10]),
            Err(KeyWrapError::InvalidLength(10))
        ));
    }
}
