//! Password-to-KEK derivation via scrypt.
//!
//! The key-encryption key (KEK) derived here is used only to wrap and unwrap
//! the two master keys (see [`crate::crypto::key_wrap`]); it never touches
//! file content directly.

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroizing;

/// Failure modes when deriving a key-encryption key from a password.
#[derive(Debug, Error)]
pub enum KeyDerivationError {
    /// `scryptCostParam` was not a power of two in scrypt's accepted range. [USER ERROR / file corruption]
    #[error("invalid scrypt cost parameter: {0} (must be a power of two)")]
    InvalidCostParameter(u32),
    /// scrypt rejected the parameter set outright (e.g. block size too large for the machine). [PROGRAMMING ERROR]
    #[error("invalid scrypt parameters: {0}")]
    InvalidParams(#[from] scrypt::errors::InvalidParams),
    /// scrypt's internal output-length validation failed; this can only happen from a coding mistake here. [PROGRAMMING ERROR]
    #[error("invalid scrypt output length: {0}")]
    InvalidOutputLen(#[from] scrypt::errors::InvalidOutputLen),
}

/// Length in bytes of the derived key-encryption key (matches the AES-256
/// key size used by [`crate::crypto::key_wrap`]).
pub const KEK_LENGTH: usize = 32;

/// scrypt parallelization parameter. The format fixes this at 1; it is never persisted as a choice.
pub const SCRYPT_P: u32 = 1;

/// Derive a key-encryption key from `password` and the vault's stored scrypt
/// parameters (`scryptSalt`, `scryptCostParam`, `scryptBlockSize`).
///
/// `password` is normalized to Unicode NFC before being hashed, so that a
/// passphrase delivered in NFD form (as happens routinely when text crosses
/// the macOS filesystem boundary) derives the same key as its NFC form
/// anywhere else.
pub fn derive_kek(
    password: &str,
    salt: &[u8],
    cost_param: u32,
    block_size: u32,
) -> Result<Zeroizing<[u8; KEK_LENGTH]>, KeyDerivationError> {
    let normalized: String = password.nfc().collect();
    let log_n = cost_param_to_log_n(cost_param)?;
    let params = scrypt::Params::new(log_n, block_size, SCRYPT_P, KEK_LENGTH)?;

    let mut kek = Zeroizing::new([0u8; KEK_LENGTH]);
    scrypt::scrypt(normalized.as_bytes(), salt, &params, kek.as_mut_slice())?;
    Ok(kek)
}

/// Convert a scrypt cost parameter `N` (required to be a power of two, as
/// persisted in the key file) to scrypt's internal `log_n` representation.
pub fn cost_param_to_log_n(cost_param: u32) -> Result<u8, KeyDerivationError> {
    if cost_param < 2 || !cost_param.is_power_of_two() {
        return Err(KeyDerivationError::InvalidCostParameter(cost_param));
    }
    Ok(cost_param.trailing_zeros() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_password_and_params_derive_same_kek() {
        let salt = b"0123456789abcdef";
        let a = derive_kek("correct horse battery staple", salt, 16, 8).unwrap();
        let b = derive_kek("correct horse battery staple", salt, 16, 8).unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn different_passwords_derive_different_keks() {
        let salt = b"0123456789abcdef";
        let a = derive_kek("hunter2", salt, 16, 8).unwrap();
        let b = derive_kek("Hunter2", salt, 16, 8).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn nfd_and_nfc_passwords_derive_same_kek() {
        // "café" as NFC (é = U+00E9) vs NFD (e + combining acute U+0065 U+0301).
        let nfc = "caf\u{00E9}";
        let nfd = "cafe\u{0301}";
        let salt = b"0123456789abcdef";
        let a = derive_kek(nfc, salt, 16, 8).unwrap();
        let b = derive_kek(nfd, salt, 16, 8).unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn non_power_of_two_cost_param_rejected() {
        assert!(cost_param_to_log_n(100).is_err());
        assert!(cost_param_to_log_n(1).is_err());
        assert!(cost_param_to_log_n(0).is_err());
        assert!(cost_param_to_log_n(16384).is_ok());
    }
}
