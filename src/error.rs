//! The [`crate::cryptor::Cryptor`]'s unified error type.
//!
//! Each lower module (scrypt derivation, key-wrap, the key file, filenames,
//! headers, content blocks, the worker executor) owns an error enum scoped
//! to its own failure modes. This module composes them into `CryptorError`,
//! reclassifying the ambiguous cases the way `SPEC_FULL.md` §7 requires —
//! most importantly, an RFC 3394 unwrap-integrity failure is only ever
//! `WrongPassword` once it's known to have come from `decrypt_master_key`,
//! never from a generic key-wrap call site.
//!
//! Doc comments on each variant mark its security classification
//! (integrity violation vs. user error vs. programmer error), matching the
//! triage categories this crate's lineage uses in its own `CryptoError`.

use thiserror::Error;

use crate::content::ContentError;
use crate::crypto::key_wrap::KeyWrapError;
use crate::crypto::keys::KeyAccessError;
use crate::filename::FilenameError;
use crate::header::HeaderError;
use crate::keyfile::KeyFileError;
use crate::worker::WorkerError;

/// Unified failure type surfaced by every [`crate::cryptor::Cryptor`] operation.
#[derive(Debug, Error)]
pub enum CryptorError {
    /// `decrypt_master_key` was called with a password that doesn't unwrap
    /// the stored keys. **[USER ERROR]** Recoverable by retrying with the
    /// correct password; does not mutate facade state.
    #[error("wrong password")]
    WrongPassword,

    /// Ciphertext was malformed, an AES-SIV tag didn't verify, or a
    /// requested range fell outside the file. **[USER ERROR / possible
    /// tampering]** The operation is aborted; any plaintext already
    /// delivered to the caller before this point must not be trusted.
    #[error("decryption failed: {0}")]
    DecryptFailed(String),

    /// A header or content block HMAC did not verify. **[INTEGRITY
    /// VIOLATION]** A subkind of [`Self::DecryptFailed`] that specifically
    /// signals possible tampering rather than routine malformed input.
    #[error("MAC authentication failed: possible tampering")]
    MacAuthFailed,

    /// The key file's `version` didn't match what this crate writes.
    /// **[USER ERROR]** The vault is older or newer than this crate supports.
    #[error("unsupported vault version: stored {stored}, supported {supported}")]
    UnsupportedVault { stored: u32, supported: u32 },

    /// The key file's `keyLength` exceeds what this crate's
    /// [`crate::crypto::keys::MasterKeys`] can represent. **[USER ERROR]**
    #[error("unsupported key length: stored {stored} bits, maximum {max} bits")]
    UnsupportedKeyLength { stored: u32, max: u32 },

    /// Buffer sizing or cipher update failed during encryption in a way that
    /// indicates a bug rather than bad input. **[PROGRAMMER ERROR]**
    #[error("encryption failed: {0}")]
    EncryptFailed(String),

    /// An algorithm or padding scheme was misconfigured, or a key was
    /// misused at construction time. **[PROGRAMMER ERROR]**, made fatal
    /// rather than silently worked around.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A cryptographic operation was attempted after [`crate::cryptor::Cryptor::destroy`].
    /// **[PROGRAMMER ERROR]** The transition is idempotent; this is not itself dangerous,
    /// just a sign the caller kept a handle past its intended lifetime.
    #[error("this Cryptor has been destroyed")]
    Destroyed,

    /// Passthrough I/O failure from an underlying channel. **[TRANSIENT]**
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key material access failed at the memory-protection layer. **[SYSTEM ERROR]**
    #[error("key access failed: {0}")]
    KeyAccess(#[from] KeyAccessError),
}

impl From<KeyFileError> for CryptorError {
    fn from(err: KeyFileError) -> Self {
        match err {
            KeyFileError::WrongPassword => CryptorError::WrongPassword,
            KeyFileError::UnsupportedVersion { stored, supported } => {
                CryptorError::UnsupportedVault { stored, supported }
            }
            KeyFileError::UnsupportedKeyLength { stored, max } => {
                CryptorError::UnsupportedKeyLength { stored, max }
            }
            KeyFileError::KeyAccess(e) => CryptorError::KeyAccess(e),
            KeyFileError::Malformed(e) => CryptorError::DecryptFailed(e.to_string()),
            KeyFileError::InvalidWrappedKeyLength(e) => CryptorError::DecryptFailed(e.to_string()),
            KeyFileError::KeyDerivation(e) => CryptorError::IllegalState(e.to_string()),
        }
    }
}

impl From<KeyWrapError> for CryptorError {
    fn from(err: KeyWrapError) -> Self {
        match err {
            KeyWrapError::UnwrapIntegrityFailed => CryptorError::DecryptFailed(err.to_string()),
            KeyWrapError::InvalidLength(_) => CryptorError::DecryptFailed(err.to_string()),
        }
    }
}

impl From<FilenameError> for CryptorError {
    fn from(err: FilenameError) -> Self {
        match err {
            FilenameError::DecryptFailed => CryptorError::DecryptFailed(err.to_string()),
            FilenameError::InvalidEncoding(_) => CryptorError::DecryptFailed(err.to_string()),
            FilenameError::InvalidUtf8(_) => CryptorError::DecryptFailed(err.to_string()),
            FilenameError::KeyAccess(e) => CryptorError::KeyAccess(e),
        }
    }
}

impl From<HeaderError> for CryptorError {
    fn from(err: HeaderError) -> Self {
        match err {
            HeaderError::InvalidLength(n) => {
                CryptorError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("truncated file header: {n} bytes"),
                ))
            }
            HeaderError::MacMismatch => CryptorError::MacAuthFailed,
            HeaderError::KeyAccess(e) => CryptorError::KeyAccess(e),
        }
    }
}

impl From<ContentError> for CryptorError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::MacMismatch { .. } => CryptorError::MacAuthFailed,
            ContentError::BlockTooShort(_) => CryptorError::DecryptFailed(err.to_string()),
        }
    }
}

impl From<WorkerError> for CryptorError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Processing { message, .. } if message.contains("authentication failed") => {
                CryptorError::MacAuthFailed
            }
            WorkerError::Processing { message, .. } => CryptorError::DecryptFailed(message),
            WorkerError::Backpressure(timeout) => CryptorError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("enqueueing work timed out after {timeout:?}"),
            )),
            WorkerError::Io(message) => {
                CryptorError::Io(std::io::Error::other(message))
            }
        }
    }
}
