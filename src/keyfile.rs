//! Persisted, password-wrapped master keys: the `KeyFile` JSON record and
//! the `encryptMasterKey`/`decryptMasterKey` operations built on it.
//!
//! This is grounded in the same `MasterKeyFile`-style layout the key-file
//! persistence in this codebase's lineage has always used (scrypt params
//! alongside base64 key material, a version integrity check), adapted to
//! RFC 3394 key-wrap instead of that lineage's AES-GCM wrap.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use thiserror::Error;
use tracing::instrument;

use crate::crypto::kdf::{derive_kek, KeyDerivationError};
use crate::crypto::key_wrap::{unwrap_key, wrap_key, KeyWrapError};
use crate::crypto::keys::{KeyAccessError, MasterKeys};

/// The only key-file format version this crate writes or accepts.
pub const CURRENT_VERSION: u32 = 1;

/// Maximum master-key length, in bits, this crate's [`MasterKeys`] can hold.
/// `MasterKeys` is hardcoded to 256-bit AES/HMAC keys; `keyLength` exists in
/// the key file as forward-looking metadata, not a current tunable.
pub const MAX_KEY_LENGTH_BITS: u32 = 256;

/// Length, in bytes, of the scrypt salt this crate generates for new key files.
pub const SCRYPT_SALT_LENGTH: usize = 16;

/// Default scrypt cost parameter (`N`) used by [`encrypt_master_key`] unless
/// overridden via [`crate::config::CryptorConfig`].
pub const DEFAULT_SCRYPT_COST_PARAM: u32 = 1 << 15;

/// Default scrypt block size (`r`) used by [`encrypt_master_key`] unless
/// overridden via [`crate::config::CryptorConfig`].
pub const DEFAULT_SCRYPT_BLOCK_SIZE: u32 = 8;

/// The on-disk, password-wrapped representation of a vault's master keys.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFile {
    pub version: u32,
    #[serde_as(as = "Base64")]
    pub scrypt_salt: Vec<u8>,
    pub scrypt_cost_param: u32,
    pub scrypt_block_size: u32,
    pub key_length: u32,
    #[serde_as(as = "Base64")]
    pub primary_master_key: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub hmac_master_key: Vec<u8>,
}

impl KeyFile {
    /// Serialize to the canonical JSON representation.
    pub fn to_json(&self) -> Result<String, KeyFileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a key file from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, KeyFileError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Failure modes for persisting or loading a [`KeyFile`].
#[derive(Debug, Error)]
pub enum KeyFileError {
    /// The key file's JSON was malformed or missing required fields. [file corruption]
    #[error("malformed key file: {0}")]
    Malformed(#[from] serde_json::Error),
    /// `version` did not match [`CURRENT_VERSION`]. [USER ERROR: unsupported vault]
    #[error("unsupported key file version: stored {stored}, supported {supported}")]
    UnsupportedVersion { stored: u32, supported: u32 },
    /// `keyLength` exceeded what this crate's [`MasterKeys`] can represent. [USER ERROR: unsupported vault]
    #[error("unsupported key length: stored {stored} bits, maximum {max} bits")]
    UnsupportedKeyLength { stored: u32, max: u32 },
    /// scrypt parameter derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(#[from] KeyDerivationError),
    /// RFC 3394 unwrap failed integrity verification.
    ///
    /// [INTEGRITY VIOLATION / USER ERROR] This is the expected outcome of an
    /// incorrect password; it is intentionally not distinguished from
    /// tampering, since scrypt+key-wrap gives no way to tell the two apart.
    #[error("wrong password or corrupted key file")]
    WrongPassword,
    /// Key material access failed at the memory-protection layer. [SYSTEM ERROR]
    #[error("key access failed: {0}")]
    KeyAccess(#[from] KeyAccessError),
    /// A wrapped key field was not the expected length for an RFC 3394-wrapped 256-bit key. [file corruption]
    #[error("malformed key file: {0}")]
    InvalidWrappedKeyLength(#[source] KeyWrapError),
}

impl From<KeyWrapError> for KeyFileError {
    fn from(err: KeyWrapError) -> Self {
        match err {
            KeyWrapError::UnwrapIntegrityFailed => KeyFileError::WrongPassword,
            KeyWrapError::InvalidLength(_) => KeyFileError::InvalidWrappedKeyLength(err),
        }
    }
}

/// Wrap a fresh or existing [`MasterKeys`] pair under `password` and return
/// the resulting [`KeyFile`] (the `encryptMasterKey` facade operation).
///
/// `cost_param`/`block_size` select the scrypt work factor for this
/// particular key file; pass [`DEFAULT_SCRYPT_COST_PARAM`]/[`DEFAULT_SCRYPT_BLOCK_SIZE`]
/// unless a [`crate::config::CryptorConfig`] overrides them.
#[instrument(level = "debug", skip(keys, password), fields(cost_param, block_size))]
pub fn encrypt_master_key(
    keys: &MasterKeys,
    password: &str,
    cost_param: u32,
    block_size: u32,
) -> Result<KeyFile, KeyFileError> {
    let mut salt = vec![0u8; SCRYPT_SALT_LENGTH];
    rand::rng().fill_bytes(&mut salt);

    let kek = derive_kek(password, &salt, cost_param, block_size)?;

    let (primary_wrapped, hmac_wrapped) = keys.with_raw_key(|combined| {
        let mut primary = [0u8; 32];
        let mut mac = [0u8; 32];
        primary.copy_from_slice(&combined[..32]);
        mac.copy_from_slice(&combined[32..]);
        (wrap_key(&kek, &primary), wrap_key(&kek, &mac))
    })?;

    tracing::debug!(cost_param, block_size, "wrapped master keys under new KEK");

    Ok(KeyFile {
        version: CURRENT_VERSION,
        scrypt_salt: salt,
        scrypt_cost_param: cost_param,
        scrypt_block_size: block_size,
        key_length: MAX_KEY_LENGTH_BITS,
        primary_master_key: primary_wrapped,
        hmac_master_key: hmac_wrapped,
    })
}

/// Unwrap a [`KeyFile`] under `password`, returning the vault's master keys
/// (the `decryptMasterKey` facade operation).
#[instrument(level = "debug", skip(key_file, password), fields(version = key_file.version))]
pub fn decrypt_master_key(key_file: &KeyFile, password: &str) -> Result<MasterKeys, KeyFileError> {
    if key_file.version != CURRENT_VERSION {
        return Err(KeyFileError::UnsupportedVersion {
            stored: key_file.version,
            supported: CURRENT_VERSION,
        });
    }
    if key_file.key_length > MAX_KEY_LENGTH_BITS {
        return Err(KeyFileError::UnsupportedKeyLength {
            stored: key_file.key_length,
            max: MAX_KEY_LENGTH_BITS,
        });
    }

    let kek = derive_kek(
        password,
        &key_file.scrypt_salt,
        key_file.scrypt_cost_param,
        key_file.scrypt_block_size,
    )?;

    let primary = unwrap_key(&kek, &key_file.primary_master_key)?;
    let mac = unwrap_key(&kek, &key_file.hmac_master_key)?;

    let keys = MasterKeys::new(*primary, *mac)?;
    tracing::debug!("unwrapped master keys");
    Ok(keys)
}
