//! Deterministic filename and directory-id encryption.
//!
//! Filenames are encrypted with AES-SIV, which is a nonceless, deterministic
//! AEAD mode: equal plaintexts under the same keys always produce equal
//! ciphertexts, which is exactly what a case-insensitive or listing-order
//! filesystem needs from an encrypted name. Directory ids additionally get
//! hashed and sharded so that no single on-disk directory ends up with
//! enormous fan-out.

use std::sync::LazyLock;

use data_encoding::{Encoding, Specification};
use ring::digest;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::crypto::keys::{KeyAccessError, MasterKeys};

/// The alphabet backing [`ENCRYPTED_FILENAME_CODEC`]: 32 lowercase,
/// URL-safe, unpadded symbols. This is a greenfield choice (see `DESIGN.md`)
/// and is not byte-compatible with any third-party vault's filename alphabet.
pub const CANONICAL_FILENAME_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz234567";

/// The canonical, deterministic, URL-safe, case-preserving codec used to
/// render encrypted filename and directory-id ciphertext as path-safe text.
static ENCRYPTED_FILENAME_CODEC: LazyLock<Encoding> = LazyLock::new(|| {
    let mut spec = Specification::new();
    spec.symbols.push_str(CANONICAL_FILENAME_ALPHABET);
    spec.encoding()
        .expect("canonical filename alphabet is a valid 32-symbol base32 specification")
});

/// Failure modes for filename/directory-id encryption and decryption.
#[derive(Debug, Error)]
pub enum FilenameError {
    /// The AES-SIV authentication tag did not verify: wrong keys, or the
    /// ciphertext was tampered with or is simply not one this vault produced.
    #[error("filename decryption failed: authentication tag mismatch")]
    DecryptFailed,
    /// The decoded canonical-codec text was not valid for that codec (bad characters, bad padding).
    #[error("invalid encrypted filename encoding: {0}")]
    InvalidEncoding(data_encoding::DecodeError),
    /// The decrypted plaintext was not valid UTF-8.
    #[error("decrypted filename is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    /// Key material access failed at the memory-protection layer. [SYSTEM ERROR]
    #[error("key access failed: {0}")]
    KeyAccess(#[from] KeyAccessError),
}

/// Encrypt a cleartext file or directory name.
///
/// The name is normalized to Unicode NFC first, for the same cross-platform
/// reason passwords are (see [`crate::crypto::kdf::derive_kek`]).
/// Deterministic: equal `(keys, name)` pairs always produce equal output.
pub fn encrypt_filename(keys: &MasterKeys, name: &str) -> Result<String, FilenameError> {
    let normalized: String = name.nfc().collect();
    let ciphertext = siv_encrypt(keys, normalized.as_bytes())?;
    Ok(ENCRYPTED_FILENAME_CODEC.encode(&ciphertext))
}

/// Decrypt a filename previously produced by [`encrypt_filename`].
pub fn decrypt_filename(keys: &MasterKeys, encrypted_name: &str) -> Result<String, FilenameError> {
    let ciphertext = ENCRYPTED_FILENAME_CODEC
        .decode(encrypted_name.as_bytes())
        .map_err(FilenameError::InvalidEncoding)?;
    let plaintext = siv_decrypt(keys, &ciphertext)?;
    Ok(String::from_utf8(plaintext)?)
}

/// Encrypt a directory id into its sharded on-disk path, e.g. `"ab" <sep> "cdefgh..."`.
///
/// The directory id's ciphertext (not the id itself) is hashed with SHA-256
/// before encoding, so the on-disk path length doesn't grow with the id's
/// length and directory entries are spread uniformly across the two-char
/// shard prefixes.
pub fn encrypt_directory_path(
    keys: &MasterKeys,
    directory_id: &str,
    path_sep: char,
) -> Result<String, FilenameError> {
    let ciphertext = siv_encrypt(keys, directory_id.as_bytes())?;
    let digest = digest::digest(&digest::SHA256, &ciphertext);
    let encoded = ENCRYPTED_FILENAME_CODEC.encode(digest.as_ref());

    let mut shard: String = encoded.chars().take(2).collect();
    shard.push(path_sep);
    shard.push_str(&encoded[2..]);
    Ok(shard)
}

/// No associated data is bound into filename/directory-id SIV operations in
/// this format (the facade's `encryptFilename` takes only the cleartext).
const NO_AAD: [&[u8]; 1] = [&[]];

fn siv_encrypt(keys: &MasterKeys, plaintext: &[u8]) -> Result<Vec<u8>, FilenameError> {
    let mut cipher = keys.create_name_cipher()?;
    cipher
        .encrypt(NO_AAD, plaintext)
        .map_err(|_| FilenameError::DecryptFailed)
}

fn siv_decrypt(keys: &MasterKeys, ciphertext: &[u8]) -> Result<Vec<u8>, FilenameError> {
    let mut cipher = keys.create_name_cipher()?;
    cipher
        .decrypt(NO_AAD, ciphertext)
        .map_err(|_| FilenameError::DecryptFailed)
}
