//! The 104-byte authenticated file header: a random IV and content nonce,
//! an AES-CBC-encrypted "sensitive block" carrying the true plaintext length
//! and the per-file content key, and an HMAC-SHA256 binding the three
//! together.
//!
//! Every content block's MAC (see [`crate::content`]) also binds the header
//! IV, so swapping the header of one file onto another's content is caught
//! by every subsequent block MAC failing, not just the header's own MAC.

use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ring::hmac;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::keys::{KeyAccessError, MasterKeys};

/// Size of the header IV, in bytes. Doubles as the AES-CBC IV for the
/// sensitive block and as the binding value in every content block's MAC.
pub const HEADER_IV_LENGTH: usize = 16;
/// Size of the content nonce, in bytes: the fixed upper half of the AES-CTR counter block.
pub const CONTENT_NONCE_LENGTH: usize = 8;
/// Plaintext size of the sensitive block before PKCS#5 padding: 8-byte length + 32-byte content key.
const SENSITIVE_PLAINTEXT_LENGTH: usize = 8 + 32;
/// Ciphertext size of the sensitive block after PKCS#5 padding to the next AES block boundary.
const SENSITIVE_CIPHERTEXT_LENGTH: usize = 48;
/// Size of the header's trailing HMAC-SHA256 tag, in bytes.
pub const HEADER_MAC_LENGTH: usize = 32;
/// Total size of an encoded file header, in bytes.
pub const HEADER_LENGTH: usize =
    HEADER_IV_LENGTH + CONTENT_NONCE_LENGTH + SENSITIVE_CIPHERTEXT_LENGTH + HEADER_MAC_LENGTH;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// A decoded file header: the random content nonce and the per-file content key.
///
/// The content key is the key actually used for the file's AES-CTR content
/// encryption; it is distinct from the vault's primary master key, so that
/// compromising one file's content key does not expose any other file.
pub struct FileHeader {
    pub nonce: [u8; CONTENT_NONCE_LENGTH],
    pub content_key: Zeroizing<[u8; 32]>,
}

/// Failure modes for header encryption and decryption.
#[derive(Debug, Error)]
pub enum HeaderError {
    /// The input was not exactly [`HEADER_LENGTH`] bytes.
    #[error("invalid header length: expected {HEADER_LENGTH}, got {0}")]
    InvalidLength(usize),
    /// The header's HMAC did not verify: wrong key, or tampering.
    ///
    /// [INTEGRITY VIOLATION] distinct from a wrong password, which fails at
    /// `decryptMasterKey` — by the time a header is being read, the keys are
    /// already trusted, so this always means the ciphertext itself is bad.
    #[error("header authentication failed: possible tampering or wrong key")]
    MacMismatch,
    /// Key material access failed at the memory-protection layer. [SYSTEM ERROR]
    #[error("key access failed: {0}")]
    KeyAccess(#[from] KeyAccessError),
}

/// Encrypt a `(header_iv, nonce, content_key)` triple into a 104-byte file header.
///
/// `header_iv` is accepted from the caller rather than generated here because
/// it must also be bound into every content block's MAC (see
/// [`crate::content::encrypt_block`]), so the same random value has to be
/// chosen before any content block is encrypted, not after.
pub fn encrypt_header(
    keys: &MasterKeys,
    header_iv: [u8; HEADER_IV_LENGTH],
    nonce: [u8; CONTENT_NONCE_LENGTH],
    content_key: &[u8; 32],
    plaintext_length: u64,
) -> Result<[u8; HEADER_LENGTH], HeaderError> {
    let iv = header_iv;

    let mut sensitive = [0u8; SENSITIVE_CIPHERTEXT_LENGTH];
    sensitive[..8].copy_from_slice(&plaintext_length.to_be_bytes());
    sensitive[8..SENSITIVE_PLAINTEXT_LENGTH].copy_from_slice(content_key);

    let sensitive_ciphertext = keys.with_aes_key(|aes_key| {
        let encryptor = Aes256CbcEnc::new(
            generic_array::GenericArray::from_slice(aes_key),
            generic_array::GenericArray::from_slice(&iv),
        );
        encryptor
            .encrypt_padded_mut::<cbc::cipher::block_padding::Pkcs7>(
                &mut sensitive,
                SENSITIVE_PLAINTEXT_LENGTH,
            )
            .expect("sensitive block buffer is sized for its own padding")
            .to_vec()
    })?;
    debug_assert_eq!(sensitive_ciphertext.len(), SENSITIVE_CIPHERTEXT_LENGTH);

    let mut header = [0u8; HEADER_LENGTH];
    header[..HEADER_IV_LENGTH].copy_from_slice(&iv);
    header[HEADER_IV_LENGTH..HEADER_IV_LENGTH + CONTENT_NONCE_LENGTH].copy_from_slice(&nonce);
    header[HEADER_IV_LENGTH + CONTENT_NONCE_LENGTH..HEADER_LENGTH - HEADER_MAC_LENGTH]
        .copy_from_slice(&sensitive_ciphertext);

    let mac = keys.with_mac_key(|mac_key| {
        let key = hmac::Key::new(hmac::HMAC_SHA256, mac_key);
        hmac::sign(&key, &header[..HEADER_LENGTH - HEADER_MAC_LENGTH])
    })?;
    header[HEADER_LENGTH - HEADER_MAC_LENGTH..].copy_from_slice(mac.as_ref());

    tracing::trace!(plaintext_length, "encrypted file header");
    Ok(header)
}

/// Read out the 16-byte header IV without touching the sensitive block or
/// verifying the header MAC.
///
/// The header IV is not itself sensitive — it's the binding value every
/// content block's MAC also carries in the clear (see
/// [`crate::content::encrypt_block`]) — so callers that only need it to drive
/// content-block MAC verification don't need to pay for a full
/// [`decrypt_header`] (and its mandatory MAC check) first.
pub fn extract_iv(header: &[u8; HEADER_LENGTH]) -> [u8; HEADER_IV_LENGTH] {
    let mut iv = [0u8; HEADER_IV_LENGTH];
    iv.copy_from_slice(&header[..HEADER_IV_LENGTH]);
    iv
}

/// Decrypt and authenticate a 104-byte file header.
pub fn decrypt_header(keys: &MasterKeys, header: &[u8]) -> Result<(FileHeader, u64), HeaderError> {
    decrypt_header_with(keys, header, true)
}

/// Decrypt a 104-byte file header, optionally skipping the HMAC check.
///
/// `authenticate = false` is for callers that have already decided, at a
/// higher level, not to authenticate this read (matching the same flag on
/// [`crate::content::decrypt_block`]) — never use it on a path that hands
/// the resulting content key or length back to a caller as trustworthy.
#[tracing::instrument(level = "debug", skip(keys, header), fields(len = header.len(), authenticate))]
pub fn decrypt_header_with(
    keys: &MasterKeys,
    header: &[u8],
    authenticate: bool,
) -> Result<(FileHeader, u64), HeaderError> {
    if header.len() != HEADER_LENGTH {
        return Err(HeaderError::InvalidLength(header.len()));
    }

    let signed_portion = &header[..HEADER_LENGTH - HEADER_MAC_LENGTH];
    let tag = &header[HEADER_LENGTH - HEADER_MAC_LENGTH..];

    if authenticate {
        let verified = keys.with_mac_key(|mac_key| {
            let key = hmac::Key::new(hmac::HMAC_SHA256, mac_key);
            hmac::verify(&key, signed_portion, tag).is_ok()
        })?;
        if !verified {
            tracing::warn!("file header MAC mismatch");
            return Err(HeaderError::MacMismatch);
        }
    }

    let iv: [u8; HEADER_IV_LENGTH] = header[..HEADER_IV_LENGTH].try_into().unwrap();
    let mut nonce = [0u8; CONTENT_NONCE_LENGTH];
    nonce.copy_from_slice(&header[HEADER_IV_LENGTH..HEADER_IV_LENGTH + CONTENT_NONCE_LENGTH]);
    let mut sensitive_ciphertext =
        header[HEADER_IV_LENGTH + CONTENT_NONCE_LENGTH..HEADER_LENGTH - HEADER_MAC_LENGTH].to_vec();

    let sensitive_plaintext = keys.with_aes_key(|aes_key| {
        let decryptor = Aes256CbcDec::new(
            generic_array::GenericArray::from_slice(aes_key),
            generic_array::GenericArray::from_slice(&iv),
        );
        decryptor
            .decrypt_padded_mut::<cbc::cipher::block_padding::Pkcs7>(&mut sensitive_ciphertext)
            .map(<[u8]>::to_vec)
    })?;
    let sensitive_plaintext =
        sensitive_plaintext.map_err(|_| HeaderError::MacMismatch)?;

    let plaintext_length = u64::from_be_bytes(sensitive_plaintext[..8].try_into().unwrap());
    let mut content_key = Zeroizing::new([0u8; 32]);
    content_key.copy_from_slice(&sensitive_plaintext[8..SENSITIVE_PLAINTEXT_LENGTH]);

    Ok((FileHeader { nonce, content_key }, plaintext_length))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> [u8; 32] {
        [0x11u8; 32]
    }

    #[test]
    fn header_roundtrips() {
        let keys = MasterKeys::random().unwrap();
        let iv = [3u8; HEADER_IV_LENGTH];
        let nonce = [7u8; CONTENT_NONCE_LENGTH];
        let encrypted = encrypt_header(&keys, iv, nonce, &sample_key(), 123_456).unwrap();
        assert_eq!(encrypted.len(), HEADER_LENGTH);
        assert_eq!(extract_iv(&encrypted), iv);

        let (header, length) = decrypt_header(&keys, &encrypted).unwrap();
        assert_eq!(header.nonce, nonce);
        assert_eq!(*header.content_key, sample_key());
        assert_eq!(length, 123_456);
    }

    #[test]
    fn tampered_header_fails_mac() {
        let keys = MasterKeys::random().unwrap();
        let mut encrypted = encrypt_header(
            &keys,
            [4u8; HEADER_IV_LENGTH],
            [1u8; CONTENT_NONCE_LENGTH],
            &sample_key(),
            0,
        )
        .unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0xFF;

        assert!(matches!(
            decrypt_header(&keys, &encrypted),
            Err(HeaderError::MacMismatch)
        ));
    }

    #[test]
    fn wrong_key_fails_mac() {
        let keys1 = MasterKeys::random().unwrap();
        let keys2 = MasterKeys::random().unwrap();
        let encrypted = encrypt_header(
            &keys1,
            [5u8; HEADER_IV_LENGTH],
            [2u8; CONTENT_NONCE_LENGTH],
            &sample_key(),
            0,
        )
        .unwrap();
        assert!(matches!(
            decrypt_header(&keys2, &encrypted),
            Err(HeaderError::MacMismatch)
        ));
    }

    #[test]
    fn unauthenticated_decrypt_skips_mac_check() {
        let keys = MasterKeys::random().unwrap();
        let mut encrypted = encrypt_header(
            &keys,
            [6u8; HEADER_IV_LENGTH],
            [1u8; CONTENT_NONCE_LENGTH],
            &sample_key(),
            42,
        )
        .unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0xFF;

        let (_, length) = decrypt_header_with(&keys, &encrypted, false).unwrap();
        assert_eq!(length, 42);
    }

    #[test]
    fn short_header_is_rejected() {
        let keys = MasterKeys::random().unwrap();
        assert!(matches!(
            decrypt_header(&keys, &[0u8; 50]),
            Err(HeaderError::InvalidLength(50))
        ));
    }
}
