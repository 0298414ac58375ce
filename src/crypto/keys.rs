#![forbid(unsafe_code)]

use std::sync::RwLock;

use generic_array::{typenum::U64, GenericArray};
use memsafe::MemSafe;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

/// Error type for key access operations.
///
/// This error can occur when accessing protected key material, either due to
/// memory protection failures or lock poisoning (a thread panicked while holding the lock).
#[derive(Debug, Error)]
pub enum KeyAccessError {
    /// Memory protection operation failed (mlock, mprotect, etc.)
    #[error("Memory protection operation failed: {0}")]
    MemoryProtection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Lock was poisoned (a thread panicked while holding it)
    #[error("Key lock was poisoned")]
    LockPoisoned,
}

impl KeyAccessError {
    /// Create a memory protection error from any error type.
    pub fn memory_protection<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        KeyAccessError::MemoryProtection(Box::new(err))
    }
}

/// The long-lived master key pair for a vault: a 256-bit AES key used to
/// encrypt file content and the sensitive header block, and a 256-bit
/// HMAC-SHA256 key used to authenticate headers, content blocks, and
/// filenames (via AES-SIV, which consumes both keys together).
///
/// # Security
///
/// The keys are stored using the `memsafe` crate's `MemSafe` type, which provides:
/// - **Memory locking**: keys are pinned in RAM via `mlock`, preventing swap to disk
/// - **Access control**: memory is protected with `mprotect(PROT_NONE)` when not in use
/// - **Dump exclusion**: on Linux, `MADV_DONTDUMP` excludes keys from core dumps
/// - **Zeroization**: memory is securely zeroed when the key is dropped
///
/// Access to key material is provided through scoped access methods that
/// temporarily elevate memory permissions to read the key, then immediately
/// revoke access when the operation completes. Fields are private for this
/// reason; there is no direct accessor for either 32-byte key.
///
/// # Thread Safety
///
/// `MasterKeys` is thread-safe (`Send + Sync`, see [`thread_safety`](super::thread_safety))
/// and can be shared across worker threads using `Arc<MasterKeys>`. If a thread
/// panics while holding the lock, the key becomes inaccessible (lock poisoning)
/// as a safety measure rather than risking a torn read.
#[derive(Debug)]
pub struct MasterKeys {
    aes_master_key: RwLock<MemSafe<[u8; 32]>>,
    mac_master_key: RwLock<MemSafe<[u8; 32]>>,
}

impl Clone for MasterKeys {
    /// # Panics
    ///
    /// Panics if memory protection fails. For fallible cloning, use `try_clone()`.
    fn clone(&self) -> Self {
        self.try_clone()
            .expect("failed to clone MasterKeys: memory protection error")
    }
}

impl MasterKeys {
    /// Try to clone the master key pair, returning an error on failure instead of panicking.
    pub fn try_clone(&self) -> Result<Self, KeyAccessError> {
        let aes_key = {
            let mut lock = self
                .aes_master_key
                .write()
                .map_err(|_| KeyAccessError::LockPoisoned)?;
            let guard = lock.read().map_err(KeyAccessError::memory_protection)?;
            *guard
        };
        let mac_key = {
            let mut lock = self
                .mac_master_key
                .write()
                .map_err(|_| KeyAccessError::LockPoisoned)?;
            let guard = lock.read().map_err(KeyAccessError::memory_protection)?;
            *guard
        };
        Self::new(aes_key, mac_key)
    }

    /// Generate a fresh random master key pair using a cryptographically secure RNG.
    ///
    /// This is the `Fresh` state of the Cryptor Facade: a brand-new vault's keys,
    /// ready to be persisted with [`crate::keyfile::encrypt_master_key`].
    pub fn random() -> Result<Self, KeyAccessError> {
        let mut aes_master_key = [0u8; 32];
        let mut mac_master_key = [0u8; 32];
        rand::rng().fill_bytes(&mut aes_master_key);
        rand::rng().fill_bytes(&mut mac_master_key);
        let keys = Self::new(aes_master_key, mac_master_key);
        aes_master_key.zeroize();
        mac_master_key.zeroize();
        keys
    }

    /// Build a master key pair from raw key material.
    ///
    /// The caller is responsible for zeroizing the input arrays; `MasterKeys`
    /// copies them into protected memory and does not take ownership of the originals.
    pub fn new(aes_key: [u8; 32], mac_key: [u8; 32]) -> Result<Self, KeyAccessError> {
        Ok(MasterKeys {
            aes_master_key: RwLock::new(
                MemSafe::new(aes_key).map_err(KeyAccessError::memory_protection)?,
            ),
            mac_master_key: RwLock::new(
                MemSafe::new(mac_key).map_err(KeyAccessError::memory_protection)?,
            ),
        })
    }

    /// Run `f` with access to the raw 512-bit combined key material (AES || MAC),
    /// zeroizing the combined buffer as soon as `f` returns.
    pub fn with_raw_key<F, R>(&self, f: F) -> Result<R, KeyAccessError>
    where
        F: FnOnce(&[u8]) -> R,
    {
        struct ZeroOnDrop([u8; 64]);
        impl Drop for ZeroOnDrop {
            fn drop(&mut self) {
                self.0.zeroize();
            }
        }

        let mut key = ZeroOnDrop([0u8; 64]);

        {
            let mut lock = self
                .aes_master_key
                .write()
                .map_err(|_| KeyAccessError::LockPoisoned)?;
            let guard = lock.read().map_err(KeyAccessError::memory_protection)?;
            key.0[..32].copy_from_slice(&*guard);
        }
        {
            let mut lock = self
                .mac_master_key
                .write()
                .map_err(|_| KeyAccessError::LockPoisoned)?;
            let guard = lock.read().map_err(KeyAccessError::memory_protection)?;
            key.0[32..].copy_from_slice(&*guard);
        }

        Ok(f(&key.0))
    }

    /// Run `f` with access to just the AES encryption key (content and header encryption).
    pub fn with_aes_key<F, R>(&self, f: F) -> Result<R, KeyAccessError>
    where
        F: FnOnce(&[u8; 32]) -> R,
    {
        let mut lock = self
            .aes_master_key
            .write()
            .map_err(|_| KeyAccessError::LockPoisoned)?;
        let guard = lock.read().map_err(KeyAccessError::memory_protection)?;
        Ok(f(&guard))
    }

    /// Run `f` with access to just the MAC key (header and content block authentication).
    pub fn with_mac_key<F, R>(&self, f: F) -> Result<R, KeyAccessError>
    where
        F: FnOnce(&[u8; 32]) -> R,
    {
        let mut lock = self
            .mac_master_key
            .write()
            .map_err(|_| KeyAccessError::LockPoisoned)?;
        let guard = lock.read().map_err(KeyAccessError::memory_protection)?;
        Ok(f(&guard))
    }

    /// Run `f` with access to both keys in AES-SIV key order (MAC || AES), as
    /// required by `aes-siv`'s deterministic-AEAD key layout.
    pub fn with_siv_key<F, R>(&self, f: F) -> Result<R, KeyAccessError>
    where
        F: FnOnce(&GenericArray<u8, U64>) -> R,
    {
        struct ZeroizeOnDrop(GenericArray<u8, U64>);
        impl Drop for ZeroizeOnDrop {
            fn drop(&mut self) {
                self.0.zeroize();
            }
        }

        let mut key = ZeroizeOnDrop(GenericArray::<u8, U64>::default());

        {
            let mut lock = self
                .mac_master_key
                .write()
                .map_err(|_| KeyAccessError::LockPoisoned)?;
            let guard = lock.read().map_err(KeyAccessError::memory_protection)?;
            key.0[..32].copy_from_slice(&*guard);
        }
        {
            let mut lock = self
                .aes_master_key
                .write()
                .map_err(|_| KeyAccessError::LockPoisoned)?;
            let guard = lock.read().map_err(KeyAccessError::memory_protection)?;
            key.0[32..].copy_from_slice(&*guard);
        }

        Ok(f(&key.0))
    }

    /// Build an AES-SIV cipher for filename and directory-id encryption, using
    /// the correct (MAC || AES) key order.
    pub fn create_name_cipher(&self) -> Result<aes_siv::siv::Aes256Siv, KeyAccessError> {
        self.with_siv_key(|key| {
            use aes_siv::KeyInit;
            aes_siv::siv::Aes256Siv::new(key)
        })
    }
}
