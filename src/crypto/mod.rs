//! Cryptographic primitives: master key lifecycle, password-based key
//! derivation, and RFC 3394 key-wrap. Higher-level wire formats (filenames,
//! file headers, content blocks) live in their own top-level modules and are
//! built on top of what's here.

pub mod kdf;
pub mod key_wrap;
pub mod keys;
mod thread_safety;

pub use kdf::{derive_kek, KeyDerivationError, KEK_LENGTH};
pub use key_wrap::{unwrap_key, wrap_key, KeyWrapError, WRAPPED_KEY_LENGTH};
pub use keys::{KeyAccessError, MasterKeys};
