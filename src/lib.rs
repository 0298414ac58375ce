//! A client-side encrypted vault's cryptographic engine: password-based
//! master-key wrapping, deterministic filename encryption, and an
//! authenticated, chunked, randomly-seekable file-content format with a
//! parallel worker pool for bulk encrypt/decrypt.
//!
//! [`cryptor::Cryptor`] is the facade most callers want; the other modules
//! are its building blocks and are public so a caller that only needs, say,
//! the content codec for a specialized tool can use it directly.

pub mod config;
pub mod content;
pub mod crypto;
pub mod cryptor;
pub mod error;
pub mod filename;
pub mod header;
pub mod keyfile;
pub mod length_obfuscator;
pub mod worker;

pub use config::CryptorConfig;
pub use crypto::{KeyAccessError, MasterKeys};
pub use cryptor::Cryptor;
pub use error::CryptorError;
pub use keyfile::KeyFile;
