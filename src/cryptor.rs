//! The `Cryptor` facade: the single entry point that ties master-key
//! lifecycle, filename encryption, and chunked file-content encryption
//! together behind one state machine and one error type.
//!
//! Grounded in the same shape this codebase's lineage uses for its own
//! top-level vault operations struct: a small set of public methods backed
//! by private helpers in the lower modules, a single `RwLock`-guarded state
//! rather than scattered `Option`s, and an explicit `destroy` that makes
//! later use a hard error instead of a silent no-op.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, RwLock};

use rand::RngCore;

use crate::config::CryptorConfig;
use crate::content::{
    block_index_for_offset, decrypt_block, encrypt_block, encrypted_offset_for_block,
    offset_within_block,
};
use crate::crypto::keys::MasterKeys;
use crate::error::CryptorError;
use crate::filename::{decrypt_filename, encrypt_directory_path, encrypt_filename};
use crate::header::{
    decrypt_header_with, encrypt_header, extract_iv, CONTENT_NONCE_LENGTH,
    HEADER_IV_LENGTH, HEADER_LENGTH,
};
use crate::keyfile::{decrypt_master_key, encrypt_master_key, KeyFile};
use crate::length_obfuscator::LengthObfuscatingReader;
use crate::worker::{self, Batch, ProcessedBatch};

/// The facade's lifecycle state.
///
/// `Fresh` and `Loaded` both carry usable keys and behave identically for
/// every operation below; the distinction exists only so callers (and a
/// future GUI layer) can tell a brand-new vault apart from one opened from
/// an existing key file, e.g. to decide whether to prompt for a password
/// confirmation.
enum State {
    Fresh(Arc<MasterKeys>),
    Loaded(Arc<MasterKeys>),
    Destroyed,
}

impl State {
    fn keys(&self) -> Result<Arc<MasterKeys>, CryptorError> {
        match self {
            State::Fresh(keys) | State::Loaded(keys) => Ok(Arc::clone(keys)),
            State::Destroyed => Err(CryptorError::Destroyed),
        }
    }
}

/// The vault's cryptographic engine: master-key lifecycle, deterministic
/// filename encryption, and authenticated, chunked, randomly-seekable file
/// content encryption.
///
/// A `Cryptor` holds no filesystem state of its own — callers supply
/// `Read`/`Write`/`Seek` handles for each operation — so the same instance
/// can be shared (via `Arc`) across as many concurrent file operations as
/// the caller likes; `encrypt_file`/`decrypt_file` each run their own
/// internal worker pool per call.
pub struct Cryptor {
    state: RwLock<State>,
    config: CryptorConfig,
}

impl Cryptor {
    /// Start in the `Fresh` state with a newly generated master key pair,
    /// ready to be persisted with [`Self::encrypt_master_key`].
    pub fn new(config: CryptorConfig) -> Result<Self, CryptorError> {
        let keys = MasterKeys::random()?;
        Ok(Cryptor {
            state: RwLock::new(State::Fresh(Arc::new(keys))),
            config,
        })
    }

    /// Open an existing vault: unwrap `key_file` under `password` and enter
    /// the `Loaded` state.
    pub fn open(key_file: &KeyFile, password: &str, config: CryptorConfig) -> Result<Self, CryptorError> {
        let keys = decrypt_master_key(key_file, password)?;
        Ok(Cryptor {
            state: RwLock::new(State::Loaded(Arc::new(keys))),
            config,
        })
    }

    fn keys(&self) -> Result<Arc<MasterKeys>, CryptorError> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(
            *self.state.read().unwrap_or_else(|e| e.into_inner()),
            State::Destroyed
        )
    }

    /// Irrecoverably zeroize the master keys and move to `Destroyed`.
    /// Idempotent: destroying an already-destroyed `Cryptor` is a no-op.
    pub fn destroy(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        *state = State::Destroyed;
    }

    /// Wrap the current master keys under `password` (the `encryptMasterKey`
    /// operation), using the scrypt work factor from this `Cryptor`'s config.
    pub fn encrypt_master_key(&self, password: &str) -> Result<KeyFile, CryptorError> {
        let keys = self.keys()?;
        Ok(encrypt_master_key(
            &keys,
            password,
            self.config.scrypt_cost_param,
            self.config.scrypt_block_size,
        )?)
    }

    pub fn encrypt_filename(&self, name: &str) -> Result<String, CryptorError> {
        let keys = self.keys()?;
        Ok(encrypt_filename(&keys, name)?)
    }

    pub fn decrypt_filename(&self, encrypted_name: &str) -> Result<String, CryptorError> {
        let keys = self.keys()?;
        Ok(decrypt_filename(&keys, encrypted_name)?)
    }

    pub fn encrypt_directory_path(&self, directory_id: &str, path_sep: char) -> Result<String, CryptorError> {
        let keys = self.keys()?;
        Ok(encrypt_directory_path(&keys, directory_id, path_sep)?)
    }

    /// Encrypt `plaintext` into `sink`, writing a 104-byte header followed by
    /// the chunked, authenticated content stream (`encryptFile`).
    ///
    /// Inputs shorter than [`CryptorConfig::min_padded_length`] are padded
    /// with random filler before being split into blocks; the header records
    /// the real length, so [`Self::decrypt_file`] truncates the padding away.
    /// The content stream is produced by a pool of
    /// [`CryptorConfig::resolved_worker_count`] threads, but committed to
    /// `sink` in strict block order.
    pub fn encrypt_file<R, W>(&self, plaintext: R, sink: W) -> Result<W, CryptorError>
    where
        R: Read + Send + 'static,
        W: Write + Seek + Send + 'static,
    {
        let keys = self.keys()?;

        let mut header_iv = [0u8; HEADER_IV_LENGTH];
        let mut nonce = [0u8; CONTENT_NONCE_LENGTH];
        let mut content_key = [0u8; 32];
        rand::rng().fill_bytes(&mut header_iv);
        rand::rng().fill_bytes(&mut nonce);
        rand::rng().fill_bytes(&mut content_key);

        let source = Arc::new(Mutex::new(LengthObfuscatingReader::new(
            plaintext,
            self.config.min_padded_length,
        )));
        let block_size = self.config.content_block_size;

        let mut batch_size = 0usize;
        let mut next_block_index = 0u64;
        let source_for_producer = Arc::clone(&source);
        let next_batch = move || -> Result<Option<Batch>, worker::WorkerError> {
            batch_size = worker::next_batch_size(batch_size);
            let mut blocks = Vec::with_capacity(batch_size);
            {
                let mut reader = source_for_producer.lock().unwrap_or_else(|e| e.into_inner());
                for _ in 0..batch_size {
                    let mut buf = vec![0u8; block_size];
                    let mut filled = 0;
                    while filled < block_size {
                        let n = reader.read(&mut buf[filled..])?;
                        if n == 0 {
                            break;
                        }
                        filled += n;
                    }
                    if filled == 0 {
                        break;
                    }
                    buf.truncate(filled);
                    blocks.push(buf);
                }
            }
            if blocks.is_empty() {
                return Ok(None);
            }
            let batch = Batch { first_block_index: next_block_index, blocks };
            next_block_index += batch.blocks.len() as u64;
            Ok(Some(batch))
        };

        let transform_keys = Arc::clone(&keys);
        let transform = move |batch: &Batch| -> Result<ProcessedBatch, worker::WorkerError> {
            let mac_key = transform_keys
                .with_mac_key(|k| *k)
                .map_err(|e| worker::WorkerError::Io(e.to_string()))?;
            let mut output = Vec::new();
            for (i, plaintext) in batch.blocks.iter().enumerate() {
                let block_index = batch.first_block_index + i as u64;
                let encrypted = encrypt_block(&header_iv, &nonce, &content_key, &mac_key, block_index, plaintext);
                output.extend_from_slice(&encrypted);
            }
            Ok(ProcessedBatch {
                first_block_index: batch.first_block_index,
                block_count: batch.blocks.len() as u64,
                output,
            })
        };

        let sink = Arc::new(Mutex::new(sink));
        let commit_sink = Arc::clone(&sink);
        let commit = move |first_block_index: u64, bytes: &[u8]| -> io::Result<()> {
            let mut sink = commit_sink.lock().unwrap_or_else(|e| e.into_inner());
            sink.seek(SeekFrom::Start(
                HEADER_LENGTH as u64 + encrypted_offset_for_block(first_block_index),
            ))?;
            sink.write_all(bytes)
        };

        worker::run(self.config.resolved_worker_count(), next_batch, transform, commit)?;

        let real_length = source
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .real_input_length();
        let header = encrypt_header(&keys, header_iv, nonce, &content_key, real_length)?;

        let mut sink = Arc::try_unwrap(sink)
            .unwrap_or_else(|_| panic!("worker pool finished, sink has no other owners"))
            .into_inner()
            .unwrap_or_else(|e| e.into_inner());
        sink.seek(SeekFrom::Start(0))?;
        sink.write_all(&header)?;
        Ok(sink)
    }

    /// Decrypt a header-prefixed ciphertext stream read from `source` into
    /// `sink` (`decryptFile`). When `authenticate` is `false`, header and
    /// content MACs are not checked — only ever use this for diagnostics on
    /// data already known to be untrusted.
    pub fn decrypt_file<R, W>(&self, mut source: R, sink: W, authenticate: bool) -> Result<W, CryptorError>
    where
        R: Read + Send + 'static,
        W: Write + Seek + Send + 'static,
    {
        let keys = self.keys()?;

        let mut header_bytes = [0u8; HEADER_LENGTH];
        source.read_exact(&mut header_bytes)?;
        let (file_header, plaintext_length) = decrypt_header_with(&keys, &header_bytes, authenticate)?;
        let header_iv = extract_iv(&header_bytes);

        let source = Arc::new(Mutex::new(source));
        let block_size = self.config.content_block_size;
        let on_disk_block = block_size + crate::content::BLOCK_MAC_LENGTH;

        let mut batch_size = 0usize;
        let mut next_block_index = 0u64;
        let source_for_producer = Arc::clone(&source);
        let next_batch = move || -> Result<Option<Batch>, worker::WorkerError> {
            batch_size = worker::next_batch_size(batch_size);
            let mut blocks = Vec::with_capacity(batch_size);
            {
                let mut reader = source_for_producer.lock().unwrap_or_else(|e| e.into_inner());
                for _ in 0..batch_size {
                    let mut buf = vec![0u8; on_disk_block];
                    let mut filled = 0;
                    while filled < on_disk_block {
                        let n = reader.read(&mut buf[filled..])?;
                        if n == 0 {
                            break;
                        }
                        filled += n;
                    }
                    if filled == 0 {
                        break;
                    }
                    buf.truncate(filled);
                    blocks.push(buf);
                }
            }
            if blocks.is_empty() {
                return Ok(None);
            }
            let batch = Batch { first_block_index: next_block_index, blocks };
            next_block_index += batch.blocks.len() as u64;
            Ok(Some(batch))
        };

        let nonce = file_header.nonce;
        let content_key = *file_header.content_key;
        let transform_keys = Arc::clone(&keys);
        let transform = move |batch: &Batch| -> Result<ProcessedBatch, worker::WorkerError> {
            let mac_key = transform_keys
                .with_mac_key(|k| *k)
                .map_err(|e| worker::WorkerError::Io(e.to_string()))?;
            let mut output = Vec::new();
            for (i, block) in batch.blocks.iter().enumerate() {
                let block_index = batch.first_block_index + i as u64;
                let plaintext = decrypt_block(
                    &header_iv,
                    &nonce,
                    &content_key,
                    &mac_key,
                    block_index,
                    block,
                    authenticate,
                )
                .map_err(|e| worker::WorkerError::Processing { block_index, message: e.to_string() })?;
                output.extend_from_slice(&plaintext);
            }
            Ok(ProcessedBatch {
                first_block_index: batch.first_block_index,
                block_count: batch.blocks.len() as u64,
                output,
            })
        };

        let sink = Arc::new(Mutex::new(sink));
        let commit_sink = Arc::clone(&sink);
        let block_size_for_commit = block_size;
        let commit = move |first_block_index: u64, bytes: &[u8]| -> io::Result<()> {
            let start = first_block_index * block_size_for_commit;
            if start >= plaintext_length {
                return Ok(());
            }
            let keep = bytes.len().min((plaintext_length - start) as usize);
            if keep == 0 {
                return Ok(());
            }
            let mut sink = commit_sink.lock().unwrap_or_else(|e| e.into_inner());
            sink.seek(SeekFrom::Start(start))?;
            sink.write_all(&bytes[..keep])
        };

        worker::run(self.config.resolved_worker_count(), next_batch, transform, commit)?;

        let sink = Arc::try_unwrap(sink)
            .unwrap_or_else(|_| panic!("worker pool finished, sink has no other owners"))
            .into_inner()
            .unwrap_or_else(|e| e.into_inner());
        Ok(sink)
    }

    /// Decrypt only the plaintext byte range `[start, end)`, writing it to
    /// `sink`. Unlike [`Self::decrypt_file`], this runs single-threaded: a
    /// bounded range rarely spans enough blocks for a worker pool to pay for
    /// its own setup, and the caller-visible semantics (random access from a
    /// filesystem read call) favor low per-call latency over throughput.
    pub fn decrypt_range<R, W>(
        &self,
        mut source: R,
        mut sink: W,
        start: u64,
        end: u64,
    ) -> Result<(), CryptorError>
    where
        R: Read + Seek,
        W: Write,
    {
        let keys = self.keys()?;
        if end <= start {
            return Ok(());
        }

        let mut header_bytes = [0u8; HEADER_LENGTH];
        source.seek(SeekFrom::Start(0))?;
        source.read_exact(&mut header_bytes)?;
        let (file_header, plaintext_length) = decrypt_header_with(&keys, &header_bytes, true)?;
        let header_iv = extract_iv(&header_bytes);
        let end = end.min(plaintext_length);
        if end <= start {
            return Ok(());
        }

        let mac_key = keys.with_mac_key(|k| *k)?;
        let block_size = self.config.content_block_size as u64;
        let on_disk_block = block_size + crate::content::BLOCK_MAC_LENGTH as u64;

        let first_block = block_index_for_offset(start);
        let last_block = block_index_for_offset(end - 1);

        for block_index in first_block..=last_block {
            source.seek(SeekFrom::Start(
                HEADER_LENGTH as u64 + encrypted_offset_for_block(block_index),
            ))?;
            let mut block = vec![0u8; on_disk_block as usize];
            let mut filled = 0;
            while filled < block.len() {
                let n = source.read(&mut block[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            block.truncate(filled);

            let plaintext = decrypt_block(
                &header_iv,
                &file_header.nonce,
                &file_header.content_key,
                &mac_key,
                block_index,
                &block,
                true,
            )?;

            let slice_start = if block_index == first_block {
                offset_within_block(start)
            } else {
                0
            };
            let slice_end = if block_index == last_block {
                offset_within_block(end.saturating_sub(1)) + 1
            } else {
                plaintext.len()
            };
            sink.write_all(&plaintext[slice_start..slice_end.min(plaintext.len())])?;
        }
        Ok(())
    }

    /// Read just the header and report the file's true plaintext length
    /// (post length-obfuscation-removal), without decrypting any content.
    ///
    /// The header MAC is verified like any other header read — a cheap probe
    /// is not a license to hand back an unauthenticated length. Returns `Ok(None)`
    /// if `source` is shorter than a full header, per `decryptedContentLength`'s
    /// "unknown" outcome; a present-but-tampered header still fails with
    /// [`CryptorError::MacAuthFailed`].
    pub fn decrypted_content_length<R: Read>(&self, mut source: R) -> Result<Option<u64>, CryptorError> {
        let keys = self.keys()?;
        let mut header_bytes = [0u8; HEADER_LENGTH];
        let mut filled = 0;
        while filled < HEADER_LENGTH {
            let n = source.read(&mut header_bytes[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled < HEADER_LENGTH {
            return Ok(None);
        }
        let (_header, plaintext_length) = decrypt_header_with(&keys, &header_bytes, true)?;
        Ok(Some(plaintext_length))
    }
}
