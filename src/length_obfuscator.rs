//! Input-side padding that rounds a tiny plaintext up to a minimum length
//! before it reaches the content codec, so a vault's ciphertext sizes don't
//! trivially reveal that a file is, say, 11 bytes long.
//!
//! The padding lives only on the wire: the true length is recorded in the
//! file header (see [`crate::header`]) and a reader discards anything past
//! it, so this never leaks into the plaintext a caller gets back.

use std::io::{self, Read};

use rand::RngCore;

/// Wraps a plaintext [`Read`] so that, once it reaches EOF, the stream keeps
/// producing randomized filler bytes up to `min_padded_length` total bytes
/// (if the real input was shorter).
///
/// [`Self::real_input_length`] is only meaningful once the inner reader has
/// reported EOF — calling it earlier reports bytes consumed so far, not the
/// final real length.
pub struct LengthObfuscatingReader<R> {
    inner: R,
    min_padded_length: u64,
    bytes_read: u64,
    pad_remaining: Option<u64>,
}

impl<R: Read> LengthObfuscatingReader<R> {
    pub fn new(inner: R, min_padded_length: u64) -> Self {
        LengthObfuscatingReader {
            inner,
            min_padded_length,
            bytes_read: 0,
            pad_remaining: None,
        }
    }

    /// The real number of plaintext bytes read from the wrapped reader,
    /// i.e. the length that belongs in the file header.
    pub fn real_input_length(&self) -> u64 {
        self.bytes_read
    }
}

impl<R: Read> Read for LengthObfuscatingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pad_remaining.is_none() {
            let n = self.inner.read(buf)?;
            if n > 0 {
                self.bytes_read += n as u64;
                return Ok(n);
            }
            self.pad_remaining = Some(self.min_padded_length.saturating_sub(self.bytes_read));
        }

        let remaining = self.pad_remaining.expect("set above when inner reader is exhausted");
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let n = buf.len().min(remaining as usize);
        rand::rng().fill_bytes(&mut buf[..n]);
        self.pad_remaining = Some(remaining - n as u64);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_to_end(mut r: impl Read) -> Vec<u8> {
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn short_input_is_padded_to_threshold() {
        let mut reader = LengthObfuscatingReader::new(Cursor::new(b"hi".to_vec()), 16);
        let out = read_to_end(&mut reader);
        assert_eq!(out.len(), 16);
        assert_eq!(&out[..2], b"hi");
        assert_eq!(reader.real_input_length(), 2);
    }

    #[test]
    fn input_at_or_above_threshold_is_not_padded() {
        let data = vec![0x42u8; 32];
        let mut reader = LengthObfuscatingReader::new(Cursor::new(data.clone()), 16);
        let out = read_to_end(&mut reader);
        assert_eq!(out, data);
        assert_eq!(reader.real_input_length(), 32);
    }

    #[test]
    fn empty_input_is_padded_fully() {
        let mut reader = LengthObfuscatingReader::new(Cursor::new(Vec::<u8>::new()), 16);
        let out = read_to_end(&mut reader);
        assert_eq!(out.len(), 16);
        assert_eq!(reader.real_input_length(), 0);
    }

    #[test]
    fn real_length_tracks_bytes_actually_read_from_inner() {
        let mut reader = LengthObfuscatingReader::new(Cursor::new(vec![1u8; 5]), 64);
        let mut small_buf = [0u8; 2];
        let n1 = reader.read(&mut small_buf).unwrap();
        assert_eq!(n1, 2);
        assert_eq!(reader.real_input_length(), 2);
    }
}
