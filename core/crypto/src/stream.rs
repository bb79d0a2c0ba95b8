//! Chunked encryption for file contents.
//!
//! Each chunk is independently authenticated and bound to its position,
//! so reordering, truncation or extension of the stream is detected.

use std::io::{Read, Write};

use crate::aead::{decrypt, encrypt, NONCE_SIZE, TAG_SIZE};
use crate::keys::KEY_LENGTH;
use phantomvault_common::{Error, Result};

/// Default chunk size for streaming encryption (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Header size: version (1) + chunk_size (4) + total_chunks (8).
pub const HEADER_SIZE: usize = 13;

/// Stream encryption version.
pub const STREAM_VERSION: u8 = 2;

/// Encrypting stream that processes data in chunks.
pub struct EncryptingStream<'a> {
    key: &'a [u8],
    chunk_size: usize,
}

impl<'a> EncryptingStream<'a> {
    /// Create a new encrypting stream.
    ///
    /// # Errors
    /// - Returns error if key length is invalid
    pub fn new(key: &'a [u8]) -> Result<Self> {
        if key.len() != KEY_LENGTH {
            return Err(Error::Crypto("Invalid key length".to_string()));
        }
        Ok(Self {
            key,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Set custom chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Encrypt data from reader and write to writer.
    ///
    /// # Format
    /// - Header: version (1 byte) + chunk_size (4 bytes) + total_chunks (8 bytes)
    /// - Chunks: length (4 bytes) + [nonce + ciphertext + tag] for each chunk
    ///
    /// Returns the number of plaintext bytes consumed.
    pub fn encrypt_stream<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        let mut buffer = vec![0u8; self.chunk_size];
        let mut chunks = Vec::new();
        let mut total_bytes = 0u64;

        loop {
            let bytes_read = read_full(&mut reader, &mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            total_bytes += bytes_read as u64;
            chunks.push(buffer[..bytes_read].to_vec());
        }

        writer.write_all(&[STREAM_VERSION])?;
        writer.write_all(&(self.chunk_size as u32).to_le_bytes())?;
        writer.write_all(&(chunks.len() as u64).to_le_bytes())?;

        for (i, chunk) in chunks.iter().enumerate() {
            let last = i + 1 == chunks.len();
            let mut framed = Vec::with_capacity(chunk.len() + 9);
            framed.extend_from_slice(&(i as u64).to_le_bytes());
            framed.push(last as u8);
            framed.extend_from_slice(chunk);

            let encrypted = encrypt(self.key, &framed)?;
            writer.write_all(&(encrypted.len() as u32).to_le_bytes())?;
            writer.write_all(&encrypted)?;
        }

        writer.flush()?;
        Ok(total_bytes)
    }
}

/// Decrypting stream that processes encrypted chunks.
pub struct DecryptingStream<'a> {
    key: &'a [u8],
}

impl<'a> DecryptingStream<'a> {
    /// Create a new decrypting stream.
    ///
    /// # Errors
    /// - Returns error if key length is invalid
    pub fn new(key: &'a [u8]) -> Result<Self> {
        if key.len() != KEY_LENGTH {
            return Err(Error::Crypto("Invalid key length".to_string()));
        }
        Ok(Self { key })
    }

    /// Decrypt data from reader and write to writer.
    ///
    /// # Errors
    /// - I/O errors
    /// - Invalid format
    /// - Authentication failure (tampered data or wrong key)
    pub fn decrypt_stream<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != STREAM_VERSION {
            return Err(Error::Crypto(format!(
                "Unsupported stream version: {}",
                version[0]
            )));
        }

        let mut chunk_size_bytes = [0u8; 4];
        reader.read_exact(&mut chunk_size_bytes)?;
        let chunk_size = u32::from_le_bytes(chunk_size_bytes) as usize;
        let max_frame = NONCE_SIZE + 9 + chunk_size + TAG_SIZE;

        let mut total_chunks_bytes = [0u8; 8];
        reader.read_exact(&mut total_chunks_bytes)?;
        let total_chunks = u64::from_le_bytes(total_chunks_bytes);

        let mut total_bytes = 0u64;
        for i in 0..total_chunks {
            let mut len_bytes = [0u8; 4];
            reader.read_exact(&mut len_bytes)?;
            let frame_len = u32::from_le_bytes(len_bytes) as usize;
            if frame_len > max_frame || frame_len < NONCE_SIZE + TAG_SIZE {
                return Err(Error::Crypto("Invalid chunk length".to_string()));
            }

            let mut frame = vec![0u8; frame_len];
            reader.read_exact(&mut frame)?;
            let decrypted = decrypt(self.key, &frame)?;

            if decrypted.len() < 9 {
                return Err(Error::Crypto("Invalid chunk format".to_string()));
            }
            let mut index_bytes = [0u8; 8];
            index_bytes.copy_from_slice(&decrypted[..8]);
            if u64::from_le_bytes(index_bytes) != i {
                return Err(Error::Crypto("Chunk order mismatch".to_string()));
            }
            let is_last = decrypted[8] == 1;
            if is_last != (i + 1 == total_chunks) {
                return Err(Error::Crypto("Stream truncated or extended".to_string()));
            }

            let plaintext = &decrypted[9..];
            writer.write_all(plaintext)?;
            total_bytes += plaintext.len() as u64;
        }

        writer.flush()?;
        Ok(total_bytes)
    }
}

/// Fill `buf` as far as the reader allows.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Encrypt a complete byte slice using streaming encryption.
pub fn encrypt_bytes(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let stream = EncryptingStream::new(key)?;
    let mut output = Vec::new();
    stream.encrypt_stream(data, &mut output)?;
    Ok(output)
}

/// Decrypt a complete byte slice that was encrypted with streaming encryption.
pub fn decrypt_bytes(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let stream = DecryptingStream::new(key)?;
    let mut output = Vec::new();
    stream.decrypt_stream(data, &mut output)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_encrypt_decrypt_roundtrip() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Hello, streaming encryption!";

        let encrypted = encrypt_bytes(&key, plaintext).unwrap();
        let decrypted = decrypt_bytes(&key, &encrypted).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_stream_multiple_chunks() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = vec![0xAB; DEFAULT_CHUNK_SIZE * 3 + 1000];

        let encrypted = encrypt_bytes(&key, &plaintext).unwrap();
        let decrypted = decrypt_bytes(&key, &encrypted).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_stream_empty_data() {
        let key = [42u8; KEY_LENGTH];

        let encrypted = encrypt_bytes(&key, b"").unwrap();
        assert_eq!(encrypted.len(), HEADER_SIZE);
        assert!(decrypt_bytes(&key, &encrypted).unwrap().is_empty());
    }

    #[test]
    fn test_stream_custom_chunk_size() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Custom chunk size test data that is longer than the chunk";

        let stream = EncryptingStream::new(&key).unwrap().with_chunk_size(16);
        let mut encrypted = Vec::new();
        stream.encrypt_stream(&plaintext[..], &mut encrypted).unwrap();

        let decrypted = decrypt_bytes(&key, &encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_stream_wrong_key_fails() {
        let encrypted = encrypt_bytes(&[1u8; KEY_LENGTH], b"Secret streaming data").unwrap();
        assert!(decrypt_bytes(&[2u8; KEY_LENGTH], &encrypted).is_err());
    }

    #[test]
    fn test_stream_truncation_detected() {
        let key = [42u8; KEY_LENGTH];
        let stream = EncryptingStream::new(&key).unwrap().with_chunk_size(8);
        let mut encrypted = Vec::new();
        stream.encrypt_stream(&b"0123456789abcdef0123"[..], &mut encrypted).unwrap();

        // Claim one chunk fewer than was written.
        encrypted[5..13].copy_from_slice(&2u64.to_le_bytes());
        assert!(decrypt_bytes(&key, &encrypted).is_err());
    }

    #[test]
    fn test_stream_header_format() {
        let key = [42u8; KEY_LENGTH];
        let encrypted = encrypt_bytes(&key, b"Test").unwrap();

        assert_eq!(encrypted[0], STREAM_VERSION);
        let chunk_size = u32::from_le_bytes(encrypted[1..5].try_into().unwrap());
        assert_eq!(chunk_size as usize, DEFAULT_CHUNK_SIZE);
        let total_chunks = u64::from_le_bytes(encrypted[5..13].try_into().unwrap());
        assert_eq!(total_chunks, 1);
    }
}
