//! AES-256-CFB stream composition.
//!
//! Blobs are encrypted with AES-256 in full-block (128-bit) cipher feedback
//! mode so ciphertext can be produced and consumed as a byte stream without
//! buffering the whole payload.
//!
//! The IV is never stored. It is derived from the plaintext checksum and
//! the owner id:
//!
//! ```text
//! IV = SHA256(checksum_bytes || owner_id.to_le_bytes())[..16]
//! ```
//!
//! SECURITY NOTE: CFB provides no authentication. Reading with the wrong
//! key yields garbage rather than an error.

use std::io::{self, Read, Write};

use aes::Aes256;
use cfb_mode::cipher::KeyIvInit;
use cfb_mode::{BufDecryptor, BufEncryptor};
use sha2::{Digest, Sha256};

use crate::backend::BlobWriter;
use crate::owner::{OwnerId, OwnerKey};

/// AES block size, and therefore IV size, in bytes.
pub const IV_LEN: usize = 16;

/// Derive the IV for a blob from its binary checksum and owner id.
pub fn derive_iv(checksum: &[u8], owner_id: OwnerId) -> [u8; IV_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(checksum);
    hasher.update(owner_id.to_le_bytes());
    let digest = hasher.finalize();

    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&digest[..IV_LEN]);
    iv
}

/// Encrypts everything written to it before passing it to the inner writer.
pub struct EncryptingWriter<W> {
    inner: W,
    cipher: BufEncryptor<Aes256>,
    scratch: Vec<u8>,
}

impl<W: Write> EncryptingWriter<W> {
    pub fn new(inner: W, key: &OwnerKey, iv: &[u8; IV_LEN]) -> Self {
        Self {
            inner,
            cipher: BufEncryptor::new(key.as_bytes().into(), iv.into()),
            scratch: Vec::new(),
        }
    }

    /// Recover the inner writer. Any bytes already written are encrypted.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for EncryptingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        self.cipher.encrypt(&mut self.scratch);
        // A partial write would desynchronize the feedback register, so the
        // whole chunk must land.
        self.inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl BlobWriter for EncryptingWriter<Box<dyn BlobWriter>> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        self.into_inner().finish()
    }
}

/// Decrypts bytes as they are read from the inner reader.
pub struct DecryptingReader<R> {
    inner: R,
    cipher: BufDecryptor<Aes256>,
}

impl<R: Read> DecryptingReader<R> {
    pub fn new(inner: R, key: &OwnerKey, iv: &[u8; IV_LEN]) -> Self {
        Self {
            inner,
            cipher: BufDecryptor::new(key.as_bytes().into(), iv.into()),
        }
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.decrypt(&mut buf[..n]);
        Ok(n)
    }
}
