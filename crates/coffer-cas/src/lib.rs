//! # coffer-cas
//!
//! Content-Addressable Storage (CAS) for Coffer.
//!
//! Blobs are addressed by the SHA-256 checksum of their plaintext and
//! partitioned by owner. Each owner may carry an AES-256 key, in which case
//! blobs are stored as AES-256-CFB ciphertext (see [`cipher`]).
//!
//! ## Physical Layout
//!
//! ```text
//! <backend root>/
//! └── 42/                     # owner id
//!     └── 7f/                 # first 2 hex chars of the checksum
//!         └── 7f83b165...     # full 64-char checksum
//! ```
//!
//! Identical content written twice by the same owner is stored once. The
//! same content written by two owners is stored twice, once per owner
//! prefix, each under that owner's key.

mod backend;
pub mod cipher;
mod owner;

pub use backend::{BlobBackend, BlobWriter, DiskBackend, MemoryBackend, NilBackend};
pub use cipher::{derive_iv, DecryptingReader, EncryptingWriter, IV_LEN};
pub use owner::{KeyLengthError, Owner, OwnerId, OwnerKey, Protection, KEY_LEN};

use std::io::{self, Read, Write};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, instrument};

/// SHA-256 digest (32 bytes)
pub type Sha256Digest = [u8; 32];

/// Errors that can occur during CAS operations
#[derive(Error, Debug)]
pub enum CasError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid checksum: {0}")]
    InvalidChecksum(#[from] hex::FromHexError),
}

impl CasError {
    /// True if the blob does not exist in the backend.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CasError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, CasError>;

/// Compute the SHA-256 digest of the given bytes.
#[inline]
pub fn compute_checksum(data: &[u8]) -> Sha256Digest {
    Sha256::digest(data).into()
}

/// Map a hex checksum and owner to the blob's physical path:
/// `{owner_id}/{checksum[..2]}/{checksum}`.
///
/// # Panics
///
/// If `checksum` is shorter than 2 characters. Checksums are always 64 hex
/// digits; anything shorter is a programming error.
pub fn blob_path(checksum: &str, owner_id: OwnerId) -> String {
    let prefix = checksum
        .get(..2)
        .expect("checksums should be 64 hexadecimal digits");
    format!("{}/{}/{}", owner_id, prefix, checksum)
}

/// Per-owner view of a blob backend.
///
/// `write` deduplicates by checksum and encrypts when the owner has a key;
/// `open` reverses the encryption. Existing blobs are never rewritten or
/// verified: a checksum match is taken as identical content.
#[derive(Debug, Clone)]
pub struct ContentStore<B> {
    backend: B,
    owner: Owner,
}

impl<B: BlobBackend> ContentStore<B> {
    pub fn new(backend: B, owner: Owner) -> Self {
        Self { backend, owner }
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Store bytes, returning the lowercase hex SHA-256 checksum of the
    /// plaintext.
    ///
    /// If a blob with that checksum already exists for this owner this is a
    /// no-op (deduplication).
    #[instrument(skip(self, contents), fields(owner = self.owner.id(), size = contents.len()), level = "debug")]
    pub fn write(&self, contents: &[u8]) -> Result<String> {
        let digest = compute_checksum(contents);
        let checksum = hex::encode(digest);
        let path = blob_path(&checksum, self.owner.id());

        // Deduplication: skip if already exists
        if self.backend.exists(&path) {
            debug!(checksum = %checksum, "CAS dedup hit");
            return Ok(checksum);
        }

        let mut writer = self.backend.write(&path)?;
        if let Some(key) = self.owner.key() {
            let iv = derive_iv(&digest, self.owner.id());
            writer = Box::new(EncryptingWriter::new(writer, key, &iv));
        }
        writer.write_all(contents)?;
        writer.finish()?;

        debug!(checksum = %checksum, encrypted = self.owner.is_encrypted(), "CAS blob stored");
        Ok(checksum)
    }

    /// Open a blob for reading by checksum, decrypting if the owner has a
    /// key.
    ///
    /// Backend errors, including not-found, propagate unchanged.
    #[instrument(skip(self), fields(owner = self.owner.id()), level = "debug")]
    pub fn open(&self, checksum: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.checked_blob_path(checksum)?;
        let reader = self.backend.open(&path)?;
        match self.owner.key() {
            None => Ok(reader),
            Some(key) => {
                let digest = hex::decode(checksum)?;
                let iv = derive_iv(&digest, self.owner.id());
                Ok(Box::new(DecryptingReader::new(reader, key, &iv)))
            }
        }
    }

    /// Retrieve a whole blob by checksum.
    pub fn get(&self, checksum: &str) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.open(checksum)?.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Check if a blob exists for this owner.
    pub fn exists(&self, checksum: &str) -> bool {
        self.checked_blob_path(checksum)
            .is_ok_and(|path| self.backend.exists(&path))
    }

    /// Like [`blob_path`], but treats checksums it cannot encode as absent
    /// instead of panicking, since callers may pass arbitrary strings.
    fn checked_blob_path(&self, checksum: &str) -> Result<String> {
        if checksum.get(..2).is_none() {
            return Err(CasError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no blob for checksum {:?}", checksum),
            )));
        }
        Ok(blob_path(checksum, self.owner.id()))
    }
}
