//! Owner identity and key material.
//!
//! An [`Owner`] pairs the numeric owner id with the way that owner's blobs
//! are protected at rest. Key bytes are always copied into an [`OwnerKey`]
//! owned by the store and wiped when the last copy is dropped.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Identifies the principal that owns a set of blobs and entries.
pub type OwnerId = i64;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// Raised when key material has the wrong length for AES-256.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid key length: expected {expected} bytes, got {actual}")]
pub struct KeyLengthError {
    pub expected: usize,
    pub actual: usize,
}

/// A private copy of an owner's AES-256 key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct OwnerKey([u8; KEY_LEN]);

impl OwnerKey {
    /// Copy `bytes` into a new key. Later changes to the caller's buffer
    /// do not affect the returned key.
    pub fn new(bytes: &[u8; KEY_LEN]) -> Self {
        Self(*bytes)
    }

    /// Generate a fresh random key.
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        let key = Self(bytes);
        bytes.zeroize();
        key
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl TryFrom<&[u8]> for OwnerKey {
    type Error = KeyLengthError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array: &[u8; KEY_LEN] = bytes.try_into().map_err(|_| KeyLengthError {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self::new(array))
    }
}

impl fmt::Debug for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OwnerKey(<redacted>)")
    }
}

/// How an owner's blobs are stored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Protection {
    /// Stored as-is.
    #[default]
    Plain,
    /// Stored as AES-256-CFB ciphertext under the owner's key.
    Encrypted(OwnerKey),
}

/// An owner id together with its protection mode.
///
/// ```
/// use coffer_cas::{Owner, OwnerKey};
///
/// let plain = Owner::new(1);
/// let encrypted = Owner::new(2).with_key(OwnerKey::random());
/// assert!(!plain.is_encrypted());
/// assert!(encrypted.is_encrypted());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    id: OwnerId,
    protection: Protection,
}

impl Owner {
    /// An owner whose blobs are stored unencrypted.
    pub fn new(id: OwnerId) -> Self {
        Self {
            id,
            protection: Protection::Plain,
        }
    }

    /// Encrypt this owner's blobs with `key`.
    pub fn with_key(mut self, key: OwnerKey) -> Self {
        self.protection = Protection::Encrypted(key);
        self
    }

    /// Like [`Owner::with_key`] but copies the key out of an arbitrary slice.
    pub fn try_with_key(self, key: &[u8]) -> Result<Self, KeyLengthError> {
        Ok(self.with_key(OwnerKey::try_from(key)?))
    }

    pub fn id(&self) -> OwnerId {
        self.id
    }

    pub fn protection(&self) -> &Protection {
        &self.protection
    }

    /// The owner's key, if blobs are encrypted.
    pub fn key(&self) -> Option<&OwnerKey> {
        match &self.protection {
            Protection::Plain => None,
            Protection::Encrypted(key) => Some(key),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.protection, Protection::Encrypted(_))
    }
}
