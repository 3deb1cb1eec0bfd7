//! # coffer-store
//!
//! Entry metadata for Coffer.
//!
//! An [`Entry`] binds a logical file name to the checksum of its content in
//! the CAS, together with its size, creation time and owner. Entries are
//! immutable once added; there is no update or delete.
//!
//! ## Storage Backends
//!
//! - [`MemoryStore`]: In-memory, sequential ids (tests, embedding)
//! - [`ReadOnlyStore`]: Forwards lookups, refuses inserts
//! - [`LmdbStore`]: LMDB-backed with ACID transactions

pub mod format;
pub mod lmdb;
pub mod testing;

pub use lmdb::LmdbStore;

use std::io;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use coffer_cas::OwnerId;

/// Unique, never reused entry identifier. The first entry gets id 1.
pub type EntryId = u64;

/// Errors that can occur during entry store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No such id: {id}")]
    NotFound { id: EntryId },

    #[error("Store is read-only")]
    ReadOnly,

    #[error("LMDB error: {0}")]
    Lmdb(#[from] heed::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Store corrupted: {0}")]
    Corrupted(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Metadata record for one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Entry {
    /// Assigned by the store on insert
    pub id: EntryId,
    /// The entry name e.g. "document.pdf"
    pub name: String,
    /// Plaintext size in bytes
    pub size: u64,
    /// Creation time (seconds since Unix epoch)
    pub ts: i64,
    /// The owner of the file
    pub owner_id: OwnerId,
    /// Lowercase hex SHA-256 of the content; the key into the CAS
    pub checksum: String,
}

impl Entry {
    /// The logical path `ImmutableFs::open` accepts for this entry, of the
    /// form `{id}/{name}` e.g. `"12345/document.pdf"`.
    pub fn path(&self) -> String {
        format!("{}/{}", self.id, self.name)
    }
}

/// Stores and retrieves entries.
///
/// `Txn` is the backend's transaction handle. Callers may pass one in to
/// group operations; `None` makes each call its own transaction.
pub trait EntryStore: Send + Sync {
    type Txn<'t>;

    /// Persist `entry`, setting `entry.id` to the newly assigned id.
    fn add_entry(&self, txn: Option<&mut Self::Txn<'_>>, entry: &mut Entry) -> Result<()>;

    /// Fetch the entry with the given id and owner.
    ///
    /// Returns [`StoreError::NotFound`] if no entry has that id, or if the
    /// entry belongs to another owner. The two cases are indistinguishable.
    fn entry_by_id(
        &self,
        txn: Option<&mut Self::Txn<'_>>,
        id: EntryId,
        owner_id: OwnerId,
    ) -> Result<Entry>;
}

impl<S: EntryStore + ?Sized> EntryStore for Arc<S> {
    type Txn<'t> = S::Txn<'t>;

    fn add_entry(&self, txn: Option<&mut Self::Txn<'_>>, entry: &mut Entry) -> Result<()> {
        (**self).add_entry(txn, entry)
    }

    fn entry_by_id(
        &self,
        txn: Option<&mut Self::Txn<'_>>,
        id: EntryId,
        owner_id: OwnerId,
    ) -> Result<Entry> {
        (**self).entry_by_id(txn, id, owner_id)
    }
}

/// In-memory entry store with sequential ids.
///
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<Vec<Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries added so far.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntryStore for MemoryStore {
    type Txn<'t> = ();

    fn add_entry(&self, _txn: Option<&mut ()>, entry: &mut Entry) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entry.id = entries.len() as EntryId + 1;
        entries.push(entry.clone());
        Ok(())
    }

    fn entry_by_id(&self, _txn: Option<&mut ()>, id: EntryId, owner_id: OwnerId) -> Result<Entry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        id.checked_sub(1)
            .and_then(|index| usize::try_from(index).ok())
            .and_then(|index| entries.get(index))
            .filter(|entry| entry.owner_id == owner_id)
            .cloned()
            .ok_or(StoreError::NotFound { id })
    }
}

/// Read-only view of another store. [`EntryStore::add_entry`] always fails
/// with [`StoreError::ReadOnly`].
#[derive(Debug, Clone, Default)]
pub struct ReadOnlyStore<S> {
    inner: S,
}

impl<S> ReadOnlyStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: EntryStore> EntryStore for ReadOnlyStore<S> {
    type Txn<'t> = S::Txn<'t>;

    fn add_entry(&self, _txn: Option<&mut Self::Txn<'_>>, _entry: &mut Entry) -> Result<()> {
        Err(StoreError::ReadOnly)
    }

    fn entry_by_id(
        &self,
        txn: Option<&mut Self::Txn<'_>>,
        id: EntryId,
        owner_id: OwnerId,
    ) -> Result<Entry> {
        self.inner.entry_by_id(txn, id, owner_id)
    }
}
