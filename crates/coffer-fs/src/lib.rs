//! # coffer-fs
//!
//! An immutable, owner-scoped file system.
//!
//! Files are written once by name and addressed afterwards by the logical
//! path `{id}/{name}` that [`Entry::path`] returns. Content lives in a
//! [`ContentStore`] bound to one owner (deduplicated, optionally encrypted);
//! metadata lives in an [`EntryStore`].
//!
//! ```
//! use coffer_cas::{MemoryBackend, Owner};
//! use coffer_fs::ImmutableFs;
//! use coffer_store::MemoryStore;
//!
//! let fs = ImmutableFs::new(MemoryBackend::new(), MemoryStore::new(), Owner::new(1));
//! let id = fs.write("hello.txt", b"Hello World!").unwrap();
//! assert_eq!(fs.read_file(&format!("{}/hello.txt", id)).unwrap(), b"Hello World!");
//! ```

mod file;
mod path;

pub use file::{FileInfo, ImmutableFile, FILE_MODE};

use std::collections::HashMap;
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

use coffer_cas::{BlobBackend, CasError, ContentStore, Owner, OwnerId};
use coffer_config::{log_fs_debug, log_fs_warn};
use coffer_store::{Entry, EntryId, EntryStore, StoreError};
use thiserror::Error;
use tracing::instrument;

/// Errors returned by [`ImmutableFs`]
#[derive(Error, Debug)]
pub enum FsError {
    /// The logical path does not name a readable file for this owner.
    #[error("open {path}: file does not exist")]
    NotFound { path: String },

    #[error("permission denied: file system is read-only")]
    Permission,

    #[error("CAS error: {0}")]
    Cas(#[from] CasError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// Immutable file system for a single owner.
///
/// Several facades may share one backend and one store; each only sees the
/// entries of its own owner.
#[derive(Debug, Clone)]
pub struct ImmutableFs<S, B> {
    store: S,
    content: ContentStore<B>,
    read_only: bool,
}

impl<S: EntryStore, B: BlobBackend> ImmutableFs<S, B> {
    /// Create a facade writing blobs to `backend` and entries to `store` on
    /// behalf of `owner`. The owner's key, if any, encrypts everything this
    /// facade writes.
    pub fn new(backend: B, store: S, owner: Owner) -> Self {
        Self {
            store,
            content: ContentStore::new(backend, owner),
            read_only: false,
        }
    }

    /// Make this facade read-only. `write` fails with
    /// [`FsError::Permission`] afterwards; `open` and `list` are unaffected.
    pub fn read_only(self) -> Self {
        Self {
            read_only: true,
            ..self
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn owner_id(&self) -> OwnerId {
        self.content.owner().id()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn content(&self) -> &ContentStore<B> {
        &self.content
    }

    /// Store `contents` under `name` and return the new entry's id.
    ///
    /// Every call creates a new entry, even if `name` and `contents` repeat
    /// an earlier write; the content itself is stored once.
    #[instrument(skip(self, contents), fields(owner = self.owner_id(), size = contents.len()), level = "debug")]
    pub fn write(&self, name: &str, contents: &[u8]) -> Result<EntryId> {
        if self.read_only {
            return Err(FsError::Permission);
        }

        let checksum = self.content.write(contents)?;
        let mut entry = Entry {
            id: 0,
            name: name.to_string(),
            size: contents.len() as u64,
            ts: unix_now(),
            owner_id: self.owner_id(),
            checksum,
        };
        self.store.add_entry(None, &mut entry)?;

        log_fs_debug!("File written", id = entry.id, name = name);
        Ok(entry.id)
    }

    /// Open the file at logical path `{id}/{name}`.
    ///
    /// A malformed path, an unknown id, an entry of another owner, a name
    /// mismatch and a missing blob all fail the same way, with
    /// [`FsError::NotFound`].
    pub fn open(&self, path: &str) -> Result<ImmutableFile> {
        let not_found = || FsError::NotFound {
            path: path.to_string(),
        };

        let Some((id, name)) = path::parse_path(path) else {
            log_fs_debug!("Malformed path", path = path);
            return Err(not_found());
        };

        let entry = match self.store.entry_by_id(None, id, self.owner_id()) {
            Ok(entry) if entry.name == name => entry,
            Ok(_) => {
                log_fs_debug!("Name mismatch", path = path);
                return Err(not_found());
            }
            Err(StoreError::NotFound { .. }) => return Err(not_found()),
            Err(e) => {
                log_fs_warn!("Entry lookup failed", path = path, error = e.to_string().as_str());
                return Err(not_found());
            }
        };

        let reader = self.content.open(&entry.checksum).map_err(|e| {
            log_fs_warn!(
                "Blob unreadable",
                id = id,
                checksum = entry.checksum.as_str(),
                error = e.to_string().as_str()
            );
            not_found()
        })?;

        Ok(ImmutableFile::new(reader, entry))
    }

    /// Open `path` and read it to the end.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let mut file = self.open(path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).map_err(CasError::from)?;
        Ok(contents)
    }

    /// Fetch the entries whose ids map to `true` in `ids`, sorted by id.
    ///
    /// Ids with no entry for this owner are left out. Any other store error
    /// aborts the listing.
    pub fn list(
        &self,
        mut txn: Option<&mut S::Txn<'_>>,
        ids: &HashMap<EntryId, bool>,
    ) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for (&id, _) in ids.iter().filter(|(_, wanted)| **wanted) {
            match self.store.entry_by_id(txn.as_deref_mut(), id, self.owner_id()) {
                Ok(entry) => entries.push(entry),
                Err(StoreError::NotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        entries.sort_unstable_by_key(|entry| entry.id);
        Ok(entries)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
