//! LMDB-backed entry store for persistent, crash-safe id → entry mapping.
//!
//! Entries are keyed by their id encoded big-endian, so LMDB's key order is
//! id order and the next id is always `last + 1`. Id assignment happens
//! inside the write transaction, which LMDB serializes.

use std::path::Path;

use heed::types::{Bytes, SerdeBincode};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use tracing::{debug, instrument};

use crate::{Entry, EntryId, EntryStore, OwnerId, Result, StoreError};

/// LMDB-backed entry store.
pub struct LmdbStore {
    /// LMDB environment
    env: Env,

    /// Big-endian id → Entry database
    entries_db: Database<Bytes, SerdeBincode<Entry>>,
}

impl LmdbStore {
    /// Default LMDB map size: 1GB (expandable)
    const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

    /// Maximum readers
    const MAX_READERS: u32 = 128;

    /// Open or create an LMDB entry store at the given path
    ///
    /// Path should point to a directory that will contain the LMDB files.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create directory if needed
        std::fs::create_dir_all(path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(Self::DEFAULT_MAP_SIZE)
                .max_readers(Self::MAX_READERS)
                .max_dbs(1)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let entries_db = env.create_database(&mut wtxn, Some("entries"))?;
        wtxn.commit()?;

        debug!("Opened LMDB entry store at {:?}", path);

        Ok(Self { env, entries_db })
    }

    /// Begin a write transaction that can be passed to
    /// [`EntryStore::add_entry`] and [`EntryStore::entry_by_id`].
    pub fn write_txn(&self) -> Result<RwTxn<'_>> {
        Ok(self.env.write_txn()?)
    }

    /// Number of stored entries, across all owners
    pub fn len(&self) -> Result<u64> {
        let rtxn = self.env.read_txn()?;
        Ok(self.entries_db.len(&rtxn)?)
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn insert(&self, wtxn: &mut RwTxn<'_>, entry: &mut Entry) -> Result<()> {
        let next_id = match self.entries_db.last(wtxn)? {
            Some((key, _)) => decode_id(key)? + 1,
            None => 1,
        };
        entry.id = next_id;
        self.entries_db.put(wtxn, &encode_id(next_id)[..], entry)?;
        Ok(())
    }

    fn lookup(&self, rtxn: &RoTxn<'_>, id: EntryId, owner_id: OwnerId) -> Result<Entry> {
        match self.entries_db.get(rtxn, &encode_id(id)[..])? {
            Some(entry) if entry.owner_id == owner_id => Ok(entry),
            _ => Err(StoreError::NotFound { id }),
        }
    }
}

impl EntryStore for LmdbStore {
    type Txn<'t> = RwTxn<'t>;

    #[instrument(skip_all, fields(name = %entry.name, owner = entry.owner_id), level = "debug")]
    fn add_entry(&self, txn: Option<&mut RwTxn<'_>>, entry: &mut Entry) -> Result<()> {
        match txn {
            Some(wtxn) => self.insert(wtxn, entry)?,
            None => {
                let mut wtxn = self.env.write_txn()?;
                self.insert(&mut wtxn, entry)?;
                wtxn.commit()?;
            }
        }
        debug!(id = entry.id, "Entry added");
        Ok(())
    }

    #[instrument(skip(self, txn), level = "debug")]
    fn entry_by_id(
        &self,
        txn: Option<&mut RwTxn<'_>>,
        id: EntryId,
        owner_id: OwnerId,
    ) -> Result<Entry> {
        match txn {
            Some(wtxn) => self.lookup(wtxn, id, owner_id),
            None => {
                let rtxn = self.env.read_txn()?;
                self.lookup(&rtxn, id, owner_id)
            }
        }
    }
}

fn encode_id(id: EntryId) -> [u8; 8] {
    id.to_be_bytes()
}

fn decode_id(key: &[u8]) -> Result<EntryId> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| StoreError::Corrupted(format!("entry key has {} bytes", key.len())))?;
    Ok(EntryId::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(name: &str, owner_id: OwnerId) -> Entry {
        Entry {
            name: name.to_string(),
            size: 5,
            ts: 1_700_000_000,
            owner_id,
            checksum: "00ff".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_lmdb_conformance() {
        let temp = TempDir::new().unwrap();
        let store = LmdbStore::open(temp.path().join("entries.lmdb")).unwrap();
        crate::testing::entry_by_id_fixture(&store);
    }

    #[test]
    fn test_lmdb_persistence() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("entries.lmdb");

        {
            let store = LmdbStore::open(&path).unwrap();
            store.add_entry(None, &mut entry("first.txt", 1)).unwrap();
            store.add_entry(None, &mut entry("second.txt", 1)).unwrap();
        }

        let store = LmdbStore::open(&path).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.entry_by_id(None, 2, 1).unwrap().name, "second.txt");

        // Ids continue after reopen, never reused
        let mut third = entry("third.txt", 1);
        store.add_entry(None, &mut third).unwrap();
        assert_eq!(third.id, 3);
    }

    #[test]
    fn test_lmdb_caller_transaction() {
        let temp = TempDir::new().unwrap();
        let store = LmdbStore::open(temp.path().join("entries.lmdb")).unwrap();

        let mut wtxn = store.write_txn().unwrap();
        let mut a = entry("a", 1);
        let mut b = entry("b", 1);
        store.add_entry(Some(&mut wtxn), &mut a).unwrap();
        store.add_entry(Some(&mut wtxn), &mut b).unwrap();
        assert_eq!((a.id, b.id), (1, 2));

        // Visible inside the transaction
        assert_eq!(store.entry_by_id(Some(&mut wtxn), 2, 1).unwrap().name, "b");
        wtxn.commit().unwrap();

        assert_eq!(store.entry_by_id(None, 1, 1).unwrap().name, "a");
    }

    #[test]
    fn test_lmdb_aborted_transaction_discards_entries() {
        let temp = TempDir::new().unwrap();
        let store = LmdbStore::open(temp.path().join("entries.lmdb")).unwrap();

        let mut wtxn = store.write_txn().unwrap();
        store.add_entry(Some(&mut wtxn), &mut entry("gone", 1)).unwrap();
        wtxn.abort();

        assert!(store.is_empty().unwrap());
        assert!(matches!(
            store.entry_by_id(None, 1, 1),
            Err(StoreError::NotFound { id: 1 })
        ));
    }

    #[test]
    fn test_decode_id_rejects_bad_key() {
        assert!(matches!(decode_id(&[1, 2, 3]), Err(StoreError::Corrupted(_))));
        assert_eq!(decode_id(&encode_id(42)).unwrap(), 42);
    }
}
