use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use coffer_cas::{blob_path, DiskBackend, MemoryBackend, NilBackend, Owner, OwnerKey};
use coffer_fs::{FsError, ImmutableFs};
use coffer_store::{Entry, EntryId, EntryStore, LmdbStore, MemoryStore, OwnerId, StoreError};
use tempfile::TempDir;

/// A store whose every operation fails with an I/O error.
struct ErrorStore;

impl EntryStore for ErrorStore {
    type Txn<'t> = ();

    fn add_entry(&self, _txn: Option<&mut ()>, _entry: &mut Entry) -> coffer_store::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "store unavailable").into())
    }

    fn entry_by_id(
        &self,
        _txn: Option<&mut ()>,
        _id: EntryId,
        _owner_id: OwnerId,
    ) -> coffer_store::Result<Entry> {
        Err(io::Error::new(io::ErrorKind::Other, "store unavailable").into())
    }
}

fn ids(pairs: &[(EntryId, bool)]) -> HashMap<EntryId, bool> {
    pairs.iter().copied().collect()
}

fn assert_not_found<T: std::fmt::Debug>(result: Result<T, FsError>, expected: &str) {
    match result {
        Err(FsError::NotFound { path }) => assert_eq!(path, expected),
        other => panic!("expected NotFound for {:?}, got {:?}", expected, other),
    }
}

#[test]
fn test_two_owners_share_backend_and_store() {
    let backend = MemoryBackend::new();
    let store = MemoryStore::new();
    let fs1 = ImmutableFs::new(backend.clone(), store.clone(), Owner::new(1));
    let fs2 = ImmutableFs::new(
        backend.clone(),
        store.clone(),
        Owner::new(2).with_key(OwnerKey::random()),
    );

    assert_eq!(fs1.write("hello.txt", b"Hello World!").unwrap(), 1);
    // New id, content not rewritten
    assert_eq!(fs1.write("hello_again.txt", b"Hello World!").unwrap(), 2);
    assert_eq!(fs2.write("hello2.txt", b"Hello World!").unwrap(), 3);
    assert_eq!(fs2.write("goodbye.txt", b"Goodbye World!").unwrap(), 4);
    assert_eq!(fs2.write("solong.txt", b"So long everyone!").unwrap(), 5);

    // Both "Hello World!" writes by owner 1 share one blob
    assert_eq!(backend.len(), 4);

    let all = ids(&[(1, true), (2, true), (3, true), (4, true), (5, true), (6, true)]);
    let paths: Vec<String> = fs2.list(None, &all).unwrap().iter().map(Entry::path).collect();
    assert_eq!(paths, ["3/hello2.txt", "4/goodbye.txt", "5/solong.txt"]);

    let some = ids(&[(1, true), (2, true), (3, true), (4, true), (5, false), (6, true)]);
    let paths: Vec<String> = fs2.list(None, &some).unwrap().iter().map(Entry::path).collect();
    assert_eq!(paths, ["3/hello2.txt", "4/goodbye.txt"]);

    assert!(fs2.list(None, &ids(&[(1, true)])).unwrap().is_empty());

    // Malformed paths, wrong names and foreign entries look the same
    assert_not_found(fs1.open("/x"), "/x");
    assert_not_found(fs1.open("hello"), "hello");
    assert_not_found(fs1.open("hello/goodbye"), "hello/goodbye");
    assert_not_found(fs1.open("1/goodbye.txt"), "1/goodbye.txt");
    assert_not_found(fs1.open("4/goodbye.txt"), "4/goodbye.txt");

    let contents = fs1.read_file("1/hello.txt").unwrap();
    assert_eq!(contents, b"Hello World!");

    // Owner 1 stores plaintext
    let entry = &fs1.list(None, &ids(&[(1, true)])).unwrap()[0];
    assert_eq!(
        backend.get(&blob_path(&entry.checksum, entry.owner_id)).unwrap(),
        contents
    );

    let contents = fs2.read_file("4/goodbye.txt").unwrap();
    assert_eq!(contents, b"Goodbye World!");

    // Owner 2 stores ciphertext
    let entry = &fs2.list(None, &ids(&[(4, true)])).unwrap()[0];
    let raw = backend
        .get(&blob_path(&entry.checksum, entry.owner_id))
        .unwrap();
    assert_eq!(raw.len(), contents.len());
    assert_ne!(raw, contents);

    let file = fs2.open("3/hello2.txt").unwrap();
    let info = file.stat();
    assert_eq!(info.name(), "hello2.txt");
    assert_eq!(info.size(), 12);
    assert_eq!(info.mode(), 0o400);
    assert!(!info.is_dir());
    let age = SystemTime::now()
        .duration_since(info.modified())
        .unwrap_or_default();
    assert!(age < Duration::from_secs(5));
}

#[test]
fn test_list_surfaces_store_error() {
    let fs = ImmutableFs::new(MemoryBackend::new(), ErrorStore, Owner::new(1));
    assert!(matches!(
        fs.list(None, &ids(&[(1, true)])),
        Err(FsError::Store(StoreError::Io(_)))
    ));
    // Unwanted ids are never looked up
    assert!(fs.list(None, &ids(&[(1, false)])).unwrap().is_empty());
}

#[test]
fn test_write_error_from_backend() {
    let fs = ImmutableFs::new(NilBackend, MemoryStore::new(), Owner::new(1));
    match fs.write("hello.txt", b"Hello World!") {
        Err(FsError::Cas(e)) => assert!(!e.is_not_found()),
        other => panic!("expected CAS error, got {:?}", other),
    }
}

#[test]
fn test_write_error_from_store() {
    let fs = ImmutableFs::new(MemoryBackend::new(), ErrorStore, Owner::new(1));
    assert!(matches!(
        fs.write("hello.txt", b"Hello World!"),
        Err(FsError::Store(_))
    ));
}

#[test]
fn test_open_with_missing_blob() {
    let store = MemoryStore::new();
    let writer = ImmutableFs::new(MemoryBackend::new(), store.clone(), Owner::new(1));
    writer.write("hello.txt", b"Hello World!").unwrap();

    // Entry exists but the backend has no blob for it
    let reader = ImmutableFs::new(NilBackend, store, Owner::new(1));
    assert_not_found(reader.open("1/hello.txt"), "1/hello.txt");
}

#[test]
fn test_open_with_empty_store() {
    let fs = ImmutableFs::new(MemoryBackend::new(), MemoryStore::new(), Owner::new(1));
    assert_not_found(fs.open("1/hello.txt"), "1/hello.txt");
}

#[test]
fn test_open_with_store_error() {
    let fs = ImmutableFs::new(MemoryBackend::new(), ErrorStore, Owner::new(1));
    assert_not_found(fs.open("1/hello.txt"), "1/hello.txt");
}

#[test]
fn test_read_only_facade() {
    let backend = MemoryBackend::new();
    let store = MemoryStore::new();
    let fs = ImmutableFs::new(backend.clone(), store.clone(), Owner::new(1));
    fs.write("hello.txt", b"Hello World!").unwrap();

    let read_only = fs.read_only();
    assert!(matches!(
        read_only.write("hello2.txt", b"Hello World!"),
        Err(FsError::Permission)
    ));
    assert_eq!(store.len(), 1);
    assert_eq!(backend.len(), 1);
    assert_eq!(read_only.read_file("1/hello.txt").unwrap(), b"Hello World!");

    let again = read_only.read_only();
    assert!(again.is_read_only());
    assert_eq!(again.read_file("1/hello.txt").unwrap(), b"Hello World!");
}

#[test]
fn test_empty_file_round_trip() {
    let fs = ImmutableFs::new(
        MemoryBackend::new(),
        MemoryStore::new(),
        Owner::new(3).with_key(OwnerKey::random()),
    );
    let id = fs.write("empty", b"").unwrap();

    let mut file = fs.open(&format!("{}/empty", id)).unwrap();
    assert_eq!(file.stat().size(), 0);
    let mut contents = Vec::new();
    file.read_to_end(&mut contents).unwrap();
    assert!(contents.is_empty());
}

#[test]
fn test_disk_and_lmdb_persist_across_reopen() {
    let temp = TempDir::new().unwrap();
    let blobs = temp.path().join("blobs");
    let db = temp.path().join("db");
    std::fs::create_dir(&blobs).unwrap();
    let key = OwnerKey::random();

    let path = {
        let fs = ImmutableFs::new(
            DiskBackend::new(&blobs).unwrap(),
            LmdbStore::open(&db).unwrap(),
            Owner::new(11).with_key(key.clone()),
        );
        let id = fs.write("report.csv", b"a,b\n1,2\n").unwrap();
        format!("{}/report.csv", id)
    };

    let store = Arc::new(LmdbStore::open(&db).unwrap());
    let fs = ImmutableFs::new(
        DiskBackend::new(&blobs).unwrap(),
        Arc::clone(&store),
        Owner::new(11).with_key(key),
    );
    assert_eq!(fs.read_file(&path).unwrap(), b"a,b\n1,2\n");

    // Another owner sharing the same directories sees nothing
    let stranger = ImmutableFs::new(DiskBackend::new(&blobs).unwrap(), store, Owner::new(12));
    assert_not_found(stranger.open(&path), &path);
}

#[test]
fn test_list_within_transaction() {
    let temp = TempDir::new().unwrap();
    let store = LmdbStore::open(temp.path()).unwrap();
    let fs = ImmutableFs::new(MemoryBackend::new(), store, Owner::new(1));
    fs.write("a", b"a").unwrap();
    fs.write("b", b"b").unwrap();

    let mut txn = fs.store().write_txn().unwrap();
    let entries = fs
        .list(Some(&mut txn), &ids(&[(2, true), (1, true), (9, true)]))
        .unwrap();
    txn.abort();

    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
}
