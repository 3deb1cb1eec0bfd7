//! Shared conformance checks for [`EntryStore`] implementations.
//!
//! Every store must pass [`entry_by_id_fixture`] on an empty instance:
//!
//! ```
//! coffer_store::testing::entry_by_id_fixture(&coffer_store::MemoryStore::new());
//! ```

use crate::{Entry, EntryStore, StoreError};

/// Add one entry to an empty `store` and check id assignment and
/// owner-scoped lookup. Panics on any mismatch.
pub fn entry_by_id_fixture<S: EntryStore>(store: &S) {
    let mut entry = Entry {
        name: "name".to_string(),
        size: 123,
        ts: 1_604_123_456,
        owner_id: 2,
        checksum: "123456789A".to_string(),
        ..Default::default()
    };
    store
        .add_entry(None, &mut entry)
        .expect("add_entry should succeed on an empty store");
    assert_eq!(entry.id, 1, "first entry should get id 1");

    let fetched = store
        .entry_by_id(None, 1, 2)
        .expect("entry should be visible to its owner");
    assert_eq!(fetched, entry);

    assert!(
        matches!(store.entry_by_id(None, 1, 3), Err(StoreError::NotFound { id: 1 })),
        "entry should be hidden from other owners"
    );
    assert!(
        matches!(store.entry_by_id(None, 2, 2), Err(StoreError::NotFound { id: 2 })),
        "unknown id should not be found"
    );
}
