//! Log-backed store: persistence through replay and exclusive locking.

mod common;

use common::*;
use strand_model::{Behavior, ChainKey, EntryKey, Muid};
use std::io::Write;
use strand_model::BundleInfo;
use strand_storage::{EntryStore, LogBackedStore, RedbStore, StoreError};

#[test]
fn test_replay_reproduces_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strand.log");
    let root = Muid::global(Behavior::Directory);
    let chain_key = ChainKey::new(MEDALLION, CHAIN_START);

    {
        let store = LogBackedStore::open(&path).unwrap();
        assert_eq!(store.bundles_replayed(), 0);
        store.claim_chain(chain_key).unwrap();
        let mut chain = ChainWriter::new(MEDALLION, CHAIN_START);
        let b1 = chain.commit(CHAIN_START, vec![set(root, "k", string("a"))]);
        store.add_bundle(&b1).unwrap();
        store.add_bundle(&chain.commit(CHAIN_START + 1, vec![set(root, "k", string("b"))])).unwrap();
        // Replays are not written again.
        store.add_bundle(&b1).unwrap();
    }

    let store = LogBackedStore::open(&path).unwrap();
    assert_eq!(store.bundles_replayed(), 2);
    assert_eq!(store.get_claimed_chains().unwrap(), vec![chain_key]);
    assert_eq!(store.get_seen_through(chain_key).unwrap(), Some(CHAIN_START + 1));
    let entry = store.get_entry(root, &EntryKey::user("k"), None).unwrap().unwrap();
    assert_eq!(entry.value, Some(string("b")));
}

#[test]
fn test_second_open_is_locked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strand.log");
    let _first = LogBackedStore::open(&path).unwrap();
    assert!(matches!(LogBackedStore::open(&path), Err(StoreError::StoreLocked(_))));
}

#[test]
fn test_lock_released_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strand.log");
    drop(LogBackedStore::open(&path).unwrap());
    assert!(LogBackedStore::open(&path).is_ok());
}

#[test]
fn test_rejected_bundle_is_not_logged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strand.log");
    {
        let store = LogBackedStore::open(&path).unwrap();
        let orphan = bundle(MEDALLION, CHAIN_START, CHAIN_START + 5, Some(CHAIN_START), vec![]);
        assert!(store.add_bundle(&orphan).is_err());
    }
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
}

#[test]
fn test_torn_tail_is_dropped_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strand.log");
    let root = Muid::global(Behavior::Directory);
    let chain_key = ChainKey::new(MEDALLION, CHAIN_START);
    let mut chain = ChainWriter::new(MEDALLION, CHAIN_START);

    {
        let store = LogBackedStore::open(&path).unwrap();
        store.add_bundle(&chain.commit(CHAIN_START, vec![set(root, "k", string("a"))])).unwrap();
    }
    let good_len = std::fs::metadata(&path).unwrap().len();

    // A record whose length prefix promises more bytes than were written.
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0x40, 0x0a, 0x20, 0x01]).unwrap();
    drop(file);

    {
        let store = LogBackedStore::open(&path).unwrap();
        assert_eq!(store.bundles_replayed(), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
        let (_, novel) = store
            .add_bundle(&chain.commit(CHAIN_START + 1, vec![set(root, "k", string("b"))]))
            .unwrap();
        assert!(novel);
    }

    let store = LogBackedStore::open(&path).unwrap();
    assert_eq!(store.bundles_replayed(), 2);
    assert_eq!(store.get_seen_through(chain_key).unwrap(), Some(CHAIN_START + 1));
    let entry = store.get_entry(root, &EntryKey::user("k"), None).unwrap().unwrap();
    assert_eq!(entry.value, Some(string("b")));
}

#[test]
fn test_failed_write_leaves_index_unchanged() {
    let index = RedbStore::in_memory().unwrap();
    let root = Muid::global(Behavior::Directory);
    let chain_key = ChainKey::new(MEDALLION, CHAIN_START);
    let mut chain = ChainWriter::new(MEDALLION, CHAIN_START);
    let b1 = chain.commit(CHAIN_START, vec![set(root, "k", string("a"))]);

    let mut calls = 0;
    let result = index.add_bundle_with(&b1, &mut |info: &BundleInfo| {
        calls += 1;
        assert_eq!(info.timestamp, CHAIN_START);
        Err(std::io::Error::other("disk full").into())
    });
    assert!(matches!(result, Err(StoreError::StorageUnavailable(_))));
    assert_eq!(calls, 1);
    assert_eq!(index.get_seen_through(chain_key).unwrap(), None);
    assert!(index.get_entry(root, &EntryKey::user("k"), None).unwrap().is_none());

    // A retry is still novel once the write goes through.
    let (_, novel) = index.add_bundle(&b1).unwrap();
    assert!(novel);
    assert_eq!(index.get_seen_through(chain_key).unwrap(), Some(CHAIN_START));

    // Replays never reach the hook.
    let (_, novel) = index
        .add_bundle_with(&b1, &mut |_: &BundleInfo| panic!("hook called for a replay"))
        .unwrap();
    assert!(!novel);

    let claim = index.claim_chain_with(chain_key, &mut || Err(std::io::Error::other("disk full").into()));
    assert!(claim.is_err());
    assert!(index.get_claimed_chains().unwrap().is_empty());
}
