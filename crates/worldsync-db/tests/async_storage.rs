//! Integration tests for the background save worker.
//!
//! These run against the in-memory and file backends and need no external
//! services.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use worldsync_db::{
    AsyncSaveStorage, ChangeFormBatch, FileStore, InMemoryStore, PersistError, SaveStorage,
    StoreError,
};
use worldsync_types::{ChangeForm, FormDesc};

const POLL: Duration = Duration::from_millis(5);

fn form(id: u32) -> ChangeForm {
    ChangeForm {
        form_desc: FormDesc::new(id, "Skyrim.esm"),
        ..ChangeForm::default()
    }
}

fn batch_of_three() -> ChangeFormBatch {
    vec![Some(form(1)), Some(form(2)), Some(form(3))]
}

fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let handle = Arc::clone(&count);
    (count, move || {
        handle.fetch_add(1, Ordering::SeqCst);
    })
}

/// Tick until `done` accepts the result, giving up after two seconds.
fn tick_until(
    storage: &mut AsyncSaveStorage,
    mut done: impl FnMut(&Result<(), PersistError>) -> bool,
) -> Result<(), PersistError> {
    for _ in 0..400 {
        thread::sleep(POLL);
        let result = storage.tick();
        if done(&result) {
            return result;
        }
    }
    panic!("save worker did not report in time");
}

/// Memory backend that rejects its first `failures` batches.
struct FlakyStore {
    failures: u32,
    inner: InMemoryStore,
}

impl SaveStorage for FlakyStore {
    fn upsert(&mut self, batch: ChangeFormBatch) -> Result<usize, StoreError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(StoreError::Config("backend offline".to_owned()));
        }
        self.inner.upsert(batch)
    }

    fn iterate(&mut self, visit: &mut dyn FnMut(ChangeForm)) -> Result<(), StoreError> {
        self.inner.iterate(visit)
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("worldsync-{tag}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

// =============================================================================
// Completion
// =============================================================================

#[test]
fn batch_callback_fires_once_and_counts_one_upsert() {
    let mut storage =
        AsyncSaveStorage::with_poll_interval(InMemoryStore::new(), "test", POLL).unwrap();
    let (fired, callback) = counter();

    storage.upsert(batch_of_three(), callback);
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    tick_until(&mut storage, |_| fired.load(Ordering::SeqCst) > 0).unwrap();
    for _ in 0..5 {
        thread::sleep(POLL);
        storage.tick().unwrap();
    }

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(storage.num_finished_upserts(), 1);
}

#[test]
fn written_forms_are_visible_to_iterate_sync() {
    let mut storage =
        AsyncSaveStorage::with_poll_interval(InMemoryStore::new(), "test", POLL).unwrap();
    let (fired, callback) = counter();
    storage.upsert(batch_of_three(), callback);
    tick_until(&mut storage, |_| fired.load(Ordering::SeqCst) > 0).unwrap();

    let mut seen = Vec::new();
    storage
        .iterate_sync(&mut |f| seen.push(f.form_desc.short_form_id))
        .unwrap();
    assert_eq!(seen, vec![1, 2, 3]);
}

#[test]
fn backend_buffer_is_offered_for_reuse() {
    let mut storage =
        AsyncSaveStorage::with_poll_interval(InMemoryStore::new(), "test", POLL).unwrap();
    assert!(storage.recycled_buffer().is_none());

    let (fired, callback) = counter();
    storage.upsert(batch_of_three(), callback);
    tick_until(&mut storage, |_| fired.load(Ordering::SeqCst) > 0).unwrap();

    let buffer = storage.recycled_buffer().unwrap();
    assert!(buffer.is_empty());
    assert!(buffer.capacity() >= 3);
}

#[test]
fn several_batches_each_count_once() {
    let mut storage =
        AsyncSaveStorage::with_poll_interval(InMemoryStore::new(), "test", POLL).unwrap();
    let (fired, _) = counter();
    for id in 0..4 {
        let handle = Arc::clone(&fired);
        storage.upsert(vec![Some(form(id)), None], move || {
            handle.fetch_add(1, Ordering::SeqCst);
        });
    }
    tick_until(&mut storage, |_| fired.load(Ordering::SeqCst) == 4).unwrap();
    assert_eq!(storage.num_finished_upserts(), 4);
}

// =============================================================================
// Faults
// =============================================================================

#[test]
fn backend_fault_is_raised_exactly_once() {
    let store = FlakyStore {
        failures: 1,
        inner: InMemoryStore::new(),
    };
    let mut storage = AsyncSaveStorage::with_poll_interval(store, "flaky", POLL).unwrap();
    let (lost, callback) = counter();
    storage.upsert(batch_of_three(), callback);

    let err = tick_until(&mut storage, Result::is_err).unwrap_err();
    assert!(matches!(
        err,
        PersistError::Upsert { batch_len: 3, ref store, .. } if store == "flaky"
    ));

    for _ in 0..5 {
        thread::sleep(POLL);
        storage.tick().unwrap();
    }
    assert_eq!(lost.load(Ordering::SeqCst), 0);
    assert_eq!(storage.num_finished_upserts(), 0);

    let (fired, callback) = counter();
    storage.upsert(batch_of_three(), callback);
    tick_until(&mut storage, |_| fired.load(Ordering::SeqCst) > 0).unwrap();
    assert_eq!(storage.num_finished_upserts(), 1);
}

#[test]
fn faults_are_raised_in_order_one_per_tick() {
    let store = FlakyStore {
        failures: 2,
        inner: InMemoryStore::new(),
    };
    let mut storage = AsyncSaveStorage::with_poll_interval(store, "flaky", POLL).unwrap();
    storage.upsert(vec![Some(form(1))], || {});
    storage.upsert(vec![Some(form(1)), Some(form(2))], || {});

    let first = tick_until(&mut storage, Result::is_err).unwrap_err();
    let second = tick_until(&mut storage, Result::is_err).unwrap_err();
    assert!(matches!(first, PersistError::Upsert { batch_len: 1, .. }));
    assert!(matches!(second, PersistError::Upsert { batch_len: 2, .. }));
}

// =============================================================================
// Shutdown
// =============================================================================

#[test]
fn close_writes_queued_batches_and_fires_callbacks() {
    let mut storage = AsyncSaveStorage::with_poll_interval(
        InMemoryStore::new(),
        "test",
        Duration::from_millis(50),
    )
    .unwrap();
    let (fired, callback) = counter();
    storage.upsert(batch_of_three(), callback);

    storage.close().unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn drop_drains_the_queue_into_the_backend() {
    let dir = scratch_dir("drop-drain");
    {
        let mut storage = AsyncSaveStorage::with_poll_interval(
            FileStore::open(&dir).unwrap(),
            "files",
            Duration::from_millis(50),
        )
        .unwrap();
        storage.upsert(batch_of_three(), || {});
    }

    let mut reopened = FileStore::open(&dir).unwrap();
    let mut count = 0_usize;
    reopened.iterate(&mut |_| count += 1).unwrap();
    assert_eq!(count, 3);
    std::fs::remove_dir_all(&dir).unwrap();
}
