//! Store Semantics Tests
//!
//! End-to-end behavior of the store engine: default bootstrapping,
//! update serialization, corruption recovery, failure propagation and
//! mutation detection, exercised through the public API only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use statefile::backend::MemoryBackend;
use statefile::serialization::{CorruptionError, DecodeError, EncodeError};
use statefile::{
    InitApi, JsonSerializer, ReplaceOnCorruption, Serializer, StateFile, StoreError,
};
use tempfile::TempDir;
use tokio::time::timeout;

// =============================================================================
// Test Utilities
// =============================================================================

fn memory_store(backend: &MemoryBackend) -> StateFile<u64> {
    StateFile::builder("/store/doc", JsonSerializer::<u64>::new())
        .backend(backend.clone())
        .open()
}

const DOC: &str = "/store/doc";
const SCRATCH: &str = "/store/doc.tmp";

// =============================================================================
// Bootstrapping
// =============================================================================

/// An empty store serves the serializer's default and does not create
/// the target file as a side effect of reading.
#[tokio::test]
async fn test_empty_store_yields_default_without_creating_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("counter.json");

    let store: StateFile<u64> = StateFile::open(&path, JsonSerializer::new());

    assert_eq!(store.get().await.unwrap(), 0);
    assert!(!path.exists());
}

/// Bootstrap tasks may rewrite the value before it becomes observable.
#[tokio::test]
async fn test_init_task_rewrites_before_first_observation() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("counter.json");

    let store = StateFile::builder(&path, JsonSerializer::<u64>::new())
        .init_task(|api: InitApi<u64>| async move {
            api.update(|v| async move { Ok(if v == 0 { 42 } else { v }) })
                .await?;
            Ok(())
        })
        .open();

    assert_eq!(store.get().await.unwrap(), 42);

    let on_disk: u64 = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(on_disk, 42);
}

// =============================================================================
// Updates
// =============================================================================

/// An update returns the new value, persists it, and observers see the
/// old value then the new one when subscribed before the update.
#[tokio::test]
async fn test_update_returns_persists_and_publishes() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("counter.json");
    let store: StateFile<u64> = StateFile::open(&path, JsonSerializer::new());

    let mut before = store.watch();
    assert_eq!(before.next().await.unwrap().unwrap(), 0);

    let result = store.update(|v| async move { Ok(v + 1) }).await.unwrap();
    assert_eq!(result, 1);

    assert_eq!(before.next().await.unwrap().unwrap(), 1);

    let mut after = store.watch();
    assert_eq!(after.next().await.unwrap().unwrap(), 1);

    let on_disk: u64 = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(on_disk, 1);
}

/// Two overlapping updates serialize in arrival order; the first holds
/// the loop while the second waits.
#[tokio::test]
async fn test_overlapping_updates_serialize_in_arrival_order() {
    let backend = MemoryBackend::new();
    backend.insert(DOC, b"3".to_vec());
    let store = memory_store(&backend);

    let increment = store.update(|v| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(v + 1)
    });
    let double = store.update(|v| async move { Ok(v * 2) });

    let (first, second) = tokio::join!(increment, double);
    assert_eq!(first.unwrap(), 4);
    assert_eq!(second.unwrap(), 8);

    assert_eq!(store.get().await.unwrap(), 8);
    assert_eq!(backend.contents(DOC.as_ref()).unwrap(), b"8");
}

/// A transform that returns an equal value never touches disk and never
/// republishes.
#[tokio::test]
async fn test_equal_value_update_writes_nothing() {
    let backend = MemoryBackend::new();
    backend.insert(DOC, b"3".to_vec());
    let store = memory_store(&backend);

    let result = store.update(|v| async move { Ok(v) }).await.unwrap();
    assert_eq!(result, 3);
    assert_eq!(backend.create_count(), 0);
}

/// Transform failures reach only the responsible update.
#[tokio::test]
async fn test_transform_failure_fails_only_its_update() {
    let backend = MemoryBackend::new();
    let store = memory_store(&backend);

    let err = store
        .update(|_| async move { Err::<u64, _>(StoreError::transform("rejected")) })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Transform(_)));

    // The engine keeps serving and updating.
    assert_eq!(store.update(|v| async move { Ok(v + 1) }).await.unwrap(), 1);
}

/// A caller that stops awaiting an update does not cancel it: the
/// message is already queued and the engine persists it regardless.
#[tokio::test]
async fn test_abandoned_update_still_persists() {
    let backend = MemoryBackend::new();
    let store = memory_store(&backend);

    let slow = store.update(|v| async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(v + 1)
    });
    // Poll long enough to enqueue, then abandon the caller side.
    assert!(timeout(Duration::from_millis(5), slow).await.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.get().await.unwrap(), 1);
    assert_eq!(backend.contents(DOC.as_ref()).unwrap(), b"1");
}

// =============================================================================
// Corruption Recovery
// =============================================================================

/// Corruption on first read is repaired through the handler and
/// persisted before anything becomes observable.
#[tokio::test]
async fn test_corruption_recovered_through_handler() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("counter.json");
    std::fs::write(&path, b"{definitely not json").unwrap();

    let store = StateFile::builder(&path, JsonSerializer::<u64>::new())
        .corruption_handler(ReplaceOnCorruption::with_value(7u64))
        .open();

    assert_eq!(store.get().await.unwrap(), 7);

    let on_disk: u64 = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(on_disk, 7);
}

/// Without a replacing handler, corruption fails the observer.
#[tokio::test]
async fn test_corruption_fails_observers_by_default() {
    let backend = MemoryBackend::new();
    backend.insert(DOC, b"{broken".to_vec());
    let store = memory_store(&backend);

    let err = store.get().await.unwrap_err();
    match err {
        StoreError::Persist(persist) => assert!(persist.is_corruption()),
        other => panic!("unexpected error: {other:?}"),
    }
}

// =============================================================================
// Write-Path Failures
// =============================================================================

/// A failed persist fails the update's ack, leaves observers on the old
/// value, and leaves no scratch file behind.
#[tokio::test]
async fn test_failed_persist_leaves_old_value_and_no_scratch() {
    let backend = MemoryBackend::new();
    let store = memory_store(&backend);

    assert_eq!(store.update(|v| async move { Ok(v + 1) }).await.unwrap(), 1);

    backend.set_fail_renames(true);
    let err = store.update(|v| async move { Ok(v + 1) }).await.unwrap_err();
    assert!(matches!(err, StoreError::Persist(_)));

    assert_eq!(store.get().await.unwrap(), 1);
    assert_eq!(backend.contents(DOC.as_ref()).unwrap(), b"1");
    assert!(backend.contents(SCRATCH.as_ref()).is_none());

    // And the engine recovers once the environment does.
    backend.set_fail_renames(false);
    assert_eq!(store.update(|v| async move { Ok(v + 1) }).await.unwrap(), 2);
}

// =============================================================================
// Mutation Detection
// =============================================================================

/// Value with shared interior state, compared and hashed by content.
#[derive(Debug, Clone)]
struct Shared(Arc<AtomicU64>);

impl Shared {
    fn new(value: u64) -> Self {
        Self(Arc::new(AtomicU64::new(value)))
    }

    fn load(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

impl PartialEq for Shared {
    fn eq(&self, other: &Self) -> bool {
        self.load() == other.load()
    }
}

impl std::hash::Hash for Shared {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.load().hash(state);
    }
}

/// Decimal-string codec for [`Shared`].
struct SharedCodec;

impl Serializer<Shared> for SharedCodec {
    fn default_value(&self) -> Shared {
        Shared::new(0)
    }

    fn decode(&self, source: &mut dyn std::io::Read) -> Result<Shared, DecodeError> {
        let mut raw = Vec::new();
        source.read_to_end(&mut raw)?;
        let text = String::from_utf8(raw)
            .map_err(|e| CorruptionError::new(format!("not UTF-8: {e}")))?;
        let value = text
            .trim()
            .parse::<u64>()
            .map_err(|e| CorruptionError::new(format!("not a number: {e}")))?;
        Ok(Shared::new(value))
    }

    fn encode(&self, value: &Shared, sink: &mut dyn std::io::Write) -> Result<(), EncodeError> {
        sink.write_all(value.load().to_string().as_bytes())?;
        Ok(())
    }
}

/// Mutating a value after the store returned it is a programming error:
/// the next update fails with the mutation error and the disk document
/// stays unchanged.
#[tokio::test]
async fn test_mutation_after_return_fails_next_update() {
    let backend = MemoryBackend::new();
    let store: StateFile<Shared> = StateFile::builder(DOC, SharedCodec)
        .backend(backend.clone())
        .open();

    let leaked = Arc::new(AtomicU64::new(5));
    let planted = Arc::clone(&leaked);
    store
        .update(move |_| async move { Ok(Shared(planted)) })
        .await
        .unwrap();
    assert_eq!(backend.contents(DOC.as_ref()).unwrap(), b"5");

    // Mutate behind the store's back.
    leaked.store(9, Ordering::SeqCst);

    let err = store
        .update(|v| async move { Ok(Shared::new(v.load() + 1)) })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ValueMutated { .. }));
    assert!(err.is_fatal());

    assert_eq!(backend.contents(DOC.as_ref()).unwrap(), b"5");
}
