//! # Store Engine
//!
//! The serialized core of the store. One spawned loop task drains Read
//! and Update messages in arrival order, lazily initializes the cached
//! value on the first message, and owns every mutation of the document,
//! the cache and the broadcast slot. There is no parallelism inside the
//! engine; observers only ever collect from the slot.

pub(crate) mod cache;
mod errors;
mod init;
mod message;

pub use errors::{StoreError, StoreResult};
pub use init::InitApi;

use std::future::Future;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, oneshot};

use crate::backend::{FileBackend, LocalBackend};
use crate::broadcast::{Slot, ValueStream};
use crate::config::StoreOptions;
use crate::observability::Logger;
use crate::persistence::{DocumentReader, DocumentWriter};
use crate::recovery::{CorruptionHandler, PropagateCorruption};
use crate::serialization::Serializer;

use cache::CachedEntry;
use message::{BoxFuture, InitTaskFn, Message, UpdateFn};

/// Bounds a stored value type must satisfy. Blanket-implemented; never
/// implement it by hand.
pub trait StateValue: Clone + PartialEq + Hash + Send + Sync + 'static {}

impl<T: Clone + PartialEq + Hash + Send + Sync + 'static> StateValue for T {}

/// State shared between the loop task and every store handle.
struct EngineShared<T> {
    /// Current broadcast slot; swapped by the loop after a read failure.
    slot: RwLock<Arc<Slot<T>>>,
}

impl<T: StateValue> EngineShared<T> {
    fn current_slot(&self) -> Arc<Slot<T>> {
        match self.slot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Install a fresh empty slot and return the one it replaced.
    fn swap_slot(&self) -> Arc<Slot<T>> {
        let fresh = Arc::new(Slot::new());
        let mut guard = match self.slot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, fresh)
    }
}

/// Handle to a typed, durable, single-document store.
///
/// Cloning shares the same engine. The loop shuts down when the last
/// handle is dropped, after already-enqueued work drains; observers then
/// complete.
pub struct StateFile<T> {
    queue: mpsc::UnboundedSender<Message<T>>,
    shared: Arc<EngineShared<T>>,
    target: PathBuf,
}

impl<T> Clone for StateFile<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            shared: Arc::clone(&self.shared),
            target: self.target.clone(),
        }
    }
}

impl<T: StateValue> StateFile<T> {
    /// Open the store at `target` with `serializer` and default policy:
    /// local filesystem backend, corruption propagated, no bootstrap
    /// tasks. Must be called within a tokio runtime.
    pub fn open(target: impl Into<PathBuf>, serializer: impl Serializer<T> + 'static) -> Self {
        StateFileBuilder::new(target, serializer).open()
    }

    /// Configure backend, corruption handling, bootstrap tasks and
    /// options before opening.
    pub fn builder(
        target: impl Into<PathBuf>,
        serializer: impl Serializer<T> + 'static,
    ) -> StateFileBuilder<T> {
        StateFileBuilder::new(target, serializer)
    }

    /// Path of the document file.
    pub fn path(&self) -> &Path {
        &self.target
    }

    /// Live stream of the current value.
    ///
    /// Subscribing enqueues a read so the first value is produced even on
    /// a store nobody has touched yet. The stream errors if the slot it
    /// observes is terminated by a read failure; a later `watch` call
    /// starts over against the replacement slot.
    pub fn watch(&self) -> ValueStream<T> {
        let slot = self.shared.current_slot();
        let _ = self.queue.send(Message::Read {
            slot: Arc::clone(&slot),
        });
        slot.subscribe()
    }

    /// First emission of a fresh [`watch`](Self::watch) stream.
    pub async fn get(&self) -> StoreResult<T> {
        match self.watch().next().await {
            Some(result) => result,
            None => Err(StoreError::Closed),
        }
    }

    /// Apply a read-modify-write transform with strict serialization
    /// against every other read and update.
    ///
    /// Returns the post-transform value. When the transform returns a
    /// value equal to the current one, nothing is written and nothing is
    /// republished. The message is processed by the engine's own task, so
    /// a caller that stops awaiting does not cancel the persist.
    pub async fn update<F, Fut>(&self, transform: F) -> StoreResult<T>
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = StoreResult<T>> + Send + 'static,
    {
        let slot = self.shared.current_slot();
        let (ack, done) = oneshot::channel();
        let boxed: UpdateFn<T> =
            Box::new(move |value| -> BoxFuture<StoreResult<T>> { Box::pin(transform(value)) });

        self.queue
            .send(Message::Update {
                transform: boxed,
                ack,
                slot: Arc::clone(&slot),
            })
            .map_err(|_| StoreError::Closed)?;

        // An update enqueued before the first successful read never gets
        // its ack completed if initialization fails; that failure arrives
        // through the slot instead.
        if !slot.has_value() {
            let mut first = slot.subscribe();
            match first.next().await {
                Some(Ok(_)) => {}
                Some(Err(error)) => return Err(error),
                None => return Err(StoreError::Closed),
            }
        }

        match done.await {
            Ok(result) => result,
            Err(_) => Err(slot.error().unwrap_or(StoreError::Closed)),
        }
    }
}

/// Configures and opens a [`StateFile`].
pub struct StateFileBuilder<T> {
    target: PathBuf,
    serializer: Arc<dyn Serializer<T>>,
    backend: Arc<dyn FileBackend>,
    handler: Arc<dyn CorruptionHandler<T>>,
    init_tasks: Vec<InitTaskFn<T>>,
    options: StoreOptions,
}

impl<T: StateValue> StateFileBuilder<T> {
    /// Start from the defaults: local filesystem backend, corruption
    /// propagated, no bootstrap tasks.
    pub fn new(target: impl Into<PathBuf>, serializer: impl Serializer<T> + 'static) -> Self {
        Self {
            target: target.into(),
            serializer: Arc::new(serializer),
            backend: Arc::new(LocalBackend::new()),
            handler: Arc::new(PropagateCorruption),
            init_tasks: Vec::new(),
            options: StoreOptions::default(),
        }
    }

    /// Replace the filesystem backend.
    pub fn backend(mut self, backend: impl FileBackend + 'static) -> Self {
        self.backend = Arc::new(backend);
        self
    }

    /// Policy for documents the serializer reports as corrupted.
    pub fn corruption_handler(mut self, handler: impl CorruptionHandler<T> + 'static) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Store options.
    pub fn options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Register a bootstrap task run once before the value becomes
    /// observable. Tasks run in registration order; if any fails, the
    /// whole list re-runs from the start on the next message, so tasks
    /// must be idempotent.
    pub fn init_task<F, Fut>(mut self, task: F) -> Self
    where
        F: Fn(InitApi<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StoreResult<()>> + Send + 'static,
    {
        self.init_tasks.push(Arc::new(move |api: InitApi<T>| {
            Box::pin(task(api)) as BoxFuture<StoreResult<()>>
        }));
        self
    }

    /// Spawn the loop task and hand back the store handle. Must be
    /// called within a tokio runtime.
    pub fn open(self) -> StateFile<T> {
        let (queue, inbox) = mpsc::unbounded_channel();
        let shared = Arc::new(EngineShared {
            slot: RwLock::new(Arc::new(Slot::new())),
        });
        let writer = DocumentWriter::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.serializer),
            self.target.clone(),
            self.options.clone(),
        );
        let reader = DocumentReader::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.serializer),
            self.target.clone(),
        );

        let actor = EngineLoop {
            shared: Arc::clone(&shared),
            reader,
            writer,
            handler: self.handler,
            init_tasks: Some(self.init_tasks),
        };
        tokio::spawn(actor.run(inbox));

        StateFile {
            queue,
            shared,
            target: self.target,
        }
    }
}

/// The serialized consumer of the message queue.
struct EngineLoop<T> {
    shared: Arc<EngineShared<T>>,
    reader: DocumentReader<T>,
    writer: DocumentWriter<T>,
    handler: Arc<dyn CorruptionHandler<T>>,
    /// Pending bootstrap tasks; `None` once they have all succeeded.
    init_tasks: Option<Vec<InitTaskFn<T>>>,
}

impl<T: StateValue> EngineLoop<T> {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Message<T>>) {
        while let Some(message) = inbox.recv().await {
            self.handle(message).await;
        }

        // Last handle dropped: close the slot so observers complete.
        self.shared.current_slot().close();
        let path = self.writer.target().display().to_string();
        Logger::trace("STORE_CLOSED", &[("path", path.as_str())]);
    }

    async fn handle(&mut self, message: Message<T>) {
        // Enqueued against a slot a prior failure terminated: whoever
        // enqueued it already saw that failure through the slot.
        if message.slot().is_terminal() {
            return;
        }

        if let Err(error) = self.ensure_initialized().await {
            let path = self.writer.target().display().to_string();
            let detail = error.to_string();
            Logger::error(
                "STORE_INIT_FAILED",
                &[("path", path.as_str()), ("error", detail.as_str())],
            );
            let failed = self.shared.swap_slot();
            failed.fail(error);
            return;
        }

        match message {
            Message::Read { .. } => {}
            Message::Update { transform, ack, .. } => {
                let result = self.transform_and_write(transform).await;
                let _ = ack.send(result);
            }
        }
    }

    /// Populate the current slot from disk, once per slot.
    ///
    /// Runs the corruption handshake and any pending bootstrap tasks; the
    /// task list survives failures so the whole sequence re-runs on the
    /// next message.
    async fn ensure_initialized(&mut self) -> StoreResult<()> {
        let slot = self.shared.current_slot();
        if slot.has_value() {
            return Ok(());
        }

        let mut value = self
            .reader
            .read_or_recover(self.handler.as_ref(), &self.writer)?;

        if let Some(tasks) = self.init_tasks.take() {
            let api = InitApi::new(value.clone(), self.writer.clone());

            let mut outcome = Ok(());
            for task in &tasks {
                if let Err(error) = (task.as_ref())(api.clone()).await {
                    outcome = Err(error);
                    break;
                }
            }

            // Expire the capability before anything else can run, so a
            // task that leaked it cannot rewrite the document later.
            if let Some(settled) = api.expire().await {
                value = settled;
            }

            if let Err(error) = outcome {
                // The whole list re-runs on the next message.
                self.init_tasks = Some(tasks);
                return Err(error);
            }
        }

        slot.publish(CachedEntry::new(value));
        Ok(())
    }

    /// Run one update against the current value.
    async fn transform_and_write(&mut self, transform: UpdateFn<T>) -> StoreResult<T> {
        let slot = self.shared.current_slot();
        let entry = match slot.entry() {
            Some(entry) => entry,
            None => return Err(StoreError::Closed),
        };
        entry.verify()?;

        let next = transform(entry.value().clone()).await?;

        // The transform itself may have mutated shared state behind the
        // cached value.
        entry.verify()?;

        if next == *entry.value() {
            return Ok(next);
        }

        if let Err(error) = self.writer.write(&next) {
            let path = self.writer.target().display().to_string();
            let detail = error.to_string();
            Logger::error(
                "STORE_WRITE_FAILED",
                &[("path", path.as_str()), ("error", detail.as_str())],
            );
            return Err(error.into());
        }

        slot.publish(CachedEntry::new(next.clone()));
        Ok(next)
    }
}
