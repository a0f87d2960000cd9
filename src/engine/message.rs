//! Messages consumed by the store's serialized loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::broadcast::Slot;

use super::errors::StoreError;
use super::init::InitApi;

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Boxed user transform applied by an update message.
pub(crate) type UpdateFn<T> = Box<dyn FnOnce(T) -> BoxFuture<Result<T, StoreError>> + Send>;

/// Re-runnable one-shot bootstrap task.
pub(crate) type InitTaskFn<T> =
    Arc<dyn Fn(InitApi<T>) -> BoxFuture<Result<(), StoreError>> + Send + Sync>;

/// A unit of work for the loop, tagged with the slot captured at enqueue
/// time.
///
/// A message whose slot terminated before it is processed is discarded:
/// the party that enqueued it already saw that failure through the slot.
pub(crate) enum Message<T> {
    Read {
        slot: Arc<Slot<T>>,
    },
    Update {
        transform: UpdateFn<T>,
        ack: oneshot::Sender<Result<T, StoreError>>,
        slot: Arc<Slot<T>>,
    },
}

impl<T> Message<T> {
    pub(crate) fn slot(&self) -> &Arc<Slot<T>> {
        match self {
            Message::Read { slot } => slot,
            Message::Update { slot, .. } => slot,
        }
    }
}
