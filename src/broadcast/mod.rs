//! Conflated single-slot fan-out.
//!
//! The current value lives in one slot shared by every observer. A
//! publish replaces the slot contents wholesale; a slow observer misses
//! intermediate publishes and sees only the latest. Failure and clean
//! shutdown are terminal states: a terminal slot is never reopened, the
//! engine swaps in a fresh slot instead.

use tokio::sync::watch;

use crate::engine::cache::CachedEntry;
use crate::engine::StoreError;

/// Contents of the slot at one instant.
#[derive(Debug, Clone)]
pub(crate) enum SlotState<T> {
    /// No value published yet.
    Empty,
    /// Latest published entry.
    Value(CachedEntry<T>),
    /// Terminal: a read failed. Observers see the error and complete.
    Failed(StoreError),
    /// Terminal: the store shut down cleanly.
    Closed,
}

/// One-element conflated buffer with multi-observer fan-out.
#[derive(Debug)]
pub(crate) struct Slot<T> {
    state: watch::Sender<SlotState<T>>,
}

impl<T: Clone> Slot<T> {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(SlotState::Empty);
        Self { state }
    }

    /// Replace the slot contents with a fresh entry. Ignored once the
    /// slot is terminal.
    pub(crate) fn publish(&self, entry: CachedEntry<T>) {
        self.state.send_if_modified(|state| match state {
            SlotState::Failed(_) | SlotState::Closed => false,
            _ => {
                *state = SlotState::Value(entry);
                true
            }
        });
    }

    /// Terminate the slot with a read failure. Ignored once terminal.
    pub(crate) fn fail(&self, error: StoreError) {
        self.state.send_if_modified(|state| match state {
            SlotState::Failed(_) | SlotState::Closed => false,
            _ => {
                *state = SlotState::Failed(error);
                true
            }
        });
    }

    /// Terminate the slot cleanly. Ignored once terminal.
    pub(crate) fn close(&self) {
        self.state.send_if_modified(|state| match state {
            SlotState::Failed(_) | SlotState::Closed => false,
            _ => {
                *state = SlotState::Closed;
                true
            }
        });
    }

    /// The current entry, if a value has been published.
    pub(crate) fn entry(&self) -> Option<CachedEntry<T>> {
        match &*self.state.borrow() {
            SlotState::Value(entry) => Some(entry.clone()),
            _ => None,
        }
    }

    /// Whether a value has been published.
    pub(crate) fn has_value(&self) -> bool {
        matches!(&*self.state.borrow(), SlotState::Value(_))
    }

    /// The terminal error, if the slot failed.
    pub(crate) fn error(&self) -> Option<StoreError> {
        match &*self.state.borrow() {
            SlotState::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Whether the slot reached a terminal state.
    pub(crate) fn is_terminal(&self) -> bool {
        matches!(
            &*self.state.borrow(),
            SlotState::Failed(_) | SlotState::Closed
        )
    }

    /// Attach a new observer.
    pub(crate) fn subscribe(&self) -> ValueStream<T> {
        ValueStream {
            state: self.state.subscribe(),
            primed: false,
            done: false,
        }
    }
}

/// Live stream of a store's value.
///
/// Yields the value current at subscription time if one exists, then
/// every later publish, conflated to the latest. Ends with `None` after
/// a clean shutdown; yields the terminal error once, then ends, when the
/// slot it observes is closed by a failure.
#[derive(Debug)]
pub struct ValueStream<T> {
    state: watch::Receiver<SlotState<T>>,
    primed: bool,
    done: bool,
}

impl<T: Clone> ValueStream<T> {
    /// Wait for the next emission.
    pub async fn next(&mut self) -> Option<Result<T, StoreError>> {
        if self.done {
            return None;
        }
        loop {
            if self.primed {
                if self.state.changed().await.is_err() {
                    self.done = true;
                    return None;
                }
            }
            self.primed = true;

            let current = self.state.borrow_and_update().clone();
            match current {
                SlotState::Empty => continue,
                SlotState::Value(entry) => return Some(Ok(entry.into_value())),
                SlotState::Failed(error) => {
                    self.done = true;
                    return Some(Err(error));
                }
                SlotState::Closed => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}
