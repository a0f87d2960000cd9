//! One-shot initialization with a restricted update capability.
//!
//! Bootstrap tasks run after the first successful read and before the
//! value becomes observable. Each task receives an [`InitApi`], a
//! read-modify-write capability that is valid only while initialization
//! runs: once the task list completes, the capability is expired and
//! every further call is refused.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::persistence::DocumentWriter;

use super::errors::StoreError;
use super::StateValue;

enum InitState<T> {
    /// Initialization in progress; the capability may read and rewrite.
    Active(T),
    /// Initialization finished.
    Expired,
}

struct InitShared<T> {
    state: Mutex<InitState<T>>,
    writer: DocumentWriter<T>,
}

/// Read-modify-write capability handed to initialization tasks.
///
/// Calls serialize on one local mutex even though tasks already run
/// sequentially on the loop; a task that leaks the capability into a
/// concurrent context cannot interleave two cycles.
pub struct InitApi<T> {
    shared: Arc<InitShared<T>>,
}

impl<T> Clone for InitApi<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: StateValue> InitApi<T> {
    pub(crate) fn new(initial: T, writer: DocumentWriter<T>) -> Self {
        Self {
            shared: Arc::new(InitShared {
                state: Mutex::new(InitState::Active(initial)),
                writer,
            }),
        }
    }

    /// The value as of this point of initialization.
    pub async fn get(&self) -> Result<T, StoreError> {
        match &*self.shared.state.lock().await {
            InitState::Active(value) => Ok(value.clone()),
            InitState::Expired => Err(StoreError::InitializerExpired),
        }
    }

    /// Apply `transform`, persisting the result when it differs from the
    /// current value under equality.
    pub async fn update<F, Fut>(&self, transform: F) -> Result<T, StoreError>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut guard = self.shared.state.lock().await;
        let current = match &*guard {
            InitState::Active(value) => value.clone(),
            InitState::Expired => return Err(StoreError::InitializerExpired),
        };

        let next = transform(current.clone()).await?;
        if next != current {
            self.shared.writer.write(&next)?;
            *guard = InitState::Active(next.clone());
        }
        Ok(next)
    }

    /// Expire the capability and take its final value.
    ///
    /// Called by the loop once the task list has run, success or not, so
    /// a leaked capability can never rewrite the document later.
    pub(crate) async fn expire(&self) -> Option<T> {
        let mut guard = self.shared.state.lock().await;
        match std::mem::replace(&mut *guard, InitState::Expired) {
            InitState::Active(value) => Some(value),
            InitState::Expired => None,
        }
    }
}
