//! Deferred background work
//!
//! Cache writes and revalidations never run on the caller's path. They are
//! handed to a [`WaitUntil`] registrar, which decides whether the host waits
//! for them before tearing the unit of work down.

use futures::future::BoxFuture;
use std::sync::{Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// A unit of background work
pub type DeferredTask = BoxFuture<'static, ()>;

/// Registrar for work that must not block the caller
pub trait WaitUntil: Send + Sync + 'static {
    fn wait_until(&self, task: DeferredTask);
}

/// Spawn and forget.
///
/// Nobody waits for the task; if the runtime shuts down first it is lost.
/// Outside a tokio runtime the task is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

impl WaitUntil for Detached {
    fn wait_until(&self, task: DeferredTask) {
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task);
            }
            Err(e) => {
                warn!("No runtime for deferred task ({}); dropping it", e);
            }
        }
    }
}

/// Tracks spawned tasks so the host can wait for them with [`drain`](Self::drain)
#[derive(Debug, Default)]
pub struct DeferredTasks {
    set: Mutex<JoinSet<()>>,
}

impl DeferredTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks not yet collected by `drain`
    pub fn pending(&self) -> usize {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Wait for every registered task, including ones registered while
    /// draining. Returns how many tasks were collected.
    pub async fn drain(&self) -> usize {
        let mut collected = 0;
        loop {
            let mut batch =
                std::mem::take(&mut *self.set.lock().unwrap_or_else(PoisonError::into_inner));
            if batch.is_empty() {
                break;
            }
            while let Some(joined) = batch.join_next().await {
                collected += 1;
                if let Err(e) = joined {
                    error!("Deferred task did not complete: {}", e);
                }
            }
        }
        debug!("Drained {} deferred tasks", collected);
        collected
    }
}

impl WaitUntil for DeferredTasks {
    fn wait_until(&self, task: DeferredTask) {
        match Handle::try_current() {
            Ok(handle) => {
                self.set
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .spawn_on(task, &handle);
            }
            Err(e) => {
                warn!("No runtime for deferred task ({}); dropping it", e);
            }
        }
    }
}
