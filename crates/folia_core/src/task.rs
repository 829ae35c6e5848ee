//! Cancellable background work with an awaitable result.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{FoliaError, Result};

/// A spawned task paired with the token that cancels it.
///
/// The future receives a clone of the token and is expected to check it;
/// cancellation is cooperative. [`join`](BackgroundTask::join) reports the
/// task's own error, [`FoliaError::Cancelled`], or [`FoliaError::TaskFailed`]
/// if it panicked.
pub struct BackgroundTask<T> {
    cancel: CancellationToken,
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> BackgroundTask<T> {
    /// Spawn `work` on the current tokio runtime under `cancel`
    pub fn spawn<F, Fut>(cancel: CancellationToken, work: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let handle = tokio::spawn(work(cancel.clone()));
        Self { cancel, handle }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for completion
    pub async fn join(self) -> Result<T> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(FoliaError::Cancelled),
            Err(e) => Err(FoliaError::TaskFailed(e.to_string())),
        }
    }
}
