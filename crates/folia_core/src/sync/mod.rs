//! Sync coordinator: commit on demand, best-effort pull and push, and detection
//! of remote edits to the document that is currently open.
//!
//! Every gateway call made here goes through one async mutex, so a manual sync
//! and an [`AutoSync`] tick never run against the working directory at once.
//!
//! ```ignore
//! let coordinator = SyncCoordinator::new(Arc::new(vcs), &config);
//! let report = coordinator.sync(Some(&open_id)).await?;
//! if let Some(change) = report.remote_change {
//!     // offer a diff view; the open buffer is untouched
//! }
//! ```

mod auto;

pub use auto::{AutoSync, Backoff, OpenDocument, SyncEvent};

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use ts_rs::TS;

use crate::config::Config;
use crate::document::{DOCUMENT_EXTENSION, DocumentId};
use crate::error::Result;
use crate::vcs::{Author, ChangeKind, CommitInfo, Credential, FileStatus, VcsError, VersionControl};

/// Message used for the commit made at the start of [`SyncCoordinator::sync`]
pub const SYNC_COMMIT_MESSAGE: &str = "Sync workspace";

/// Result of a single push or pull step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum SyncStepOutcome {
    Done,
    /// No remote configured; not a failure
    NoRemote,
    /// The step failed; the message is for logs only
    Failed(String),
}

impl SyncStepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SyncStepOutcome::Failed(_))
    }
}

/// The open document changed on the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RemoteChange {
    pub id: DocumentId,
    /// Author of the newest commit after the pull
    pub author: Author,
    pub old_revision: Option<String>,
    pub new_revision: String,
    /// Content before the pull; `None` when the document was added remotely
    pub old_content: Option<String>,
    pub new_content: String,
}

/// What one [`SyncCoordinator::sync`] run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SyncReport {
    pub committed: Option<CommitInfo>,
    pub pull: SyncStepOutcome,
    pub push: SyncStepOutcome,
    pub remote_change: Option<RemoteChange>,
}

impl SyncReport {
    /// False when either network step failed
    pub fn is_success(&self) -> bool {
        !self.pull.is_failed() && !self.push.is_failed()
    }
}

/// Serializes commit, push and pull against one repository.
pub struct SyncCoordinator<V: VersionControl> {
    vcs: Arc<V>,
    queue: Mutex<()>,
    remote: String,
    branch: String,
    author: Author,
    credential: Option<Credential>,
}

impl<V: VersionControl> SyncCoordinator<V> {
    /// Coordinator using the remote, branch, author and token from `config`
    pub fn new(vcs: Arc<V>, config: &Config) -> Self {
        Self {
            vcs,
            queue: Mutex::new(()),
            remote: config.remote.clone(),
            branch: config.branch.clone(),
            author: config.author(),
            credential: config.credential(),
        }
    }

    pub fn vcs(&self) -> &Arc<V> {
        &self.vcs
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    async fn lock(&self) -> MutexGuard<'_, ()> {
        self.queue.lock().await
    }

    /// Whether the configured remote exists. Errors count as "no".
    pub async fn has_remote(&self) -> bool {
        let _guard = self.lock().await;
        self.has_remote_locked().await
    }

    async fn has_remote_locked(&self) -> bool {
        match self.vcs.has_remote(&self.remote).await {
            Ok(present) => present,
            Err(e) => {
                log::debug!("Could not query remote '{}': {}", self.remote, e);
                false
            }
        }
    }

    /// Working-tree changes
    pub async fn status(&self) -> Result<Vec<FileStatus>> {
        let _guard = self.lock().await;
        Ok(self.vcs.status().await?)
    }

    /// History, newest first
    pub async fn log(&self, depth: usize, path: Option<&str>) -> Result<Vec<CommitInfo>> {
        let _guard = self.lock().await;
        Ok(self.vcs.log(depth, path).await?)
    }

    /// Stage every change and commit it. `None` when the tree is clean.
    pub async fn commit_all(&self, message: &str, author: &Author) -> Result<Option<CommitInfo>> {
        let _guard = self.lock().await;
        self.commit_all_locked(message, author).await
    }

    async fn commit_all_locked(&self, message: &str, author: &Author) -> Result<Option<CommitInfo>> {
        let changes = self.vcs.status().await?;
        if changes.is_empty() {
            log::debug!("Nothing to commit");
            return Ok(None);
        }
        if changes.iter().any(|c| c.change == ChangeKind::Conflicted) {
            return Err(VcsError::MergeInProgress.into());
        }

        for change in &changes {
            match change.change {
                ChangeKind::Deleted => self.vcs.remove(&change.path).await?,
                ChangeKind::Added | ChangeKind::Modified | ChangeKind::Untracked => {
                    self.vcs.stage(&change.path).await?
                }
                ChangeKind::Conflicted => {}
            }
        }

        let commit = self.vcs.commit(message, author).await?;
        log::info!("Committed {} change(s) as {}", changes.len(), commit.id);
        Ok(Some(commit))
    }

    /// Push the configured branch. Never errors.
    pub async fn push(&self) -> SyncStepOutcome {
        let _guard = self.lock().await;
        self.push_locked().await
    }

    async fn push_locked(&self) -> SyncStepOutcome {
        if !self.has_remote_locked().await {
            return SyncStepOutcome::NoRemote;
        }
        let result = self
            .vcs
            .push(&self.remote, &self.branch, self.credential.as_ref())
            .await;
        step_outcome("push", result.map(|_| ()))
    }

    /// Pull the configured branch. Never errors.
    pub async fn pull(&self) -> SyncStepOutcome {
        let _guard = self.lock().await;
        self.pull_locked().await
    }

    async fn pull_locked(&self) -> SyncStepOutcome {
        if !self.has_remote_locked().await {
            return SyncStepOutcome::NoRemote;
        }
        let result = self
            .vcs
            .pull(
                &self.remote,
                &self.branch,
                self.credential.as_ref(),
                &self.author,
            )
            .await;
        if let Ok(outcome) = &result {
            log::debug!("Pull finished: {:?}", outcome);
        }
        step_outcome("pull", result.map(|_| ()))
    }

    /// Id of the newest commit, if there is any history
    async fn head_locked(&self) -> Option<CommitInfo> {
        match self.vcs.log(1, None).await {
            Ok(mut commits) => commits.pop(),
            Err(e) => {
                log::debug!("No history yet: {}", e);
                None
            }
        }
    }

    /// Commit local changes, pull with remote-change detection, then push.
    ///
    /// Only the commit can fail the call; push and pull outcomes are reported
    /// in the [`SyncReport`] and never affect one another.
    pub async fn sync(&self, open: Option<&DocumentId>) -> Result<SyncReport> {
        let _guard = self.lock().await;

        let author = self.author.clone();
        let committed = self.commit_all_locked(SYNC_COMMIT_MESSAGE, &author).await?;

        let before = self.head_locked().await.map(|c| c.id);
        let pull = self.pull_locked().await;

        let remote_change = match (open, &pull) {
            (Some(id), SyncStepOutcome::Done) => self.detect_remote_change(id, before).await,
            _ => None,
        };

        let push = self.push_locked().await;

        Ok(SyncReport {
            committed,
            pull,
            push,
            remote_change,
        })
    }

    /// Compare `id` between the revision captured before a pull and the new head.
    async fn detect_remote_change(
        &self,
        id: &DocumentId,
        before: Option<String>,
    ) -> Option<RemoteChange> {
        let head = self.head_locked().await?;
        if before.as_deref() == Some(head.id.as_str()) {
            return None;
        }

        let path = format!("{}.{}", id.as_str(), DOCUMENT_EXTENSION);
        let new_content = match self.vcs.read_file_at(&head.id, &path).await {
            Ok(content) => content,
            Err(e) => {
                log::debug!("Skipping change detection for {}: {}", id, e);
                return None;
            }
        };

        let old_content = match &before {
            Some(revision) => match self.vcs.read_file_at(revision, &path).await {
                Ok(content) => Some(content),
                Err(VcsError::FileNotFound { .. }) => None,
                Err(e) => {
                    log::debug!("Skipping change detection for {}: {}", id, e);
                    return None;
                }
            },
            None => None,
        };

        if old_content.as_deref() == Some(new_content.as_str()) {
            return None;
        }

        log::info!("{} was changed remotely by {}", id, head.author.name);
        Some(RemoteChange {
            id: id.clone(),
            author: head.author,
            old_revision: before,
            new_revision: head.id,
            old_content,
            new_content,
        })
    }
}

fn step_outcome(step: &str, result: std::result::Result<(), VcsError>) -> SyncStepOutcome {
    match result {
        Ok(()) => SyncStepOutcome::Done,
        Err(VcsError::NoRemote(_)) => SyncStepOutcome::NoRemote,
        Err(e) => {
            log::warn!("{} failed: {}", step, e);
            SyncStepOutcome::Failed(e.to_string())
        }
    }
}
