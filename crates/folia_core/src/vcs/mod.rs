//! Version control gateway.
//!
//! The [`VersionControl`] trait is the only way the rest of the crate talks to a
//! repository. It is object-safe (boxed futures), like
//! [`AsyncFileSystem`](crate::fs::AsyncFileSystem), so a workspace can hold
//! `Arc<dyn VersionControl>` and tests can substitute [`InMemoryVcs`].
//!
//! Backends:
//! - [`GitCli`] drives the `git` binary (feature `git-cli`, on by default)
//! - [`InMemoryVcs`] is a self-contained repository with a simulated remote

#[cfg(all(feature = "git-cli", not(target_arch = "wasm32")))]
mod git_cli;
mod memory;

#[cfg(all(feature = "git-cli", not(target_arch = "wasm32")))]
pub use git_cli::{GitCli, is_git_available};
pub use memory::InMemoryVcs;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::fs::BoxFuture;

/// Errors raised by a version-control backend
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("`{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Remote '{0}' is not configured")]
    NoRemote(String),

    #[error("Revision '{0}' not found")]
    RevisionNotFound(String),

    #[error("'{path}' does not exist at revision {revision}")]
    FileNotFound { revision: String, path: String },

    /// The pull was rolled back; local files are as they were before it
    #[error("Merge conflict in {}", .0.join(", "))]
    MergeConflict(Vec<String>),

    #[error("A merge is in progress; resolve it before committing")]
    MergeInProgress,

    #[error("Version control I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for gateway operations
pub type VcsResult<T> = std::result::Result<T, VcsError>;

/// Commit author identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Credential passed to push and pull
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Username for HTTP auth; hosts that accept bare tokens ignore it
    pub username: String,
    /// Token or password
    pub secret: String,
}

impl Credential {
    /// Token credential with the conventional placeholder username
    pub fn token(secret: impl Into<String>) -> Self {
        Self {
            username: "x-access-token".to_string(),
            secret: secret.into(),
        }
    }
}

// Keep secrets out of logs
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"***")
            .finish()
    }
}

/// How a path differs from the last commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Staged new file
    Added,
    /// Tracked file with changed content
    Modified,
    /// Tracked file missing from the working tree
    Deleted,
    /// File never committed or staged
    Untracked,
    /// Unresolved merge conflict
    Conflicted,
}

/// One changed path from `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FileStatus {
    /// Path relative to the repository root, `/`-separated
    pub path: String,
    pub change: ChangeKind,
}

/// A commit in the history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CommitInfo {
    /// Revision id
    pub id: String,
    pub message: String,
    pub author: Author,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
}

/// What a pull did to the local branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum PullOutcome {
    UpToDate,
    FastForward,
    Merged,
}

/// Abstraction over a version-control backend rooted at one working directory.
///
/// Implementations are not expected to be reentrant; callers that may overlap
/// (a manual sync and a background tick) serialize through
/// [`SyncCoordinator`](crate::sync::SyncCoordinator).
pub trait VersionControl: Send + Sync {
    /// Create the repository if it does not exist yet
    fn init(&self) -> BoxFuture<'_, VcsResult<()>>;

    /// Changed paths in the working tree, sorted by path
    fn status(&self) -> BoxFuture<'_, VcsResult<Vec<FileStatus>>>;

    /// Stage a new or modified path
    fn stage<'a>(&'a self, path: &'a str) -> BoxFuture<'a, VcsResult<()>>;

    /// Undo staging of a path
    fn unstage<'a>(&'a self, path: &'a str) -> BoxFuture<'a, VcsResult<()>>;

    /// Mark a deleted path for removal in the next commit
    fn remove<'a>(&'a self, path: &'a str) -> BoxFuture<'a, VcsResult<()>>;

    /// Commit everything staged
    fn commit<'a>(
        &'a self,
        message: &'a str,
        author: &'a Author,
    ) -> BoxFuture<'a, VcsResult<CommitInfo>>;

    /// Newest-first history, at most `depth` entries, optionally limited to one path
    fn log<'a>(
        &'a self,
        depth: usize,
        path_filter: Option<&'a str>,
    ) -> BoxFuture<'a, VcsResult<Vec<CommitInfo>>>;

    /// Push `branch` to `remote`
    fn push<'a>(
        &'a self,
        remote: &'a str,
        branch: &'a str,
        credential: Option<&'a Credential>,
    ) -> BoxFuture<'a, VcsResult<()>>;

    /// Pull `branch` from `remote`. A merge commit is made as `author`.
    ///
    /// Conflicting changes are never left in the working tree: the backend
    /// rolls the merge back and returns [`VcsError::MergeConflict`].
    fn pull<'a>(
        &'a self,
        remote: &'a str,
        branch: &'a str,
        credential: Option<&'a Credential>,
        author: &'a Author,
    ) -> BoxFuture<'a, VcsResult<PullOutcome>>;

    /// File content at a revision
    fn read_file_at<'a>(
        &'a self,
        revision: &'a str,
        path: &'a str,
    ) -> BoxFuture<'a, VcsResult<String>>;

    /// Whether `remote` is configured
    fn has_remote<'a>(&'a self, remote: &'a str) -> BoxFuture<'a, VcsResult<bool>>;
}

impl<T: VersionControl + ?Sized> VersionControl for Arc<T> {
    fn init(&self) -> BoxFuture<'_, VcsResult<()>> {
        (**self).init()
    }

    fn status(&self) -> BoxFuture<'_, VcsResult<Vec<FileStatus>>> {
        (**self).status()
    }

    fn stage<'a>(&'a self, path: &'a str) -> BoxFuture<'a, VcsResult<()>> {
        (**self).stage(path)
    }

    fn unstage<'a>(&'a self, path: &'a str) -> BoxFuture<'a, VcsResult<()>> {
        (**self).unstage(path)
    }

    fn remove<'a>(&'a self, path: &'a str) -> BoxFuture<'a, VcsResult<()>> {
        (**self).remove(path)
    }

    fn commit<'a>(
        &'a self,
        message: &'a str,
        author: &'a Author,
    ) -> BoxFuture<'a, VcsResult<CommitInfo>> {
        (**self).commit(message, author)
    }

    fn log<'a>(
        &'a self,
        depth: usize,
        path_filter: Option<&'a str>,
    ) -> BoxFuture<'a, VcsResult<Vec<CommitInfo>>> {
        (**self).log(depth, path_filter)
    }

    fn push<'a>(
        &'a self,
        remote: &'a str,
        branch: &'a str,
        credential: Option<&'a Credential>,
    ) -> BoxFuture<'a, VcsResult<()>> {
        (**self).push(remote, branch, credential)
    }

    fn pull<'a>(
        &'a self,
        remote: &'a str,
        branch: &'a str,
        credential: Option<&'a Credential>,
        author: &'a Author,
    ) -> BoxFuture<'a, VcsResult<PullOutcome>> {
        (**self).pull(remote, branch, credential, author)
    }

    fn read_file_at<'a>(
        &'a self,
        revision: &'a str,
        path: &'a str,
    ) -> BoxFuture<'a, VcsResult<String>> {
        (**self).read_file_at(revision, path)
    }

    fn has_remote<'a>(&'a self, remote: &'a str) -> BoxFuture<'a, VcsResult<bool>> {
        (**self).has_remote(remote)
    }
}
