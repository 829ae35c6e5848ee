//! Filesystem abstraction module.
//!
//! This module provides the `FileSystem` trait for abstracting filesystem operations,
//! allowing the document store and indexer to run against the real disk or an
//! in-memory tree (tests, embedded consumers).
//!
//! For async operations, see the `AsyncFileSystem` trait and `SyncToAsyncFs` adapter.
//! Every core operation goes through `AsyncFileSystem`, so a caller may suspend on any
//! filesystem access.

mod async_fs;
mod memory;
#[cfg(not(target_arch = "wasm32"))]
mod native;

pub use async_fs::{AsyncFileSystem, BoxFuture, SyncToAsyncFs};

#[cfg(test)]
pub(crate) use async_fs::block_on_test;
pub use memory::InMemoryFileSystem;
#[cfg(not(target_arch = "wasm32"))]
pub use native::RealFileSystem;

use std::io::Result;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Size and timestamps of a file or directory.
///
/// Timestamps are milliseconds since the Unix epoch; `None` when the platform
/// (or an in-memory implementation) cannot report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// Last modification time
    pub modified: Option<i64>,
    /// Creation time
    pub created: Option<i64>,
    /// Whether the path is a directory
    pub is_dir: bool,
}

/// Abstraction over filesystem operations
/// Allows for different implementations: real filesystem, in-memory, etc.
/// Send + Sync required for multi-threaded environments.
pub trait FileSystem: Send + Sync {
    /// Reads the file content
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Overwrites a file, creating it if needed
    fn write_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Creates a file ONLY if it doesn't exist.
    /// Should return an error if file exists.
    fn create_new(&self, path: &Path, content: &str) -> Result<()>;

    /// Deletes a file
    fn delete_file(&self, path: &Path) -> Result<()>;

    /// Lists the direct children (files and directories) of a directory
    fn list_entries(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Checks if a file or directory exists
    fn exists(&self, path: &Path) -> bool;

    /// Checks if a path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Creates a directory and all parent directories
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Removes a directory and everything below it
    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    /// Move/rename a file or a whole directory from `from` to `to`.
    ///
    /// Implementations should error if the source does not exist or if the
    /// destination already exists. Missing destination parents are created.
    fn move_path(&self, from: &Path, to: &Path) -> Result<()>;

    /// Size and timestamps for a path
    fn metadata(&self, path: &Path) -> Result<FileMetadata>;
}

// Blanket implementation for references to FileSystem
impl<T: FileSystem> FileSystem for &T {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        (*self).read_to_string(path)
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        (*self).write_file(path, content)
    }

    fn create_new(&self, path: &Path, content: &str) -> Result<()> {
        (*self).create_new(path, content)
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        (*self).delete_file(path)
    }

    fn list_entries(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        (*self).list_entries(dir)
    }

    fn exists(&self, path: &Path) -> bool {
        (*self).exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        (*self).is_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        (*self).create_dir_all(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        (*self).remove_dir_all(path)
    }

    fn move_path(&self, from: &Path, to: &Path) -> Result<()> {
        (*self).move_path(from, to)
    }

    fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        (*self).metadata(path)
    }
}
