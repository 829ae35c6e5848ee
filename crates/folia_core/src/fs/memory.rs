//! In-memory filesystem implementation.

use std::collections::{HashMap, HashSet};
use std::io::{Error, ErrorKind, Result};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::{FileMetadata, FileSystem};

#[derive(Debug, Clone)]
struct MemFile {
    content: String,
    created: i64,
    modified: i64,
}

/// An in-memory filesystem implementation.
/// Useful for testing and for consumers without real filesystem access.
///
/// Clones share the same underlying storage.
#[derive(Clone, Default)]
pub struct InMemoryFileSystem {
    /// Files stored as path -> content
    files: Arc<RwLock<HashMap<PathBuf, MemFile>>>,
    /// Directories that exist (implicitly created when files are added)
    directories: Arc<RwLock<HashSet<PathBuf>>>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn poisoned() -> Error {
    Error::other("in-memory filesystem lock poisoned")
}

impl InMemoryFileSystem {
    /// Create a new empty in-memory filesystem
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filesystem pre-populated with files
    pub fn with_files(entries: Vec<(PathBuf, String)>) -> Self {
        let fs = Self::new();
        for (path, content) in entries {
            // Writes to a fresh filesystem cannot fail
            let _ = fs.write_file(&path, &content);
        }
        fs
    }

    /// Load files from a list of (path_string, content) tuples
    pub fn load_from_entries(entries: Vec<(String, String)>) -> Self {
        Self::with_files(
            entries
                .into_iter()
                .map(|(path, content)| (PathBuf::from(path), content))
                .collect(),
        )
    }

    /// Export all files as (path_string, content) tuples, sorted by path
    pub fn export_entries(&self) -> Vec<(String, String)> {
        let Ok(files) = self.files.read() else {
            return Vec::new();
        };
        let mut entries: Vec<_> = files
            .iter()
            .map(|(path, file)| (path.to_string_lossy().to_string(), file.content.clone()))
            .collect();
        entries.sort();
        entries
    }

    /// Get a list of all file paths in the filesystem
    pub fn list_all_files(&self) -> Vec<PathBuf> {
        self.files
            .read()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Helper to normalize paths (remove . and .. components where possible)
    fn normalize_path(path: &Path) -> PathBuf {
        let mut components = Vec::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    components.pop();
                }
                c => components.push(c),
            }
        }
        components.iter().collect()
    }

    fn insert_parents(dirs: &mut HashSet<PathBuf>, path: &Path) {
        let mut current = path;
        while let Some(parent) = current.parent() {
            if parent.as_os_str().is_empty() {
                break;
            }
            dirs.insert(parent.to_path_buf());
            current = parent;
        }
    }
}

impl FileSystem for InMemoryFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let normalized = Self::normalize_path(path);
        let files = self.files.read().map_err(|_| poisoned())?;
        files
            .get(&normalized)
            .map(|f| f.content.clone())
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("File not found: {:?}", path)))
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        let normalized = Self::normalize_path(path);
        {
            let mut dirs = self.directories.write().map_err(|_| poisoned())?;
            if dirs.contains(&normalized) {
                return Err(Error::new(
                    ErrorKind::IsADirectory,
                    format!("Is a directory: {:?}", path),
                ));
            }
            Self::insert_parents(&mut dirs, &normalized);
        }

        let now = now_millis();
        let mut files = self.files.write().map_err(|_| poisoned())?;
        let created = files.get(&normalized).map(|f| f.created).unwrap_or(now);
        files.insert(
            normalized,
            MemFile {
                content: content.to_string(),
                created,
                modified: now,
            },
        );
        Ok(())
    }

    fn create_new(&self, path: &Path, content: &str) -> Result<()> {
        let normalized = Self::normalize_path(path);
        {
            let files = self.files.read().map_err(|_| poisoned())?;
            if files.contains_key(&normalized) {
                return Err(Error::new(
                    ErrorKind::AlreadyExists,
                    format!("File already exists: {:?}", path),
                ));
            }
        }
        self.write_file(&normalized, content)
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        let normalized = Self::normalize_path(path);
        let mut files = self.files.write().map_err(|_| poisoned())?;
        files
            .remove(&normalized)
            .map(|_| ())
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("File not found: {:?}", path)))
    }

    fn list_entries(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let normalized = Self::normalize_path(dir);
        let files = self.files.read().map_err(|_| poisoned())?;
        let dirs = self.directories.read().map_err(|_| poisoned())?;

        let mut result: Vec<PathBuf> = files
            .keys()
            .chain(dirs.iter())
            .filter(|path| path.parent() == Some(normalized.as_path()))
            .cloned()
            .collect();
        result.sort();
        Ok(result)
    }

    fn exists(&self, path: &Path) -> bool {
        let normalized = Self::normalize_path(path);
        let in_files = self
            .files
            .read()
            .map(|f| f.contains_key(&normalized))
            .unwrap_or(false);
        in_files || self.is_dir(&normalized)
    }

    fn is_dir(&self, path: &Path) -> bool {
        let normalized = Self::normalize_path(path);
        self.directories
            .read()
            .map(|d| d.contains(&normalized))
            .unwrap_or(false)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let normalized = Self::normalize_path(path);
        if normalized.as_os_str().is_empty() {
            return Ok(());
        }
        let mut dirs = self.directories.write().map_err(|_| poisoned())?;
        Self::insert_parents(&mut dirs, &normalized);
        dirs.insert(normalized);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let normalized = Self::normalize_path(path);
        if !self.is_dir(&normalized) {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("Directory not found: {:?}", path),
            ));
        }
        let mut files = self.files.write().map_err(|_| poisoned())?;
        let mut dirs = self.directories.write().map_err(|_| poisoned())?;
        files.retain(|p, _| !p.starts_with(&normalized));
        dirs.retain(|d| !d.starts_with(&normalized));
        Ok(())
    }

    fn move_path(&self, from: &Path, to: &Path) -> Result<()> {
        let from_norm = Self::normalize_path(from);
        let to_norm = Self::normalize_path(to);

        if !self.exists(&from_norm) {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("Source not found: {:?}", from),
            ));
        }
        if self.exists(&to_norm) {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                format!("Destination already exists: {:?}", to),
            ));
        }
        if to_norm.starts_with(&from_norm) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Cannot move {:?} into itself", from),
            ));
        }

        let mut files = self.files.write().map_err(|_| poisoned())?;
        let mut dirs = self.directories.write().map_err(|_| poisoned())?;

        // Relocate every file at or below the source prefix
        let moved: Vec<PathBuf> = files
            .keys()
            .filter(|p| p.starts_with(&from_norm))
            .cloned()
            .collect();
        for old_path in moved {
            if let Some(file) = files.remove(&old_path)
                && let Ok(relative) = old_path.strip_prefix(&from_norm)
            {
                let new_path = if relative.as_os_str().is_empty() {
                    to_norm.clone()
                } else {
                    to_norm.join(relative)
                };
                files.insert(new_path, file);
            }
        }

        let moved_dirs: Vec<PathBuf> = dirs
            .iter()
            .filter(|d| d.starts_with(&from_norm))
            .cloned()
            .collect();
        for old_dir in moved_dirs {
            dirs.remove(&old_dir);
            if let Ok(relative) = old_dir.strip_prefix(&from_norm) {
                if relative.as_os_str().is_empty() {
                    dirs.insert(to_norm.clone());
                } else {
                    dirs.insert(to_norm.join(relative));
                }
            }
        }
        Self::insert_parents(&mut dirs, &to_norm);

        Ok(())
    }

    fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let normalized = Self::normalize_path(path);
        if self.is_dir(&normalized) {
            return Ok(FileMetadata {
                size: 0,
                modified: None,
                created: None,
                is_dir: true,
            });
        }
        let files = self.files.read().map_err(|_| poisoned())?;
        files
            .get(&normalized)
            .map(|f| FileMetadata {
                size: f.content.len() as u64,
                modified: Some(f.modified),
                created: Some(f.created),
                is_dir: false,
            })
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("File not found: {:?}", path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_fs_basic_operations() {
        let fs = InMemoryFileSystem::new();

        fs.write_file(Path::new("test.md"), "Hello, World!").unwrap();
        assert_eq!(
            fs.read_to_string(Path::new("test.md")).unwrap(),
            "Hello, World!"
        );
        assert!(fs.exists(Path::new("test.md")));

        fs.delete_file(Path::new("test.md")).unwrap();
        assert!(!fs.exists(Path::new("test.md")));
    }

    #[test]
    fn test_list_entries_includes_directories() {
        let fs = InMemoryFileSystem::new();
        fs.write_file(Path::new("ws/a.md"), "a").unwrap();
        fs.write_file(Path::new("ws/sub/b.md"), "b").unwrap();

        let entries = fs.list_entries(Path::new("ws")).unwrap();
        assert_eq!(
            entries,
            vec![PathBuf::from("ws/a.md"), PathBuf::from("ws/sub")]
        );
        assert!(fs.is_dir(Path::new("ws/sub")));
    }

    #[test]
    fn test_move_directory_relocates_subtree() {
        let fs = InMemoryFileSystem::new();
        fs.write_file(Path::new("a/b/c.md"), "c").unwrap();
        fs.write_file(Path::new("a/d.md"), "d").unwrap();

        fs.move_path(Path::new("a"), Path::new("x/y")).unwrap();

        assert!(!fs.exists(Path::new("a")));
        assert_eq!(fs.read_to_string(Path::new("x/y/b/c.md")).unwrap(), "c");
        assert_eq!(fs.read_to_string(Path::new("x/y/d.md")).unwrap(), "d");
        assert!(fs.is_dir(Path::new("x/y/b")));
        assert!(fs.is_dir(Path::new("x")));
    }

    #[test]
    fn test_remove_dir_all() {
        let fs = InMemoryFileSystem::new();
        fs.write_file(Path::new("a/b/c.md"), "c").unwrap();
        fs.write_file(Path::new("ab.md"), "keep").unwrap();

        fs.remove_dir_all(Path::new("a")).unwrap();

        assert!(!fs.exists(Path::new("a/b/c.md")));
        assert!(!fs.is_dir(Path::new("a/b")));
        assert!(fs.exists(Path::new("ab.md")));
    }

    #[test]
    fn test_path_normalization() {
        let fs = InMemoryFileSystem::new();
        fs.write_file(Path::new("dir/./sub/../file.md"), "x").unwrap();
        assert_eq!(fs.read_to_string(Path::new("dir/file.md")).unwrap(), "x");
    }

    #[test]
    fn test_metadata_tracks_size() {
        let fs = InMemoryFileSystem::new();
        fs.write_file(Path::new("a.md"), "abc").unwrap();
        let meta = fs.metadata(Path::new("a.md")).unwrap();
        assert_eq!(meta.size, 3);
        assert!(meta.created.is_some());
    }
}
