//! Configuration types for Folia.
//!
//! [`Config`] holds the workspace location, the commit identity and the sync
//! settings. It is persisted as TOML (typically at
//! `~/.config/folia/config.toml` on Unix systems).
//!
//! # Async-first Design
//!
//! Use `Config::load_from()` with an `AsyncFileSystem` to load config.
//! For synchronous contexts, use the `_sync` variants.
//!
//! # Example
//!
//! ```ignore
//! use folia_core::config::Config;
//! use std::path::PathBuf;
//!
//! let config = Config::new(PathBuf::from("/home/user/notes"));
//! let author = config.author();
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FoliaError, Result};
use crate::fs::{AsyncFileSystem, FileSystem, SyncToAsyncFs};
use crate::vcs::{Author, Credential};

fn default_author_name() -> String {
    "Folia".to_string()
}

fn default_author_email() -> String {
    "folia@localhost".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_auto_sync() -> bool {
    true
}

fn default_sync_interval_secs() -> u64 {
    300
}

/// Shortest auto-sync interval honored, in seconds
pub const MIN_SYNC_INTERVAL_SECS: u64 = 10;

/// User-configurable settings for one workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Workspace root directory
    pub workspace: PathBuf,

    /// Name recorded on commits
    #[serde(default = "default_author_name")]
    pub author_name: String,

    /// Email recorded on commits
    #[serde(default = "default_author_email")]
    pub author_email: String,

    // ========================================================================
    // Sync configuration
    // ========================================================================
    /// Remote used for push and pull
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch used for push and pull
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Run the periodic pull/push cycle when a remote exists
    #[serde(default = "default_auto_sync")]
    pub auto_sync: bool,

    /// Base delay between auto-sync runs, in seconds
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Access token for the remote
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl Config {
    /// Create a new config with the given workspace directory
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            workspace,
            author_name: default_author_name(),
            author_email: default_author_email(),
            remote: default_remote(),
            branch: default_branch(),
            auto_sync: default_auto_sync(),
            sync_interval_secs: default_sync_interval_secs(),
            credential: None,
        }
    }

    /// Commit identity
    pub fn author(&self) -> Author {
        Author::new(&self.author_name, &self.author_email)
    }

    /// Base auto-sync interval, never shorter than [`MIN_SYNC_INTERVAL_SECS`]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(MIN_SYNC_INTERVAL_SECS))
    }

    /// Credential handed to push and pull, if a token is configured
    pub fn credential(&self) -> Option<Credential> {
        self.credential.as_deref().map(Credential::token)
    }

    // ========================================================================
    // AsyncFileSystem-based methods
    // ========================================================================

    /// Load config from a specific path using an AsyncFileSystem.
    pub async fn load_from<FS: AsyncFileSystem>(fs: &FS, path: &Path) -> Result<Self> {
        let contents = fs
            .read_to_string(path)
            .await
            .map_err(|e| FoliaError::FileRead {
                path: path.to_path_buf(),
                source: e,
            })?;

        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path using an AsyncFileSystem.
    pub async fn save_to<FS: AsyncFileSystem>(&self, fs: &FS, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs.create_dir_all(parent).await?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs.write_file(path, &contents)
            .await
            .map_err(|e| FoliaError::FileWrite {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(())
    }

    /// Load config from an AsyncFileSystem, returning a fresh config if not found.
    pub async fn load_from_or_default<FS: AsyncFileSystem>(
        fs: &FS,
        path: &Path,
        workspace: PathBuf,
    ) -> Self {
        match Self::load_from(fs, path).await {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default config ({})", e);
                Self::new(workspace)
            }
        }
    }

    // ========================================================================
    // Sync wrappers
    // ========================================================================

    /// Sync wrapper for [`Config::load_from`].
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_sync<FS: FileSystem>(fs: FS, path: &Path) -> Result<Self> {
        futures_lite::future::block_on(Self::load_from(&SyncToAsyncFs::new(fs), path))
    }

    /// Sync wrapper for [`Config::save_to`].
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_sync<FS: FileSystem>(&self, fs: FS, path: &Path) -> Result<()> {
        futures_lite::future::block_on(self.save_to(&SyncToAsyncFs::new(fs), path))
    }
}

// ============================================================================
// Native-only implementation
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
impl Default for Config {
    fn default() -> Self {
        let workspace = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("folia");
        Self::new(workspace)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Config {
    /// Get the config file path (~/.config/folia/config.toml)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("folia").join("config.toml"))
    }

    /// Load config from default location, or return default if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            let contents = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&contents)?;
            return Ok(config);
        }

        Ok(Config::default())
    }

    /// Save config to default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or(FoliaError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
impl Default for Config {
    fn default() -> Self {
        Self::new(PathBuf::from("/workspace"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFileSystem;

    #[test]
    fn test_missing_keys_use_defaults() {
        let config: Config = toml::from_str("workspace = \"/notes\"").unwrap();
        assert_eq!(config, Config::new(PathBuf::from("/notes")));
        assert_eq!(config.sync_interval(), Duration::from_secs(300));
        assert_eq!(config.author(), Author::new("Folia", "folia@localhost"));
        assert!(config.credential().is_none());
    }

    #[test]
    fn test_sync_interval_has_a_floor() {
        let mut config = Config::new(PathBuf::from("/notes"));
        config.sync_interval_secs = 0;
        assert_eq!(
            config.sync_interval(),
            Duration::from_secs(MIN_SYNC_INTERVAL_SECS)
        );

        config.sync_interval_secs = u64::MAX;
        assert_eq!(config.sync_interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let fs = InMemoryFileSystem::new();
        let path = Path::new("cfg/folia/config.toml");
        let mut config = Config::new(PathBuf::from("/notes"));
        config.auto_sync = false;
        config.credential = Some("tok".to_string());

        config.save_to_sync(fs.clone(), path).unwrap();
        let loaded = Config::load_from_sync(fs, path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.credential().unwrap().secret, "tok");
    }

    #[test]
    fn test_load_or_default_falls_back() {
        let fs = SyncToAsyncFs::new(InMemoryFileSystem::new());
        let config = futures_lite::future::block_on(Config::load_from_or_default(
            &fs,
            Path::new("missing.toml"),
            PathBuf::from("/fallback"),
        ));
        assert_eq!(config.workspace, PathBuf::from("/fallback"));
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let fs = InMemoryFileSystem::new();
        fs.write_file(Path::new("bad.toml"), "workspace = [").unwrap();
        assert!(matches!(
            Config::load_from_sync(fs, Path::new("bad.toml")),
            Err(FoliaError::ConfigParse(_))
        ));
    }
}
