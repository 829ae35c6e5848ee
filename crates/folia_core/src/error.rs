use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::vcs::VcsError;

/// Unified error type for folia operations
#[derive(Debug, Error)]
pub enum FoliaError {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to move '{from}' to '{to}': {source}")]
    FileMove {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    // Frontmatter errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // Config errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    // Document errors
    #[error("Document '{0}' not found")]
    DocumentNotFound(String),

    #[error("Folder '{0}' not found")]
    FolderNotFound(String),

    #[error("Invalid document id '{id}': {message}")]
    InvalidId { id: String, message: String },

    #[error("Trash entry '{0}' not found")]
    TrashEntryNotFound(String),

    // Version control errors
    #[error("Version control error: {0}")]
    Vcs(#[from] VcsError),

    // Workspace errors
    #[error("Workspace not found at '{0}'")]
    WorkspaceNotFound(PathBuf),

    #[error("No workspace is active. Open a workspace before using its services.")]
    WorkspaceNotInitialized,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

/// Result type alias for folia operations
pub type Result<T> = std::result::Result<T, FoliaError>;

/// A serializable representation of FoliaError for IPC
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Associated path (if applicable)
    pub path: Option<PathBuf>,
}

impl From<&FoliaError> for SerializableError {
    fn from(err: &FoliaError) -> Self {
        let kind = match err {
            FoliaError::Io(_) => "Io",
            FoliaError::FileRead { .. } => "FileRead",
            FoliaError::FileWrite { .. } => "FileWrite",
            FoliaError::FileMove { .. } => "FileMove",
            FoliaError::Yaml(_) => "Yaml",
            FoliaError::ConfigParse(_) => "ConfigParse",
            FoliaError::ConfigSerialize(_) => "ConfigSerialize",
            FoliaError::NoConfigDir => "NoConfigDir",
            FoliaError::DocumentNotFound(_) => "DocumentNotFound",
            FoliaError::FolderNotFound(_) => "FolderNotFound",
            FoliaError::InvalidId { .. } => "InvalidId",
            FoliaError::TrashEntryNotFound(_) => "TrashEntryNotFound",
            FoliaError::Vcs(_) => "Vcs",
            FoliaError::WorkspaceNotFound(_) => "WorkspaceNotFound",
            FoliaError::WorkspaceNotInitialized => "WorkspaceNotInitialized",
            FoliaError::Cancelled => "Cancelled",
            FoliaError::TaskFailed(_) => "TaskFailed",
        }
        .to_string();

        let path = match err {
            FoliaError::FileRead { path, .. } => Some(path.clone()),
            FoliaError::FileWrite { path, .. } => Some(path.clone()),
            FoliaError::FileMove { from, .. } => Some(from.clone()),
            FoliaError::WorkspaceNotFound(path) => Some(path.clone()),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            path,
        }
    }
}

impl From<FoliaError> for SerializableError {
    fn from(err: FoliaError) -> Self {
        SerializableError::from(&err)
    }
}

impl FoliaError {
    /// Convert to a serializable representation for IPC
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }

    /// Returns true if this error means the target file does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            FoliaError::DocumentNotFound(_) | FoliaError::FolderNotFound(_) => true,
            FoliaError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            FoliaError::FileRead { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
