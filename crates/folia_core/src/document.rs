//! Document data model.
//!
//! A document is identified by its workspace-relative path without the `.md`
//! extension. The id doubles as the filesystem location and the tree key, so
//! title and parent are always derived from it rather than stored.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{FoliaError, Result};
use crate::frontmatter::{self, MetadataBag};

/// Reserved tag that marks a synthesized folder node for consumers that expect it.
/// It exists only in memory and is never written to a file.
pub const FOLDER_TAG: &str = "__folder";

/// File extension of document files
pub const DOCUMENT_EXTENSION: &str = "md";

/// Workspace-relative path of a document without its extension, `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct DocumentId(String);

impl DocumentId {
    /// Parse an id, normalizing separators and rejecting empty or traversing segments.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.replace('\\', "/");
        let segments: Vec<&str> = normalized
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        if segments.is_empty() {
            return Err(FoliaError::InvalidId {
                id: raw.to_string(),
                message: "id is empty".to_string(),
            });
        }
        if segments.iter().any(|s| *s == "." || *s == "..") {
            return Err(FoliaError::InvalidId {
                id: raw.to_string(),
                message: "id may not contain '.' or '..' segments".to_string(),
            });
        }

        Ok(Self(segments.join("/")))
    }

    /// Build an id from a path relative to the workspace root (`a/b.md` -> `a/b`).
    pub fn from_relative_path(path: &Path) -> Result<Self> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_string_lossy().to_string()),
                Component::CurDir => {}
                _ => {
                    return Err(FoliaError::InvalidId {
                        id: path.to_string_lossy().to_string(),
                        message: "path must be relative to the workspace".to_string(),
                    });
                }
            }
        }
        if let Some(last) = segments.last_mut()
            && let Some(stem) = last.strip_suffix(".md")
        {
            *last = stem.to_string();
        }
        Self::parse(&segments.join("/"))
    }

    /// Path of the backing file relative to the workspace root.
    pub fn to_relative_path(&self) -> PathBuf {
        let mut path: PathBuf = self.0.split('/').collect();
        let file_name = format!("{}.{}", self.title(), DOCUMENT_EXTENSION);
        path.set_file_name(file_name);
        path
    }

    /// Path of the directory with the same id (for folders).
    pub fn to_dir_path(&self) -> PathBuf {
        self.0.split('/').collect()
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment, used as the display title
    pub fn title(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// All but the last segment; `None` at the workspace root
    pub fn parent(&self) -> Option<DocumentId> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| DocumentId(parent.to_string()))
    }

    /// Every ancestor directory id, nearest first
    pub fn ancestors(&self) -> Vec<DocumentId> {
        let mut result = Vec::new();
        let mut current = self.parent();
        while let Some(id) = current {
            current = id.parent();
            result.push(id);
        }
        result
    }

    /// Append a single segment
    pub fn join(&self, name: &str) -> DocumentId {
        DocumentId(format!("{}/{}", self.0, name))
    }

    /// Replace the last segment
    pub fn with_title(&self, name: &str) -> DocumentId {
        match self.parent() {
            Some(parent) => parent.join(name),
            None => DocumentId(name.to_string()),
        }
    }

    /// Number of path segments
    pub fn depth(&self) -> usize {
        self.0.split('/').count()
    }

    /// Whether `self` lies strictly below `folder`
    pub fn is_descendant_of(&self, folder: &DocumentId) -> bool {
        self.0.len() > folder.0.len()
            && self.0.starts_with(&folder.0)
            && self.0.as_bytes()[folder.0.len()] == b'/'
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DocumentId {
    type Err = FoliaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What a listing entry stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A real markdown file
    Document,
    /// A directory that holds documents but has no document of its own
    FolderPlaceholder,
}

/// Listing metadata for a document or a synthesized folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DocumentMeta {
    /// Unique id (relative path without extension)
    pub id: DocumentId,
    /// Display title, derived from the last id segment
    pub title: String,
    /// Parent id, derived from the id; `None` at the workspace root
    pub parent: Option<DocumentId>,
    /// Persisted tags (never contains the folder tag)
    pub tags: Vec<String>,
    /// Document or folder placeholder
    pub kind: NodeKind,
}

impl DocumentMeta {
    /// Metadata for a real document
    pub fn document(id: DocumentId, tags: Vec<String>) -> Self {
        Self {
            title: id.title().to_string(),
            parent: id.parent(),
            id,
            tags,
            kind: NodeKind::Document,
        }
    }

    /// Metadata for a synthesized folder node
    pub fn folder(id: DocumentId) -> Self {
        Self {
            title: id.title().to_string(),
            parent: id.parent(),
            id,
            tags: Vec::new(),
            kind: NodeKind::FolderPlaceholder,
        }
    }

    /// Whether this entry is a synthesized folder
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::FolderPlaceholder
    }

    /// Tags as presented to consumers that still expect the folder marker tag
    pub fn display_tags(&self) -> Vec<String> {
        let mut tags = self.tags.clone();
        if self.is_folder() {
            tags.push(FOLDER_TAG.to_string());
        }
        tags
    }

    /// Whether the entry carries `tag` (case-insensitive)
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// A document with its content, as read from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Listing metadata (id, title, parent, tags)
    pub meta: DocumentMeta,
    /// Markdown body without the metadata header
    pub body: String,
    /// Metadata fields the app does not own, written back unchanged
    pub metadata: MetadataBag,
}

impl Document {
    /// A fresh, empty document
    pub fn new(id: DocumentId) -> Self {
        Self {
            meta: DocumentMeta::document(id, Vec::new()),
            body: String::new(),
            metadata: MetadataBag::default(),
        }
    }

    /// Build a document from raw file content
    pub fn from_content(id: DocumentId, content: &str) -> Self {
        let parsed = frontmatter::parse(content);
        Self {
            meta: DocumentMeta::document(id, parsed.tags),
            body: parsed.body,
            metadata: parsed.metadata,
        }
    }

    /// Serialize back to file content
    pub fn to_content(&self) -> Result<String> {
        frontmatter::serialize(&self.meta.tags, &self.metadata, &self.body)
    }

    /// Id of the document
    pub fn id(&self) -> &DocumentId {
        &self.meta.id
    }

    /// Title of the document
    pub fn title(&self) -> &str {
        &self.meta.title
    }
}

/// Result of looking up an id: either a real document or a folder placeholder.
///
/// A folder cannot be passed where an editable document is expected, which
/// keeps consumers from accidentally writing a folder back as content.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// A document backed by a file
    Document(Document),
    /// A directory without a document of its own (or an id with no file at all)
    Folder(DocumentMeta),
}

impl Entry {
    /// Listing metadata for either variant
    pub fn meta(&self) -> &DocumentMeta {
        match self {
            Entry::Document(doc) => &doc.meta,
            Entry::Folder(meta) => meta,
        }
    }

    /// The document, if this entry is one
    pub fn into_document(self) -> Option<Document> {
        match self {
            Entry::Document(doc) => Some(doc),
            Entry::Folder(_) => None,
        }
    }
}
