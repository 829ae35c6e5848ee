//! Workspace indexer: recursive document discovery, folder synthesis and the
//! backlink graph.
//!
//! Nothing is cached. Every call re-reads the workspace from the filesystem, so
//! results are only as fresh as the last call. Long scans check a
//! [`CancellationToken`] between directories and files so a workspace switch can
//! abandon them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::document::{DOCUMENT_EXTENSION, Document, DocumentId, DocumentMeta};
use crate::error::{FoliaError, Result};
use crate::fs::AsyncFileSystem;
use crate::link_parser::{LinkTarget, parse_wiki_links};
use crate::path_utils::is_hidden_name;

/// Target id -> ids of documents linking to it
pub type BacklinkIndex = BTreeMap<DocumentId, BTreeSet<DocumentId>>;

/// Source id -> link titles that match no document
pub type UnresolvedLinks = BTreeMap<DocumentId, Vec<String>>;

fn check(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(FoliaError::Cancelled)
    } else {
        Ok(())
    }
}

/// Walk `start` (a directory below `root`) and return the id of every markdown
/// file, skipping hidden entries such as `.git` and `.trash`.
///
/// Unreadable directories are logged and skipped.
pub(crate) async fn walk_documents<FS: AsyncFileSystem + ?Sized>(
    fs: &FS,
    root: &Path,
    start: &Path,
    cancel: &CancellationToken,
) -> Result<Vec<DocumentId>> {
    let mut ids = Vec::new();
    let mut pending = vec![start.to_path_buf()];

    while let Some(dir) = pending.pop() {
        check(cancel)?;
        let entries = match fs.list_entries(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Skipping unreadable directory {:?}: {}", dir, e);
                continue;
            }
        };

        for path in entries {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            if is_hidden_name(&name) {
                continue;
            }
            if fs.is_dir(&path).await {
                pending.push(path);
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            match DocumentId::from_relative_path(relative) {
                Ok(id) => ids.push(id),
                Err(e) => log::debug!("Skipping {:?}: {}", path, e),
            }
        }
    }

    ids.sort();
    Ok(ids)
}

/// Build the flat listing for a set of loaded documents: one entry per
/// document plus one folder placeholder per directory without a document of its own.
pub fn metas_from(documents: &[Document]) -> Vec<DocumentMeta> {
    let mut metas: BTreeMap<DocumentId, DocumentMeta> = BTreeMap::new();
    let mut dirs: BTreeSet<DocumentId> = BTreeSet::new();

    for doc in documents {
        dirs.extend(doc.id().ancestors());
        metas.insert(doc.id().clone(), doc.meta.clone());
    }
    for dir in dirs {
        metas
            .entry(dir.clone())
            .or_insert_with(|| DocumentMeta::folder(dir));
    }

    metas.into_values().collect()
}

/// Title -> id over all documents; on duplicate titles the last one (by id) wins.
pub fn title_map(documents: &[Document]) -> HashMap<String, DocumentId> {
    documents
        .iter()
        .map(|doc| (doc.title().to_string(), doc.id().clone()))
        .collect()
}

fn resolve(target: &LinkTarget, titles: &HashMap<String, DocumentId>) -> Option<DocumentId> {
    match target {
        LinkTarget::Id(id) => DocumentId::parse(id).ok(),
        LinkTarget::Title(title) => titles.get(title).cloned(),
    }
}

/// Resolved link targets of one body, deduplicated in order of first appearance.
pub fn outgoing_links(body: &str, titles: &HashMap<String, DocumentId>) -> Vec<DocumentId> {
    let mut seen = BTreeSet::new();
    parse_wiki_links(body)
        .iter()
        .filter_map(|link| resolve(&link.target, titles))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Build the backlink graph over loaded documents.
///
/// Explicit `[[title|id]]` links are taken as-is, bare `[[title]]` links are
/// resolved through [`title_map`]. Self-links and unresolved titles are skipped.
pub fn backlinks_from(documents: &[Document]) -> BacklinkIndex {
    let titles = title_map(documents);
    let mut index = BacklinkIndex::new();

    for doc in documents {
        for target in outgoing_links(&doc.body, &titles) {
            if &target == doc.id() {
                continue;
            }
            index.entry(target).or_default().insert(doc.id().clone());
        }
    }
    index
}

/// Bare-title links that match no document, per source document.
pub fn unresolved_from(documents: &[Document]) -> UnresolvedLinks {
    let titles = title_map(documents);
    let mut result = UnresolvedLinks::new();

    for doc in documents {
        let mut missing: Vec<String> = Vec::new();
        for link in parse_wiki_links(&doc.body) {
            if let LinkTarget::Title(title) = &link.target
                && !titles.contains_key(title)
                && !missing.contains(title)
            {
                missing.push(title.clone());
            }
        }
        if !missing.is_empty() {
            result.insert(doc.id().clone(), missing);
        }
    }
    result
}

/// Scans a workspace directory for documents.
pub struct WorkspaceIndexer<FS: AsyncFileSystem> {
    fs: FS,
    root: std::path::PathBuf,
}

impl<FS: AsyncFileSystem> WorkspaceIndexer<FS> {
    /// Create an indexer for the workspace at `root`
    pub fn new(fs: FS, root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    /// Ids of every markdown document in the workspace, sorted.
    pub async fn scan_dir(&self, cancel: &CancellationToken) -> Result<Vec<DocumentId>> {
        walk_documents(&self.fs, &self.root, &self.root, cancel).await
    }

    /// Read and parse every document. Unreadable files are logged and skipped.
    pub async fn load_documents(&self, cancel: &CancellationToken) -> Result<Vec<Document>> {
        let ids = self.scan_dir(cancel).await?;
        let mut documents = Vec::with_capacity(ids.len());

        for id in ids {
            check(cancel)?;
            let path = self.root.join(id.to_relative_path());
            match self.fs.read_to_string(&path).await {
                Ok(content) => {
                    documents.push(Document::from_content(id, &content));
                }
                Err(e) => log::warn!("Skipping unreadable document {:?}: {}", path, e),
            }
        }
        Ok(documents)
    }

    /// Flat listing of every document and synthesized folder, sorted by id.
    pub async fn list_all(&self, cancel: &CancellationToken) -> Result<Vec<DocumentMeta>> {
        let documents = self.load_documents(cancel).await?;
        Ok(metas_from(&documents))
    }

    /// Build the backlink graph for the whole workspace.
    pub async fn build_backlink_index(&self, cancel: &CancellationToken) -> Result<BacklinkIndex> {
        let documents = self.load_documents(cancel).await?;
        Ok(backlinks_from(&documents))
    }

    /// Resolved outgoing links of one document.
    pub async fn outgoing_links(
        &self,
        id: &DocumentId,
        cancel: &CancellationToken,
    ) -> Result<Vec<DocumentId>> {
        let documents = self.load_documents(cancel).await?;
        let doc = documents
            .iter()
            .find(|doc| doc.id() == id)
            .ok_or_else(|| FoliaError::DocumentNotFound(id.to_string()))?;
        Ok(outgoing_links(&doc.body, &title_map(&documents)))
    }

    /// Bare-title links that resolve to nothing, per source document.
    pub async fn unresolved_links(&self, cancel: &CancellationToken) -> Result<UnresolvedLinks> {
        let documents = self.load_documents(cancel).await?;
        Ok(unresolved_from(&documents))
    }
}
