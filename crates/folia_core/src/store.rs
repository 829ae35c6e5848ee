//! Document store: create, read, update, rename and soft-delete single documents,
//! plus folder-level rename and delete.
//!
//! Every mutation is a whole-file rewrite or a move. Nothing is ever erased:
//! deletes relocate files into `.trash/` under a flattened name.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::document::{Document, DocumentId, DocumentMeta, Entry};
use crate::error::{FoliaError, Result};
use crate::fs::{AsyncFileSystem, FileMetadata};
use crate::indexer::walk_documents;
use crate::path_utils::{flatten_id, numbered_name, sanitize_title, trash_name, unflatten_name};

/// Directory holding soft-deleted documents, relative to the workspace root
pub const TRASH_DIR: &str = ".trash";

/// Upper bound on ` (n)` probing before falling back to a timestamp suffix
const MAX_PROBE: u32 = 10_000;

/// A soft-deleted document in the trash area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrashEntry {
    /// File stem inside `.trash/`, used to restore the entry
    pub name: String,
    /// Id the document had before it was deleted
    pub original_id: DocumentId,
}

/// Outcome of a best-effort folder delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderDeleteReport {
    /// Trash names of every document that was moved
    pub trashed: Vec<String>,
    /// Documents that could not be moved, with the reason
    pub failed: Vec<(DocumentId, String)>,
    /// Whether the directory itself was removed
    pub removed_dir: bool,
}

/// CRUD over the markdown files of one workspace.
pub struct DocumentStore<FS: AsyncFileSystem> {
    fs: FS,
    root: PathBuf,
}

impl<FS: AsyncFileSystem> DocumentStore<FS> {
    /// Create a store rooted at `root`
    pub fn new(fs: FS, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    /// Workspace root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get a reference to the underlying filesystem
    pub fn fs(&self) -> &FS {
        &self.fs
    }

    /// Absolute path of the file backing `id`
    pub fn path_for(&self, id: &DocumentId) -> PathBuf {
        self.root.join(id.to_relative_path())
    }

    /// Absolute path of the directory with the same id as `id`
    pub fn dir_for(&self, id: &DocumentId) -> PathBuf {
        self.root.join(id.to_dir_path())
    }

    fn trash_dir(&self) -> PathBuf {
        self.root.join(TRASH_DIR)
    }

    fn parent_dir(&self, parent: Option<&DocumentId>) -> PathBuf {
        match parent {
            Some(parent) => self.dir_for(parent),
            None => self.root.clone(),
        }
    }

    fn child_id(parent: Option<&DocumentId>, name: &str) -> Result<DocumentId> {
        match parent {
            Some(parent) => Ok(parent.join(name)),
            None => DocumentId::parse(name),
        }
    }

    /// Candidate name for probe number `n`, falling back to a timestamp when exhausted.
    fn probe_name(name: &str, n: u32) -> String {
        if n > MAX_PROBE {
            format!("{} ({})", name, chrono::Utc::now().timestamp())
        } else {
            numbered_name(name, n)
        }
    }

    /// Whether a document file with this id exists
    pub async fn exists(&self, id: &DocumentId) -> bool {
        self.fs.exists(&self.path_for(id)).await
    }

    /// Whether a directory with this id exists
    pub async fn folder_exists(&self, id: &DocumentId) -> bool {
        self.fs.is_dir(&self.dir_for(id)).await
    }

    /// Create an empty, header-less document and return its id.
    ///
    /// The title is sanitized into a file name; an existing file is never
    /// overwritten, the name is suffixed ` (2)`, ` (3)`, ... instead.
    pub async fn create(&self, title: &str, parent: Option<&DocumentId>) -> Result<DocumentId> {
        let name = sanitize_title(title);
        let dir = self.parent_dir(parent);
        if !dir.as_os_str().is_empty() {
            self.fs
                .create_dir_all(&dir)
                .await
                .map_err(|e| FoliaError::FileWrite {
                    path: dir.clone(),
                    source: e,
                })?;
        }

        let mut n = 1;
        loop {
            let id = Self::child_id(parent, &Self::probe_name(&name, n))?;
            let path = self.path_for(&id);
            if !self.fs.exists(&path).await {
                match self.fs.create_new(&path, "").await {
                    Ok(()) => {
                        log::info!("Created document {}", id);
                        return Ok(id);
                    }
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                    Err(e) => return Err(FoliaError::FileWrite { path, source: e }),
                }
            }
            n += 1;
        }
    }

    /// Look up an id.
    ///
    /// A missing file yields a folder placeholder rather than an error, since the id
    /// may name a directory that holds documents but has none of its own.
    pub async fn get(&self, id: &DocumentId) -> Result<Entry> {
        let path = self.path_for(id);
        match self.fs.read_to_string(&path).await {
            Ok(content) => Ok(Entry::Document(Document::from_content(id.clone(), &content))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Ok(Entry::Folder(DocumentMeta::folder(id.clone())))
            }
            Err(e) => Err(FoliaError::FileRead { path, source: e }),
        }
    }

    /// Read a document, failing with `DocumentNotFound` when no file backs `id`.
    pub async fn read(&self, id: &DocumentId) -> Result<Document> {
        self.get(id)
            .await?
            .into_document()
            .ok_or_else(|| FoliaError::DocumentNotFound(id.to_string()))
    }

    /// Overwrite the file at the document's id with its current tags, metadata and body.
    pub async fn update(&self, doc: &Document) -> Result<()> {
        let path = self.path_for(doc.id());
        let content = doc.to_content()?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            self.fs.create_dir_all(parent).await?;
        }

        self.fs
            .write_file(&path, &content)
            .await
            .map_err(|e| FoliaError::FileWrite { path, source: e })?;
        log::debug!("Updated document {}", doc.id());
        Ok(())
    }

    /// Rename a document within its folder and return the new id.
    pub async fn rename(&self, id: &DocumentId, new_title: &str) -> Result<DocumentId> {
        let from = self.path_for(id);
        if !self.fs.exists(&from).await {
            return Err(FoliaError::DocumentNotFound(id.to_string()));
        }

        let name = sanitize_title(new_title);
        if name == id.title() {
            return Ok(id.clone());
        }

        let mut n = 1;
        let new_id = loop {
            let candidate = id.with_title(&Self::probe_name(&name, n));
            if !self.fs.exists(&self.path_for(&candidate)).await {
                break candidate;
            }
            n += 1;
        };

        let to = self.path_for(&new_id);
        self.move_file(&from, &to).await?;
        log::info!("Renamed {} -> {}", id, new_id);
        Ok(new_id)
    }

    /// Move a document into the trash and return its trash name.
    ///
    /// Trash names never collide: a second document flattening to the same name
    /// gets a `__~n` marker.
    pub async fn delete(&self, id: &DocumentId) -> Result<String> {
        let from = self.path_for(id);
        if !self.fs.exists(&from).await {
            return Err(FoliaError::DocumentNotFound(id.to_string()));
        }

        let trash = self.trash_dir();
        self.fs.create_dir_all(&trash).await?;

        let stem = flatten_id(id.as_str());
        let mut n = 1;
        let (name, to) = loop {
            let name = trash_name(&stem, n);
            let to = trash.join(format!("{}.md", name));
            if !self.fs.exists(&to).await {
                break (name, to);
            }
            n += 1;
        };

        self.move_file(&from, &to).await?;
        log::info!("Moved {} to trash as {}", id, name);
        Ok(name)
    }

    /// Create an empty folder and return its id.
    pub async fn create_folder(&self, parent: Option<&DocumentId>, name: &str) -> Result<DocumentId> {
        let name = sanitize_title(name);
        let mut n = 1;
        loop {
            let id = Self::child_id(parent, &Self::probe_name(&name, n))?;
            if !self.folder_taken(&id).await {
                let dir = self.dir_for(&id);
                self.fs
                    .create_dir_all(&dir)
                    .await
                    .map_err(|e| FoliaError::FileWrite {
                        path: dir,
                        source: e,
                    })?;
                return Ok(id);
            }
            n += 1;
        }
    }

    async fn folder_taken(&self, id: &DocumentId) -> bool {
        self.fs.exists(&self.dir_for(id)).await || self.fs.exists(&self.path_for(id)).await
    }

    /// Rename a folder, moving its whole subtree.
    ///
    /// A document sharing the folder's id moves along with it, so the folder keeps
    /// its own page.
    pub async fn rename_folder(&self, folder: &DocumentId, new_name: &str) -> Result<DocumentId> {
        let from_dir = self.dir_for(folder);
        if !self.fs.is_dir(&from_dir).await {
            return Err(FoliaError::FolderNotFound(folder.to_string()));
        }

        let name = sanitize_title(new_name);
        if name == folder.title() {
            return Ok(folder.clone());
        }

        let mut n = 1;
        let new_id = loop {
            let candidate = folder.with_title(&Self::probe_name(&name, n));
            if !self.folder_taken(&candidate).await {
                break candidate;
            }
            n += 1;
        };

        self.move_file(&from_dir, &self.dir_for(&new_id)).await?;

        let own_page = self.path_for(folder);
        if self.fs.exists(&own_page).await {
            self.move_file(&own_page, &self.path_for(&new_id)).await?;
        }

        log::info!("Renamed folder {} -> {}", folder, new_id);
        Ok(new_id)
    }

    /// Trash every document below a folder, then remove the directory.
    ///
    /// Best-effort: a document that fails to move is recorded and skipped, and a
    /// directory that cannot be removed (or is already gone) is tolerated.
    pub async fn delete_folder(&self, folder: &DocumentId) -> Result<FolderDeleteReport> {
        let dir = self.dir_for(folder);
        if !self.fs.is_dir(&dir).await {
            return Err(FoliaError::FolderNotFound(folder.to_string()));
        }

        let ids = walk_documents(&self.fs, &self.root, &dir, &CancellationToken::new()).await?;
        let mut report = FolderDeleteReport::default();

        for id in ids {
            match self.delete(&id).await {
                Ok(name) => report.trashed.push(name),
                Err(e) => {
                    log::warn!("Failed to trash {} while deleting folder {}: {}", id, folder, e);
                    report.failed.push((id, e.to_string()));
                }
            }
        }

        match self.fs.remove_dir_all(&dir).await {
            Ok(()) => report.removed_dir = true,
            Err(e) => log::debug!("Could not remove folder {:?}: {}", dir, e),
        }

        Ok(report)
    }

    /// List trash entries, sorted by name.
    pub async fn list_trash(&self) -> Result<Vec<TrashEntry>> {
        let trash = self.trash_dir();
        if !self.fs.is_dir(&trash).await {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for path in self.fs.list_entries(&trash).await? {
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            match DocumentId::parse(&unflatten_name(&name)) {
                Ok(original_id) => entries.push(TrashEntry { name, original_id }),
                Err(e) => log::debug!("Skipping trash entry {:?}: {}", path, e),
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Move a trash entry back to its original id (suffixed if that id is taken).
    pub async fn restore(&self, name: &str) -> Result<DocumentId> {
        let name = name.strip_suffix(".md").unwrap_or(name);
        let from = self.trash_dir().join(format!("{}.md", name));
        if !self.fs.exists(&from).await {
            return Err(FoliaError::TrashEntryNotFound(name.to_string()));
        }

        let original = DocumentId::parse(&unflatten_name(name))?;
        let mut n = 1;
        let id = loop {
            let candidate = original.with_title(&Self::probe_name(original.title(), n));
            if !self.fs.exists(&self.path_for(&candidate)).await {
                break candidate;
            }
            n += 1;
        };

        self.move_file(&from, &self.path_for(&id)).await?;
        log::info!("Restored {} from trash", id);
        Ok(id)
    }

    /// Size and timestamps of a document's file.
    pub async fn stat(&self, id: &DocumentId) -> Result<FileMetadata> {
        let path = self.path_for(id);
        match self.fs.metadata(&path).await {
            Ok(meta) if !meta.is_dir => Ok(meta),
            Ok(_) => Err(FoliaError::DocumentNotFound(id.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(FoliaError::DocumentNotFound(id.to_string()))
            }
            Err(e) => Err(FoliaError::FileRead { path, source: e }),
        }
    }

    async fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        self.fs
            .move_path(from, to)
            .await
            .map_err(|e| FoliaError::FileMove {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source: e,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{FOLDER_TAG, NodeKind};
    use crate::fs::{FileSystem, InMemoryFileSystem, SyncToAsyncFs, block_on_test};

    fn store() -> (InMemoryFileSystem, DocumentStore<SyncToAsyncFs<InMemoryFileSystem>>) {
        let fs = InMemoryFileSystem::new();
        let store = DocumentStore::new(SyncToAsyncFs::new(fs.clone()), "ws");
        (fs, store)
    }

    fn id(raw: &str) -> DocumentId {
        DocumentId::parse(raw).unwrap()
    }

    #[test]
    fn test_create_writes_empty_headerless_file() {
        let (fs, store) = store();
        let created = block_on_test(store.create("Getting Started", None)).unwrap();
        assert_eq!(created, id("Getting Started"));
        assert_eq!(
            fs.read_to_string(Path::new("ws/Getting Started.md")).unwrap(),
            ""
        );
    }

    #[test]
    fn test_create_never_overwrites() {
        let (fs, store) = store();
        let parent = id("Projects");
        let first = block_on_test(store.create("Plan?", Some(&parent))).unwrap();
        fs.write_file(Path::new("ws/Projects/Plan.md"), "keep me").unwrap();
        let second = block_on_test(store.create("Plan", Some(&parent))).unwrap();

        assert_eq!(first, id("Projects/Plan"));
        assert_eq!(second, id("Projects/Plan (2)"));
        assert_eq!(
            fs.read_to_string(Path::new("ws/Projects/Plan.md")).unwrap(),
            "keep me"
        );

        let third = block_on_test(store.create("Plan", Some(&parent))).unwrap();
        assert_eq!(third, id("Projects/Plan (3)"));
    }

    #[test]
    fn test_create_with_empty_title_uses_placeholder() {
        let (_fs, store) = store();
        let created = block_on_test(store.create(" ..// ", None)).unwrap();
        assert_eq!(created, id("Untitled"));
    }

    #[test]
    fn test_get_missing_file_is_folder_placeholder() {
        let (fs, store) = store();
        fs.write_file(Path::new("ws/Area/Child.md"), "x").unwrap();

        let entry = block_on_test(store.get(&id("Area"))).unwrap();
        assert_eq!(entry.meta().kind, NodeKind::FolderPlaceholder);
        assert_eq!(entry.meta().display_tags(), vec![FOLDER_TAG.to_string()]);
        assert!(entry.into_document().is_none());

        assert!(block_on_test(store.read(&id("Area"))).unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_preserves_unknown_fields() {
        let (fs, store) = store();
        fs.write_file(
            Path::new("ws/Note.md"),
            "---\nauthor: me\ntags: [a]\n---\nold body\n",
        )
        .unwrap();

        let mut doc = block_on_test(store.read(&id("Note"))).unwrap();
        assert_eq!(doc.meta.tags, vec!["a"]);
        doc.body = "new body\n".to_string();
        doc.meta.tags.push("b".to_string());
        block_on_test(store.update(&doc)).unwrap();

        let written = fs.read_to_string(Path::new("ws/Note.md")).unwrap();
        assert!(written.contains("author: me"));
        assert!(written.ends_with("---\nnew body\n"));

        let reread = block_on_test(store.read(&id("Note"))).unwrap();
        assert_eq!(reread.meta.tags, vec!["a", "b"]);
        assert_eq!(reread.body, "new body\n");
    }

    #[test]
    fn test_update_headerless_stays_headerless() {
        let (fs, store) = store();
        fs.write_file(Path::new("ws/Plain.md"), "# Plain\n").unwrap();
        let mut doc = block_on_test(store.read(&id("Plain"))).unwrap();
        doc.body.push_str("more\n");
        block_on_test(store.update(&doc)).unwrap();
        assert_eq!(
            fs.read_to_string(Path::new("ws/Plain.md")).unwrap(),
            "# Plain\nmore\n"
        );
    }

    #[test]
    fn test_rename_keeps_directory_and_content() {
        let (fs, store) = store();
        fs.write_file(Path::new("ws/a/Old.md"), "content").unwrap();
        fs.write_file(Path::new("ws/a/Taken.md"), "other").unwrap();

        let renamed = block_on_test(store.rename(&id("a/Old"), "Taken")).unwrap();
        assert_eq!(renamed, id("a/Taken (2)"));
        assert_eq!(
            fs.read_to_string(Path::new("ws/a/Taken (2).md")).unwrap(),
            "content"
        );
        assert!(!fs.exists(Path::new("ws/a/Old.md")));

        let same = block_on_test(store.rename(&renamed, "Taken (2)")).unwrap();
        assert_eq!(same, renamed);
    }

    #[test]
    fn test_delete_flattens_into_trash_without_overwriting() {
        let (fs, store) = store();
        fs.write_file(Path::new("ws/a/b.md"), "nested").unwrap();
        fs.write_file(Path::new("ws/a__b.md"), "flat").unwrap();

        let first = block_on_test(store.delete(&id("a/b"))).unwrap();
        let second = block_on_test(store.delete(&id("a__b"))).unwrap();
        assert_eq!(first, "a__b");
        assert_eq!(second, "a__b__~2");
        assert_eq!(
            fs.read_to_string(Path::new("ws/.trash/a__b.md")).unwrap(),
            "nested"
        );
        assert_eq!(
            fs.read_to_string(Path::new("ws/.trash/a__b__~2.md")).unwrap(),
            "flat"
        );
    }

    #[test]
    fn test_list_and_restore_trash() {
        let (fs, store) = store();
        fs.write_file(Path::new("ws/a/b.md"), "nested").unwrap();
        block_on_test(store.delete(&id("a/b"))).unwrap();

        let trash = block_on_test(store.list_trash()).unwrap();
        assert_eq!(
            trash,
            vec![TrashEntry {
                name: "a__b".to_string(),
                original_id: id("a/b")
            }]
        );

        fs.write_file(Path::new("ws/a/b.md"), "replacement").unwrap();
        let restored = block_on_test(store.restore("a__b")).unwrap();
        assert_eq!(restored, id("a/b (2)"));
        assert_eq!(
            fs.read_to_string(Path::new("ws/a/b (2).md")).unwrap(),
            "nested"
        );
        assert!(block_on_test(store.list_trash()).unwrap().is_empty());

        let missing = block_on_test(store.restore("nope")).unwrap_err();
        assert!(matches!(missing, FoliaError::TrashEntryNotFound(_)));
    }

    #[test]
    fn test_numbered_page_keeps_its_id_through_the_trash() {
        let (_fs, store) = store();
        let plan = block_on_test(store.create("Plan", None)).unwrap();
        let second = block_on_test(store.create("Plan", None)).unwrap();
        assert_eq!(second, id("Plan (2)"));

        block_on_test(store.delete(&plan)).unwrap();
        block_on_test(store.delete(&second)).unwrap();

        let trash = block_on_test(store.list_trash()).unwrap();
        assert_eq!(
            trash,
            vec![
                TrashEntry {
                    name: "Plan".to_string(),
                    original_id: id("Plan")
                },
                TrashEntry {
                    name: "Plan (2)".to_string(),
                    original_id: id("Plan (2)")
                },
            ]
        );

        assert_eq!(block_on_test(store.restore("Plan (2)")).unwrap(), id("Plan (2)"));
        assert_eq!(block_on_test(store.restore("Plan")).unwrap(), id("Plan"));
    }

    #[test]
    fn test_rename_folder_moves_subtree_and_own_page() {
        let (fs, store) = store();
        fs.write_file(Path::new("ws/Area.md"), "index").unwrap();
        fs.write_file(Path::new("ws/Area/Deep/Leaf.md"), "leaf").unwrap();

        let renamed = block_on_test(store.rename_folder(&id("Area"), "Zone")).unwrap();
        assert_eq!(renamed, id("Zone"));
        assert_eq!(
            fs.read_to_string(Path::new("ws/Zone/Deep/Leaf.md")).unwrap(),
            "leaf"
        );
        assert_eq!(fs.read_to_string(Path::new("ws/Zone.md")).unwrap(), "index");
        assert!(!fs.exists(Path::new("ws/Area")));
    }

    #[test]
    fn test_delete_folder_trashes_every_document() {
        let (fs, store) = store();
        fs.write_file(Path::new("ws/F/one.md"), "1").unwrap();
        fs.write_file(Path::new("ws/F/two.md"), "2").unwrap();
        fs.write_file(Path::new("ws/F/sub/three.md"), "3").unwrap();
        fs.write_file(Path::new("ws/F/sub/notes.txt"), "not a document").unwrap();

        let report = block_on_test(store.delete_folder(&id("F"))).unwrap();
        assert_eq!(report.trashed.len(), 3);
        assert!(report.failed.is_empty());
        assert!(report.removed_dir);
        assert!(!fs.exists(Path::new("ws/F")));

        let trash = block_on_test(store.list_trash()).unwrap();
        assert_eq!(trash.len(), 3);
    }

    #[test]
    fn test_create_folder_and_stat() {
        let (fs, store) = store();
        let folder = block_on_test(store.create_folder(None, "Inbox")).unwrap();
        assert!(fs.is_dir(Path::new("ws/Inbox")));
        let again = block_on_test(store.create_folder(None, "Inbox")).unwrap();
        assert_eq!(again, id("Inbox (2)"));

        let doc = block_on_test(store.create("Item", Some(&folder))).unwrap();
        let meta = block_on_test(store.stat(&doc)).unwrap();
        assert_eq!(meta.size, 0);
        assert!(block_on_test(store.stat(&folder)).unwrap_err().is_not_found());
    }
}
