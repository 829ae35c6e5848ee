//! The services of one open workspace, bundled into a value.
//!
//! A [`WorkspaceContext`] is created when a workspace is opened and closed when
//! the user switches away. Closing cancels its token, which stops every scan
//! and the auto-sync loop it started, so nothing computed for the old
//! workspace lands in the new one. [`ActiveWorkspace`] is an owned slot for
//! applications that need "the current workspace"; there is no global.

use std::sync::{Arc, Mutex, RwLock as StdRwLock};

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::document::{DocumentId, DocumentMeta};
use crate::error::{FoliaError, Result};
use crate::fs::AsyncFileSystem;
use crate::indexer::{BacklinkIndex, WorkspaceIndexer, backlinks_from, metas_from};
use crate::search::{SearchIndex, SearchResult};
use crate::store::DocumentStore;
use crate::sync::{AutoSync, OpenDocument, SyncCoordinator, SyncEvent};
use crate::task::BackgroundTask;
use crate::tree::{TreeNode, build_tree};
use crate::vcs::VersionControl;

/// Everything derived from one full scan of the workspace
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub metas: Vec<DocumentMeta>,
    pub tree: Vec<TreeNode>,
    pub backlinks: BacklinkIndex,
}

/// Services bound to one workspace root.
pub struct WorkspaceContext<FS: AsyncFileSystem, V: VersionControl> {
    config: Config,
    store: DocumentStore<FS>,
    indexer: Arc<WorkspaceIndexer<FS>>,
    search: Arc<RwLock<SearchIndex>>,
    sync: Arc<SyncCoordinator<V>>,
    open_document: OpenDocument,
    cancel: CancellationToken,
    auto_sync: Mutex<Option<AutoSync>>,
}

impl<FS, V> WorkspaceContext<FS, V>
where
    FS: AsyncFileSystem + Clone + 'static,
    V: VersionControl + 'static,
{
    /// Open the workspace at `config.workspace`, initializing its repository
    pub async fn open(config: Config, fs: FS, vcs: V) -> Result<Self> {
        let root = config.workspace.clone();
        if !fs.is_dir(&root).await {
            return Err(FoliaError::WorkspaceNotFound(root));
        }
        vcs.init().await?;

        log::info!("Opened workspace {:?}", root);
        let sync = Arc::new(SyncCoordinator::new(Arc::new(vcs), &config));
        Ok(Self {
            store: DocumentStore::new(fs.clone(), root.clone()),
            indexer: Arc::new(WorkspaceIndexer::new(fs, root)),
            search: Arc::new(RwLock::new(SearchIndex::new())),
            sync,
            open_document: OpenDocument::new(),
            cancel: CancellationToken::new(),
            auto_sync: Mutex::new(None),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &DocumentStore<FS> {
        &self.store
    }

    pub fn indexer(&self) -> &WorkspaceIndexer<FS> {
        &self.indexer
    }

    pub fn sync(&self) -> &Arc<SyncCoordinator<V>> {
        &self.sync
    }

    pub fn open_document(&self) -> &OpenDocument {
        &self.open_document
    }

    /// Token cancelled when this context closes
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Re-list the workspace, rebuild the search index and the backlink graph.
    pub async fn refresh(&self) -> Result<Snapshot> {
        refresh_with(&self.indexer, &self.search, &self.cancel).await
    }

    /// [`refresh`](Self::refresh) on a background task
    pub fn spawn_refresh(&self) -> BackgroundTask<Snapshot> {
        let indexer = Arc::clone(&self.indexer);
        let search = Arc::clone(&self.search);
        BackgroundTask::spawn(self.cancel.child_token(), move |cancel| async move {
            refresh_with(&indexer, &search, &cancel).await
        })
    }

    /// Ranked title/tag matches from the last refresh plus incremental updates
    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        self.search.read().await.search(query)
    }

    /// Add or replace one entry in the search index
    pub async fn index_document(&self, meta: &DocumentMeta) {
        self.search.write().await.add_document(meta);
    }

    /// Drop one entry from the search index
    pub async fn unindex_document(&self, id: &DocumentId) -> bool {
        self.search.write().await.remove_document(id)
    }

    /// Start auto-sync unless it is already running. Returns whether it runs.
    pub async fn start_auto_sync(&self) -> bool {
        if self.with_auto_sync(|auto| auto.is_running()).unwrap_or(false) {
            return true;
        }
        if self.is_closed() {
            return false;
        }

        let started = AutoSync::start(
            Arc::clone(&self.sync),
            &self.config,
            self.open_document.clone(),
            self.cancel.child_token(),
        )
        .await;
        let running = started.is_some();
        *self.auto_sync_slot() = started;
        running
    }

    /// Stop auto-sync if it is running
    pub fn stop_auto_sync(&self) {
        if let Some(auto) = self.auto_sync_slot().take() {
            auto.stop();
        }
    }

    /// Run an auto-sync pass now (focus regained)
    pub fn trigger_sync(&self) {
        self.with_auto_sync(|auto| auto.trigger_now());
    }

    /// Events from the auto-sync loop, if it runs
    pub fn subscribe_sync(&self) -> Option<broadcast::Receiver<SyncEvent>> {
        self.with_auto_sync(|auto| auto.subscribe())
    }

    /// Cancel background scans and stop auto-sync
    pub fn close(&self) {
        log::info!("Closing workspace {:?}", self.config.workspace);
        self.cancel.cancel();
        self.stop_auto_sync();
    }

    fn auto_sync_slot(&self) -> std::sync::MutexGuard<'_, Option<AutoSync>> {
        self.auto_sync
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_auto_sync<T>(&self, f: impl FnOnce(&AutoSync) -> T) -> Option<T> {
        self.auto_sync_slot().as_ref().map(f)
    }
}

impl<FS: AsyncFileSystem, V: VersionControl> Drop for WorkspaceContext<FS, V> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn refresh_with<FS: AsyncFileSystem>(
    indexer: &WorkspaceIndexer<FS>,
    search: &RwLock<SearchIndex>,
    cancel: &CancellationToken,
) -> Result<Snapshot> {
    let documents = indexer.load_documents(cancel).await?;
    let metas = metas_from(&documents);
    let backlinks = backlinks_from(&documents);
    let tree = build_tree(&metas);

    if cancel.is_cancelled() {
        return Err(FoliaError::Cancelled);
    }
    search.write().await.rebuild(&metas);

    log::debug!("Refreshed {} entries", metas.len());
    Ok(Snapshot {
        metas,
        tree,
        backlinks,
    })
}

/// Slot holding the workspace the application is currently showing.
pub struct ActiveWorkspace<FS: AsyncFileSystem, V: VersionControl> {
    slot: StdRwLock<Option<Arc<WorkspaceContext<FS, V>>>>,
}

impl<FS, V> Default for ActiveWorkspace<FS, V>
where
    FS: AsyncFileSystem,
    V: VersionControl,
{
    fn default() -> Self {
        Self {
            slot: StdRwLock::new(None),
        }
    }
}

impl<FS, V> ActiveWorkspace<FS, V>
where
    FS: AsyncFileSystem + Clone + 'static,
    V: VersionControl + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `ctx`, closing the previous workspace first. Returns the new context.
    pub fn switch(&self, ctx: WorkspaceContext<FS, V>) -> Arc<WorkspaceContext<FS, V>> {
        let ctx = Arc::new(ctx);
        let mut slot = self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = slot.take() {
            previous.close();
        }
        *slot = Some(Arc::clone(&ctx));
        ctx
    }

    /// The active workspace
    pub fn current(&self) -> Result<Arc<WorkspaceContext<FS, V>>> {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(FoliaError::WorkspaceNotInitialized)
    }

    /// Close and remove the active workspace
    pub fn clear(&self) {
        let previous = self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(previous) = previous {
            previous.close();
        }
    }
}
