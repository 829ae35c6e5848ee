//! Sync coordinator behavior against a working tree on disk.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use folia_core::config::Config;
use folia_core::document::DocumentId;
use folia_core::fs::{FileSystem, RealFileSystem, SyncToAsyncFs};
use folia_core::store::DocumentStore;
use folia_core::sync::{Backoff, SyncCoordinator, SyncStepOutcome};
use folia_core::vcs::{Author, InMemoryVcs, VersionControl};
use tempfile::TempDir;

type Vcs = InMemoryVcs<RealFileSystem>;

async fn repository() -> (TempDir, Arc<Vcs>, SyncCoordinator<Vcs>, Config) {
    let dir = tempfile::tempdir().unwrap();
    let vcs = Arc::new(InMemoryVcs::new(RealFileSystem, dir.path()));
    vcs.init().await.unwrap();
    vcs.add_remote("origin").unwrap();

    let config = Config::new(dir.path().to_path_buf());
    let coordinator = SyncCoordinator::new(Arc::clone(&vcs), &config);
    (dir, vcs, coordinator, config)
}

#[test]
fn backoff_doubles_after_three_failures_then_resets() {
    let base = Duration::from_secs(300);
    let mut backoff = Backoff::new(base);

    for _ in 0..3 {
        backoff.record_failure();
    }
    assert_eq!(backoff.next_delay(), base * 2);

    backoff.record_success(Utc::now());
    assert_eq!(backoff.next_delay(), base);
}

#[tokio::test]
async fn remote_edit_to_open_document_is_reported_not_applied_to_buffer() {
    let (dir, vcs, coordinator, _config) = repository().await;
    let store = DocumentStore::new(SyncToAsyncFs::new(RealFileSystem), dir.path());

    let id = store.create("Meeting Notes", None).await.unwrap();
    let mut open = store.read(&id).await.unwrap();
    open.body = "local draft\n".to_string();
    store.update(&open).await.unwrap();

    // R1: the local state, pushed
    let first = coordinator.sync(None).await.unwrap();
    assert!(first.committed.is_some());
    assert_eq!(first.push, SyncStepOutcome::Done);
    let r1 = vcs.log(1, None).await.unwrap().remove(0);

    // R2: another device edits the same page
    let remote_author = Author::new("Grace", "grace@example.com");
    let r2 = vcs
        .simulate_remote_commit(
            &[("Meeting Notes.md", Some("remote rewrite\n"))],
            "edit from laptop",
            &remote_author,
        )
        .unwrap();

    let buffer_before = open.clone();
    let report = coordinator.sync(Some(&id)).await.unwrap();

    let change = report.remote_change.expect("remote change reported");
    assert_eq!(change.author, remote_author);
    assert_eq!(change.old_revision.as_deref(), Some(r1.id.as_str()));
    assert_eq!(change.new_revision, r2.id);
    assert_eq!(change.old_content.as_deref(), Some("local draft\n"));
    assert_eq!(change.new_content, "remote rewrite\n");

    // The in-memory open document is untouched; only the working tree moved
    assert_eq!(open, buffer_before);
    assert_eq!(open.body, "local draft\n");
    let on_disk = RealFileSystem
        .read_to_string(&dir.path().join("Meeting Notes.md"))
        .unwrap();
    assert_eq!(on_disk, "remote rewrite\n");
}

#[tokio::test]
async fn push_failure_and_missing_remote_are_not_errors() {
    let (dir, vcs, coordinator, _config) = repository().await;
    RealFileSystem
        .write_file(&dir.path().join("a.md"), "a")
        .unwrap();

    vcs.set_fail_push(true).unwrap();
    let report = coordinator.sync(None).await.unwrap();
    assert!(report.committed.is_some());
    assert_eq!(report.pull, SyncStepOutcome::Done);
    assert!(report.push.is_failed());

    let unconfigured = tempfile::tempdir().unwrap();
    let lonely = Arc::new(InMemoryVcs::new(RealFileSystem, unconfigured.path()));
    lonely.init().await.unwrap();
    let coordinator = SyncCoordinator::new(lonely, &Config::new(unconfigured.path().to_path_buf()));
    assert_eq!(coordinator.push().await, SyncStepOutcome::NoRemote);
    assert_eq!(coordinator.pull().await, SyncStepOutcome::NoRemote);
}

#[tokio::test]
async fn concurrent_syncs_are_serialized() {
    let (dir, _vcs, coordinator, _config) = repository().await;
    let coordinator = Arc::new(coordinator);
    for i in 0..5 {
        RealFileSystem
            .write_file(&dir.path().join(format!("n{}.md", i)), "x")
            .unwrap();
    }

    let open = DocumentId::parse("n0").unwrap();
    let a = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        let open = open.clone();
        async move { coordinator.sync(Some(&open)).await }
    });
    let b = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.sync(None).await }
    });

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();
    // Exactly one run saw the changes; the other found a clean tree
    assert_eq!(
        [a.committed.is_some(), b.committed.is_some()]
            .iter()
            .filter(|c| **c)
            .count(),
        1
    );
    assert!(coordinator.status().await.unwrap().is_empty());
}
