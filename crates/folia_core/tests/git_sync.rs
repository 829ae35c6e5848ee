//! Sync coordinator against real `git` repositories sharing a bare remote.
//!
//! Every test returns early when `git` is not on PATH.

#![cfg(feature = "git-cli")]

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use folia_core::config::Config;
use folia_core::document::DocumentId;
use folia_core::sync::{SyncCoordinator, SyncStepOutcome};
use folia_core::vcs::{Author, GitCli, VersionControl, is_git_available};
use tempfile::TempDir;

struct Device {
    dir: TempDir,
    coordinator: SyncCoordinator<GitCli>,
}

impl Device {
    async fn join(remote: &Path, name: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new(dir.path());
        git.init().await.unwrap();
        git.add_remote("origin", remote.to_str().unwrap())
            .await
            .unwrap();

        let mut config = Config::new(dir.path().to_path_buf());
        config.author_name = name.to_string();
        config.author_email = format!("{}@example.com", name.to_lowercase());
        let coordinator = SyncCoordinator::new(Arc::new(git), &config);
        Self { dir, coordinator }
    }

    fn write(&self, relative: &str, content: &str) {
        std::fs::write(self.dir.path().join(relative), content).unwrap();
    }

    fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(relative)).unwrap()
    }
}

fn bare_remote() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let status = Command::new("git")
        .args(["init", "-q", "--bare"])
        .arg(dir.path())
        .status()
        .unwrap();
    assert!(status.success());
    dir
}

fn remote_file(remote: &Path, branch: &str, path: &str) -> Option<String> {
    let output = Command::new("git")
        .arg("--git-dir")
        .arg(remote)
        .args(["show", &format!("{}:{}", branch, path)])
        .output()
        .unwrap();
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).to_string())
}

#[tokio::test]
async fn first_sync_after_init_pushes_the_configured_branch() {
    if !is_git_available() {
        return;
    }
    let remote = bare_remote();
    let ada = Device::join(remote.path(), "Ada").await;
    ada.write("Note.md", "hello\n");

    let report = ada.coordinator.sync(None).await.unwrap();
    assert!(report.committed.is_some());
    assert_eq!(report.pull, SyncStepOutcome::Done);
    assert_eq!(report.push, SyncStepOutcome::Done);
    assert_eq!(
        remote_file(remote.path(), "main", "Note.md").as_deref(),
        Some("hello\n")
    );
}

#[tokio::test]
async fn fast_forward_pull_reports_change_to_open_document() {
    if !is_git_available() {
        return;
    }
    let remote = bare_remote();
    let ada = Device::join(remote.path(), "Ada").await;
    let bob = Device::join(remote.path(), "Bob").await;

    ada.write("Note.md", "v1\n");
    ada.coordinator.sync(None).await.unwrap();
    let first = bob.coordinator.sync(None).await.unwrap();
    assert_eq!(first.pull, SyncStepOutcome::Done);
    assert_eq!(bob.read("Note.md"), "v1\n");

    ada.write("Note.md", "v2\n");
    ada.coordinator.sync(None).await.unwrap();

    let open = DocumentId::parse("Note").unwrap();
    let report = bob.coordinator.sync(Some(&open)).await.unwrap();
    let change = report.remote_change.expect("remote change reported");
    assert_eq!(change.author, Author::new("Ada", "ada@example.com"));
    assert_eq!(change.old_content.as_deref(), Some("v1\n"));
    assert_eq!(change.new_content, "v2\n");
    assert_eq!(bob.read("Note.md"), "v2\n");
}

#[tokio::test]
async fn conflicting_pull_leaves_local_file_and_remote_untouched() {
    if !is_git_available() {
        return;
    }
    let remote = bare_remote();
    let ada = Device::join(remote.path(), "Ada").await;
    let bob = Device::join(remote.path(), "Bob").await;

    ada.write("Note.md", "base\n");
    ada.coordinator.sync(None).await.unwrap();
    bob.coordinator.sync(None).await.unwrap();

    ada.write("Note.md", "remote edit\n");
    ada.coordinator.sync(None).await.unwrap();
    bob.write("Note.md", "local edit\n");

    let open = DocumentId::parse("Note").unwrap();
    let report = bob.coordinator.sync(Some(&open)).await.unwrap();
    assert!(report.committed.is_some());
    assert!(matches!(&report.pull, SyncStepOutcome::Failed(msg) if msg.contains("Note.md")));
    assert!(report.push.is_failed());
    assert!(report.remote_change.is_none());
    assert_eq!(bob.read("Note.md"), "local edit\n");
    assert!(bob.coordinator.status().await.unwrap().is_empty());

    // The next run has nothing to commit and still sends nothing upstream
    let again = bob.coordinator.sync(Some(&open)).await.unwrap();
    assert!(again.committed.is_none());
    assert!(again.pull.is_failed());
    assert_eq!(bob.read("Note.md"), "local edit\n");
    assert_eq!(
        remote_file(remote.path(), "main", "Note.md").as_deref(),
        Some("remote edit\n")
    );
}

#[tokio::test]
async fn diverged_pull_merges_as_configured_author() {
    if !is_git_available() {
        return;
    }
    let remote = bare_remote();
    let ada = Device::join(remote.path(), "Ada").await;
    let bob = Device::join(remote.path(), "Bob").await;

    ada.write("Note.md", "base\n");
    ada.coordinator.sync(None).await.unwrap();
    bob.coordinator.sync(None).await.unwrap();

    ada.write("Other.md", "from ada\n");
    ada.coordinator.sync(None).await.unwrap();
    bob.write("Mine.md", "from bob\n");

    let report = bob.coordinator.sync(None).await.unwrap();
    assert_eq!(report.pull, SyncStepOutcome::Done);
    assert_eq!(report.push, SyncStepOutcome::Done);
    assert_eq!(bob.read("Other.md"), "from ada\n");

    let merge = bob.coordinator.log(1, None).await.unwrap().remove(0);
    assert_eq!(merge.author, Author::new("Bob", "bob@example.com"));
    assert_eq!(
        remote_file(remote.path(), "main", "Mine.md").as_deref(),
        Some("from bob\n")
    );
}
