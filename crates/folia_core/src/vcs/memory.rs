//! In-process repository with a simulated remote.
//!
//! The working tree is whatever a [`FileSystem`] holds under the root; commits
//! are full snapshots of tracked file contents. The remote is a second history
//! that can be advanced with [`InMemoryVcs::simulate_remote_commit`] to stand in
//! for another device pushing.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::{
    Author, ChangeKind, CommitInfo, Credential, FileStatus, PullOutcome, VcsError, VcsResult,
    VersionControl,
};
use crate::fs::{BoxFuture, FileSystem};

type Tree = BTreeMap<String, String>;

#[derive(Debug, Clone)]
struct Snapshot {
    info: CommitInfo,
    tree: Tree,
}

#[derive(Debug, Default)]
struct Remote {
    name: String,
    history: Vec<Snapshot>,
    fail_push: bool,
    fail_pull: bool,
}

#[derive(Debug, Default)]
struct State {
    initialized: bool,
    history: Vec<Snapshot>,
    /// path -> staged content, `None` for a staged removal
    staged: BTreeMap<String, Option<String>>,
    remote: Option<Remote>,
    counter: u64,
}

impl State {
    fn head_tree(&self) -> Tree {
        self.history.last().map(|s| s.tree.clone()).unwrap_or_default()
    }

    fn next_id(&mut self, parent: Option<&str>, message: &str, tree: &Tree) -> String {
        self.counter += 1;
        let mut hasher = DefaultHasher::new();
        self.counter.hash(&mut hasher);
        parent.hash(&mut hasher);
        message.hash(&mut hasher);
        tree.hash(&mut hasher);
        format!("{:016x}{:08x}", hasher.finish(), self.counter)
    }

    fn snapshot(&mut self, parent: Option<&str>, message: &str, author: &Author, tree: Tree) -> Snapshot {
        let id = self.next_id(parent, message, &tree);
        Snapshot {
            info: CommitInfo {
                id,
                message: message.to_string(),
                author: author.clone(),
                timestamp: Utc::now(),
            },
            tree,
        }
    }

    fn require_init(&self, command: &str) -> VcsResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(VcsError::CommandFailed {
                command: command.to_string(),
                message: "not a repository".to_string(),
            })
        }
    }

    fn remote(&mut self, name: &str) -> VcsResult<&mut Remote> {
        match self.remote.as_mut() {
            Some(remote) if remote.name == name => Ok(remote),
            _ => Err(VcsError::NoRemote(name.to_string())),
        }
    }
}

fn is_prefix(prefix: &[Snapshot], of: &[Snapshot]) -> bool {
    prefix.len() <= of.len()
        && prefix
            .iter()
            .zip(of)
            .all(|(a, b)| a.info.id == b.info.id)
}

fn common_base(a: &[Snapshot], b: &[Snapshot]) -> usize {
    a.iter()
        .zip(b)
        .take_while(|(x, y)| x.info.id == y.info.id)
        .count()
}

fn changed_paths(old: &Tree, new: &Tree) -> BTreeSet<String> {
    old.keys()
        .chain(new.keys())
        .filter(|p| old.get(*p) != new.get(*p))
        .cloned()
        .collect()
}

/// Version control backed by memory, with the working tree on a [`FileSystem`].
pub struct InMemoryVcs<F: FileSystem> {
    fs: F,
    root: PathBuf,
    state: Mutex<State>,
}

impl<F: FileSystem> InMemoryVcs<F> {
    /// Repository over the working tree at `root`. Call `init` before use.
    pub fn new(fs: F, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// Configure a remote named `name` with an empty history
    pub fn add_remote(&self, name: &str) -> VcsResult<()> {
        let mut state = self.lock()?;
        state.remote = Some(Remote {
            name: name.to_string(),
            ..Remote::default()
        });
        Ok(())
    }

    /// Make subsequent pushes fail (network down, rejected credentials, ...)
    pub fn set_fail_push(&self, fail: bool) -> VcsResult<()> {
        if let Some(remote) = self.lock()?.remote.as_mut() {
            remote.fail_push = fail;
        }
        Ok(())
    }

    /// Make subsequent pulls fail
    pub fn set_fail_pull(&self, fail: bool) -> VcsResult<()> {
        if let Some(remote) = self.lock()?.remote.as_mut() {
            remote.fail_pull = fail;
        }
        Ok(())
    }

    /// Commit directly on the remote, as another device pushing would.
    ///
    /// `changes` maps paths to new content, `None` deleting the path.
    pub fn simulate_remote_commit(
        &self,
        changes: &[(&str, Option<&str>)],
        message: &str,
        author: &Author,
    ) -> VcsResult<CommitInfo> {
        let mut state = self.lock()?;
        let remote_name = state
            .remote
            .as_ref()
            .map(|r| r.name.clone())
            .ok_or_else(|| VcsError::NoRemote(String::new()))?;

        let (parent, mut tree) = {
            let remote = state.remote(&remote_name)?;
            let last = remote.history.last();
            (
                last.map(|s| s.info.id.clone()),
                last.map(|s| s.tree.clone()).unwrap_or_default(),
            )
        };
        for (path, content) in changes {
            match content {
                Some(content) => tree.insert(path.to_string(), content.to_string()),
                None => tree.remove(*path),
            };
        }

        let snapshot = state.snapshot(parent.as_deref(), message, author, tree);
        let info = snapshot.info.clone();
        state.remote(&remote_name)?.history.push(snapshot);
        Ok(info)
    }

    /// Latest commit on the remote, if any
    pub fn remote_head(&self) -> VcsResult<Option<CommitInfo>> {
        let state = self.lock()?;
        Ok(state
            .remote
            .as_ref()
            .and_then(|r| r.history.last())
            .map(|s| s.info.clone()))
    }

    fn lock(&self) -> VcsResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| VcsError::Io(std::io::Error::other("repository state lock poisoned")))
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        Some(parts.join("/"))
    }

    /// Every file under the root except `.git/`, by relative path.
    fn working_tree(&self) -> VcsResult<Tree> {
        let mut tree = Tree::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            for path in self.fs.list_entries(&dir)? {
                if path.file_name().is_some_and(|n| n == ".git") {
                    continue;
                }
                if self.fs.is_dir(&path) {
                    pending.push(path);
                } else if let Some(relative) = self.relative(&path) {
                    tree.insert(relative, self.fs.read_to_string(&path)?);
                }
            }
        }
        Ok(tree)
    }

    fn status_now(&self, state: &State) -> VcsResult<Vec<FileStatus>> {
        let head = state.head_tree();
        let working = self.working_tree()?;
        let mut entries = Vec::new();

        for (path, content) in &working {
            let change = match (head.get(path), state.staged.get(path)) {
                (None, Some(Some(_))) => Some(ChangeKind::Added),
                (None, _) => Some(ChangeKind::Untracked),
                (Some(committed), staged) => {
                    let staged_differs = matches!(staged, Some(Some(s)) if s != committed);
                    (content != committed || staged_differs).then_some(ChangeKind::Modified)
                }
            };
            if let Some(change) = change {
                entries.push(FileStatus {
                    path: path.clone(),
                    change,
                });
            }
        }
        for path in head.keys().filter(|p| !working.contains_key(*p)) {
            entries.push(FileStatus {
                path: path.clone(),
                change: ChangeKind::Deleted,
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Bring the working tree from `old` to `new`, refusing to clobber local edits.
    fn checkout(&self, old: &Tree, new: &Tree) -> VcsResult<()> {
        let working = self.working_tree()?;
        let changed = changed_paths(old, new);

        for path in &changed {
            if working.get(path) != old.get(path) {
                return Err(VcsError::CommandFailed {
                    command: "pull".to_string(),
                    message: format!("local changes to '{}' would be overwritten", path),
                });
            }
        }
        for path in changed {
            let full = self.full_path(&path);
            match new.get(&path) {
                Some(content) => self.fs.write_file(&full, content)?,
                None => {
                    if self.fs.exists(&full) {
                        self.fs.delete_file(&full)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn pull_now(&self, remote_name: &str, author: &Author) -> VcsResult<PullOutcome> {
        let mut state = self.lock()?;
        state.require_init("pull")?;
        let remote = state.remote(remote_name)?;
        if remote.fail_pull {
            return Err(VcsError::CommandFailed {
                command: "pull".to_string(),
                message: "could not reach remote".to_string(),
            });
        }
        let remote_history = remote.history.clone();

        if is_prefix(&remote_history, &state.history) {
            return Ok(PullOutcome::UpToDate);
        }

        let old_head = state.head_tree();
        if is_prefix(&state.history, &remote_history) {
            let new_head = remote_history.last().map(|s| s.tree.clone()).unwrap_or_default();
            self.checkout(&old_head, &new_head)?;
            state.history = remote_history;
            return Ok(PullOutcome::FastForward);
        }

        // Diverged: three-way merge at file granularity
        let base_len = common_base(&state.history, &remote_history);
        let base = if base_len == 0 {
            Tree::new()
        } else {
            state.history[base_len - 1].tree.clone()
        };
        let theirs = remote_history.last().map(|s| s.tree.clone()).unwrap_or_default();

        let mut merged = old_head.clone();
        let mut conflicts = Vec::new();
        for path in changed_paths(&base, &theirs) {
            let ours_changed = old_head.get(&path) != base.get(&path);
            if ours_changed && old_head.get(&path) != theirs.get(&path) {
                conflicts.push(path);
                continue;
            }
            match theirs.get(&path) {
                Some(content) => merged.insert(path, content.clone()),
                None => merged.remove(&path),
            };
        }
        if !conflicts.is_empty() {
            return Err(VcsError::MergeConflict(conflicts));
        }

        self.checkout(&old_head, &merged)?;
        let local_only: Vec<Snapshot> = state.history[base_len..].to_vec();
        let parent = remote_history.last().map(|s| s.info.id.clone());
        let merge = state.snapshot(
            parent.as_deref(),
            &format!("Merge branch of remote '{}'", remote_name),
            author,
            merged,
        );

        let mut history = remote_history;
        history.extend(local_only);
        history.push(merge);
        state.history = history;
        Ok(PullOutcome::Merged)
    }
}

impl<F: FileSystem> VersionControl for InMemoryVcs<F> {
    fn init(&self) -> BoxFuture<'_, VcsResult<()>> {
        Box::pin(async move {
            self.fs.create_dir_all(&self.root)?;
            self.lock()?.initialized = true;
            Ok(())
        })
    }

    fn status(&self) -> BoxFuture<'_, VcsResult<Vec<FileStatus>>> {
        Box::pin(async move {
            let state = self.lock()?;
            state.require_init("status")?;
            self.status_now(&state)
        })
    }

    fn stage<'a>(&'a self, path: &'a str) -> BoxFuture<'a, VcsResult<()>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            state.require_init("add")?;
            let content = self.fs.read_to_string(&self.full_path(path))?;
            state.staged.insert(path.to_string(), Some(content));
            Ok(())
        })
    }

    fn unstage<'a>(&'a self, path: &'a str) -> BoxFuture<'a, VcsResult<()>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            state.require_init("reset")?;
            state.staged.remove(path);
            Ok(())
        })
    }

    fn remove<'a>(&'a self, path: &'a str) -> BoxFuture<'a, VcsResult<()>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            state.require_init("rm")?;
            state.staged.insert(path.to_string(), None);
            Ok(())
        })
    }

    fn commit<'a>(
        &'a self,
        message: &'a str,
        author: &'a Author,
    ) -> BoxFuture<'a, VcsResult<CommitInfo>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            state.require_init("commit")?;

            let mut tree = state.head_tree();
            for (path, content) in &state.staged {
                match content {
                    Some(content) => tree.insert(path.clone(), content.clone()),
                    None => tree.remove(path),
                };
            }
            if tree == state.head_tree() {
                return Err(VcsError::CommandFailed {
                    command: "commit".to_string(),
                    message: "nothing to commit".to_string(),
                });
            }

            let parent = state.history.last().map(|s| s.info.id.clone());
            let snapshot = state.snapshot(parent.as_deref(), message, author, tree);
            let info = snapshot.info.clone();
            state.history.push(snapshot);
            state.staged.clear();
            Ok(info)
        })
    }

    fn log<'a>(
        &'a self,
        depth: usize,
        path_filter: Option<&'a str>,
    ) -> BoxFuture<'a, VcsResult<Vec<CommitInfo>>> {
        Box::pin(async move {
            let state = self.lock()?;
            state.require_init("log")?;

            let empty = Tree::new();
            let mut commits = Vec::new();
            for (i, snapshot) in state.history.iter().enumerate().rev() {
                if commits.len() >= depth {
                    break;
                }
                if let Some(path) = path_filter {
                    let parent = if i == 0 {
                        &empty
                    } else {
                        &state.history[i - 1].tree
                    };
                    if parent.get(path) == snapshot.tree.get(path) {
                        continue;
                    }
                }
                commits.push(snapshot.info.clone());
            }
            Ok(commits)
        })
    }

    fn push<'a>(
        &'a self,
        remote: &'a str,
        _branch: &'a str,
        _credential: Option<&'a Credential>,
    ) -> BoxFuture<'a, VcsResult<()>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            state.require_init("push")?;
            let history = state.history.clone();
            let target = state.remote(remote)?;
            if target.fail_push {
                return Err(VcsError::CommandFailed {
                    command: "push".to_string(),
                    message: "could not reach remote".to_string(),
                });
            }
            if !is_prefix(&target.history, &history) {
                return Err(VcsError::CommandFailed {
                    command: "push".to_string(),
                    message: "rejected: remote contains work not present locally".to_string(),
                });
            }
            target.history = history;
            Ok(())
        })
    }

    fn pull<'a>(
        &'a self,
        remote: &'a str,
        _branch: &'a str,
        _credential: Option<&'a Credential>,
        author: &'a Author,
    ) -> BoxFuture<'a, VcsResult<PullOutcome>> {
        Box::pin(async move { self.pull_now(remote, author) })
    }

    fn read_file_at<'a>(
        &'a self,
        revision: &'a str,
        path: &'a str,
    ) -> BoxFuture<'a, VcsResult<String>> {
        Box::pin(async move {
            let state = self.lock()?;
            state.require_init("show")?;
            let snapshot = if revision == "HEAD" {
                state.history.last()
            } else {
                state.history.iter().find(|s| s.info.id == revision)
            }
            .ok_or_else(|| VcsError::RevisionNotFound(revision.to_string()))?;

            snapshot
                .tree
                .get(path)
                .cloned()
                .ok_or_else(|| VcsError::FileNotFound {
                    revision: revision.to_string(),
                    path: path.to_string(),
                })
        })
    }

    fn has_remote<'a>(&'a self, remote: &'a str) -> BoxFuture<'a, VcsResult<bool>> {
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state.remote.as_ref().is_some_and(|r| r.name == remote))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{InMemoryFileSystem, block_on_test};

    fn repo() -> (InMemoryFileSystem, InMemoryVcs<InMemoryFileSystem>) {
        let fs = InMemoryFileSystem::new();
        let vcs = InMemoryVcs::new(fs.clone(), "ws");
        block_on_test(vcs.init()).unwrap();
        (fs, vcs)
    }

    fn author() -> Author {
        Author::new("Ada", "ada@example.com")
    }

    #[test]
    fn test_status_stage_commit_cycle() {
        let (fs, vcs) = repo();
        fs.write_file(Path::new("ws/a.md"), "one").unwrap();
        fs.write_file(Path::new("ws/.git/config"), "ignored").unwrap();

        let status = block_on_test(vcs.status()).unwrap();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].change, ChangeKind::Untracked);

        block_on_test(vcs.stage("a.md")).unwrap();
        assert_eq!(block_on_test(vcs.status()).unwrap()[0].change, ChangeKind::Added);
        let first = block_on_test(vcs.commit("add a", &author())).unwrap();
        assert!(block_on_test(vcs.status()).unwrap().is_empty());

        fs.write_file(Path::new("ws/a.md"), "two").unwrap();
        assert_eq!(
            block_on_test(vcs.status()).unwrap()[0].change,
            ChangeKind::Modified
        );
        block_on_test(vcs.stage("a.md")).unwrap();
        block_on_test(vcs.commit("edit a", &author())).unwrap();

        fs.delete_file(Path::new("ws/a.md")).unwrap();
        assert_eq!(
            block_on_test(vcs.status()).unwrap()[0].change,
            ChangeKind::Deleted
        );
        block_on_test(vcs.remove("a.md")).unwrap();
        block_on_test(vcs.commit("drop a", &author())).unwrap();

        let log = block_on_test(vcs.log(10, Some("a.md"))).unwrap();
        let messages: Vec<&str> = log.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, vec!["drop a", "edit a", "add a"]);
        assert_eq!(
            block_on_test(vcs.read_file_at(&first.id, "a.md")).unwrap(),
            "one"
        );
        assert!(matches!(
            block_on_test(vcs.read_file_at("HEAD", "a.md")),
            Err(VcsError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_empty_commit_is_refused() {
        let (fs, vcs) = repo();
        fs.write_file(Path::new("ws/a.md"), "x").unwrap();
        block_on_test(vcs.stage("a.md")).unwrap();
        block_on_test(vcs.commit("first", &author())).unwrap();
        assert!(block_on_test(vcs.commit("again", &author())).is_err());
    }

    #[test]
    fn test_uninitialized_repository_errors() {
        let vcs = InMemoryVcs::new(InMemoryFileSystem::new(), "ws");
        assert!(block_on_test(vcs.status()).is_err());
    }

    #[test]
    fn test_push_then_remote_commit_fast_forwards() {
        let (fs, vcs) = repo();
        assert!(matches!(
            block_on_test(vcs.push("origin", "main", None)),
            Err(VcsError::NoRemote(_))
        ));
        vcs.add_remote("origin").unwrap();

        fs.write_file(Path::new("ws/a.md"), "local").unwrap();
        block_on_test(vcs.stage("a.md")).unwrap();
        block_on_test(vcs.commit("local", &author())).unwrap();
        block_on_test(vcs.push("origin", "main", None)).unwrap();

        let bob = Author::new("Bob", "bob@example.com");
        vcs.simulate_remote_commit(&[("a.md", Some("remote"))], "remote edit", &bob)
            .unwrap();

        let outcome = block_on_test(vcs.pull("origin", "main", None, &author())).unwrap();
        assert_eq!(outcome, PullOutcome::FastForward);
        assert_eq!(fs.read_to_string(Path::new("ws/a.md")).unwrap(), "remote");
        assert_eq!(
            block_on_test(vcs.log(1, None)).unwrap()[0].author,
            bob
        );
        assert_eq!(
            block_on_test(vcs.pull("origin", "main", None, &author())).unwrap(),
            PullOutcome::UpToDate
        );
    }

    #[test]
    fn test_diverged_histories_merge() {
        let (fs, vcs) = repo();
        vcs.add_remote("origin").unwrap();
        fs.write_file(Path::new("ws/a.md"), "base").unwrap();
        block_on_test(vcs.stage("a.md")).unwrap();
        block_on_test(vcs.commit("base", &author())).unwrap();
        block_on_test(vcs.push("origin", "main", None)).unwrap();

        vcs.simulate_remote_commit(&[("b.md", Some("theirs"))], "add b", &author())
            .unwrap();
        fs.write_file(Path::new("ws/c.md"), "ours").unwrap();
        block_on_test(vcs.stage("c.md")).unwrap();
        block_on_test(vcs.commit("add c", &author())).unwrap();

        assert!(block_on_test(vcs.push("origin", "main", None)).is_err());
        let outcome = block_on_test(vcs.pull("origin", "main", None, &author())).unwrap();
        assert_eq!(outcome, PullOutcome::Merged);
        assert_eq!(block_on_test(vcs.log(1, None)).unwrap()[0].author, author());
        assert_eq!(fs.read_to_string(Path::new("ws/b.md")).unwrap(), "theirs");
        assert_eq!(fs.read_to_string(Path::new("ws/c.md")).unwrap(), "ours");
        block_on_test(vcs.push("origin", "main", None)).unwrap();
    }

    #[test]
    fn test_conflicting_pull_leaves_local_files() {
        let (fs, vcs) = repo();
        vcs.add_remote("origin").unwrap();
        fs.write_file(Path::new("ws/a.md"), "base").unwrap();
        block_on_test(vcs.stage("a.md")).unwrap();
        block_on_test(vcs.commit("base", &author())).unwrap();
        block_on_test(vcs.push("origin", "main", None)).unwrap();

        vcs.simulate_remote_commit(&[("a.md", Some("theirs"))], "remote", &author())
            .unwrap();
        fs.write_file(Path::new("ws/a.md"), "ours").unwrap();
        block_on_test(vcs.stage("a.md")).unwrap();
        let local = block_on_test(vcs.commit("local", &author())).unwrap();

        let err = block_on_test(vcs.pull("origin", "main", None, &author())).unwrap_err();
        assert!(matches!(&err, VcsError::MergeConflict(paths) if paths == &["a.md"]));
        assert_eq!(fs.read_to_string(Path::new("ws/a.md")).unwrap(), "ours");
        assert_eq!(block_on_test(vcs.log(1, None)).unwrap()[0].id, local.id);
    }

    #[test]
    fn test_failing_remote() {
        let (_fs, vcs) = repo();
        vcs.add_remote("origin").unwrap();
        vcs.set_fail_pull(true).unwrap();
        assert!(matches!(
            block_on_test(vcs.pull("origin", "main", None, &author())),
            Err(VcsError::CommandFailed { .. })
        ));
    }
}
