//! Git backend that shells out to the `git` binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use tokio::process::Command;

use super::{
    Author, ChangeKind, CommitInfo, Credential, FileStatus, PullOutcome, VcsError, VcsResult,
    VersionControl,
};
use crate::fs::BoxFuture;

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';
const LOG_FORMAT: &str = "--format=%H%x1f%an%x1f%ae%x1f%aI%x1f%s%x1e";

/// Check if git is available on PATH.
pub fn is_git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

const DEFAULT_BRANCH: &str = "main";

/// A repository driven through the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
    /// Branch a fresh repository starts on
    branch: String,
}

impl GitCli {
    /// Operate on the working directory at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            branch: DEFAULT_BRANCH.to_string(),
        }
    }

    /// Start new repositories on `branch` instead of `main`
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Working directory of the repository
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Add (or repoint) a remote
    pub async fn add_remote(&self, name: &str, url: &str) -> VcsResult<()> {
        if self.has_remote(name).await? {
            self.run(&["remote", "set-url", name, url], None).await?;
        } else {
            self.run(&["remote", "add", name, url], None).await?;
        }
        Ok(())
    }

    fn command(&self, credential: Option<&Credential>) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(&self.root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(credential) = credential {
            let basic = STANDARD.encode(format!("{}:{}", credential.username, credential.secret));
            cmd.arg("-c")
                .arg(format!("http.extraHeader=Authorization: Basic {}", basic));
        }
        cmd
    }

    async fn run(&self, args: &[&str], credential: Option<&Credential>) -> VcsResult<String> {
        let command_line = format!("git {}", args.join(" "));
        log::debug!("Running {}", command_line);

        let output = self.command(credential).args(args).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(VcsError::CommandFailed {
                command: command_line,
                message: stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn head(&self) -> VcsResult<Option<String>> {
        let output = self
            .command(None)
            .args(["rev-parse", "--verify", "-q", "HEAD"])
            .output()
            .await?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    async fn merge_in_progress(&self) -> VcsResult<bool> {
        let output = self
            .command(None)
            .args(["rev-parse", "-q", "--verify", "MERGE_HEAD"])
            .output()
            .await?;
        Ok(output.status.success())
    }

    /// Undo a half-done merge, returning the paths that conflicted
    async fn abort_merge(&self) -> VcsResult<Vec<String>> {
        let output = self
            .run(&["diff", "--name-only", "--diff-filter=U", "-z"], None)
            .await?;
        let paths: Vec<String> = output
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        self.run(&["merge", "--abort"], None).await?;
        log::warn!("Rolled back conflicting merge in {:?}", paths);
        Ok(paths)
    }

    async fn parent_count(&self, revision: &str) -> VcsResult<usize> {
        let line = self
            .run(&["rev-list", "--parents", "-n", "1", revision], None)
            .await?;
        Ok(line.split_whitespace().count().saturating_sub(1))
    }
}

fn parse_status(output: &str) -> Vec<FileStatus> {
    let mut entries = Vec::new();
    let mut records = output.split('\0').filter(|r| !r.is_empty());

    while let Some(record) = records.next() {
        if record.len() < 4 {
            continue;
        }
        let (code, path) = record.split_at(2);
        let path = path[1..].to_string();
        let mut chars = code.chars();
        let index = chars.next().unwrap_or(' ');
        let worktree = chars.next().unwrap_or(' ');

        // Renames and copies carry the original path as the next record
        if index == 'R' || index == 'C' {
            records.next();
        }

        let change = match (index, worktree) {
            ('?', '?') => ChangeKind::Untracked,
            ('U', _) | (_, 'U') | ('A', 'A') | ('D', 'D') => ChangeKind::Conflicted,
            ('D', _) | (_, 'D') => ChangeKind::Deleted,
            ('A', _) => ChangeKind::Added,
            _ => ChangeKind::Modified,
        };
        entries.push(FileStatus { path, change });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

fn parse_log(output: &str) -> Vec<CommitInfo> {
    output
        .split(RECORD_SEP)
        .filter_map(|record| {
            let record = record.trim_start_matches('\n');
            let mut fields = record.split(FIELD_SEP);
            let id = fields.next()?.trim().to_string();
            if id.is_empty() {
                return None;
            }
            let name = fields.next()?.to_string();
            let email = fields.next()?.to_string();
            let timestamp = DateTime::parse_from_rfc3339(fields.next()?)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            let message = fields.next().unwrap_or_default().to_string();
            Some(CommitInfo {
                id,
                message,
                author: Author { name, email },
                timestamp,
            })
        })
        .collect()
}

fn identity(author: &Author) -> [String; 2] {
    [
        format!("user.name={}", author.name),
        format!("user.email={}", author.email),
    ]
}

fn classify_show_error(err: VcsError, revision: &str, path: &str) -> VcsError {
    match err {
        VcsError::CommandFailed { message, .. }
            if message.contains("does not exist") || message.contains("exists on disk") =>
        {
            VcsError::FileNotFound {
                revision: revision.to_string(),
                path: path.to_string(),
            }
        }
        VcsError::CommandFailed { message, .. }
            if message.contains("invalid object name") || message.contains("unknown revision") =>
        {
            VcsError::RevisionNotFound(revision.to_string())
        }
        other => other,
    }
}

impl VersionControl for GitCli {
    fn init(&self) -> BoxFuture<'_, VcsResult<()>> {
        Box::pin(async move {
            if self.root.join(".git").exists() {
                return Ok(());
            }
            std::fs::create_dir_all(&self.root)?;
            self.run(&["init", "-q"], None).await?;
            // `init -b` needs git 2.28; pointing the unborn HEAD works everywhere
            let head = format!("refs/heads/{}", self.branch);
            self.run(&["symbolic-ref", "HEAD", &head], None).await?;
            log::info!("Initialized git repository at {:?} on {}", self.root, self.branch);
            Ok(())
        })
    }

    fn status(&self) -> BoxFuture<'_, VcsResult<Vec<FileStatus>>> {
        Box::pin(async move {
            let output = self
                .run(
                    &["status", "--porcelain=v1", "-z", "--untracked-files=all"],
                    None,
                )
                .await?;
            Ok(parse_status(&output))
        })
    }

    fn stage<'a>(&'a self, path: &'a str) -> BoxFuture<'a, VcsResult<()>> {
        Box::pin(async move {
            self.run(&["add", "--", path], None).await?;
            Ok(())
        })
    }

    fn unstage<'a>(&'a self, path: &'a str) -> BoxFuture<'a, VcsResult<()>> {
        Box::pin(async move {
            if self.head().await?.is_some() {
                self.run(&["reset", "-q", "HEAD", "--", path], None).await?;
            } else {
                self.run(&["rm", "-q", "--cached", "--", path], None).await?;
            }
            Ok(())
        })
    }

    fn remove<'a>(&'a self, path: &'a str) -> BoxFuture<'a, VcsResult<()>> {
        Box::pin(async move {
            self.run(&["rm", "-q", "--cached", "--ignore-unmatch", "--", path], None)
                .await?;
            Ok(())
        })
    }

    fn commit<'a>(
        &'a self,
        message: &'a str,
        author: &'a Author,
    ) -> BoxFuture<'a, VcsResult<CommitInfo>> {
        Box::pin(async move {
            if self.merge_in_progress().await? {
                return Err(VcsError::MergeInProgress);
            }
            let [name, email] = identity(author);
            self.run(
                &["-c", &name, "-c", &email, "commit", "-q", "-m", message],
                None,
            )
            .await?;

            let output = self.run(&["log", "-n", "1", LOG_FORMAT], None).await?;
            parse_log(&output)
                .into_iter()
                .next()
                .ok_or_else(|| VcsError::RevisionNotFound("HEAD".to_string()))
        })
    }

    fn log<'a>(
        &'a self,
        depth: usize,
        path_filter: Option<&'a str>,
    ) -> BoxFuture<'a, VcsResult<Vec<CommitInfo>>> {
        Box::pin(async move {
            if self.head().await?.is_none() {
                return Ok(Vec::new());
            }
            let depth = depth.to_string();
            let mut args = vec!["log", "-n", depth.as_str(), LOG_FORMAT];
            if let Some(path) = path_filter {
                args.push("--");
                args.push(path);
            }
            let output = self.run(&args, None).await?;
            Ok(parse_log(&output))
        })
    }

    fn push<'a>(
        &'a self,
        remote: &'a str,
        branch: &'a str,
        credential: Option<&'a Credential>,
    ) -> BoxFuture<'a, VcsResult<()>> {
        Box::pin(async move {
            if !self.has_remote(remote).await? {
                return Err(VcsError::NoRemote(remote.to_string()));
            }
            if self.head().await?.is_none() {
                log::debug!("Nothing to push yet");
                return Ok(());
            }
            // Push whatever is checked out, whatever the local branch is called
            let refspec = format!("HEAD:refs/heads/{}", branch);
            self.run(&["push", "-q", remote, &refspec], credential).await?;
            Ok(())
        })
    }

    fn pull<'a>(
        &'a self,
        remote: &'a str,
        branch: &'a str,
        credential: Option<&'a Credential>,
        author: &'a Author,
    ) -> BoxFuture<'a, VcsResult<PullOutcome>> {
        Box::pin(async move {
            if !self.has_remote(remote).await? {
                return Err(VcsError::NoRemote(remote.to_string()));
            }
            let before = self.head().await?;
            let [name, email] = identity(author);
            let pulled = self
                .run(
                    &[
                        "-c",
                        &name,
                        "-c",
                        &email,
                        "pull",
                        "-q",
                        "--no-rebase",
                        "--no-edit",
                        "--allow-unrelated-histories",
                        remote,
                        branch,
                    ],
                    credential,
                )
                .await;

            if let Err(err) = pulled {
                if self.merge_in_progress().await? {
                    return Err(VcsError::MergeConflict(self.abort_merge().await?));
                }
                return match err {
                    // Nobody has pushed the branch yet
                    VcsError::CommandFailed { message, .. }
                        if message.contains("couldn't find remote ref") =>
                    {
                        Ok(PullOutcome::UpToDate)
                    }
                    other => Err(other),
                };
            }
            let after = self.head().await?;

            match after {
                Some(after) if before.as_deref() != Some(after.as_str()) => {
                    if self.parent_count(&after).await? > 1 {
                        Ok(PullOutcome::Merged)
                    } else {
                        Ok(PullOutcome::FastForward)
                    }
                }
                _ => Ok(PullOutcome::UpToDate),
            }
        })
    }

    fn read_file_at<'a>(
        &'a self,
        revision: &'a str,
        path: &'a str,
    ) -> BoxFuture<'a, VcsResult<String>> {
        Box::pin(async move {
            let spec = format!("{}:{}", revision, path);
            self.run(&["show", &spec], None)
                .await
                .map_err(|e| classify_show_error(e, revision, path))
        })
    }

    fn has_remote<'a>(&'a self, remote: &'a str) -> BoxFuture<'a, VcsResult<bool>> {
        Box::pin(async move {
            let output = self.run(&["remote"], None).await?;
            Ok(output.lines().any(|line| line.trim() == remote))
        })
    }
}
