// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Byte-oriented git access for project files and reusable actions.
//!
//! Commits are fetched into per-repo cache directories so repeated reads of
//! the same file don't touch the network. Access tokens are injected into
//! https URLs and redacted from every error message before it can reach a
//! log line or a study developer.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use fm_core::id::deterministic_id;

const GIT_TIMEOUT: Duration = Duration::from_secs(120);

/// The git magic number meaning "infinite depth". See
/// <https://git-scm.com/docs/shallow>.
const INFINITE_DEPTH: u32 = 2_147_483_647;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Could not read from {url}")]
    RepoNotReachable { url: String },
    #[error("Could not find ref '{reference}' in {url}")]
    UnknownRef { reference: String, url: String },
    #[error("File '{path}' not found in repository")]
    FileNotFound { path: String },
    #[error("Error running git {args}: {detail}")]
    CommandFailed { args: String, detail: String },
}

/// Read-only git operations the controller needs.
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Contents of `path` in `repo_url` as of `commit_sha`.
    async fn read_file(
        &self,
        repo_url: &str,
        commit_sha: &str,
        path: &str,
    ) -> Result<Vec<u8>, GitError>;

    /// The commit SHA for a branch, tag, or other ref. Annotated tags
    /// dereference to the tagged commit.
    async fn resolve_ref(&self, repo_url: &str, reference: &str) -> Result<String, GitError>;

    /// Is `commit_sha` reachable from the head of `branch`?
    async fn commit_reachable_from(
        &self,
        repo_url: &str,
        commit_sha: &str,
        branch: &str,
    ) -> Result<bool, GitError>;

    /// Materialise the tree of `commit_sha` into `target_dir`.
    async fn checkout(
        &self,
        repo_url: &str,
        commit_sha: &str,
        target_dir: &Path,
    ) -> Result<(), GitError>;
}

/// Git client shelling out to the `git` binary.
#[derive(Clone)]
pub struct CliGit {
    /// Directory holding one cached repo per remote
    repo_cache_dir: PathBuf,
    access_token: Option<String>,
    /// Domain substituted for github.com, where a proxy is in use
    proxy_domain: Option<String>,
    /// Username recorded against the token in proxy logs
    token_username: String,
}

impl CliGit {
    pub fn new(
        repo_cache_dir: PathBuf,
        access_token: Option<String>,
        proxy_domain: Option<String>,
        backend: &str,
    ) -> Self {
        Self {
            repo_cache_dir,
            access_token: access_token.filter(|t| !t.is_empty()),
            proxy_domain,
            token_username: format!("foreman-{}", backend),
        }
    }

    /// Rewrite a repo URL for fetching: apply the proxy domain and embed the
    /// access token. The token is only ever attached to https github URLs.
    fn auth_url(&self, repo_url: &str) -> String {
        let mut url = match &self.proxy_domain {
            Some(domain) => repo_url.replace("github.com", domain),
            None => repo_url.to_string(),
        };
        let Some(token) = &self.access_token else { return url };
        let expected_host = self.proxy_domain.as_deref().unwrap_or("github.com");
        let prefix = format!("https://{}/", expected_host);
        if let Some(rest) = url.strip_prefix(&prefix).map(str::to_string) {
            url = format!(
                "https://{}:{}@{}/{}",
                self.token_username, token, expected_host, rest
            );
        }
        url
    }

    fn redact(&self, text: &str) -> String {
        match &self.access_token {
            Some(token) if !token.is_empty() => text.replace(token, "********"),
            _ => text.to_string(),
        }
    }

    fn local_repo_dir(&self, repo_url: &str) -> PathBuf {
        // Name the cache dir after the repo with a digest suffix so distinct
        // remotes can never collide
        let name = repo_url.trim_end_matches('/').rsplit('/').next().unwrap_or("repo");
        let name = name.trim_end_matches(".git");
        self.repo_cache_dir.join(format!("{}-{}", name, deterministic_id(repo_url)))
    }

    async fn run_git(
        &self,
        cwd: Option<&Path>,
        args: &[String],
    ) -> Result<std::process::Output, GitError> {
        let mut command = Command::new("git");
        command
            .args(args)
            // Never fall back to interactive auth prompts
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        let redacted_args = self.redact(&args.join(" "));
        let output = tokio::time::timeout(GIT_TIMEOUT, command.output())
            .await
            .map_err(|_| GitError::CommandFailed {
                args: redacted_args.clone(),
                detail: "timed out".to_string(),
            })?
            .map_err(|e| GitError::CommandFailed {
                args: redacted_args,
                detail: e.to_string(),
            })?;
        Ok(output)
    }

    /// Run git and require a zero exit status.
    async fn run_git_ok(
        &self,
        cwd: Option<&Path>,
        args: &[String],
    ) -> Result<std::process::Output, GitError> {
        let output = self.run_git(cwd, args).await?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                args: self.redact(&args.join(" ")),
                detail: self.redact(&String::from_utf8_lossy(&output.stderr)),
            });
        }
        Ok(output)
    }

    async fn ensure_git_init(&self, repo_dir: &Path) -> Result<(), GitError> {
        if repo_dir.join("config").exists() {
            return Ok(());
        }
        std::fs::create_dir_all(repo_dir).map_err(|e| GitError::CommandFailed {
            args: "init".to_string(),
            detail: e.to_string(),
        })?;
        self.run_git_ok(Some(repo_dir), &["init".into(), "--bare".into(), "--quiet".into()])
            .await?;
        Ok(())
    }

    async fn commit_already_fetched(&self, repo_dir: &Path, commit_sha: &str) -> bool {
        let args = vec!["cat-file".to_string(), "-e".to_string(), format!("{}^{{commit}}", commit_sha)];
        match self.run_git(Some(repo_dir), &args).await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    async fn fetch_commit(
        &self,
        repo_dir: &Path,
        repo_url: &str,
        commit_sha: &str,
        depth: u32,
    ) -> Result<(), GitError> {
        let args = vec![
            "fetch".to_string(),
            "--quiet".to_string(),
            "--force".to_string(),
            format!("--depth={}", depth),
            self.auth_url(repo_url),
            commit_sha.to_string(),
        ];
        self.run_git_ok(Some(repo_dir), &args).await.map_err(|_| GitError::RepoNotReachable {
            url: repo_url.to_string(),
        })?;
        Ok(())
    }

    async fn ensure_commit_fetched(
        &self,
        repo_url: &str,
        commit_sha: &str,
    ) -> Result<PathBuf, GitError> {
        let repo_dir = self.local_repo_dir(repo_url);
        self.ensure_git_init(&repo_dir).await?;
        if !self.commit_already_fetched(&repo_dir, commit_sha).await {
            self.fetch_commit(&repo_dir, repo_url, commit_sha, 1).await?;
        }
        Ok(repo_dir)
    }

    async fn commit_is_ancestor(&self, repo_dir: &Path, ancestor: &str, descendant: &str) -> bool {
        let args = vec![
            "merge-base".to_string(),
            "--is-ancestor".to_string(),
            ancestor.to_string(),
            descendant.to_string(),
        ];
        match self.run_git(Some(repo_dir), &args).await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl GitClient for CliGit {
    async fn read_file(
        &self,
        repo_url: &str,
        commit_sha: &str,
        path: &str,
    ) -> Result<Vec<u8>, GitError> {
        let repo_dir = self.ensure_commit_fetched(repo_url, commit_sha).await?;
        let args = vec!["show".to_string(), format!("{}:{}", commit_sha, path)];
        let output = self.run_git(Some(&repo_dir), &args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.starts_with("fatal: path ") && stderr.contains("does not exist") {
                return Err(GitError::FileNotFound { path: path.to_string() });
            }
            tracing::error!(
                repo_url,
                commit = fm_core::short(commit_sha, 8),
                error = %self.redact(&stderr),
                "error reading from repository"
            );
            return Err(GitError::RepoNotReachable { url: repo_url.to_string() });
        }
        Ok(output.stdout)
    }

    async fn resolve_ref(&self, repo_url: &str, reference: &str) -> Result<String, GitError> {
        // If `reference` is an annotated tag, the dereffed form resolves to
        // the tagged commit rather than the tag object
        let deref = format!("{}^{{}}", reference);
        let args = vec![
            "ls-remote".to_string(),
            "--quiet".to_string(),
            self.auth_url(repo_url),
            reference.to_string(),
            deref.clone(),
        ];
        let output = self
            .run_git_ok(None, &args)
            .await
            .map_err(|_| GitError::RepoNotReachable { url: repo_url.to_string() })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let results: Vec<(&str, &str)> = stdout
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                Some((parts.next()?, parts.next()?))
            })
            .collect();
        for target in [
            reference.to_string(), // e.g. HEAD
            format!("refs/heads/{}", reference),
            format!("refs/tags/{}", deref), // Annotated tag
            format!("refs/tags/{}", reference), // Lightweight tag
        ] {
            if let Some((sha, _)) = results.iter().find(|(_, name)| *name == target) {
                return Ok(sha.to_string());
            }
        }
        Err(GitError::UnknownRef {
            reference: reference.to_string(),
            url: repo_url.to_string(),
        })
    }

    async fn checkout(
        &self,
        repo_url: &str,
        commit_sha: &str,
        target_dir: &Path,
    ) -> Result<(), GitError> {
        let repo_dir = self.ensure_commit_fetched(repo_url, commit_sha).await?;
        std::fs::create_dir_all(target_dir).map_err(|e| GitError::CommandFailed {
            args: "checkout".to_string(),
            detail: e.to_string(),
        })?;
        let args = vec![
            format!("--git-dir={}", repo_dir.display()),
            format!("--work-tree={}", target_dir.display()),
            "checkout".to_string(),
            "--quiet".to_string(),
            "--force".to_string(),
            commit_sha.to_string(),
        ];
        self.run_git_ok(None, &args).await?;
        Ok(())
    }

    async fn commit_reachable_from(
        &self,
        repo_url: &str,
        commit_sha: &str,
        branch: &str,
    ) -> Result<bool, GitError> {
        let branch_sha = self.resolve_ref(repo_url, branch).await?;
        // The case we expect to hit almost every time: the commit is the
        // branch head
        if commit_sha == branch_sha {
            return Ok(true);
        }
        // A well (or badly) timed push can make the two diverge, so fetch
        // branch history: first a few commits on the assumption it's recent,
        // then the whole branch
        let repo_dir = self.local_repo_dir(repo_url);
        self.ensure_git_init(&repo_dir).await?;
        self.fetch_commit(&repo_dir, repo_url, &branch_sha, 10).await?;
        if self.commit_is_ancestor(&repo_dir, commit_sha, &branch_sha).await {
            return Ok(true);
        }
        self.fetch_commit(&repo_dir, repo_url, &branch_sha, INFINITE_DEPTH).await?;
        Ok(self.commit_is_ancestor(&repo_dir, commit_sha, &branch_sha).await)
    }
}

/// In-memory git for tests: refs, file contents, and branch membership are
/// declared up front.
#[cfg(any(test, feature = "test-support"))]
#[derive(Default)]
pub struct FakeGit {
    inner: parking_lot::Mutex<FakeGitState>,
}

#[cfg(any(test, feature = "test-support"))]
#[derive(Default)]
struct FakeGitState {
    /// (repo_url, ref) → sha
    refs: std::collections::BTreeMap<(String, String), String>,
    /// (repo_url, sha, path) → contents
    files: std::collections::BTreeMap<(String, String, String), Vec<u8>>,
    /// (repo_url, branch) → shas reachable from the branch head
    branch_commits: std::collections::BTreeMap<(String, String), Vec<String>>,
    unreachable_repos: std::collections::BTreeSet<String>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_ref(&self, repo_url: &str, reference: &str, sha: &str) {
        self.inner
            .lock()
            .refs
            .insert((repo_url.to_string(), reference.to_string()), sha.to_string());
    }

    pub fn add_file(&self, repo_url: &str, sha: &str, path: &str, contents: &[u8]) {
        self.inner.lock().files.insert(
            (repo_url.to_string(), sha.to_string(), path.to_string()),
            contents.to_vec(),
        );
    }

    /// Declare `sha` as merged into `branch` on `repo_url`.
    pub fn add_branch_commit(&self, repo_url: &str, branch: &str, sha: &str) {
        self.inner
            .lock()
            .branch_commits
            .entry((repo_url.to_string(), branch.to_string()))
            .or_default()
            .push(sha.to_string());
    }

    pub fn set_unreachable(&self, repo_url: &str) {
        self.inner.lock().unreachable_repos.insert(repo_url.to_string());
    }

    fn check_reachable(&self, repo_url: &str) -> Result<(), GitError> {
        if self.inner.lock().unreachable_repos.contains(repo_url) {
            return Err(GitError::RepoNotReachable { url: repo_url.to_string() });
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl GitClient for FakeGit {
    async fn read_file(
        &self,
        repo_url: &str,
        commit_sha: &str,
        path: &str,
    ) -> Result<Vec<u8>, GitError> {
        self.check_reachable(repo_url)?;
        self.inner
            .lock()
            .files
            .get(&(repo_url.to_string(), commit_sha.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| GitError::FileNotFound { path: path.to_string() })
    }

    async fn resolve_ref(&self, repo_url: &str, reference: &str) -> Result<String, GitError> {
        self.check_reachable(repo_url)?;
        self.inner
            .lock()
            .refs
            .get(&(repo_url.to_string(), reference.to_string()))
            .cloned()
            .ok_or_else(|| GitError::UnknownRef {
                reference: reference.to_string(),
                url: repo_url.to_string(),
            })
    }

    async fn checkout(
        &self,
        repo_url: &str,
        commit_sha: &str,
        target_dir: &Path,
    ) -> Result<(), GitError> {
        self.check_reachable(repo_url)?;
        let files: Vec<(String, Vec<u8>)> = self
            .inner
            .lock()
            .files
            .iter()
            .filter(|((repo, sha, _), _)| repo == repo_url && sha == commit_sha)
            .map(|((_, _, path), contents)| (path.clone(), contents.clone()))
            .collect();
        for (path, contents) in files {
            let target = target_dir.join(&path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| GitError::CommandFailed {
                    args: "checkout".to_string(),
                    detail: e.to_string(),
                })?;
            }
            std::fs::write(&target, contents).map_err(|e| GitError::CommandFailed {
                args: "checkout".to_string(),
                detail: e.to_string(),
            })?;
        }
        Ok(())
    }

    async fn commit_reachable_from(
        &self,
        repo_url: &str,
        commit_sha: &str,
        branch: &str,
    ) -> Result<bool, GitError> {
        self.check_reachable(repo_url)?;
        let inner = self.inner.lock();
        if let Some(sha) = inner.refs.get(&(repo_url.to_string(), branch.to_string())) {
            if sha == commit_sha {
                return Ok(true);
            }
        }
        Ok(inner
            .branch_commits
            .get(&(repo_url.to_string(), branch.to_string()))
            .is_some_and(|commits| commits.iter().any(|c| c == commit_sha)))
    }
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod git_tests;
