//! Git-hosting API surface used by the batch-commit engine.
//!
//! [`GitHost`] exposes the low-level Git data primitives (blob, tree,
//! commit, ref) plus the pull request and contents calls the editor needs.
//! [`client::GitHubClient`] talks to the GitHub REST API; tests use an
//! in-memory host.

pub mod client;

pub use client::{GitHubClient, GitHubClientFactory};

use crate::drafts::PrStatus;
use crate::error::StaticmsResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Regular (non-executable) file mode for tree entries.
pub const FILE_MODE: &str = "100644";

/// Owner/name pair identifying a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Head commit of a branch and the tree it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchHead {
    pub commit_sha: String,
    pub tree_sha: String,
}

/// One `path -> blob` entry of a new tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: FILE_MODE.to_string(),
            kind: "blob".to_string(),
            sha: sha.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitUser {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitBranchRef {
    #[serde(rename = "ref")]
    pub name: String,
}

/// Pull request as reported to the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub html_url: String,
    pub state: PrStatus,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user: Option<GitUser>,
    pub head: GitBranchRef,
    pub base: GitBranchRef,
}

/// Pull request to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPullRequest {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub head: String,
    pub base: String,
}

/// Commit listed by a branch comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    pub message: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Decoded file content at a ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub content: String,
    pub sha: String,
}

#[async_trait]
pub trait GitHost: Send + Sync {
    async fn get_branch(&self, repo: &RepoRef, branch: &str) -> StaticmsResult<BranchHead>;

    async fn create_ref(&self, repo: &RepoRef, branch: &str, sha: &str) -> StaticmsResult<()>;

    /// Store `content` (in `encoding`, `base64` or `utf-8`) and return the blob sha.
    async fn create_blob(&self, repo: &RepoRef, content: &str, encoding: &str) -> StaticmsResult<String>;

    async fn create_tree(
        &self,
        repo: &RepoRef,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> StaticmsResult<String>;

    async fn create_commit(
        &self,
        repo: &RepoRef,
        message: &str,
        tree: &str,
        parents: &[String],
    ) -> StaticmsResult<String>;

    /// Move `branch` to `new_sha` only if it still points at
    /// `expected_parent`; otherwise fail with `RefConflict`.
    async fn update_ref(
        &self,
        repo: &RepoRef,
        branch: &str,
        expected_parent: &str,
        new_sha: &str,
    ) -> StaticmsResult<()>;

    /// Remove `branch`; used to drop a branch whose pull request never opened.
    async fn delete_ref(&self, repo: &RepoRef, branch: &str) -> StaticmsResult<()>;

    async fn create_pull(&self, repo: &RepoRef, pull: &NewPullRequest) -> StaticmsResult<PullRequestInfo>;

    async fn get_pull(&self, repo: &RepoRef, number: u64) -> StaticmsResult<PullRequestInfo>;

    async fn compare(&self, repo: &RepoRef, base: &str, head: &str) -> StaticmsResult<Vec<CommitSummary>>;

    /// File content at `git_ref`, `None` when the path does not exist.
    async fn get_contents(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> StaticmsResult<Option<RemoteFile>>;
}

/// Produces a host client acting with the caller's credential.
pub trait GitHostFactory: Send + Sync {
    fn for_token(&self, token: &str) -> StaticmsResult<Arc<dyn GitHost>>;
}

impl<F> GitHostFactory for F
where
    F: Fn(&str) -> StaticmsResult<Arc<dyn GitHost>> + Send + Sync,
{
    fn for_token(&self, token: &str) -> StaticmsResult<Arc<dyn GitHost>> {
        self(token)
    }
}
