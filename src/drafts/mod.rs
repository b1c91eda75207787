//! Client-side draft handling.
//!
//! A [`Draft`] is the editor's locally held copy of one content file. The
//! submodules persist it ([`store`]), drive its in-memory lifecycle
//! ([`session`]), reconcile it with the Git host ([`reconcile`]), gate it on
//! an open pull request ([`pull_request`]) and tie those together for an
//! editor view ([`editor`]).

pub mod editor;
pub mod front_matter;
pub mod pull_request;
pub mod reconcile;
pub mod session;
pub mod store;

pub use editor::EditorSession;
pub use front_matter::{ContentFormat, FrontMatter, Value};
pub use pull_request::{PrTransition, PullRequestLifecycleTracker, PullRequestSource};
pub use reconcile::{ContentFetcher, EditorMode, RemoteSnapshot, RemoteSyncReconciler, SyncOutcome, SyncStatus};
pub use session::{DraftSessionController, LoadOutcome};
pub use store::{DraftRepository, InMemoryDraftRepository, JsonFileDraftRepository};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a draft: one file on one branch, as seen by one user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftKey {
    pub user: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub path: String,
}

impl DraftKey {
    pub fn new(
        user: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
            path: path.into(),
        }
    }

    fn scope(&self) -> String {
        format!("{}|{}|{}|{}", self.user, self.owner, self.repo, self.branch)
    }

    /// `draft_<user>|<owner>|<repo>|<branch>|<path>`
    pub fn storage_key(&self) -> String {
        format!("draft_{}|{}", self.scope(), self.path)
    }

    /// `pr_<user>|<owner>|<repo>|<branch>|<path>`
    pub fn pr_storage_key(&self) -> String {
        format!("pr_{}|{}", self.scope(), self.path)
    }

    /// Prefix matching every draft stored below `dir` for this key's scope.
    pub fn dir_prefix(&self, dir: &str) -> String {
        format!("draft_{}|{}/", self.scope(), dir.trim_end_matches('/'))
    }

    /// Recover a key from a `draft_...` storage key.
    pub fn from_storage_key(key: &str) -> Option<Self> {
        let rest = key.strip_prefix("draft_")?;
        let mut parts = rest.splitn(5, '|');
        let user = parts.next()?;
        let owner = parts.next()?;
        let repo = parts.next()?;
        let branch = parts.next()?;
        let path = parts.next()?;
        Some(Self::new(user, owner, repo, branch, path))
    }

    pub fn format(&self) -> ContentFormat {
        ContentFormat::from_path(&self.path)
    }
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}:{}", self.owner, self.repo, self.branch, self.path)
    }
}

/// Attachment waiting to be committed alongside the draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBlob {
    pub name: String,
    /// Repository path the file will be written to.
    pub path: String,
    /// Base64 encoded file content.
    pub content: String,
}

/// Pull request the draft was submitted through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrRef {
    pub number: u64,
    pub url: String,
}

/// Locally edited content of a single file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub front_matter: FrontMatter,
    pub body: String,
    #[serde(default)]
    pub pending_images: Vec<FileBlob>,
    #[serde(default)]
    pub is_dirty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<PrRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for Draft {
    fn default() -> Self {
        Self {
            front_matter: FrontMatter::default(),
            body: String::new(),
            pending_images: Vec::new(),
            is_dirty: false,
            pr: None,
            updated_at: None,
        }
    }
}

impl Draft {
    pub fn new(front_matter: FrontMatter, body: impl Into<String>) -> Self {
        Self {
            front_matter,
            body: body.into(),
            ..Self::default()
        }
    }

    /// Structural equality of the content, ignoring bookkeeping fields.
    pub fn same_content(&self, front_matter: &FrontMatter, body: &str) -> bool {
        self.body == body && self.front_matter.canonical() == front_matter.canonical()
    }
}

/// Pull request lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrStatus {
    Open,
    Merged,
    Closed,
}

impl PrStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PrStatus::Merged | PrStatus::Closed)
    }
}

impl fmt::Display for PrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrStatus::Open => write!(f, "open"),
            PrStatus::Merged => write!(f, "merged"),
            PrStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Tracked pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestState {
    pub number: u64,
    pub url: String,
    pub state: PrStatus,
    pub head_branch: Option<String>,
}

/// Notification levels for editor toasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Non-blocking message surfaced to the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into() }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_formats() {
        let key = DraftKey::new("alice", "acme", "site", "main", "content/posts/hello.md");
        assert_eq!(key.storage_key(), "draft_alice|acme|site|main|content/posts/hello.md");
        assert_eq!(key.pr_storage_key(), "pr_alice|acme|site|main|content/posts/hello.md");
        assert_eq!(key.dir_prefix("content/posts/"), "draft_alice|acme|site|main|content/posts/");
    }

    #[test]
    fn test_key_parses_back_from_storage_key() {
        let key = DraftKey::new("alice", "acme", "site", "main", "a/b|c.md");
        assert_eq!(DraftKey::from_storage_key(&key.storage_key()), Some(key));
        assert_eq!(DraftKey::from_storage_key("pr_alice|acme|site|main|x.md"), None);
    }

    #[test]
    fn test_draft_json_uses_camel_case() {
        let mut draft = Draft::new(FrontMatter::default(), "hi");
        draft.is_dirty = true;
        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json["isDirty"], serde_json::json!(true));
        assert_eq!(json["frontMatter"], serde_json::json!({}));
        assert!(json.get("pr").is_none());
    }
}
