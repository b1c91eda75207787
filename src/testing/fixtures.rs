//! Common draft fixtures.

use std::sync::Arc;

use crate::drafts::{
    Draft, DraftKey, DraftSessionController, FrontMatter, InMemoryDraftRepository,
};
use crate::github::RepoRef;

pub const USER: &str = "alice";
pub const OWNER: &str = "acme";
pub const REPO: &str = "site";
pub const POST_PATH: &str = "content/posts/hello.md";

pub struct DraftFixtures;

impl DraftFixtures {
    pub fn repo_ref() -> RepoRef {
        RepoRef::new(OWNER, REPO)
    }

    pub fn key(path: &str) -> DraftKey {
        DraftKey::new(USER, OWNER, REPO, "main", path)
    }

    pub fn post_key() -> DraftKey {
        Self::key(POST_PATH)
    }

    /// Markdown file as stored on the host.
    pub fn post_source(title: &str, body: &str) -> String {
        format!("---\ntitle: {}\n---\n{}", title, body)
    }

    pub fn post_draft(title: &str, body: &str) -> Draft {
        let mut front_matter = FrontMatter::default();
        front_matter.insert("title", title);
        Draft::new(front_matter, body)
    }

    pub fn controller(repo: Arc<InMemoryDraftRepository>, key: DraftKey) -> DraftSessionController {
        DraftSessionController::load(repo, key, Draft::default())
    }
}
