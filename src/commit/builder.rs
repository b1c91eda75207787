//! Blob → tree → commit → ref construction of one batch commit.

use super::FileUpdate;
use crate::error::StaticmsResult;
use crate::github::{BranchHead, GitHost, RepoRef, TreeEntry};
use futures_util::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds single commits against one repository.
///
/// Blobs, the tree and the commit object are inert until the final ref
/// update, so a failure before that point leaves the branch untouched.
pub struct CommitBuilder {
    host: Arc<dyn GitHost>,
    repo: RepoRef,
    default_encoding: String,
}

impl CommitBuilder {
    pub fn new(host: Arc<dyn GitHost>, repo: RepoRef, default_encoding: impl Into<String>) -> Self {
        Self {
            host,
            repo,
            default_encoding: default_encoding.into(),
        }
    }

    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    /// Current head of `branch`; every object of the commit is built on it.
    pub async fn resolve(&self, branch: &str) -> StaticmsResult<BranchHead> {
        let head = self.host.get_branch(&self.repo, branch).await?;
        debug!("Resolved {} to {}", branch, head.commit_sha);
        Ok(head)
    }

    /// Create `branch` pointing at `sha`.
    pub async fn create_branch(&self, branch: &str, sha: &str) -> StaticmsResult<()> {
        self.host.create_ref(&self.repo, branch, sha).await?;
        debug!("Created branch {} at {}", branch, sha);
        Ok(())
    }

    /// One blob per update, created concurrently. Fails as a whole if any
    /// blob fails.
    pub async fn write_blobs(&self, updates: &[FileUpdate]) -> StaticmsResult<Vec<TreeEntry>> {
        let blobs = updates.iter().map(|update| async move {
            let encoding = update.encoding_or(&self.default_encoding);
            let sha = self
                .host
                .create_blob(&self.repo, &update.content, encoding)
                .await
                .map_err(|e| e.at_path(&update.path))?;
            debug!("Blob {} for {}", sha, update.path);
            Ok::<_, crate::error::StaticmsError>(TreeEntry::blob(&update.path, sha))
        });
        try_join_all(blobs).await
    }

    /// Build blobs, tree and commit on top of `base`, then move `target`
    /// from `base.commit_sha` to the new commit. Returns the commit sha.
    pub async fn commit_onto(
        &self,
        base: &BranchHead,
        target: &str,
        message: &str,
        updates: &[FileUpdate],
    ) -> StaticmsResult<String> {
        let entries = self.write_blobs(updates).await?;

        let tree = self
            .host
            .create_tree(&self.repo, &base.tree_sha, &entries)
            .await?;
        debug!("Tree {} with {} entries on {}", tree, entries.len(), base.tree_sha);

        let commit = self
            .host
            .create_commit(&self.repo, message, &tree, &[base.commit_sha.clone()])
            .await?;
        debug!("Commit {} (parent {})", commit, base.commit_sha);

        self.host
            .update_ref(&self.repo, target, &base.commit_sha, &commit)
            .await?;
        info!(
            "Committed {} file(s) to {}/{} as {}",
            updates.len(),
            self.repo,
            target,
            commit
        );
        Ok(commit)
    }
}
