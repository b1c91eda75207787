//! Branch selection, retry and pull request opening around [`CommitBuilder`].

use super::{CommitBuilder, CommitRequest};
use crate::config::CommitConfig;
use crate::error::{utils, StaticmsResult};
use crate::github::{BranchHead, GitHost, NewPullRequest, PullRequestInfo, RepoRef};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Result of a published batch commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub commit_sha: String,
    /// Branch the commit landed on.
    pub branch: String,
    pub pr: Option<PullRequestInfo>,
}

pub struct BranchAndPrPublisher {
    host: Arc<dyn GitHost>,
    config: CommitConfig,
}

impl BranchAndPrPublisher {
    pub fn new(host: Arc<dyn GitHost>, config: CommitConfig) -> Self {
        Self { host, config }
    }

    /// `<prefix><8 random lowercase alphanumerics>`
    pub fn generate_branch_name(&self) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        format!("{}{}", self.config.branch_prefix, suffix.to_lowercase())
    }

    pub async fn publish(&self, repo: &RepoRef, request: &CommitRequest) -> StaticmsResult<PublishOutcome> {
        let span = info_span!(
            "batch_commit",
            owner = %repo.owner,
            repo = %repo.repo,
            base = %request.base_branch,
            request_id = %Uuid::new_v4(),
        );
        self.publish_inner(repo, request).instrument(span).await
    }

    async fn publish_inner(&self, repo: &RepoRef, request: &CommitRequest) -> StaticmsResult<PublishOutcome> {
        request.validate()?;
        let builder = CommitBuilder::new(
            self.host.clone(),
            repo.clone(),
            self.config.default_encoding.clone(),
        );

        if request.create_pr {
            self.publish_with_pr(&builder, request).await
        } else {
            let commit_sha = self.commit_to_base(&builder, request).await?;
            Ok(PublishOutcome {
                commit_sha,
                branch: request.base_branch.clone(),
                pr: None,
            })
        }
    }

    /// Commit straight onto the base branch, rebuilding from a fresh head
    /// when the branch moved underneath us.
    async fn commit_to_base(&self, builder: &CommitBuilder, request: &CommitRequest) -> StaticmsResult<String> {
        let mut attempt = 0;
        loop {
            let head = builder.resolve(&request.base_branch).await?;
            match builder
                .commit_onto(&head, &request.base_branch, &request.message, &request.updates)
                .await
            {
                Ok(sha) => return Ok(sha),
                Err(e) if utils::is_retryable(&e) && attempt < self.config.ref_update_retries => {
                    attempt += 1;
                    warn!("{}; retrying ({}/{})", e, attempt, self.config.ref_update_retries);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn publish_with_pr(&self, builder: &CommitBuilder, request: &CommitRequest) -> StaticmsResult<PublishOutcome> {
        let head = builder.resolve(&request.base_branch).await?;
        let branch = request
            .new_branch_name
            .clone()
            .unwrap_or_else(|| self.generate_branch_name());
        builder.create_branch(&branch, &head.commit_sha).await?;

        match self.commit_and_open(builder, request, &head, &branch).await {
            Ok((commit_sha, pr)) => Ok(PublishOutcome {
                commit_sha,
                branch,
                pr: Some(pr),
            }),
            Err(e) => {
                self.discard_branch(builder.repo(), &branch).await;
                Err(e)
            }
        }
    }

    async fn commit_and_open(
        &self,
        builder: &CommitBuilder,
        request: &CommitRequest,
        head: &BranchHead,
        branch: &str,
    ) -> StaticmsResult<(String, PullRequestInfo)> {
        let commit_sha = builder
            .commit_onto(head, branch, &request.message, &request.updates)
            .await?;

        let pull = NewPullRequest {
            title: request
                .pr_title
                .clone()
                .unwrap_or_else(|| request.message.lines().next().unwrap_or_default().to_string()),
            body: Some(request.pr_body.clone().unwrap_or_else(|| self.config.pr_body.clone())),
            head: branch.to_string(),
            base: request.base_branch.clone(),
        };
        let pr = self.host.create_pull(builder.repo(), &pull).await?;
        info!("Opened pull request #{} from {}", pr.number, branch);
        Ok((commit_sha, pr))
    }

    /// Best effort: a leftover branch is only logged.
    async fn discard_branch(&self, repo: &RepoRef, branch: &str) {
        match self.host.delete_ref(repo, branch).await {
            Ok(()) => info!("Deleted branch {} after failed publish", branch),
            Err(e) => warn!("Branch {} left behind after failed publish: {}", branch, e),
        }
    }
}
