//! GitHub REST client
//!
//! Implements [`GitHost`] against the Git Data, Pulls, Compare and Contents
//! endpoints of the GitHub REST API.

use super::{
    BranchHead, CommitSummary, GitBranchRef, GitHost, GitHostFactory, GitUser, NewPullRequest,
    PullRequestInfo, RemoteFile, RepoRef, TreeEntry,
};
use crate::config::GitHubConfig;
use crate::drafts::PrStatus;
use crate::error::{utils, CommitStep, StaticmsError, StaticmsResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// GitHub client bound to one access token.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    api_base: Url,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: BranchCommit,
}

#[derive(Debug, Deserialize)]
struct BranchCommit {
    sha: String,
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    tree: ShaResponse,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: ShaResponse,
}

#[derive(Debug, Deserialize)]
struct GitHubPull {
    number: u64,
    html_url: String,
    state: String,
    #[serde(default)]
    merged: Option<bool>,
    #[serde(default)]
    merged_at: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    user: Option<GitUser>,
    head: GitBranchRef,
    base: GitBranchRef,
}

impl From<GitHubPull> for PullRequestInfo {
    fn from(pull: GitHubPull) -> Self {
        let merged = pull.merged.unwrap_or(false) || pull.merged_at.is_some();
        let state = match (pull.state.as_str(), merged) {
            (_, true) => PrStatus::Merged,
            ("open", false) => PrStatus::Open,
            _ => PrStatus::Closed,
        };
        PullRequestInfo {
            number: pull.number,
            html_url: pull.html_url,
            state,
            title: pull.title,
            body: pull.body,
            user: pull.user,
            head: pull.head,
            base: pull.base,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    #[serde(default)]
    commits: Vec<CompareCommit>,
}

#[derive(Debug, Deserialize)]
struct CompareCommit {
    sha: String,
    #[serde(default)]
    html_url: Option<String>,
    commit: CompareCommitDetail,
}

#[derive(Debug, Deserialize)]
struct CompareCommitDetail {
    message: String,
    #[serde(default)]
    author: Option<CompareAuthor>,
}

#[derive(Debug, Deserialize)]
struct CompareAuthor {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct TreeRequest<'a> {
    base_tree: &'a str,
    tree: &'a [TreeEntry],
}

#[derive(Debug, Deserialize)]
struct GitHubErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Decode GitHub's line-wrapped base64 file content.
pub(crate) fn decode_base64_content(content: &str) -> StaticmsResult<String> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact)
        .map_err(|e| utils::parse_error("file content", e))?;
    String::from_utf8(bytes).map_err(|e| utils::parse_error("file content", e))
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, token: &str) -> StaticmsResult<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_base = Url::parse(&config.api_base)
            .map_err(|e| utils::validation_error("github.api_base", &e.to_string()))?;

        Ok(Self {
            client,
            api_base,
            token: token.to_string(),
        })
    }

    /// Build `<api_base>/repos/<owner>/<repo>/<segments...>`; segments may
    /// contain `/` and are split into path components.
    fn endpoint(&self, repo: &RepoRef, segments: &[&str]) -> StaticmsResult<Url> {
        let mut url = self.api_base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| StaticmsError::Internal {
                message: format!("API base {} cannot carry a path", self.api_base),
            })?;
            path.pop_if_empty();
            path.extend(["repos", repo.owner.as_str(), repo.repo.as_str()]);
            for segment in segments {
                path.extend(segment.split('/').filter(|s| !s.is_empty()));
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        step: CommitStep,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> StaticmsResult<Response> {
        debug!("{} {} ({})", method, url, step);
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(body) = body {
            request = request.json(&body);
        }
        request
            .send()
            .await
            .map_err(|e| StaticmsError::upstream(step, e.status().map(|s| s.as_u16()), e.to_string()))
    }

    async fn read_json<T: DeserializeOwned>(&self, step: CommitStep, response: Response) -> StaticmsResult<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| StaticmsError::upstream(step, Some(status.as_u16()), e.to_string()));
        }
        Err(Self::failure(step, response).await)
    }

    async fn failure(step: CommitStep, response: Response) -> StaticmsError {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return StaticmsError::Unauthorized;
        }
        let message = response
            .json::<GitHubErrorBody>()
            .await
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        StaticmsError::upstream(step, Some(status.as_u16()), message)
    }

    async fn current_ref(&self, repo: &RepoRef, branch: &str) -> StaticmsResult<String> {
        let url = self.endpoint(repo, &["git/ref/heads", branch])?;
        let response = self.send(CommitStep::UpdateRef, Method::GET, url, None).await?;
        let current: RefResponse = self.read_json(CommitStep::UpdateRef, response).await?;
        Ok(current.object.sha)
    }
}

#[async_trait]
impl GitHost for GitHubClient {
    async fn get_branch(&self, repo: &RepoRef, branch: &str) -> StaticmsResult<BranchHead> {
        let url = self.endpoint(repo, &["branches", branch])?;
        let response = self.send(CommitStep::ResolveBranch, Method::GET, url, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(utils::not_found_error("branch", branch));
        }
        let branch: BranchResponse = self.read_json(CommitStep::ResolveBranch, response).await?;
        Ok(BranchHead {
            commit_sha: branch.commit.sha,
            tree_sha: branch.commit.commit.tree.sha,
        })
    }

    async fn create_ref(&self, repo: &RepoRef, branch: &str, sha: &str) -> StaticmsResult<()> {
        let url = self.endpoint(repo, &["git/refs"])?;
        let body = json!({ "ref": format!("refs/heads/{}", branch), "sha": sha });
        let response = self.send(CommitStep::CreateBranch, Method::POST, url, Some(body)).await?;
        let _: RefResponse = self.read_json(CommitStep::CreateBranch, response).await?;
        Ok(())
    }

    async fn create_blob(&self, repo: &RepoRef, content: &str, encoding: &str) -> StaticmsResult<String> {
        let url = self.endpoint(repo, &["git/blobs"])?;
        let body = json!({ "content": content, "encoding": encoding });
        let response = self.send(CommitStep::CreateBlob, Method::POST, url, Some(body)).await?;
        let blob: ShaResponse = self.read_json(CommitStep::CreateBlob, response).await?;
        Ok(blob.sha)
    }

    async fn create_tree(
        &self,
        repo: &RepoRef,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> StaticmsResult<String> {
        let url = self.endpoint(repo, &["git/trees"])?;
        let body = serde_json::to_value(TreeRequest {
            base_tree,
            tree: entries,
        })?;
        let response = self.send(CommitStep::CreateTree, Method::POST, url, Some(body)).await?;
        let tree: ShaResponse = self.read_json(CommitStep::CreateTree, response).await?;
        Ok(tree.sha)
    }

    async fn create_commit(
        &self,
        repo: &RepoRef,
        message: &str,
        tree: &str,
        parents: &[String],
    ) -> StaticmsResult<String> {
        let url = self.endpoint(repo, &["git/commits"])?;
        let body = json!({ "message": message, "tree": tree, "parents": parents });
        let response = self.send(CommitStep::CreateCommit, Method::POST, url, Some(body)).await?;
        let commit: ShaResponse = self.read_json(CommitStep::CreateCommit, response).await?;
        Ok(commit.sha)
    }

    async fn update_ref(
        &self,
        repo: &RepoRef,
        branch: &str,
        expected_parent: &str,
        new_sha: &str,
    ) -> StaticmsResult<()> {
        let actual = self.current_ref(repo, branch).await?;
        if actual != expected_parent {
            return Err(StaticmsError::RefConflict {
                branch: branch.to_string(),
                expected: expected_parent.to_string(),
                actual,
            });
        }

        // force=false makes GitHub reject anything but a fast-forward, which
        // closes the window between the check above and the update.
        let url = self.endpoint(repo, &["git/refs/heads", branch])?;
        let body = json!({ "sha": new_sha, "force": false });
        let response = self.send(CommitStep::UpdateRef, Method::PATCH, url, Some(body)).await?;
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let actual = self.current_ref(repo, branch).await?;
            if actual != expected_parent {
                return Err(StaticmsError::RefConflict {
                    branch: branch.to_string(),
                    expected: expected_parent.to_string(),
                    actual,
                });
            }
        }
        let _: RefResponse = self.read_json(CommitStep::UpdateRef, response).await?;
        Ok(())
    }

    async fn delete_ref(&self, repo: &RepoRef, branch: &str) -> StaticmsResult<()> {
        let url = self.endpoint(repo, &["git/refs/heads", branch])?;
        let response = self.send(CommitStep::DeleteBranch, Method::DELETE, url, None).await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(Self::failure(CommitStep::DeleteBranch, response).await)
    }

    async fn create_pull(&self, repo: &RepoRef, pull: &NewPullRequest) -> StaticmsResult<PullRequestInfo> {
        let url = self.endpoint(repo, &["pulls"])?;
        let body = serde_json::to_value(pull)?;
        let response = self.send(CommitStep::OpenPullRequest, Method::POST, url, Some(body)).await?;
        let pull: GitHubPull = self.read_json(CommitStep::OpenPullRequest, response).await?;
        Ok(pull.into())
    }

    async fn get_pull(&self, repo: &RepoRef, number: u64) -> StaticmsResult<PullRequestInfo> {
        let url = self.endpoint(repo, &["pulls", &number.to_string()])?;
        let response = self.send(CommitStep::GetPullRequest, Method::GET, url, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(utils::not_found_error("pull request", &number.to_string()));
        }
        let pull: GitHubPull = self.read_json(CommitStep::GetPullRequest, response).await?;
        Ok(pull.into())
    }

    async fn compare(&self, repo: &RepoRef, base: &str, head: &str) -> StaticmsResult<Vec<CommitSummary>> {
        let range = format!("{}...{}", base, head);
        let mut url = self.endpoint(repo, &["compare"])?;
        if let Ok(mut path) = url.path_segments_mut() {
            path.push(&range);
        }
        let response = self.send(CommitStep::Compare, Method::GET, url, None).await?;
        let compare: CompareResponse = self.read_json(CommitStep::Compare, response).await?;
        Ok(compare
            .commits
            .into_iter()
            .map(|c| CommitSummary {
                sha: c.sha,
                message: c.commit.message,
                author: c.commit.author.and_then(|a| a.name),
                html_url: c.html_url,
            })
            .collect())
    }

    async fn get_contents(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> StaticmsResult<Option<RemoteFile>> {
        let mut url = self.endpoint(repo, &["contents", path])?;
        url.query_pairs_mut().append_pair("ref", git_ref);
        let response = self.send(CommitStep::FetchContents, Method::GET, url, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let file: ContentsResponse = self.read_json(CommitStep::FetchContents, response).await?;
        let content = match (file.content.as_deref(), file.encoding.as_deref()) {
            (Some(content), Some("base64")) => decode_base64_content(content)?,
            (Some(content), _) => content.to_string(),
            (None, _) => String::new(),
        };
        Ok(Some(RemoteFile {
            content,
            sha: file.sha,
        }))
    }
}

/// Creates a [`GitHubClient`] per request credential.
#[derive(Debug, Clone)]
pub struct GitHubClientFactory {
    config: GitHubConfig,
}

impl GitHubClientFactory {
    pub fn new(config: GitHubConfig) -> Self {
        Self { config }
    }
}

impl GitHostFactory for GitHubClientFactory {
    fn for_token(&self, token: &str) -> StaticmsResult<Arc<dyn GitHost>> {
        Ok(Arc::new(GitHubClient::new(&self.config, token)?))
    }
}
