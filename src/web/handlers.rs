//! HTTP API handlers

use super::auth::BearerToken;
use super::server::AppState;
use crate::commit::{BranchAndPrPublisher, CommitRequest};
use crate::error::{utils, CommitStep, StaticmsError};
use crate::github::{CommitSummary, GitHost, NewPullRequest, PullRequestInfo, RepoRef};
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Error response carrying the mapped HTTP status.
#[derive(Debug)]
pub struct ApiError(pub StaticmsError);

impl From<StaticmsError> for ApiError {
    fn from(error: StaticmsError) -> Self {
        Self(error)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<CommitStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(utils::status_code(&self.0))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            debug!("Request rejected ({}): {}", status, self.0);
        }

        let path = match &self.0 {
            StaticmsError::Upstream { path, .. } => path.clone(),
            _ => None,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            step: self.0.step(),
            path,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn host_for(state: &AppState, token: &BearerToken) -> ApiResult<Arc<dyn GitHost>> {
    Ok(state.hosts.for_token(&token.0)?)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
}

/// Batch commit response
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchCommitResponse {
    pub success: bool,
    pub commit: CommitRef,
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<PullRequestInfo>,
}

/// Write all updates of the request as one commit
pub async fn batch_commit(
    State(state): State<AppState>,
    token: BearerToken,
    Path((owner, repo)): Path<(String, String)>,
    payload: Result<Json<CommitRequest>, JsonRejection>,
) -> ApiResult<Json<BatchCommitResponse>> {
    let Json(request) =
        payload.map_err(|rejection| utils::validation_error("body", &rejection.body_text()))?;
    let host = host_for(&state, &token)?;

    let outcome = BranchAndPrPublisher::new(host, state.commit.clone())
        .publish(&RepoRef::new(owner, repo), &request)
        .await?;

    Ok(Json(BatchCommitResponse {
        success: true,
        commit: CommitRef {
            sha: outcome.commit_sha,
        },
        branch: outcome.branch,
        pr: outcome.pr,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    pub base: String,
    pub head: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompareResponse {
    pub commits: Vec<CommitSummary>,
}

/// Commits on `head` that are not on `base`
pub async fn compare(
    State(state): State<AppState>,
    token: BearerToken,
    Path((owner, repo)): Path<(String, String)>,
    query: Result<Query<CompareQuery>, QueryRejection>,
) -> ApiResult<Json<CompareResponse>> {
    let Query(query) =
        query.map_err(|rejection| utils::validation_error("query", &rejection.body_text()))?;
    let host = host_for(&state, &token)?;
    let commits = host
        .compare(&RepoRef::new(owner, repo), &query.base, &query.head)
        .await?;
    Ok(Json(CompareResponse { commits }))
}

/// Open a pull request outside the batch-commit flow
pub async fn create_pull(
    State(state): State<AppState>,
    token: BearerToken,
    Path((owner, repo)): Path<(String, String)>,
    payload: Result<Json<NewPullRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PullRequestInfo>)> {
    let Json(pull) =
        payload.map_err(|rejection| utils::validation_error("body", &rejection.body_text()))?;
    for (field, value) in [("title", &pull.title), ("head", &pull.head), ("base", &pull.base)] {
        if value.trim().is_empty() {
            return Err(utils::validation_error(field, "must not be empty").into());
        }
    }

    let host = host_for(&state, &token)?;
    let info = host.create_pull(&RepoRef::new(owner, repo), &pull).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

/// Current state of a pull request
pub async fn get_pull(
    State(state): State<AppState>,
    token: BearerToken,
    Path((owner, repo, number)): Path<(String, String, u64)>,
) -> ApiResult<Json<PullRequestInfo>> {
    let host = host_for(&state, &token)?;
    Ok(Json(host.get_pull(&RepoRef::new(owner, repo), number).await?))
}

#[derive(Debug, Deserialize)]
pub struct ContentsQuery {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContentsResponse {
    pub content: String,
    pub sha: String,
    pub encoding: String,
}

/// Decoded file content at a ref (default `main`)
pub async fn get_contents(
    State(state): State<AppState>,
    token: BearerToken,
    Path((owner, repo, path)): Path<(String, String, String)>,
    Query(query): Query<ContentsQuery>,
) -> ApiResult<Json<ContentsResponse>> {
    let host = host_for(&state, &token)?;
    let git_ref = query.git_ref.unwrap_or_else(|| "main".to_string());
    let path = path.trim_start_matches('/');

    match host.get_contents(&RepoRef::new(owner, repo), path, &git_ref).await? {
        Some(file) => Ok(Json(ContentsResponse {
            content: file.content,
            sha: file.sha,
            encoding: "utf-8".to_string(),
        })),
        None => Err(utils::not_found_error("file", path).into()),
    }
}
