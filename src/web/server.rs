//! HTTP server setup

use super::{handlers, WebError};
use crate::config::{CommitConfig, Config, ServerConfig};
use crate::github::{GitHostFactory, GitHubClientFactory};
use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value as JsonValue};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared state of the API handlers
#[derive(Clone)]
pub struct AppState {
    /// Builds a Git-host client for each request's credential
    pub hosts: Arc<dyn GitHostFactory>,
    pub commit: CommitConfig,
}

impl AppState {
    pub fn new(hosts: Arc<dyn GitHostFactory>, commit: CommitConfig) -> Self {
        Self { hosts, commit }
    }
}

pub struct WebServer {
    config: ServerConfig,
    app_state: AppState,
}

impl WebServer {
    pub fn new(config: ServerConfig, app_state: AppState) -> Self {
        Self { config, app_state }
    }

    /// Server talking to the configured GitHub API.
    pub fn from_config(config: &Config) -> Self {
        let hosts = Arc::new(GitHubClientFactory::new(config.github.clone()));
        Self::new(
            config.server.clone(),
            AppState::new(hosts, config.commit.clone()),
        )
    }

    /// Start the web server
    pub async fn start(self) -> Result<(), WebError> {
        let addr = format!("{}:{}", self.config.host, self.config.port)
            .parse::<SocketAddr>()
            .map_err(|e| WebError::StartupFailed(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WebError::StartupFailed(format!("Failed to bind to {}: {}", addr, e)))?;

        info!("Starting staticms API on http://{}", addr);
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), WebError> {
        let app = self.create_router();
        axum::serve(listener, app)
            .await
            .map_err(|e| WebError::StartupFailed(format!("Server error: {}", e)))
    }

    pub fn create_router(&self) -> Router {
        let api_routes = Router::new()
            .route("/repo/:owner/:repo/batch-commit", post(handlers::batch_commit))
            .route("/repo/:owner/:repo/compare", get(handlers::compare))
            .route("/repo/:owner/:repo/pulls", post(handlers::create_pull))
            .route("/repo/:owner/:repo/pulls/:number", get(handlers::get_pull))
            .route("/repo/:owner/:repo/contents/*path", get(handlers::get_contents));

        let app = Router::new()
            .nest("/api", api_routes)
            .route("/health", get(health_check))
            .with_state(self.app_state.clone());

        if self.config.cors_enabled {
            app.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        } else {
            app
        }
    }
}

/// Health check endpoint
async fn health_check() -> Json<JsonValue> {
    Json(json!({
        "status": "healthy",
        "version": crate::VERSION,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CommitStep, StaticmsResult};
    use crate::github::GitHost;
    use crate::testing::{InMemoryGitHost, POST_PATH};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    fn server(host: &Arc<InMemoryGitHost>) -> WebServer {
        let shared = host.clone();
        let factory = move |_token: &str| -> StaticmsResult<Arc<dyn GitHost>> { Ok(shared.clone()) };
        WebServer::new(
            ServerConfig::default(),
            AppState::new(Arc::new(factory), CommitConfig::default()),
        )
    }

    async fn call(
        host: &Arc<InMemoryGitHost>,
        method: &str,
        uri: &str,
        body: Option<JsonValue>,
        authorized: bool,
    ) -> (StatusCode, JsonValue) {
        let mut request = Request::builder().method(method).uri(uri);
        if authorized {
            request = request.header("authorization", "Bearer test-token");
        }
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = server(host)
            .create_router()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
        (status, json)
    }

    fn commit_body() -> JsonValue {
        json!({
            "branch": "main",
            "message": "Update content",
            "updates": [
                { "path": "content/a.md", "content": "QQ==" },
                { "path": "content/b.md", "content": "B", "encoding": "utf-8" },
                { "path": "content/c.md", "content": "Qw==", "encoding": "base64" }
            ]
        })
    }

    #[tokio::test]
    async fn test_missing_credential_is_unauthorized() {
        let host = Arc::new(InMemoryGitHost::new());
        for (method, uri) in [
            ("POST", "/api/repo/acme/site/batch-commit"),
            ("GET", "/api/repo/acme/site/compare?base=main&head=main"),
            ("GET", "/api/repo/acme/site/pulls/1"),
            ("GET", "/api/repo/acme/site/contents/a.md"),
        ] {
            let (status, body) = call(&host, method, uri, Some(commit_body()), false).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
            assert_eq!(body, json!({ "error": "Unauthorized" }));
        }
        assert_eq!(host.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_commit_writes_all_updates() {
        let host = Arc::new(InMemoryGitHost::new());
        let (status, body) = call(&host, "POST", "/api/repo/acme/site/batch-commit", Some(commit_body()), true).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["branch"], json!("main"));
        assert_eq!(body.get("pr"), None);
        assert_eq!(body["commit"]["sha"].as_str(), host.head("main").as_deref());
        let files = host.files("main");
        assert_eq!(files.get("content/a.md").map(String::as_str), Some("A"));
        assert_eq!(files.get("content/b.md").map(String::as_str), Some("B"));
        assert_eq!(files.get("content/c.md").map(String::as_str), Some("C"));
        assert_eq!(host.calls(CommitStep::UpdateRef), 1);
    }

    #[tokio::test]
    async fn test_empty_updates_rejected_before_git_calls() {
        let host = Arc::new(InMemoryGitHost::new());
        let (status, body) = call(
            &host,
            "POST",
            "/api/repo/acme/site/batch-commit",
            Some(json!({ "message": "Nothing", "updates": [] })),
            true,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("updates"));
        assert_eq!(host.calls(CommitStep::CreateBlob), 0);
        assert_eq!(host.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let host = Arc::new(InMemoryGitHost::new());
        let (status, _) = call(
            &host,
            "POST",
            "/api/repo/acme/site/batch-commit",
            Some(json!({ "message": "x", "updates": "not a list" })),
            true,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_pr_commit_returns_pull_and_keeps_base() {
        let host = Arc::new(InMemoryGitHost::new());
        let base = host.head("main");
        let mut body = commit_body();
        body["createPr"] = json!(true);

        let (status, body) = call(&host, "POST", "/api/repo/acme/site/batch-commit", Some(body), true).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(host.head("main"), base);
        assert_eq!(body["pr"]["number"], json!(1));
        assert_eq!(body["pr"]["html_url"], json!("https://github.com/acme/site/pull/1"));
        assert_eq!(body["pr"]["user"]["login"], json!("editor"));
        assert_eq!(body["pr"]["head"]["ref"], body["branch"]);

        let compare_uri = format!(
            "/api/repo/acme/site/compare?base=main&head={}",
            body["branch"].as_str().unwrap()
        );
        let (status, compared) = call(&host, "GET", &compare_uri, None, true).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(compared["commits"].as_array().map(Vec::len), Some(1));
        assert_eq!(compared["commits"][0]["message"], json!("Update content"));

        let (status, pull) = call(&host, "GET", "/api/repo/acme/site/pulls/1", None, true).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pull["state"], json!("open"));
    }

    #[tokio::test]
    async fn test_upstream_failure_reports_step_and_status() {
        let host = Arc::new(InMemoryGitHost::new());
        host.fail_on(CommitStep::CreateTree, 502);
        let before = host.head("main");

        let (status, body) = call(&host, "POST", "/api/repo/acme/site/batch-commit", Some(commit_body()), true).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["step"], json!("create_tree"));
        assert_eq!(host.head("main"), before);
    }

    #[tokio::test]
    async fn test_contents_and_missing_files() {
        let host = Arc::new(InMemoryGitHost::new().with_file("main", POST_PATH, "---\ntitle: T\n---\nHi"));

        let (status, body) = call(
            &host,
            "GET",
            &format!("/api/repo/acme/site/contents/{}?ref=main", POST_PATH),
            None,
            true,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], json!("---\ntitle: T\n---\nHi"));
        assert_eq!(body["encoding"], json!("utf-8"));

        let (status, _) = call(&host, "GET", "/api/repo/acme/site/contents/nope.md", None, true).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&host, "GET", "/api/repo/acme/site/pulls/9", None, true).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_pull_validates_fields() {
        let host = Arc::new(InMemoryGitHost::new().with_branch("feature"));
        let (status, _) = call(
            &host,
            "POST",
            "/api/repo/acme/site/pulls",
            Some(json!({ "title": " ", "head": "feature", "base": "main" })),
            true,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &host,
            "POST",
            "/api/repo/acme/site/pulls",
            Some(json!({ "title": "Feature", "head": "feature", "base": "main" })),
            true,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["number"], json!(1));
    }

    #[tokio::test]
    async fn test_serves_over_tcp() {
        let host = Arc::new(InMemoryGitHost::new());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server(&host).serve(listener));

        let client = reqwest::Client::new();
        let health: JsonValue = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], json!("healthy"));

        let response = client
            .post(format!("http://{}/api/repo/acme/site/batch-commit", addr))
            .bearer_auth("test-token")
            .json(&commit_body())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(host.files("main").len(), 3);
    }
}
