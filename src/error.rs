//! Error handling for staticms.
//!
//! A single error type covers the draft (client) side and the batch-commit
//! (server) side. Variants follow the failure taxonomy the editor reacts to:
//! credentials, missing content, malformed requests, Git-host failures with
//! the step that failed, and optimistic-concurrency collisions on refs.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Step of the batch-commit sequence that produced an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStep {
    ResolveBranch,
    CreateBranch,
    CreateBlob,
    CreateTree,
    CreateCommit,
    UpdateRef,
    OpenPullRequest,
    DeleteBranch,
    FetchContents,
    GetPullRequest,
    Compare,
}

impl fmt::Display for CommitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitStep::ResolveBranch => "resolve_branch",
            CommitStep::CreateBranch => "create_branch",
            CommitStep::CreateBlob => "create_blob",
            CommitStep::CreateTree => "create_tree",
            CommitStep::CreateCommit => "create_commit",
            CommitStep::UpdateRef => "update_ref",
            CommitStep::OpenPullRequest => "open_pull_request",
            CommitStep::DeleteBranch => "delete_branch",
            CommitStep::FetchContents => "fetch_contents",
            CommitStep::GetPullRequest => "get_pull_request",
            CommitStep::Compare => "compare",
        };
        f.write_str(name)
    }
}

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum StaticmsError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Resource not found: {resource} '{name}'")]
    NotFound { resource: String, name: String },

    #[error("Validation failed: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Git host error during {step}{}: {message}", path_suffix(.path))]
    Upstream {
        step: CommitStep,
        status: Option<u16>,
        message: String,
        path: Option<String>,
    },

    #[error("Branch '{branch}' moved: expected head {expected}, found {actual}")]
    RefConflict {
        branch: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn path_suffix(path: &Option<String>) -> String {
    path.as_ref().map(|p| format!(" ({})", p)).unwrap_or_default()
}

/// Result type alias for staticms operations
pub type StaticmsResult<T> = Result<T, StaticmsError>;

impl StaticmsError {
    pub fn upstream(step: CommitStep, status: Option<u16>, message: impl Into<String>) -> Self {
        StaticmsError::Upstream {
            step,
            status,
            message: message.into(),
            path: None,
        }
    }

    /// Attach the file path an upstream failure relates to.
    pub fn at_path(self, file_path: &str) -> Self {
        match self {
            StaticmsError::Upstream {
                step,
                status,
                message,
                ..
            } => StaticmsError::Upstream {
                step,
                status,
                message,
                path: Some(file_path.to_string()),
            },
            other => other,
        }
    }

    /// Failing step, when the error came from the Git host.
    pub fn step(&self) -> Option<CommitStep> {
        match self {
            StaticmsError::Upstream { step, .. } => Some(*step),
            StaticmsError::RefConflict { .. } => Some(CommitStep::UpdateRef),
            _ => None,
        }
    }
}

/// Utility functions for error handling
pub mod utils {
    use super::*;

    /// Only ref collisions are worth retrying from a fresh branch head.
    pub fn is_retryable(error: &StaticmsError) -> bool {
        matches!(error, StaticmsError::RefConflict { .. })
    }

    /// Check if an error is user-facing (should be shown to the editor)
    pub fn is_user_facing(error: &StaticmsError) -> bool {
        matches!(
            error,
            StaticmsError::Unauthorized
                | StaticmsError::NotFound { .. }
                | StaticmsError::Validation { .. }
                | StaticmsError::Upstream { .. }
                | StaticmsError::RefConflict { .. }
        )
    }

    /// HTTP status an error is reported with.
    pub fn status_code(error: &StaticmsError) -> u16 {
        match error {
            StaticmsError::Unauthorized => 401,
            StaticmsError::Validation { .. } => 400,
            StaticmsError::NotFound { .. } => 404,
            StaticmsError::RefConflict { .. } => 409,
            StaticmsError::Upstream { status, .. } => status.unwrap_or(500),
            StaticmsError::Http(e) => e.status().map(|s| s.as_u16()).unwrap_or(500),
            _ => 500,
        }
    }

    /// Simplify error message for a notification toast
    pub fn simplify_error_message(error: &StaticmsError) -> String {
        match error {
            StaticmsError::Unauthorized => "Your session expired, please sign in again".to_string(),
            StaticmsError::Http(e) => format!("Network request failed: {}", e),
            StaticmsError::Validation { field, message } => {
                format!("Invalid {}: {}", field, message)
            }
            StaticmsError::NotFound { resource, name } => {
                format!("{} '{}' not found", resource, name)
            }
            StaticmsError::RefConflict { branch, .. } => {
                format!("Branch '{}' changed while saving, please retry", branch)
            }
            _ => error.to_string(),
        }
    }

    /// Create a validation error
    pub fn validation_error(field: &str, message: &str) -> StaticmsError {
        StaticmsError::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a resource not found error
    pub fn not_found_error(resource: &str, name: &str) -> StaticmsError {
        StaticmsError::NotFound {
            resource: resource.to_string(),
            name: name.to_string(),
        }
    }

    /// Create a parse error
    pub fn parse_error(what: &str, message: impl fmt::Display) -> StaticmsError {
        StaticmsError::Parse {
            what: what.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_carries_step_and_path() {
        let err = StaticmsError::upstream(CommitStep::CreateBlob, Some(422), "bad content")
            .at_path("content/posts/a.md");

        assert_eq!(err.step(), Some(CommitStep::CreateBlob));
        assert_eq!(utils::status_code(&err), 422);
        let text = err.to_string();
        assert!(text.contains("create_blob"));
        assert!(text.contains("content/posts/a.md"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(utils::status_code(&StaticmsError::Unauthorized), 401);
        assert_eq!(
            utils::status_code(&utils::validation_error("message", "required")),
            400
        );
        assert_eq!(
            utils::status_code(&StaticmsError::upstream(CommitStep::CreateTree, None, "boom")),
            500
        );
    }

    #[test]
    fn test_only_ref_conflicts_are_retryable() {
        let conflict = StaticmsError::RefConflict {
            branch: "main".to_string(),
            expected: "aaa".to_string(),
            actual: "bbb".to_string(),
        };
        assert!(utils::is_retryable(&conflict));
        assert_eq!(conflict.step(), Some(CommitStep::UpdateRef));
        assert!(!utils::is_retryable(&StaticmsError::upstream(
            CommitStep::UpdateRef,
            Some(500),
            "server error"
        )));
    }

    #[test]
    fn test_error_utils() {
        let io_error = StaticmsError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "access denied",
        ));
        assert!(!utils::is_user_facing(&io_error));

        let missing = utils::not_found_error("file", "posts/a.md");
        assert!(utils::is_user_facing(&missing));
        assert_eq!(utils::simplify_error_message(&missing), "file 'posts/a.md' not found");
    }
}
