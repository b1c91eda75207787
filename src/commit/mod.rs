//! Atomic batch commits.
//!
//! A [`CommitRequest`] names any number of file writes. [`CommitBuilder`]
//! turns them into exactly one commit through the blob, tree, commit and
//! ref primitives of a [`crate::github::GitHost`]; [`BranchAndPrPublisher`]
//! wraps it with throwaway-branch creation and pull request opening.

pub mod builder;
pub mod publisher;

pub use builder::CommitBuilder;
pub use publisher::{BranchAndPrPublisher, PublishOutcome};

use crate::config::validation::is_valid_ref_name;
use crate::error::{utils, StaticmsResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const ENCODING_BASE64: &str = "base64";
pub const ENCODING_UTF8: &str = "utf-8";

fn default_branch() -> String {
    "main".to_string()
}

/// One logical file write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpdate {
    pub path: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

impl FileUpdate {
    pub fn base64(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            encoding: Some(ENCODING_BASE64.to_string()),
        }
    }

    pub fn utf8(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            encoding: Some(ENCODING_UTF8.to_string()),
        }
    }

    pub fn encoding_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.encoding.as_deref().unwrap_or(default)
    }
}

/// Intent to write N files in one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    #[serde(rename = "branch", default = "default_branch")]
    pub base_branch: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub updates: Vec<FileUpdate>,
    #[serde(default)]
    pub create_pr: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_body: Option<String>,
}

impl CommitRequest {
    pub fn new(base_branch: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            base_branch: base_branch.into(),
            message: message.into(),
            updates: Vec::new(),
            create_pr: false,
            new_branch_name: None,
            pr_title: None,
            pr_body: None,
        }
    }

    pub fn with_update(mut self, update: FileUpdate) -> Self {
        self.updates.push(update);
        self
    }

    pub fn with_pr(mut self, branch_name: Option<String>) -> Self {
        self.create_pr = true;
        self.new_branch_name = branch_name;
        self
    }

    /// Reject malformed requests before any Git object is created.
    pub fn validate(&self) -> StaticmsResult<()> {
        if self.message.trim().is_empty() {
            return Err(utils::validation_error("message", "Message is required"));
        }
        if self.updates.is_empty() {
            return Err(utils::validation_error("updates", "At least one update is required"));
        }
        if !is_valid_ref_name(&self.base_branch) {
            return Err(utils::validation_error(
                "branch",
                &format!("'{}' is not a valid branch name", self.base_branch),
            ));
        }
        if let Some(name) = &self.new_branch_name {
            if !is_valid_ref_name(name) || name == &self.base_branch {
                return Err(utils::validation_error(
                    "newBranchName",
                    &format!("'{}' cannot be used as a new branch", name),
                ));
            }
        }

        let mut seen = HashSet::new();
        for update in &self.updates {
            validate_path(&update.path)?;
            if !seen.insert(update.path.as_str()) {
                return Err(utils::validation_error(
                    "updates",
                    &format!("'{}' is updated more than once", update.path),
                ));
            }
            match update.encoding.as_deref() {
                None | Some(ENCODING_BASE64) | Some(ENCODING_UTF8) => {}
                Some(other) => {
                    return Err(utils::validation_error(
                        "encoding",
                        &format!("Unsupported encoding '{}' for {}", other, update.path),
                    ))
                }
            }
        }
        Ok(())
    }
}

fn validate_path(path: &str) -> StaticmsResult<()> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.ends_with('/')
        || path
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        return Err(utils::validation_error(
            "path",
            &format!("'{}' is not a repository file path", path),
        ));
    }
    Ok(())
}
