//! Pull request lifecycle of a draft and the edit lock derived from it.

use super::session::DraftSessionController;
use super::{Draft, Notice, PrRef, PrStatus, PullRequestState};
use crate::error::StaticmsResult;
use crate::events::RepoEvent;
use crate::github::{GitHost, PullRequestInfo, RepoRef};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Lookup of a pull request's current state.
#[async_trait]
pub trait PullRequestSource: Send + Sync {
    async fn pull_request(&self, owner: &str, repo: &str, number: u64) -> StaticmsResult<PullRequestInfo>;
}

#[async_trait]
impl<T: GitHost + ?Sized> PullRequestSource for T {
    async fn pull_request(&self, owner: &str, repo: &str, number: u64) -> StaticmsResult<PullRequestInfo> {
        self.get_pull(&RepoRef::new(owner, repo), number).await
    }
}

/// Display metadata of the tracked pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrDetails {
    pub title: String,
    pub body: Option<String>,
    pub author: Option<String>,
}

impl From<&PullRequestInfo> for PrDetails {
    fn from(info: &PullRequestInfo) -> Self {
        Self {
            title: info.title.clone(),
            body: info.body.clone(),
            author: info.user.as_ref().map(|u| u.login.clone()),
        }
    }
}

/// Effect of a status update on the draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrTransition {
    /// Not about the tracked pull request.
    Ignored,
    /// Still open; metadata refreshed where available.
    Refreshed,
    /// Merged or closed; the PR reference was dropped and editing unlocked.
    Cleared(Notice),
}

#[derive(Debug, Default)]
pub struct PullRequestLifecycleTracker {
    state: Option<PullRequestState>,
    details: Option<PrDetails>,
}

impl PullRequestLifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow the PR referenced by the controller's draft. A reference
    /// restored from storage is assumed open until told otherwise.
    pub fn track(&mut self, controller: &DraftSessionController) {
        match &controller.draft().pr {
            None => {
                self.state = None;
                self.details = None;
            }
            Some(pr) if self.state.as_ref().map(|s| s.number) != Some(pr.number) => {
                debug!("Tracking pull request #{} for {}", pr.number, controller.key());
                self.state = Some(PullRequestState {
                    number: pr.number,
                    url: pr.url.clone(),
                    state: PrStatus::Open,
                    head_branch: None,
                });
                self.details = None;
            }
            Some(_) => {}
        }
    }

    /// Record a pull request just opened for the draft.
    pub fn track_opened(&mut self, info: &PullRequestInfo) {
        self.state = Some(PullRequestState {
            number: info.number,
            url: info.html_url.clone(),
            state: info.state,
            head_branch: Some(info.head.name.clone()),
        });
        self.details = Some(PrDetails::from(info));
    }

    pub fn state(&self) -> Option<&PullRequestState> {
        self.state.as_ref()
    }

    pub fn details(&self) -> Option<&PrDetails> {
        self.details.as_ref()
    }

    /// Editing is locked while the draft's pull request is open.
    pub fn is_locked(&self, draft: &Draft) -> bool {
        let Some(pr) = &draft.pr else {
            return false;
        };
        match &self.state {
            Some(state) if state.number == pr.number => state.state == PrStatus::Open,
            _ => true,
        }
    }

    /// Apply a `pr_status` event for the tracked pull request. Open events
    /// refresh the display metadata from `source`.
    pub async fn handle_event(
        &mut self,
        event: &RepoEvent,
        controller: &mut DraftSessionController,
        source: &dyn PullRequestSource,
    ) -> StaticmsResult<PrTransition> {
        let RepoEvent::PrStatus { number, status, .. } = event else {
            return Ok(PrTransition::Ignored);
        };
        let key = controller.key();
        let tracked = controller.draft().pr.as_ref().map(|p| p.number);
        if tracked != Some(*number) || !event.concerns_repo(&key.owner, &key.repo) {
            return Ok(PrTransition::Ignored);
        }

        if *status == PrStatus::Open {
            let (owner, repo) = (key.owner.clone(), key.repo.clone());
            match source.pull_request(&owner, &repo, *number).await {
                Ok(info) => return self.apply(info.state, Some(&info), controller),
                Err(e) => warn!("Could not refresh pull request #{}: {}", number, e),
            }
        }
        self.apply(*status, None, controller)
    }

    /// Polling fallback: fetch the current state and apply it.
    pub async fn check_pr_status(
        &mut self,
        source: &dyn PullRequestSource,
        controller: &mut DraftSessionController,
    ) -> StaticmsResult<PrTransition> {
        let Some(PrRef { number, .. }) = controller.draft().pr.clone() else {
            return Ok(PrTransition::Ignored);
        };
        let key = controller.key();
        let info = source.pull_request(&key.owner, &key.repo, number).await?;
        self.apply(info.state, Some(&info), controller)
    }

    fn apply(
        &mut self,
        status: PrStatus,
        info: Option<&PullRequestInfo>,
        controller: &mut DraftSessionController,
    ) -> StaticmsResult<PrTransition> {
        let Some(pr) = controller.draft().pr.clone() else {
            return Ok(PrTransition::Ignored);
        };

        if !status.is_terminal() {
            let head_branch = info
                .map(|i| i.head.name.clone())
                .or_else(|| self.state.as_ref().and_then(|s| s.head_branch.clone()));
            self.state = Some(PullRequestState {
                number: pr.number,
                url: pr.url.clone(),
                state: status,
                head_branch,
            });
            if let Some(info) = info {
                self.details = Some(PrDetails::from(info));
            }
            return Ok(PrTransition::Refreshed);
        }

        // Only the PR association goes; unsaved edits stay.
        controller.detach_pr()?;
        self.state = None;
        self.details = None;
        info!("Pull request #{} {}, editing unlocked", pr.number, status);

        let mut message = format!("Pull request #{} was {}", pr.number, status);
        if controller.is_dirty() {
            message.push_str("; your unsaved changes were kept");
        }
        let notice = match status {
            PrStatus::Merged => Notice::success(message),
            _ => Notice::info(message),
        };
        Ok(PrTransition::Cleared(notice))
    }
}
