//! One open editor: a draft with its reconciler, PR tracker and event
//! subscription, plus the save path that turns the draft into a commit.

use super::front_matter;
use super::pull_request::{PrTransition, PullRequestLifecycleTracker, PullRequestSource};
use super::reconcile::{ContentFetcher, EditorMode, RemoteSyncReconciler, SyncOutcome, SyncStatus};
use super::session::DraftSessionController;
use super::store::DraftRepository;
use super::{Draft, DraftKey, FileBlob, Notice, PrRef};
use crate::commit::{CommitRequest, FileUpdate, PublishOutcome};
use crate::error::{utils, StaticmsResult};
use crate::events::{EventBus, RepoEvent, Subscription};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::sync::Arc;
use tracing::debug;

pub struct EditorSession {
    controller: DraftSessionController,
    reconciler: RemoteSyncReconciler,
    tracker: PullRequestLifecycleTracker,
    subscription: Option<Subscription>,
}

impl EditorSession {
    /// Load the draft for `key` and, when a bus is given, subscribe to events
    /// for its repository.
    pub fn open(
        repo: Arc<dyn DraftRepository>,
        key: DraftKey,
        fallback: Draft,
        mode: EditorMode,
        bus: Option<&EventBus>,
    ) -> Self {
        let controller = DraftSessionController::load(repo, key.clone(), fallback);
        let mut reconciler = RemoteSyncReconciler::new(mode);
        reconciler.mount(key.clone());
        let mut tracker = PullRequestLifecycleTracker::new();
        tracker.track(&controller);

        let subscription = bus.map(|bus| {
            let (owner, repo) = (key.owner.clone(), key.repo.clone());
            bus.subscribe(move |event| event.concerns_repo(&owner, &repo))
        });

        Self {
            controller,
            reconciler,
            tracker,
            subscription,
        }
    }

    pub fn key(&self) -> &DraftKey {
        self.controller.key()
    }

    pub fn draft(&self) -> &Draft {
        self.controller.draft()
    }

    pub fn status(&self) -> SyncStatus {
        self.reconciler.status()
    }

    pub fn is_locked(&self) -> bool {
        self.tracker.is_locked(self.controller.draft())
    }

    pub fn reconciler(&self) -> &RemoteSyncReconciler {
        &self.reconciler
    }

    pub fn tracker(&self) -> &PullRequestLifecycleTracker {
        &self.tracker
    }

    fn ensure_unlocked(&self) -> StaticmsResult<()> {
        if let (true, Some(pr)) = (self.is_locked(), &self.controller.draft().pr) {
            return Err(utils::validation_error(
                "draft",
                &format!("Editing is locked while pull request #{} is open", pr.number),
            ));
        }
        Ok(())
    }

    /// Apply an editor change. Rejected while the draft's PR is open.
    pub fn edit<F>(&mut self, updater: F) -> StaticmsResult<()>
    where
        F: FnOnce(&mut Draft),
    {
        self.ensure_unlocked()?;
        self.controller.update(updater, None)
    }

    pub fn add_image(&mut self, image: FileBlob) -> StaticmsResult<()> {
        self.edit(|draft| {
            draft.pending_images.retain(|i| i.path != image.path);
            draft.pending_images.push(image);
        })
    }

    /// Throw the local draft away and fetch the remote file again.
    pub fn discard(&mut self) -> StaticmsResult<()> {
        self.controller.clear()?;
        self.tracker.track(&self.controller);
        self.reconciler.reload();
        Ok(())
    }

    pub async fn sync(&mut self, fetcher: &dyn ContentFetcher) -> SyncOutcome {
        self.reconciler.sync(fetcher, &mut self.controller).await
    }

    /// Wait for the next event concerning this editor's repository.
    pub async fn next_event(&mut self) -> Option<RepoEvent> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.recv().await,
            None => None,
        }
    }

    /// Route an event: pushes to the branch schedule a reload, PR status
    /// changes go to the tracker. Returns a notice for the editor, if any.
    pub async fn handle_event(
        &mut self,
        event: &RepoEvent,
        source: &dyn PullRequestSource,
    ) -> StaticmsResult<Option<Notice>> {
        if self.reconciler.on_event(event) {
            return Ok(None);
        }
        match self.tracker.handle_event(event, &mut self.controller, source).await? {
            PrTransition::Cleared(notice) => Ok(Some(notice)),
            _ => Ok(None),
        }
    }

    pub async fn check_pr_status(&mut self, source: &dyn PullRequestSource) -> StaticmsResult<Option<Notice>> {
        match self.tracker.check_pr_status(source, &mut self.controller).await? {
            PrTransition::Cleared(notice) => Ok(Some(notice)),
            _ => Ok(None),
        }
    }

    /// Commit request writing the draft file and its pending images.
    pub fn commit_request(&self, message: &str, create_pr: bool) -> StaticmsResult<CommitRequest> {
        self.ensure_unlocked()?;
        let key = self.controller.key();
        let draft = self.controller.draft();
        let content = front_matter::serialize(&draft.front_matter, &draft.body, key.format())?;

        let mut request = CommitRequest::new(key.branch.as_str(), message)
            .with_update(FileUpdate::base64(key.path.as_str(), BASE64.encode(content)));
        for image in &draft.pending_images {
            request = request.with_update(FileUpdate::base64(image.path.as_str(), image.content.as_str()));
        }
        if create_pr {
            request = request.with_pr(None);
        }
        Ok(request)
    }

    /// Apply a successful commit: images are drained, the draft is synced
    /// and an opened pull request is attached.
    pub fn complete_save(&mut self, outcome: &PublishOutcome) -> StaticmsResult<Notice> {
        let pr = outcome.pr.as_ref().map(|info| PrRef {
            number: info.number,
            url: info.html_url.clone(),
        });
        self.controller.update(
            |draft| {
                draft.pending_images.clear();
                if pr.is_some() {
                    draft.pr = pr.clone();
                }
            },
            Some(true),
        )?;

        if let Some(info) = &outcome.pr {
            self.tracker.track_opened(info);
        }
        self.reconciler.reload();
        debug!("Saved {} as {}", self.controller.key(), outcome.commit_sha);

        Ok(match &outcome.pr {
            Some(info) => Notice::success(format!("Pull request #{} opened", info.number)),
            None => Notice::success(format!("Saved to {}", outcome.branch)),
        })
    }

    /// Cancel the event subscription.
    pub fn close(self) {
        if let Some(subscription) = self.subscription {
            subscription.unsubscribe();
        }
    }
}
