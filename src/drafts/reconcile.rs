//! Reconciliation of a draft with the file on the Git host.
//!
//! The reconciler fetches the remote file once per path and reload trigger,
//! then either adopts it (no local draft), marks the local draft synced (same
//! content), or keeps the local draft and only refreshes the comparison
//! baseline (diverged). Fetching is split into [`RemoteSyncReconciler::begin`]
//! and [`RemoteSyncReconciler::apply`] so a result that arrives after the
//! editor moved to another file can be recognised and dropped.

use super::front_matter::{self, FrontMatter};
use super::session::DraftSessionController;
use super::{Draft, DraftKey, Notice};
use crate::error::{utils, StaticmsError, StaticmsResult};
use crate::events::RepoEvent;
use crate::github::{GitHost, RemoteFile, RepoRef};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Source of the authoritative file content for a draft.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// File at the key's branch and path; `None` when it does not exist.
    async fn fetch(&self, key: &DraftKey) -> StaticmsResult<Option<RemoteFile>>;
}

#[async_trait]
impl<T: GitHost + ?Sized> ContentFetcher for T {
    async fn fetch(&self, key: &DraftKey) -> StaticmsResult<Option<RemoteFile>> {
        let repo = RepoRef::new(key.owner.as_str(), key.repo.as_str());
        self.get_contents(&repo, &key.path, &key.branch).await
    }
}

/// Last fetched remote state of a path.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSnapshot {
    pub front_matter: FrontMatter,
    pub body: String,
    /// Blob sha; `None` when the file does not exist yet.
    pub sha: Option<String>,
    pub branch: String,
}

impl RemoteSnapshot {
    pub fn empty(branch: impl Into<String>) -> Self {
        Self {
            front_matter: FrontMatter::default(),
            body: String::new(),
            sha: None,
            branch: branch.into(),
        }
    }

    pub fn from_file(key: &DraftKey, file: RemoteFile) -> Self {
        let parsed = front_matter::parse(&file.content, key.format());
        Self {
            front_matter: parsed.front_matter,
            body: parsed.body,
            sha: Some(file.sha),
            branch: key.branch.clone(),
        }
    }

    pub fn exists(&self) -> bool {
        self.sha.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Loading,
    /// No local draft; the editor shows the remote content.
    Unsynced,
    Clean,
    Dirty,
}

/// Whether the editor works on an existing file or creates a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditorMode {
    #[default]
    Edit,
    Create,
}

/// Claim on one fetch, issued by [`RemoteSyncReconciler::begin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    trigger: u64,
    key: DraftKey,
}

impl FetchTicket {
    pub fn key(&self) -> &DraftKey {
        &self.key
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Already fetched for this path and trigger.
    Skipped,
    /// The editor moved on before the fetch finished.
    Stale,
    /// Remote content became the draft.
    Adopted,
    /// The local draft equals the remote file and was marked synced.
    Matched,
    /// The local draft differs; only the baseline was refreshed.
    Diverged,
    /// The file does not exist on the branch.
    NotFound,
    Failed(Notice),
}

impl SyncOutcome {
    pub fn notice(&self) -> Option<Notice> {
        match self {
            SyncOutcome::Matched => Some(Notice::success("Local draft matched remote content and was synced")),
            SyncOutcome::Failed(notice) => Some(notice.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct RemoteSyncReconciler {
    mode: EditorMode,
    key: Option<DraftKey>,
    generation: u64,
    trigger: u64,
    fetched: HashSet<(String, u64)>,
    status: Option<SyncStatus>,
    original: Option<RemoteSnapshot>,
}

impl RemoteSyncReconciler {
    pub fn new(mode: EditorMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Point the reconciler at `key`. Any fetch issued for a previous key
    /// becomes stale.
    pub fn mount(&mut self, key: DraftKey) {
        self.generation += 1;
        self.trigger = 0;
        self.fetched.clear();
        self.original = None;
        self.status = Some(SyncStatus::Loading);
        debug!("Reconciler mounted on {} (generation {})", key, self.generation);
        self.key = Some(key);
    }

    /// Request a fresh fetch of the mounted path.
    pub fn reload(&mut self) {
        self.trigger += 1;
        self.status = Some(SyncStatus::Loading);
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn status(&self) -> SyncStatus {
        self.status.unwrap_or(SyncStatus::Loading)
    }

    /// Remote state the draft is compared against.
    pub fn original(&self) -> Option<&RemoteSnapshot> {
        self.original.as_ref()
    }

    pub fn set_original(&mut self, snapshot: RemoteSnapshot) {
        self.original = Some(snapshot);
    }

    /// Whether `draft` differs from the remembered remote state. Without a
    /// baseline the draft's own flag decides.
    pub fn is_dirty_against_original(&self, draft: &Draft) -> bool {
        match &self.original {
            Some(original) => !draft.same_content(&original.front_matter, &original.body),
            None => draft.is_dirty,
        }
    }

    /// Claim the fetch for the current path and trigger, unless it was
    /// already claimed.
    pub fn begin(&mut self) -> Option<FetchTicket> {
        let key = self.key.clone()?;
        if !self.fetched.insert((key.path.clone(), self.trigger)) {
            debug!("Fetch of {} already issued for trigger {}", key.path, self.trigger);
            return None;
        }
        Some(FetchTicket {
            generation: self.generation,
            trigger: self.trigger,
            key,
        })
    }

    /// Apply a fetch result to the draft held by `controller`.
    pub fn apply(
        &mut self,
        ticket: FetchTicket,
        result: StaticmsResult<Option<RemoteFile>>,
        controller: &mut DraftSessionController,
    ) -> SyncOutcome {
        if ticket.generation != self.generation || controller.key() != &ticket.key {
            debug!("Dropping stale fetch result for {}", ticket.key);
            return SyncOutcome::Stale;
        }

        let file = match result {
            Ok(file) => file,
            Err(e) => {
                // Allow the next sync to try again.
                self.fetched.remove(&(ticket.key.path.clone(), ticket.trigger));
                self.status = Some(self.local_status(controller));
                warn!("Failed to fetch {}: {}", ticket.key, e);
                return SyncOutcome::Failed(fetch_notice(&e));
            }
        };

        let Some(file) = file else {
            self.original = Some(RemoteSnapshot::empty(&ticket.key.branch));
            self.status = Some(self.local_status(controller));
            if self.mode == EditorMode::Edit {
                info!("{} does not exist on {} yet", ticket.key.path, ticket.key.branch);
            }
            return SyncOutcome::NotFound;
        };

        let snapshot = RemoteSnapshot::from_file(&ticket.key, file);
        let outcome = self.reconcile(&snapshot, controller);
        self.original = Some(snapshot);
        outcome
    }

    fn reconcile(&mut self, snapshot: &RemoteSnapshot, controller: &mut DraftSessionController) -> SyncOutcome {
        if !controller.has_local_draft() {
            let mut draft = controller.draft().clone();
            draft.front_matter = snapshot.front_matter.clone();
            draft.body = snapshot.body.clone();
            if let Err(e) = controller.replace(draft, Some(true)) {
                return self.storage_failure(controller, e);
            }
            self.status = Some(SyncStatus::Clean);
            debug!("Adopted remote content for {}", controller.key());
            return SyncOutcome::Adopted;
        }

        if controller.draft().same_content(&snapshot.front_matter, &snapshot.body) {
            if let Err(e) = controller.mark_synced() {
                return self.storage_failure(controller, e);
            }
            self.status = Some(SyncStatus::Clean);
            info!("Draft {} matches remote, marked synced", controller.key());
            return SyncOutcome::Matched;
        }

        self.status = Some(SyncStatus::Dirty);
        debug!("Draft {} diverges from remote, keeping local edits", controller.key());
        SyncOutcome::Diverged
    }

    fn storage_failure(&mut self, controller: &DraftSessionController, e: StaticmsError) -> SyncOutcome {
        warn!("Failed to store draft {}: {}", controller.key(), e);
        self.status = Some(self.local_status(controller));
        SyncOutcome::Failed(Notice::error(utils::simplify_error_message(&e)))
    }

    fn local_status(&self, controller: &DraftSessionController) -> SyncStatus {
        if !controller.has_local_draft() {
            SyncStatus::Unsynced
        } else if self.is_dirty_against_original(controller.draft()) {
            SyncStatus::Dirty
        } else {
            SyncStatus::Clean
        }
    }

    /// Fetch and apply in one step.
    pub async fn sync(
        &mut self,
        fetcher: &dyn ContentFetcher,
        controller: &mut DraftSessionController,
    ) -> SyncOutcome {
        let Some(ticket) = self.begin() else {
            return SyncOutcome::Skipped;
        };
        let result = fetcher.fetch(&ticket.key).await;
        self.apply(ticket, result, controller)
    }

    /// React to a repository event; a push to the mounted branch schedules
    /// a reload. Returns whether a reload was scheduled.
    pub fn on_event(&mut self, event: &RepoEvent) -> bool {
        let Some(key) = &self.key else {
            return false;
        };
        let relevant = event.concerns_repo(&key.owner, &key.repo)
            && event.push_branch() == Some(key.branch.as_str());
        if relevant {
            debug!("Push to {} triggers reload of {}", key.branch, key.path);
            self.reload();
        }
        relevant
    }
}

fn fetch_notice(e: &StaticmsError) -> Notice {
    let message = utils::simplify_error_message(e);
    match e {
        StaticmsError::Unauthorized => Notice::error(message),
        _ => Notice::warning(format!("Could not load remote content: {}", message)),
    }
}
