//! In-memory lifecycle of a single draft.
//!
//! Storage mirrors the in-memory state after every mutation: dirty drafts are
//! persisted, clean drafts leave nothing behind unless a pull request is
//! attached (the PR association has to survive a reload). A write is applied
//! to storage first and to memory only once it succeeded, so the two never
//! disagree.

use super::store::{read_draft, DraftRepository};
use super::{Draft, DraftKey, PrRef};
use crate::error::{utils, StaticmsResult};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a draft was obtained by [`DraftSessionController::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOutcome {
    pub from_storage: bool,
    pub synced: bool,
}

pub struct DraftSessionController {
    repo: Arc<dyn DraftRepository>,
    key: DraftKey,
    fallback: Draft,
    draft: Draft,
    from_storage: bool,
}

impl std::fmt::Debug for DraftSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftSessionController")
            .field("key", &self.key)
            .field("draft", &self.draft)
            .field("from_storage", &self.from_storage)
            .finish()
    }
}

fn read_pr(repo: &dyn DraftRepository, storage_key: &str) -> Option<PrRef> {
    let raw = repo.get(storage_key)?;
    serde_json::from_str(&raw)
        .map_err(|e| warn!("{}", utils::parse_error(&format!("stored PR '{}'", storage_key), e)))
        .ok()
}

impl DraftSessionController {
    /// Load the stored draft for `key`, or start from `fallback`.
    pub fn load(repo: Arc<dyn DraftRepository>, key: DraftKey, fallback: Draft) -> Self {
        let stored = read_draft(repo.as_ref(), &key.storage_key());
        let pr = read_pr(repo.as_ref(), &key.pr_storage_key());

        let (mut draft, from_storage) = match stored {
            Some(draft) => (draft, true),
            None => {
                let mut draft = fallback.clone();
                draft.is_dirty = false;
                (draft, false)
            }
        };
        if draft.pr.is_none() {
            draft.pr = pr;
        }

        debug!(
            "Loaded draft {} (from_storage={}, dirty={})",
            key, from_storage, draft.is_dirty
        );
        Self {
            repo,
            key,
            fallback,
            draft,
            from_storage,
        }
    }

    pub fn load_outcome(&self) -> LoadOutcome {
        LoadOutcome {
            from_storage: self.from_storage,
            synced: !self.draft.is_dirty,
        }
    }

    pub fn key(&self) -> &DraftKey {
        &self.key
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn from_storage(&self) -> bool {
        self.from_storage
    }

    pub fn is_dirty(&self) -> bool {
        self.draft.is_dirty
    }

    /// A local draft exists when one was restored, the editor has changed
    /// the content since loading, or a pull request holds the content.
    pub fn has_local_draft(&self) -> bool {
        self.from_storage || self.draft.is_dirty || self.draft.pr.is_some()
    }

    /// Replace the draft. Without `synced` the change counts as an edit.
    pub fn replace(&mut self, mut draft: Draft, synced: Option<bool>) -> StaticmsResult<()> {
        draft.is_dirty = !synced.unwrap_or(false);
        self.apply(draft)
    }

    /// Modify the draft in place. Without `synced` the change counts as an edit.
    pub fn update<F>(&mut self, updater: F, synced: Option<bool>) -> StaticmsResult<()>
    where
        F: FnOnce(&mut Draft),
    {
        let mut next = self.draft.clone();
        updater(&mut next);
        next.is_dirty = !synced.unwrap_or(false);
        self.apply(next)
    }

    /// Mark the current content as matching the remote.
    pub fn mark_synced(&mut self) -> StaticmsResult<()> {
        self.update(|_| {}, Some(true))
    }

    pub fn attach_pr(&mut self, pr: PrRef) -> StaticmsResult<()> {
        let mut next = self.draft.clone();
        next.pr = Some(pr);
        self.apply(next)
    }

    /// Drop the PR association, keeping any unsaved edits.
    pub fn detach_pr(&mut self) -> StaticmsResult<()> {
        let mut next = self.draft.clone();
        next.pr = None;
        self.apply(next)
    }

    /// Discard the draft: storage is emptied and the fallback restored.
    pub fn clear(&mut self) -> StaticmsResult<()> {
        let draft_key = self.key.storage_key();
        let previous_draft = self.repo.get(&draft_key);
        self.repo.delete(&draft_key)?;

        if let Err(e) = self.repo.delete(&self.key.pr_storage_key()) {
            if let Some(value) = previous_draft {
                if let Err(restore_err) = self.repo.set(&draft_key, value) {
                    warn!("Failed to restore draft {} after error: {}", self.key, restore_err);
                }
            }
            return Err(e);
        }

        let mut draft = self.fallback.clone();
        draft.is_dirty = false;
        draft.pr = None;
        self.draft = draft;
        self.from_storage = false;
        debug!("Cleared draft {}", self.key);
        Ok(())
    }

    fn apply(&mut self, mut next: Draft) -> StaticmsResult<()> {
        next.updated_at = Some(Utc::now());
        self.persist(&next)?;
        self.draft = next;
        Ok(())
    }

    fn persist(&self, draft: &Draft) -> StaticmsResult<()> {
        let draft_key = self.key.storage_key();
        let pr_key = self.key.pr_storage_key();
        let previous_draft = self.repo.get(&draft_key);

        if draft.is_dirty || draft.pr.is_some() {
            self.repo.set(&draft_key, serde_json::to_string(draft)?)?;
        } else {
            self.repo.delete(&draft_key)?;
        }

        let pr_result = match &draft.pr {
            Some(pr) => serde_json::to_string(pr)
                .map_err(Into::into)
                .and_then(|value| self.repo.set(&pr_key, value)),
            None => self.repo.delete(&pr_key),
        };

        if let Err(e) = pr_result {
            // Put the draft entry back so storage still matches memory.
            let restored = match previous_draft {
                Some(value) => self.repo.set(&draft_key, value),
                None => self.repo.delete(&draft_key),
            };
            if let Err(restore_err) = restored {
                warn!("Failed to restore draft {} after error: {}", self.key, restore_err);
            }
            return Err(e);
        }

        debug!(
            "Persisted draft {} (dirty={}, pr={:?})",
            self.key,
            draft.is_dirty,
            draft.pr.as_ref().map(|p| p.number)
        );
        Ok(())
    }
}
