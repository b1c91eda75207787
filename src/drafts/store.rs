//! Key/value persistence for drafts.
//!
//! The controller only sees the [`DraftRepository`] trait. Values are stored
//! as JSON strings, so a corrupted entry is something a caller can observe and
//! recover from rather than a type error.

use super::{Draft, DraftKey};
use crate::error::{utils, StaticmsResult};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Durable string store keyed by `draft_...` / `pr_...` keys.
pub trait DraftRepository: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> StaticmsResult<()>;
    fn delete(&self, key: &str) -> StaticmsResult<()>;
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
}

fn lock(entries: &Mutex<BTreeMap<String, String>>) -> MutexGuard<'_, BTreeMap<String, String>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Process-local repository, used by tests and short-lived sessions.
#[derive(Debug, Default)]
pub struct InMemoryDraftRepository {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemoryDraftRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DraftRepository for InMemoryDraftRepository {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> StaticmsResult<()> {
        lock(&self.entries).insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> StaticmsResult<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        lock(&self.entries)
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

/// Repository backed by one JSON object on disk.
///
/// Every write replaces the file through a temporary file in the same
/// directory, so a crash leaves either the old or the new map.
#[derive(Debug)]
pub struct JsonFileDraftRepository {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileDraftRepository {
    pub fn open(path: impl Into<PathBuf>) -> StaticmsResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Draft store {:?} is unreadable, starting empty: {}", path, e);
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        info!("Opened draft store {:?} with {} entries", path, entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_out(&self, entries: &BTreeMap<String, String>) -> StaticmsResult<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(entries)?.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        debug!("Wrote {} draft entries to {:?}", entries.len(), self.path);
        Ok(())
    }

    /// Apply `change` and write the result; on a failed write the in-memory
    /// map is left as it was.
    fn modify(&self, change: impl FnOnce(&mut BTreeMap<String, String>)) -> StaticmsResult<()> {
        let mut entries = lock(&self.entries);
        let mut next = entries.clone();
        change(&mut next);
        self.write_out(&next)?;
        *entries = next;
        Ok(())
    }
}

impl DraftRepository for JsonFileDraftRepository {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> StaticmsResult<()> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn delete(&self, key: &str) -> StaticmsResult<()> {
        if !lock(&self.entries).contains_key(key) {
            return Ok(());
        }
        self.modify(|entries| {
            entries.remove(key);
        })
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        lock(&self.entries)
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// Read and decode a stored draft. Corrupt values count as absent.
pub fn read_draft(repo: &dyn DraftRepository, storage_key: &str) -> Option<Draft> {
    let raw = repo.get(storage_key)?;
    match serde_json::from_str::<Draft>(&raw) {
        Ok(draft) => Some(draft),
        Err(e) => {
            warn!(
                "{}",
                utils::parse_error(&format!("stored draft '{}'", storage_key), e)
            );
            None
        }
    }
}

/// Aggregate draft state below a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftSummary {
    /// Drafts with unsaved changes.
    pub dirty: usize,
    /// Drafts waiting on a pull request.
    pub with_pr: usize,
    /// File paths of every stored draft in the directory.
    pub paths: Vec<String>,
}

impl DraftSummary {
    pub fn has_changes(&self) -> bool {
        self.dirty > 0 || self.with_pr > 0
    }
}

/// Summarize drafts stored under `dir` for the user/repo/branch of `scope`.
pub fn summarize(repo: &dyn DraftRepository, scope: &DraftKey, dir: &str) -> DraftSummary {
    let mut summary = DraftSummary::default();
    for storage_key in repo.keys_with_prefix(&scope.dir_prefix(dir)) {
        let Some(draft) = read_draft(repo, &storage_key) else {
            continue;
        };
        if draft.is_dirty {
            summary.dirty += 1;
        }
        if draft.pr.is_some() {
            summary.with_pr += 1;
        }
        if let Some(key) = DraftKey::from_storage_key(&storage_key) {
            summary.paths.push(key.path);
        }
    }
    summary
}
