//! Repository event stream.
//!
//! Webhook notifications reach the editor as server-sent events. Each
//! interested component registers its own [`Subscription`] with a predicate;
//! dropping the subscription (or calling [`Subscription::unsubscribe`])
//! cancels it without affecting other subscribers.

use crate::drafts::PrStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Notification delivered by the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RepoEvent {
    PrStatus {
        number: u64,
        status: PrStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        repo: Option<String>,
    },
    Push {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        repo: Option<String>,
        /// Branch name or full `refs/heads/...` ref.
        #[serde(default, alias = "ref", skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after: Option<String>,
    },
}

impl RepoEvent {
    /// Decode the `data:` payload of one server-sent event. Unknown or
    /// malformed events yield `None`.
    pub fn from_sse_data(data: &str) -> Option<Self> {
        match serde_json::from_str(data) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!("Ignoring event payload: {}", e);
                None
            }
        }
    }

    /// Decode a full SSE frame (`event:`/`data:` lines separated by newlines).
    pub fn from_sse_frame(frame: &str) -> Option<Self> {
        let data: Vec<&str> = frame
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|line| line.strip_prefix(' ').unwrap_or(line))
            .collect();
        if data.is_empty() {
            return None;
        }
        Self::from_sse_data(&data.join("\n"))
    }

    /// Whether the event concerns `owner/repo`. Events that don't name a
    /// repository match every repository.
    pub fn concerns_repo(&self, owner: &str, repo: &str) -> bool {
        let (event_owner, event_repo) = match self {
            RepoEvent::PrStatus { owner, repo, .. } | RepoEvent::Push { owner, repo, .. } => {
                (owner, repo)
            }
        };
        event_owner.as_deref().map_or(true, |o| o.eq_ignore_ascii_case(owner))
            && event_repo.as_deref().map_or(true, |r| r.eq_ignore_ascii_case(repo))
    }

    /// Branch a push event landed on, with any `refs/heads/` prefix removed.
    pub fn push_branch(&self) -> Option<&str> {
        match self {
            RepoEvent::Push { branch: Some(branch), .. } => {
                Some(branch.strip_prefix("refs/heads/").unwrap_or(branch))
            }
            _ => None,
        }
    }
}

type Predicate = Box<dyn Fn(&RepoEvent) -> bool + Send + Sync>;

/// Fan-out of repository events to independent subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RepoEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event; returns how many subscriptions received it.
    pub fn publish(&self, event: RepoEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn subscribe<P>(&self, predicate: P) -> Subscription
    where
        P: Fn(&RepoEvent) -> bool + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        debug!("Event subscription {} registered", id);
        Subscription {
            id,
            receiver: self.sender.subscribe(),
            predicate: Box::new(predicate),
        }
    }
}

/// Handle on a filtered view of the event stream.
pub struct Subscription {
    id: Uuid,
    receiver: broadcast::Receiver<RepoEvent>,
    predicate: Predicate,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next matching event; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<RepoEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if (self.predicate)(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscription {} skipped {} events", self.id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<RepoEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if (self.predicate)(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Subscription {} skipped {} events", self.id, skipped);
                }
                Err(_) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {
        debug!("Event subscription {} cancelled", self.id);
    }
}
