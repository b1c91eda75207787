// Staticms core library
//
// Draft reconciliation for the editor and atomic batch commits against a
// Git host, exposed over a small HTTP API.

pub mod commit;
pub mod config;
pub mod drafts;
pub mod error;
pub mod events;
pub mod github;
pub mod logging;
pub mod web;

#[cfg(test)]
pub mod testing;

// Re-export commonly used types
pub use commit::{BranchAndPrPublisher, CommitBuilder, CommitRequest, FileUpdate, PublishOutcome};
pub use config::{Config, ConfigError, ConfigManager};
pub use drafts::{Draft, DraftKey, DraftRepository, DraftSessionController, EditorSession};
pub use error::{CommitStep, StaticmsError, StaticmsResult};
pub use events::{EventBus, RepoEvent, Subscription};
pub use github::{GitHost, GitHubClient, RepoRef};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
