//! staticms - Git-backed content editing
//!
//! Runs the batch-commit API and inspects the local draft store.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use staticms::config::ConfigManager;
use staticms::drafts::store::summarize;
use staticms::drafts::{Draft, DraftKey, DraftSessionController, JsonFileDraftRepository};
use staticms::logging::{self, LogLevel};
use staticms::web::WebServer;

/// staticms - Git-backed content editing
#[derive(Parser)]
#[command(name = "staticms")]
#[command(about = "Draft reconciliation and atomic batch commits for Git-backed content")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Inspect or discard locally stored drafts
    Drafts {
        /// Draft store file (defaults to drafts.storage_path)
        #[arg(long)]
        store: Option<PathBuf>,

        #[command(subcommand)]
        action: DraftCommands,
    },

    /// Show or write the effective configuration
    Config {
        #[arg(long)]
        show: bool,

        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

#[derive(clap::Args)]
struct Scope {
    #[arg(long)]
    user: String,
    #[arg(long)]
    owner: String,
    #[arg(long)]
    repo: String,
    #[arg(long, default_value = "main")]
    branch: String,
}

#[derive(Subcommand)]
enum DraftCommands {
    /// Summarize drafts stored below a directory
    Status {
        #[command(flatten)]
        scope: Scope,

        /// Directory inside the repository
        #[arg(long, default_value = "")]
        dir: String,
    },

    /// Delete the stored draft of one file
    Discard {
        #[command(flatten)]
        scope: Scope,

        /// File path inside the repository
        #[arg(long)]
        path: String,
    },
}

fn open_store(store: Option<PathBuf>, manager: &ConfigManager) -> Result<Arc<JsonFileDraftRepository>> {
    let path = store.unwrap_or_else(|| manager.config().drafts.storage_path.clone());
    let repo = JsonFileDraftRepository::open(&path)
        .with_context(|| format!("Failed to open draft store {:?}", path))?;
    Ok(Arc::new(repo))
}

fn handle_drafts(store: Option<PathBuf>, action: DraftCommands, manager: &ConfigManager) -> Result<()> {
    let repo = open_store(store, manager)?;
    match action {
        DraftCommands::Status { scope, dir } => {
            let key = DraftKey::new(scope.user, scope.owner, scope.repo, scope.branch, "");
            let summary = summarize(repo.as_ref(), &key, &dir);
            println!("{} draft(s) in '{}'", summary.paths.len(), dir);
            println!("  unsaved changes: {}", summary.dirty);
            println!("  awaiting pull request: {}", summary.with_pr);
            for path in &summary.paths {
                println!("  {}", path);
            }
        }
        DraftCommands::Discard { scope, path } => {
            let key = DraftKey::new(scope.user, scope.owner, scope.repo, scope.branch, path);
            let mut controller = DraftSessionController::load(repo, key.clone(), Draft::default());
            if !controller.from_storage() && controller.draft().pr.is_none() {
                println!("No stored draft for {}", key);
                return Ok(());
            }
            controller.clear()?;
            println!("Discarded draft for {}", key);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut manager = ConfigManager::new(cli.config).context("Failed to load configuration")?;
    if let Some(level) = cli.log_level {
        manager.update(|config| config.logging.level = level)?;
    }
    logging::init(&manager.config().logging);

    match cli.command {
        Commands::Serve { host, port } => {
            manager.update(|config| {
                if let Some(host) = host {
                    config.server.host = host;
                }
                if let Some(port) = port {
                    config.server.port = port;
                }
            })?;
            info!("staticms v{}", staticms::VERSION);
            WebServer::from_config(manager.config()).start().await?;
        }
        Commands::Drafts { store, action } => handle_drafts(store, action, &manager)?,
        Commands::Config { show, save } => {
            if save {
                manager.save().context("Failed to save configuration")?;
                println!("Configuration written to {:?}", manager.config_path());
            }
            if show {
                println!("{}", manager.export_as_toml()?);
            } else if !save {
                println!("Configuration file: {:?}", manager.config_path());
            }
        }
    }

    Ok(())
}
