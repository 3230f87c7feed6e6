//! `mnemos` command-line interface.
//!
//! Every command opens the engine from the configured data directory, runs
//! one operation, prints its result as JSON on stdout, and saves the live
//! state again if the operation changed it. Logs go to stderr.

mod config;

use clap::{Parser, Subcommand};
use mnemos_memory::{
    ContextType, DeleteTarget, FileSnapshotStore, ImportanceTier, LocalEmbedding, MemoryDraft,
    MemoryEngine, SearchFilters, SearchRequest,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, MnemosConfig};

#[derive(Parser)]
#[command(name = "mnemos", about = "Mnemos hybrid memory retrieval engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "mnemos.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an entry, or update one with --id
    Upsert {
        #[arg(long)]
        group: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long)]
        content: String,
        /// Update this entry instead of creating one
        #[arg(long)]
        id: Option<u64>,
        #[arg(long)]
        tier: Option<String>,
        #[arg(long)]
        context_type: Option<String>,
        #[arg(long)]
        weight: Option<f32>,
        /// Trigger phrase (repeatable)
        #[arg(long = "trigger")]
        triggers: Vec<String>,
    },
    /// Hybrid keyword + vector search
    Search {
        query: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        tier: Option<ImportanceTier>,
        #[arg(long)]
        context_type: Option<ContextType>,
        #[arg(long)]
        group: Option<String>,
        /// Include soft-expired deprecated entries
        #[arg(long)]
        include_expired: bool,
        /// Rank without time decay
        #[arg(long)]
        no_decay: bool,
    },
    /// Delete one entry or a whole group
    Delete {
        #[arg(long, conflicts_with = "group", required_unless_present = "group")]
        id: Option<u64>,
        #[arg(long)]
        group: Option<String>,
    },
    /// Record whether an entry was useful
    Validate {
        id: u64,
        /// Record negative feedback
        #[arg(long)]
        not_useful: bool,
    },
    /// Move an entry to another importance tier
    SetTier { id: u64, tier: ImportanceTier },
    /// Corpus statistics and index health
    Stats,
    /// Match trigger phrases against a text
    Triggers {
        text: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Retry entries whose embedding is pending
    RetryEmbeddings,
    /// Manage checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Snapshot the current state under a new name
    Create {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// List checkpoints, oldest first
    List,
    /// Replace the current state with a checkpoint
    Restore { name: String },
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = MnemosConfig::load(&cli.config).await?;
    init_logging(config.log_format);

    let store = Arc::new(FileSnapshotStore::new(config.data_dir.clone()).await?);
    let engine = MemoryEngine::new(Arc::new(LocalEmbedding::new(config.embedding_dimension)))
        .with_config(config.engine.clone())?
        .with_store(store)
        .open()
        .await?;

    let mutated = match cli.command {
        Commands::Upsert {
            group,
            title,
            content,
            id,
            tier,
            context_type,
            weight,
            triggers,
        } => {
            let draft = MemoryDraft {
                id,
                group_key: group,
                title,
                content,
                importance_tier: tier,
                context_type,
                importance_weight: weight,
                confidence_score: None,
                trigger_phrases: triggers,
            };
            let id = engine.upsert(draft).await?;
            let entry = engine.get(id).await?;
            print_json(&serde_json::json!({
                "id": id,
                "embedding_state": entry.embedding_state,
            }))?;
            true
        }
        Commands::Search {
            query,
            limit,
            tier,
            context_type,
            group,
            include_expired,
            no_decay,
        } => {
            let mut request = SearchRequest::new(query)
                .with_limit(limit)
                .with_filters(SearchFilters {
                    tier,
                    context_type,
                    group_key: group,
                    include_expired,
                });
            if no_decay {
                request = request.without_decay();
            }
            let response = engine.search(request).await?;
            print_json(&response)?;
            engine.config().track_access
        }
        Commands::Delete { id, group } => {
            let target = match (id, group) {
                (Some(id), _) => DeleteTarget::Id(id),
                (None, Some(group)) => DeleteTarget::Group(group),
                (None, None) => anyhow::bail!("either --id or --group is required"),
            };
            let removed = engine.delete(target).await?;
            print_json(&serde_json::json!({ "removed": removed }))?;
            removed > 0
        }
        Commands::Validate { id, not_useful } => {
            let outcome = engine.validate(id, !not_useful).await?;
            print_json(&outcome)?;
            true
        }
        Commands::SetTier { id, tier } => {
            let entry = engine.set_tier(id, tier).await?;
            print_json(&entry)?;
            true
        }
        Commands::Stats => {
            print_json(&engine.stats().await?)?;
            false
        }
        Commands::Triggers { text, limit } => {
            print_json(&engine.match_triggers(&text, limit).await)?;
            false
        }
        Commands::RetryEmbeddings => {
            let report = engine.retry_pending_embeddings().await?;
            print_json(&report)?;
            report.attempted > 0
        }
        Commands::Checkpoint { action } => match action {
            CheckpointAction::Create { name, description } => {
                let meta = engine.checkpoint_create(&name, &description).await?;
                print_json(&meta)?;
                false
            }
            CheckpointAction::List => {
                print_json(&engine.checkpoint_list().await?)?;
                false
            }
            CheckpointAction::Restore { name } => {
                let restored = engine.checkpoint_restore(&name).await?;
                print_json(&serde_json::json!({ "checkpoint": name, "entries": restored }))?;
                true
            }
        },
    };

    if mutated {
        engine.persist().await?;
        info!(data_dir = %config.data_dir.display(), "Saved memory state");
    }
    Ok(())
}
