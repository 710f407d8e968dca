use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod audit;
mod config;
mod constants;
mod error;
mod fs_store;
mod intake;
mod logging;
mod notify;
mod parser;
mod routing;
mod sorter;
mod storage;

use crate::audit::JsonlAuditSink;
use crate::config::Config;
use crate::fs_store::FsStore;
use crate::notify::SlackNotifier;
use crate::routing::Environment;
use crate::sorter::FileSorter;

#[derive(Parser)]
#[command(name = "sdc_file_sorter")]
#[command(about = "Sorts incoming HERMES science files into per-instrument buckets")]
#[command(version = "0.1.0")]
struct Cli {
    /// Plan and log every move without copying or deleting anything
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a trigger event batch from a JSON file
    Sort {
        /// Path to the trigger event JSON
        #[arg(long)]
        event: PathBuf,
    },
    /// Sort a single object by bucket and key
    SortFile {
        /// Source bucket holding the object
        #[arg(long)]
        bucket: String,
        /// Object key to sort
        #[arg(long)]
        key: String,
    },
}

fn build_sorter(config: &Config, dry_run: bool) -> FileSorter {
    let environment = Environment::from_name(&config.environment);
    let store = Arc::new(FsStore::new(&config.data_dir));

    let mut sorter = FileSorter::new(store, environment)
        .with_audit(Arc::new(JsonlAuditSink::new(&config.audit_dir)))
        .with_dry_run(dry_run || config.dry_run);

    match (Config::slack_token(), config.slack.channel.clone()) {
        (Some(token), Some(channel)) => {
            sorter = sorter.with_notifier(Arc::new(SlackNotifier::new(
                token,
                channel,
                config.slack.max_retries,
                Duration::from_secs(config.slack.retry_delay_secs),
            )));
        }
        _ => {
            info!("Slack token/channel not configured; notifications disabled");
        }
    }

    sorter
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Falling back to default config: {}", e);
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };
    info!("Environment: {}", config.environment);

    let sorter = build_sorter(&config, cli.dry_run);

    let result = match cli.command {
        Commands::Sort { event } => {
            println!("🔄 Sorting trigger batch from {}...", event.display());
            let raw = fs::read_to_string(&event)?;
            let event: serde_json::Value = serde_json::from_str(&raw)?;
            intake::handle_trigger(&sorter, &event).await
        }
        Commands::SortFile { bucket, key } => {
            println!("🔄 Sorting {bucket}/{key}...");
            let event = serde_json::json!({
                "Records": [{
                    "s3": {"bucket": {"name": bucket}, "object": {"key": key}}
                }]
            });
            intake::handle_trigger(&sorter, &event).await
        }
    };

    if result.is_success() {
        println!("✅ {}", result.body);
        Ok(())
    } else {
        println!("❌ {}", result.body);
        std::process::exit(1);
    }
}
