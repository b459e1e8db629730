//! 🚀 lcx-cli — the front door of the log compactor.
//!
//! 🎬 *[narrator voice]* "It all started with four million files named `part-000001.gz`..."
//! 📦 Thin wrapper: set up logging, turn flags (or an event payload) into an `AppConfig`,
//! hand it to `lcx::run`, print the receipt. Like a manager. 🦆

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lcx::app_config::{AggregateEvent, AppConfig, ConfigOverrides, RuntimeOverrides};
use lcx::errors::CompactError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 🗜️ Compact a day's worth of tiny S3 log fragments into a few big gzip bundles.
#[derive(Debug, Parser)]
#[command(name = "lcx", version, about)]
struct Cli {
    /// 🔧 Optional TOML config file. Env vars (LCX_*) are read either way.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 🧑‍💻 Manual run, driven by flags.
    Run(RunArgs),
    /// 📨 Triggered run, driven by a JSON event payload (a file path, or `-` for stdin).
    Event {
        payload: String,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// 📥 Source root, e.g. `s3://raw-logs/logs/`
    #[arg(long)]
    source: Option<String>,
    /// 📤 Destination root, e.g. `s3://compacted-logs/`
    #[arg(long)]
    destination: Option<String>,
    /// 📅 Date path segment, e.g. `2024-01-01`
    #[arg(long)]
    date: Option<String>,
    /// 🧪 `--dry-run false` to actually write. Bare `--dry-run` means true.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    dry_run: Option<bool>,
    /// 🧵 Concurrent fetch workers
    #[arg(long)]
    workers: Option<usize>,
    /// 📏 Bundle threshold in decoded bytes
    #[arg(long)]
    max_bundle_size: Option<u64>,
    /// 🎯 Only run this partition (repeatable)
    #[arg(long = "only")]
    only: Vec<String>,
}

impl RunArgs {
    fn into_overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            source: self.source,
            destination: self.destination,
            date: self.date,
            dry_run: self.dry_run,
            only_partitions: (!self.only.is_empty()).then_some(self.only),
            runtime: RuntimeOverrides {
                worker_count: self.workers,
                max_bundle_size_bytes: self.max_bundle_size,
            },
        }
    }
}

fn read_event_payload(payload: &str) -> Result<String> {
    if payload == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("💀 Failed to read the event payload from stdin")?;
        return Ok(buffer);
    }
    std::fs::read_to_string(payload)
        .with_context(|| format!("💀 Failed to read the event payload from '{payload}'"))
}

/// 🗝️ The object key a failure is about, if any layer of the error names one.
fn failing_key(err: &anyhow::Error) -> Option<&str> {
    err.downcast_ref::<CompactError>().and_then(CompactError::key)
}

fn build_config(cli: Cli) -> Result<AppConfig> {
    let config_file = cli.config.as_deref();
    if let Some(path) = config_file {
        // 🔒 Validate the config file exists before we get too emotionally attached
        if !path
            .try_exists()
            .with_context(|| format!("💀 Couldn't check whether '{}' exists", path.display()))?
        {
            anyhow::bail!(
                "💀 Configuration file not found at '{}'. Relative paths resolve against the current directory.",
                path.display()
            );
        }
    }

    match cli.command {
        Command::Run(args) => lcx::app_config::load_config(config_file, &args.into_overrides())
            .context("💀 Couldn't assemble a config from the file, LCX_* env vars and flags"),
        Command::Event { payload } => {
            let event = AggregateEvent::from_json(&read_event_payload(&payload)?)?;
            let ambient = lcx::app_config::load_ambient_config(config_file)?;
            Ok(event.into_app_config(ambient)?)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = match build_config(cli) {
        Ok(app_config) => lcx::run(app_config).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(report) => {
            println!("{}", lcx::progress::summary_table(&report));
            if report.dry_run {
                info!("🧪 Dry run: nothing was written. Pass `--dry-run false` to do it for real.");
            }
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one layer at a time
            let mut smells_like_credentials = false;
            let mut smells_like_connection = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("AccessDenied")
                    || cause_str.contains("credentials")
                    || cause_str.contains("ExpiredToken")
                {
                    smells_like_credentials = true;
                }
                if cause_str.contains("dispatch failure")
                    || cause_str.contains("connection refused")
                    || cause_str.contains("Connection refused")
                    || cause_str.contains("dns error")
                {
                    smells_like_connection = true;
                }
            }
            if let Some(key) = failing_key(&err) {
                error!("🗝️ failing key: {}", key);
            }

            if smells_like_credentials {
                error!(
                    "🔧 hint: this looks like an AWS credentials or permissions problem. \
                    Check AWS_PROFILE / AWS_ACCESS_KEY_ID, and that the role can List, Get and Put \
                    on both buckets."
                );
            }
            if smells_like_connection {
                error!(
                    "🔧 hint: the object store isn't reachable. If you're pointing at MinIO or \
                    LocalStack, check `store.endpoint_url` and `store.force_path_style`."
                );
            }

            // 🗑️ Exit with prejudice.
            std::process::exit(1);
        }
    }
}
