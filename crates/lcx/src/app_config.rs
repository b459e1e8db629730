//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🧠 Knowledge graph:
//! - Layers, lowest to highest: `LCX_*` env vars → optional TOML file → CLI overrides
//! - `AppConfig`: everything one compaction job needs. Validated before any I/O.
//! - `RuntimeConfig`: the knobs (workers, queue, bundle size, threshold rule)
//! - `AggregateEvent`: the triggered-invocation payload (`{"date", "bucket", "dryRun"}`)
//! - `AmbientConfig`: the runtime + store sections only, for event runs that bring
//!   their own source/destination
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backends::S3StoreConfig;
use crate::common::ObjectLocation;
use crate::errors::CompactError;

// -- 📏 500 MiB. the production bundle ceiling. big enough to matter, small enough to PUT.
const DEFAULT_MAX_BUNDLE_SIZE_BYTES: u64 = 500 * 1024 * 1024;

// -- 📤 where event-triggered bundles go when they share the fragments' bucket
const DEFAULT_EVENT_DESTINATION_PREFIX: &str = "compacted/";

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    /// 📥 Root of the fragments: `s3://bucket/prefix`. Partitions are its children.
    pub source: ObjectLocation,
    /// 📤 Root of the bundles. Partition and date get appended.
    pub destination: ObjectLocation,
    /// 📅 Date selector, used verbatim as a path segment (`2024-01-01`)
    pub date: String,
    /// 🧪 Safe by default. You have to *ask* to write to S3.
    #[serde(default = "default_dry_run", alias = "dryRun")]
    pub dry_run: bool,
    /// 🎯 Restrict the run to these partition names. Empty = everyone's invited.
    #[serde(default)]
    pub only_partitions: Vec<String>,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub store: S3StoreConfig,
}

fn default_dry_run() -> bool {
    true
}

/// ⚖️ When does "almost full" count as full?
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdRule {
    /// 🎯 Flush when `current + incoming > max`. A bundle may land exactly on the limit.
    ///
    /// The default, and a deliberate change: earlier versions of this job flushed on `>=`,
    /// which turns an exactly-full buffer into two bundles. Pick `MeetsOrExceeds` to get
    /// bundle boundaries matching what those versions wrote.
    #[default]
    Exceeds,
    /// 📏 Flush when `current + incoming >= max`. A bundle never reaches the limit.
    MeetsOrExceeds,
}

impl ThresholdRule {
    /// ⚖️ Would appending `incoming` bytes to `current` bytes cross the line?
    pub fn crosses(self, current: u64, incoming: u64, max: u64) -> bool {
        let projected = current.saturating_add(incoming);
        match self {
            ThresholdRule::Exceeds => projected > max,
            ThresholdRule::MeetsOrExceeds => projected >= max,
        }
    }
}

/// 🎛️ How hard and how wide the pipeline runs.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// 🧵 Concurrent fetch-decode workers
    #[serde(default = "default_worker_count", alias = "workers")]
    pub worker_count: usize,
    /// 📬 Keys buffered between the enumerator and the workers
    #[serde(default = "default_queue_capacity", alias = "channel_size")]
    pub queue_capacity: usize,
    /// 📏 Decoded bytes per bundle before a flush is forced
    #[serde(default = "default_max_bundle_size_bytes")]
    pub max_bundle_size_bytes: u64,
    /// ⚖️ `exceeds` or `meets_or_exceeds`
    #[serde(default)]
    pub threshold_rule: ThresholdRule,
    /// 📢 Log a throughput line every N dispatched objects
    #[serde(default = "default_progress_log_interval")]
    pub progress_log_interval: u64,
}

fn default_worker_count() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    10
}

fn default_max_bundle_size_bytes() -> u64 {
    DEFAULT_MAX_BUNDLE_SIZE_BYTES
}

fn default_progress_log_interval() -> u64 {
    100
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            max_bundle_size_bytes: default_max_bundle_size_bytes(),
            threshold_rule: ThresholdRule::default(),
            progress_log_interval: default_progress_log_interval(),
        }
    }
}

impl RuntimeConfig {
    /// ✅ Zero workers or a zero-byte bundle is a config error, not a hang or an infinite loop.
    pub fn validate(&self) -> Result<(), CompactError> {
        if self.worker_count == 0 {
            return Err(CompactError::config("runtime.worker_count must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(CompactError::config("runtime.queue_capacity must be at least 1"));
        }
        if self.max_bundle_size_bytes == 0 {
            return Err(CompactError::config("runtime.max_bundle_size_bytes must be positive"));
        }
        Ok(())
    }
}

impl AppConfig {
    /// ✅ Fail fast, before the first LIST. No partial state, no bill.
    pub fn validate(&self) -> Result<(), CompactError> {
        if self.date.trim().is_empty() {
            return Err(CompactError::config("date is required"));
        }
        if self.date.contains('/') {
            return Err(CompactError::config(format!(
                "date '{}' must be a single path segment",
                self.date
            )));
        }
        if self.source.bucket == self.destination.bucket && self.source.prefix == self.destination.prefix {
            return Err(CompactError::config(format!(
                "destination {} is the source; bundles would be read back as fragments",
                self.destination
            )));
        }
        self.runtime.validate()
    }
}

/// 🧩 Partial overrides layered on top of env + file. Only `Some` fields win.
///
/// The CLI fills this from its flags. Serialized straight into Figment, so the nesting
/// mirrors `AppConfig` and absent fields simply don't exist in the merged dictionary.
#[derive(Debug, Serialize, Default, Clone)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only_partitions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "RuntimeOverrides::is_empty")]
    pub runtime: RuntimeOverrides,
}

/// 🎛️ The runtime slice of `ConfigOverrides`.
#[derive(Debug, Serialize, Default, Clone)]
pub struct RuntimeOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bundle_size_bytes: Option<u64>,
}

impl RuntimeOverrides {
    fn is_empty(&self) -> bool {
        self.worker_count.is_none() && self.max_bundle_size_bytes.is_none()
    }
}

// -- 🏗️ env is the sourdough starter; the file and the overrides are the toppings.
fn base_figment(config_file_name: Option<&Path>) -> Figment {
    let config = Figment::new().merge(Env::prefixed("LCX_").split("__"));
    match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    }
}

fn context_message(config_file_name: Option<&Path>) -> String {
    match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}', environment variables (LCX_*) and flags.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (LCX_*) and flags. \
                 No file was provided, so this one's all on the environment. Classic."
            .to_string(),
    }
}

/// 🚀 Load the config: env vars, then the optional TOML file, then the overrides.
///
/// 📐 DESIGN NOTE:
///   - `config_file_name: None` → env vars + overrides only. No implicit `lcx.toml`.
///   - Later layers win on conflicts: file beats env, overrides beat file.
///   - Parsing problems and validation problems both come back as `CompactError::Config`.
pub fn load_config(
    config_file_name: Option<&Path>,
    overrides: &ConfigOverrides,
) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let the_figment = base_figment(config_file_name).merge(Serialized::defaults(overrides.clone()));
    let app_config: AppConfig = the_figment
        .extract()
        .map_err(|e| CompactError::config(e.to_string()))
        .context(context_message(config_file_name))?;

    app_config.validate()?;
    Ok(app_config)
}

/// 🧰 Just the ambient sections (runtime knobs and the store) for event-triggered runs.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct AmbientConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub store: S3StoreConfig,
}

/// 🔧 Load the runtime + store sections from env and an optional file, ignoring the rest.
pub fn load_ambient_config(config_file_name: Option<&Path>) -> anyhow::Result<AmbientConfig> {
    let ambient: AmbientConfig = base_figment(config_file_name)
        .extract()
        .map_err(|e| CompactError::config(e.to_string()))
        .context(context_message(config_file_name))?;
    ambient.runtime.validate()?;
    Ok(ambient)
}

/// 📨 The triggered-invocation payload.
///
/// Same four logical parameters as the CLI, delivered as JSON by whatever scheduler
/// woke us up. `date` and `bucket` are mandatory; leaving them out is a configuration
/// error, reported before anything touches S3.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AggregateEvent {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub dry_run: Option<bool>,
    #[serde(default)]
    pub destination_bucket: Option<String>,
    #[serde(default)]
    pub source_prefix: Option<String>,
    #[serde(default)]
    pub destination_prefix: Option<String>,
}

impl AggregateEvent {
    /// 📨 Parse a JSON payload. Malformed JSON is a config error too.
    pub fn from_json(payload: &str) -> anyhow::Result<Self> {
        serde_json::from_str(payload)
            .map_err(|e| CompactError::config(format!("malformed event payload: {e}")))
            .context("💀 The event payload arrived and it was not the JSON we were promised.")
    }

    /// 🔄 Turn the event into a full `AppConfig`, borrowing runtime + store from `ambient`.
    ///
    /// No destination bucket → bundles land next to the fragments, in the source bucket.
    pub fn into_app_config(self, ambient: AmbientConfig) -> Result<AppConfig, CompactError> {
        if self.date.trim().is_empty() {
            return Err(CompactError::config("date is required"));
        }
        if self.bucket.trim().is_empty() {
            return Err(CompactError::config("bucket is required"));
        }

        let destination_bucket = self
            .destination_bucket
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| self.bucket.clone());
        // -- 🧱 same bucket, no prefix given: keep the bundles out of the fragment tree
        let destination_prefix = match self.destination_prefix.filter(|p| !p.trim().is_empty()) {
            Some(prefix) => prefix,
            None if destination_bucket == self.bucket => DEFAULT_EVENT_DESTINATION_PREFIX.to_string(),
            None => String::new(),
        };
        let app_config = AppConfig {
            source: ObjectLocation::new(self.bucket, self.source_prefix.unwrap_or_default()),
            destination: ObjectLocation::new(destination_bucket, destination_prefix),
            date: self.date,
            dry_run: self.dry_run.unwrap_or_else(default_dry_run),
            only_partitions: Vec::new(),
            runtime: ambient.runtime,
            store: ambient.store,
        };
        app_config.validate()?;
        Ok(app_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_config(contents: &str) -> tempfile::NamedTempFile {
        let mut the_file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("💀 Failed to create a temp config. The filesystem said 'new phone who dis'.");
        the_file
            .write_all(contents.as_bytes())
            .expect("💀 Failed to write test config.");
        the_file
    }

    #[test]
    fn the_one_where_the_file_brings_everything_and_defaults_fill_the_gaps() {
        let the_file = write_test_config(
            r#"
            source = "s3://raw-logs/apps"
            destination = "s3://compacted-logs/"
            date = "2024-01-01"

            [runtime]
            worker_count = 8
            "#,
        );

        let app_config = load_config(Some(the_file.path()), &ConfigOverrides::default())
            .expect("💀 A complete config file should parse.");

        assert_eq!(app_config.source, ObjectLocation::new("raw-logs", "apps/"));
        assert_eq!(app_config.destination.prefix, "");
        assert!(app_config.dry_run, "dry-run must be on unless someone turns it off");
        assert_eq!(app_config.runtime.worker_count, 8);
        assert_eq!(app_config.runtime.queue_capacity, 10);
        assert_eq!(app_config.runtime.max_bundle_size_bytes, 500 * 1024 * 1024);
        assert_eq!(app_config.runtime.threshold_rule, ThresholdRule::Exceeds);
        assert_eq!(app_config.store.region, "us-east-1");
    }

    #[test]
    fn the_one_where_flags_outrank_the_file() {
        let the_file = write_test_config(
            r#"
            source = "s3://raw-logs/"
            destination = "s3://compacted-logs/"
            date = "2024-01-01"
            dry_run = true

            [runtime]
            worker_count = 2
            threshold_rule = "meets_or_exceeds"
            "#,
        );
        let the_overrides = ConfigOverrides {
            date: Some("2024-03-15".into()),
            dry_run: Some(false),
            runtime: RuntimeOverrides {
                worker_count: Some(16),
                max_bundle_size_bytes: None,
            },
            ..ConfigOverrides::default()
        };

        let app_config = load_config(Some(the_file.path()), &the_overrides)
            .expect("💀 Overrides on top of a valid file should parse.");

        assert_eq!(app_config.date, "2024-03-15");
        assert!(!app_config.dry_run);
        assert_eq!(app_config.runtime.worker_count, 16);
        assert_eq!(app_config.runtime.threshold_rule, ThresholdRule::MeetsOrExceeds);
    }

    #[test]
    fn the_one_where_a_missing_date_is_a_config_error_not_a_surprise() {
        let the_overrides = ConfigOverrides {
            source: Some("s3://raw-logs/".into()),
            destination: Some("s3://compacted-logs/".into()),
            ..ConfigOverrides::default()
        };

        let the_error = load_config(None, &the_overrides).expect_err("💀 no date, no run");
        assert!(matches!(
            the_error.downcast_ref::<CompactError>(),
            Some(CompactError::Config(_))
        ));
    }

    #[test]
    fn the_one_where_zero_workers_is_rejected_before_anything_hangs() {
        let the_overrides = ConfigOverrides {
            source: Some("s3://raw-logs/".into()),
            destination: Some("s3://compacted-logs/".into()),
            date: Some("2024-01-01".into()),
            runtime: RuntimeOverrides {
                worker_count: Some(0),
                max_bundle_size_bytes: None,
            },
            ..ConfigOverrides::default()
        };

        let the_error = load_config(None, &the_overrides).expect_err("💀 zero workers is zero progress");
        assert!(format!("{:#}", the_error).contains("worker_count"));
    }

    #[test]
    fn the_one_where_the_threshold_rule_draws_the_line_in_two_places() {
        assert!(!ThresholdRule::Exceeds.crosses(498, 2, 500));
        assert!(ThresholdRule::MeetsOrExceeds.crosses(498, 2, 500));
        assert!(ThresholdRule::Exceeds.crosses(500, 1, 500));
        assert!(!ThresholdRule::MeetsOrExceeds.crosses(0, 499, 500));
    }

    #[test]
    fn the_one_where_the_event_payload_becomes_a_real_config() -> anyhow::Result<()> {
        let the_event = AggregateEvent::from_json(
            r#"{ "date": "2024-01-01", "bucket": "raw-logs", "dryRun": false }"#,
        )?;
        let app_config = the_event.into_app_config(AmbientConfig::default())?;

        assert_eq!(app_config.source, ObjectLocation::new("raw-logs", ""));
        assert_eq!(app_config.destination, ObjectLocation::new("raw-logs", "compacted/"));
        assert!(!app_config.dry_run);
        Ok(())
    }

    #[test]
    fn the_one_where_an_event_aimed_at_its_own_fragments_is_refused() -> anyhow::Result<()> {
        let the_event = AggregateEvent::from_json(
            r#"{ "date": "2024-01-01", "bucket": "raw-logs", "sourcePrefix": "logs", "destinationPrefix": "logs/" }"#,
        )?;

        let the_error = the_event
            .into_app_config(AmbientConfig::default())
            .expect_err("💀 bundles on top of fragments");
        assert!(matches!(the_error, CompactError::Config(ref msg) if msg.contains("is the source")));
        Ok(())
    }

    #[test]
    fn the_one_where_a_different_bucket_can_use_the_same_prefix() -> anyhow::Result<()> {
        let the_event = AggregateEvent::from_json(
            r#"{ "date": "2024-01-01", "bucket": "raw-logs", "destinationBucket": "bundles" }"#,
        )?;
        let app_config = the_event.into_app_config(AmbientConfig::default())?;

        assert_eq!(app_config.destination, ObjectLocation::new("bundles", ""));
        Ok(())
    }

    #[test]
    fn the_one_where_an_event_without_dry_run_plays_it_safe() -> anyhow::Result<()> {
        let the_event = AggregateEvent::from_json(
            r#"{ "date": "2024-01-01", "bucket": "raw-logs", "destinationBucket": "bundles", "destinationPrefix": "compacted" }"#,
        )?;
        let app_config = the_event.into_app_config(AmbientConfig::default())?;

        assert!(app_config.dry_run);
        assert_eq!(app_config.destination, ObjectLocation::new("bundles", "compacted/"));
        Ok(())
    }

    #[test]
    fn the_one_where_events_missing_date_or_bucket_get_bounced() -> anyhow::Result<()> {
        let the_dateless = AggregateEvent::from_json(r#"{ "bucket": "raw-logs" }"#)?;
        assert_eq!(
            the_dateless.into_app_config(AmbientConfig::default()),
            Err(CompactError::config("date is required"))
        );

        let the_bucketless = AggregateEvent::from_json(r#"{ "date": "2024-01-01" }"#)?;
        assert_eq!(
            the_bucketless.into_app_config(AmbientConfig::default()),
            Err(CompactError::config("bucket is required"))
        );

        assert!(AggregateEvent::from_json("not json").is_err());
        Ok(())
    }
}
