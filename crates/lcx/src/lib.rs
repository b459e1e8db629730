//! 🗜️ lcx — the log compactor.
//!
//! Lists a day's worth of tiny gzipped log fragments per application, streams them through
//! a pool of fetch workers into one size-bounded buffer, and writes them back out as a
//! handful of `aggregated_NNN.gz` bundles. Dry-run by default.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! let config = lcx::app_config::load_config(None, &Default::default())?;
//! let report = lcx::run(config).await?;
//! println!("{}", lcx::progress::summary_table(&report));
//! # Ok(())
//! # }
//! ```

pub mod app_config;
pub mod backends;
mod codec;
pub mod common;
pub mod errors;
pub mod progress;
mod supervisors;

use anyhow::{Context, Result};

use crate::app_config::AppConfig;
use crate::backends::StoreBackend;
use crate::common::JobReport;
use crate::supervisors::Orchestrator;

/// 🚀 Run a compaction job against real S3, built from `app_config.store`.
///
/// Config is validated before the client is built, so a bad date never costs an API call.
pub async fn run(app_config: AppConfig) -> Result<JobReport> {
    app_config.validate()?;
    let store = StoreBackend::from_config(&app_config.store)
        .await
        .context("Failed to build the S3 client")?;
    run_with_store(app_config, store).await
}

/// 🧪 Run a compaction job against any backend. Tests hand in an `InMemory` store here.
pub async fn run_with_store(app_config: AppConfig, store: StoreBackend) -> Result<JobReport> {
    Orchestrator::new(app_config, store).run().await
}
