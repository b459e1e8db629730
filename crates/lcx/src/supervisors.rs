//! 🎬 *[camera pans across a bucket with four million tiny gzip files in it]*
//! 🎬 "In a world where log shippers flush every five seconds..."
//! 🎬 "One orchestrator dared to bundle them all."
//!
//! 📦 The Supervisor module. The `Orchestrator` finds the partitions, then for each one
//! wires enumerator → bounded channel → fetch workers → the one shared buffer → uploader,
//! runs it to the end, and moves on to the next partition.
//!
//! ⚠️ DO NOT MAKE THIS PUB EVER
//! 💀 WORKERS ARE SUPERVISORS PRIVATE LITTLE MINIONS WHOM THE WORLD FORGOT ABOUT
//!
//! 🧠 Knowledge graph:
//! - Per partition: `Idle → Listing → Streaming → Draining → FinalFlush → Done`,
//!   or straight to `Failed` from `Streaming`/`Draining`, skipping the final flush
//! - First error wins: workers report on a bounded error channel, the feeder sees it,
//!   cancels the token, stops sending and closes the intake channel
//! - Partitions run one after another. A failed partition fails the job.

mod aggregation;
mod enumerator;
mod uploader;
mod workers;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use async_channel::{Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app_config::AppConfig;
use crate::backends::StoreBackend;
use crate::common::{JobReport, ObjectKey, Partition, RunResult};
use crate::errors::CompactError;
use crate::progress::{ProgressMetrics, format_number};
use aggregation::{AggregationBuffer, SharedBuffer};
use enumerator::KeyEnumerator;
use uploader::BundleUploader;
use workers::{FetchWorker, Worker};

/// 🚦 Where a partition run is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Listing,
    Streaming,
    Draining,
    FinalFlush,
    Done,
    Failed,
}

/// 🚦 Tiny bookkeeping wrapper so every transition gets logged the same way.
#[derive(Debug)]
struct RunStateMachine<'a> {
    partition: &'a str,
    state: RunState,
}

impl<'a> RunStateMachine<'a> {
    fn new(partition: &'a str) -> Self {
        Self {
            partition,
            state: RunState::Idle,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug!("🚦 {}: {:?} → {:?}", self.partition, self.state, next);
        self.state = next;
    }
}

/// 📦 The Orchestrator: hovers over the workers asking "is it done yet?" so you don't have to.
#[derive(Debug)]
pub(crate) struct Orchestrator {
    app_config: AppConfig,
    store: Arc<StoreBackend>,
}

impl Orchestrator {
    pub(crate) fn new(app_config: AppConfig, store: StoreBackend) -> Self {
        Self {
            app_config,
            store: Arc::new(store),
        }
    }

    /// 🚀 The whole job: discover, then run every partition in order.
    ///
    /// 💀 The first failed partition ends the job. Partitions that already finished keep
    /// their bundles; the rest never start.
    pub(crate) async fn run(&self) -> Result<JobReport> {
        self.app_config.validate()?;
        let partitions = self.discover_partitions().await?;
        info!(
            "🗂️ {} partition(s) under {} for {} ({})",
            partitions.len(),
            self.app_config.source,
            self.app_config.date,
            if self.app_config.dry_run { "dry run" } else { "live" }
        );

        let mut report = JobReport {
            runs: Vec::with_capacity(partitions.len()),
            dry_run: self.app_config.dry_run,
        };
        for partition in &partitions {
            let mut run = self.run_partition(partition).await;
            if let Some(err) = run.first_error.take() {
                return Err(err.context(format!("partition '{}' failed", partition.name)));
            }
            report.runs.push(run);
        }
        Ok(report)
    }

    /// 🗂️ One partition per common prefix under the source root, minus anything the
    /// `only_partitions` filter leaves out.
    async fn discover_partitions(&self) -> Result<Vec<Partition>> {
        let source = &self.app_config.source;
        let common_prefixes = KeyEnumerator::partitions(self.store.clone(), &source.bucket, &source.prefix)
            .collect_all()
            .await
            .context("partition discovery failed")?;

        let destination = &self.app_config.destination;
        let same_bucket = source.bucket == destination.bucket;
        let mut partitions: Vec<Partition> = common_prefixes
            .iter()
            .filter(|prefix| {
                // -- 🧱 the bundle tree can sit under the source root; it is not an application
                let is_bundle_tree =
                    same_bucket && !destination.prefix.is_empty() && prefix.starts_with(&destination.prefix);
                if is_bundle_tree {
                    debug!("🧱 skipping {} (destination root)", prefix);
                }
                !is_bundle_tree
            })
            .map(|prefix| {
                Partition::from_common_prefix(
                    prefix,
                    source,
                    &self.app_config.destination,
                    &self.app_config.date,
                )
            })
            .collect();

        let only = &self.app_config.only_partitions;
        if !only.is_empty() {
            partitions.retain(|p| only.contains(&p.name));
            for wanted in only {
                if !partitions.iter().any(|p| &p.name == wanted) {
                    warn!("🔍 partition '{}' was requested but does not exist under {}", wanted, source);
                }
            }
        }

        if same_bucket {
            if let Some(partition) = partitions.iter().find(|p| p.writes_into_own_source()) {
                return Err(CompactError::config(format!(
                    "partition '{}' would write bundles to s3://{}/{} while reading fragments from s3://{}/{}",
                    partition.name,
                    destination.bucket,
                    partition.destination_prefix,
                    source.bucket,
                    partition.source_prefix
                ))
                .into());
            }
        }
        Ok(partitions)
    }

    /// 🧵 Run one partition to completion. Never returns `Err`: a failure lands in
    /// `RunResult::first_error` so the caller decides what it means for the job.
    async fn run_partition(&self, partition: &Partition) -> RunResult {
        let started = Instant::now();
        let runtime = &self.app_config.runtime;
        let mut machine = RunStateMachine::new(&partition.name);
        info!(
            "▶️ {}: s3://{}/{} → s3://{}/{}",
            partition.name,
            self.app_config.source.bucket,
            partition.source_prefix,
            self.app_config.destination.bucket,
            partition.destination_prefix
        );

        let uploader = BundleUploader::new(
            self.store.clone(),
            self.app_config.destination.bucket.clone(),
            self.app_config.dry_run,
        );
        // -- 🔢 fresh buffer, fresh counter: every partition's first bundle is 001
        let buffer = AggregationBuffer::new(partition.destination_prefix.clone(), runtime, uploader).shared();
        let progress = Arc::new(ProgressMetrics::new(partition.name.clone()));
        let cancel = CancellationToken::new();
        let (key_tx, key_rx) = async_channel::bounded::<ObjectKey>(runtime.queue_capacity);
        let (err_tx, err_rx) = async_channel::bounded::<anyhow::Error>(runtime.worker_count);

        let handles: Vec<_> = (0..runtime.worker_count)
            .map(|id| {
                FetchWorker::new(
                    id,
                    self.app_config.source.bucket.clone(),
                    key_rx.clone(),
                    err_tx.clone(),
                    self.store.clone(),
                    buffer.clone(),
                    cancel.clone(),
                    progress.clone(),
                )
                .start()
            })
            .collect();
        // -- 🧹 only the workers hold these now, so channel closure means what it says
        drop(key_rx);
        drop(err_tx);

        let mut first_error = self
            .feed(partition, &mut machine, &key_tx, &err_rx, &progress)
            .await
            .err();
        if first_error.is_some() {
            machine.advance(RunState::Failed);
            cancel.cancel();
        } else {
            machine.advance(RunState::Draining);
        }
        key_tx.close();

        for handle in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => Err(anyhow!(join_error).context("fetch worker panicked")),
            };
            if let Err(err) = outcome {
                first_error.get_or_insert(err);
            }
        }
        if first_error.is_none() {
            if let Ok(err) = err_rx.try_recv() {
                first_error = Some(err);
            }
        }

        if first_error.is_none() {
            machine.advance(RunState::FinalFlush);
            if let Err(err) = self.final_flush(&buffer).await {
                first_error = Some(err);
            }
        }

        let (bundles, bundle_counter) = {
            let mut guard = buffer.lock().await;
            (guard.take_receipts(), guard.bundle_counter())
        };
        if first_error.is_none() {
            machine.advance(RunState::Done);
            progress.finish();
            info!(
                "✅ {}: {} objects → {} bundle(s) in {:.1?}",
                partition.name,
                format_number(progress.objects()),
                bundle_counter,
                started.elapsed()
            );
        } else {
            if machine.state != RunState::Failed {
                machine.advance(RunState::Failed);
            }
            progress.abandon();
        }

        RunResult {
            partition: partition.name.clone(),
            objects_processed: progress.objects(),
            bytes_decoded: progress.bytes(),
            bundles,
            elapsed: started.elapsed(),
            first_error,
        }
    }

    /// 📮 Enumerate keys and push them into the intake channel until the listing runs out
    /// or a worker reports an error, whichever comes first.
    async fn feed(
        &self,
        partition: &Partition,
        machine: &mut RunStateMachine<'_>,
        key_tx: &Sender<ObjectKey>,
        err_rx: &Receiver<anyhow::Error>,
        progress: &ProgressMetrics,
    ) -> Result<()> {
        let interval = self.app_config.runtime.progress_log_interval;
        let mut enumerator = KeyEnumerator::keys(
            self.store.clone(),
            &self.app_config.source.bucket,
            &partition.source_prefix,
        );
        let mut dispatched: u64 = 0;

        machine.advance(RunState::Listing);
        while let Some(page) = enumerator.next_page().await? {
            if machine.state == RunState::Listing {
                machine.advance(RunState::Streaming);
            }
            for key in page {
                // -- ⚖️ biased: a reported error must win over a send that happens to be ready
                tokio::select! {
                    biased;
                    reported = err_rx.recv() => {
                        return match reported {
                            Ok(err) => Err(err),
                            Err(_) => Err(anyhow!("every fetch worker exited before intake finished")),
                        };
                    }
                    sent = key_tx.send(ObjectKey::from(key)) => {
                        sent.context("intake channel closed while keys were still coming")?;
                    }
                }
                dispatched += 1;
                if interval > 0 && dispatched % interval == 0 {
                    info!(
                        "📈 {}: {} keys dispatched, {} objects buffered ({:.1} obj/s)",
                        partition.name,
                        format_number(dispatched),
                        format_number(progress.objects()),
                        progress.rate()
                    );
                }
            }
        }

        if dispatched == 0 {
            info!("🫙 {}: no objects under {}", partition.name, partition.source_prefix);
        }
        Ok(())
    }

    /// 🚽 Whatever is still buffered becomes the last bundle.
    async fn final_flush(&self, buffer: &SharedBuffer) -> Result<()> {
        let mut guard = buffer.lock().await;
        if guard.current_size() == 0 {
            debug!("🚽 final flush: buffer empty, nothing to do");
        }
        guard.flush().await.context("final flush failed")?;
        Ok(())
    }
}
