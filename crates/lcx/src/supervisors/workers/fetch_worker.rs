//! 🎬 *[a channel fills with keys. somewhere, a gzip stream waits to be unwrapped.]*
//!
//! 📥 The FetchWorker: receive key, GET, decode, append. Repeat until the channel is
//! closed and drained, or until someone pulls the cancellation cord.
//!
//! ⚠️ It never retries. The first thing that goes wrong gets reported once on the error
//! channel, and the worker goes home.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::Worker;
use crate::backends::{ObjectStore, StoreBackend};
use crate::codec;
use crate::common::ObjectKey;
use crate::errors::CompactError;
use crate::progress::ProgressMetrics;
use crate::supervisors::aggregation::SharedBuffer;

#[derive(Debug)]
pub(crate) struct FetchWorker {
    id: usize,
    bucket: String,
    key_rx: Receiver<ObjectKey>,
    err_tx: Sender<anyhow::Error>,
    store: Arc<StoreBackend>,
    buffer: SharedBuffer,
    cancel: CancellationToken,
    progress: Arc<ProgressMetrics>,
}

impl FetchWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: usize,
        bucket: impl Into<String>,
        key_rx: Receiver<ObjectKey>,
        err_tx: Sender<anyhow::Error>,
        store: Arc<StoreBackend>,
        buffer: SharedBuffer,
        cancel: CancellationToken,
        progress: Arc<ProgressMetrics>,
    ) -> Self {
        Self {
            id,
            bucket: bucket.into(),
            key_rx,
            err_tx,
            store,
            buffer,
            cancel,
            progress,
        }
    }

    /// 🔄 One object, start to finish. Returns the decoded size.
    async fn process(&self, key: &ObjectKey) -> Result<u64> {
        let raw = self
            .store
            .get(&self.bucket, key.as_str())
            .await
            .with_context(|| CompactError::Fetch {
                key: key.to_string(),
            })?;
        let content = codec::decode(raw).with_context(|| CompactError::Decode {
            key: key.to_string(),
        })?;
        let decoded = content.len() as u64;
        trace!("🫁 worker {} decoded {} ({} bytes)", self.id, key, decoded);

        // -- 🔒 the one lock. a flush triggered here uploads while we hold it.
        self.buffer
            .lock()
            .await
            .append(content)
            .await
            .with_context(|| format!("appending '{key}' to the aggregation buffer"))?;
        Ok(decoded)
    }
}

impl Worker for FetchWorker {
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!("📥 fetch worker {} started", self.id);
            loop {
                let key = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        debug!("🛑 fetch worker {} cancelled", self.id);
                        return Ok(());
                    }
                    received = self.key_rx.recv() => match received {
                        Ok(key) => key,
                        Err(_) => {
                            // Channel is empty and closed
                            debug!("🏁 fetch worker {}: channel closed. Shutting down.", self.id);
                            return Ok(());
                        }
                    },
                };

                match self.process(&key).await {
                    Ok(decoded) => self.progress.record(decoded),
                    Err(err) => {
                        warn!("💀 fetch worker {} failed on {}: {:#}", self.id, key, err);
                        // -- 📮 capacity >= worker count, so this only fails if nobody is listening anymore
                        if self.err_tx.try_send(err).is_err() {
                            debug!("📮 fetch worker {}: error channel full or closed", self.id);
                        }
                        return Ok(());
                    }
                }
            }
        })
    }
}
