//! 🧺 The AggregationBuffer — where fragments go to become bundles.
//!
//! One per partition run. Shared by every fetch worker as `Arc<Mutex<AggregationBuffer>>`,
//! and that mutex is the only lock in the whole pipeline. Append and flush both happen
//! under it, which means a slow PUT stalls every worker's next append. That is the deal:
//! one lock, no partial bundles, no bookkeeping.
//!
//! 🧠 Knowledge graph:
//! - Sizes are *decoded* bytes, everywhere: the threshold check, the counter, the receipt
//! - Compression happens once, at flush, on a frozen copy of the accumulator
//! - `append` checks *before* adding: a single huge object can still overshoot one bundle
//! - The bundle counter only goes up. A failed upload still burns its number.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::app_config::{RuntimeConfig, ThresholdRule};
use crate::codec;
use crate::common::BundleReceipt;
use crate::errors::CompactError;
use crate::supervisors::uploader::BundleUploader;

/// 🔒 The one and only shared resource.
pub(crate) type SharedBuffer = Arc<Mutex<AggregationBuffer>>;

/// 🧺 Size-tracked accumulator with a flush policy and a bundle counter.
///
/// Invariant: `current_size == accumulator.len()`, always, and both are zero right
/// after every flush, whether or not the upload worked.
#[derive(Debug)]
pub(crate) struct AggregationBuffer {
    accumulator: Vec<u8>,
    current_size: u64,
    bundle_counter: u32,
    max_bundle_size_bytes: u64,
    threshold_rule: ThresholdRule,
    destination_prefix: String,
    uploader: BundleUploader,
    receipts: Vec<BundleReceipt>,
}

impl AggregationBuffer {
    /// 🚀 A fresh, empty buffer for one partition. Counter starts at zero.
    pub(crate) fn new(
        destination_prefix: impl Into<String>,
        runtime: &RuntimeConfig,
        uploader: BundleUploader,
    ) -> Self {
        Self {
            accumulator: Vec::new(),
            current_size: 0,
            bundle_counter: 0,
            max_bundle_size_bytes: runtime.max_bundle_size_bytes,
            threshold_rule: runtime.threshold_rule,
            destination_prefix: destination_prefix.into(),
            uploader,
            receipts: Vec::new(),
        }
    }

    /// 🔒 Wrap it for sharing across workers.
    pub(crate) fn shared(self) -> SharedBuffer {
        Arc::new(Mutex::new(self))
    }

    /// 🗝️ `<destination-prefix>aggregated_NNN.gz`
    pub(crate) fn bundle_key(&self, counter: u32) -> String {
        format!("{}aggregated_{:03}.gz", self.destination_prefix, counter)
    }

    /// 📥 Add one object's decoded content.
    ///
    /// If the content would push the buffer past the threshold, the current buffer is
    /// flushed first. The content then goes in whole: an object is never split across
    /// two bundles.
    pub(crate) async fn append(&mut self, content: Vec<u8>) -> Result<()> {
        if content.is_empty() {
            return Ok(());
        }
        let incoming = content.len() as u64;
        if self
            .threshold_rule
            .crosses(self.current_size, incoming, self.max_bundle_size_bytes)
        {
            trace!(
                "🧺 {} + {} bytes crosses {}, flushing before append",
                self.current_size, incoming, self.max_bundle_size_bytes
            );
            self.flush().await?;
        }

        if self.accumulator.is_empty() {
            // -- 📏 first object after a flush: take ownership instead of copying
            self.accumulator = content;
        } else {
            self.accumulator.extend_from_slice(&content);
        }
        self.current_size += incoming;
        debug_assert_eq!(self.current_size, self.accumulator.len() as u64);
        Ok(())
    }

    /// 🚽 Compress and upload whatever is buffered. No-op when empty.
    ///
    /// The accumulator is taken out *before* compression starts, so the bundle is frozen
    /// and the buffer is already empty whatever happens next.
    pub(crate) async fn flush(&mut self) -> Result<Option<BundleReceipt>> {
        if self.accumulator.is_empty() {
            return Ok(None);
        }

        let frozen = std::mem::take(&mut self.accumulator);
        self.current_size = 0;
        self.bundle_counter += 1;
        let key = self.bundle_key(self.bundle_counter);
        debug!("🚽 flushing {} decoded bytes into {}", frozen.len(), key);

        let payload = codec::encode(&frozen).with_context(|| CompactError::Upload { key: key.clone() })?;
        let receipt = self
            .uploader
            .upload(&key, payload, frozen.len() as u64)
            .await?;
        self.receipts.push(receipt.clone());
        Ok(Some(receipt))
    }

    pub(crate) fn current_size(&self) -> u64 {
        self.current_size
    }

    pub(crate) fn bundle_counter(&self) -> u32 {
        self.bundle_counter
    }

    /// 🧾 Every bundle flushed so far, in counter order.
    pub(crate) fn take_receipts(&mut self) -> Vec<BundleReceipt> {
        std::mem::take(&mut self.receipts)
    }
}
