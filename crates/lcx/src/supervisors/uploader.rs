//! 📤 The BundleUploader — the last stop before S3.
//!
//! It receives a finished, compressed bundle and a key. In live mode it PUTs. In dry-run
//! mode it writes one log line saying exactly what it *would* have PUT, and how big, and
//! touches nothing. No buffering, no compression, no retry. Pure I/O, like every sink
//! that ever behaved itself.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::backends::{ObjectStore, StoreBackend};
use crate::common::BundleReceipt;
use crate::errors::CompactError;
use crate::progress::humanize_bytes;

/// 📤 Writes bundles to the destination bucket, or pretends to.
///
/// `dry_run` is fixed at construction. There is no global flag to flip halfway through,
/// so two partition runs can never disagree about whether they are live.
#[derive(Debug, Clone)]
pub(crate) struct BundleUploader {
    store: Arc<StoreBackend>,
    bucket: String,
    dry_run: bool,
}

impl BundleUploader {
    pub(crate) fn new(store: Arc<StoreBackend>, bucket: impl Into<String>, dry_run: bool) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            dry_run,
        }
    }

    /// 📡 Ship one bundle.
    ///
    /// The logged size is the compressed payload, i.e. what actually goes over the wire.
    /// 💀 A failed PUT comes back as `CompactError::Upload` for this key. Not retried.
    pub(crate) async fn upload(
        &self,
        key: &str,
        payload: Vec<u8>,
        uncompressed_bytes: u64,
    ) -> Result<BundleReceipt> {
        let compressed_bytes = payload.len() as u64;

        if self.dry_run {
            info!(
                "🧪 Dry run: would upload {} to {}/{} ({} before compression)",
                humanize_bytes(compressed_bytes),
                self.bucket,
                key,
                humanize_bytes(uncompressed_bytes)
            );
        } else {
            self.store
                .put(&self.bucket, key, payload)
                .await
                .with_context(|| CompactError::Upload {
                    key: key.to_string(),
                })?;
            info!(
                "🚀 Uploaded {} to {}/{} ({} before compression)",
                humanize_bytes(compressed_bytes),
                self.bucket,
                key,
                humanize_bytes(uncompressed_bytes)
            );
        }

        Ok(BundleReceipt {
            key: key.to_string(),
            uncompressed_bytes,
            compressed_bytes,
            dry_run: self.dry_run,
        })
    }
}
