//! 📜 The KeyEnumerator — S3 listings, one page at a time, never all at once.
//!
//! 🧠 Knowledge graph:
//! - Two flavours from one struct: `keys()` lists every object under a prefix, `partitions()`
//!   lists the common prefixes one level down (delimiter `/`)
//! - Lazy: each `next_page()` is one `list_page` call. Nothing is buffered past the page.
//! - Finite and non-restartable: once exhausted or failed, it yields `None` forever
//! - Directory markers (`foo/`) are skipped. They are zero bytes of nothing.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::trace;

use crate::backends::{ListRequest, ObjectStore, StoreBackend};
use crate::errors::CompactError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listing {
    Keys,
    Partitions,
}

#[derive(Debug)]
pub(crate) struct KeyEnumerator {
    store: Arc<StoreBackend>,
    request: ListRequest,
    listing: Listing,
    continuation: Option<String>,
    exhausted: bool,
}

impl KeyEnumerator {
    /// 📥 Every object key under `prefix`.
    pub(crate) fn keys(store: Arc<StoreBackend>, bucket: &str, prefix: &str) -> Self {
        Self::with_listing(store, bucket, prefix, None, Listing::Keys)
    }

    /// 🗂️ Every common prefix one `/` below `prefix`.
    pub(crate) fn partitions(store: Arc<StoreBackend>, bucket: &str, prefix: &str) -> Self {
        Self::with_listing(store, bucket, prefix, Some("/"), Listing::Partitions)
    }

    fn with_listing(
        store: Arc<StoreBackend>,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        listing: Listing,
    ) -> Self {
        Self {
            store,
            request: ListRequest {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                delimiter: delimiter.map(str::to_string),
            },
            listing,
            continuation: None,
            exhausted: false,
        }
    }

    /// 📄 The next non-empty page, or `None` once the listing is done.
    ///
    /// Pages that come back empty but still carry a continuation token are skipped over.
    /// 💀 A failed page marks the enumerator exhausted and comes back as
    /// `CompactError::Listing`. Keys already handed out stay handed out.
    pub(crate) async fn next_page(&mut self) -> Result<Option<Vec<String>>> {
        while !self.exhausted {
            let page = match self
                .store
                .list_page(&self.request, self.continuation.take())
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    self.exhausted = true;
                    return Err(err).with_context(|| CompactError::Listing {
                        bucket: self.request.bucket.clone(),
                        prefix: self.request.prefix.clone(),
                    });
                }
            };

            match page.next_continuation {
                Some(token) => self.continuation = Some(token),
                None => self.exhausted = true,
            }

            let entries: Vec<String> = match self.listing {
                Listing::Keys => page.keys.into_iter().filter(|k| !k.ends_with('/')).collect(),
                Listing::Partitions => page.common_prefixes,
            };
            trace!(
                "📜 {} entries under s3://{}/{} (more: {})",
                entries.len(),
                self.request.bucket,
                self.request.prefix,
                !self.exhausted
            );
            if !entries.is_empty() {
                return Ok(Some(entries));
            }
        }
        Ok(None)
    }

    /// 📚 Drain every page into one Vec. Only for partition discovery, where the whole
    /// set is a handful of application names.
    pub(crate) async fn collect_all(mut self) -> Result<Vec<String>> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }
}
