use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backends::{ListPage, ListRequest, ObjectStore};

// -- 📄 S3's own default page size. we pretend harder than most fakes.
const DEFAULT_PAGE_SIZE: usize = 1000;

/// 🧪 A bucket that lives in RAM and fails on command.
///
/// Clone-able because tests hand one copy to the pipeline and keep another to peek inside
/// afterwards. The `Arc` means both copies share the same objects, the same put log and the
/// same booby traps.
///
/// 🧠 Knowledge graph:
/// - Objects: `BTreeMap<(bucket, key), bytes>` so listings come back sorted, like S3
/// - Pagination: continuation token = last entry returned; next page starts strictly after it
/// - Delimiter listings fold keys into common prefixes before paging, like S3
/// - `puts`: every successful put, in order: the "did dry-run touch anything" ledger
/// - Failure injection: per-key GET failures, per-prefix LIST failures, and a put budget
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<InMemoryState>>,
    page_size: Option<usize>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    objects: BTreeMap<(String, String), Vec<u8>>,
    puts: Vec<(String, String)>,
    list_calls: usize,
    failing_gets: HashSet<String>,
    failing_list_prefixes: HashSet<String>,
    // -- 💣 None = unlimited. Some(n) = the (n+1)th put blows up.
    put_budget: Option<usize>,
}

impl InMemoryStore {
    /// 🚀 An empty bucket universe.
    pub fn new() -> Self {
        Self::default()
    }

    /// 📄 Shrink listing pages so pagination actually gets exercised.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// 📥 Drop an object into the bucket, no questions asked and no put recorded.
    pub async fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .await
            .objects
            .insert((bucket.to_string(), key.to_string()), body.into());
    }

    /// 💣 Make every GET of `key` fail.
    pub async fn fail_get(&self, key: &str) {
        self.state.lock().await.failing_gets.insert(key.to_string());
    }

    /// 💣 Make every LIST of exactly `prefix` fail.
    pub async fn fail_list(&self, prefix: &str) {
        self.state
            .lock()
            .await
            .failing_list_prefixes
            .insert(prefix.to_string());
    }

    /// 💣 Allow `allowed` successful puts, then fail every one after.
    pub async fn fail_puts_after(&self, allowed: usize) {
        self.state.lock().await.put_budget = Some(allowed);
    }

    /// 📦 Read an object back, if it exists.
    pub async fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .await
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// 🗝️ Every key in `bucket` that starts with `prefix`, sorted.
    pub async fn keys(&self, bucket: &str, prefix: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// 📤 Every successful put as `(bucket, key)`, in the order it happened.
    pub async fn puts(&self) -> Vec<(String, String)> {
        self.state.lock().await.puts.clone()
    }

    /// 📜 How many listing pages were served.
    pub async fn list_calls(&self) -> usize {
        self.state.lock().await.list_calls
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn list_page(&self, request: &ListRequest, continuation: Option<String>) -> Result<ListPage> {
        let mut state = self.state.lock().await;
        state.list_calls += 1;
        if state.failing_list_prefixes.contains(&request.prefix) {
            bail!(
                "💀 injected LIST failure for s3://{}/{}",
                request.bucket,
                request.prefix
            );
        }

        // -- 🗂️ true = common prefix, false = plain key. BTreeSet keeps S3's lexical order and dedupes folds.
        let mut entries: BTreeSet<(String, bool)> = BTreeSet::new();
        for (bucket, key) in state.objects.keys() {
            if bucket != &request.bucket || !key.starts_with(&request.prefix) {
                continue;
            }
            let remainder = &key[request.prefix.len()..];
            match request.delimiter.as_deref().and_then(|d| remainder.find(d).map(|at| (d, at))) {
                Some((delimiter, at)) => {
                    let folded = format!("{}{}{}", request.prefix, &remainder[..at], delimiter);
                    entries.insert((folded, true));
                }
                None => {
                    entries.insert((key.clone(), false));
                }
            }
        }

        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let the_page: Vec<(String, bool)> = entries
            .into_iter()
            .filter(|(entry, _)| continuation.as_ref().is_none_or(|after| entry > after))
            .take(page_size + 1)
            .collect();

        let has_more = the_page.len() > page_size;
        let the_page = &the_page[..the_page.len().min(page_size)];
        let next_continuation = if has_more {
            the_page.last().map(|(entry, _)| entry.clone())
        } else {
            None
        };

        let mut page = ListPage {
            next_continuation,
            ..ListPage::default()
        };
        for (entry, is_prefix) in the_page {
            if *is_prefix {
                page.common_prefixes.push(entry.clone());
            } else {
                page.keys.push(entry.clone());
            }
        }
        Ok(page)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let state = self.state.lock().await;
        if state.failing_gets.contains(key) {
            bail!("💀 injected GET failure for s3://{bucket}/{key}");
        }
        match state.objects.get(&(bucket.to_string(), key.to_string())) {
            Some(body) => Ok(body.clone()),
            None => bail!("💀 NoSuchKey: s3://{bucket}/{key}"),
        }
    }

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(budget) = state.put_budget {
            if state.puts.len() >= budget {
                bail!("💀 injected PUT failure for s3://{bucket}/{key}");
            }
        }
        state
            .objects
            .insert((bucket.to_string(), key.to_string()), body);
        state.puts.push((bucket.to_string(), key.to_string()));
        Ok(())
    }
}
