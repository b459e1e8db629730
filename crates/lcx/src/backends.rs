//! 🔌 Backends — where the real I/O happens.
//!
//! 🪣 One trait, `ObjectStore`, three verbs: list a page, get an object, put an object.
//! Everything above this line (enumerator, workers, buffer, uploader) only ever talks to
//! the trait. Everything below it talks to AWS, or to a `BTreeMap` pretending to be AWS.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls (`S3Store`, `InMemoryStore`) → `StoreBackend` enum
//! - `StoreBackend` dispatches via match, same trick as every other backend enum we own
//! - Config co-located: `S3StoreConfig` lives in `s3/s3_store.rs`
//! - Shared across workers as `Arc<StoreBackend>`; every method takes `&self`
//!
//! 🦆 The duck has read access only.

use anyhow::Result;
use async_trait::async_trait;

pub mod in_mem;
pub mod s3;

pub use in_mem::InMemoryStore;
pub use s3::{S3Store, S3StoreConfig};

/// 📜 One listing request: which bucket, which prefix, and whether to fold keys into
/// common prefixes at a delimiter.
///
/// - `delimiter: Some("/")` → partition discovery (give me the "directories")
/// - `delimiter: None` → key enumeration (give me everything under here)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub bucket: String,
    pub prefix: String,
    pub delimiter: Option<String>,
}

/// 📄 One page of listing results.
///
/// `next_continuation` is `None` on the last page. Pages may legitimately be empty while
/// still pointing at a next page; callers keep going until the token runs out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub common_prefixes: Vec<String>,
    pub next_continuation: Option<String>,
}

/// 🪣 The object-store seam.
///
/// # Contract 📜
/// - `list_page` returns exactly one page. The caller drives pagination with the token.
/// - `get` returns the object's stored bytes, undecoded. Decompression is the caller's job.
/// - `put` overwrites whatever is at `key`. No existence checks, no conditional writes.
/// - Nothing here retries. A failure is a failure, and it goes straight up the chain.
#[async_trait]
pub trait ObjectStore: std::fmt::Debug + Send + Sync {
    /// 📜 Fetch one listing page, starting after `continuation` (or at the top when `None`).
    async fn list_page(&self, request: &ListRequest, continuation: Option<String>) -> Result<ListPage>;
    /// 📥 Fetch an object's raw bytes.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
    /// 📤 Write an object, clobbering anything already there.
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()>;
}

/// 🎭 The many faces of an object store.
///
/// The live job uses `S3`. Tests and rehearsals use `InMemory`. The orchestrator can't
/// tell the difference, which is the whole point.
#[derive(Debug)]
pub enum StoreBackend {
    S3(S3Store),
    InMemory(InMemoryStore),
}

impl StoreBackend {
    /// 🔧 Build the live S3 backend from config.
    pub async fn from_config(config: &S3StoreConfig) -> Result<Self> {
        Ok(Self::S3(S3Store::new(config).await?))
    }
}

#[async_trait]
impl ObjectStore for StoreBackend {
    async fn list_page(&self, request: &ListRequest, continuation: Option<String>) -> Result<ListPage> {
        match self {
            StoreBackend::S3(store) => store.list_page(request, continuation).await,
            StoreBackend::InMemory(store) => store.list_page(request, continuation).await,
        }
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        match self {
            StoreBackend::S3(store) => store.get(bucket, key).await,
            StoreBackend::InMemory(store) => store.get(bucket, key).await,
        }
    }

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        match self {
            StoreBackend::S3(store) => store.put(bucket, key, body).await,
            StoreBackend::InMemory(store) => store.put(bucket, key, body).await,
        }
    }
}
