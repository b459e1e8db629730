// ai
//! 📦 Common data structures — the nouns of lcx.
//!
//! 🎬 COLD OPEN — INT. S3 BUCKET — 00:00:01 UTC
//!
//! Forty thousand log fragments wake up under `app/2024-01-01/`. Each one is a few
//! kilobytes of gzip. Each one costs a GET request. Each one thinks it is special.
//! By sunrise they will be a handful of `aggregated_NNN.gz` bundles, and they will
//! not be asked how they feel about it.
//!
//! 🧠 Knowledge graph:
//! - `ObjectLocation`: bucket + prefix, parsed from `s3://bucket/prefix`
//! - `ObjectKey`: one source object, opaque, unordered
//! - `Partition`: one application's slice of one date, with its own bundle counter
//! - `BundleReceipt`: what a flush produced (or would have produced, in dry-run)
//! - `RunResult` / `JobReport`: what the operator reads at the end
//!
//! 🦆

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::CompactError;

/// 🗝️ An opaque source-object key. Unique within its prefix. Has no opinions about order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(pub String);

impl ObjectKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ObjectKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for ObjectKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// 🪣 A bucket plus a key prefix. Where things live, or where they are going to live.
///
/// Parsed from `s3://bucket/prefix`. The prefix may be empty (bucket root). A non-empty
/// prefix always ends with `/`, so `prefix + name` is a valid child prefix without any
/// slash bookkeeping at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectLocation {
    pub bucket: String,
    pub prefix: String,
}

impl ObjectLocation {
    /// 🚀 Build a location from parts, normalising the prefix.
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: normalize_prefix(&prefix.into()),
        }
    }

    /// 🔍 Parse `s3://bucket[/prefix]`.
    ///
    /// 💀 Anything that doesn't start with `s3://` or has no bucket is a config error.
    pub fn parse(uri: &str) -> Result<Self, CompactError> {
        let Some(rest) = uri.strip_prefix("s3://") else {
            return Err(CompactError::config(format!(
                "invalid S3 URI '{uri}': expected s3://bucket/prefix"
            )));
        };
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(CompactError::config(format!(
                "invalid S3 URI '{uri}': the bucket name is missing"
            )));
        }
        Ok(Self::new(bucket, prefix))
    }
}

// -- 🧹 "logs", "logs/", "/logs//" all mean the same thing to a human. make them mean it to S3 too.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.prefix)
    }
}

impl TryFrom<String> for ObjectLocation {
    type Error = CompactError;

    fn try_from(uri: String) -> Result<Self, Self::Error> {
        Self::parse(&uri)
    }
}

impl From<ObjectLocation> for String {
    fn from(location: ObjectLocation) -> Self {
        location.to_string()
    }
}

/// 🗂️ One application's logs for one date.
///
/// Discovered from a common prefix under the source root. Owns where its fragments are
/// read from and where its bundles are written to. Bundle numbering is per-partition and
/// starts over every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// 🏷️ The application name, e.g. `checkout-api`
    pub name: String,
    /// 📥 `<root-prefix><name>/<date>/`
    pub source_prefix: String,
    /// 📤 `<dest-prefix><name>/<date>/`
    pub destination_prefix: String,
}

impl Partition {
    /// 🔧 Derive a partition from one common prefix returned by a delimiter listing.
    ///
    /// `common_prefix` is the full prefix S3 handed back (`logs/checkout-api/`), so the
    /// name is whatever sits between the source root and the trailing slash.
    pub fn from_common_prefix(
        common_prefix: &str,
        source: &ObjectLocation,
        destination: &ObjectLocation,
        date: &str,
    ) -> Self {
        let name = common_prefix
            .strip_prefix(source.prefix.as_str())
            .unwrap_or(common_prefix)
            .trim_end_matches('/')
            .to_string();
        let source_prefix = format!("{}{}/", normalize_prefix(common_prefix), date);
        let destination_prefix = format!("{}{}/{}/", destination.prefix, name, date);
        Self {
            name,
            source_prefix,
            destination_prefix,
        }
    }

    /// 🔁 Do this partition's bundles and fragments share a prefix, in either direction?
    ///
    /// Only a problem when source and destination are the same bucket: the key listing is
    /// lazy, so bundles written mid-run would show up on a later page as fresh fragments.
    pub fn writes_into_own_source(&self) -> bool {
        self.destination_prefix.starts_with(&self.source_prefix)
            || self.source_prefix.starts_with(&self.destination_prefix)
    }
}

/// 🧾 Proof that a flush happened (or would have, in dry-run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleReceipt {
    /// 🗝️ Destination key, e.g. `app/2024-01-01/aggregated_001.gz`
    pub key: String,
    /// 📏 Decoded bytes that went into the bundle
    pub uncompressed_bytes: u64,
    /// 🫁 Bytes that went (or would have gone) over the wire
    pub compressed_bytes: u64,
    /// 🧪 `true` when nothing was actually written
    pub dry_run: bool,
}

/// 📊 What one partition run amounted to.
///
/// `first_error` is `Some` when the run ended in `Failed`. The orchestrator turns that into
/// a terminal error for the whole job, so a `JobReport` only ever holds clean results.
#[derive(Debug)]
pub struct RunResult {
    pub partition: String,
    pub objects_processed: u64,
    pub bytes_decoded: u64,
    pub bundles: Vec<BundleReceipt>,
    pub elapsed: Duration,
    pub first_error: Option<anyhow::Error>,
}

impl RunResult {
    /// 🫁 Total bytes written (or that would have been written) across all bundles.
    pub fn compressed_bytes(&self) -> u64 {
        self.bundles.iter().map(|b| b.compressed_bytes).sum()
    }
}

/// 📋 The whole job, partition by partition, in the order they ran.
#[derive(Debug, Default)]
pub struct JobReport {
    pub runs: Vec<RunResult>,
    pub dry_run: bool,
}

impl JobReport {
    pub fn objects_processed(&self) -> u64 {
        self.runs.iter().map(|r| r.objects_processed).sum()
    }

    pub fn bundle_count(&self) -> usize {
        self.runs.iter().map(|r| r.bundles.len()).sum()
    }
}
