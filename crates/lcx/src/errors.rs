//! 💀 errors.rs — the five ways a compaction run can go sideways.
//!
//! 🧠 Knowledge graph:
//! - Everything still travels as `anyhow::Error`; this enum rides along as *context*,
//!   attached with `.with_context(|| CompactError::Fetch { .. })` at the seam where it happened.
//! - Callers (and tests) recover the category with `err.downcast_ref::<CompactError>()`.
//!   anyhow walks the context chain for us. No manual unwrapping of onions required. 🧅
//! - There is no retry variant. There is no retry. Every one of these ends the job.

use thiserror::Error;

/// 🏷️ The error taxonomy for a compaction job.
///
/// Every variant is terminal. The job stops, the first error wins, the operator reads the
/// chain. Nothing here is retried by us. A re-run is the retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompactError {
    /// 🔧 A required parameter is missing or nonsense. Raised before any I/O happens.
    #[error("configuration error: {0}")]
    Config(String),

    /// 📜 A listing page (partition discovery or key enumeration) could not be fetched.
    #[error("failed to list s3://{bucket}/{prefix}")]
    Listing { bucket: String, prefix: String },

    /// 📥 GetObject failed for one source object.
    #[error("failed to fetch object '{key}'")]
    Fetch { key: String },

    /// 🫁 The object arrived but its gzip stream is garbage.
    #[error("failed to decode object '{key}'")]
    Decode { key: String },

    /// 📤 A bundle could not be compressed or written. The counter has already moved on.
    #[error("failed to upload bundle '{key}'")]
    Upload { key: String },
}

impl CompactError {
    /// 🔧 Shorthand for the most common flavour of disappointment.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// 🗝️ The object or bundle key this error is about, if it is about one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Fetch { key } | Self::Decode { key } | Self::Upload { key } => Some(key),
            Self::Config(_) | Self::Listing { .. } => None,
        }
    }
}
