// ai
//! 🪣🚀🌐 S3 Backend — the real bucket, with real bills.
//!
//! INT. AWS CONSOLE — NIGHT. A log bucket sits in us-east-1, bloated with tiny gzip
//! fragments. Forty thousand per app per day. Every LIST costs money. Every GET costs
//! money. Somebody did the math once and then scheduled this job.
//!
//! 🧠 Knowledge graph:
//! - Config co-located: `S3StoreConfig` lives in `s3_store.rs`
//! - Trait impl: `impl ObjectStore for S3Store`
//! - Enum variant: `StoreBackend::S3(S3Store)`
//! - Transport: `ListObjectsV2` (continuation tokens), `GetObject` → `collect()`, `PutObject`
//!
//! 🦆 The duck has no IAM role. It watches from the edge of the VPC.

mod s3_store;

pub use s3_store::{S3Store, S3StoreConfig};
