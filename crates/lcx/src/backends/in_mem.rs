//! # Previously, on lcx...
//!
//! 🎬 The bucket was a lie. A `BTreeMap` in a trench coat, answering LIST, GET and PUT
//! with the confidence of a real object store and none of the latency.
//!
//! `in_mem` provides an in-memory [`ObjectStore`](super::ObjectStore) for tests and local
//! rehearsals. It pages like S3, folds common prefixes like S3, and, unlike S3, can be
//! told to fail on purpose, which is the only way anyone ever tests an error path.
//!
//! ⚠️ This is NOT for production. Nothing survives the process exiting.

mod in_mem_store;

pub use in_mem_store::InMemoryStore;
