//! 🧵 Workers: the ones who actually do the work while the Orchestrator takes all the
//! credit in the run summary.
//!
//! There is exactly one kind right now, the `FetchWorker`. It pulls keys, downloads,
//! decompresses and drops the result in the shared buffer. The trait stays because the
//! orchestrator should not care what kind of minion it is spawning.

use anyhow::Result;
use tokio::task::JoinHandle;

mod fetch_worker;
pub(crate) use fetch_worker::FetchWorker;

/// 🏗️ A background worker, that does work. duh.
pub(crate) trait Worker {
    /// 🚀 Spawn it. The handle resolves when the worker has stopped for any reason.
    fn start(self) -> JoinHandle<Result<()>>;
}
