//! The shared I/O thread (spec.md §4.13): one OS thread hosting every
//! transport, the directory HTTP client, and timers for the whole process.
//! Account tasks never run here directly; they post work onto it and wait
//! for the result through whatever waiter item fits (a [`Connection`],
//! `steambot-core`'s `ExecuteQueue`, …).
//!
//! Grounded on `crates/network/client/src/runtime.rs` and `crates/network/
//! server/src/runtime.rs`'s `Builder::new_multi_thread().worker_threads(N)`
//! wrapped in a cloneable handle; single-worker here since spec.md §4.13
//! describes one shared event loop, not a pool.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};

#[derive(Debug, Error)]
pub enum IoThreadError {
    #[error("failed to build the shared I/O runtime: {0}")]
    Build(#[source] std::io::Error),
}

/// Shared handle to the process-wide I/O event loop.
#[derive(Clone)]
pub struct IoThread {
    runtime: Arc<Runtime>,
}

impl IoThread {
    /// Builds the single-worker runtime spec.md §4.13 describes as "a
    /// single OS thread".
    pub fn new() -> Result<Self, IoThreadError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("steambot-io")
            .enable_all()
            .build()
            .map_err(IoThreadError::Build)?;
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }

    /// Posts `future` onto the I/O thread (`Asio::post` in spec.md §4.13);
    /// account tasks never block on it directly.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }

    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }
}
