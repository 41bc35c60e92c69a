//! # Worker Thread Helpers
//!
//! Thread-count clamping, the named rayon pool one export runs on, and the
//! first-error latch shared by the workers of a block.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use crate::error::{ExportError, Result};

/// Upper bound on export worker threads
pub const MAX_EXPORT_THREADS: usize = 32;

/// Threads actually used: `requested` clamped to `1..=MAX_EXPORT_THREADS`
/// and never more than there are variants to share out
pub fn effective_thread_count(requested: usize, variant_ct: usize) -> usize {
    requested.clamp(1, MAX_EXPORT_THREADS).min(variant_ct.max(1))
}

/// Threads to use when the caller did not say
pub fn default_thread_count() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Pool of `n_threads` named export workers, built once per run
pub fn build_thread_pool(n_threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads.max(1))
        .thread_name(|t| format!("export-worker-{t}"))
        .build()
        .map_err(|e| ExportError::ThreadCreateFailed(std::io::Error::other(e)))
}

/// Records the first error raised by any thread; later ones are dropped
#[derive(Debug, Default)]
pub struct ErrorLatch {
    first: OnceLock<ExportError>,
    tripped: AtomicBool,
}

impl ErrorLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `err` if nothing was recorded yet
    pub fn record(&self, err: ExportError) {
        if self.first.set(err).is_ok() {
            self.tripped.store(true, Ordering::Release);
        }
    }

    /// Cheap check for workers between variants
    #[inline]
    pub fn is_set(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// The first recorded error, if any
    pub fn into_error(self) -> Option<ExportError> {
        self.first.into_inner()
    }
}
