//! # Utilities Module
//!
//! Cross-cutting helpers for the export pipeline.
//!
//! ## Sub-modules
//! - `double_buffer`: compute/flush slot pair swapped at block boundaries
//! - `telemetry`: progress blackboard and heartbeat thread
//! - `threading`: thread-count clamping, the worker pool and the first-error latch
//! - `workspace`: per-thread buffers reused across blocks

pub mod double_buffer;
pub mod telemetry;
pub mod threading;
pub mod workspace;

pub use double_buffer::{ComputeSlot, DoubleBuffer, FlushSlot};
pub use threading::{build_thread_pool, effective_thread_count, ErrorLatch, MAX_EXPORT_THREADS};
pub use workspace::ThreadWorkspace;
