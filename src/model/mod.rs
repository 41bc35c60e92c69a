//! # Model Module
//!
//! The numeric kernels shared by the encoders and the pipeline.
//!
//! ## Core Algorithms
//! - `decimal`: shortest round-trip printing of fixed-point dosages
//! - `missingness`: per-sample missing-call counters with widening flushes
//! - `transpose`: variant-major to sample-major 2-bit transpose
//! - `bgen_tables`: BGEN probability lookup tables and quantization
//!
//! Everything here is pure or thread-owned: workers build their own
//! accumulators, and lookup tables are built before any worker starts.

pub mod bgen_tables;
pub mod decimal;
pub mod missingness;
pub mod transpose;

pub use bgen_tables::{quantize, BgenTables, BitWriter};
pub use decimal::{format_fixed, parse_fixed, write_fixed, write_requantized_16384};
pub use missingness::{MissingCounts, MissingnessAccumulator};
pub use transpose::transpose_tile;
