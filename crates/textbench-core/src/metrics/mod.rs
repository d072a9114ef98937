//! Benchmark timing infrastructure.
//!
//! This module provides the per-method timing registry, the decorator
//! that feeds it, and the output records built from it.
//!
//! # Usage
//!
//! ```ignore
//! use textbench_core::metrics::{Benchmarked, RecordDetails};
//!
//! let bench = Benchmarked::new(corpus);
//! bench.ttr("doc-1")?;
//! let summary = bench.summary("ttr");
//! let record = bench.record("ttr", RecordDetails::new("single document"));
//! bench.reset("ttr");
//! ```

mod benchmarked;
mod record;
mod registry;

pub use benchmarked::Benchmarked;
pub use record::{BenchmarkRecord, Outcome, RecordDetails};
pub use registry::{MethodTimings, TimingRegistry, TimingSummary};
