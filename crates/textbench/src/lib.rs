//! textbench - evaluation harness for corpus storage backends.
//!
//! Runs the same randomized battery of corpus statistics against every
//! configured backend and writes one JSON report per backend.
//!
//! - [`config`]: run configuration and command-line arguments
//! - [`fixtures`]: deterministic synthetic corpora
//! - [`input`]: loading annotated documents from disk
//! - [`harness`]: the battery and its error policy
//! - [`report`]: report records and the JSON writer

pub mod config;
pub mod error;
pub mod fixtures;
pub mod harness;
pub mod input;
pub mod report;

pub use config::{Args, CorpusSource, EvaluationConfig, SampleSizes};
pub use error::{HarnessError, Result};
pub use fixtures::{generate_corpus, generate_scale, Scale};
pub use harness::{evaluate, Harness};
pub use report::{read_report, write_report, BenchmarkReport};
