//! textbench core - corpus document model, query contract and timing.
//!
//! This crate defines what every storage backend must answer and how the
//! answers are composed into corpus statistics:
//!
//! - [`model`]: documents, paragraphs, sentences, tokens, lemmata, POS values
//! - [`CorpusBackend`]: primitives implemented by each adapter
//! - [`CorpusQuery`]: the full contract, implemented by [`Corpus`]
//! - [`metrics::Benchmarked`]: a timing decorator over any contract implementation

pub mod backend;
pub mod contract;
pub mod corpus;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod stats;

#[cfg(test)]
mod testing;

pub use backend::{CorpusBackend, TtrCounts};
pub use contract::{CorpusQuery, LemmaScores, TermFrequency};
pub use corpus::Corpus;
pub use error::{CorpusError, Result};
pub use metrics::{BenchmarkRecord, Benchmarked, Outcome, RecordDetails, TimingSummary};
pub use model::{
    AnnotatedDocument, AnnotatedParagraph, AnnotatedSentence, BackendKind, Document,
    DocumentBuilder, ElementType, EntityId, Paragraph, Sentence, Token, TokenAnnotation,
};
