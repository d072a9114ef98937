//! The uniform storage and query contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    AnnotatedDocument, BackendKind, Document, ElementType, EntityId, Paragraph, Sentence, Token,
};

/// Raw and normalized frequencies of one lemma in one document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermFrequency {
    pub raw: u64,
    pub double_norm: f64,
    pub log_norm: f64,
}

/// Per-document lemma scores, keyed by lemma.
pub type LemmaScores = BTreeMap<String, f64>;

/// Storage, counting and statistics operations shared by every backend.
///
/// Implemented by [`crate::Corpus`] for any adapter and by
/// [`crate::Benchmarked`] for any implementation of this trait.
pub trait CorpusQuery {
    /// Storage category answering the queries.
    fn backend_kind(&self) -> BackendKind;

    // Storage

    fn store_document(&self, document: &Document) -> Result<EntityId>;

    fn store_paragraph(&self, paragraph: &Paragraph, previous: Option<&EntityId>)
        -> Result<EntityId>;

    fn store_sentence(&self, sentence: &Sentence, previous: Option<&EntityId>) -> Result<EntityId>;

    fn store_token(&self, token: &Token, previous: Option<&EntityId>) -> Result<EntityId>;

    fn store_annotated_document(&self, document: &AnnotatedDocument) -> Result<EntityId>;

    /// Delete the whole corpus.
    fn clear_corpus(&self) -> Result<()>;

    // Lookup

    /// Succeeds when the document is stored, otherwise `DocumentNotFound`.
    fn document_exists(&self, id: &str) -> Result<()>;

    fn document_ids(&self) -> Result<Vec<String>>;

    fn lemmata_for_document(&self, id: &str) -> Result<Vec<String>>;

    // Counting

    fn count_of_type(&self, element: ElementType) -> Result<u64>;

    fn count_of_type_in_document(&self, document: &str, element: ElementType) -> Result<u64>;

    fn count_of_type_with_value(&self, element: ElementType, value: &str) -> Result<u64>;

    fn count_of_type_with_value_in_document(
        &self,
        document: &str,
        element: ElementType,
        value: &str,
    ) -> Result<u64>;

    fn count_documents_containing_lemma(&self, lemma: &str) -> Result<u64>;

    fn occurrence_count_per_lemma(&self) -> Result<BTreeMap<String, u64>>;

    // Statistics

    fn ttr(&self, document: &str) -> Result<f64>;

    fn ttr_for_all(&self) -> Result<BTreeMap<String, f64>>;

    fn ttr_for_collection(&self, documents: &[String]) -> Result<BTreeMap<String, f64>>;

    fn raw_term_frequencies(&self, document: &str) -> Result<BTreeMap<String, u64>>;

    fn raw_term_frequency(&self, lemma: &str, document: &str) -> Result<u64>;

    fn term_frequency_double_norm(&self, lemma: &str, document: &str) -> Result<f64>;

    fn term_frequency_log_norm(&self, lemma: &str, document: &str) -> Result<f64>;

    fn term_frequencies_for_document(
        &self,
        document: &str,
    ) -> Result<BTreeMap<String, TermFrequency>>;

    fn idf(&self, lemma: &str) -> Result<f64>;

    fn idf_for_lemmata_in_document(&self, document: &str) -> Result<LemmaScores>;

    fn tfidf(&self, lemma: &str, document: &str) -> Result<f64>;

    fn tfidf_for_document(&self, document: &str) -> Result<LemmaScores>;

    fn tfidf_for_all_documents(&self) -> Result<BTreeMap<String, LemmaScores>>;

    // N-grams

    fn bi_grams(&self, document: &str) -> Result<Vec<String>>;

    fn bi_grams_for_all(&self) -> Result<Vec<String>>;

    fn bi_grams_for_collection(&self, documents: &[String]) -> Result<Vec<String>>;

    fn tri_grams(&self, document: &str) -> Result<Vec<String>>;

    fn tri_grams_for_all(&self) -> Result<Vec<String>>;

    fn tri_grams_for_collection(&self, documents: &[String]) -> Result<Vec<String>>;
}
