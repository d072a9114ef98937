//! Primitive operations every storage adapter implements.
//!
//! Adapters only answer structural questions (counts, frequencies, token
//! windows). Ratios and normalizations are composed once in
//! [`crate::corpus::Corpus`], so identical primitive answers give
//! identical statistics on every backend.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::ingest;
use crate::model::{
    AnnotatedDocument, BackendKind, Document, ElementType, EntityId, Paragraph, Sentence, Token,
};

/// Lemma and token counts of one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TtrCounts {
    /// Distinct lemmata referenced by the document's tokens.
    pub lemmata: u64,
    /// Tokens in the document.
    pub tokens: u64,
}

/// Storage primitives implemented by each backend adapter.
///
/// Every document-scoped method must fail with
/// [`crate::CorpusError::DocumentNotFound`] for an unknown id.
pub trait CorpusBackend {
    /// The storage category of this adapter.
    fn kind(&self) -> BackendKind;

    /// Element types this adapter can count.
    fn countable_types(&self) -> &'static [ElementType] {
        &ElementType::ALL
    }

    /// Store a document header. Returns the document's id.
    fn store_document(&self, document: &Document) -> Result<EntityId>;

    /// Store a paragraph linked to its predecessor.
    fn store_paragraph(&self, paragraph: &Paragraph, previous: Option<&EntityId>)
        -> Result<EntityId>;

    /// Store a sentence linked to its predecessor.
    fn store_sentence(&self, sentence: &Sentence, previous: Option<&EntityId>) -> Result<EntityId>;

    /// Store a token linked to its predecessor, merging its lemma and POS.
    fn store_token(&self, token: &Token, previous: Option<&EntityId>) -> Result<EntityId>;

    /// Store a whole annotated document.
    ///
    /// The default walks the tree top-down through the per-entity stores.
    fn store_annotated_document(&self, document: &AnnotatedDocument) -> Result<EntityId> {
        ingest::store_top_down(self, document)
    }

    fn document_exists(&self, id: &str) -> Result<bool>;

    /// External ids of all stored documents, sorted.
    fn document_ids(&self) -> Result<Vec<String>>;

    /// Distinct lemmata used in a document, sorted.
    fn lemmata_for_document(&self, id: &str) -> Result<Vec<String>>;

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

    /// Token occurrences per lemma across the whole corpus.
    fn occurrence_count_per_lemma(&self) -> Result<BTreeMap<String, u64>>;

    /// Token occurrences per lemma within one document.
    fn raw_term_frequencies(&self, document: &str) -> Result<BTreeMap<String, u64>>;

    fn raw_term_frequency(&self, lemma: &str, document: &str) -> Result<u64> {
        Ok(self
            .raw_term_frequencies(document)?
            .get(lemma)
            .copied()
            .unwrap_or(0))
    }

    fn ttr_counts(&self, document: &str) -> Result<TtrCounts> {
        Ok(TtrCounts {
            lemmata: self.count_of_type_in_document(document, ElementType::Lemma)?,
            tokens: self.count_of_type_in_document(document, ElementType::Token)?,
        })
    }

    /// TTR counts for every document. Backends able to aggregate in one
    /// pass override this.
    fn ttr_counts_for_all(&self) -> Result<BTreeMap<String, TtrCounts>> {
        self.document_ids()?
            .into_iter()
            .map(|id| {
                let counts = self.ttr_counts(&id)?;
                Ok((id, counts))
            })
            .collect()
    }

    /// Surface values of every `n` consecutive linked tokens in a document,
    /// in document order.
    fn ngrams(&self, document: &str, n: usize) -> Result<Vec<Vec<String>>>;

    /// [`CorpusBackend::ngrams`] over every document, documents ordered by id.
    fn ngrams_for_all(&self, n: usize) -> Result<Vec<Vec<String>>> {
        let mut out = Vec::new();
        for id in self.document_ids()? {
            out.extend(self.ngrams(&id, n)?);
        }
        Ok(out)
    }

    /// Delete every stored entity.
    fn clear(&self) -> Result<()>;
}
