//! Full-text backend.
//!
//! Documents are flattened into one indexed record each, and a postings
//! index maps every lemma to the documents containing it with the term
//! frequency per document. Only document-level questions can be answered:
//! there are no paragraph, sentence or token entities to count or walk.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sled::{Batch, Tree};
use textbench_core::{
    AnnotatedDocument, BackendKind, CorpusBackend, CorpusError, Document, ElementType, EntityId,
    Paragraph, Result, Sentence, Token, TtrCounts,
};

use crate::error::NativeResultExt;
use crate::kv;

const KIND: BackendKind = BackendKind::FullText;

const DOCUMENTS_TREE: &str = "fulltext:documents";
const POSTINGS_TREE: &str = "fulltext:postings";

/// The flat record stored per document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatDocument {
    pub text: String,
    pub language: String,
    /// Number of indexed tokens.
    pub length: u64,
    /// lemma -> term frequency
    pub terms: BTreeMap<String, u64>,
}

impl FlatDocument {
    fn from_annotated(document: &AnnotatedDocument) -> Self {
        let mut terms = BTreeMap::new();
        for token in document.tokens() {
            *terms.entry(token.lemma.clone()).or_insert(0) += 1;
        }
        Self {
            text: document.text.clone(),
            language: document.language.clone(),
            length: document.token_count() as u64,
            terms,
        }
    }
}

/// Full-text adapter.
pub struct FullTextAdapter {
    documents: Tree,
    /// lemma + document -> term frequency
    postings: Tree,
}

fn posting_key(lemma: &str, document: &str) -> Vec<u8> {
    let mut key = kv::partition(lemma.as_bytes());
    key.extend_from_slice(document.as_bytes());
    key
}

impl FullTextAdapter {
    /// Open the index at `path`, or a temporary one.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let db = kv::open_db(path).native(KIND)?;
        let adapter = Self {
            documents: db.open_tree(DOCUMENTS_TREE).native(KIND)?,
            postings: db.open_tree(POSTINGS_TREE).native(KIND)?,
        };
        tracing::debug!(backend = %KIND, path = ?path, "opened full-text index");
        Ok(adapter)
    }

    /// Stored record of one document.
    pub fn flat_document(&self, id: &str) -> Result<FlatDocument> {
        let bytes = self
            .documents
            .get(id)
            .native(KIND)?
            .ok_or_else(|| CorpusError::DocumentNotFound(id.to_string()))?;
        serde_json::from_slice(&bytes).native(KIND)
    }

    fn index(&self, id: &str, record: &FlatDocument) -> Result<EntityId> {
        let bytes = serde_json::to_vec(record).native(KIND)?;
        let swapped = self
            .documents
            .compare_and_swap(id, None as Option<&[u8]>, Some(bytes))
            .native(KIND)?;
        if swapped.is_err() {
            return Err(CorpusError::DuplicateDocument(id.to_string()));
        }

        let mut batch = Batch::default();
        for (lemma, frequency) in &record.terms {
            batch.insert(posting_key(lemma, id), &frequency.to_be_bytes()[..]);
        }
        self.postings.apply_batch(batch).native(KIND)?;
        tracing::debug!(
            backend = %KIND,
            document = id,
            terms = record.terms.len(),
            "indexed document"
        );
        Ok(EntityId::new(id))
    }
}

impl CorpusBackend for FullTextAdapter {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn countable_types(&self) -> &'static [ElementType] {
        &[ElementType::Document]
    }

    /// Index a document without tokens.
    fn store_document(&self, document: &Document) -> Result<EntityId> {
        let record = FlatDocument {
            text: document.text.clone(),
            language: document.language.clone(),
            ..FlatDocument::default()
        };
        self.index(&document.id, &record)
    }

    fn store_paragraph(&self, _: &Paragraph, _: Option<&EntityId>) -> Result<EntityId> {
        Err(CorpusError::unsupported(KIND, "store_paragraph"))
    }

    fn store_sentence(&self, _: &Sentence, _: Option<&EntityId>) -> Result<EntityId> {
        Err(CorpusError::unsupported(KIND, "store_sentence"))
    }

    fn store_token(&self, _: &Token, _: Option<&EntityId>) -> Result<EntityId> {
        Err(CorpusError::unsupported(KIND, "store_token"))
    }

    fn store_annotated_document(&self, document: &AnnotatedDocument) -> Result<EntityId> {
        document.validate()?;
        self.index(&document.id, &FlatDocument::from_annotated(document))
    }

    fn document_exists(&self, id: &str) -> Result<bool> {
        self.documents.contains_key(id).native(KIND)
    }

    fn document_ids(&self) -> Result<Vec<String>> {
        self.documents
            .iter()
            .keys()
            .map(|key| Ok(String::from_utf8_lossy(&key.native(KIND)?).into_owned()))
            .collect()
    }

    fn lemmata_for_document(&self, id: &str) -> Result<Vec<String>> {
        Ok(self.flat_document(id)?.terms.into_keys().collect())
    }

    fn count_of_type(&self, element: ElementType) -> Result<u64> {
        match element {
            ElementType::Document => Ok(self.documents.len() as u64),
            _ => Err(CorpusError::TypeNotCountable {
                element,
                backend: KIND,
            }),
        }
    }

    fn count_of_type_in_document(&self, _: &str, element: ElementType) -> Result<u64> {
        Err(CorpusError::TypeNotCountable {
            element,
            backend: KIND,
        })
    }

    fn count_of_type_with_value(&self, _: ElementType, _: &str) -> Result<u64> {
        Err(CorpusError::unsupported(KIND, "count_of_type_with_value"))
    }

    fn count_of_type_with_value_in_document(&self, _: &str, _: ElementType, _: &str) -> Result<u64> {
        Err(CorpusError::unsupported(
            KIND,
            "count_of_type_with_value_in_document",
        ))
    }

    fn count_documents_containing_lemma(&self, lemma: &str) -> Result<u64> {
        let mut count = 0;
        for key in self.postings.scan_prefix(kv::partition(lemma.as_bytes())).keys() {
            key.native(KIND)?;
            count += 1;
        }
        Ok(count)
    }

    fn occurrence_count_per_lemma(&self) -> Result<BTreeMap<String, u64>> {
        let mut counts = BTreeMap::new();
        for entry in self.postings.iter() {
            let (key, value) = entry.native(KIND)?;
            let (lemma, _) = kv::split_partition(&key)
                .ok_or_else(|| CorpusError::native(KIND, "malformed posting key"))?;
            *counts
                .entry(String::from_utf8_lossy(lemma).into_owned())
                .or_insert(0) += kv::decode_u64(&value);
        }
        Ok(counts)
    }

    fn raw_term_frequencies(&self, document: &str) -> Result<BTreeMap<String, u64>> {
        Ok(self.flat_document(document)?.terms)
    }

    fn raw_term_frequency(&self, lemma: &str, document: &str) -> Result<u64> {
        if !self.document_exists(document)? {
            return Err(CorpusError::DocumentNotFound(document.to_string()));
        }
        kv::counter(&self.postings, posting_key(lemma, document)).native(KIND)
    }

    fn ttr_counts(&self, _: &str) -> Result<TtrCounts> {
        Err(CorpusError::unsupported(KIND, "ttr"))
    }

    fn ttr_counts_for_all(&self) -> Result<BTreeMap<String, TtrCounts>> {
        Err(CorpusError::unsupported(KIND, "ttr"))
    }

    fn ngrams(&self, _: &str, _: usize) -> Result<Vec<Vec<String>>> {
        Err(CorpusError::unsupported(KIND, "ngrams"))
    }

    fn ngrams_for_all(&self, _: usize) -> Result<Vec<Vec<String>>> {
        Err(CorpusError::unsupported(KIND, "ngrams"))
    }

    fn clear(&self) -> Result<()> {
        kv::clear_trees(&[&self.documents, &self.postings]).native(KIND)?;
        tracing::info!(backend = %KIND, "cleared full-text index");
        Ok(())
    }
}
