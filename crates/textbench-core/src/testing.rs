//! In-memory backend used by unit tests of the shared base.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use crate::backend::CorpusBackend;
use crate::error::{CorpusError, Result};
use crate::model::{
    AnnotatedDocument, BackendKind, Document, ElementType, EntityId, Paragraph, Sentence, Token,
};
use crate::stats;

/// Keeps whole annotated documents in a map and answers by scanning.
#[derive(Default)]
pub struct MemoryBackend {
    documents: RefCell<BTreeMap<String, AnnotatedDocument>>,
}

impl MemoryBackend {
    pub fn with_documents(documents: impl IntoIterator<Item = AnnotatedDocument>) -> Self {
        let backend = Self::default();
        for document in documents {
            backend.store_annotated_document(&document).unwrap();
        }
        backend
    }

    fn with_document<T>(&self, id: &str, f: impl FnOnce(&AnnotatedDocument) -> T) -> Result<T> {
        let documents = self.documents.borrow();
        let document = documents
            .get(id)
            .ok_or_else(|| CorpusError::DocumentNotFound(id.to_string()))?;
        Ok(f(document))
    }
}

fn count_in(document: &AnnotatedDocument, element: ElementType) -> u64 {
    match element {
        ElementType::Document => 1,
        ElementType::Paragraph => document.paragraphs.len() as u64,
        ElementType::Sentence => document
            .paragraphs
            .iter()
            .map(|p| p.sentences.len() as u64)
            .sum(),
        ElementType::Token => document.token_count() as u64,
        ElementType::Lemma => document
            .tokens()
            .map(|t| t.lemma.as_str())
            .collect::<BTreeSet<_>>()
            .len() as u64,
        ElementType::Pos => document
            .tokens()
            .map(|t| t.pos.as_str())
            .collect::<BTreeSet<_>>()
            .len() as u64,
    }
}

fn count_value_in(document: &AnnotatedDocument, element: ElementType, value: &str) -> u64 {
    document
        .tokens()
        .filter(|t| match element {
            ElementType::Token => t.value == value,
            ElementType::Lemma => t.lemma == value,
            ElementType::Pos => t.pos == value,
            _ => false,
        })
        .count() as u64
}

impl CorpusBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Graph
    }

    fn store_document(&self, _document: &Document) -> Result<EntityId> {
        Err(CorpusError::unsupported(self.kind(), "store_document"))
    }

    fn store_paragraph(&self, _: &Paragraph, _: Option<&EntityId>) -> Result<EntityId> {
        Err(CorpusError::unsupported(self.kind(), "store_paragraph"))
    }

    fn store_sentence(&self, _: &Sentence, _: Option<&EntityId>) -> Result<EntityId> {
        Err(CorpusError::unsupported(self.kind(), "store_sentence"))
    }

    fn store_token(&self, _: &Token, _: Option<&EntityId>) -> Result<EntityId> {
        Err(CorpusError::unsupported(self.kind(), "store_token"))
    }

    fn store_annotated_document(&self, document: &AnnotatedDocument) -> Result<EntityId> {
        self.documents
            .borrow_mut()
            .insert(document.id.clone(), document.clone());
        Ok(EntityId::new(&document.id))
    }

    fn document_exists(&self, id: &str) -> Result<bool> {
        Ok(self.documents.borrow().contains_key(id))
    }

    fn document_ids(&self) -> Result<Vec<String>> {
        Ok(self.documents.borrow().keys().cloned().collect())
    }

    fn lemmata_for_document(&self, id: &str) -> Result<Vec<String>> {
        self.with_document(id, |d| {
            d.tokens()
                .map(|t| t.lemma.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
    }

    fn count_of_type(&self, element: ElementType) -> Result<u64> {
        let documents = self.documents.borrow();
        Ok(match element {
            ElementType::Lemma | ElementType::Pos => documents
                .values()
                .flat_map(|d| d.tokens())
                .map(|t| {
                    if element == ElementType::Lemma {
                        t.lemma.as_str()
                    } else {
                        t.pos.as_str()
                    }
                })
                .collect::<BTreeSet<_>>()
                .len() as u64,
            _ => documents.values().map(|d| count_in(d, element)).sum(),
        })
    }

    fn count_of_type_in_document(&self, document: &str, element: ElementType) -> Result<u64> {
        self.with_document(document, |d| count_in(d, element))
    }

    fn count_of_type_with_value(&self, element: ElementType, value: &str) -> Result<u64> {
        Ok(self
            .documents
            .borrow()
            .values()
            .map(|d| count_value_in(d, element, value))
            .sum())
    }

    fn count_of_type_with_value_in_document(
        &self,
        document: &str,
        element: ElementType,
        value: &str,
    ) -> Result<u64> {
        self.with_document(document, |d| count_value_in(d, element, value))
    }

    fn count_documents_containing_lemma(&self, lemma: &str) -> Result<u64> {
        Ok(self
            .documents
            .borrow()
            .values()
            .filter(|d| d.tokens().any(|t| t.lemma == lemma))
            .count() as u64)
    }

    fn occurrence_count_per_lemma(&self) -> Result<BTreeMap<String, u64>> {
        let mut counts = BTreeMap::new();
        for document in self.documents.borrow().values() {
            for token in document.tokens() {
                *counts.entry(token.lemma.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    fn raw_term_frequencies(&self, document: &str) -> Result<BTreeMap<String, u64>> {
        self.with_document(document, |d| {
            let mut counts = BTreeMap::new();
            for token in d.tokens() {
                *counts.entry(token.lemma.clone()).or_insert(0) += 1;
            }
            counts
        })
    }

    fn ngrams(&self, document: &str, n: usize) -> Result<Vec<Vec<String>>> {
        self.with_document(document, |d| {
            d.paragraphs
                .iter()
                .flat_map(|p| p.sentences.iter())
                .flat_map(|s| {
                    let values: Vec<String> = s.tokens.iter().map(|t| t.value.clone()).collect();
                    stats::windows_of(&values, n).collect::<Vec<_>>()
                })
                .collect()
        })
    }

    fn clear(&self) -> Result<()> {
        self.documents.borrow_mut().clear();
        Ok(())
    }
}
