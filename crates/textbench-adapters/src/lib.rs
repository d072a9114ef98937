//! Storage adapters for textbench.
//!
//! One adapter per storage category, each on an embedded engine:
//!
//! - [`graph::GraphAdapter`]: property graph in sled, Cypher-shaped patterns
//! - [`relational::RelationalAdapter`]: SQLite tables with join tables
//! - [`wide_column::WideColumnAdapter`]: sled column families with mapping tables
//! - [`xml::XmlAdapter`]: one XML unit per document, XPath-shaped queries
//! - [`full_text::FullTextAdapter`]: flat documents plus a postings index
//!
//! [`open_adapter`] builds the right one from a [`ConnectionConfig`].

pub mod config;
mod error;
pub mod full_text;
pub mod graph;
mod kv;
pub mod relational;
pub mod wide_column;
pub mod xml;

use std::collections::BTreeMap;

use textbench_core::{
    AnnotatedDocument, BackendKind, CorpusBackend, Document, ElementType, EntityId, Paragraph,
    Result, Sentence, Token, TtrCounts,
};

pub use config::{AdapterOptions, ConnectionConfig, ConnectionTarget, DEFAULT_CLEAR_BATCH_SIZE};
pub use full_text::FullTextAdapter;
pub use graph::GraphAdapter;
pub use relational::RelationalAdapter;
pub use wide_column::WideColumnAdapter;
pub use xml::XmlAdapter;

/// Any adapter, selected at runtime.
pub enum Adapter {
    Graph(GraphAdapter),
    Relational(RelationalAdapter),
    WideColumn(WideColumnAdapter),
    Xml(XmlAdapter),
    FullText(FullTextAdapter),
}

macro_rules! dispatch {
    ($self:expr, $adapter:ident => $body:expr) => {
        match $self {
            Adapter::Graph($adapter) => $body,
            Adapter::Relational($adapter) => $body,
            Adapter::WideColumn($adapter) => $body,
            Adapter::Xml($adapter) => $body,
            Adapter::FullText($adapter) => $body,
        }
    };
}

/// Open the adapter described by `config`.
pub fn open_adapter(config: &ConnectionConfig) -> Result<Adapter> {
    if config.target.has_remote_fields() {
        tracing::warn!(
            backend = %config.kind,
            target = ?config.target,
            "embedded engine ignores host, credentials and database"
        );
    }
    let path = config.target.path.as_deref();
    let adapter = match config.kind {
        BackendKind::Graph => Adapter::Graph(GraphAdapter::open(path, &config.options)?),
        BackendKind::Relational => Adapter::Relational(RelationalAdapter::open(path)?),
        BackendKind::WideColumn => Adapter::WideColumn(WideColumnAdapter::open(path)?),
        BackendKind::Xml => Adapter::Xml(XmlAdapter::open(path)?),
        BackendKind::FullText => Adapter::FullText(FullTextAdapter::open(path)?),
    };
    tracing::info!(backend = %config.kind, persistent = path.is_some(), "opened adapter");
    Ok(adapter)
}

impl CorpusBackend for Adapter {
    fn kind(&self) -> BackendKind {
        dispatch!(self, a => a.kind())
    }

    fn countable_types(&self) -> &'static [ElementType] {
        dispatch!(self, a => a.countable_types())
    }

    fn store_document(&self, document: &Document) -> Result<EntityId> {
        dispatch!(self, a => a.store_document(document))
    }

    fn store_paragraph(&self, paragraph: &Paragraph, previous: Option<&EntityId>) -> Result<EntityId> {
        dispatch!(self, a => a.store_paragraph(paragraph, previous))
    }

    fn store_sentence(&self, sentence: &Sentence, previous: Option<&EntityId>) -> Result<EntityId> {
        dispatch!(self, a => a.store_sentence(sentence, previous))
    }

    fn store_token(&self, token: &Token, previous: Option<&EntityId>) -> Result<EntityId> {
        dispatch!(self, a => a.store_token(token, previous))
    }

    fn store_annotated_document(&self, document: &AnnotatedDocument) -> Result<EntityId> {
        dispatch!(self, a => a.store_annotated_document(document))
    }

    fn document_exists(&self, id: &str) -> Result<bool> {
        dispatch!(self, a => a.document_exists(id))
    }

    fn document_ids(&self) -> Result<Vec<String>> {
        dispatch!(self, a => a.document_ids())
    }

    fn lemmata_for_document(&self, id: &str) -> Result<Vec<String>> {
        dispatch!(self, a => a.lemmata_for_document(id))
    }

    fn count_of_type(&self, element: ElementType) -> Result<u64> {
        dispatch!(self, a => a.count_of_type(element))
    }

    fn count_of_type_in_document(&self, document: &str, element: ElementType) -> Result<u64> {
        dispatch!(self, a => a.count_of_type_in_document(document, element))
    }

    fn count_of_type_with_value(&self, element: ElementType, value: &str) -> Result<u64> {
        dispatch!(self, a => a.count_of_type_with_value(element, value))
    }

    fn count_of_type_with_value_in_document(
        &self,
        document: &str,
        element: ElementType,
        value: &str,
    ) -> Result<u64> {
        dispatch!(self, a => a.count_of_type_with_value_in_document(document, element, value))
    }

    fn count_documents_containing_lemma(&self, lemma: &str) -> Result<u64> {
        dispatch!(self, a => a.count_documents_containing_lemma(lemma))
    }

    fn occurrence_count_per_lemma(&self) -> Result<BTreeMap<String, u64>> {
        dispatch!(self, a => a.occurrence_count_per_lemma())
    }

    fn raw_term_frequencies(&self, document: &str) -> Result<BTreeMap<String, u64>> {
        dispatch!(self, a => a.raw_term_frequencies(document))
    }

    fn raw_term_frequency(&self, lemma: &str, document: &str) -> Result<u64> {
        dispatch!(self, a => a.raw_term_frequency(lemma, document))
    }

    fn ttr_counts(&self, document: &str) -> Result<TtrCounts> {
        dispatch!(self, a => a.ttr_counts(document))
    }

    fn ttr_counts_for_all(&self) -> Result<BTreeMap<String, TtrCounts>> {
        dispatch!(self, a => a.ttr_counts_for_all())
    }

    fn ngrams(&self, document: &str, n: usize) -> Result<Vec<Vec<String>>> {
        dispatch!(self, a => a.ngrams(document, n))
    }

    fn ngrams_for_all(&self, n: usize) -> Result<Vec<Vec<String>>> {
        dispatch!(self, a => a.ngrams_for_all(n))
    }

    fn clear(&self) -> Result<()> {
        dispatch!(self, a => a.clear())
    }
}
