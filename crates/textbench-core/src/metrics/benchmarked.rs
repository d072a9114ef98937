//! Timing decorator for the query contract.

use std::collections::BTreeMap;
use std::time::Instant;

use super::record::{BenchmarkRecord, RecordDetails};
use super::registry::{MethodTimings, TimingRegistry, TimingSummary};
use crate::contract::{CorpusQuery, LemmaScores, TermFrequency};
use crate::error::Result;
use crate::model::{
    AnnotatedDocument, BackendKind, Document, ElementType, EntityId, Paragraph, Sentence, Token,
};

/// Wraps any [`CorpusQuery`] and times every contract call.
///
/// Results and errors pass through untouched; each call's wall-clock
/// duration is recorded under the method's name, failed calls included.
pub struct Benchmarked<Q> {
    inner: Q,
    registry: TimingRegistry,
}

impl<Q: CorpusQuery> Benchmarked<Q> {
    /// Names under which contract calls are recorded.
    pub const METHODS: [&'static str; 34] = [
        "store_document",
        "store_paragraph",
        "store_sentence",
        "store_token",
        "store_annotated_document",
        "clear_corpus",
        "document_exists",
        "document_ids",
        "lemmata_for_document",
        "count_of_type",
        "count_of_type_in_document",
        "count_of_type_with_value",
        "count_of_type_with_value_in_document",
        "count_documents_containing_lemma",
        "occurrence_count_per_lemma",
        "ttr",
        "ttr_for_all",
        "ttr_for_collection",
        "raw_term_frequencies",
        "raw_term_frequency",
        "term_frequency_double_norm",
        "term_frequency_log_norm",
        "term_frequencies_for_document",
        "idf",
        "idf_for_lemmata_in_document",
        "tfidf",
        "tfidf_for_document",
        "tfidf_for_all_documents",
        "bi_grams",
        "bi_grams_for_all",
        "bi_grams_for_collection",
        "tri_grams",
        "tri_grams_for_all",
        "tri_grams_for_collection",
    ];

    pub fn new(inner: Q) -> Self {
        Self {
            inner,
            registry: TimingRegistry::new(),
        }
    }

    /// Borrow the wrapped implementation, bypassing timing.
    pub fn inner(&self) -> &Q {
        &self.inner
    }

    pub fn into_inner(self) -> Q {
        self.inner
    }

    pub fn registry(&self) -> &TimingRegistry {
        &self.registry
    }

    /// Zero the registry entry of `method`.
    pub fn reset(&self, method: &str) {
        self.registry.reset(method);
    }

    pub fn reset_all(&self) {
        self.registry.reset_all();
    }

    pub fn summary(&self, method: &str) -> TimingSummary {
        self.registry.summary(method)
    }

    pub fn timings(&self, method: &str) -> MethodTimings {
        self.registry.timings(method)
    }

    /// Build the output record of `method` from its current timings.
    pub fn record(&self, method: &str, more: RecordDetails) -> BenchmarkRecord {
        BenchmarkRecord::new(method, self.registry.summary(method), more)
    }

    fn timed<T>(&self, method: &'static str, call: impl FnOnce(&Q) -> T) -> T {
        let started = Instant::now();
        let result = call(&self.inner);
        self.registry.record(method, started.elapsed());
        result
    }
}

impl<Q: CorpusQuery> CorpusQuery for Benchmarked<Q> {
    fn backend_kind(&self) -> BackendKind {
        self.inner.backend_kind()
    }

    fn store_document(&self, document: &Document) -> Result<EntityId> {
        self.timed("store_document", |q| q.store_document(document))
    }

    fn store_paragraph(
        &self,
        paragraph: &Paragraph,
        previous: Option<&EntityId>,
    ) -> Result<EntityId> {
        self.timed("store_paragraph", |q| q.store_paragraph(paragraph, previous))
    }

    fn store_sentence(&self, sentence: &Sentence, previous: Option<&EntityId>) -> Result<EntityId> {
        self.timed("store_sentence", |q| q.store_sentence(sentence, previous))
    }

    fn store_token(&self, token: &Token, previous: Option<&EntityId>) -> Result<EntityId> {
        self.timed("store_token", |q| q.store_token(token, previous))
    }

    fn store_annotated_document(&self, document: &AnnotatedDocument) -> Result<EntityId> {
        self.timed("store_annotated_document", |q| {
            q.store_annotated_document(document)
        })
    }

    fn clear_corpus(&self) -> Result<()> {
        self.timed("clear_corpus", |q| q.clear_corpus())
    }

    fn document_exists(&self, id: &str) -> Result<()> {
        self.timed("document_exists", |q| q.document_exists(id))
    }

    fn document_ids(&self) -> Result<Vec<String>> {
        self.timed("document_ids", |q| q.document_ids())
    }

    fn lemmata_for_document(&self, id: &str) -> Result<Vec<String>> {
        self.timed("lemmata_for_document", |q| q.lemmata_for_document(id))
    }

    fn count_of_type(&self, element: ElementType) -> Result<u64> {
        self.timed("count_of_type", |q| q.count_of_type(element))
    }

    fn count_of_type_in_document(&self, document: &str, element: ElementType) -> Result<u64> {
        self.timed("count_of_type_in_document", |q| {
            q.count_of_type_in_document(document, element)
        })
    }

    fn count_of_type_with_value(&self, element: ElementType, value: &str) -> Result<u64> {
        self.timed("count_of_type_with_value", |q| {
            q.count_of_type_with_value(element, value)
        })
    }

    fn count_of_type_with_value_in_document(
        &self,
        document: &str,
        element: ElementType,
        value: &str,
    ) -> Result<u64> {
        self.timed("count_of_type_with_value_in_document", |q| {
            q.count_of_type_with_value_in_document(document, element, value)
        })
    }

    fn count_documents_containing_lemma(&self, lemma: &str) -> Result<u64> {
        self.timed("count_documents_containing_lemma", |q| {
            q.count_documents_containing_lemma(lemma)
        })
    }

    fn occurrence_count_per_lemma(&self) -> Result<BTreeMap<String, u64>> {
        self.timed("occurrence_count_per_lemma", |q| {
            q.occurrence_count_per_lemma()
        })
    }

    fn ttr(&self, document: &str) -> Result<f64> {
        self.timed("ttr", |q| q.ttr(document))
    }

    fn ttr_for_all(&self) -> Result<BTreeMap<String, f64>> {
        self.timed("ttr_for_all", |q| q.ttr_for_all())
    }

    fn ttr_for_collection(&self, documents: &[String]) -> Result<BTreeMap<String, f64>> {
        self.timed("ttr_for_collection", |q| q.ttr_for_collection(documents))
    }

    fn raw_term_frequencies(&self, document: &str) -> Result<BTreeMap<String, u64>> {
        self.timed("raw_term_frequencies", |q| q.raw_term_frequencies(document))
    }

    fn raw_term_frequency(&self, lemma: &str, document: &str) -> Result<u64> {
        self.timed("raw_term_frequency", |q| {
            q.raw_term_frequency(lemma, document)
        })
    }

    fn term_frequency_double_norm(&self, lemma: &str, document: &str) -> Result<f64> {
        self.timed("term_frequency_double_norm", |q| {
            q.term_frequency_double_norm(lemma, document)
        })
    }

    fn term_frequency_log_norm(&self, lemma: &str, document: &str) -> Result<f64> {
        self.timed("term_frequency_log_norm", |q| {
            q.term_frequency_log_norm(lemma, document)
        })
    }

    fn term_frequencies_for_document(
        &self,
        document: &str,
    ) -> Result<BTreeMap<String, TermFrequency>> {
        self.timed("term_frequencies_for_document", |q| {
            q.term_frequencies_for_document(document)
        })
    }

    fn idf(&self, lemma: &str) -> Result<f64> {
        self.timed("idf", |q| q.idf(lemma))
    }

    fn idf_for_lemmata_in_document(&self, document: &str) -> Result<LemmaScores> {
        self.timed("idf_for_lemmata_in_document", |q| {
            q.idf_for_lemmata_in_document(document)
        })
    }

    fn tfidf(&self, lemma: &str, document: &str) -> Result<f64> {
        self.timed("tfidf", |q| q.tfidf(lemma, document))
    }

    fn tfidf_for_document(&self, document: &str) -> Result<LemmaScores> {
        self.timed("tfidf_for_document", |q| q.tfidf_for_document(document))
    }

    fn tfidf_for_all_documents(&self) -> Result<BTreeMap<String, LemmaScores>> {
        self.timed("tfidf_for_all_documents", |q| q.tfidf_for_all_documents())
    }

    fn bi_grams(&self, document: &str) -> Result<Vec<String>> {
        self.timed("bi_grams", |q| q.bi_grams(document))
    }

    fn bi_grams_for_all(&self) -> Result<Vec<String>> {
        self.timed("bi_grams_for_all", |q| q.bi_grams_for_all())
    }

    fn bi_grams_for_collection(&self, documents: &[String]) -> Result<Vec<String>> {
        self.timed("bi_grams_for_collection", |q| {
            q.bi_grams_for_collection(documents)
        })
    }

    fn tri_grams(&self, document: &str) -> Result<Vec<String>> {
        self.timed("tri_grams", |q| q.tri_grams(document))
    }

    fn tri_grams_for_all(&self) -> Result<Vec<String>> {
        self.timed("tri_grams_for_all", |q| q.tri_grams_for_all())
    }

    fn tri_grams_for_collection(&self, documents: &[String]) -> Result<Vec<String>> {
        self.timed("tri_grams_for_collection", |q| {
            q.tri_grams_for_collection(documents)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use crate::error::CorpusError;
    use crate::testing::MemoryBackend;

    fn bench() -> Benchmarked<Corpus<MemoryBackend>> {
        Benchmarked::new(Corpus::new(MemoryBackend::with_documents([
            AnnotatedDocument::builder("d1").words("A B C").build(),
        ])))
    }

    #[test]
    fn test_counts_calls() {
        let bench = bench();
        for _ in 0..5 {
            bench.ttr("d1").unwrap();
        }
        let timings = bench.timings("ttr");
        assert_eq!(timings.call_count, 5);
        assert_eq!(timings.durations_us.len(), 5);
        assert_eq!(bench.summary("ttr").count, 5);

        bench.reset("ttr");
        let timings = bench.timings("ttr");
        assert_eq!(timings.call_count, 0);
        assert!(timings.durations_us.is_empty());
    }

    #[test]
    fn test_passes_results_and_errors_through() {
        let bench = bench();
        assert_eq!(bench.bi_grams("d1").unwrap(), vec!["A-B", "B-C"]);

        let err = bench.ttr("missing").unwrap_err();
        assert!(matches!(err, CorpusError::DocumentNotFound(_)));
        assert_eq!(bench.summary("ttr").count, 1);

        let err = bench
            .count_of_type_with_value(ElementType::Document, "x")
            .unwrap_err();
        assert!(matches!(err, CorpusError::TypeHasNoValue(_)));
        assert_eq!(bench.summary("count_of_type_with_value").count, 1);
    }

    #[test]
    fn test_every_operation_is_timed() {
        let bench = bench();
        let docs = vec!["d1".to_string()];
        let doc = AnnotatedDocument::builder("d2").words("x y").build();
        let _ = bench.store_document(&doc.document());
        let _ = bench.store_paragraph(
            &Paragraph {
                document: EntityId::new("d2"),
                begin: 0,
                end: 0,
            },
            None,
        );
        let _ = bench.store_sentence(
            &Sentence {
                document: EntityId::new("d2"),
                paragraph: EntityId::new("p"),
                begin: 0,
                end: 0,
            },
            None,
        );
        let _ = bench.store_token(
            &Token {
                document: EntityId::new("d2"),
                paragraph: EntityId::new("p"),
                sentence: EntityId::new("s"),
                begin: 0,
                end: 1,
                value: "x".into(),
                lemma: "x".into(),
                pos: "X".into(),
            },
            None,
        );
        let _ = bench.store_annotated_document(&doc);
        let _ = bench.document_exists("d1");
        let _ = bench.document_ids();
        let _ = bench.lemmata_for_document("d1");
        let _ = bench.count_of_type(ElementType::Token);
        let _ = bench.count_of_type_in_document("d1", ElementType::Token);
        let _ = bench.count_of_type_with_value(ElementType::Token, "A");
        let _ = bench.count_of_type_with_value_in_document("d1", ElementType::Token, "A");
        let _ = bench.count_documents_containing_lemma("a");
        let _ = bench.occurrence_count_per_lemma();
        let _ = bench.ttr("d1");
        let _ = bench.ttr_for_all();
        let _ = bench.ttr_for_collection(&docs);
        let _ = bench.raw_term_frequencies("d1");
        let _ = bench.raw_term_frequency("a", "d1");
        let _ = bench.term_frequency_double_norm("a", "d1");
        let _ = bench.term_frequency_log_norm("a", "d1");
        let _ = bench.term_frequencies_for_document("d1");
        let _ = bench.idf("a");
        let _ = bench.idf_for_lemmata_in_document("d1");
        let _ = bench.tfidf("a", "d1");
        let _ = bench.tfidf_for_document("d1");
        let _ = bench.tfidf_for_all_documents();
        let _ = bench.bi_grams("d1");
        let _ = bench.bi_grams_for_all();
        let _ = bench.bi_grams_for_collection(&docs);
        let _ = bench.tri_grams("d1");
        let _ = bench.tri_grams_for_all();
        let _ = bench.tri_grams_for_collection(&docs);
        let _ = bench.clear_corpus();

        for method in Benchmarked::<Corpus<MemoryBackend>>::METHODS {
            assert_eq!(bench.summary(method).count, 1, "{method} was not timed");
        }
    }
}
