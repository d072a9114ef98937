//! Shared base implementation of the query contract.
//!
//! [`Corpus`] wraps any [`CorpusBackend`]. It performs the element-type
//! pre-checks and composes the statistics formulas from the backend's
//! primitive counts.

use std::collections::{BTreeMap, HashMap};

use crate::backend::CorpusBackend;
use crate::contract::{CorpusQuery, LemmaScores, TermFrequency};
use crate::error::{CorpusError, Result};
use crate::model::{
    AnnotatedDocument, BackendKind, Document, ElementType, EntityId, Paragraph, Sentence, Token,
};
use crate::stats;

/// Contract implementation over a backend adapter.
pub struct Corpus<B> {
    backend: B,
}

impl<B: CorpusBackend> Corpus<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Borrow the wrapped adapter.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_inner(self) -> B {
        self.backend
    }

    fn check_countable(&self, element: ElementType) -> Result<()> {
        if self.backend.countable_types().contains(&element) {
            Ok(())
        } else {
            Err(CorpusError::TypeNotCountable {
                element,
                backend: self.backend.kind(),
            })
        }
    }

    fn check_countable_in_document(&self, element: ElementType) -> Result<()> {
        if element == ElementType::Document {
            return Err(CorpusError::TypeNotCountable {
                element,
                backend: self.backend.kind(),
            });
        }
        self.check_countable(element)
    }

    fn check_has_value(element: ElementType) -> Result<()> {
        if element.has_value() {
            Ok(())
        } else {
            Err(CorpusError::TypeHasNoValue(element))
        }
    }

    fn total_documents(&self) -> Result<u64> {
        self.backend.count_of_type(ElementType::Document)
    }

    fn scores_for_document(
        &self,
        document: &str,
        total: u64,
        document_frequency: &mut HashMap<String, u64>,
    ) -> Result<LemmaScores> {
        let raw = self.backend.raw_term_frequencies(document)?;
        let mut scores = LemmaScores::new();
        for (lemma, count) in raw {
            let df = match document_frequency.get(&lemma) {
                Some(df) => *df,
                None => {
                    let df = self.backend.count_documents_containing_lemma(&lemma)?;
                    document_frequency.insert(lemma.clone(), df);
                    df
                }
            };
            let idf = stats::inverse_document_frequency(total, df);
            scores.insert(lemma, stats::tfidf(stats::log_norm_tf(count), idf));
        }
        Ok(scores)
    }

    fn ngrams_for(&self, documents: &[String], n: usize) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for id in documents {
            out.extend(stats::join_ngrams(self.backend.ngrams(id, n)?));
        }
        Ok(out)
    }
}

impl<B: CorpusBackend> CorpusQuery for Corpus<B> {
    fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    fn store_document(&self, document: &Document) -> Result<EntityId> {
        self.backend.store_document(document)
    }

    fn store_paragraph(
        &self,
        paragraph: &Paragraph,
        previous: Option<&EntityId>,
    ) -> Result<EntityId> {
        self.backend.store_paragraph(paragraph, previous)
    }

    fn store_sentence(&self, sentence: &Sentence, previous: Option<&EntityId>) -> Result<EntityId> {
        self.backend.store_sentence(sentence, previous)
    }

    fn store_token(&self, token: &Token, previous: Option<&EntityId>) -> Result<EntityId> {
        self.backend.store_token(token, previous)
    }

    fn store_annotated_document(&self, document: &AnnotatedDocument) -> Result<EntityId> {
        self.backend.store_annotated_document(document)
    }

    fn clear_corpus(&self) -> Result<()> {
        self.backend.clear()
    }

    fn document_exists(&self, id: &str) -> Result<()> {
        if self.backend.document_exists(id)? {
            Ok(())
        } else {
            Err(CorpusError::DocumentNotFound(id.to_string()))
        }
    }

    fn document_ids(&self) -> Result<Vec<String>> {
        self.backend.document_ids()
    }

    fn lemmata_for_document(&self, id: &str) -> Result<Vec<String>> {
        self.backend.lemmata_for_document(id)
    }

    fn count_of_type(&self, element: ElementType) -> Result<u64> {
        self.check_countable(element)?;
        self.backend.count_of_type(element)
    }

    fn count_of_type_in_document(&self, document: &str, element: ElementType) -> Result<u64> {
        self.check_countable_in_document(element)?;
        self.backend.count_of_type_in_document(document, element)
    }

    fn count_of_type_with_value(&self, element: ElementType, value: &str) -> Result<u64> {
        Self::check_has_value(element)?;
        self.check_countable(element)?;
        self.backend.count_of_type_with_value(element, value)
    }

    fn count_of_type_with_value_in_document(
        &self,
        document: &str,
        element: ElementType,
        value: &str,
    ) -> Result<u64> {
        Self::check_has_value(element)?;
        self.check_countable_in_document(element)?;
        self.backend
            .count_of_type_with_value_in_document(document, element, value)
    }

    fn count_documents_containing_lemma(&self, lemma: &str) -> Result<u64> {
        self.backend.count_documents_containing_lemma(lemma)
    }

    fn occurrence_count_per_lemma(&self) -> Result<BTreeMap<String, u64>> {
        self.backend.occurrence_count_per_lemma()
    }

    fn ttr(&self, document: &str) -> Result<f64> {
        Ok(stats::type_token_ratio(self.backend.ttr_counts(document)?))
    }

    fn ttr_for_all(&self) -> Result<BTreeMap<String, f64>> {
        Ok(self
            .backend
            .ttr_counts_for_all()?
            .into_iter()
            .map(|(id, counts)| (id, stats::type_token_ratio(counts)))
            .collect())
    }

    fn ttr_for_collection(&self, documents: &[String]) -> Result<BTreeMap<String, f64>> {
        documents
            .iter()
            .map(|id| Ok((id.clone(), self.ttr(id)?)))
            .collect()
    }

    fn raw_term_frequencies(&self, document: &str) -> Result<BTreeMap<String, u64>> {
        self.backend.raw_term_frequencies(document)
    }

    fn raw_term_frequency(&self, lemma: &str, document: &str) -> Result<u64> {
        self.backend.raw_term_frequency(lemma, document)
    }

    fn term_frequency_double_norm(&self, lemma: &str, document: &str) -> Result<f64> {
        let raw = self.backend.raw_term_frequencies(document)?;
        let max = raw.values().copied().max().unwrap_or(0);
        let count = raw.get(lemma).copied().unwrap_or(0);
        Ok(stats::double_norm_tf(count, max))
    }

    fn term_frequency_log_norm(&self, lemma: &str, document: &str) -> Result<f64> {
        let raw = self.backend.raw_term_frequency(lemma, document)?;
        Ok(stats::log_norm_tf(raw))
    }

    fn term_frequencies_for_document(
        &self,
        document: &str,
    ) -> Result<BTreeMap<String, TermFrequency>> {
        let raw = self.backend.raw_term_frequencies(document)?;
        let max = raw.values().copied().max().unwrap_or(0);
        Ok(raw
            .into_iter()
            .map(|(lemma, count)| {
                let tf = TermFrequency {
                    raw: count,
                    double_norm: stats::double_norm_tf(count, max),
                    log_norm: stats::log_norm_tf(count),
                };
                (lemma, tf)
            })
            .collect())
    }

    fn idf(&self, lemma: &str) -> Result<f64> {
        let total = self.total_documents()?;
        let containing = self.backend.count_documents_containing_lemma(lemma)?;
        Ok(stats::inverse_document_frequency(total, containing))
    }

    fn idf_for_lemmata_in_document(&self, document: &str) -> Result<LemmaScores> {
        let total = self.total_documents()?;
        self.backend
            .lemmata_for_document(document)?
            .into_iter()
            .map(|lemma| {
                let containing = self.backend.count_documents_containing_lemma(&lemma)?;
                Ok((lemma, stats::inverse_document_frequency(total, containing)))
            })
            .collect()
    }

    fn tfidf(&self, lemma: &str, document: &str) -> Result<f64> {
        let tf = self.term_frequency_log_norm(lemma, document)?;
        let idf = self.idf(lemma)?;
        Ok(stats::tfidf(tf, idf))
    }

    fn tfidf_for_document(&self, document: &str) -> Result<LemmaScores> {
        let total = self.total_documents()?;
        self.scores_for_document(document, total, &mut HashMap::new())
    }

    fn tfidf_for_all_documents(&self) -> Result<BTreeMap<String, LemmaScores>> {
        let total = self.total_documents()?;
        let mut document_frequency = HashMap::new();
        let mut out = BTreeMap::new();
        for id in self.backend.document_ids()? {
            let scores = self.scores_for_document(&id, total, &mut document_frequency)?;
            out.insert(id, scores);
        }
        Ok(out)
    }

    fn bi_grams(&self, document: &str) -> Result<Vec<String>> {
        Ok(stats::join_ngrams(self.backend.ngrams(document, 2)?))
    }

    fn bi_grams_for_all(&self) -> Result<Vec<String>> {
        Ok(stats::join_ngrams(self.backend.ngrams_for_all(2)?))
    }

    fn bi_grams_for_collection(&self, documents: &[String]) -> Result<Vec<String>> {
        self.ngrams_for(documents, 2)
    }

    fn tri_grams(&self, document: &str) -> Result<Vec<String>> {
        Ok(stats::join_ngrams(self.backend.ngrams(document, 3)?))
    }

    fn tri_grams_for_all(&self) -> Result<Vec<String>> {
        Ok(stats::join_ngrams(self.backend.ngrams_for_all(3)?))
    }

    fn tri_grams_for_collection(&self, documents: &[String]) -> Result<Vec<String>> {
        self.ngrams_for(documents, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBackend;

    fn corpus() -> Corpus<MemoryBackend> {
        Corpus::new(MemoryBackend::with_documents([
            AnnotatedDocument::builder("d1")
                .words("the cat saw the dog")
                .build(),
            AnnotatedDocument::builder("d2").words("a dog ran").build(),
            AnnotatedDocument::builder("d3").words("A B C").build(),
            AnnotatedDocument::builder("empty").build(),
        ]))
    }

    #[test]
    fn test_document_exists() {
        let corpus = corpus();
        corpus.document_exists("d1").unwrap();
        let err = corpus.document_exists("missing").unwrap_err();
        assert!(matches!(err, CorpusError::DocumentNotFound(id) if id == "missing"));
    }

    #[test]
    fn test_ttr() {
        let corpus = corpus();
        assert!((corpus.ttr("d1").unwrap() - 0.8).abs() < 1e-12);
        assert_eq!(corpus.ttr("empty").unwrap(), 0.0);

        let all = corpus.ttr_for_all().unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.values().all(|ttr| (0.0..=1.0).contains(ttr)));

        let some = corpus
            .ttr_for_collection(&["d2".to_string(), "d3".to_string()])
            .unwrap();
        assert_eq!(some.get("d2"), Some(&1.0));
    }

    #[test]
    fn test_value_precheck() {
        let corpus = corpus();
        for element in [ElementType::Document, ElementType::Paragraph, ElementType::Sentence] {
            let err = corpus.count_of_type_with_value(element, "x").unwrap_err();
            assert!(matches!(err, CorpusError::TypeHasNoValue(e) if e == element));
            let err = corpus
                .count_of_type_with_value_in_document("d1", element, "x")
                .unwrap_err();
            assert!(matches!(err, CorpusError::TypeHasNoValue(_)));
        }
        assert_eq!(
            corpus
                .count_of_type_with_value(ElementType::Lemma, "the")
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_document_not_countable_inside_document() {
        let corpus = corpus();
        let err = corpus
            .count_of_type_in_document("d1", ElementType::Document)
            .unwrap_err();
        assert!(matches!(err, CorpusError::TypeNotCountable { .. }));
    }

    #[test]
    fn test_term_frequencies() {
        let corpus = corpus();
        assert_eq!(corpus.raw_term_frequency("the", "d1").unwrap(), 2);
        assert_eq!(corpus.term_frequency_double_norm("the", "d1").unwrap(), 1.0);
        assert_eq!(corpus.term_frequency_double_norm("cat", "d1").unwrap(), 0.75);
        assert_eq!(corpus.term_frequency_double_norm("zebra", "d1").unwrap(), 0.5);
        assert_eq!(corpus.term_frequency_double_norm("zebra", "empty").unwrap(), 0.0);
        assert_eq!(corpus.term_frequency_log_norm("zebra", "d1").unwrap(), 1.0);

        let tfs = corpus.term_frequencies_for_document("d1").unwrap();
        assert_eq!(tfs["the"].raw, 2);
        assert!(tfs
            .values()
            .all(|tf| (0.5..=1.0).contains(&tf.double_norm)));
    }

    #[test]
    fn test_idf_and_tfidf_compose() {
        let corpus = corpus();
        assert!((corpus.idf("dog").unwrap() - 2f64.ln()).abs() < 1e-12);
        assert_eq!(corpus.idf("zebra").unwrap(), 0.0);

        for lemma in ["the", "dog", "cat", "zebra"] {
            let expected = corpus.term_frequency_log_norm(lemma, "d1").unwrap()
                * corpus.idf(lemma).unwrap();
            assert_eq!(corpus.tfidf(lemma, "d1").unwrap(), expected);
        }

        let scores = corpus.tfidf_for_document("d1").unwrap();
        assert_eq!(scores["the"], corpus.tfidf("the", "d1").unwrap());

        let all = corpus.tfidf_for_all_documents().unwrap();
        assert_eq!(all["d2"], corpus.tfidf_for_document("d2").unwrap());

        let idfs = corpus.idf_for_lemmata_in_document("d2").unwrap();
        assert_eq!(idfs.keys().collect::<Vec<_>>(), vec!["a", "dog", "ran"]);
    }

    #[test]
    fn test_ngrams() {
        let corpus = corpus();
        assert_eq!(corpus.bi_grams("d3").unwrap(), vec!["A-B", "B-C"]);
        assert_eq!(corpus.tri_grams("d3").unwrap(), vec!["A-B-C"]);
        assert!(corpus.tri_grams("empty").unwrap().is_empty());

        let collection = corpus
            .bi_grams_for_collection(&["d3".to_string(), "d2".to_string()])
            .unwrap();
        assert_eq!(collection, vec!["A-B", "B-C", "a-dog", "dog-ran"]);
        assert_eq!(corpus.tri_grams_for_all().unwrap().len(), 3 + 1 + 1);
    }
}
