//! Evaluation harness.
//!
//! For every configured backend the harness opens the adapter, wraps it in
//! the shared [`Corpus`] base and the [`Benchmarked`] decorator, ingests the
//! corpus and runs a fixed battery of contract operations over seeded
//! random samples. Each operation becomes one [`BenchmarkRecord`].
//!
//! Error policy:
//!
//! - `DocumentNotFound` inside a loop over sampled ids: warn and skip the id
//! - `Unsupported`: record an `unsupported` outcome and continue
//! - other contract errors: record an `error` outcome and continue
//! - `Native`: abort the backend and move on to the next one

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::{json, Value};
use textbench_adapters::{open_adapter, ConnectionConfig};
use textbench_core::{
    AnnotatedDocument, BenchmarkRecord, Benchmarked, Corpus, CorpusError, CorpusQuery,
    ElementType, Outcome, RecordDetails,
};

use crate::config::{EvaluationConfig, SampleSizes};
use crate::error::Result;
use crate::fixtures::POS_TAGS;
use crate::report::BenchmarkReport;

/// Runs the battery against each configured backend.
pub struct Harness {
    config: EvaluationConfig,
}

impl Harness {
    pub fn new(config: EvaluationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Evaluate every backend in turn. A backend that fails natively is
    /// logged and left out of the returned reports.
    pub fn run(&self, documents: &[AnnotatedDocument]) -> Vec<BenchmarkReport> {
        let mut reports = Vec::with_capacity(self.config.backends.len());
        for connection in &self.config.backends {
            match self.run_backend(connection, documents) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(backend = %connection.kind, error = %e, "backend aborted");
                }
            }
        }
        reports
    }

    /// Evaluate one backend.
    pub fn run_backend(
        &self,
        connection: &ConnectionConfig,
        documents: &[AnnotatedDocument],
    ) -> Result<BenchmarkReport> {
        let adapter = open_adapter(connection)?;
        let bench = Benchmarked::new(Corpus::new(adapter));
        let ingest = self.config.ingest.then_some(documents);
        evaluate(&bench, ingest, self.config.seed, self.config.samples)
    }
}

/// Run ingestion (when `documents` is given) and the battery against any
/// contract implementation.
pub fn evaluate<Q: CorpusQuery>(
    bench: &Benchmarked<Q>,
    documents: Option<&[AnnotatedDocument]>,
    seed: u64,
    samples: SampleSizes,
) -> Result<BenchmarkReport> {
    let kind = bench.backend_kind();
    let mut battery = Battery::new(bench);

    if let Some(documents) = documents {
        battery.ingest(documents)?;
    }

    let ids = battery.bench.document_ids()?;
    tracing::info!(backend = %kind, documents = ids.len(), "running battery");

    let mut rng = StdRng::seed_from_u64(seed);
    battery.run(&ids, &mut rng, samples)?;

    let mut report = BenchmarkReport::new(kind, ids.len() as u64, seed);
    report.records = battery.records;
    tracing::info!(
        backend = %kind,
        records = report.records.len(),
        failures = report.failures().count(),
        "battery finished"
    );
    Ok(report)
}

/// Turn a missing document into a skipped iteration.
fn skip_missing<T>(result: textbench_core::Result<T>) -> textbench_core::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(CorpusError::DocumentNotFound(id)) => {
            tracing::warn!(document = %id, "document not found, skipping");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Call `op` for each document id, skipping ids that vanished.
fn each_document<T>(
    documents: &[String],
    mut op: impl FnMut(&str) -> textbench_core::Result<T>,
) -> textbench_core::Result<Vec<T>> {
    let mut out = Vec::with_capacity(documents.len());
    for id in documents {
        if let Some(value) = skip_missing(op(id))? {
            out.push(value);
        }
    }
    Ok(out)
}

fn sample(rng: &mut StdRng, pool: &[String], size: usize) -> Vec<String> {
    pool.choose_multiple(rng, size).cloned().collect()
}

fn sum(values: &[u64]) -> Value {
    json!(values.iter().sum::<u64>())
}

struct Battery<'a, Q> {
    bench: &'a Benchmarked<Q>,
    records: Vec<BenchmarkRecord>,
}

impl<'a, Q: CorpusQuery> Battery<'a, Q> {
    fn new(bench: &'a Benchmarked<Q>) -> Self {
        Self {
            bench,
            records: Vec::new(),
        }
    }

    /// Time one operation and record its outcome.
    fn step(
        &mut self,
        method: &'static str,
        more: RecordDetails,
        op: impl FnOnce(&Benchmarked<Q>) -> textbench_core::Result<Value>,
    ) -> Result<()> {
        self.bench.reset(method);
        let (outcome, more) = match op(self.bench) {
            Ok(results) => (Outcome::Ok, more.with_results(results)),
            Err(e) if e.is_native() => return Err(e.into()),
            Err(e) if e.is_unsupported() => (
                Outcome::Unsupported {
                    message: e.to_string(),
                },
                more,
            ),
            Err(e) => (
                Outcome::Error {
                    kind: e.kind_name().to_string(),
                    message: e.to_string(),
                },
                more,
            ),
        };
        let record = self.bench.record(method, more).with_outcome(outcome);
        tracing::debug!(
            backend = %self.bench.backend_kind(),
            method,
            calls = record.call_count,
            avg_us = record.avg_time,
            outcome = ?record.outcome,
            "step"
        );
        self.records.push(record);
        Ok(())
    }

    /// Drop sampled ids that no longer resolve. Runs outside any timed step
    /// so a collection call sees only stored documents.
    fn existing(&self, ids: Vec<String>) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if skip_missing(self.bench.inner().document_exists(&id))?.is_some() {
                out.push(id);
            }
        }
        Ok(out)
    }

    fn ingest(&mut self, documents: &[AnnotatedDocument]) -> Result<()> {
        self.step("clear_corpus", RecordDetails::new("clear before ingest"), |q| {
            q.clear_corpus().map(|()| Value::Null)
        })?;
        self.step(
            "store_annotated_document",
            RecordDetails::new("ingest corpus"),
            |q| {
                let mut stored = 0u64;
                let mut rejected = 0u64;
                for document in documents {
                    match q.store_annotated_document(document) {
                        Ok(_) => stored += 1,
                        Err(
                            e @ (CorpusError::DuplicateDocument(_)
                            | CorpusError::InvalidDocument { .. }),
                        ) => {
                            tracing::warn!(document = %document.id, error = %e, "document rejected");
                            rejected += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(json!({ "stored": stored, "rejected": rejected }))
            },
        )
    }

    fn run(&mut self, ids: &[String], rng: &mut StdRng, sizes: SampleSizes) -> Result<()> {
        let documents = sample(rng, ids, sizes.documents);

        // lemma pool: union over every document
        let mut pool = BTreeSet::new();
        self.step(
            "lemmata_for_document",
            RecordDetails::new("lemma pool over all documents"),
            |q| {
                let lists = each_document(ids, |id| q.lemmata_for_document(id))?;
                pool.extend(lists.into_iter().flatten());
                Ok(json!(pool.len()))
            },
        )?;
        let pool: Vec<String> = pool.into_iter().collect();
        let lemmata = sample(rng, &pool, sizes.lemmata);
        let large_lemmata = sample(rng, &pool, sizes.large_lemmata);

        self.existence(&documents)?;
        self.counts(&documents, &lemmata)?;
        self.ttr(ids, rng, sizes.documents)?;
        self.term_frequencies(&documents, &lemmata)?;
        self.idf(&documents, &large_lemmata)?;
        self.tfidf(&documents, &lemmata)?;
        self.ngrams(ids, rng, sizes.documents)?;
        Ok(())
    }

    fn existence(&mut self, documents: &[String]) -> Result<()> {
        self.step("document_ids", RecordDetails::new("all document ids"), |q| {
            Ok(json!(q.document_ids()?.len()))
        })?;
        self.step(
            "document_exists",
            RecordDetails::new("sampled documents").with_documents(documents.iter().cloned()),
            |q| Ok(json!(each_document(documents, |id| q.document_exists(id))?.len())),
        )
    }

    fn counts(&mut self, documents: &[String], lemmata: &[String]) -> Result<()> {
        self.step(
            "count_documents_containing_lemma",
            RecordDetails::new("document frequency of sampled lemmata")
                .with_values(lemmata.iter().cloned()),
            |q| {
                let counts = lemmata
                    .iter()
                    .map(|lemma| q.count_documents_containing_lemma(lemma))
                    .collect::<textbench_core::Result<Vec<_>>>()?;
                Ok(sum(&counts))
            },
        )?;
        self.step(
            "occurrence_count_per_lemma",
            RecordDetails::new("corpus lemma occurrences"),
            |q| Ok(json!(q.occurrence_count_per_lemma()?.len())),
        )?;

        for element in ElementType::ALL {
            self.step(
                "count_of_type",
                RecordDetails::new(format!("{element} in corpus")),
                |q| Ok(json!(q.count_of_type(element)?)),
            )?;
            self.step(
                "count_of_type_in_document",
                RecordDetails::new(format!("{element} per sampled document"))
                    .with_documents(documents.iter().cloned()),
                |q| {
                    let counts =
                        each_document(documents, |id| q.count_of_type_in_document(id, element))?;
                    Ok(sum(&counts))
                },
            )?;
        }

        for element in ElementType::WITH_VALUE {
            let values: Vec<String> = match element {
                ElementType::Pos => POS_TAGS.iter().map(|tag| tag.to_string()).collect(),
                _ => lemmata.to_vec(),
            };
            self.step(
                "count_of_type_with_value",
                RecordDetails::new(format!("{element} by value in corpus"))
                    .with_values(values.iter().cloned()),
                |q| {
                    let counts = values
                        .iter()
                        .map(|value| q.count_of_type_with_value(element, value))
                        .collect::<textbench_core::Result<Vec<_>>>()?;
                    Ok(sum(&counts))
                },
            )?;
            self.step(
                "count_of_type_with_value_in_document",
                RecordDetails::new(format!("{element} by value per sampled document"))
                    .with_values(values.iter().cloned())
                    .with_documents(documents.iter().cloned()),
                |q| {
                    let mut total = 0;
                    for value in &values {
                        let counts = each_document(documents, |id| {
                            q.count_of_type_with_value_in_document(id, element, value)
                        })?;
                        total += counts.iter().sum::<u64>();
                    }
                    Ok(json!(total))
                },
            )?;
        }
        Ok(())
    }

    fn ttr(&mut self, ids: &[String], rng: &mut StdRng, size: usize) -> Result<()> {
        let single: Vec<String> = sample(rng, ids, 1);
        self.step(
            "ttr",
            RecordDetails::new("single document").with_documents(single.iter().cloned()),
            |q| Ok(json!(each_document(&single, |id| q.ttr(id))?)),
        )?;

        let collection = self.existing(sample(rng, ids, size))?;
        self.step(
            "ttr_for_collection",
            RecordDetails::new("random collection").with_documents(collection.iter().cloned()),
            |q| Ok(json!(q.ttr_for_collection(&collection)?.len())),
        )?;

        self.step("ttr_for_all", RecordDetails::new("whole corpus"), |q| {
            Ok(json!(q.ttr_for_all()?.len()))
        })
    }

    fn term_frequencies(&mut self, documents: &[String], lemmata: &[String]) -> Result<()> {
        let details = || {
            RecordDetails::new("sampled lemmata in sampled documents")
                .with_values(lemmata.iter().cloned())
                .with_documents(documents.iter().cloned())
        };

        self.step(
            "raw_term_frequencies",
            RecordDetails::new("sampled documents").with_documents(documents.iter().cloned()),
            |q| {
                let maps = each_document(documents, |id| q.raw_term_frequencies(id))?;
                Ok(json!(maps.iter().map(|m| m.len()).sum::<usize>()))
            },
        )?;
        self.step("raw_term_frequency", details(), |q| {
            let mut total = 0;
            for lemma in lemmata {
                total += each_document(documents, |id| q.raw_term_frequency(lemma, id))?
                    .iter()
                    .sum::<u64>();
            }
            Ok(json!(total))
        })?;
        self.step("term_frequency_double_norm", details(), |q| {
            let mut scored = 0;
            for lemma in lemmata {
                scored += each_document(documents, |id| q.term_frequency_double_norm(lemma, id))?
                    .len();
            }
            Ok(json!(scored))
        })?;
        self.step("term_frequency_log_norm", details(), |q| {
            let mut scored = 0;
            for lemma in lemmata {
                scored +=
                    each_document(documents, |id| q.term_frequency_log_norm(lemma, id))?.len();
            }
            Ok(json!(scored))
        })?;
        self.step(
            "term_frequencies_for_document",
            RecordDetails::new("all lemmata of sampled documents")
                .with_documents(documents.iter().cloned()),
            |q| {
                let maps = each_document(documents, |id| q.term_frequencies_for_document(id))?;
                Ok(json!(maps.iter().map(|m| m.len()).sum::<usize>()))
            },
        )
    }

    fn idf(&mut self, documents: &[String], lemmata: &[String]) -> Result<()> {
        self.step(
            "idf",
            RecordDetails::new("large lemma sample").with_values(lemmata.iter().cloned()),
            |q| {
                let scores = lemmata
                    .iter()
                    .map(|lemma| q.idf(lemma))
                    .collect::<textbench_core::Result<Vec<_>>>()?;
                Ok(json!(scores.len()))
            },
        )?;
        self.step(
            "idf_for_lemmata_in_document",
            RecordDetails::new("sampled documents").with_documents(documents.iter().cloned()),
            |q| {
                let maps = each_document(documents, |id| q.idf_for_lemmata_in_document(id))?;
                Ok(json!(maps.iter().map(|m| m.len()).sum::<usize>()))
            },
        )
    }

    fn tfidf(&mut self, documents: &[String], lemmata: &[String]) -> Result<()> {
        self.step(
            "tfidf",
            RecordDetails::new("sampled lemmata in sampled documents")
                .with_values(lemmata.iter().cloned())
                .with_documents(documents.iter().cloned()),
            |q| {
                let mut scored = 0;
                for lemma in lemmata {
                    scored += each_document(documents, |id| q.tfidf(lemma, id))?.len();
                }
                Ok(json!(scored))
            },
        )?;
        self.step(
            "tfidf_for_document",
            RecordDetails::new("sampled documents").with_documents(documents.iter().cloned()),
            |q| {
                let maps = each_document(documents, |id| q.tfidf_for_document(id))?;
                Ok(json!(maps.iter().map(|m| m.len()).sum::<usize>()))
            },
        )?;
        self.step(
            "tfidf_for_all_documents",
            RecordDetails::new("whole corpus"),
            |q| Ok(json!(q.tfidf_for_all_documents()?.len())),
        )
    }

    fn ngrams(&mut self, ids: &[String], rng: &mut StdRng, size: usize) -> Result<()> {
        let single = sample(rng, ids, 1);
        let collection = self.existing(sample(rng, ids, size))?;

        self.step(
            "bi_grams",
            RecordDetails::new("single document").with_documents(single.iter().cloned()),
            |q| {
                let grams = each_document(&single, |id| q.bi_grams(id))?;
                Ok(json!(grams.concat()))
            },
        )?;
        self.step("bi_grams_for_all", RecordDetails::new("whole corpus"), |q| {
            Ok(json!(q.bi_grams_for_all()?.len()))
        })?;
        self.step(
            "bi_grams_for_collection",
            RecordDetails::new("random collection").with_documents(collection.iter().cloned()),
            |q| Ok(json!(q.bi_grams_for_collection(&collection)?.len())),
        )?;

        self.step(
            "tri_grams",
            RecordDetails::new("single document").with_documents(single.iter().cloned()),
            |q| {
                let grams = each_document(&single, |id| q.tri_grams(id))?;
                Ok(json!(grams.concat()))
            },
        )?;
        self.step("tri_grams_for_all", RecordDetails::new("whole corpus"), |q| {
            Ok(json!(q.tri_grams_for_all()?.len()))
        })?;
        self.step(
            "tri_grams_for_collection",
            RecordDetails::new("random collection").with_documents(collection.iter().cloned()),
            |q| Ok(json!(q.tri_grams_for_collection(&collection)?.len())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textbench_adapters::Adapter;
    use textbench_core::BackendKind;

    fn bench(kind: BackendKind) -> Benchmarked<Corpus<Adapter>> {
        let adapter = open_adapter(&ConnectionConfig::new(kind)).unwrap();
        Benchmarked::new(Corpus::new(adapter))
    }

    #[test]
    fn test_skip_missing() {
        let found: textbench_core::Result<u64> = Ok(3);
        assert_eq!(skip_missing(found).unwrap(), Some(3));
        let missing: textbench_core::Result<u64> = Err(CorpusError::DocumentNotFound("x".into()));
        assert_eq!(skip_missing(missing).unwrap(), None);
        let other: textbench_core::Result<u64> = Err(CorpusError::TypeHasNoValue(ElementType::Document));
        assert!(skip_missing(other).is_err());
    }

    #[test]
    fn test_sample_is_seeded() {
        let pool: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        let a = sample(&mut StdRng::seed_from_u64(5), &pool, 10);
        let b = sample(&mut StdRng::seed_from_u64(5), &pool, 10);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
        assert_eq!(sample(&mut StdRng::seed_from_u64(5), &pool, 80).len(), 50);
    }

    #[test]
    fn test_step_records_outcomes() {
        let bench = bench(BackendKind::FullText);
        let mut battery = Battery::new(&bench);
        battery
            .step("ttr", RecordDetails::new("unsupported"), |q| {
                Ok(json!(q.ttr("nope")?))
            })
            .unwrap();
        battery
            .step("count_of_type", RecordDetails::new("not countable"), |q| {
                Ok(json!(q.count_of_type(ElementType::Token)?))
            })
            .unwrap();
        battery
            .step("count_of_type", RecordDetails::new("ok"), |q| {
                Ok(json!(q.count_of_type(ElementType::Document)?))
            })
            .unwrap();

        assert!(matches!(battery.records[0].outcome, Outcome::Unsupported { .. }));
        assert!(matches!(
            &battery.records[1].outcome,
            Outcome::Error { kind, .. } if kind == "type_not_countable"
        ));
        assert_eq!(battery.records[2].outcome, Outcome::Ok);
        assert_eq!(battery.records[2].more.results, json!(0));
        // reset between steps of the same method
        assert_eq!(battery.records[2].call_count, 1);
    }

    #[test]
    fn test_collection_steps_skip_vanished_ids() {
        let bench = bench(BackendKind::Relational);
        let mut battery = Battery::new(&bench);
        let documents = vec![
            AnnotatedDocument::builder("a").words("one two three").build(),
            AnnotatedDocument::builder("b").words("four five").build(),
        ];
        battery.ingest(&documents).unwrap();

        let ids = vec!["a".to_string(), "b".to_string(), "gone".to_string()];
        let mut rng = StdRng::seed_from_u64(1);
        battery.ttr(&ids, &mut rng, ids.len()).unwrap();
        battery.ngrams(&ids, &mut rng, ids.len()).unwrap();

        for method in ["ttr_for_collection", "bi_grams_for_collection", "tri_grams_for_collection"] {
            let record = battery.records.iter().find(|r| r.method == method).unwrap();
            assert_eq!(record.outcome, Outcome::Ok, "{method}");
            assert_eq!(record.more.searched_documents.len(), 2, "{method}");
        }
        let ttr = battery
            .records
            .iter()
            .find(|r| r.method == "ttr_for_collection")
            .unwrap();
        assert_eq!(ttr.more.results, json!(2));
    }

    #[test]
    fn test_ingest_skips_duplicates() {
        let bench = bench(BackendKind::Relational);
        let mut battery = Battery::new(&bench);
        let documents = vec![
            AnnotatedDocument::builder("a").words("one two").build(),
            AnnotatedDocument::builder("a").words("again").build(),
        ];
        battery.ingest(&documents).unwrap();
        let ingest = &battery.records[1];
        assert_eq!(ingest.method, "store_annotated_document");
        assert_eq!(ingest.call_count, 2);
        assert_eq!(ingest.more.results, json!({ "stored": 1, "rejected": 1 }));
    }
}
