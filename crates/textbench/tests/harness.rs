//! End-to-end harness runs over every backend.

use textbench::{
    generate_corpus, read_report, write_report, EvaluationConfig, Harness, SampleSizes,
};
use textbench_adapters::ConnectionConfig;
use textbench_core::{BackendKind, Outcome};

fn small_samples() -> SampleSizes {
    SampleSizes {
        documents: 3,
        lemmata: 4,
        large_lemmata: 8,
    }
}

fn config() -> EvaluationConfig {
    EvaluationConfig::new()
        .with_synthetic(6)
        .with_seed(11)
        .with_samples(small_samples())
        .with_clear_batch_size(16)
}

#[test]
fn test_every_backend_produces_a_report() {
    let config = config();
    let documents = config.source.load(config.seed).unwrap();
    let harness = Harness::new(config);

    let reports = harness.run(&documents);
    assert_eq!(reports.len(), BackendKind::ALL.len());

    for report in &reports {
        assert_eq!(report.corpus_size, 6, "{}", report.backend);
        let ingest = report.record("store_annotated_document").unwrap();
        assert_eq!(ingest.call_count, 6);
        assert_eq!(ingest.outcome, Outcome::Ok);

        let exists = report.record("document_exists").unwrap();
        assert_eq!(exists.call_count, 3);
        assert!(exists.min_time <= exists.max_time);

        // value-based counts only for types that carry a value
        let by_value = report
            .records
            .iter()
            .filter(|r| r.method == "count_of_type_with_value")
            .count();
        assert_eq!(by_value, 3, "{}", report.backend);
    }
}

#[test]
fn test_structured_backends_complete_the_battery() {
    let config = config().with_backends([
        ConnectionConfig::new(BackendKind::Graph),
        ConnectionConfig::new(BackendKind::Relational),
        ConnectionConfig::new(BackendKind::WideColumn),
        ConnectionConfig::new(BackendKind::Xml),
    ]);
    let documents = config.source.load(config.seed).unwrap();
    let reports = Harness::new(config).run(&documents);

    for report in &reports {
        let failed: Vec<_> = report
            .failures()
            .map(|r| (r.method.as_str(), r.more.comment.as_str()))
            .collect();
        // the only failures are Document counted inside a document
        assert_eq!(
            failed,
            vec![("count_of_type_in_document", "Document per sampled document")],
            "{}",
            report.backend
        );
        assert_eq!(report.record("ttr_for_all").unwrap().outcome, Outcome::Ok);
        assert_eq!(report.record("tri_grams_for_all").unwrap().outcome, Outcome::Ok);
    }
}

#[test]
fn test_full_text_records_unsupported() {
    let config = config().with_backends([ConnectionConfig::new(BackendKind::FullText)]);
    let documents = config.source.load(config.seed).unwrap();
    let reports = Harness::new(config).run(&documents);
    let report = &reports[0];

    for method in ["ttr", "ttr_for_all", "bi_grams", "tri_grams_for_collection"] {
        assert!(
            matches!(
                report.record(method).unwrap().outcome,
                Outcome::Unsupported { .. }
            ),
            "{method}"
        );
    }
    assert_eq!(report.record("idf").unwrap().outcome, Outcome::Ok);
    assert_eq!(report.record("tfidf_for_all_documents").unwrap().outcome, Outcome::Ok);
}

#[test]
fn test_same_seed_samples_same_documents() {
    let documents = generate_corpus(10, 60, 3);
    let run = || {
        let config = config().with_backends([ConnectionConfig::new(BackendKind::Relational)]);
        let reports = Harness::new(config).run(&documents);
        reports[0]
            .record("document_exists")
            .unwrap()
            .more
            .searched_documents
            .clone()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_persistent_backend_without_ingest() {
    let dir = tempfile::tempdir().unwrap();
    let backend =
        ConnectionConfig::new(BackendKind::Relational).with_path(dir.path().join("corpus.sqlite"));
    let documents = generate_corpus(4, 40, 5);

    let first = Harness::new(config().with_backends([backend.clone()])).run(&documents);
    assert_eq!(first[0].corpus_size, 4);

    let second = Harness::new(config().with_backends([backend]).without_ingest()).run(&[]);
    assert_eq!(second[0].corpus_size, 4);
    assert!(second[0].record("store_annotated_document").is_none());
}

#[test]
fn test_reports_written_per_backend() {
    let out = tempfile::tempdir().unwrap();
    let config = config()
        .with_backends([ConnectionConfig::new(BackendKind::Graph)])
        .with_output_dir(out.path());
    let documents = config.source.load(config.seed).unwrap();
    let harness = Harness::new(config);

    let reports = harness.run(&documents);
    let path = write_report(&harness.config().output_dir, &reports[0]).unwrap();
    assert_eq!(path, out.path().join("graph_6.json"));
    assert_eq!(read_report(&path).unwrap().records, reports[0].records);
}
