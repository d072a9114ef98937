//! Benchmark reports.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use textbench_core::{BackendKind, BenchmarkRecord};
use uuid::Uuid;

use crate::error::Result;

/// All records of one backend run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkReport {
    pub backend: BackendKind,
    /// Documents stored when the battery ran.
    pub corpus_size: u64,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub seed: u64,
    pub records: Vec<BenchmarkRecord>,
}

impl BenchmarkReport {
    pub fn new(backend: BackendKind, corpus_size: u64, seed: u64) -> Self {
        Self {
            backend,
            corpus_size,
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            seed,
            records: Vec::new(),
        }
    }

    /// Find the first record of `method`.
    pub fn record(&self, method: &str) -> Option<&BenchmarkRecord> {
        self.records.iter().find(|r| r.method == method)
    }

    /// Records whose operation did not complete.
    pub fn failures(&self) -> impl Iterator<Item = &BenchmarkRecord> {
        self.records.iter().filter(|r| !r.outcome.is_ok())
    }

    /// File name of this report: `<backend>_<corpus_size>.json`.
    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.backend, self.corpus_size)
    }
}

/// Write `report` as pretty JSON into `dir`, creating it if needed.
pub fn write_report(dir: &Path, report: &BenchmarkReport) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(report.file_name());
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()?;
    tracing::info!(
        backend = %report.backend,
        path = %path.display(),
        records = report.records.len(),
        "wrote report"
    );
    Ok(path)
}

/// Read a report written by [`write_report`].
pub fn read_report(path: &Path) -> Result<BenchmarkReport> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use textbench_core::{Outcome, RecordDetails, TimingSummary};

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = BenchmarkReport::new(BackendKind::WideColumn, 12, 42);
        report.records.push(BenchmarkRecord::new(
            "ttr",
            TimingSummary::default(),
            RecordDetails::new("single document"),
        ));
        report.records.push(
            BenchmarkRecord::new("bi_grams", TimingSummary::default(), RecordDetails::default())
                .with_outcome(Outcome::Unsupported {
                    message: "no".into(),
                }),
        );

        let path = write_report(&dir.path().join("out"), &report).unwrap();
        assert!(path.ends_with("wide-column_12.json"));
        let read = read_report(&path).unwrap();
        assert_eq!(read, report);
        assert_eq!(read.failures().count(), 1);
        assert!(read.record("ttr").is_some());

        let json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["backend"], "wide-column");
        assert_eq!(json["corpusSize"], 12);
    }
}
