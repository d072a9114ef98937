//! Benchmark output records.

use serde::{Deserialize, Serialize};

use super::registry::TimingSummary;

/// How an operation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    /// The backend cannot perform the operation.
    Unsupported { message: String },
    /// The operation failed with a contract error.
    Error { kind: String, message: String },
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Context attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDetails {
    pub comment: String,
    pub searched_values: Vec<String>,
    pub searched_documents: Vec<String>,
    pub results: serde_json::Value,
}

impl RecordDetails {
    pub fn new(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
            ..Self::default()
        }
    }

    pub fn with_values(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.searched_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_documents(mut self, documents: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.searched_documents = documents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_results(mut self, results: serde_json::Value) -> Self {
        self.results = results;
        self
    }
}

/// Timing record of one benchmarked operation.
///
/// Times are microseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkRecord {
    pub method: String,
    pub call_count: u64,
    pub min_time: u64,
    pub avg_time: f64,
    pub max_time: u64,
    pub sum_time: u64,
    pub outcome: Outcome,
    pub more: RecordDetails,
}

impl BenchmarkRecord {
    pub fn new(method: impl Into<String>, summary: TimingSummary, more: RecordDetails) -> Self {
        Self {
            method: method.into(),
            call_count: summary.count,
            min_time: summary.min,
            avg_time: summary.average,
            max_time: summary.max,
            sum_time: summary.sum,
            outcome: Outcome::Ok,
            more,
        }
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_camel_case() {
        let summary = TimingSummary {
            count: 2,
            min: 3,
            max: 5,
            average: 4.0,
            sum: 8,
        };
        let record = BenchmarkRecord::new(
            "ttr",
            summary,
            RecordDetails::new("single document").with_documents(["d1"]),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["callCount"], 2);
        assert_eq!(json["minTime"], 3);
        assert_eq!(json["sumTime"], 8);
        assert_eq!(json["outcome"]["status"], "ok");
        assert_eq!(json["more"]["searchedDocuments"][0], "d1");
    }

    #[test]
    fn test_outcome_tags() {
        let outcome = Outcome::Unsupported {
            message: "nope".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "unsupported");
        assert!(!outcome.is_ok());
    }
}
