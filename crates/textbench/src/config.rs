//! Evaluation configuration.

use std::collections::HashSet;
use std::path::PathBuf;

use clap::Parser;
use textbench_adapters::{AdapterOptions, ConnectionConfig, DEFAULT_CLEAR_BATCH_SIZE};
use textbench_core::BackendKind;

use crate::error::{HarnessError, Result};

/// Default directory for JSON reports.
pub const DEFAULT_OUTPUT_DIR: &str = "./results";

/// Default seed of the run's random source.
pub const DEFAULT_SEED: u64 = 42;

/// Default number of documents sampled for per-document operations.
pub const DEFAULT_SAMPLE_DOCUMENTS: usize = 20;

/// Default number of lemmata sampled for per-lemma operations.
pub const DEFAULT_SAMPLE_LEMMATA: usize = 20;

/// Default number of lemmata sampled for IDF.
pub const DEFAULT_LARGE_SAMPLE_LEMMATA: usize = 100;

/// Default size of the generated corpus when no input directory is given.
pub const DEFAULT_SYNTHETIC_DOCUMENTS: usize = 100;

/// Where the evaluated corpus comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusSource {
    /// A directory of `*.json` annotated documents.
    Directory(PathBuf),
    /// A generated corpus with this many documents.
    Synthetic(usize),
}

/// Sample sizes of the operation battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSizes {
    pub documents: usize,
    pub lemmata: usize,
    pub large_lemmata: usize,
}

impl Default for SampleSizes {
    fn default() -> Self {
        Self {
            documents: DEFAULT_SAMPLE_DOCUMENTS,
            lemmata: DEFAULT_SAMPLE_LEMMATA,
            large_lemmata: DEFAULT_LARGE_SAMPLE_LEMMATA,
        }
    }
}

/// Evaluation run configuration.
#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    /// Backends to evaluate, in order.
    pub backends: Vec<ConnectionConfig>,

    /// Corpus to ingest.
    pub source: CorpusSource,

    /// Directory receiving one report per backend.
    pub output_dir: PathBuf,

    /// Seed of the single random source used for sampling.
    pub seed: u64,

    /// Battery sample sizes.
    pub samples: SampleSizes,

    /// Clear and ingest the corpus before the battery. Disable to measure a
    /// corpus already persisted at the backends' paths.
    pub ingest: bool,
}

impl EvaluationConfig {
    /// Every backend on temporary storage, with a synthetic corpus.
    pub fn new() -> Self {
        Self {
            backends: BackendKind::ALL
                .into_iter()
                .map(ConnectionConfig::new)
                .collect(),
            source: CorpusSource::Synthetic(DEFAULT_SYNTHETIC_DOCUMENTS),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            seed: DEFAULT_SEED,
            samples: SampleSizes::default(),
            ingest: true,
        }
    }

    /// Replace the evaluated backends.
    pub fn with_backends(mut self, backends: impl IntoIterator<Item = ConnectionConfig>) -> Self {
        self.backends = backends.into_iter().collect();
        self
    }

    /// Read the corpus from a directory of JSON documents.
    pub fn with_input(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source = CorpusSource::Directory(dir.into());
        self
    }

    /// Generate a corpus of `documents` documents.
    pub fn with_synthetic(mut self, documents: usize) -> Self {
        self.source = CorpusSource::Synthetic(documents);
        self
    }

    /// Set the report directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the battery sample sizes.
    pub fn with_samples(mut self, samples: SampleSizes) -> Self {
        self.samples = samples;
        self
    }

    /// Apply the graph clear batch size to every backend.
    pub fn with_clear_batch_size(mut self, size: usize) -> Self {
        for backend in &mut self.backends {
            backend.options = backend.options.with_clear_batch_size(size);
        }
        self
    }

    /// Skip clearing and ingesting.
    pub fn without_ingest(mut self) -> Self {
        self.ingest = false;
        self
    }

    /// Reject combinations that cannot produce a meaningful run.
    ///
    /// Reports are named after the backend kind, so each kind may appear
    /// once. Skipping ingestion requires every backend to point at a
    /// persisted corpus.
    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(HarnessError::Config("no backend configured".into()));
        }
        let mut kinds = HashSet::new();
        for backend in &self.backends {
            if !kinds.insert(backend.kind) {
                return Err(HarnessError::Config(format!(
                    "backend {} configured more than once",
                    backend.kind
                )));
            }
            if !self.ingest && backend.target.path.is_none() {
                return Err(HarnessError::Config(format!(
                    "backend {} has no path, nothing to evaluate without ingestion",
                    backend.kind
                )));
            }
        }
        Ok(())
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Command-line arguments for the evaluation.
#[derive(Parser, Debug)]
#[command(name = "textbench")]
#[command(version, about = "Compare corpus storage backends", long_about = None)]
pub struct Args {
    /// Backend to evaluate as `kind` or `kind=path`. Repeat for several;
    /// defaults to every backend on temporary storage.
    #[arg(short, long = "backend", value_name = "KIND[=PATH]")]
    pub backends: Vec<ConnectionConfig>,

    /// Directory of annotated documents, one JSON file each.
    #[arg(short, long, conflicts_with = "synthetic")]
    pub input: Option<PathBuf>,

    /// Generate a synthetic corpus with this many documents.
    #[arg(long)]
    pub synthetic: Option<usize>,

    /// Directory for JSON reports.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Seed for sampling and corpus generation.
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Documents sampled for per-document operations.
    #[arg(long, default_value_t = DEFAULT_SAMPLE_DOCUMENTS)]
    pub sample_documents: usize,

    /// Lemmata sampled for per-lemma operations.
    #[arg(long, default_value_t = DEFAULT_SAMPLE_LEMMATA)]
    pub sample_lemmata: usize,

    /// Lemmata sampled for IDF.
    #[arg(long, default_value_t = DEFAULT_LARGE_SAMPLE_LEMMATA)]
    pub large_sample_lemmata: usize,

    /// Maximum graph entities deleted per clear batch.
    #[arg(long, default_value_t = DEFAULT_CLEAR_BATCH_SIZE)]
    pub clear_batch_size: usize,

    /// Run against the already stored corpus without clearing or ingesting.
    #[arg(long)]
    pub skip_ingest: bool,
}

impl Args {
    /// Convert command-line arguments to an evaluation configuration.
    pub fn into_config(self) -> EvaluationConfig {
        let backends = if self.backends.is_empty() {
            BackendKind::ALL
                .into_iter()
                .map(ConnectionConfig::new)
                .collect()
        } else {
            self.backends
        };
        let options = AdapterOptions::new().with_clear_batch_size(self.clear_batch_size);

        let config = EvaluationConfig::new()
            .with_backends(
                backends
                    .into_iter()
                    .map(|backend| backend.with_options(options)),
            )
            .with_output_dir(self.output)
            .with_seed(self.seed)
            .with_samples(SampleSizes {
                documents: self.sample_documents,
                lemmata: self.sample_lemmata,
                large_lemmata: self.large_sample_lemmata,
            });

        let config = match self.input {
            Some(dir) => config.with_input(dir),
            None => config.with_synthetic(self.synthetic.unwrap_or(DEFAULT_SYNTHETIC_DOCUMENTS)),
        };

        if self.skip_ingest {
            config.without_ingest()
        } else {
            config
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EvaluationConfig::default();
        assert_eq!(config.backends.len(), BackendKind::ALL.len());
        assert_eq!(config.samples.documents, 20);
        assert_eq!(config.samples.large_lemmata, 100);
        assert!(config.ingest);
        assert_eq!(config.source, CorpusSource::Synthetic(DEFAULT_SYNTHETIC_DOCUMENTS));
    }

    #[test]
    fn test_args_into_config() {
        let args = Args::parse_from([
            "textbench",
            "--backend",
            "graph",
            "-b",
            "relational=/tmp/corpus.sqlite",
            "--input",
            "./corpus",
            "--seed",
            "7",
            "--clear-batch-size",
            "500",
            "--skip-ingest",
        ]);
        let config = args.into_config();
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].kind, BackendKind::Graph);
        assert_eq!(config.backends[0].options.clear_batch_size, 500);
        assert_eq!(
            config.backends[1].target.path,
            Some(PathBuf::from("/tmp/corpus.sqlite"))
        );
        assert_eq!(config.source, CorpusSource::Directory(PathBuf::from("./corpus")));
        assert_eq!(config.seed, 7);
        assert!(!config.ingest);
    }

    #[test]
    fn test_args_defaults_to_all_backends() {
        let config = Args::parse_from(["textbench", "--synthetic", "5"]).into_config();
        assert_eq!(config.backends.len(), 5);
        assert_eq!(config.source, CorpusSource::Synthetic(5));
        assert_eq!(config.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
    }

    #[test]
    fn test_input_conflicts_with_synthetic() {
        let parsed = Args::try_parse_from(["textbench", "--input", "x", "--synthetic", "3"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate() {
        assert!(EvaluationConfig::new().validate().is_ok());

        let empty = EvaluationConfig::new().with_backends(Vec::<ConnectionConfig>::new());
        assert!(matches!(empty.validate(), Err(HarnessError::Config(_))));

        let twice = EvaluationConfig::new().with_backends([
            ConnectionConfig::new(BackendKind::Graph),
            ConnectionConfig::new(BackendKind::Graph).with_path("/tmp/graph"),
        ]);
        let err = twice.validate().unwrap_err();
        assert!(err.to_string().contains("graph configured more than once"));

        let temporary = EvaluationConfig::new().without_ingest();
        assert!(matches!(temporary.validate(), Err(HarnessError::Config(_))));

        let persisted = EvaluationConfig::new()
            .with_backends([ConnectionConfig::new(BackendKind::Relational).with_path("/tmp/c.sqlite")])
            .without_ingest();
        assert!(persisted.validate().is_ok());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Args::try_parse_from(["textbench", "--backend", "mongo"]).is_err());
    }
}
