//! Corpus input.

use std::fs;
use std::path::Path;

use textbench_core::AnnotatedDocument;

use crate::config::CorpusSource;
use crate::error::{HarnessError, Result};
use crate::fixtures;

/// Load every `*.json` file in `dir` as an annotated document, in file
/// name order.
pub fn load_directory(dir: &Path) -> Result<Vec<AnnotatedDocument>> {
    let entries = fs::read_dir(dir).map_err(|source| HarnessError::Input {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = fs::read(&path).map_err(|source| HarnessError::Input {
            path: path.clone(),
            source,
        })?;
        let document = serde_json::from_slice(&bytes)
            .map_err(|source| HarnessError::Parse { path, source })?;
        documents.push(document);
    }

    tracing::info!(dir = %dir.display(), documents = documents.len(), "loaded corpus");
    Ok(documents)
}

impl CorpusSource {
    /// Materialize the corpus. Synthetic corpora are generated from `seed`.
    pub fn load(&self, seed: u64) -> Result<Vec<AnnotatedDocument>> {
        match self {
            CorpusSource::Directory(dir) => load_directory(dir),
            CorpusSource::Synthetic(count) => {
                let documents =
                    fixtures::generate_corpus(*count, fixtures::vocabulary_for(*count), seed);
                tracing::info!(documents = documents.len(), seed, "generated synthetic corpus");
                Ok(documents)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_directory_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let b = AnnotatedDocument::builder("b").words("second file").build();
        let a = AnnotatedDocument::builder("a").words("first file").build();
        fs::write(dir.path().join("2.json"), serde_json::to_vec(&b).unwrap()).unwrap();
        fs::write(dir.path().join("1.json"), serde_json::to_vec(&a).unwrap()).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let documents = load_directory(dir.path()).unwrap();
        assert_eq!(documents, vec![a, b]);
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{").unwrap();
        let err = load_directory(dir.path()).unwrap_err();
        assert!(matches!(err, HarnessError::Parse { .. }));
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn test_missing_directory() {
        let err = load_directory(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, HarnessError::Input { .. }));
    }

    #[test]
    fn test_synthetic_source() {
        let documents = CorpusSource::Synthetic(4).load(1).unwrap();
        assert_eq!(documents.len(), 4);
    }
}
