//! Synthetic corpus generation.
//!
//! Generated corpora are deterministic for a given seed so benchmark runs
//! over different backends see identical documents.

use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use textbench_core::AnnotatedDocument;

/// Part-of-speech tags used by generated tokens.
pub const POS_TAGS: [&str; 8] = ["NOUN", "VERB", "ADJ", "ADV", "DET", "ADP", "PRON", "CONJ"];

/// Corpus size presets for benchmarks.
#[derive(Clone, Copy, Debug, Default)]
pub enum Scale {
    /// 10 documents. Use for tests.
    Tiny,
    /// 100 documents.
    #[default]
    Small,
    /// 1,000 documents.
    Medium,
    /// 10,000 documents.
    Large,
}

impl Scale {
    /// Number of documents at this scale.
    pub fn documents(&self) -> usize {
        match self {
            Scale::Tiny => 10,
            Scale::Small => 100,
            Scale::Medium => 1_000,
            Scale::Large => 10_000,
        }
    }

    /// Distinct lemmata available to the generator.
    pub fn vocabulary(&self) -> usize {
        match self {
            Scale::Tiny => 50,
            Scale::Small => 500,
            Scale::Medium => 2_000,
            Scale::Large => 10_000,
        }
    }
}

/// Generate a random lowercase word.
fn random_word(rng: &mut StdRng) -> String {
    let len = rng.gen_range(3..=9);
    (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

/// Generate a vocabulary of distinct lemmata.
pub fn generate_vocabulary(rng: &mut StdRng, size: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::with_capacity(size);
    let mut words = Vec::with_capacity(size);
    while words.len() < size {
        let word = random_word(rng);
        if seen.insert(word.clone()) {
            words.push(word);
        }
    }
    words
}

/// Pick a vocabulary index with a long-tailed distribution, so a few lemmata
/// appear in most documents and most appear in few.
fn skewed_index(rng: &mut StdRng, len: usize) -> usize {
    let x: f64 = rng.gen();
    ((x * x * x) * len as f64) as usize % len.max(1)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Generate one document drawing lemmata from `vocabulary`.
pub fn generate_document(rng: &mut StdRng, id: &str, vocabulary: &[String]) -> AnnotatedDocument {
    let paragraphs = Uniform::new_inclusive(1, 3);
    let sentences = Uniform::new_inclusive(1, 4);
    let tokens = Uniform::new_inclusive(3, 12);

    let mut builder = AnnotatedDocument::builder(id);
    if vocabulary.is_empty() {
        return builder.build();
    }
    for _ in 0..rng.sample(paragraphs) {
        builder = builder.paragraph();
        for _ in 0..rng.sample(sentences) {
            builder = builder.sentence();
            for position in 0..rng.sample(tokens) {
                let index = skewed_index(rng, vocabulary.len());
                let lemma = &vocabulary[index];
                // surface forms differ from lemmata at sentence starts
                let value = if position == 0 {
                    capitalize(lemma)
                } else {
                    lemma.clone()
                };
                builder = builder.token(&value, lemma, POS_TAGS[index % POS_TAGS.len()]);
            }
        }
    }
    builder.build()
}

/// Generate `count` documents with ids `doc-00000`, `doc-00001`, ...
pub fn generate_corpus(count: usize, vocabulary_size: usize, seed: u64) -> Vec<AnnotatedDocument> {
    let mut rng = StdRng::seed_from_u64(seed);
    let vocabulary = generate_vocabulary(&mut rng, vocabulary_size.max(1));
    (0..count)
        .map(|i| generate_document(&mut rng, &format!("doc-{i:05}"), &vocabulary))
        .collect()
}

/// Generate the corpus of a preset scale.
pub fn generate_scale(scale: Scale, seed: u64) -> Vec<AnnotatedDocument> {
    generate_corpus(scale.documents(), scale.vocabulary(), seed)
}

/// Vocabulary size for an arbitrary document count.
pub fn vocabulary_for(documents: usize) -> usize {
    (documents * 5).clamp(50, 10_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = generate_corpus(5, 50, 9);
        let b = generate_corpus(5, 50, 9);
        assert_eq!(a, b);
        assert_ne!(a, generate_corpus(5, 50, 10));
    }

    #[test]
    fn test_documents_are_valid() {
        for document in generate_scale(Scale::Tiny, 1) {
            document.validate().unwrap();
            assert!(document.token_count() >= 3);
            assert!(document.tokens().all(|t| t.value.to_lowercase() == t.lemma));
        }
    }

    #[test]
    fn test_ids_are_ordered() {
        let ids: Vec<_> = generate_corpus(3, 50, 1).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["doc-00000", "doc-00001", "doc-00002"]);
    }

    #[test]
    fn test_vocabulary_distinct() {
        let mut rng = StdRng::seed_from_u64(3);
        let words = generate_vocabulary(&mut rng, 200);
        let unique: std::collections::HashSet<_> = words.iter().collect();
        assert_eq!(unique.len(), 200);
    }
}
