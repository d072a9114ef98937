//! Corpus statistics formulas.
//!
//! These are the only place the formulas live; backends supply counts.

use crate::backend::TtrCounts;

/// Separator between token values in an n-gram.
pub const NGRAM_SEPARATOR: &str = "-";

/// Distinct lemmata divided by tokens; 0 for a document without tokens.
pub fn type_token_ratio(counts: TtrCounts) -> f64 {
    if counts.tokens == 0 {
        return 0.0;
    }
    counts.lemmata as f64 / counts.tokens as f64
}

/// Double-normalized term frequency `0.5 + 0.5 * raw / max_raw`.
///
/// `max_raw == 0` means the document has no lemmata and yields 0.
pub fn double_norm_tf(raw: u64, max_raw: u64) -> f64 {
    if max_raw == 0 {
        return 0.0;
    }
    0.5 + 0.5 * (raw as f64 / max_raw as f64)
}

/// Log-normalized term frequency `1 + ln(raw)`, or 1 when `raw == 0`.
pub fn log_norm_tf(raw: u64) -> f64 {
    if raw > 0 {
        1.0 + (raw as f64).ln()
    } else {
        1.0
    }
}

/// Inverse document frequency `ln(total / containing)`.
///
/// A zero, infinite or undefined ratio (empty corpus, unseen lemma) gives 0.
pub fn inverse_document_frequency(total_documents: u64, containing: u64) -> f64 {
    let ratio = total_documents as f64 / containing as f64;
    if ratio == 0.0 || !ratio.is_finite() {
        return 0.0;
    }
    ratio.ln()
}

/// TF-IDF from a log-normalized TF and an IDF.
pub fn tfidf(log_norm_tf: f64, idf: f64) -> f64 {
    log_norm_tf * idf
}

/// Join token values into n-gram strings.
pub fn join_ngrams(windows: Vec<Vec<String>>) -> Vec<String> {
    windows
        .into_iter()
        .map(|window| window.join(NGRAM_SEPARATOR))
        .collect()
}

/// Slide a window of `n` over one sentence's token values.
pub fn windows_of(values: &[String], n: usize) -> impl Iterator<Item = Vec<String>> + '_ {
    values.windows(n.max(1)).map(|w| w.to_vec())
}
