//! Weighted BM25 scorer — spec §4.9.
//!
//! Tantivy's built-in scorer has no notion of per-term external weights, so
//! the hybrid service scores candidate rows itself over an in-memory token
//! index, in the style of the hand-rolled BM25 used elsewhere in the corpus.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// One document's raw BM25 score over a term→weight bag, against a corpus
/// whose document frequencies and average length are precomputed.
pub struct Bm25Corpus {
    params: Bm25Params,
    doc_freq: HashMap<String, usize>,
    total_docs: usize,
    avg_doc_len: f32,
}

impl Bm25Corpus {
    /// Build document-frequency statistics from a corpus of (id, text) pairs.
    pub fn build(documents: &[(String, String)], params: Bm25Params) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;

        for (_, text) in documents {
            let tokens = tokenize(text);
            total_len += tokens.len();
            let unique: std::collections::HashSet<String> = tokens.into_iter().collect();
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let total_docs = documents.len();
        let avg_doc_len = if total_docs == 0 {
            1.0
        } else {
            (total_len as f32 / total_docs as f32).max(1.0)
        };

        Self {
            params,
            doc_freq,
            total_docs,
            avg_doc_len,
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
        let n = self.total_docs as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln().max(0.0)
    }

    /// Weighted BM25 score of one row's text against a weighted term bag.
    pub fn score(&self, text: &str, term_weights: &HashMap<String, f32>) -> f32 {
        if term_weights.is_empty() {
            return 0.0;
        }
        let tokens = tokenize(text);
        let doc_len = tokens.len() as f32;
        let mut term_freq: HashMap<&str, usize> = HashMap::new();
        for t in &tokens {
            *term_freq.entry(t.as_str()).or_insert(0) += 1;
        }

        let k1 = self.params.k1;
        let b = self.params.b;

        term_weights
            .iter()
            .map(|(term, weight)| {
                let tf = term_freq.get(term.as_str()).copied().unwrap_or(0) as f32;
                if tf == 0.0 {
                    return 0.0;
                }
                let idf = self.idf(term);
                let numerator = tf * (k1 + 1.0);
                let denominator = tf + k1 * (1.0 - b + b * doc_len / self.avg_doc_len);
                weight * idf * numerator / denominator
            })
            .sum()
    }
}

/// Min-max normalize a set of raw scores into `[0,1]`. All-equal scores map to 0.5.
pub fn min_max_normalize(scores: &mut HashMap<String, f32>) {
    if scores.is_empty() {
        return;
    }
    let max = scores.values().cloned().fold(f32::MIN, f32::max);
    let min = scores.values().cloned().fold(f32::MAX, f32::min);
    if (max - min).abs() < 1e-9 {
        for v in scores.values_mut() {
            *v = 0.5;
        }
        return;
    }
    let range = max - min;
    for v in scores.values_mut() {
        *v = (*v - min) / range;
    }
}
