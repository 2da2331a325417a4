//! Hybrid Search Service — spec §4.9.
//!
//! Combines five normalized signals into one score over a *searchable
//! collection* (a handle exposing vector-knn, a name, and a catalog flag).
//! The teacher's rank-based fusion strategies (`reciprocal_rank_fusion`,
//! `score_aware_rrf`, `weighted_fusion`) are kept below as alternate,
//! selectable fusion modes behind the same collection abstraction; the five
//! public search operations use the weighted convex combination by default.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;

use crate::query::ExpandedQuery;
use crate::search::bm25::{min_max_normalize, Bm25Corpus, Bm25Params};
use crate::types::{CatalogRecord, ChunkRecordV2};

/// Fields a row must expose to be scored by the hybrid service.
pub trait SearchRow {
    fn row_id(&self) -> u64;
    fn search_text(&self) -> &str;
    fn row_concepts(&self) -> &[String];
    fn title(&self) -> Option<&str> {
        None
    }
}

impl SearchRow for ChunkRecordV2 {
    fn row_id(&self) -> u64 {
        self.id
    }
    fn search_text(&self) -> &str {
        &self.text
    }
    fn row_concepts(&self) -> &[String] {
        &self.concepts
    }
}

impl SearchRow for CatalogRecord {
    fn row_id(&self) -> u64 {
        self.id
    }
    fn search_text(&self) -> &str {
        &self.summary
    }
    fn row_concepts(&self) -> &[String] {
        self.concepts.primary_concepts.as_slice()
    }
    fn title(&self) -> Option<&str> {
        Some(&self.title)
    }
}

/// A vector-searchable handle over one logical table (catalog, chunks, or
/// any future collection sharing the same shape).
#[async_trait]
pub trait SearchableCollection: Send + Sync {
    type Row: SearchRow + Clone + Send + Sync;

    fn name(&self) -> &str;

    /// Whether title boost applies to this collection (spec: catalog only).
    fn is_catalog(&self) -> bool;

    async fn vector_search(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<(Self::Row, f32)>>;
}

#[derive(Debug, Clone, Copy)]
pub struct HybridParams {
    pub bm25: Bm25Params,
    pub weight_vector: f32,
    pub weight_bm25: f32,
    pub weight_concept: f32,
    pub weight_wordnet: f32,
    pub title_boost: f32,
    pub overfetch_factor: usize,
}

impl Default for HybridParams {
    fn default() -> Self {
        Self {
            bm25: Bm25Params::default(),
            weight_vector: 0.45,
            weight_bm25: 0.30,
            weight_concept: 0.20,
            weight_wordnet: 0.05,
            title_boost: 10.0,
            overfetch_factor: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Signals {
    pub vec: f32,
    pub bm25: f32,
    pub concept: f32,
    pub wordnet: f32,
    pub title: f32,
}

#[derive(Debug, Clone)]
pub struct HybridHit<R> {
    pub row: R,
    pub score: f32,
    pub signals: Signals,
}

/// Run the five-signal hybrid scorer over one collection.
///
/// `query_embedding` is the embedding of the full original query string
/// (not the expanded term bag). `expanded` provides the weighted term bag
/// used for `s_bm25`, `s_concept`, and `s_wordnet`.
pub async fn hybrid_search<C: SearchableCollection>(
    collection: &C,
    query_embedding: &[f32],
    expanded: &ExpandedQuery,
    params: &HybridParams,
    limit: usize,
) -> anyhow::Result<Vec<HybridHit<C::Row>>> {
    let k = params.overfetch_factor.max(limit);
    let candidates = collection.vector_search(query_embedding, k).await?;

    let mut rows = Vec::with_capacity(candidates.len());
    for (row, distance) in candidates {
        if distance.is_nan() {
            tracing::warn!(collection = collection.name(), "dropping candidate row with NaN distance");
            continue;
        }
        rows.push((row, (1.0 - distance).clamp(0.0, 1.0)));
    }

    let corpus_docs: Vec<(String, String)> = rows
        .iter()
        .map(|(row, _)| (row.row_id().to_string(), row.search_text().to_string()))
        .collect();
    let bm25 = Bm25Corpus::build(&corpus_docs, params.bm25);

    let all_terms_set: std::collections::HashSet<&str> = expanded.all_terms.iter().map(|s| s.as_str()).collect();

    let mut bm25_scores: HashMap<String, f32> = HashMap::new();
    for (row, _) in &rows {
        let score = bm25.score(row.search_text(), &expanded.weights);
        bm25_scores.insert(row.row_id().to_string(), score);
    }
    min_max_normalize(&mut bm25_scores);

    let mut hits = Vec::with_capacity(rows.len());
    for (row, s_vec) in rows {
        let s_bm25 = bm25_scores.get(&row.row_id().to_string()).copied().unwrap_or(0.0);
        let s_concept = concept_overlap(row.row_concepts(), &all_terms_set);
        let s_wordnet = wordnet_overlap(row.search_text(), &expanded.wordnet_terms, &expanded.weights);
        let s_title = if collection.is_catalog() {
            title_hit(row.title(), &expanded.original_terms, params.title_boost)
        } else {
            0.0
        };

        let score = params.weight_vector * s_vec
            + params.weight_bm25 * s_bm25
            + params.weight_concept * s_concept
            + params.weight_wordnet * s_wordnet
            + s_title;

        hits.push(HybridHit {
            score,
            signals: Signals { vec: s_vec, bm25: s_bm25, concept: s_concept, wordnet: s_wordnet, title: s_title },
            row,
        });
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.signals.vec.partial_cmp(&a.signals.vec).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.row.row_id().cmp(&b.row.row_id()))
    });
    hits.truncate(limit);
    Ok(hits)
}

fn concept_overlap(row_concepts: &[String], all_terms: &std::collections::HashSet<&str>) -> f32 {
    if row_concepts.is_empty() || all_terms.is_empty() {
        return 0.0;
    }
    let overlap = row_concepts.iter().filter(|c| all_terms.contains(c.as_str())).count();
    overlap as f32 / all_terms.len() as f32
}

fn wordnet_overlap(text: &str, wordnet_terms: &[String], weights: &HashMap<String, f32>) -> f32 {
    if wordnet_terms.is_empty() {
        return 0.0;
    }
    let lower = text.to_lowercase();
    let mut total = 0.0;
    for term in wordnet_terms {
        if word_bounded_contains(&lower, &term.to_lowercase()) {
            total += weights.get(term).copied().unwrap_or(0.0);
        }
    }
    (total / wordnet_terms.len() as f32).clamp(0.0, 1.0)
}

fn title_hit(title: Option<&str>, original_terms: &[String], boost: f32) -> f32 {
    let Some(title) = title else { return 0.0 };
    if title.is_empty() {
        return 0.0;
    }
    let lower = title.to_lowercase();
    if original_terms.iter().any(|t| word_bounded_contains(&lower, &t.to_lowercase())) {
        boost
    } else {
        0.0
    }
}

fn word_bounded_contains(haystack_lower: &str, needle_lower: &str) -> bool {
    if needle_lower.is_empty() {
        return false;
    }
    let pattern = format!(r"(?:^|[^\p{{L}}\p{{N}}]){}(?:$|[^\p{{L}}\p{{N}}])", regex::escape(needle_lower));
    Regex::new(&pattern).map(|re| re.is_match(haystack_lower)).unwrap_or(false)
}

/// Result from a rank-based fusion strategy (alternate to the weighted scorer).
#[derive(Debug, Clone)]
pub struct HybridResult {
    pub id: String,
    pub score: f32,
    pub source: HybridSource,
}

#[derive(Debug, Clone, Copy)]
pub enum HybridSource {
    Vector,
    TextSearch,
    Both,
}

/// Reciprocal Rank Fusion — merges ranked lists without score normalization.
/// Formula: rrf_score(doc) = Σ 1/(k + rank_i) for each list containing doc
pub fn reciprocal_rank_fusion(
    vector_results: Vec<(String, f32)>,
    fts_results: Vec<(String, f32)>,
    k: usize,
    top_k: usize,
) -> Vec<(String, f32, HybridSource)> {
    let mut scores: HashMap<String, (f32, HybridSource)> = HashMap::new();

    for (rank, (id, _score)) in vector_results.iter().enumerate() {
        let rrf = 1.0 / (k as f32 + rank as f32 + 1.0);
        scores
            .entry(id.clone())
            .and_modify(|(s, src)| {
                *s += rrf;
                *src = HybridSource::Both;
            })
            .or_insert((rrf, HybridSource::Vector));
    }

    for (rank, (id, _score)) in fts_results.iter().enumerate() {
        let rrf = 1.0 / (k as f32 + rank as f32 + 1.0);
        scores
            .entry(id.clone())
            .and_modify(|(s, src)| {
                *s += rrf;
                *src = HybridSource::Both;
            })
            .or_insert((rrf, HybridSource::TextSearch));
    }

    let mut merged: Vec<(String, f32, HybridSource)> = scores
        .into_iter()
        .map(|(id, (score, source))| (id, score, source))
        .collect();

    merged.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(top_k);
    merged
}

/// Score-aware RRF — standard RRF weighted by normalized original similarity scores.
/// Unlike plain RRF which discards quality signals, this modulates rank-based scores
/// by the original similarity/BM25 scores so high-confidence matches get a boost.
/// `score_weight` controls the blend: 0.0 = pure RRF, higher = more score influence.
pub fn score_aware_rrf(
    vector_results: Vec<(String, f32)>,
    fts_results: Vec<(String, f32)>,
    k: usize,
    top_k: usize,
    score_weight: f32,
) -> Vec<(String, f32, HybridSource)> {
    let normalize = |results: &[(String, f32)]| -> HashMap<String, f32> {
        if results.is_empty() {
            return HashMap::new();
        }
        let max = results.iter().map(|(_, s)| *s).fold(f32::MIN, f32::max);
        let min = results.iter().map(|(_, s)| *s).fold(f32::MAX, f32::min);
        if (max - min).abs() < 1e-9 {
            return results.iter().map(|(id, _)| (id.clone(), 0.5)).collect();
        }
        let range = max - min;
        results.iter().map(|(id, s)| (id.clone(), (s - min) / range)).collect()
    };

    let vec_norm = normalize(&vector_results);
    let fts_norm = normalize(&fts_results);

    let mut scores: HashMap<String, (f32, HybridSource)> = HashMap::new();

    for (rank, (id, _)) in vector_results.iter().enumerate() {
        let rrf = 1.0 / (k as f32 + rank as f32 + 1.0);
        let orig_score = vec_norm.get(id).copied().unwrap_or(0.0);
        let combined = rrf * (1.0 + score_weight * orig_score);
        scores
            .entry(id.clone())
            .and_modify(|(s, src)| {
                *s += combined;
                *src = HybridSource::Both;
            })
            .or_insert((combined, HybridSource::Vector));
    }

    for (rank, (id, _)) in fts_results.iter().enumerate() {
        let rrf = 1.0 / (k as f32 + rank as f32 + 1.0);
        let orig_score = fts_norm.get(id).copied().unwrap_or(0.0);
        let combined = rrf * (1.0 + score_weight * orig_score);
        scores
            .entry(id.clone())
            .and_modify(|(s, src)| {
                *s += combined;
                *src = HybridSource::Both;
            })
            .or_insert((combined, HybridSource::TextSearch));
    }

    let mut merged: Vec<(String, f32, HybridSource)> = scores
        .into_iter()
        .map(|(id, (score, source))| (id, score, source))
        .collect();

    merged.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(top_k);

    if let Some(max_score) = merged.first().map(|(_, s, _)| *s) {
        if max_score > 0.0 {
            for item in &mut merged {
                item.1 /= max_score;
            }
        }
    }

    merged
}

/// Weighted combination — alpha-blends normalized vector and FTS scores
pub fn weighted_fusion(
    vector_results: Vec<(String, f32)>,
    fts_results: Vec<(String, f32)>,
    alpha: f32,
    top_k: usize,
) -> Vec<(String, f32, HybridSource)> {
    let normalize = |results: &[(String, f32)]| -> Vec<(String, f32)> {
        if results.is_empty() {
            return vec![];
        }
        let max = results.iter().map(|(_, s)| *s).fold(f32::MIN, f32::max);
        let min = results.iter().map(|(_, s)| *s).fold(f32::MAX, f32::min);
        let range = (max - min).max(1e-6);
        results.iter().map(|(id, s)| (id.clone(), (s - min) / range)).collect()
    };

    let norm_vec = normalize(&vector_results);
    let norm_fts = normalize(&fts_results);

    let mut scores: HashMap<String, (f32, HybridSource)> = HashMap::new();

    for (id, score) in &norm_vec {
        scores.insert(id.clone(), (alpha * score, HybridSource::Vector));
    }

    for (id, score) in &norm_fts {
        scores
            .entry(id.clone())
            .and_modify(|(s, src)| {
                *s += (1.0 - alpha) * score;
                *src = HybridSource::Both;
            })
            .or_insert(((1.0 - alpha) * score, HybridSource::TextSearch));
    }

    let mut merged: Vec<(String, f32, HybridSource)> = scores
        .into_iter()
        .map(|(id, (score, source))| (id, score, source))
        .collect();

    merged.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(top_k);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConceptBlob;

    struct FakeCollection {
        rows: Vec<(CatalogRecord, f32)>,
        catalog: bool,
    }

    #[async_trait]
    impl SearchableCollection for FakeCollection {
        type Row = CatalogRecord;

        fn name(&self) -> &str {
            "fake"
        }

        fn is_catalog(&self) -> bool {
            self.catalog
        }

        async fn vector_search(&self, _query: &[f32], k: usize) -> anyhow::Result<Vec<(CatalogRecord, f32)>> {
            Ok(self.rows.iter().take(k).cloned().collect())
        }
    }

    fn catalog_record(id: u64, title: &str, summary: &str) -> CatalogRecord {
        CatalogRecord {
            id,
            source_path: format!("{id}.txt"),
            content_hash: format!("hash{id}"),
            summary: summary.to_string(),
            concepts: ConceptBlob::default(),
            title: title.to_string(),
            author: String::new(),
            year: String::new(),
            publisher: String::new(),
            isbn: String::new(),
            embedding: vec![],
        }
    }

    #[tokio::test]
    async fn title_boost_dominates_vector_similarity() {
        let collection = FakeCollection {
            rows: vec![
                (catalog_record(1, "Clean Architecture", "a book about layering"), 0.1),
                (catalog_record(2, "Unrelated", "totally unrelated content"), 0.9),
            ],
            catalog: true,
        };
        let expanded = ExpandedQuery {
            original_terms: vec!["clean".into(), "architecture".into()],
            all_terms: vec!["clean".into(), "architecture".into()],
            weights: [("clean".to_string(), 1.0), ("architecture".to_string(), 1.0)].into_iter().collect(),
            ..Default::default()
        };
        let hits = hybrid_search(&collection, &[0.0; 4], &expanded, &HybridParams::default(), 5).await.unwrap();
        assert_eq!(hits[0].row.id, 1);
        assert!(hits[0].signals.title > 0.0);
    }

    #[tokio::test]
    async fn no_title_boost_for_non_catalog_collections() {
        let collection = FakeCollection {
            rows: vec![(catalog_record(1, "Clean Architecture", "x"), 0.5)],
            catalog: false,
        };
        let expanded = ExpandedQuery {
            original_terms: vec!["clean".into()],
            all_terms: vec!["clean".into()],
            weights: [("clean".to_string(), 1.0)].into_iter().collect(),
            ..Default::default()
        };
        let hits = hybrid_search(&collection, &[0.0; 4], &expanded, &HybridParams::default(), 5).await.unwrap();
        assert_eq!(hits[0].signals.title, 0.0);
    }

    #[tokio::test]
    async fn nan_distance_rows_are_dropped() {
        let collection = FakeCollection {
            rows: vec![(catalog_record(1, "A", "x"), f32::NAN), (catalog_record(2, "B", "y"), 0.2)],
            catalog: true,
        };
        let hits = hybrid_search(&collection, &[0.0; 4], &ExpandedQuery::default(), &HybridParams::default(), 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].row.id, 2);
    }
}
