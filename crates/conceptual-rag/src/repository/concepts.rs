//! Concept repository — spec §2, §4.10.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::query::ConceptSimilaritySource;
use crate::storage::ConceptTable;
use crate::types::{ConceptKind, ConceptRecord};

pub struct ConceptRepository {
    table: Arc<ConceptTable>,
    fuzzy_threshold: f32,
}

impl ConceptRepository {
    pub fn new(table: Arc<ConceptTable>, fuzzy_threshold: f32) -> Self {
        Self { table, fuzzy_threshold }
    }

    pub async fn replace_all(&self, records: Vec<ConceptRecord>) -> anyhow::Result<()> {
        self.table.replace_all(records).await
    }

    pub async fn vector_search(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<(ConceptRecord, f32)>> {
        self.table.vector_search(query, k).await
    }

    pub async fn by_kind(&self, kind: ConceptKind, limit: usize, offset: usize) -> anyhow::Result<Vec<ConceptRecord>> {
        self.table.by_kind(kind, limit, offset).await
    }

    pub async fn count(&self) -> anyhow::Result<usize> {
        self.table.count().await
    }

    /// Exact-or-fuzzy lookup backing `concept_search`. Exact match on the
    /// normalized name wins outright; otherwise falls back to word-set
    /// Jaccard similarity across every concept name, keeping every match
    /// at or above the configured threshold.
    pub async fn find_matching(&self, query: &str) -> anyhow::Result<Vec<ConceptRecord>> {
        let normalized = crate::types::normalize_concept(query);
        if let Some(exact) = self.table.find_by_name(&normalized).await? {
            return Ok(vec![exact]);
        }

        let query_words: HashSet<&str> = normalized.split_whitespace().collect();
        if query_words.is_empty() {
            return Ok(vec![]);
        }

        let mut matches = Vec::new();
        for concept in self.table.all().await? {
            let candidate_words: HashSet<&str> = concept.name.split_whitespace().collect();
            let similarity = jaccard(&query_words, &candidate_words);
            if similarity >= self.fuzzy_threshold {
                matches.push(concept);
            }
        }
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matches)
    }
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f32 / union as f32
}

#[async_trait]
impl ConceptSimilaritySource for ConceptRepository {
    async fn all_concepts(&self) -> anyhow::Result<Vec<ConceptRecord>> {
        self.table.all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo(threshold: f32) -> ConceptRepository {
        let dir = tempfile::tempdir().unwrap();
        let db = lancedb::connect(dir.path().to_str().unwrap()).execute().await.unwrap();
        let table = ConceptTable::open_or_create(db, 8).await.unwrap();
        std::mem::forget(dir);
        ConceptRepository::new(Arc::new(table), threshold)
    }

    fn record(name: &str) -> ConceptRecord {
        ConceptRecord {
            id: crate::types::stable_id(name),
            name: name.to_string(),
            kind: ConceptKind::Thematic,
            document_count: 1,
            chunk_count: 1,
            catalog_ids: vec![],
            related_concepts: vec![],
            synonyms: vec![],
            broader_terms: vec![],
            narrower_terms: vec![],
            embedding: vec![0.1; 8],
            weight: 1,
        }
    }

    #[tokio::test]
    async fn exact_match_short_circuits_fuzzy_scan() {
        let repo = repo(0.6).await;
        repo.replace_all(vec![record("dependency injection")]).await.unwrap();
        let found = repo.find_matching("dependency injection").await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn fuzzy_match_finds_partial_word_overlap_above_threshold() {
        let repo = repo(0.3).await;
        repo.replace_all(vec![record("dependency injection pattern")]).await.unwrap();
        let found = repo.find_matching("dependency injection").await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn no_match_below_threshold_returns_empty() {
        let repo = repo(0.9).await;
        repo.replace_all(vec![record("dependency injection pattern")]).await.unwrap();
        let found = repo.find_matching("completely different topic").await.unwrap();
        assert!(found.is_empty());
    }
}
