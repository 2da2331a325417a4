//! Chunk repository — spec §2, §4.10.

use async_trait::async_trait;
use std::sync::Arc;

use crate::embeddings::cosine_similarity;
use crate::search::SearchableCollection;
use crate::storage::ChunkTable;
use crate::types::ChunkRecordV2;

pub struct ChunkRepository {
    table: Arc<ChunkTable>,
}

impl ChunkRepository {
    pub fn new(table: Arc<ChunkTable>) -> Self {
        Self { table }
    }

    pub async fn append(&self, records: Vec<ChunkRecordV2>) -> anyhow::Result<()> {
        self.table.append(records).await
    }

    pub async fn delete_by_content_hash(&self, content_hash: &str) -> anyhow::Result<()> {
        self.table.delete_by_content_hash(content_hash).await
    }

    pub async fn by_source_path(&self, source_path: &str) -> anyhow::Result<Vec<ChunkRecordV2>> {
        self.table.by_source_path(source_path).await
    }

    /// Membership query for `concept_search` — every chunk declaring any of
    /// `concept_names`, ranked by `concept_density` desc then by vector
    /// similarity to `concept_embedding`.
    pub async fn by_any_concept(&self, concept_names: &[String], concept_embedding: &[f32]) -> anyhow::Result<Vec<ChunkRecordV2>> {
        let wanted: std::collections::HashSet<&str> = concept_names.iter().map(|s| s.as_str()).collect();
        let mut matches: Vec<ChunkRecordV2> = self
            .table
            .all()
            .await?
            .into_iter()
            .filter(|c| c.concepts.iter().any(|name| wanted.contains(name.as_str())))
            .collect();

        matches.sort_by(|a, b| {
            b.concept_density
                .partial_cmp(&a.concept_density)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let sim_a = cosine_similarity(&a.embedding, concept_embedding);
                    let sim_b = cosine_similarity(&b.embedding, concept_embedding);
                    sim_b.partial_cmp(&sim_a).unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        Ok(matches)
    }

    pub async fn count(&self) -> anyhow::Result<usize> {
        self.table.count().await
    }

    pub async fn all(&self) -> anyhow::Result<Vec<ChunkRecordV2>> {
        self.table.all().await
    }
}

#[async_trait]
impl SearchableCollection for ChunkRepository {
    type Row = ChunkRecordV2;

    fn name(&self) -> &str {
        "chunks"
    }

    fn is_catalog(&self) -> bool {
        false
    }

    async fn vector_search(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<(ChunkRecordV2, f32)>> {
        self.table.vector_search(query, k, None).await
    }
}

/// A chunk repository restricted to one `source_path` for `chunks_search`.
pub struct ScopedChunkRepository {
    table: Arc<ChunkTable>,
    source_path: String,
}

impl ScopedChunkRepository {
    pub fn new(table: Arc<ChunkTable>, source_path: String) -> Self {
        Self { table, source_path }
    }
}

#[async_trait]
impl SearchableCollection for ScopedChunkRepository {
    type Row = ChunkRecordV2;

    fn name(&self) -> &str {
        "chunks_scoped"
    }

    fn is_catalog(&self) -> bool {
        false
    }

    async fn vector_search(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<(ChunkRecordV2, f32)>> {
        self.table.vector_search(query, k, Some(&self.source_path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn table() -> Arc<ChunkTable> {
        let dir = tempfile::tempdir().unwrap();
        let db = lancedb::connect(dir.path().to_str().unwrap()).execute().await.unwrap();
        let t = ChunkTable::open_or_create(db, 8).await.unwrap();
        std::mem::forget(dir);
        Arc::new(t)
    }

    fn record(id: u64, concepts: Vec<&str>, density: f32) -> ChunkRecordV2 {
        ChunkRecordV2 {
            id,
            source_path: "a.txt".into(),
            content_hash: format!("hash{id}"),
            text: "body".into(),
            concepts: concepts.into_iter().map(String::from).collect(),
            concept_categories: vec![],
            concept_density: density,
            embedding: vec![0.1; 8],
        }
    }

    #[tokio::test]
    async fn by_any_concept_sorts_by_density_descending() {
        let repo = ChunkRepository::new(table().await);
        repo.append(vec![
            record(1, vec!["rest"], 0.4),
            record(2, vec!["rest"], 0.9),
            record(3, vec!["unrelated"], 0.7),
        ])
        .await
        .unwrap();
        let hits = repo.by_any_concept(&["rest".to_string()], &[0.1; 8]).await.unwrap();
        assert_eq!(hits.iter().map(|c| c.id).collect::<Vec<_>>(), vec![2, 1]);
    }
}
