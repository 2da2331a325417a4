//! Catalog repository — spec §2, §4.10.

use async_trait::async_trait;
use std::sync::Arc;

use crate::search::SearchableCollection;
use crate::storage::CatalogTable;
use crate::types::CatalogRecord;

pub struct CatalogRepository {
    table: Arc<CatalogTable>,
}

impl CatalogRepository {
    pub fn new(table: Arc<CatalogTable>) -> Self {
        Self { table }
    }

    pub async fn append(&self, records: Vec<CatalogRecord>) -> anyhow::Result<()> {
        self.table.append(records).await
    }

    pub async fn delete_by_content_hash(&self, content_hash: &str) -> anyhow::Result<()> {
        self.table.delete_by_content_hash(content_hash).await
    }

    pub async fn find_by_content_hash(&self, content_hash: &str) -> anyhow::Result<Option<CatalogRecord>> {
        self.table.find_by_content_hash(content_hash).await
    }

    /// Catalog lookup by title or source path — backs `extract_concepts`.
    pub async fn find_by_title_or_source(&self, query: &str) -> anyhow::Result<Option<CatalogRecord>> {
        let all = self.table.all().await?;
        let needle = query.to_lowercase();
        Ok(all.into_iter().find(|r| r.title.to_lowercase() == needle || r.source_path.to_lowercase() == needle))
    }

    pub async fn count(&self) -> anyhow::Result<usize> {
        self.table.count().await
    }

    pub async fn all(&self) -> anyhow::Result<Vec<CatalogRecord>> {
        self.table.all().await
    }

    /// All catalog entries declaring the given category — backs
    /// `browse_by_category`.
    pub async fn find_all_by_category(&self, category: &str) -> anyhow::Result<Vec<CatalogRecord>> {
        let all = self.table.all().await?;
        Ok(all.into_iter().filter(|r| r.concepts.categories.iter().any(|c| c == category)).collect())
    }
}

#[async_trait]
impl SearchableCollection for CatalogRepository {
    type Row = CatalogRecord;

    fn name(&self) -> &str {
        "catalog"
    }

    fn is_catalog(&self) -> bool {
        true
    }

    async fn vector_search(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<(CatalogRecord, f32)>> {
        self.table.vector_search(query, k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConceptBlob;

    async fn repo() -> CatalogRepository {
        let dir = tempfile::tempdir().unwrap();
        let db = lancedb::connect(dir.path().to_str().unwrap()).execute().await.unwrap();
        let table = CatalogTable::open_or_create(db, 8).await.unwrap();
        std::mem::forget(dir);
        CatalogRepository::new(Arc::new(table))
    }

    fn record(id: u64, title: &str, source: &str) -> CatalogRecord {
        CatalogRecord {
            id,
            source_path: source.to_string(),
            content_hash: format!("hash{id}"),
            summary: "summary".into(),
            concepts: ConceptBlob::default(),
            title: title.to_string(),
            author: String::new(),
            year: String::new(),
            publisher: String::new(),
            isbn: String::new(),
            embedding: vec![0.1; 8],
        }
    }

    #[tokio::test]
    async fn find_by_title_or_source_matches_either_field_case_insensitively() {
        let repo = repo().await;
        repo.append(vec![record(1, "Clean Architecture", "books/ca.txt")]).await.unwrap();
        assert!(repo.find_by_title_or_source("clean architecture").await.unwrap().is_some());
        assert!(repo.find_by_title_or_source("books/ca.txt").await.unwrap().is_some());
        assert!(repo.find_by_title_or_source("nope").await.unwrap().is_none());
    }
}
