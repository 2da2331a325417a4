//! Catalog (document) table — spec §3, §6.

use anyhow::{Context, Result};
use arrow_array::{Array, Float32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;

use super::arrow_util::{build_vector_array, json_column, parse_json_or_default, vector_field};
use crate::types::{CatalogRecord, ConceptBlob};

const TABLE_NAME: &str = "catalog";

pub struct CatalogTable {
    db: lancedb::Connection,
    dimension: usize,
}

impl CatalogTable {
    pub async fn open_or_create(db: lancedb::Connection, dimension: usize) -> Result<Self> {
        let table = Self { db, dimension };
        table.ensure_table().await?;
        Ok(table)
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("source_path", DataType::Utf8, false),
            Field::new("content_hash", DataType::Utf8, false),
            Field::new("summary", DataType::Utf8, false),
            Field::new("concepts_json", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("author", DataType::Utf8, false),
            Field::new("year", DataType::Utf8, false),
            Field::new("publisher", DataType::Utf8, false),
            Field::new("isbn", DataType::Utf8, false),
            self.vector_field(),
        ]))
    }

    fn vector_field(&self) -> Field {
        vector_field(self.dimension)
    }

    async fn ensure_table(&self) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if !names.contains(&TABLE_NAME.to_string()) {
            let schema = self.schema();
            let batch = self.build_batch(&[seed_record()])?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            self.db
                .create_table(TABLE_NAME, Box::new(batches))
                .execute()
                .await
                .context("failed to create catalog table")?;
            let table = self.db.open_table(TABLE_NAME).execute().await?;
            table.delete("content_hash = '__seed__'").await.ok();
        }
        Ok(())
    }

    fn build_batch(&self, records: &[CatalogRecord]) -> Result<RecordBatch> {
        let schema = self.schema();
        let ids: Vec<i64> = records.iter().map(|r| r.id as i64).collect();
        let source_paths: Vec<&str> = records.iter().map(|r| r.source_path.as_str()).collect();
        let content_hashes: Vec<&str> = records.iter().map(|r| r.content_hash.as_str()).collect();
        let summaries: Vec<&str> = records.iter().map(|r| r.summary.as_str()).collect();
        let concepts_json = json_column(&records.iter().map(|r| r.concepts.clone()).collect::<Vec<_>>());
        let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
        let authors: Vec<&str> = records.iter().map(|r| r.author.as_str()).collect();
        let years: Vec<&str> = records.iter().map(|r| r.year.as_str()).collect();
        let publishers: Vec<&str> = records.iter().map(|r| r.publisher.as_str()).collect();
        let isbns: Vec<&str> = records.iter().map(|r| r.isbn.as_str()).collect();
        let vectors: Vec<Vec<f32>> = records.iter().map(|r| r.embedding.clone()).collect();
        let vector_array = build_vector_array(&vectors, self.dimension);

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)) as Arc<dyn Array>,
                Arc::new(StringArray::from(source_paths)),
                Arc::new(StringArray::from(content_hashes)),
                Arc::new(StringArray::from(summaries)),
                Arc::new(concepts_json),
                Arc::new(StringArray::from(titles)),
                Arc::new(StringArray::from(authors)),
                Arc::new(StringArray::from(years)),
                Arc::new(StringArray::from(publishers)),
                Arc::new(StringArray::from(isbns)),
                Arc::new(vector_array) as Arc<dyn Array>,
            ],
        )
        .context("failed to build catalog RecordBatch")
    }

    /// Append-only insert. Re-ingest replaces by deleting the old content
    /// hash row first — the caller is responsible for that ordering.
    pub async fn append(&self, records: Vec<CatalogRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let schema = self.schema();
        let batch = self.build_batch(&records)?;
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table.add(Box::new(reader)).execute().await.context("failed to insert catalog records")?;
        Ok(())
    }

    pub async fn delete_by_content_hash(&self, content_hash: &str) -> Result<()> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let predicate = format!("content_hash = '{}'", content_hash.replace('\'', "''"));
        table.delete(&predicate).await?;
        Ok(())
    }

    pub async fn find_by_content_hash(&self, content_hash: &str) -> Result<Option<CatalogRecord>> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let predicate = format!("content_hash = '{}'", content_hash.replace('\'', "''"));
        let results = table.query().only_if(predicate).execute().await?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        Ok(extract(&batches).into_iter().next())
    }

    pub async fn vector_search(&self, query: &[f32], k: usize) -> Result<Vec<(CatalogRecord, f32)>> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let results = table
            .query()
            .nearest_to(query)?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .context("catalog vector search failed")?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        Ok(extract_with_distance(&batches))
    }

    pub async fn scan(&self, predicate: Option<&str>, limit: usize) -> Result<Vec<CatalogRecord>> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let mut query = table.query();
        if let Some(p) = predicate {
            query = query.only_if(p);
        }
        if limit != usize::MAX {
            query = query.limit(limit);
        }
        let results = query.execute().await.context("catalog scan failed")?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        Ok(extract(&batches))
    }

    pub async fn all(&self) -> Result<Vec<CatalogRecord>> {
        self.scan(None, usize::MAX).await
    }

    pub async fn count(&self) -> Result<usize> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        Ok(table.count_rows(None).await?)
    }
}

fn seed_record() -> CatalogRecord {
    CatalogRecord {
        id: 0,
        source_path: String::new(),
        content_hash: "__seed__".to_string(),
        summary: String::new(),
        concepts: ConceptBlob::default(),
        title: String::new(),
        author: String::new(),
        year: String::new(),
        publisher: String::new(),
        isbn: String::new(),
        embedding: vec![],
    }
}

fn extract(batches: &[RecordBatch]) -> Vec<CatalogRecord> {
    extract_with_distance(batches).into_iter().map(|(r, _)| r).collect()
}

fn extract_with_distance(batches: &[RecordBatch]) -> Vec<(CatalogRecord, f32)> {
    let mut out = Vec::new();
    for batch in batches {
        let ids = batch.column_by_name("id").and_then(|c| c.as_any().downcast_ref::<Int64Array>());
        let source_paths = batch.column_by_name("source_path").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let content_hashes = batch.column_by_name("content_hash").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let summaries = batch.column_by_name("summary").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let concepts_json = batch.column_by_name("concepts_json").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let titles = batch.column_by_name("title").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let authors = batch.column_by_name("author").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let years = batch.column_by_name("year").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let publishers = batch.column_by_name("publisher").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let isbns = batch.column_by_name("isbn").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let (Some(ids), Some(content_hashes)) = (ids, content_hashes) else { continue };

        for i in 0..batch.num_rows() {
            if content_hashes.value(i) == "__seed__" {
                continue;
            }
            let content_hash = content_hashes.value(i).to_string();
            let concepts = concepts_json.map(|c| parse_json_or_default(c.value(i), &content_hash)).unwrap_or_default();
            let record = CatalogRecord {
                id: ids.value(i) as u64,
                source_path: source_paths.map(|a| a.value(i).to_string()).unwrap_or_default(),
                content_hash,
                summary: summaries.map(|a| a.value(i).to_string()).unwrap_or_default(),
                concepts,
                title: titles.map(|a| a.value(i).to_string()).unwrap_or_default(),
                author: authors.map(|a| a.value(i).to_string()).unwrap_or_default(),
                year: years.map(|a| a.value(i).to_string()).unwrap_or_default(),
                publisher: publishers.map(|a| a.value(i).to_string()).unwrap_or_default(),
                isbn: isbns.map(|a| a.value(i).to_string()).unwrap_or_default(),
                embedding: vec![],
            };
            let distance = distances.map(|d| d.value(i)).unwrap_or(0.0);
            out.push((record, distance));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn table() -> CatalogTable {
        let dir = tempfile::tempdir().unwrap();
        let db = lancedb::connect(dir.path().to_str().unwrap()).execute().await.unwrap();
        let t = CatalogTable::open_or_create(db, 8).await.unwrap();
        std::mem::forget(dir);
        t
    }

    fn record(id: u64, content_hash: &str) -> CatalogRecord {
        CatalogRecord {
            id,
            source_path: format!("{content_hash}.txt"),
            content_hash: content_hash.to_string(),
            summary: "a summary".into(),
            concepts: ConceptBlob { primary_concepts: vec!["rest".into()], ..Default::default() },
            title: "Title".into(),
            author: String::new(),
            year: String::new(),
            publisher: String::new(),
            isbn: String::new(),
            embedding: vec![0.1; 8],
        }
    }

    #[tokio::test]
    async fn append_then_find_by_content_hash_round_trips() {
        let t = table().await;
        t.append(vec![record(1, "abc")]).await.unwrap();
        let found = t.find_by_content_hash("abc").await.unwrap().unwrap();
        assert_eq!(found.id, 1);
        assert_eq!(found.concepts.primary_concepts, vec!["rest".to_string()]);
    }

    #[tokio::test]
    async fn delete_by_content_hash_removes_row() {
        let t = table().await;
        t.append(vec![record(1, "abc")]).await.unwrap();
        t.delete_by_content_hash("abc").await.unwrap();
        assert!(t.find_by_content_hash("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn vector_search_returns_inserted_record() {
        let t = table().await;
        t.append(vec![record(1, "abc")]).await.unwrap();
        let hits = t.vector_search(&[0.1; 8], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.content_hash, "abc");
    }
}
