//! Chunk table — spec §3, §6.

use anyhow::{Context, Result};
use arrow_array::{Array, Float32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;

use super::arrow_util::{build_vector_array, json_column, parse_json_or_default, vector_field};
use crate::types::ChunkRecordV2;

const TABLE_NAME: &str = "chunks";

pub struct ChunkTable {
    db: lancedb::Connection,
    dimension: usize,
}

impl ChunkTable {
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
            Field::new("text", DataType::Utf8, false),
            Field::new("concepts_json", DataType::Utf8, false),
            Field::new("concept_categories_json", DataType::Utf8, false),
            Field::new("concept_density", DataType::Float32, false),
            vector_field(self.dimension),
        ]))
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
                .context("failed to create chunks table")?;
            let table = self.db.open_table(TABLE_NAME).execute().await?;
            table.delete("content_hash = '__seed__'").await.ok();
        }
        Ok(())
    }

    fn build_batch(&self, records: &[ChunkRecordV2]) -> Result<RecordBatch> {
        let schema = self.schema();
        let ids: Vec<i64> = records.iter().map(|r| r.id as i64).collect();
        let source_paths: Vec<&str> = records.iter().map(|r| r.source_path.as_str()).collect();
        let content_hashes: Vec<&str> = records.iter().map(|r| r.content_hash.as_str()).collect();
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let concepts_json = json_column(&records.iter().map(|r| r.concepts.clone()).collect::<Vec<_>>());
        let categories_json = json_column(&records.iter().map(|r| r.concept_categories.clone()).collect::<Vec<_>>());
        let densities: Vec<f32> = records.iter().map(|r| r.concept_density).collect();
        let vectors: Vec<Vec<f32>> = records.iter().map(|r| r.embedding.clone()).collect();
        let vector_array = build_vector_array(&vectors, self.dimension);

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)) as Arc<dyn Array>,
                Arc::new(StringArray::from(source_paths)),
                Arc::new(StringArray::from(content_hashes)),
                Arc::new(StringArray::from(texts)),
                Arc::new(concepts_json),
                Arc::new(categories_json),
                Arc::new(Float32Array::from(densities)),
                Arc::new(vector_array) as Arc<dyn Array>,
            ],
        )
        .context("failed to build chunks RecordBatch")
    }

    pub async fn append(&self, records: Vec<ChunkRecordV2>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let schema = self.schema();
        let batch = self.build_batch(&records)?;
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table.add(Box::new(reader)).execute().await.context("failed to insert chunk records")?;
        Ok(())
    }

    pub async fn delete_by_content_hash(&self, content_hash: &str) -> Result<()> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let predicate = format!("content_hash = '{}'", content_hash.replace('\'', "''"));
        table.delete(&predicate).await?;
        Ok(())
    }

    pub async fn by_source_path(&self, source_path: &str) -> Result<Vec<ChunkRecordV2>> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let predicate = format!("source_path = '{}'", source_path.replace('\'', "''"));
        let results = table.query().only_if(predicate).execute().await?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        Ok(extract(&batches))
    }

    pub async fn vector_search(&self, query: &[f32], k: usize, source_filter: Option<&str>) -> Result<Vec<(ChunkRecordV2, f32)>> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let mut q = table.query().nearest_to(query)?.distance_type(lancedb::DistanceType::Cosine).limit(k);
        if let Some(source) = source_filter {
            let predicate = format!("source_path = '{}'", source.replace('\'', "''"));
            q = q.only_if(predicate);
        }
        let results = q.execute().await.context("chunk vector search failed")?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        Ok(extract_with_distance(&batches))
    }

    pub async fn all(&self) -> Result<Vec<ChunkRecordV2>> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let results = table.query().execute().await.context("chunk scan failed")?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        Ok(extract(&batches))
    }

    pub async fn count(&self) -> Result<usize> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        Ok(table.count_rows(None).await?)
    }
}

fn seed_record() -> ChunkRecordV2 {
    ChunkRecordV2 {
        id: 0,
        source_path: String::new(),
        content_hash: "__seed__".to_string(),
        text: String::new(),
        concepts: vec![],
        concept_categories: vec![],
        concept_density: 0.0,
        embedding: vec![],
    }
}

fn extract(batches: &[RecordBatch]) -> Vec<ChunkRecordV2> {
    extract_with_distance(batches).into_iter().map(|(r, _)| r).collect()
}

fn extract_with_distance(batches: &[RecordBatch]) -> Vec<(ChunkRecordV2, f32)> {
    let mut out = Vec::new();
    for batch in batches {
        let ids = batch.column_by_name("id").and_then(|c| c.as_any().downcast_ref::<Int64Array>());
        let source_paths = batch.column_by_name("source_path").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let content_hashes = batch.column_by_name("content_hash").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let texts = batch.column_by_name("text").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let concepts_json = batch.column_by_name("concepts_json").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let categories_json = batch.column_by_name("concept_categories_json").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let densities = batch.column_by_name("concept_density").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
        let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let (Some(ids), Some(content_hashes)) = (ids, content_hashes) else { continue };

        for i in 0..batch.num_rows() {
            if content_hashes.value(i) == "__seed__" {
                continue;
            }
            let content_hash = content_hashes.value(i).to_string();
            let concepts = concepts_json.map(|c| parse_json_or_default(c.value(i), &content_hash)).unwrap_or_default();
            let concept_categories = categories_json.map(|c| parse_json_or_default(c.value(i), &content_hash)).unwrap_or_default();
            let record = ChunkRecordV2 {
                id: ids.value(i) as u64,
                source_path: source_paths.map(|a| a.value(i).to_string()).unwrap_or_default(),
                content_hash,
                text: texts.map(|a| a.value(i).to_string()).unwrap_or_default(),
                concepts,
                concept_categories,
                concept_density: densities.map(|d| d.value(i)).unwrap_or(0.0),
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

    async fn table() -> ChunkTable {
        let dir = tempfile::tempdir().unwrap();
        let db = lancedb::connect(dir.path().to_str().unwrap()).execute().await.unwrap();
        let t = ChunkTable::open_or_create(db, 8).await.unwrap();
        std::mem::forget(dir);
        t
    }

    fn record(id: u64, source: &str, hash: &str) -> ChunkRecordV2 {
        ChunkRecordV2 {
            id,
            source_path: source.to_string(),
            content_hash: hash.to_string(),
            text: "some chunk text".into(),
            concepts: vec!["rest".into()],
            concept_categories: vec!["api".into()],
            concept_density: 0.4,
            embedding: vec![0.2; 8],
        }
    }

    #[tokio::test]
    async fn append_then_filter_by_source_path() {
        let t = table().await;
        t.append(vec![record(1, "a.txt", "h1"), record(2, "b.txt", "h2")]).await.unwrap();
        let hits = t.by_source_path("a.txt").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);
        assert_eq!(hits[0].concepts, vec!["rest".to_string()]);
    }

    #[tokio::test]
    async fn delete_by_content_hash_removes_its_chunks() {
        let t = table().await;
        t.append(vec![record(1, "a.txt", "h1")]).await.unwrap();
        t.delete_by_content_hash("h1").await.unwrap();
        assert_eq!(t.all().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn vector_search_respects_source_filter() {
        let t = table().await;
        t.append(vec![record(1, "a.txt", "h1"), record(2, "b.txt", "h2")]).await.unwrap();
        let hits = t.vector_search(&[0.2; 8], 10, Some("a.txt")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.source_path, "a.txt");
    }
}
