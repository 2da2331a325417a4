//! Concept table — spec §3, §4.6, §6.
//!
//! The concept table is replaced wholesale on each `ConceptIndexBuilder`
//! rebuild rather than mutated row-by-row, per the resolved GC Open Question.

use anyhow::{Context, Result};
use arrow_array::{Array, Float32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;

use super::arrow_util::{build_vector_array, json_column, parse_json_or_default, vector_field};
use crate::types::{ConceptKind, ConceptRecord};

const TABLE_NAME: &str = "concepts";

pub struct ConceptTable {
    db: lancedb::Connection,
    dimension: usize,
}

impl ConceptTable {
    pub async fn open_or_create(db: lancedb::Connection, dimension: usize) -> Result<Self> {
        let table = Self { db, dimension };
        table.ensure_table().await?;
        Ok(table)
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("document_count", DataType::UInt32, false),
            Field::new("chunk_count", DataType::UInt32, false),
            Field::new("catalog_ids_json", DataType::Utf8, false),
            Field::new("related_concepts_json", DataType::Utf8, false),
            Field::new("synonyms_json", DataType::Utf8, false),
            Field::new("broader_terms_json", DataType::Utf8, false),
            Field::new("narrower_terms_json", DataType::Utf8, false),
            Field::new("weight", DataType::Int64, false),
            vector_field(self.dimension),
        ]))
    }

    async fn ensure_table(&self) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if !names.contains(&TABLE_NAME.to_string()) {
            let schema = self.schema();
            let batch = self.build_batch(&[])?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            self.db
                .create_table(TABLE_NAME, Box::new(batches))
                .execute()
                .await
                .context("failed to create concepts table")?;
        }
        Ok(())
    }

    fn build_batch(&self, records: &[ConceptRecord]) -> Result<RecordBatch> {
        let schema = self.schema();
        let ids: Vec<i64> = records.iter().map(|r| r.id as i64).collect();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        let kinds: Vec<&str> = records.iter().map(|r| r.kind.as_str()).collect();
        let doc_counts: Vec<u32> = records.iter().map(|r| r.document_count).collect();
        let chunk_counts: Vec<u32> = records.iter().map(|r| r.chunk_count).collect();
        let catalog_ids_json = json_column(&records.iter().map(|r| r.catalog_ids.clone()).collect::<Vec<_>>());
        let related_json = json_column(&records.iter().map(|r| r.related_concepts.clone()).collect::<Vec<_>>());
        let synonyms_json = json_column(&records.iter().map(|r| r.synonyms.clone()).collect::<Vec<_>>());
        let broader_json = json_column(&records.iter().map(|r| r.broader_terms.clone()).collect::<Vec<_>>());
        let narrower_json = json_column(&records.iter().map(|r| r.narrower_terms.clone()).collect::<Vec<_>>());
        let weights: Vec<i64> = records.iter().map(|r| r.weight as i64).collect();
        let vectors: Vec<Vec<f32>> = records.iter().map(|r| r.embedding.clone()).collect();
        let vector_array = build_vector_array(&vectors, self.dimension);

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)) as Arc<dyn Array>,
                Arc::new(StringArray::from(names)),
                Arc::new(StringArray::from(kinds)),
                Arc::new(UInt32Array::from(doc_counts)),
                Arc::new(UInt32Array::from(chunk_counts)),
                Arc::new(catalog_ids_json),
                Arc::new(related_json),
                Arc::new(synonyms_json),
                Arc::new(broader_json),
                Arc::new(narrower_json),
                Arc::new(Int64Array::from(weights)),
                Arc::new(vector_array) as Arc<dyn Array>,
            ],
        )
        .context("failed to build concepts RecordBatch")
    }

    /// Replace the entire table contents — the only mutation path, matching
    /// the rebuild-only lifecycle of the concept index.
    pub async fn replace_all(&self, records: Vec<ConceptRecord>) -> Result<()> {
        self.db.drop_table(TABLE_NAME, &[]).await.ok();
        let schema = self.schema();
        let batch = self.build_batch(&records)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        self.db
            .create_table(TABLE_NAME, Box::new(batches))
            .execute()
            .await
            .context("failed to replace concepts table")?;
        Ok(())
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<ConceptRecord>> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let predicate = format!("name = '{}'", name.replace('\'', "''"));
        let results = table.query().only_if(predicate).execute().await?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        Ok(extract(&batches).into_iter().next())
    }

    pub async fn vector_search(&self, query: &[f32], k: usize) -> Result<Vec<(ConceptRecord, f32)>> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let results = table
            .query()
            .nearest_to(query)?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .context("concept vector search failed")?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        Ok(extract_with_distance(&batches))
    }

    pub async fn by_kind(&self, kind: ConceptKind, limit: usize, offset: usize) -> Result<Vec<ConceptRecord>> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let predicate = format!("kind = '{}'", kind.as_str());
        let results = table.query().only_if(predicate).execute().await.context("concept scan failed")?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        let mut all = extract(&batches);
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    pub async fn all(&self) -> Result<Vec<ConceptRecord>> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let results = table.query().execute().await.context("concept scan failed")?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        Ok(extract(&batches))
    }

    pub async fn count(&self) -> Result<usize> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        Ok(table.count_rows(None).await?)
    }
}

fn extract(batches: &[RecordBatch]) -> Vec<ConceptRecord> {
    extract_with_distance(batches).into_iter().map(|(r, _)| r).collect()
}

fn extract_with_distance(batches: &[RecordBatch]) -> Vec<(ConceptRecord, f32)> {
    let mut out = Vec::new();
    for batch in batches {
        let ids = batch.column_by_name("id").and_then(|c| c.as_any().downcast_ref::<Int64Array>());
        let names = batch.column_by_name("name").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let kinds = batch.column_by_name("kind").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let doc_counts = batch.column_by_name("document_count").and_then(|c| c.as_any().downcast_ref::<UInt32Array>());
        let chunk_counts = batch.column_by_name("chunk_count").and_then(|c| c.as_any().downcast_ref::<UInt32Array>());
        let catalog_ids_json = batch.column_by_name("catalog_ids_json").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let related_json = batch.column_by_name("related_concepts_json").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let synonyms_json = batch.column_by_name("synonyms_json").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let broader_json = batch.column_by_name("broader_terms_json").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let narrower_json = batch.column_by_name("narrower_terms_json").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let weights = batch.column_by_name("weight").and_then(|c| c.as_any().downcast_ref::<Int64Array>());
        let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let (Some(ids), Some(names)) = (ids, names) else { continue };

        for i in 0..batch.num_rows() {
            let name = names.value(i).to_string();
            if name.is_empty() {
                continue;
            }
            let record = ConceptRecord {
                id: ids.value(i) as u64,
                name: name.clone(),
                kind: kinds.map(|k| ConceptKind::parse_str(k.value(i))).unwrap_or(ConceptKind::Related),
                document_count: doc_counts.map(|d| d.value(i)).unwrap_or(0),
                chunk_count: chunk_counts.map(|c| c.value(i)).unwrap_or(0),
                catalog_ids: catalog_ids_json.map(|c| parse_json_or_default(c.value(i), &name)).unwrap_or_default(),
                related_concepts: related_json.map(|c| parse_json_or_default(c.value(i), &name)).unwrap_or_default(),
                synonyms: synonyms_json.map(|c| parse_json_or_default(c.value(i), &name)).unwrap_or_default(),
                broader_terms: broader_json.map(|c| parse_json_or_default(c.value(i), &name)).unwrap_or_default(),
                narrower_terms: narrower_json.map(|c| parse_json_or_default(c.value(i), &name)).unwrap_or_default(),
                embedding: vec![],
                weight: weights.map(|w| w.value(i) as u64).unwrap_or(0),
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

    async fn table() -> ConceptTable {
        let dir = tempfile::tempdir().unwrap();
        let db = lancedb::connect(dir.path().to_str().unwrap()).execute().await.unwrap();
        let t = ConceptTable::open_or_create(db, 8).await.unwrap();
        std::mem::forget(dir);
        t
    }

    fn record(name: &str, kind: ConceptKind) -> ConceptRecord {
        ConceptRecord {
            id: crate::types::stable_id(name),
            name: name.to_string(),
            kind,
            document_count: 2,
            chunk_count: 3,
            catalog_ids: vec![1, 2],
            related_concepts: vec!["http".into()],
            synonyms: vec!["api".into()],
            broader_terms: vec![],
            narrower_terms: vec![],
            embedding: vec![0.3; 8],
            weight: 5,
        }
    }

    #[tokio::test]
    async fn replace_all_then_find_by_name_round_trips() {
        let t = table().await;
        t.replace_all(vec![record("rest", ConceptKind::Thematic)]).await.unwrap();
        let found = t.find_by_name("rest").await.unwrap().unwrap();
        assert_eq!(found.document_count, 2);
        assert_eq!(found.related_concepts, vec!["http".to_string()]);
    }

    #[tokio::test]
    async fn replace_all_drops_previous_contents() {
        let t = table().await;
        t.replace_all(vec![record("rest", ConceptKind::Thematic)]).await.unwrap();
        t.replace_all(vec![record("graphql", ConceptKind::Thematic)]).await.unwrap();
        assert!(t.find_by_name("rest").await.unwrap().is_none());
        assert!(t.find_by_name("graphql").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn by_kind_filters_and_sorts_by_name() {
        let t = table().await;
        t.replace_all(vec![
            record("zeta", ConceptKind::Thematic),
            record("alpha", ConceptKind::Thematic),
            record("term", ConceptKind::Terminology),
        ])
        .await
        .unwrap();
        let thematic = t.by_kind(ConceptKind::Thematic, 10, 0).await.unwrap();
        assert_eq!(thematic.iter().map(|c| c.name.clone()).collect::<Vec<_>>(), vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
