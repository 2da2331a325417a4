//! Storage Adapter — spec §4.10, §6. Three LanceDB tables (catalog, chunks,
//! concepts) sharing one connection, with JSON-typed columns for the
//! structured fields tolerant of null/missing on read.

mod arrow_util;
mod catalog_table;
mod chunk_table;
mod concept_table;

pub use catalog_table::CatalogTable;
pub use chunk_table::ChunkTable;
pub use concept_table::ConceptTable;

use anyhow::Result;

pub struct LanceStore {
    pub catalog: CatalogTable,
    pub chunks: ChunkTable,
    pub concepts: ConceptTable,
}

impl LanceStore {
    pub async fn open(path: &str, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(path).ok();
        let db = lancedb::connect(path).execute().await?;
        let catalog = CatalogTable::open_or_create(db.clone(), dimension).await?;
        let chunks = ChunkTable::open_or_create(db.clone(), dimension).await?;
        let concepts = ConceptTable::open_or_create(db, dimension).await?;
        Ok(Self { catalog, chunks, concepts })
    }
}
