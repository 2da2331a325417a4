//! Search Orchestrator — spec §2, §4.10.
//!
//! Implements the five public search operations plus the two
//! category-browsing operations on top of the repositories and the hybrid
//! scorer. This is the only layer that speaks `EngineError`/`EngineResult`;
//! everything beneath it keeps using `anyhow` the way the teacher's
//! `storage/` and `search/` modules do.

use std::sync::Arc;

use crate::config::RagConfig;
use crate::embeddings::EmbeddingModel;
use crate::error::{EngineError, EngineResult};
use crate::lexical_network::LexicalNetwork;
use crate::query::QueryExpander;
use crate::repository::chunks::ScopedChunkRepository;
use crate::repository::{CatalogRepository, ChunkRepository, ConceptRepository};
use crate::search::{hybrid_search, HybridParams, Signals};
use crate::types::ConceptKind;

pub struct SearchOrchestrator {
    catalog: CatalogRepository,
    chunks: Arc<crate::storage::ChunkTable>,
    chunk_repo: ChunkRepository,
    concepts: ConceptRepository,
    embedder: Arc<dyn EmbeddingModel>,
    lexical_network: Arc<dyn LexicalNetwork>,
    expander: QueryExpander,
    hybrid_params: HybridParams,
}

#[derive(Debug, Clone)]
pub struct SearchSignals {
    pub vec: f32,
    pub bm25: f32,
    pub concept: f32,
    pub wordnet: f32,
    pub title: f32,
}

impl From<Signals> for SearchSignals {
    fn from(s: Signals) -> Self {
        Self { vec: s.vec, bm25: s.bm25, concept: s.concept, wordnet: s.wordnet, title: s.title }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogSearchHit {
    pub source_path: String,
    pub title: String,
    pub preview: String,
    pub score: f32,
    pub signals: SearchSignals,
    pub matched_concepts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChunkSearchHit {
    pub source_path: String,
    pub text: String,
    pub score: f32,
    pub signals: SearchSignals,
    pub matched_concepts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConceptMembershipHit {
    pub source_path: String,
    pub text: String,
    pub concepts: Vec<String>,
    pub concept_density: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ConceptExtraction {
    pub source_path: String,
    pub primary_concepts: Vec<String>,
    pub technical_terms: Vec<String>,
    pub related_concepts: Vec<String>,
    pub categories: Vec<String>,
    pub summary: String,
}

const PREVIEW_CHARS: usize = 240;

/// Constructs a `SearchOrchestrator` from the three storage tables, each
/// shared behind an `Arc` so catalog/chunk/concept repositories can be
/// constructed independently while pointing at the same underlying table.
pub fn build_orchestrator(
    catalog_table: Arc<crate::storage::CatalogTable>,
    chunk_table: Arc<crate::storage::ChunkTable>,
    concept_table: Arc<crate::storage::ConceptTable>,
    embedder: Arc<dyn EmbeddingModel>,
    lexical_network: Arc<dyn LexicalNetwork>,
    config: &RagConfig,
) -> SearchOrchestrator {
    SearchOrchestrator {
        catalog: CatalogRepository::new(catalog_table),
        chunks: chunk_table.clone(),
        chunk_repo: ChunkRepository::new(chunk_table),
        concepts: ConceptRepository::new(concept_table, config.concepts.fuzzy_match_threshold),
        embedder,
        lexical_network,
        expander: QueryExpander::new(config.search.expansion_concept_k, 4),
        hybrid_params: HybridParams {
            bm25: crate::search::Bm25Params { k1: config.search.bm25_k1, b: config.search.bm25_b },
            weight_vector: config.search.weight_vector,
            weight_bm25: config.search.weight_bm25,
            weight_concept: config.search.weight_concept,
            weight_wordnet: config.search.weight_wordnet,
            title_boost: config.search.title_boost,
            overfetch_factor: config.search.overfetch_factor,
        },
    }
}

impl SearchOrchestrator {
    async fn expand(&self, query: &str) -> crate::query::ExpandedQuery {
        self.expander.expand(query, self.embedder.as_ref(), &self.concepts, self.lexical_network.as_ref()).await
    }

    fn embed_query(&self, query: &str) -> EngineResult<Vec<f32>> {
        self.embedder.embed_query(query).map_err(|e| EngineError::InvalidEmbedding(e.to_string()))
    }

    /// `catalog_search(query, limit=5)` — hybrid search against the catalog
    /// collection; title boost active.
    pub async fn catalog_search(&self, query: &str, limit: usize) -> EngineResult<Vec<CatalogSearchHit>> {
        let embedding = self.embed_query(query)?;
        let expanded = self.expand(query).await;
        let hits = hybrid_search(&self.catalog, &embedding, &expanded, &self.hybrid_params, limit)
            .await
            .map_err(|e| EngineError::Search(e.to_string()))?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let matched_concepts: Vec<String> =
                    hit.row.concepts.primary_concepts.iter().filter(|c| expanded.all_terms.contains(c)).cloned().collect();
                CatalogSearchHit {
                    source_path: hit.row.source_path,
                    title: hit.row.title,
                    preview: truncate_chars(&hit.row.summary, PREVIEW_CHARS),
                    score: hit.score,
                    signals: hit.signals.into(),
                    matched_concepts,
                }
            })
            .collect())
    }

    /// `concept_search(concept, limit=10)` — membership query, not hybrid.
    /// An unknown concept yields an empty result set, not an error.
    pub async fn concept_search(&self, concept: &str, limit: usize) -> EngineResult<Vec<ConceptMembershipHit>> {
        let found = self.concepts.find_matching(concept).await.map_err(EngineError::Repository)?;
        if found.is_empty() {
            return Ok(vec![]);
        }

        let names: Vec<String> = found.iter().map(|c| c.name.clone()).collect();
        let embedding = found[0].embedding.clone();
        let chunks = self.chunk_repo.by_any_concept(&names, &embedding).await.map_err(EngineError::Repository)?;

        Ok(chunks
            .into_iter()
            .take(limit)
            .map(|c| ConceptMembershipHit {
                source_path: c.source_path,
                text: c.text,
                concepts: c.concepts,
                concept_density: c.concept_density,
            })
            .collect())
    }

    /// `broad_chunks_search(query, limit=10)` — hybrid search against the
    /// chunks collection; no title boost.
    pub async fn broad_chunks_search(&self, query: &str, limit: usize) -> EngineResult<Vec<ChunkSearchHit>> {
        let embedding = self.embed_query(query)?;
        let expanded = self.expand(query).await;
        let hits = hybrid_search(&self.chunk_repo, &embedding, &expanded, &self.hybrid_params, limit)
            .await
            .map_err(|e| EngineError::Search(e.to_string()))?;
        Ok(hits.into_iter().map(|hit| chunk_hit(hit, &expanded)).collect())
    }

    /// `chunks_search(query, source_path, limit=5)` — hybrid search
    /// restricted to rows whose `source_path` equals the given value.
    pub async fn chunks_search(&self, query: &str, source_path: &str, limit: usize) -> EngineResult<Vec<ChunkSearchHit>> {
        let embedding = self.embed_query(query)?;
        let expanded = self.expand(query).await;
        let scoped = ScopedChunkRepository::new(self.chunks.clone(), source_path.to_string());
        let hits = hybrid_search(&scoped, &embedding, &expanded, &self.hybrid_params, limit)
            .await
            .map_err(|e| EngineError::Search(e.to_string()))?;
        Ok(hits.into_iter().map(|hit| chunk_hit(hit, &expanded)).collect())
    }

    /// `extract_concepts(document_query)` — catalog lookup by title/source,
    /// returns the document's concept blob. Not a search op; exposed for
    /// completeness because it shares the catalog repository.
    pub async fn extract_concepts(&self, document_query: &str) -> EngineResult<ConceptExtraction> {
        let record = self
            .catalog
            .find_by_title_or_source(document_query)
            .await
            .map_err(EngineError::Repository)?
            .ok_or_else(|| EngineError::Search(format!("no catalog entry matching '{document_query}'")))?;

        Ok(ConceptExtraction {
            source_path: record.source_path,
            primary_concepts: record.concepts.primary_concepts,
            technical_terms: record.concepts.technical_terms,
            related_concepts: record.concepts.related_concepts,
            categories: record.concepts.categories,
            summary: record.summary,
        })
    }

    /// Category-browsing operation: paginated scan of concept-table entries
    /// tagged as categories.
    pub async fn list_categories(&self, limit: usize, offset: usize) -> EngineResult<Vec<String>> {
        let categories =
            self.concepts.by_kind(ConceptKind::Category, limit, offset).await.map_err(EngineError::Repository)?;
        Ok(categories.into_iter().map(|c| c.name).collect())
    }

    /// Category-browsing operation: paginated scan of catalog entries
    /// declaring the given category.
    pub async fn browse_by_category(&self, category: &str, limit: usize, offset: usize) -> EngineResult<Vec<String>> {
        let mut matches: Vec<String> = self
            .catalog
            .find_all_by_category(category)
            .await
            .map_err(EngineError::Repository)?
            .into_iter()
            .map(|r| r.source_path)
            .collect();
        matches.sort();
        Ok(matches.into_iter().skip(offset).take(limit).collect())
    }
}

fn chunk_hit(hit: crate::search::HybridHit<crate::types::ChunkRecordV2>, expanded: &crate::query::ExpandedQuery) -> ChunkSearchHit {
    let matched_concepts: Vec<String> = hit.row.concepts.iter().filter(|c| expanded.all_terms.contains(c)).cloned().collect();
    ChunkSearchHit {
        source_path: hit.row.source_path,
        text: hit.row.text,
        score: hit.score,
        signals: hit.signals.into(),
        matched_concepts,
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::hash_embed::HashEmbedder;
    use crate::lexical_network::NullLexicalNetwork;
    use crate::storage::{CatalogTable, ChunkTable, ConceptTable};
    use crate::types::ConceptBlob;

    async fn orchestrator() -> (SearchOrchestrator, Arc<CatalogTable>, Arc<ChunkTable>) {
        let dir = tempfile::tempdir().unwrap();
        let db = lancedb::connect(dir.path().to_str().unwrap()).execute().await.unwrap();
        let catalog = Arc::new(CatalogTable::open_or_create(db.clone(), 8).await.unwrap());
        let chunks = Arc::new(ChunkTable::open_or_create(db.clone(), 8).await.unwrap());
        let concepts = Arc::new(ConceptTable::open_or_create(db, 8).await.unwrap());
        std::mem::forget(dir);

        let config = RagConfig { embedding: crate::config::EmbeddingConfig { dimension: 8, ..RagConfig::default().embedding }, ..RagConfig::default() };
        let embedder: Arc<dyn EmbeddingModel> = Arc::new(HashEmbedder::new(8));
        let lexical_network: Arc<dyn LexicalNetwork> = Arc::new(NullLexicalNetwork);
        let orch = build_orchestrator(catalog.clone(), chunks.clone(), concepts, embedder, lexical_network, &config);
        (orch, catalog, chunks)
    }

    fn catalog_record(id: u64, title: &str, source: &str, summary: &str) -> crate::types::CatalogRecord {
        crate::types::CatalogRecord {
            id,
            source_path: source.to_string(),
            content_hash: format!("hash{id}"),
            summary: summary.to_string(),
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
    async fn concept_search_on_unmatched_concept_returns_empty_not_error() {
        let (orch, _catalog, _chunks) = orchestrator().await;
        let result = orch.concept_search("nonexistent concept", 10).await;
        assert!(result.is_ok());
        assert!(result.unwrap().is_empty());
    }

    #[tokio::test]
    async fn catalog_search_ranks_title_match_first_through_public_entry_point() {
        let (orch, catalog, _chunks) = orchestrator().await;
        catalog
            .append(vec![
                catalog_record(1, "Clean Architecture", "books/ca.txt", "a book about layering software systems"),
                catalog_record(2, "Unrelated", "books/u.txt", "totally unrelated content about gardening"),
            ])
            .await
            .unwrap();

        let hits = orch.catalog_search("clean architecture", 5).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].title, "Clean Architecture");
        assert!(hits[0].signals.title > 0.0);
    }

    #[tokio::test]
    async fn ingest_documents_on_already_ingested_corpus_is_a_zero_op() {
        use crate::ingest::IngestionPipeline;
        use crate::types::{DocumentSource, PageRecord};

        let dir = tempfile::tempdir().unwrap();
        let db = lancedb::connect(dir.path().to_str().unwrap()).execute().await.unwrap();
        let catalog = Arc::new(CatalogTable::open_or_create(db.clone(), 8).await.unwrap());
        let chunk_table = Arc::new(ChunkTable::open_or_create(db.clone(), 8).await.unwrap());
        let concept_table = Arc::new(ConceptTable::open_or_create(db, 8).await.unwrap());
        std::mem::forget(dir);

        let config = RagConfig { embedding: crate::config::EmbeddingConfig { dimension: 8, ..RagConfig::default().embedding }, ..RagConfig::default() };
        let embedder: Arc<dyn EmbeddingModel> = Arc::new(HashEmbedder::new(8));
        let lexical_network: Arc<dyn LexicalNetwork> = Arc::new(NullLexicalNetwork);
        let pipeline = IngestionPipeline::new(catalog, chunk_table, concept_table, embedder, lexical_network, &config);

        let doc = DocumentSource {
            source_path: "books/a.txt".to_string(),
            content_hash: "samehash".to_string(),
            records: vec![PageRecord { page_index: 0, text: "some content about rest apis".to_string() }],
        };

        let first = pipeline.ingest_documents(vec![doc.clone()], None).await.unwrap();
        assert_eq!(first.documents_ingested, 1);
        assert_eq!(first.documents_skipped_unchanged, 0);

        let second = pipeline.ingest_documents(vec![doc], None).await.unwrap();
        assert_eq!(second.documents_ingested, 0);
        assert_eq!(second.documents_skipped_unchanged, 1);
        assert_eq!(second.chunks_written, 0);
    }
}
