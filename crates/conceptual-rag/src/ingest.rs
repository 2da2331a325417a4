//! Ingestion pipeline — spec §2 control flow: Document Set → Chunker →
//! (Concept Extractor ‖ Embedding Service) → Concept-Chunk Matcher →
//! Concept Enricher → Concept Index Builder → Storage Adapter.
//!
//! Glues the already-isolated components together; each stage itself is
//! tested in its own module, so tests here cover the wiring, not the
//! per-stage logic.

use std::sync::Arc;

use crate::concepts::coordinator::{ExtractionCoordinator, RateLimiter, RetryPolicy};
use crate::concepts::enricher::ConceptEnricher;
use crate::concepts::extractor::ConceptExtractor;
use crate::concepts::index_builder::ConceptIndexBuilder;
use crate::concepts::matcher::ConceptChunkMatcher;
use crate::config::RagConfig;
use crate::embeddings::EmbeddingModel;
use crate::lexical_network::LexicalNetwork;
use crate::llm::{GenerationConfig, LLMProvider};
use crate::processing::chunker::TextChunker;
use crate::repository::{CatalogRepository, ChunkRepository, ConceptRepository};
use crate::types::{CatalogRecord, ChunkRecordV2, ConceptBlob, DocumentSource};

const SUMMARY_CHARS: usize = 500;

#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub documents_ingested: usize,
    pub documents_skipped_unchanged: usize,
    pub chunks_written: usize,
    pub concepts_indexed: usize,
    pub extraction_errors: Vec<String>,
}

pub struct IngestionPipeline {
    catalog: CatalogRepository,
    chunks: ChunkRepository,
    concepts: ConceptRepository,
    chunker: TextChunker,
    extractor: Arc<ConceptExtractor>,
    matcher: ConceptChunkMatcher,
    enricher: ConceptEnricher,
    index_builder: ConceptIndexBuilder,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    max_concurrency: usize,
    embedder: Arc<dyn EmbeddingModel>,
    lexical_network: Arc<dyn LexicalNetwork>,
}

impl IngestionPipeline {
    pub fn new(
        catalog_table: Arc<crate::storage::CatalogTable>,
        chunk_table: Arc<crate::storage::ChunkTable>,
        concept_table: Arc<crate::storage::ConceptTable>,
        embedder: Arc<dyn EmbeddingModel>,
        lexical_network: Arc<dyn LexicalNetwork>,
        config: &RagConfig,
    ) -> Self {
        Self {
            catalog: CatalogRepository::new(catalog_table),
            chunks: ChunkRepository::new(chunk_table),
            concepts: ConceptRepository::new(concept_table, config.concepts.fuzzy_match_threshold),
            chunker: TextChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap, config.chunking.min_chunk_size),
            extractor: Arc::new(ConceptExtractor::new(config.concepts.short_doc_char_threshold)),
            matcher: ConceptChunkMatcher::new(config.concepts.fuzzy_match_threshold),
            enricher: ConceptEnricher::new(config.concepts.max_synonyms, config.concepts.max_broader_terms, config.concepts.max_narrower_terms),
            index_builder: ConceptIndexBuilder::new(config.concepts.max_related_concepts),
            rate_limiter: Arc::new(RateLimiter::new(std::time::Duration::from_millis(config.coordinator.min_interval_ms))),
            retry: RetryPolicy {
                max_retries: config.coordinator.max_retries,
                backoff_base_ms: config.coordinator.backoff_base_ms,
                backoff_cap_ms: config.coordinator.backoff_cap_ms,
            },
            max_concurrency: config.coordinator.max_concurrency,
            embedder,
            lexical_network,
        }
    }

    /// Ingest a batch of documents: skip unchanged content hashes, extract
    /// concepts through the bounded-concurrency coordinator, chunk, match,
    /// embed, persist catalog/chunk rows, then rebuild the full concept
    /// index (the only path that prunes concepts orphaned by this batch).
    pub async fn ingest_documents(&self, documents: Vec<DocumentSource>, llm: Option<Arc<dyn LLMProvider>>) -> anyhow::Result<IngestSummary> {
        let mut summary = IngestSummary::default();
        let mut fresh = Vec::new();
        for doc in documents {
            if self.catalog.find_by_content_hash(&doc.content_hash).await?.is_some() {
                summary.documents_skipped_unchanged += 1;
                continue;
            }
            fresh.push(doc);
        }
        if fresh.is_empty() {
            return Ok(summary);
        }

        let extraction_blobs: std::collections::HashMap<String, ConceptBlob> = match llm {
            Some(provider) => {
                let coordinator = ExtractionCoordinator::new(
                    self.extractor.clone(),
                    self.rate_limiter.clone(),
                    RetryPolicy { max_retries: self.retry.max_retries, backoff_base_ms: self.retry.backoff_base_ms, backoff_cap_ms: self.retry.backoff_cap_ms },
                    self.max_concurrency,
                );
                let outcomes = coordinator
                    .run::<fn(usize, usize, &str)>(
                        provider,
                        GenerationConfig::default(),
                        fresh.clone(),
                        Arc::new(std::sync::atomic::AtomicBool::new(false)),
                        None,
                    )
                    .await;
                outcomes
                    .into_iter()
                    .map(|o| {
                        if let Some(err) = &o.error {
                            summary.extraction_errors.push(format!("{}: {err}", o.source));
                        }
                        (o.content_hash, o.concepts.unwrap_or_default())
                    })
                    .collect()
            }
            None => std::collections::HashMap::new(),
        };

        let mut new_catalog = Vec::new();
        let mut new_chunks = Vec::new();

        for doc in &fresh {
            let blob = extraction_blobs.get(&doc.content_hash).cloned().unwrap_or_default();
            let full_text = doc.full_text();
            let summary_text = truncate_chars(&full_text, SUMMARY_CHARS);

            let chunk_results = self.chunker.chunk_document(doc);
            for chunk in &chunk_results {
                let matched = self.matcher.match_chunk(&chunk.text, &blob);
                new_chunks.push(ChunkRecordV2 {
                    id: ChunkRecordV2::new_id(&doc.content_hash, chunk.start_offset),
                    source_path: doc.source_path.clone(),
                    content_hash: doc.content_hash.clone(),
                    text: chunk.text.clone(),
                    concepts: matched.concepts,
                    concept_categories: matched.concept_categories,
                    concept_density: matched.concept_density,
                    embedding: self.embedder.embed_document(&chunk.text).unwrap_or_default(),
                });
            }

            new_catalog.push(CatalogRecord {
                id: CatalogRecord::new_id(&doc.content_hash),
                source_path: doc.source_path.clone(),
                content_hash: doc.content_hash.clone(),
                summary: summary_text.clone(),
                concepts: blob,
                title: String::new(),
                author: String::new(),
                year: String::new(),
                publisher: String::new(),
                isbn: String::new(),
                embedding: self.embedder.embed_document(&summary_text).unwrap_or_default(),
            });
        }

        summary.documents_ingested = new_catalog.len();
        summary.chunks_written = new_chunks.len();

        self.catalog.append(new_catalog).await?;
        self.chunks.append(new_chunks).await?;

        summary.concepts_indexed = self.rebuild_concept_index().await?;
        Ok(summary)
    }

    /// Rebuild the global concept table from the full catalog and chunk
    /// contents — spec's resolved GC-at-rebuild-only design.
    pub async fn rebuild_concept_index(&self) -> anyhow::Result<usize> {
        let catalog = self.catalog.all().await?;
        let chunks = self.chunks.all().await?;
        let mut records = self.index_builder.rebuild(&catalog, &chunks, self.embedder.as_ref());
        self.enricher.enrich_batch(self.lexical_network.as_ref(), &mut records).await;
        let count = records.len();
        self.concepts.replace_all(records).await?;
        Ok(count)
    }

}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}
