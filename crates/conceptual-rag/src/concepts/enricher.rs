//! Concept Enricher — spec §4.5.

use crate::lexical_network::LexicalNetwork;
use crate::types::ConceptRecord;

pub struct ConceptEnricher {
    max_synonyms: usize,
    max_broader_terms: usize,
    max_narrower_terms: usize,
}

impl ConceptEnricher {
    pub fn new(max_synonyms: usize, max_broader_terms: usize, max_narrower_terms: usize) -> Self {
        Self {
            max_synonyms,
            max_broader_terms,
            max_narrower_terms,
        }
    }

    /// Enrich a batch of concept records in place. Per-concept lookup
    /// failures leave that record unchanged and never abort the batch.
    /// Triggers a cache flush on the lexical network at the end.
    pub async fn enrich_batch(&self, network: &dyn LexicalNetwork, concepts: &mut [ConceptRecord]) {
        for concept in concepts.iter_mut() {
            match network.lookup(&concept.name).await {
                Ok(relations) => {
                    concept.synonyms = relations.synonyms.into_iter().take(self.max_synonyms).collect();
                    concept.broader_terms = relations
                        .broader_terms
                        .into_iter()
                        .take(self.max_broader_terms)
                        .collect();
                    concept.narrower_terms = relations
                        .narrower_terms
                        .into_iter()
                        .take(self.max_narrower_terms)
                        .collect();
                }
                Err(e) => {
                    tracing::warn!(concept = %concept.name, error = %e, "lexical-network lookup failed, leaving concept unenriched");
                }
            }
        }
        network.flush_cache().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical_network::LexicalRelations;
    use crate::types::{ConceptKind, ConceptRecord};
    use async_trait::async_trait;

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
            embedding: vec![],
            weight: 2,
        }
    }

    struct FlakyNetwork;
    #[async_trait]
    impl LexicalNetwork for FlakyNetwork {
        async fn lookup(&self, term: &str) -> anyhow::Result<LexicalRelations> {
            if term == "fails" {
                return Err(anyhow::anyhow!("timeout"));
            }
            Ok(LexicalRelations {
                synonyms: vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into(), "f".into()],
                broader_terms: vec!["x".into(), "y".into(), "z".into(), "w".into()],
                narrower_terms: vec![],
            })
        }
    }

    #[tokio::test]
    async fn enriches_and_caps_each_relation_list() {
        let enricher = ConceptEnricher::new(5, 3, 5);
        let mut concepts = vec![record("rest")];
        enricher.enrich_batch(&FlakyNetwork, &mut concepts).await;
        assert_eq!(concepts[0].synonyms.len(), 5);
        assert_eq!(concepts[0].broader_terms.len(), 3);
    }

    #[tokio::test]
    async fn failed_lookup_leaves_record_unchanged_and_continues_batch() {
        let enricher = ConceptEnricher::new(5, 3, 5);
        let mut concepts = vec![record("fails"), record("rest")];
        enricher.enrich_batch(&FlakyNetwork, &mut concepts).await;
        assert!(concepts[0].synonyms.is_empty());
        assert_eq!(concepts[1].synonyms.len(), 5);
    }
}
