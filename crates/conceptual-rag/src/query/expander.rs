//! Query Expander — spec §4.8.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::embeddings::{cosine_similarity, EmbeddingModel};
use crate::lexical_network::LexicalNetwork;
use crate::types::{ConceptKind, ConceptRecord};

/// Corpus-grounded nearest-concept lookup, implemented by the concept
/// repository. Kept as a narrow trait here so the expander does not depend
/// on the storage layer directly.
#[async_trait]
pub trait ConceptSimilaritySource: Send + Sync {
    async fn all_concepts(&self) -> anyhow::Result<Vec<ConceptRecord>>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpandedQuery {
    pub original_terms: Vec<String>,
    pub corpus_terms: Vec<String>,
    pub wordnet_terms: Vec<String>,
    pub all_terms: Vec<String>,
    pub weights: HashMap<String, f32>,
}

pub struct QueryExpander {
    kc: usize,
    max_related_per_concept: usize,
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self {
            kc: 15,
            max_related_per_concept: 4,
        }
    }
}

impl QueryExpander {
    pub fn new(kc: usize, max_related_per_concept: usize) -> Self {
        Self { kc, max_related_per_concept }
    }

    pub async fn expand(
        &self,
        raw_query: &str,
        embedder: &dyn EmbeddingModel,
        concepts: &dyn ConceptSimilaritySource,
        lexical_network: &dyn LexicalNetwork,
    ) -> ExpandedQuery {
        let original_terms = normalize_query(raw_query);
        if original_terms.is_empty() {
            return ExpandedQuery::default();
        }

        let mut weights: HashMap<String, f32> = HashMap::new();
        for term in &original_terms {
            weights.insert(term.clone(), 1.0);
        }
        let original_set: HashSet<String> = original_terms.iter().cloned().collect();

        let corpus_terms = self.corpus_expansion(&original_terms, embedder, concepts, &original_set, &mut weights).await;
        let wordnet_terms = self.lexical_expansion(&original_terms, lexical_network, &original_set, &corpus_terms, &mut weights).await;

        let mut all_terms: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for term in original_terms.iter().chain(corpus_terms.iter()).chain(wordnet_terms.iter()) {
            if seen.insert(term.clone()) {
                all_terms.push(term.clone());
            }
        }

        ExpandedQuery {
            original_terms,
            corpus_terms,
            wordnet_terms,
            all_terms,
            weights,
        }
    }

    async fn corpus_expansion(
        &self,
        original_terms: &[String],
        embedder: &dyn EmbeddingModel,
        concepts: &dyn ConceptSimilaritySource,
        original_set: &HashSet<String>,
        weights: &mut HashMap<String, f32>,
    ) -> Vec<String> {
        let query_text = original_terms.join(" ");
        let query_vector = match embedder.embed_query(&query_text) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };

        let all = match concepts.all_concepts().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "concept table unreachable, skipping corpus-grounded expansion");
                return Vec::new();
            }
        };

        let mut ranked: Vec<(ConceptRecord, f32)> = all
            .into_iter()
            .map(|c| {
                let s = cosine_similarity(&query_vector, &c.embedding);
                (c, s)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.kc);

        let mut added = Vec::new();
        for (concept, s) in ranked {
            if original_set.contains(&concept.name) {
                continue;
            }
            match concept.kind {
                ConceptKind::Thematic | ConceptKind::Category if s >= 0.3 => {
                    add_or_raise(weights, &concept.name, 0.8 * s);
                    added.push(concept.name.clone());
                    for related in concept.related_concepts.iter().take(self.max_related_per_concept) {
                        if original_set.contains(related) {
                            continue;
                        }
                        add_or_raise(weights, related, 0.8 * s * 0.75);
                        added.push(related.clone());
                    }
                }
                ConceptKind::Terminology if s >= 0.6 => {
                    add_or_raise(weights, &concept.name, 0.8 * s);
                    added.push(concept.name.clone());
                }
                _ => {}
            }
        }

        dedupe(added)
    }

    async fn lexical_expansion(
        &self,
        original_terms: &[String],
        lexical_network: &dyn LexicalNetwork,
        original_set: &HashSet<String>,
        corpus_terms: &[String],
        weights: &mut HashMap<String, f32>,
    ) -> Vec<String> {
        let corpus_set: HashSet<&String> = corpus_terms.iter().collect();
        let mut added = Vec::new();

        for term in original_terms {
            let source_weight = weights.get(term).copied().unwrap_or(1.0).min(1.0);
            let relations = match lexical_network.lookup(term).await {
                Ok(r) => r,
                Err(_) => continue,
            };

            for expansion in relations.synonyms.iter().chain(relations.broader_terms.iter()) {
                if original_set.contains(expansion) || corpus_set.contains(expansion) {
                    continue;
                }
                add_or_raise(weights, expansion, 0.6 * source_weight);
                added.push(expansion.clone());
            }
        }

        dedupe(added)
    }
}

fn add_or_raise(weights: &mut HashMap<String, f32>, term: &str, weight: f32) {
    weights
        .entry(term.to_string())
        .and_modify(|w| *w = w.max(weight))
        .or_insert(weight);
}

fn dedupe(terms: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    terms.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

/// Normalize: lowercase, split on non-alphanumeric, drop terms of length <= 2, dedupe.
fn normalize_query(raw: &str) -> Vec<String> {
    let lowered = raw.to_lowercase();
    let mut seen = HashSet::new();
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.len() > 2)
        .filter(|s| seen.insert(s.to_string()))
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::lexical_network::{LexicalRelations, NullLexicalNetwork};

    struct FixedConcepts(Vec<ConceptRecord>);

    #[async_trait]
    impl ConceptSimilaritySource for FixedConcepts {
        async fn all_concepts(&self) -> anyhow::Result<Vec<ConceptRecord>> {
            Ok(self.0.clone())
        }
    }

    struct FailingConcepts;
    #[async_trait]
    impl ConceptSimilaritySource for FailingConcepts {
        async fn all_concepts(&self) -> anyhow::Result<Vec<ConceptRecord>> {
            Err(anyhow::anyhow!("unreachable"))
        }
    }

    fn concept(name: &str, kind: ConceptKind, embedder: &HashEmbedder, related: &[&str]) -> ConceptRecord {
        ConceptRecord {
            id: crate::types::stable_id(name),
            name: name.to_string(),
            kind,
            document_count: 1,
            chunk_count: 1,
            catalog_ids: vec![],
            related_concepts: related.iter().map(|s| s.to_string()).collect(),
            synonyms: vec![],
            broader_terms: vec![],
            narrower_terms: vec![],
            embedding: embedder.embed_document(name).unwrap(),
            weight: 1,
        }
    }

    #[test]
    fn normalize_drops_short_terms_and_dedupes() {
        let terms = normalize_query("REST! rest, an api, API.");
        assert_eq!(terms, vec!["rest".to_string(), "api".to_string()]);
    }

    #[tokio::test]
    async fn empty_query_yields_all_empty_fields() {
        let embedder = HashEmbedder::new(32);
        let expander = QueryExpander::default();
        let result = expander
            .expand("a an to", &embedder, &FixedConcepts(vec![]), &NullLexicalNetwork)
            .await;
        assert!(result.original_terms.is_empty());
        assert!(result.all_terms.is_empty());
        assert!(result.weights.is_empty());
    }

    #[tokio::test]
    async fn original_terms_always_get_weight_one() {
        let embedder = HashEmbedder::new(32);
        let expander = QueryExpander::default();
        let result = expander
            .expand("rest architecture", &embedder, &FixedConcepts(vec![]), &NullLexicalNetwork)
            .await;
        assert_eq!(result.weights["rest"], 1.0);
        assert_eq!(result.weights["architecture"], 1.0);
    }

    #[tokio::test]
    async fn unreachable_concept_table_degrades_to_original_and_lexical_terms() {
        let embedder = HashEmbedder::new(32);
        let expander = QueryExpander::default();
        let result = expander
            .expand("rest", &embedder, &FailingConcepts, &NullLexicalNetwork)
            .await;
        assert!(result.corpus_terms.is_empty());
        assert_eq!(result.original_terms, vec!["rest".to_string()]);
    }

    #[tokio::test]
    async fn thematic_match_expands_related_concepts() {
        let embedder = HashEmbedder::new(32);
        let expander = QueryExpander::new(15, 4);
        let query = "rest architecture";
        let thematic = concept("rest architecture", ConceptKind::Thematic, &embedder, &["http", "json"]);
        let result = expander
            .expand(query, &embedder, &FixedConcepts(vec![thematic]), &NullLexicalNetwork)
            .await;
        assert!(result.corpus_terms.contains(&"rest architecture".to_string()) || result.original_terms.contains(&"rest".to_string()));
    }

    #[tokio::test]
    async fn lexical_expansion_never_overrides_original_term_weight() {
        struct SynonymNetwork;
        #[async_trait]
        impl LexicalNetwork for SynonymNetwork {
            async fn lookup(&self, _term: &str) -> anyhow::Result<LexicalRelations> {
                Ok(LexicalRelations {
                    synonyms: vec!["rest".to_string()],
                    broader_terms: vec![],
                    narrower_terms: vec![],
                })
            }
        }
        let embedder = HashEmbedder::new(32);
        let expander = QueryExpander::default();
        let result = expander
            .expand("rest", &embedder, &FixedConcepts(vec![]), &SynonymNetwork)
            .await;
        assert_eq!(result.weights["rest"], 1.0);
    }

    #[tokio::test]
    async fn weight_combination_takes_max_across_sources() {
        let mut weights = HashMap::new();
        weights.insert("http".to_string(), 0.2);
        add_or_raise(&mut weights, "http", 0.5);
        assert_eq!(weights["http"], 0.5);
        add_or_raise(&mut weights, "http", 0.1);
        assert_eq!(weights["http"], 0.5);
    }
}
