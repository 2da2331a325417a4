//! Concept-Chunk Matcher — spec §4.4.

use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::types::ConceptBlob;

#[derive(Debug, Clone, Default)]
pub struct MatchedChunk {
    pub concepts: Vec<String>,
    pub concept_categories: Vec<String>,
    pub concept_density: f32,
}

pub struct ConceptChunkMatcher {
    /// Word-set Jaccard threshold for fuzzy multi-word matching.
    fuzzy_threshold: f32,
}

impl ConceptChunkMatcher {
    pub fn new(fuzzy_threshold: f32) -> Self {
        Self { fuzzy_threshold }
    }

    /// Match a document's declared concepts against one chunk's text.
    pub fn match_chunk(&self, chunk_text: &str, blob: &ConceptBlob) -> MatchedChunk {
        let lower_text = chunk_text.to_lowercase();
        let chunk_words: HashSet<&str> = lower_text.split_whitespace().collect();

        let mut matched = Vec::new();
        let mut seen = HashSet::new();

        for concept in blob.all_names() {
            if is_pure_punctuation(&concept) {
                continue;
            }
            if self.matches(&concept, &lower_text, &chunk_words) && seen.insert(concept.clone()) {
                matched.push(concept);
            }
        }

        let concept_categories = if matched.is_empty() {
            Vec::new()
        } else {
            let primary_set: HashSet<&String> = blob.primary_concepts.iter().collect();
            let has_primary_match = matched.iter().any(|c| primary_set.contains(c));
            if has_primary_match {
                blob.categories.clone()
            } else {
                Vec::new()
            }
        };

        let concept_density = if matched.is_empty() {
            0.0
        } else {
            let divisor = expected_density_divisor(chunk_text.len());
            (matched.len() as f32 / divisor.max(1.0)).min(1.0)
        };

        MatchedChunk {
            concepts: matched,
            concept_categories,
            concept_density,
        }
    }

    fn matches(&self, concept: &str, lower_text: &str, chunk_words: &HashSet<&str>) -> bool {
        if word_bounded_contains(lower_text, concept) {
            return true;
        }

        let concept_words: Vec<&str> = concept.split_whitespace().collect();
        if concept_words.len() < 2 {
            return false;
        }

        let concept_word_set: HashSet<&str> = concept_words.iter().copied().collect();
        let present = concept_word_set.intersection(chunk_words).count();
        let coverage = present as f32 / concept_word_set.len() as f32;
        coverage >= self.fuzzy_threshold
    }

    /// Collection-level statistics over already-matched chunks.
    pub fn collection_stats<'a>(&self, chunks: impl IntoIterator<Item = &'a MatchedChunk>) -> ConceptStats {
        let mut total_chunks = 0usize;
        let mut chunks_with_concepts = 0usize;
        let mut total_concepts = 0usize;
        let mut concept_chunk_counts: HashMap<String, usize> = HashMap::new();

        for chunk in chunks {
            total_chunks += 1;
            if !chunk.concepts.is_empty() {
                chunks_with_concepts += 1;
                total_concepts += chunk.concepts.len();
                for c in &chunk.concepts {
                    *concept_chunk_counts.entry(c.clone()).or_insert(0) += 1;
                }
            }
        }

        let avg_concepts_per_chunk = if total_chunks == 0 {
            0.0
        } else {
            total_concepts as f32 / total_chunks as f32
        };

        let mut top_concepts: Vec<(String, usize)> = concept_chunk_counts.into_iter().collect();
        top_concepts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_concepts.truncate(10);

        ConceptStats {
            total_chunks,
            chunks_with_concepts,
            avg_concepts_per_chunk,
            top_concepts,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConceptStats {
    pub total_chunks: usize,
    pub chunks_with_concepts: usize,
    pub avg_concepts_per_chunk: f32,
    pub top_concepts: Vec<(String, usize)>,
}

fn is_pure_punctuation(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| !c.is_alphanumeric())
}

/// Case-insensitive word-bounded substring match; `needle` is regex-escaped.
fn word_bounded_contains(haystack_lower: &str, needle_lower: &str) -> bool {
    let escaped = regex::escape(needle_lower);
    let pattern = format!(r"(?:^|[^\p{{L}}\p{{N}}]){}(?:[^\p{{L}}\p{{N}}]|$)", escaped);
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(haystack_lower),
        Err(_) => haystack_lower.contains(needle_lower),
    }
}

/// Monotone-in-length divisor for the density formula: short chunks need
/// fewer matched concepts to saturate, long chunks need more.
fn expected_density_divisor(chunk_len: usize) -> f32 {
    (chunk_len as f32 / 100.0).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(primary: &[&str], technical: &[&str], related: &[&str], categories: &[&str]) -> ConceptBlob {
        ConceptBlob {
            primary_concepts: primary.iter().map(|s| s.to_string()).collect(),
            technical_terms: technical.iter().map(|s| s.to_string()).collect(),
            related_concepts: related.iter().map(|s| s.to_string()).collect(),
            categories: categories.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn direct_word_bounded_match() {
        let matcher = ConceptChunkMatcher::new(0.6);
        let blob = blob(&["rest"], &[], &[], &["web"]);
        let result = matcher.match_chunk("This chapter is about REST architecture.", &blob);
        assert_eq!(result.concepts, vec!["rest".to_string()]);
        assert!(result.concept_density > 0.0);
    }

    #[test]
    fn substring_inside_another_word_does_not_match() {
        let matcher = ConceptChunkMatcher::new(0.6);
        let blob = blob(&["rest"], &[], &[], &[]);
        let result = matcher.match_chunk("The system is at restful equilibrium.", &blob);
        assert!(result.concepts.is_empty());
        assert_eq!(result.concept_density, 0.0);
    }

    #[test]
    fn fuzzy_multiword_match_above_jaccard_threshold() {
        let matcher = ConceptChunkMatcher::new(0.6);
        let blob = blob(&["dependency injection pattern"], &[], &[], &[]);
        let result = matcher.match_chunk("we discuss the dependency injection approach here", &blob);
        assert_eq!(result.concepts, vec!["dependency injection pattern".to_string()]);
    }

    #[test]
    fn pure_punctuation_concept_never_matches() {
        let matcher = ConceptChunkMatcher::new(0.6);
        let blob = blob(&["---"], &[], &[], &[]);
        let result = matcher.match_chunk("a --- b --- c", &blob);
        assert!(result.concepts.is_empty());
    }

    #[test]
    fn no_match_yields_empty_categories_and_zero_density() {
        let matcher = ConceptChunkMatcher::new(0.6);
        let blob = blob(&["graphql"], &[], &[], &["api"]);
        let result = matcher.match_chunk("nothing relevant here", &blob);
        assert!(result.concept_categories.is_empty());
        assert_eq!(result.concept_density, 0.0);
    }

    #[test]
    fn categories_only_surface_with_primary_tier_match() {
        let matcher = ConceptChunkMatcher::new(0.6);
        let blob = blob(&[], &["graphql"], &[], &["api"]);
        let result = matcher.match_chunk("graphql is used here", &blob);
        assert!(!result.concepts.is_empty());
        assert!(result.concept_categories.is_empty());
    }

    #[test]
    fn collection_stats_reports_top_concepts_and_averages() {
        let matcher = ConceptChunkMatcher::new(0.6);
        let chunks = [
            MatchedChunk { concepts: vec!["a".into(), "b".into()], concept_categories: vec![], concept_density: 0.5 },
            MatchedChunk { concepts: vec!["a".into()], concept_categories: vec![], concept_density: 0.3 },
            MatchedChunk { concepts: vec![], concept_categories: vec![], concept_density: 0.0 },
        ];
        let stats = matcher.collection_stats(chunks.iter());
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.chunks_with_concepts, 2);
        assert_eq!(stats.top_concepts[0], ("a".to_string(), 2));
    }
}
