use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub data_dir: PathBuf,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub search: SearchConfig,
    pub concepts: ConceptConfig,
    pub coordinator: CoordinatorConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model_dir: PathBuf,
    pub dimension: usize,
    pub use_e5: bool,
    pub cache_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
}

/// Hybrid scoring configuration — spec §4.9. Defaults are the spec's
/// reasonable-starting-point values, all exposed as tunables per the
/// "Open Questions" resolution in SPEC_FULL.md.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_k: usize,
    /// Over-fetch factor `L` applied to vector-knn (spec calls it `L`, e.g. 50).
    pub overfetch_factor: usize,
    pub bm25_k1: f32,
    pub bm25_b: f32,
    pub weight_vector: f32,
    pub weight_bm25: f32,
    pub weight_concept: f32,
    pub weight_wordnet: f32,
    pub title_boost: f32,
    /// Number of nearest concepts fetched during corpus-grounded expansion (`Kc`).
    pub expansion_concept_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptConfig {
    /// Word-set Jaccard threshold for fuzzy multi-word concept matching (§4.4).
    pub fuzzy_match_threshold: f32,
    /// Character threshold `Tshort` above which extraction splits into passes.
    pub short_doc_char_threshold: usize,
    pub max_synonyms: usize,
    pub max_broader_terms: usize,
    pub max_narrower_terms: usize,
    /// `R`: max related concepts retained per concept-table entry.
    pub max_related_concepts: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// `C`: bounded worker concurrency for parallel extraction.
    pub max_concurrency: usize,
    /// `I`: minimum milliseconds between any two outgoing LLM requests.
    pub min_interval_ms: u64,
    pub llm_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key_env: String,
}

impl RagConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be > 0".into());
        }
        if self.chunking.chunk_size < 50 {
            return Err("chunking.chunk_size must be >= 50".into());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err("chunking.chunk_overlap must be < chunk_size".into());
        }
        if self.search.default_k == 0 {
            return Err("search.default_k must be > 0".into());
        }
        if self.search.overfetch_factor == 0 {
            return Err("search.overfetch_factor must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.concepts.fuzzy_match_threshold) {
            return Err("concepts.fuzzy_match_threshold must be in [0.0, 1.0]".into());
        }
        if self.coordinator.max_concurrency == 0 {
            return Err("coordinator.max_concurrency must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("conceptual-rag");

        let model_dir = if Path::new("models").exists() {
            PathBuf::from("models")
        } else if let Ok(env_path) = std::env::var("MODEL_PATH") {
            PathBuf::from(env_path)
        } else {
            data_dir.join("models")
        };

        let e5_available = model_dir.join("multilingual-e5-base").exists();
        let dimension = if e5_available { 768 } else { 384 };

        Self {
            data_dir,
            embedding: EmbeddingConfig {
                model_dir,
                dimension,
                use_e5: e5_available,
                cache_size: 1000,
            },
            chunking: ChunkingConfig {
                chunk_size: 500,
                chunk_overlap: 10,
                min_chunk_size: 20,
            },
            search: SearchConfig {
                default_k: 10,
                overfetch_factor: 50,
                bm25_k1: 1.2,
                bm25_b: 0.75,
                weight_vector: 0.45,
                weight_bm25: 0.30,
                weight_concept: 0.20,
                weight_wordnet: 0.05,
                title_boost: 10.0,
                expansion_concept_k: 15,
            },
            concepts: ConceptConfig {
                fuzzy_match_threshold: 0.6,
                short_doc_char_threshold: 400_000,
                max_synonyms: 5,
                max_broader_terms: 3,
                max_narrower_terms: 5,
                max_related_concepts: 10,
            },
            coordinator: CoordinatorConfig {
                max_concurrency: 3,
                min_interval_ms: 100,
                llm_timeout_secs: 120,
                max_retries: 5,
                backoff_base_ms: 1000,
                backoff_cap_ms: 30_000,
            },
            llm: LlmConfig {
                model: "gpt-4o-mini".to_string(),
                api_key_env: "LLM_API_KEY".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(RagConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let mut cfg = RagConfig::default();
        cfg.chunking.chunk_overlap = cfg.chunking.chunk_size;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_fuzzy_threshold() {
        let mut cfg = RagConfig::default();
        cfg.concepts.fuzzy_match_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }
}
