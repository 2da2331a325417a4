//! Public-surface error taxonomy for the search orchestrator.
//!
//! Internal plumbing (storage, extraction, enrichment) keeps using
//! `anyhow::Result` as the teacher's code does throughout `storage/` and
//! `search/`; only the orchestrator's public operations translate faults
//! into this fixed, user-visible set so no internal context strings or
//! stack traces escape.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("schema validation failed for table '{table}': {reason}")]
    SchemaValidation { table: String, reason: String },

    #[error("database operation failed on table '{table}': {source}")]
    DatabaseOperation {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("concept not found: {0}")]
    ConceptNotFound(String),

    #[error("search failed: {0}")]
    Search(String),

    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("repository error: {0}")]
    Repository(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Fixed taxonomy member name, stable across error message wording changes.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::SchemaValidation { .. } => "SchemaValidation",
            EngineError::DatabaseOperation { .. } => "DatabaseOperation",
            EngineError::ConceptNotFound(_) => "ConceptNotFound",
            EngineError::Search(_) => "Search",
            EngineError::InvalidEmbedding(_) => "InvalidEmbedding",
            EngineError::Repository(_) => "Repository",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable_across_variants() {
        let e = EngineError::ConceptNotFound("dependency injection".into());
        assert_eq!(e.kind(), "ConceptNotFound");
        let e = EngineError::Search("boom".into());
        assert_eq!(e.kind(), "Search");
    }
}
