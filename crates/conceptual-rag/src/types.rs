//! Core data model: catalog entries, chunks, and concepts (spec §3).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable 64-bit id derived from the first 8 bytes of a SHA-256 digest.
/// Deterministic across processes and machines, unlike `std`'s randomized
/// `DefaultHasher` — required for ids that are persisted and re-derived.
pub fn stable_id(input: &str) -> u64 {
    let digest = Sha256::digest(input.as_bytes());
    u64::from_be_bytes(digest[0..8].try_into().expect("sha256 digest is >= 8 bytes"))
}

/// Normalize a concept name: trim, lowercase, collapse whitespace, strip
/// surrounding punctuation.
pub fn normalize_concept(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .to_string()
}

/// One page of a source document, as handed over by an upstream loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub page_index: usize,
    pub text: String,
}

/// A full document as handed over by an upstream loader (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSource {
    pub source_path: String,
    pub content_hash: String,
    pub records: Vec<PageRecord>,
}

impl DocumentSource {
    /// Full concatenation of page texts, in page order.
    pub fn full_text(&self) -> String {
        self.records
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Structured concept blob: ordered, deduped, tiered lists (spec §4.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConceptBlob {
    pub primary_concepts: Vec<String>,
    pub technical_terms: Vec<String>,
    pub related_concepts: Vec<String>,
    pub categories: Vec<String>,
}

impl ConceptBlob {
    /// All concept names declared by this document, deduped, primary-tier first.
    pub fn all_names(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for name in self
            .primary_concepts
            .iter()
            .chain(self.technical_terms.iter())
            .chain(self.related_concepts.iter())
        {
            if seen.insert(name.clone()) {
                out.push(name.clone());
            }
        }
        out
    }
}

/// Document record (catalog entry) — spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: u64,
    pub source_path: String,
    pub content_hash: String,
    pub summary: String,
    pub concepts: ConceptBlob,
    pub title: String,
    pub author: String,
    pub year: String,
    pub publisher: String,
    pub isbn: String,
    pub embedding: Vec<f32>,
}

impl CatalogRecord {
    pub fn new_id(content_hash: &str) -> u64 {
        stable_id(content_hash)
    }
}

/// Chunk record — spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecordV2 {
    pub id: u64,
    pub source_path: String,
    pub content_hash: String,
    pub text: String,
    pub concepts: Vec<String>,
    pub concept_categories: Vec<String>,
    pub concept_density: f32,
    pub embedding: Vec<f32>,
}

impl ChunkRecordV2 {
    pub fn new_id(content_hash: &str, offset: usize) -> u64 {
        stable_id(&format!("{content_hash}:{offset}"))
    }
}

/// Kind of a concept-table entry (spec §3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConceptKind {
    Thematic,
    Terminology,
    Related,
    Category,
}

impl ConceptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConceptKind::Thematic => "thematic",
            ConceptKind::Terminology => "terminology",
            ConceptKind::Related => "related",
            ConceptKind::Category => "category",
        }
    }

    pub fn parse_str(s: &str) -> Self {
        match s {
            "thematic" => ConceptKind::Thematic,
            "terminology" => ConceptKind::Terminology,
            "category" => ConceptKind::Category,
            _ => ConceptKind::Related,
        }
    }
}

/// Concept (or category) record — spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptRecord {
    pub id: u64,
    pub name: String,
    pub kind: ConceptKind,
    pub document_count: u32,
    pub chunk_count: u32,
    pub catalog_ids: Vec<u64>,
    pub related_concepts: Vec<String>,
    pub synonyms: Vec<String>,
    pub broader_terms: Vec<String>,
    pub narrower_terms: Vec<String>,
    pub embedding: Vec<f32>,
    pub weight: u64,
}

impl ConceptRecord {
    pub fn new_id(name: &str) -> u64 {
        stable_id(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_id_is_deterministic() {
        assert_eq!(stable_id("dependency injection"), stable_id("dependency injection"));
        assert_ne!(stable_id("dependency injection"), stable_id("inversion of control"));
    }

    #[test]
    fn normalize_concept_collapses_and_trims() {
        assert_eq!(normalize_concept("  Dependency   Injection! "), "dependency injection");
        assert_eq!(normalize_concept("REST."), "rest");
    }

    #[test]
    fn concept_blob_all_names_dedupes_and_preserves_tier_order() {
        let blob = ConceptBlob {
            primary_concepts: vec!["architecture".into()],
            technical_terms: vec!["architecture".into(), "dependency injection".into()],
            related_concepts: vec!["testing".into()],
            categories: vec![],
        };
        assert_eq!(
            blob.all_names(),
            vec!["architecture".to_string(), "dependency injection".to_string(), "testing".to_string()]
        );
    }

    #[test]
    fn document_source_full_text_preserves_page_order() {
        let doc = DocumentSource {
            source_path: "a.txt".into(),
            content_hash: "abc".into(),
            records: vec![
                PageRecord { page_index: 0, text: "first".into() },
                PageRecord { page_index: 1, text: "second".into() },
            ],
        };
        assert_eq!(doc.full_text(), "first\n\nsecond");
    }
}
