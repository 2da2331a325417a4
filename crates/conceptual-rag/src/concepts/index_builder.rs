//! Concept Index Builder — spec §4.6.

use std::collections::{HashMap, HashSet};

use crate::embeddings::EmbeddingModel;
use crate::types::{normalize_concept, CatalogRecord, ChunkRecordV2, ConceptKind, ConceptRecord};

pub struct ConceptIndexBuilder {
    /// `R`: max related concepts retained per concept-table entry.
    max_related_concepts: usize,
}

impl ConceptIndexBuilder {
    pub fn new(max_related_concepts: usize) -> Self {
        Self { max_related_concepts }
    }

    /// Rebuild the full concept table from scratch given every catalog and
    /// chunk record — the only path that prunes orphaned concepts (spec's
    /// resolved Open Question on concept GC).
    pub fn rebuild(
        &self,
        catalog: &[CatalogRecord],
        chunks: &[ChunkRecordV2],
        embedder: &dyn EmbeddingModel,
    ) -> Vec<ConceptRecord> {
        let mut kind_votes: HashMap<String, ConceptKind> = HashMap::new();
        let mut catalog_ids: HashMap<String, HashSet<u64>> = HashMap::new();
        let mut co_occurrence: HashMap<String, HashMap<String, usize>> = HashMap::new();

        for doc in catalog {
            let names: Vec<String> = doc.concepts.all_names().iter().map(|n| normalize_concept(n)).collect();

            for name in &doc.concepts.primary_concepts {
                vote(&mut kind_votes, name, ConceptKind::Thematic);
            }
            for name in &doc.concepts.categories {
                vote(&mut kind_votes, name, ConceptKind::Thematic);
            }
            for name in &doc.concepts.technical_terms {
                vote(&mut kind_votes, name, ConceptKind::Terminology);
            }
            for name in &doc.concepts.related_concepts {
                vote(&mut kind_votes, name, ConceptKind::Related);
            }

            for name in &names {
                catalog_ids.entry(name.clone()).or_default().insert(doc.id);
            }

            for a in &names {
                for b in &names {
                    if a != b {
                        *co_occurrence.entry(a.clone()).or_default().entry(b.clone()).or_insert(0) += 1;
                    }
                }
            }
        }

        let mut chunk_counts: HashMap<String, u32> = HashMap::new();
        for chunk in chunks {
            for concept in &chunk.concepts {
                let n = normalize_concept(concept);
                *chunk_counts.entry(n).or_insert(0) += 1;
            }
        }

        let mut all_names: HashSet<String> = kind_votes.keys().cloned().collect();
        all_names.extend(chunk_counts.keys().cloned());

        let mut records: Vec<ConceptRecord> = all_names
            .into_iter()
            .map(|name| {
                let kind = kind_votes.get(&name).copied().unwrap_or(ConceptKind::Related);
                let ids: Vec<u64> = {
                    let mut v: Vec<u64> = catalog_ids.get(&name).cloned().unwrap_or_default().into_iter().collect();
                    v.sort_unstable();
                    v
                };
                let document_count = ids.len() as u32;
                let chunk_count = chunk_counts.get(&name).copied().unwrap_or(0);

                let mut related: Vec<(String, usize)> = co_occurrence
                    .get(&name)
                    .map(|m| m.iter().map(|(k, v)| (k.clone(), *v)).collect())
                    .unwrap_or_default();
                related.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                related.truncate(self.max_related_concepts);

                ConceptRecord {
                    id: ConceptRecord::new_id(&name),
                    embedding: embedder.embed_document(&name).unwrap_or_default(),
                    name,
                    kind,
                    document_count,
                    chunk_count,
                    catalog_ids: ids,
                    related_concepts: related.into_iter().map(|(n, _)| n).collect(),
                    synonyms: Vec::new(),
                    broader_terms: Vec::new(),
                    narrower_terms: Vec::new(),
                    weight: (document_count + chunk_count) as u64,
                }
            })
            .collect();

        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }
}

/// Precedence: thematic > terminology > related. A name already voted a
/// higher tier is never downgraded by a later, lower-tier declaration.
fn vote(votes: &mut HashMap<String, ConceptKind>, raw_name: &str, kind: ConceptKind) {
    let name = normalize_concept(raw_name);
    let rank = |k: ConceptKind| match k {
        ConceptKind::Thematic => 3,
        ConceptKind::Terminology => 2,
        ConceptKind::Related => 1,
        ConceptKind::Category => 3,
    };
    match votes.get(&name) {
        Some(existing) if rank(*existing) >= rank(kind) => {}
        _ => {
            votes.insert(name, kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::types::ConceptBlob;

    fn catalog(id: u64, blob: ConceptBlob) -> CatalogRecord {
        CatalogRecord {
            id,
            source_path: format!("doc-{id}.txt"),
            content_hash: format!("hash-{id}"),
            summary: String::new(),
            concepts: blob,
            title: String::new(),
            author: String::new(),
            year: String::new(),
            publisher: String::new(),
            isbn: String::new(),
            embedding: vec![],
        }
    }

    #[test]
    fn thematic_precedence_wins_over_technical_declaration() {
        let builder = ConceptIndexBuilder::new(10);
        let embedder = HashEmbedder::new(32);

        let doc1 = catalog(1, ConceptBlob {
            technical_terms: vec!["architecture".into()],
            ..Default::default()
        });
        let doc2 = catalog(2, ConceptBlob {
            primary_concepts: vec!["architecture".into()],
            ..Default::default()
        });

        let records = builder.rebuild(&[doc1, doc2], &[], &embedder);
        let arch = records.iter().find(|r| r.name == "architecture").unwrap();
        assert_eq!(arch.kind, ConceptKind::Thematic);
        assert_eq!(arch.document_count, 2);
    }

    #[test]
    fn weight_is_document_count_plus_chunk_count() {
        let builder = ConceptIndexBuilder::new(10);
        let embedder = HashEmbedder::new(32);
        let doc = catalog(1, ConceptBlob { primary_concepts: vec!["rest".into()], ..Default::default() });
        let chunks = vec![
            ChunkRecordV2 { id: 1, source_path: "a".into(), content_hash: "h".into(), text: "".into(), concepts: vec!["rest".into()], concept_categories: vec![], concept_density: 0.5, embedding: vec![] },
            ChunkRecordV2 { id: 2, source_path: "a".into(), content_hash: "h".into(), text: "".into(), concepts: vec!["rest".into()], concept_categories: vec![], concept_density: 0.5, embedding: vec![] },
        ];
        let records = builder.rebuild(&[doc], &chunks, &embedder);
        let rest = records.iter().find(|r| r.name == "rest").unwrap();
        assert_eq!(rest.weight, 1 + 2);
    }

    #[test]
    fn related_concepts_ranked_by_co_occurrence_then_lexicographic() {
        let builder = ConceptIndexBuilder::new(10);
        let embedder = HashEmbedder::new(32);
        let doc = catalog(1, ConceptBlob {
            primary_concepts: vec!["rest".into(), "http".into(), "json".into()],
            ..Default::default()
        });
        let records = builder.rebuild(&[doc], &[], &embedder);
        let rest = records.iter().find(|r| r.name == "rest").unwrap();
        assert_eq!(rest.related_concepts, vec!["http".to_string(), "json".to_string()]);
    }

    #[test]
    fn rebuild_is_idempotent_under_unchanged_inputs() {
        let builder = ConceptIndexBuilder::new(10);
        let embedder = HashEmbedder::new(32);
        let doc = catalog(1, ConceptBlob { primary_concepts: vec!["rest".into()], ..Default::default() });
        let a = builder.rebuild(std::slice::from_ref(&doc), &[], &embedder);
        let b = builder.rebuild(&[doc], &[], &embedder);
        assert_eq!(a.len(), b.len());
        assert_eq!(a[0].name, b[0].name);
        assert_eq!(a[0].id, b[0].id);
    }
}
