//! Concept extraction from document text via an external LLM — spec §4.2.

use anyhow::anyhow;
use thiserror::Error;

use crate::llm::{GenerationConfig, LLMProvider};
use crate::types::{normalize_concept, ConceptBlob};

/// Non-recoverable extraction failure — surfaced upward so the coordinator
/// can record the document as failed while the rest of the batch continues.
#[derive(Debug, Error)]
pub enum ExtractorFailure {
    #[error("llm call failed: {0}")]
    LlmCall(#[source] anyhow::Error),
}

/// Result of extracting one document, including a note when the JSON
/// repair state machine could not recover a parseable blob — this is not
/// a hard failure, it degrades to empty concept lists (spec §4.2).
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub blob: ConceptBlob,
    pub note: Option<String>,
}

pub struct ConceptExtractor {
    /// `Tshort`: character threshold above which extraction splits into passes.
    short_doc_char_threshold: usize,
}

impl ConceptExtractor {
    pub fn new(short_doc_char_threshold: usize) -> Self {
        Self {
            short_doc_char_threshold,
        }
    }

    /// Extract the concept blob for one document's full text.
    pub async fn extract(
        &self,
        llm: &dyn LLMProvider,
        config: &GenerationConfig,
        document_text: &str,
    ) -> Result<ExtractionReport, ExtractorFailure> {
        if document_text.len() <= self.short_doc_char_threshold {
            return self.extract_section(llm, config, document_text).await;
        }

        let mut merged = ConceptBlob::default();
        let mut notes = Vec::new();
        let mut seen_primary = std::collections::HashSet::new();
        let mut seen_technical = std::collections::HashSet::new();
        let mut seen_related = std::collections::HashSet::new();
        let mut seen_categories = std::collections::HashSet::new();

        for section in split_sections(document_text, self.short_doc_char_threshold) {
            let report = self.extract_section(llm, config, section).await?;
            if let Some(note) = report.note {
                notes.push(note);
            }
            for name in report.blob.primary_concepts {
                let n = normalize_concept(&name);
                seen_technical.remove(&n);
                seen_related.remove(&n);
                if seen_primary.insert(n.clone()) {
                    merged.primary_concepts.push(n);
                }
            }
            for name in report.blob.technical_terms {
                let n = normalize_concept(&name);
                if seen_primary.contains(&n) {
                    continue;
                }
                seen_related.remove(&n);
                if seen_technical.insert(n.clone()) {
                    merged.technical_terms.push(n);
                }
            }
            for name in report.blob.related_concepts {
                let n = normalize_concept(&name);
                if seen_primary.contains(&n) || seen_technical.contains(&n) {
                    continue;
                }
                if seen_related.insert(n.clone()) {
                    merged.related_concepts.push(n);
                }
            }
            for category in report.blob.categories {
                if seen_categories.insert(category.clone()) {
                    merged.categories.push(category);
                }
            }
        }

        // A later pass may promote a name to a higher tier than an earlier
        // pass recorded it at; drop the stale lower-tier entries.
        merged
            .technical_terms
            .retain(|n| !seen_primary.contains(n));
        merged
            .related_concepts
            .retain(|n| !seen_primary.contains(n) && !seen_technical.contains(n));

        Ok(ExtractionReport {
            blob: merged,
            note: if notes.is_empty() { None } else { Some(notes.join("; ")) },
        })
    }

    async fn extract_section(
        &self,
        llm: &dyn LLMProvider,
        config: &GenerationConfig,
        text: &str,
    ) -> Result<ExtractionReport, ExtractorFailure> {
        let prompt = build_extraction_prompt(text);
        let raw = llm
            .generate(&prompt, config)
            .await
            .map_err(ExtractorFailure::LlmCall)?;

        match repair_and_parse(&raw) {
            Ok(mut blob) => {
                normalize_blob(&mut blob);
                Ok(ExtractionReport { blob, note: None })
            }
            Err(reason) => Ok(ExtractionReport {
                blob: ConceptBlob::default(),
                note: Some(format!("JSON unparseable after repair: {reason}")),
            }),
        }
    }
}

fn build_extraction_prompt(text: &str) -> String {
    format!(
        "Extract concepts from the following document text. Respond with strict JSON only: \
         {{\"primary_concepts\": [...], \"technical_terms\": [...], \"related_concepts\": [...], \"categories\": [...]}}.\n\n{text}"
    )
}

/// Split text into bounded sections, snapping to a char boundary so no
/// multi-byte grapheme is cut across a section boundary.
fn split_sections(text: &str, section_size: usize) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let raw_end = (start + section_size).min(text.len());
        let mut end = raw_end;
        while end < text.len() && !text.is_char_boundary(end) {
            end += 1;
        }
        sections.push(&text[start..end]);
        start = end;
    }
    sections
}

fn normalize_blob(blob: &mut ConceptBlob) {
    for list in [
        &mut blob.primary_concepts,
        &mut blob.technical_terms,
        &mut blob.related_concepts,
        &mut blob.categories,
    ] {
        let mut seen = std::collections::HashSet::new();
        list.retain_mut(|name| {
            *name = normalize_concept(name);
            seen.insert(name.clone())
        });
    }
}

/// JSON repair state machine: Raw -> StripFences -> LocateBraces -> Parse -> {Ok|Fail}.
fn repair_and_parse(raw: &str) -> Result<ConceptBlob, anyhow::Error> {
    if let Ok(blob) = serde_json::from_str::<ConceptBlob>(raw) {
        return Ok(blob);
    }

    let stripped = strip_code_fences(raw);
    if let Ok(blob) = serde_json::from_str::<ConceptBlob>(&stripped) {
        return Ok(blob);
    }

    match locate_outer_braces(&stripped) {
        Some(candidate) => serde_json::from_str::<ConceptBlob>(candidate)
            .map_err(|e| anyhow!("still invalid after brace extraction: {e}")),
        None => Err(anyhow!("no JSON object found in response")),
    }
}

fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.trim_end_matches("```").trim().to_string()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.trim_end_matches("```").trim().to_string()
    } else {
        trimmed.to_string()
    }
}

fn locate_outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}
