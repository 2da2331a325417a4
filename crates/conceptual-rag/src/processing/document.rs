//! Document Set contract (spec §2, §6) — out of scope beyond its output
//! contract. Binary-format loaders (PDF/EPUB) are external collaborators;
//! this module only defines the trait they must satisfy plus a minimal
//! plain-text loader used by tests and the reference CLI.

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::types::{DocumentSource, PageRecord};

/// Contract every upstream document loader must satisfy: yield a stable
/// `content_hash` (a function of source bytes only) plus ordered page records.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> anyhow::Result<DocumentSource>;
}

/// Hex-encode the SHA-256 of raw bytes — the stability contract every
/// loader's `content_hash` must satisfy (spec §6).
pub fn content_hash_of(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Minimal loader for plain text/markdown sources: one page, the whole file.
pub struct PlainTextLoader;

impl DocumentLoader for PlainTextLoader {
    fn load(&self, path: &Path) -> anyhow::Result<DocumentSource> {
        let bytes = std::fs::read(path)?;
        let content_hash = content_hash_of(&bytes);
        let text = String::from_utf8_lossy(&bytes).to_string();
        Ok(DocumentSource {
            source_path: path.to_string_lossy().to_string(),
            content_hash,
            records: vec![PageRecord { page_index: 0, text }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_function_of_bytes() {
        assert_eq!(content_hash_of(b"hello"), content_hash_of(b"hello"));
        assert_ne!(content_hash_of(b"hello"), content_hash_of(b"world"));
    }

    #[test]
    fn plain_text_loader_reads_whole_file_as_one_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "hello world").unwrap();

        let loader = PlainTextLoader;
        let doc = loader.load(&path).unwrap();
        assert_eq!(doc.records.len(), 1);
        assert_eq!(doc.records[0].text, "hello world");
        assert_eq!(doc.content_hash, content_hash_of(b"hello world"));
    }
}
