//! Deterministic hash-feature embedding (spec §4.7, acceptable implementation
//! (b)) — a dependency-free, model-free `EmbeddingModel` used whenever no ONNX
//! model is configured. Query/document text maps to the same feature space so
//! cosine similarity between the two is meaningful, unlike a random baseline.

use anyhow::Result;
use sha2::{Digest, Sha256};

use super::EmbeddingModel;

pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];
        let normalized = text.to_lowercase();
        let tokens: Vec<&str> = normalized.split_whitespace().collect();

        if tokens.is_empty() {
            return vector;
        }

        for token in &tokens {
            let digest = Sha256::digest(token.as_bytes());
            for (i, chunk) in digest.chunks(4).enumerate() {
                let idx = (digest[i % digest.len()] as usize
                    ^ (i * 97))
                    % self.dimension;
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(chunk);
                let raw = u32::from_be_bytes(bytes) as f32 / u32::MAX as f32;
                // Sign bit from the digest's first byte spreads mass across +/-.
                let signed = if digest[0] & 1 == 0 { raw } else { -raw };
                vector[idx] += signed;
            }
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}

impl EmbeddingModel for HashEmbedder {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_yields_same_vector() {
        let model = HashEmbedder::new(128);
        let a = model.embed_document("dependency injection pattern").unwrap();
        let b = model.embed_document("dependency injection pattern").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn vectors_are_unit_normalized() {
        let model = HashEmbedder::new(64);
        let v = model.embed_document("hybrid search engine").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[test]
    fn different_text_yields_different_vectors() {
        let model = HashEmbedder::new(128);
        let a = model.embed_document("concept extraction").unwrap();
        let b = model.embed_document("lexical network expansion").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_text_yields_zero_vector() {
        let model = HashEmbedder::new(32);
        let v = model.embed_document("").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn dimension_matches_configured_size() {
        let model = HashEmbedder::new(256);
        assert_eq!(model.dimension(), 256);
        assert_eq!(model.embed_query("x").unwrap().len(), 256);
    }
}
