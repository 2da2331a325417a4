//! Lexical-network service contract (spec §4.5, §4.8) — an external
//! synonym/hypernym/hyponym collaborator, out of scope beyond its interface.

use async_trait::async_trait;

#[derive(Debug, Clone, Default)]
pub struct LexicalRelations {
    pub synonyms: Vec<String>,
    pub broader_terms: Vec<String>,
    pub narrower_terms: Vec<String>,
}

/// Contract every lexical-network backend must satisfy. Implementations are
/// expected to cache internally and honor `flush_cache` at batch end.
#[async_trait]
pub trait LexicalNetwork: Send + Sync {
    async fn lookup(&self, term: &str) -> anyhow::Result<LexicalRelations>;

    async fn flush_cache(&self) {}
}

/// In-process LRU-cached adapter over a backend, matching the teacher's
/// `embeddings/tokenizer.rs` `lru::LruCache` pattern.
pub struct CachedLexicalNetwork<B: LexicalNetwork> {
    backend: B,
    cache: parking_lot::Mutex<lru::LruCache<String, LexicalRelations>>,
}

impl<B: LexicalNetwork> CachedLexicalNetwork<B> {
    pub fn new(backend: B, capacity: usize) -> Self {
        Self {
            backend,
            cache: parking_lot::Mutex::new(lru::LruCache::new(
                std::num::NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
        }
    }
}

#[async_trait]
impl<B: LexicalNetwork> LexicalNetwork for CachedLexicalNetwork<B> {
    async fn lookup(&self, term: &str) -> anyhow::Result<LexicalRelations> {
        if let Some(hit) = self.cache.lock().get(term).cloned() {
            return Ok(hit);
        }
        let relations = self.backend.lookup(term).await?;
        self.cache.lock().put(term.to_string(), relations.clone());
        Ok(relations)
    }

    async fn flush_cache(&self) {
        self.cache.lock().clear();
        self.backend.flush_cache().await;
    }
}

/// No-op backend used when no lexical-network service is configured —
/// enrichment and query expansion degrade gracefully, per spec.
pub struct NullLexicalNetwork;

#[async_trait]
impl LexicalNetwork for NullLexicalNetwork {
    async fn lookup(&self, _term: &str) -> anyhow::Result<LexicalRelations> {
        Ok(LexicalRelations::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LexicalNetwork for CountingBackend {
        async fn lookup(&self, term: &str) -> anyhow::Result<LexicalRelations> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LexicalRelations {
                synonyms: vec![format!("{term}-syn")],
                broader_terms: vec![],
                narrower_terms: vec![],
            })
        }
    }

    #[tokio::test]
    async fn cache_hits_skip_the_backend() {
        let cached = CachedLexicalNetwork::new(CountingBackend { calls: AtomicUsize::new(0) }, 10);
        cached.lookup("rest").await.unwrap();
        cached.lookup("rest").await.unwrap();
        assert_eq!(cached.backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn flush_clears_cache_and_forces_a_fresh_lookup() {
        let cached = CachedLexicalNetwork::new(CountingBackend { calls: AtomicUsize::new(0) }, 10);
        cached.lookup("rest").await.unwrap();
        cached.flush_cache().await;
        cached.lookup("rest").await.unwrap();
        assert_eq!(cached.backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn null_network_always_returns_empty_relations() {
        let net = NullLexicalNetwork;
        let relations = net.lookup("anything").await.unwrap();
        assert!(relations.synonyms.is_empty());
    }
}
