//! Parallel Extraction Coordinator — spec §4.3.
//!
//! Bounded worker pool over a batch of documents, each worker awaiting a
//! shared rate-limiter slot before invoking the extractor. Grounded on the
//! teacher's `indexing.rs` pause/cancel/panic-catching batch loop and
//! `llm/download_tokenizers.rs`'s exponential backoff pattern.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

use crate::llm::{GenerationConfig, LLMProvider};
use crate::types::{ConceptBlob, DocumentSource};

use super::extractor::ConceptExtractor;

/// Shared process-wide limiter ensuring at least `min_interval` between any
/// two outgoing LLM requests. FIFO via the async mutex's wait queue.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: AsyncMutex<Option<Instant>>,
    total_requests: AtomicU64,
    total_wait_ms: AtomicU64,
    max_wait_ms: AtomicU64,
    queue_depth: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimiterMetrics {
    pub total_requests: u64,
    pub avg_wait_ms: u64,
    pub max_wait_ms: u64,
    pub queue_depth: u64,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: AsyncMutex::new(None),
            total_requests: AtomicU64::new(0),
            total_wait_ms: AtomicU64::new(0),
            max_wait_ms: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
        }
    }

    /// Block until at least `min_interval` has elapsed since the previous
    /// acquire. Callers queue on the mutex itself, so admission is FIFO.
    pub async fn acquire(&self) {
        self.queue_depth.fetch_add(1, Ordering::SeqCst);
        let wait_start = Instant::now();
        let mut last = self.last_request.lock().await;

        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }

        *last = Some(Instant::now());
        drop(last);

        let waited_ms = wait_start.elapsed().as_millis() as u64;
        self.total_requests.fetch_add(1, Ordering::SeqCst);
        self.total_wait_ms.fetch_add(waited_ms, Ordering::SeqCst);
        self.max_wait_ms.fetch_max(waited_ms, Ordering::SeqCst);
        self.queue_depth.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn metrics(&self) -> RateLimiterMetrics {
        let total = self.total_requests.load(Ordering::SeqCst);
        RateLimiterMetrics {
            total_requests: total,
            avg_wait_ms: self.total_wait_ms.load(Ordering::SeqCst).checked_div(total).unwrap_or(0),
            max_wait_ms: self.max_wait_ms.load(Ordering::SeqCst),
            queue_depth: self.queue_depth.load(Ordering::SeqCst),
        }
    }
}

/// Retry policy for a single extraction call: bounded exponential backoff,
/// base/cap taken from `CoordinatorConfig`.
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.backoff_base_ms.saturating_mul(1u64 << attempt.min(20));
        Duration::from_millis(exp.min(self.backoff_cap_ms))
    }
}

/// Per-document extraction outcome — mixed success/failure, per spec §4.3.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub source: String,
    pub content_hash: String,
    pub concepts: Option<ConceptBlob>,
    pub error: Option<String>,
    pub processing_time_ms: u64,
    pub cancelled: bool,
}

pub struct ExtractionCoordinator {
    extractor: Arc<ConceptExtractor>,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    max_concurrency: usize,
}

impl ExtractionCoordinator {
    pub fn new(
        extractor: Arc<ConceptExtractor>,
        rate_limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        max_concurrency: usize,
    ) -> Self {
        Self {
            extractor,
            rate_limiter,
            retry,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Run extraction over a batch of documents with bounded concurrency.
    /// `progress` is invoked `(completed, total, source)` after each document.
    /// `cancelled` is polled between documents; in-flight calls are allowed
    /// to finish, pending documents are reported as cancelled.
    pub async fn run<F>(
        &self,
        llm: Arc<dyn LLMProvider>,
        config: GenerationConfig,
        documents: Vec<DocumentSource>,
        cancelled: Arc<std::sync::atomic::AtomicBool>,
        progress: Option<F>,
    ) -> Vec<ExtractionOutcome>
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        let total = documents.len();
        let completed = Arc::new(AtomicU64::new(0));
        let progress = progress.map(Arc::new);

        stream::iter(documents.into_iter().map(|doc| {
            let llm = llm.clone();
            let config = config.clone();
            let extractor = self.extractor.clone();
            let rate_limiter = self.rate_limiter.clone();
            let cancelled = cancelled.clone();
            let completed = completed.clone();
            let progress = progress.clone();
            let max_retries = self.retry.max_retries;
            let backoff_base_ms = self.retry.backoff_base_ms;
            let backoff_cap_ms = self.retry.backoff_cap_ms;

            async move {
                let outcome = if cancelled.load(Ordering::SeqCst) {
                    ExtractionOutcome {
                        source: doc.source_path.clone(),
                        content_hash: doc.content_hash.clone(),
                        concepts: None,
                        error: None,
                        processing_time_ms: 0,
                        cancelled: true,
                    }
                } else {
                    extract_one(
                        extractor.as_ref(),
                        llm.as_ref(),
                        &config,
                        &doc,
                        rate_limiter.as_ref(),
                        &RetryPolicy { max_retries, backoff_base_ms, backoff_cap_ms },
                    )
                    .await
                };

                let n = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(cb) = &progress {
                    cb(n as usize, total, &outcome.source);
                }
                outcome
            }
        }))
        .buffer_unordered(self.max_concurrency)
        .collect()
        .await
    }
}

async fn extract_one(
    extractor: &ConceptExtractor,
    llm: &dyn LLMProvider,
    config: &GenerationConfig,
    doc: &DocumentSource,
    rate_limiter: &RateLimiter,
    retry: &RetryPolicy,
) -> ExtractionOutcome {
    let start = Instant::now();
    let text = doc.full_text();

    let mut attempt = 0u32;
    loop {
        rate_limiter.acquire().await;
        match extractor.extract(llm, config, &text).await {
            Ok(report) => {
                return ExtractionOutcome {
                    source: doc.source_path.clone(),
                    content_hash: doc.content_hash.clone(),
                    concepts: Some(report.blob),
                    error: report.note,
                    processing_time_ms: start.elapsed().as_millis() as u64,
                    cancelled: false,
                };
            }
            Err(e) => {
                if attempt >= retry.max_retries {
                    return ExtractionOutcome {
                        source: doc.source_path.clone(),
                        content_hash: doc.content_hash.clone(),
                        concepts: None,
                        error: Some(e.to_string()),
                        processing_time_ms: start.elapsed().as_millis() as u64,
                        cancelled: false,
                    };
                }
                tokio::time::sleep(retry.delay_for(attempt)).await;
                attempt += 1;
            }
        }
    }
}
