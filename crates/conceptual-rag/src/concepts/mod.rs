pub mod coordinator;
pub mod enricher;
pub mod extractor;
pub mod index_builder;
pub mod matcher;

pub use coordinator::{ExtractionCoordinator, ExtractionOutcome, RateLimiter, RateLimiterMetrics};
pub use enricher::ConceptEnricher;
pub use extractor::{ConceptExtractor, ExtractorFailure};
pub use index_builder::ConceptIndexBuilder;
pub use matcher::{ConceptChunkMatcher, ConceptStats, MatchedChunk};
