pub mod bm25;
pub mod hybrid;

pub use bm25::{Bm25Corpus, Bm25Params};
pub use hybrid::{
    hybrid_search, reciprocal_rank_fusion, score_aware_rrf, weighted_fusion, HybridHit, HybridParams, HybridResult,
    HybridSource, SearchRow, SearchableCollection, Signals,
};
