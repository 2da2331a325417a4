pub mod expander;

pub use expander::{ConceptSimilaritySource, ExpandedQuery, QueryExpander};
