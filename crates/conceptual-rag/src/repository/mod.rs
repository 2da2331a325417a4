//! Repositories — spec §2, §4.10. Domain-layer accessors that wrap the
//! storage adapter's raw tables and expose them as `SearchableCollection`s
//! and the narrow traits the query/search layers depend on.

pub mod catalog;
pub mod chunks;
pub mod concepts;

pub use catalog::CatalogRepository;
pub use chunks::ChunkRepository;
pub use concepts::ConceptRepository;
