pub mod chunker;
pub mod document;

pub use chunker::{ChunkResult, TextChunker};
pub use document::{DocumentLoader, PlainTextLoader};
