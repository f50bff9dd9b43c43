//! Chunk planning
//!
//! Pure sizing and indexing logic. Upload is client-driven: every call
//! declares its own `chunk_index` and `total_chunks`, so the planner's
//! job is computing the expected chunk count and rejecting declarations
//! that are internally inconsistent.

mod planner;

pub use planner::{total_chunks, ChunkDeclaration};
