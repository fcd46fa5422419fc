pub mod window;

// Re-export the chunking entry points for external use
pub use window::{
    ChunkError, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP, TextChunk, WindowChunker, chunk_text,
};
