use crate::error::{AppError, Result};

/// Number of chunks needed to store `file_size` bytes with a fixed
/// per-chunk ceiling.
pub fn total_chunks(file_size: u64, max_chunk_size: u64) -> u64 {
    if file_size == 0 {
        return 1;
    }
    file_size.div_ceil(max_chunk_size)
}

/// One client-declared chunk of an upload sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDeclaration {
    pub chunk_index: u64,
    pub total_chunks: u64,
    pub file_size: u64,
    pub chunk_len: u64,
}

impl ChunkDeclaration {
    /// Validate internal consistency of the declaration against the
    /// configured chunk ceiling. Fails fast with
    /// `InvalidChunkDeclaration`; there is nothing to retry.
    pub fn validate(&self, max_chunk_size: u64) -> Result<()> {
        if self.total_chunks == 0 {
            return Err(AppError::InvalidChunkDeclaration(
                "totalChunks must be at least 1".to_string(),
            ));
        }

        if self.chunk_index >= self.total_chunks {
            return Err(AppError::InvalidChunkDeclaration(format!(
                "chunkIndex {} out of range for totalChunks {}",
                self.chunk_index, self.total_chunks
            )));
        }

        if self.chunk_len == 0 && self.file_size > 0 {
            return Err(AppError::InvalidChunkDeclaration(
                "empty chunk for a non-empty file".to_string(),
            ));
        }

        if self.chunk_len > max_chunk_size {
            return Err(AppError::InvalidChunkDeclaration(format!(
                "chunk of {} bytes exceeds the {} byte ceiling",
                self.chunk_len, max_chunk_size
            )));
        }

        let expected = total_chunks(self.file_size, max_chunk_size);
        if self.total_chunks != expected {
            return Err(AppError::InvalidChunkDeclaration(format!(
                "declared totalChunks {} but a {} byte file splits into {}",
                self.total_chunks, self.file_size, expected
            )));
        }

        Ok(())
    }

    /// Whether this declaration names the final chunk of the sequence.
    pub fn is_final(&self) -> bool {
        self.chunk_index == self.total_chunks - 1
    }
}
