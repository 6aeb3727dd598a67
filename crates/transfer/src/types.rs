use serde::{Deserialize, Serialize};

use crate::DEFAULT_CHUNK_SIZE;

/// One slice of a source file.
///
/// `start`, `end` and `index` are fixed by the partitioner. `payload` and
/// `hash` stay empty until the chunk has been hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub file_name: String,
    pub file_total_size: u64,
    /// 0-based position, dense in `[0, chunk_count)`.
    pub index: u32,
    /// First byte (inclusive).
    pub start: u64,
    /// Last byte (exclusive).
    pub end: u64,
    pub chunk_count: u32,
    pub payload: Vec<u8>,
    /// Lowercase hex SHA-256 of `payload`.
    pub hash: String,
}

impl ChunkDescriptor {
    /// Number of bytes covered by this chunk.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Returns `true` once the hasher has filled in payload and hash.
    pub fn is_hashed(&self) -> bool {
        !self.hash.is_empty()
    }
}

/// Chunking parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChunkOptions {
    /// Chunk size in bytes (0 falls back to [`DEFAULT_CHUNK_SIZE`]).
    pub chunk_size: u64,
    /// Maximum accepted source size; 0 means unlimited.
    pub max_file_size: u64,
    /// Hash worker count; `None` uses the host's available parallelism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_size: 0,
            workers: None,
        }
    }
}

impl ChunkOptions {
    /// Chunk size with the zero fallback applied.
    pub fn effective_chunk_size(&self) -> u64 {
        if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        }
    }

    /// Worker count with the host fallback applied (never 0).
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            Some(n) => n.max(1),
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}
