//! Chunk partitioning, hashing and reassembly for large-file uploads.
//!
//! A [`ByteSource`] is cut into fixed-size [`ChunkDescriptor`]s, each chunk
//! is SHA-256 hashed (sequentially or on a pool of worker threads), and the
//! hashed chunks can be stitched back together for a local preview.

mod chunked;
mod merge;
mod parallel;
mod source;
mod types;

pub use chunked::{
    checksum_bytes, checksum_source, hash_chunk, hash_chunks, partition, validate_size,
};
pub use merge::{merge, merge_into, merge_verified};
pub use parallel::{HashJob, dispatch_parallel, hash_source, split_ranges};
pub use source::{ByteSource, FileSource, MemorySource};
pub use types::{ChunkDescriptor, ChunkOptions};

/// Default chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Sources smaller than this are always hashed on a single thread.
///
/// Spinning up the worker pool costs more than it saves below 20 MiB.
pub const PARALLEL_THRESHOLD: u64 = 20 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("hash worker {worker} failed: {reason}")]
    HashWorkerFailure { worker: usize, reason: String },

    #[error("invalid range {start}..{end} for source of {size} bytes")]
    InvalidRange { start: u64, end: u64, size: u64 },

    #[error("chunk index {index} out of range (chunk count {chunk_count})")]
    InvalidIndex { index: u32, chunk_count: u32 },

    #[error("checksum mismatch for chunk {index}")]
    ChecksumMismatch { index: u32 },
}
