//! Chunk upload orchestration.
//!
//! [`ChunkUploader`] sends hashed chunks through a
//! [`Transport`](chunkline_transport::Transport) with bounded concurrency,
//! per-chunk retry and fail-fast cancellation, and reports byte-accurate
//! progress for the whole file over an event channel.

pub mod error;
pub mod progress;
pub mod session;
pub mod types;
pub mod uploader;

pub use error::UploadError;
pub use progress::SpeedCalculator;
pub use session::UploadSession;
pub use types::{SessionProgress, UploadEvent, UploadOptions, UploadStatus, UploadTarget};
pub use uploader::{CHUNK_CONTENT_TYPE, ChunkUploader, chunk_payload};

/// Concurrency above which a warning is logged. Not enforced.
pub const SOFT_LIMIT: usize = 6;
