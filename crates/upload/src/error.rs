//! Upload error types.

use chunkline_transfer::TransferError;
use chunkline_transport::TransportError;

/// Errors produced while uploading a file.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("chunk {index} failed: {source}")]
    Chunk {
        index: u32,
        source: TransportError,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("invalid chunks: {0}")]
    InvalidChunks(String),
}

impl UploadError {
    /// Index of the failing chunk, if the failure belongs to one.
    pub fn chunk_index(&self) -> Option<u32> {
        match self {
            UploadError::Chunk { index, .. } => Some(*index),
            _ => None,
        }
    }
}
