//! Client-side reassembly of hashed chunks.
//!
//! Only used to build a local preview; the server does its own reassembly.

use std::io::Write;

use crate::TransferError;
use crate::chunked::checksum_bytes;
use crate::types::ChunkDescriptor;

fn sorted(chunks: &[ChunkDescriptor]) -> Vec<&ChunkDescriptor> {
    let mut ordered: Vec<&ChunkDescriptor> = chunks.iter().collect();
    // Stable merge sort: equal indices keep their input order.
    ordered.sort_by_key(|c| c.index);
    ordered
}

/// Concatenates chunk payloads in ascending `index` order.
///
/// The result does not depend on the input order.
pub fn merge(chunks: &[ChunkDescriptor]) -> Vec<u8> {
    let ordered = sorted(chunks);
    let total = ordered.iter().map(|c| c.payload.len()).sum();
    let mut out = Vec::with_capacity(total);
    for chunk in ordered {
        out.extend_from_slice(&chunk.payload);
    }
    out
}

/// Like [`merge`], but re-hashes every payload first.
///
/// Fails on the first chunk whose payload no longer matches its hash.
pub fn merge_verified(chunks: &[ChunkDescriptor]) -> Result<Vec<u8>, TransferError> {
    for chunk in sorted(chunks) {
        if checksum_bytes(&chunk.payload) != chunk.hash {
            return Err(TransferError::ChecksumMismatch { index: chunk.index });
        }
    }
    Ok(merge(chunks))
}

/// Streams the reassembled bytes into `writer` and returns the byte count.
pub fn merge_into<W: Write>(chunks: &[ChunkDescriptor], writer: &mut W) -> Result<u64, TransferError> {
    let mut written = 0u64;
    for chunk in sorted(chunks) {
        writer.write_all(&chunk.payload)?;
        written += chunk.payload.len() as u64;
    }
    writer.flush()?;
    Ok(written)
}
