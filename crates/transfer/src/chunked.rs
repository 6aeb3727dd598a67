use sha2::{Digest, Sha256};

use crate::source::ByteSource;
use crate::types::ChunkDescriptor;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire source, reading `chunk_size` bytes at a time.
pub fn checksum_source(source: &dyn ByteSource, chunk_size: u64) -> Result<String, TransferError> {
    let chunk_size = effective(chunk_size);
    let size = source.size();
    let mut hasher = Sha256::new();
    let mut offset = 0;
    while offset < size {
        let end = (offset + chunk_size).min(size);
        hasher.update(source.slice(offset, end)?);
        offset = end;
    }
    Ok(hex::encode(hasher.finalize()))
}

fn effective(chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    }
}

// ---------------------------------------------------------------------------
// Partitioner
// ---------------------------------------------------------------------------

/// Rejects sources larger than `max_file_size` (0 disables the check).
pub fn validate_size(size: u64, max_file_size: u64) -> Result<(), TransferError> {
    if max_file_size != 0 && size > max_file_size {
        return Err(TransferError::FileTooLarge {
            size,
            limit: max_file_size,
        });
    }
    Ok(())
}

pub(crate) fn chunk_count_for(size: u64, chunk_size: u64) -> Result<u32, TransferError> {
    let count = size.div_ceil(chunk_size);
    u32::try_from(count).map_err(|_| TransferError::FileTooLarge {
        size,
        limit: chunk_size.saturating_mul(u32::MAX as u64),
    })
}

/// Splits `source` into chunk descriptors without reading any data.
///
/// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (5 MiB) is used. An empty
/// source yields no chunks.
pub fn partition(
    source: &dyn ByteSource,
    chunk_size: u64,
    max_file_size: u64,
) -> Result<Vec<ChunkDescriptor>, TransferError> {
    let size = source.size();
    validate_size(size, max_file_size)?;

    let chunk_size = effective(chunk_size);
    let chunk_count = chunk_count_for(size, chunk_size)?;

    let chunks = (0..chunk_count)
        .map(|index| {
            let start = index as u64 * chunk_size;
            ChunkDescriptor {
                file_name: source.name().to_string(),
                file_total_size: size,
                index,
                start,
                end: (start + chunk_size).min(size),
                chunk_count,
                payload: Vec::new(),
                hash: String::new(),
            }
        })
        .collect();
    Ok(chunks)
}

// ---------------------------------------------------------------------------
// Hasher
// ---------------------------------------------------------------------------

/// Reads and hashes a single chunk.
///
/// This is the unit of work for both the sequential and the parallel path,
/// so a chunk hashes identically whichever path produced it.
pub fn hash_chunk(
    source: &dyn ByteSource,
    index: u32,
    chunk_size: u64,
    chunk_count: u32,
) -> Result<ChunkDescriptor, TransferError> {
    if index >= chunk_count {
        return Err(TransferError::InvalidIndex { index, chunk_count });
    }

    let chunk_size = effective(chunk_size);
    let size = source.size();
    let start = index as u64 * chunk_size;
    let end = (start + chunk_size).min(size);
    if start >= end {
        return Err(TransferError::InvalidRange { start, end, size });
    }

    let payload = source.slice(start, end)?;
    let hash = checksum_bytes(&payload);
    Ok(ChunkDescriptor {
        file_name: source.name().to_string(),
        file_total_size: size,
        index,
        start,
        end,
        chunk_count,
        payload,
        hash,
    })
}

/// Partitions and hashes a whole source on the calling thread.
pub fn hash_chunks(
    source: &dyn ByteSource,
    chunk_size: u64,
    max_file_size: u64,
) -> Result<Vec<ChunkDescriptor>, TransferError> {
    let size = source.size();
    validate_size(size, max_file_size)?;
    let chunk_size = effective(chunk_size);
    let chunk_count = chunk_count_for(size, chunk_size)?;

    (0..chunk_count)
        .map(|index| hash_chunk(source, index, chunk_size, chunk_count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FileSource, MemorySource};
    use tempfile::TempDir;

    fn source(len: usize) -> MemorySource {
        let data = (0..len).map(|i| (i % 251) as u8).collect();
        MemorySource::new("data.bin", data)
    }

    #[test]
    fn checksum_bytes_deterministic() {
        let c1 = checksum_bytes(b"hello world");
        let c2 = checksum_bytes(b"hello world");
        assert_eq!(c1, c2);
        assert_eq!(c1.len(), 64); // SHA-256 = 64 hex chars.
    }

    #[test]
    fn checksum_bytes_known_vector() {
        assert_eq!(
            checksum_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn checksum_source_matches_bytes() {
        let src = source(1000);
        let whole = src.slice(0, 1000).unwrap();
        assert_eq!(checksum_source(&src, 64).unwrap(), checksum_bytes(&whole));
    }

    #[test]
    fn partition_tiles_the_source() {
        for (size, chunk_size) in [(1usize, 1u64), (10, 3), (12, 4), (100, 7), (5, 100)] {
            let src = source(size);
            let chunks = partition(&src, chunk_size, 0).unwrap();
            let expected = (size as u64).div_ceil(chunk_size);
            assert_eq!(chunks.len() as u64, expected);

            let mut next = 0;
            for (i, c) in chunks.iter().enumerate() {
                assert_eq!(c.index as usize, i);
                assert_eq!(c.start, next);
                assert!(c.start < c.end);
                assert!(c.len() <= chunk_size);
                assert_eq!(c.chunk_count as u64, expected);
                assert!(c.payload.is_empty());
                assert!(c.hash.is_empty());
                next = c.end;
            }
            assert_eq!(next, size as u64);
        }
    }

    #[test]
    fn partition_empty_source() {
        let src = source(0);
        assert!(partition(&src, 4, 0).unwrap().is_empty());
    }

    #[test]
    fn partition_default_chunk_size() {
        let src = source(10);
        let chunks = partition(&src, 0, 0).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end, 10);
    }

    #[test]
    fn partition_rejects_oversized_source() {
        let src = source(10 * 1024 * 1024);
        let result = partition(&src, 1024 * 1024, 5 * 1024 * 1024);
        match result {
            Err(TransferError::FileTooLarge { size, limit }) => {
                assert_eq!(size, 10 * 1024 * 1024);
                assert_eq!(limit, 5 * 1024 * 1024);
            }
            other => panic!("expected FileTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn partition_allows_exact_limit() {
        let src = source(100);
        assert_eq!(partition(&src, 40, 100).unwrap().len(), 3);
    }

    #[test]
    fn hash_chunk_reads_its_range() {
        let src = MemorySource::new("f", b"AABBCCDDEE".to_vec());
        let c = hash_chunk(&src, 2, 4, 3).unwrap();
        assert_eq!(c.start, 8);
        assert_eq!(c.end, 10);
        assert_eq!(c.payload, b"EE");
        assert_eq!(c.hash, checksum_bytes(b"EE"));
        assert_eq!(c.file_name, "f");
        assert_eq!(c.file_total_size, 10);
    }

    #[test]
    fn hash_chunk_is_deterministic() {
        let src = source(300);
        let a = hash_chunk(&src, 1, 128, 3).unwrap();
        let b = hash_chunk(&src, 1, 128, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hash.len(), 64);
        assert!(a.hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hash_chunk_rejects_bad_index() {
        let src = source(10);
        assert!(matches!(
            hash_chunk(&src, 3, 4, 3),
            Err(TransferError::InvalidIndex { index: 3, chunk_count: 3 })
        ));
        // Count claims more chunks than the source holds.
        assert!(matches!(
            hash_chunk(&src, 4, 4, 5),
            Err(TransferError::InvalidRange { .. })
        ));
    }

    #[test]
    fn hash_chunks_matches_partition() {
        let src = source(1000);
        let hashed = hash_chunks(&src, 96, 0).unwrap();
        let plain = partition(&src, 96, 0).unwrap();
        assert_eq!(hashed.len(), plain.len());
        for (h, p) in hashed.iter().zip(&plain) {
            assert_eq!((h.index, h.start, h.end), (p.index, p.start, p.end));
            assert_eq!(h.payload.len() as u64, h.len());
            assert!(h.is_hashed());
        }
    }

    #[test]
    fn hash_chunks_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.bin");
        std::fs::write(&path, b"The quick brown fox jumps over the lazy dog").unwrap();

        let src = FileSource::open(&path).unwrap();
        let chunks = hash_chunks(&src, 10, 0).unwrap();
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[0].payload, b"The quick ");
        assert_eq!(chunks[4].payload, b"dog");
    }
}
