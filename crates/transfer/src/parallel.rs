//! Parallel chunk hashing on a fixed pool of worker threads.
//!
//! The dispatcher hands every worker one [`HashJob`] describing a contiguous
//! range of chunk indices and waits for exactly one reply per worker. Workers
//! share nothing mutable; the source itself is read-only.

use std::ops::Range;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::chunked::{chunk_count_for, hash_chunk, hash_chunks, validate_size};
use crate::source::ByteSource;
use crate::types::{ChunkDescriptor, ChunkOptions};
use crate::{PARALLEL_THRESHOLD, TransferError};

/// Work message sent to a single hash worker.
pub struct HashJob {
    pub worker: usize,
    pub range: Range<u32>,
    pub chunk_size: u64,
    pub chunk_count: u32,
    pub source: Arc<dyn ByteSource>,
}

impl HashJob {
    /// Hashes every chunk in the job's range, in order.
    pub fn run(self) -> Result<Vec<ChunkDescriptor>, TransferError> {
        self.range
            .map(|index| hash_chunk(&*self.source, index, self.chunk_size, self.chunk_count))
            .collect()
    }
}

/// Splits `chunk_count` indices into `workers` contiguous ranges.
///
/// Each range holds `ceil(chunk_count / workers)` indices; trailing ranges
/// may be shorter or empty. A worker count of 0 is treated as 1.
pub fn split_ranges(chunk_count: u32, workers: usize) -> Vec<Range<u32>> {
    let workers = workers.max(1) as u64;
    let count = chunk_count as u64;
    let per_worker = count.div_ceil(workers);

    (0..workers)
        .map(|w| {
            let start = (w * per_worker).min(count) as u32;
            let end = ((w + 1) * per_worker).min(count) as u32;
            start..end
        })
        .collect()
}

/// Hashes all chunks on `workers` threads and returns them in index order.
///
/// Any worker failure fails the whole phase; there is no partial result.
pub async fn dispatch_parallel(
    source: Arc<dyn ByteSource>,
    chunk_size: u64,
    chunk_count: u32,
    workers: usize,
) -> Result<Vec<ChunkDescriptor>, TransferError> {
    if chunk_count == 0 {
        return Ok(Vec::new());
    }

    let ranges = split_ranges(chunk_count, workers);
    debug!(
        file = %source.name(),
        chunk_count,
        workers = ranges.len(),
        "dispatching hash workers"
    );

    let mut replies = Vec::with_capacity(ranges.len());
    for (worker, range) in ranges.into_iter().enumerate() {
        if range.is_empty() {
            continue;
        }
        let (tx, rx) = oneshot::channel();
        let job = HashJob {
            worker,
            range,
            chunk_size,
            chunk_count,
            source: Arc::clone(&source),
        };
        std::thread::Builder::new()
            .name(format!("chunk-hash-{worker}"))
            .spawn(move || {
                let _ = tx.send(job.run());
            })
            .map_err(|e| TransferError::HashWorkerFailure {
                worker,
                reason: e.to_string(),
            })?;
        replies.push((worker, rx));
    }

    // All workers reply before the phase settles; the lowest failing worker wins.
    let mut outcomes = Vec::with_capacity(replies.len());
    for (worker, rx) in replies {
        outcomes.push((worker, rx.await));
    }

    let mut chunks = Vec::with_capacity(chunk_count as usize);
    for (worker, outcome) in outcomes {
        match outcome {
            Ok(Ok(part)) => chunks.extend(part),
            Ok(Err(e)) => {
                warn!(worker, error = %e, "hash worker failed");
                return Err(TransferError::HashWorkerFailure {
                    worker,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(worker, "hash worker exited without replying");
                return Err(TransferError::HashWorkerFailure {
                    worker,
                    reason: "worker exited without replying".into(),
                });
            }
        }
    }
    Ok(chunks)
}

/// Partitions and hashes `source`, picking the sequential or parallel path.
///
/// Sources below [`PARALLEL_THRESHOLD`] are hashed on one blocking thread;
/// larger ones go through [`dispatch_parallel`].
pub async fn hash_source(
    source: Arc<dyn ByteSource>,
    options: &ChunkOptions,
) -> Result<Vec<ChunkDescriptor>, TransferError> {
    let size = source.size();
    validate_size(size, options.max_file_size)?;
    let chunk_size = options.effective_chunk_size();

    if size < PARALLEL_THRESHOLD {
        debug!(file = %source.name(), size, "hashing sequentially");
        let src = Arc::clone(&source);
        return tokio::task::spawn_blocking(move || hash_chunks(&*src, chunk_size, 0))
            .await
            .map_err(|e| TransferError::HashWorkerFailure {
                worker: 0,
                reason: format!("task join error: {e}"),
            })?;
    }

    let chunk_count = chunk_count_for(size, chunk_size)?;
    dispatch_parallel(source, chunk_size, chunk_count, options.effective_workers()).await
}
