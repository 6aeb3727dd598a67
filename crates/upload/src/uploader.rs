//! Chunk upload orchestrator.
//!
//! Sends every chunk of a file as one multipart request, at most
//! `options.limit` at a time. Each chunk retries on its own; the first chunk
//! that runs out of attempts cancels its siblings and becomes the error of
//! the whole upload.

use std::sync::Arc;

use chunkline_transfer::{ByteSource, ChunkDescriptor, ChunkOptions, hash_source};
use chunkline_transport::{
    MultipartPayload, Progress, ProgressCallback, Request, Response, Transport, TransportError,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::SOFT_LIMIT;
use crate::error::UploadError;
use crate::session::UploadSession;
use crate::types::{UploadEvent, UploadOptions, UploadTarget};

/// Content type of the `file` part of every chunk.
pub const CHUNK_CONTENT_TYPE: &str = "application/octet-stream";

/// Uploads hashed chunks through a [`Transport`].
pub struct ChunkUploader {
    transport: Arc<dyn Transport>,
    options: UploadOptions,
    cancel: CancellationToken,
    events_tx: mpsc::UnboundedSender<UploadEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<UploadEvent>>,
}

/// Everything a chunk task needs, shared across the tasks of one file.
struct ChunkContext {
    transport: Arc<dyn Transport>,
    session: Arc<UploadSession>,
    session_id: String,
    target: UploadTarget,
    options: UploadOptions,
    events_tx: mpsc::UnboundedSender<UploadEvent>,
}

impl ChunkUploader {
    pub fn new(transport: Arc<dyn Transport>, options: UploadOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            options,
            cancel: CancellationToken::new(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// Sending an event never waits on the reader: events queue up until
    /// read, and are discarded once the receiver is dropped.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Token that aborts every upload started by this uploader.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Hashes `source` and uploads its chunks.
    pub async fn upload_source(
        &self,
        source: Arc<dyn ByteSource>,
        target: &UploadTarget,
        chunk_options: &ChunkOptions,
    ) -> Result<Vec<Response>, UploadError> {
        let session = self.open_session(source.name().to_string(), source.size());
        let chunks = match hash_source(source, chunk_options).await {
            Ok(chunks) => chunks,
            Err(e) => return Err(self.settle_failure(&session, e.into())),
        };
        self.run(session, chunks, target).await
    }

    /// Uploads the hashed chunks of one file.
    ///
    /// Responses are returned in chunk index order. On failure the error of
    /// the first chunk that exhausted its retries is returned.
    pub async fn upload_file_chunks(
        &self,
        chunks: Vec<ChunkDescriptor>,
        target: &UploadTarget,
    ) -> Result<Vec<Response>, UploadError> {
        let (file_name, total) = chunks
            .first()
            .map(|c| (c.file_name.clone(), c.file_total_size))
            .unwrap_or_default();
        let session = self.open_session(file_name, total);
        self.run(session, chunks, target).await
    }

    fn open_session(&self, file_name: String, total: u64) -> Arc<UploadSession> {
        let session = Arc::new(UploadSession::new(
            file_name.clone(),
            total,
            self.cancel.child_token(),
        ));
        session.start();
        self.emit(UploadEvent::Started {
            session_id: session.id(),
            file_name,
            total,
        });
        session
    }

    async fn run(
        &self,
        session: Arc<UploadSession>,
        mut chunks: Vec<ChunkDescriptor>,
        target: &UploadTarget,
    ) -> Result<Vec<Response>, UploadError> {
        let file_name = session.file_name();
        let session_id = session.id();

        chunks.sort_by_key(|c| c.index);
        if let Err(e) = validate_chunks(&file_name, session.total(), &chunks) {
            return Err(self.settle_failure(&session, e));
        }
        if self.cancel.is_cancelled() {
            return Err(self.settle_failure(&session, UploadError::Cancelled));
        }
        if self.options.limit > SOFT_LIMIT {
            warn!(
                limit = self.options.limit,
                soft_limit = SOFT_LIMIT,
                "concurrency limit above the usual per-host connection cap"
            );
        }
        info!(
            file = %file_name,
            session = %session_id,
            total = session.total(),
            chunks = chunks.len(),
            "upload started"
        );

        let ctx = Arc::new(ChunkContext {
            transport: Arc::clone(&self.transport),
            session: Arc::clone(&session),
            session_id: session_id.clone(),
            target: target.clone(),
            options: self.options.clone(),
            events_tx: self.events_tx.clone(),
        });
        let tasks: Vec<_> = chunks
            .into_iter()
            .map(|chunk| {
                let ctx = Arc::clone(&ctx);
                move || send_chunk(ctx, chunk)
            })
            .collect();

        match chunkline_tasks::run_limited(tasks, self.options.limit).await {
            Ok(responses) => {
                session.complete();
                info!(file = %file_name, chunks = responses.len(), "upload completed");
                self.emit(UploadEvent::Completed {
                    session_id,
                    file_name,
                });
                Ok(responses)
            }
            Err(first_settled) => {
                // A sibling's Cancelled may settle before the chunk that
                // caused it; the session knows the real cause.
                let err = match session.root_cause() {
                    Some((index, source)) => UploadError::Chunk { index, source },
                    None if self.cancel.is_cancelled() => UploadError::Cancelled,
                    None => first_settled,
                };
                Err(self.settle_failure(&session, err))
            }
        }
    }

    /// Moves the session to its terminal state and reports `err`.
    fn settle_failure(&self, session: &UploadSession, err: UploadError) -> UploadError {
        let file_name = session.file_name();
        if matches!(err, UploadError::Cancelled) {
            session.cancel();
            info!(file = %file_name, "upload cancelled");
        } else {
            session.fail(&err.to_string());
            error!(file = %file_name, error = %err, "upload failed");
        }
        self.emit(UploadEvent::Failed {
            session_id: session.id(),
            index: err.chunk_index(),
            error: err.to_string(),
        });
        err
    }

    fn emit(&self, event: UploadEvent) {
        let _ = self.events_tx.send(event);
    }
}

/// Builds the multipart form for one chunk.
///
/// Fields: `filename`, `file` (the payload), `hash`, `chunkCount`, `index`,
/// `start` and `end`; integers are written as decimal strings.
pub fn chunk_payload(chunk: &ChunkDescriptor) -> MultipartPayload {
    MultipartPayload::new()
        .text("filename", chunk.file_name.as_str())
        .file_with_type(
            "file",
            chunk.file_name.as_str(),
            CHUNK_CONTENT_TYPE,
            chunk.payload.clone(),
        )
        .text("hash", chunk.hash.as_str())
        .text("chunkCount", chunk.chunk_count.to_string())
        .text("index", chunk.index.to_string())
        .text("start", chunk.start.to_string())
        .text("end", chunk.end.to_string())
}

/// Checks that `chunks`, sorted by index, are the complete hashed chunk set
/// of one file: indices dense in `[0, chunk_count)` with no duplicates.
fn validate_chunks(file_name: &str, total: u64, chunks: &[ChunkDescriptor]) -> Result<(), UploadError> {
    let invalid = |msg: String| -> Result<(), UploadError> { Err(UploadError::InvalidChunks(msg)) };

    for (position, chunk) in chunks.iter().enumerate() {
        if chunk.file_name != file_name || chunk.file_total_size != total {
            return invalid(format!(
                "chunk {} belongs to {:?}, expected {:?}",
                chunk.index, chunk.file_name, file_name
            ));
        }
        if chunk.chunk_count as usize != chunks.len() {
            return invalid(format!(
                "chunk {} expects {} chunks, got {}",
                chunk.index,
                chunk.chunk_count,
                chunks.len()
            ));
        }
        if chunk.index as usize != position {
            return invalid(format!(
                "chunk index {} is duplicated or out of sequence at position {position}",
                chunk.index
            ));
        }
        if !chunk.is_hashed() {
            return invalid(format!("chunk {} has not been hashed", chunk.index));
        }
    }
    Ok(())
}

/// Uploads one chunk, retrying up to `max_retries` times.
async fn send_chunk(ctx: Arc<ChunkContext>, chunk: ChunkDescriptor) -> Result<Response, UploadError> {
    let index = chunk.index;
    let len = chunk.len();
    let payload = chunk_payload(&chunk);
    drop(chunk);

    let cancel = ctx.session.cancel_token().clone();
    let attempts = ctx.options.max_retries.saturating_add(1);
    let cancelled = || UploadError::Chunk {
        index,
        source: TransportError::Cancelled,
    };

    let on_progress: ProgressCallback = {
        let ctx = Arc::clone(&ctx);
        Arc::new(move |p: Progress| {
            let (loaded, percent) = ctx.session.set_loaded(index, p.loaded);
            let _ = ctx.events_tx.send(UploadEvent::Progress {
                session_id: ctx.session_id.clone(),
                index,
                percent,
                loaded,
                total: ctx.session.total(),
                bytes_per_second: ctx.session.bytes_per_second(),
                eta: ctx.session.eta(),
            });
        })
    };

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let mut request = Request::post(ctx.target.url.as_str())
            .multipart(payload.clone())
            .cancel_token(cancel.clone())
            .on_upload_progress(on_progress.clone());
        for (name, value) in &ctx.target.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = ctx.options.timeout {
            request = request.timeout(timeout);
        }

        match ctx.transport.send(request).await {
            Ok(resp) => {
                on_progress(Progress::new(len, len));
                debug!(index, attempt, status = resp.status, "chunk uploaded");
                let _ = ctx.events_tx.send(UploadEvent::ChunkUploaded {
                    session_id: ctx.session_id.clone(),
                    index,
                    status: resp.status,
                });
                return Ok(resp);
            }
            Err(e) => {
                ctx.session.reset(index);
                if e.is_cancelled() {
                    debug!(index, attempt, "chunk cancelled");
                    return Err(cancelled());
                }
                if attempt == attempts {
                    warn!(index, attempts, error = %e, "chunk failed, giving up");
                    ctx.session.record_failure(index, &e);
                    return Err(UploadError::Chunk { index, source: e });
                }
                debug!(index, attempt, error = %e, "chunk attempt failed, retrying");
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = tokio::time::sleep(ctx.options.retry_delay) => {}
        }
    }

    // Reached only with zero attempts, which saturating_add rules out.
    Err(cancelled())
}
