//! Per-file upload session: progress state, status and cancellation.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use chunkline_transport::TransportError;
use tokio_util::sync::CancellationToken;

use crate::progress::SpeedCalculator;
use crate::types::{SessionProgress, UploadStatus};

/// State of one file upload, shared by all of its chunk tasks.
pub struct UploadSession {
    inner: RwLock<SessionInner>,
    cancel: CancellationToken,
    speed: SpeedCalculator,
}

struct SessionInner {
    id: String,
    file_name: String,
    total: u64,
    status: UploadStatus,
    /// Bytes acknowledged per chunk index.
    loaded: HashMap<u32, u64>,
    started_at: Option<Instant>,
    completed_at: Option<Instant>,
    error: Option<String>,
    root_cause: Option<(u32, TransportError)>,
}

impl SessionInner {
    fn sum(&self) -> u64 {
        self.loaded.values().sum()
    }

    fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.sum() as f64 / self.total as f64 * 100.0).clamp(0.0, 100.0)
    }

    fn finish(&mut self, status: UploadStatus) {
        self.status = status;
        self.completed_at = Some(Instant::now());
    }
}

impl UploadSession {
    /// Creates a pending session for a file of `total` bytes.
    pub fn new(file_name: impl Into<String>, total: u64, cancel: CancellationToken) -> Self {
        Self {
            inner: RwLock::new(SessionInner {
                id: uuid::Uuid::new_v4().to_string(),
                file_name: file_name.into(),
                total,
                status: UploadStatus::Pending,
                loaded: HashMap::new(),
                started_at: None,
                completed_at: None,
                error: None,
                root_cause: None,
            }),
            cancel,
            speed: SpeedCalculator::default(),
        }
    }

    pub fn id(&self) -> String {
        self.inner.read().unwrap().id.clone()
    }

    pub fn file_name(&self) -> String {
        self.inner.read().unwrap().file_name.clone()
    }

    pub fn total(&self) -> u64 {
        self.inner.read().unwrap().total
    }

    /// Token shared by every chunk request of this file.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn start(&self) {
        let mut s = self.inner.write().unwrap();
        s.status = UploadStatus::InProgress;
        s.started_at = Some(Instant::now());
        self.speed.reset();
    }

    pub fn complete(&self) {
        self.inner.write().unwrap().finish(UploadStatus::Completed);
    }

    pub fn fail(&self, err: &str) {
        let mut s = self.inner.write().unwrap();
        s.error = Some(err.to_string());
        s.finish(UploadStatus::Failed);
    }

    /// Marks the session cancelled and aborts its in-flight requests.
    pub fn cancel(&self) {
        self.inner.write().unwrap().finish(UploadStatus::Cancelled);
        self.cancel.cancel();
    }

    pub fn status(&self) -> UploadStatus {
        self.inner.read().unwrap().status
    }

    pub fn is_active(&self) -> bool {
        self.status().is_active()
    }

    /// Sets the bytes loaded for chunk `index` and returns the new aggregate
    /// `(loaded, percent)`.
    pub fn set_loaded(&self, index: u32, loaded: u64) -> (u64, f64) {
        let mut s = self.inner.write().unwrap();
        let previous = s.loaded.insert(index, loaded).unwrap_or(0);
        if loaded > previous {
            self.speed.add_sample(loaded - previous);
        }
        (s.sum(), s.percent())
    }

    /// Forgets progress of a failed attempt.
    pub fn reset(&self, index: u32) {
        self.inner.write().unwrap().loaded.insert(index, 0);
    }

    /// Aggregate bytes loaded across all chunks.
    pub fn loaded(&self) -> u64 {
        self.inner.read().unwrap().sum()
    }

    /// `loaded / total * 100`, clamped; 100 for an empty file.
    pub fn percent(&self) -> f64 {
        self.inner.read().unwrap().percent()
    }

    pub fn bytes_per_second(&self) -> f64 {
        self.speed.bytes_per_second()
    }

    /// Time left for the bytes not yet loaded, at the current speed.
    pub fn eta(&self) -> Option<Duration> {
        let remaining = {
            let s = self.inner.read().unwrap();
            s.total.saturating_sub(s.sum())
        };
        self.speed.eta(remaining)
    }

    /// Records an unrecoverable chunk failure and cancels the session.
    ///
    /// Only the first call is kept; returns `true` for that call.
    pub fn record_failure(&self, index: u32, error: &TransportError) -> bool {
        {
            let mut s = self.inner.write().unwrap();
            if s.root_cause.is_some() {
                return false;
            }
            s.root_cause = Some((index, error.clone()));
        }
        self.cancel.cancel();
        true
    }

    /// The first unrecoverable failure, if any.
    pub fn root_cause(&self) -> Option<(u32, TransportError)> {
        self.inner.read().unwrap().root_cause.clone()
    }

    pub fn progress(&self) -> SessionProgress {
        let eta = self.eta();
        let s = self.inner.read().unwrap();
        SessionProgress {
            session_id: s.id.clone(),
            file_name: s.file_name.clone(),
            status: s.status,
            loaded: s.sum(),
            total: s.total,
            percent: s.percent(),
            bytes_per_second: self.speed.bytes_per_second(),
            eta,
            error: s.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn session(total: u64) -> UploadSession {
        UploadSession::new("movie.mp4", total, CancellationToken::new())
    }

    #[test]
    fn aggregate_is_byte_weighted() {
        let s = session(150);
        s.start();
        let (loaded, percent) = s.set_loaded(0, 100);
        assert_eq!(loaded, 100);
        assert!((percent - 66.666_666).abs() < 1e-3);

        let (_, percent) = s.set_loaded(1, 0);
        assert!((percent - 66.666_666).abs() < 1e-3);

        let (loaded, percent) = s.set_loaded(1, 50);
        assert_eq!(loaded, 150);
        assert_eq!(percent, 100.0);
    }

    #[test]
    fn partial_chunks_weigh_by_bytes() {
        // 100 + 50 byte chunks, 50 bytes each: 100/150, not the 75% mean of
        // the per-chunk percentages.
        let s = session(150);
        s.start();
        s.set_loaded(0, 50);
        let (loaded, percent) = s.set_loaded(1, 50);
        assert_eq!(loaded, 100);
        assert!((percent - 66.67).abs() < 0.01, "got {percent}");
        assert!((percent - 75.0).abs() > 1.0);
    }

    #[test]
    fn eta_follows_remaining_bytes() {
        let s = session(1000);
        s.start();
        assert!(s.eta().is_none());
        assert!(s.progress().eta.is_none());

        s.set_loaded(0, 100);
        std::thread::sleep(Duration::from_millis(20));
        s.set_loaded(0, 200);
        let eta = s.eta().unwrap();
        assert!(eta > Duration::ZERO);

        s.set_loaded(0, 1000);
        assert_eq!(s.eta(), Some(Duration::ZERO));
    }

    #[test]
    fn reset_drops_failed_attempt() {
        let s = session(100);
        s.set_loaded(0, 40);
        s.set_loaded(1, 30);
        s.reset(1);
        assert_eq!(s.loaded(), 40);
        assert_eq!(s.percent(), 40.0);
    }

    #[test]
    fn percent_is_clamped_and_empty_is_done() {
        let s = session(10);
        s.set_loaded(0, 25);
        assert_eq!(s.percent(), 100.0);
        assert_eq!(session(0).percent(), 100.0);
    }

    #[test]
    fn lifecycle() {
        let s = session(10);
        assert_eq!(s.status(), UploadStatus::Pending);
        assert!(s.is_active());

        s.start();
        assert_eq!(s.status(), UploadStatus::InProgress);

        s.fail("chunk 2 failed");
        assert_eq!(s.status(), UploadStatus::Failed);
        assert!(!s.is_active());
        assert_eq!(s.progress().error.as_deref(), Some("chunk 2 failed"));

        let s = session(10);
        s.start();
        s.complete();
        assert_eq!(s.status(), UploadStatus::Completed);
        assert!(!s.cancel_token().is_cancelled());
    }

    #[test]
    fn cancel_triggers_token() {
        let s = session(10);
        s.start();
        s.cancel();
        assert_eq!(s.status(), UploadStatus::Cancelled);
        assert!(s.cancel_token().is_cancelled());
    }

    #[test]
    fn first_failure_wins() {
        let s = session(10);
        let first = TransportError::Http {
            status: 500,
            body: String::new(),
        };
        assert!(s.record_failure(3, &first));
        assert!(s.cancel_token().is_cancelled());
        assert!(!s.record_failure(1, &TransportError::Timeout));
        assert_eq!(s.root_cause(), Some((3, first)));
    }

    #[test]
    fn child_token_follows_parent() {
        let parent = CancellationToken::new();
        let s = UploadSession::new("a", 1, parent.child_token());
        parent.cancel();
        assert!(s.cancel_token().is_cancelled());
    }

    #[test]
    fn snapshot_and_ids() {
        let a = session(200);
        let b = session(200);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.file_name(), "movie.mp4");
        assert_eq!(a.total(), 200);

        a.start();
        a.set_loaded(0, 50);
        let p = a.progress();
        assert_eq!(p.session_id, a.id());
        assert_eq!(p.status, UploadStatus::InProgress);
        assert_eq!((p.loaded, p.total), (50, 200));
        assert_eq!(p.percent, 25.0);
        assert!(p.error.is_none());
    }

    #[test]
    fn concurrent_updates() {
        let s = Arc::new(session(8 * 1000));
        let handles: Vec<_> = (0..8u32)
            .map(|index| {
                let s = Arc::clone(&s);
                std::thread::spawn(move || {
                    for loaded in 1..=1000 {
                        s.set_loaded(index, loaded);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(s.loaded(), 8000);
        assert_eq!(s.percent(), 100.0);
    }
}
