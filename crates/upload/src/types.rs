//! Data types for the upload flow.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where chunks are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub url: String,
    /// Extra headers sent with every chunk request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
}

impl UploadTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Upload parameters. Durations are (de)serialized as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UploadOptions {
    /// Maximum chunks in flight; 0 is treated as 1.
    pub limit: usize,
    /// Extra attempts after the first one fails.
    pub max_retries: u32,
    /// Per-request timeout.
    #[serde(rename = "timeoutMs", with = "opt_millis")]
    pub timeout: Option<Duration>,
    /// Pause between attempts of the same chunk.
    #[serde(rename = "retryDelayMs", with = "millis")]
    pub retry_delay: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            max_retries: 3,
            timeout: None,
            retry_delay: Duration::from_millis(500),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

/// Lifecycle of one file upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UploadStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl UploadStatus {
    /// `true` until the upload has settled.
    pub fn is_active(self) -> bool {
        matches!(self, UploadStatus::Pending | UploadStatus::InProgress)
    }
}

/// Snapshot of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub session_id: String,
    pub file_name: String,
    pub status: UploadStatus,
    pub loaded: u64,
    pub total: u64,
    pub percent: f64,
    pub bytes_per_second: f64,
    /// Time left at the current speed; `None` until a speed is known.
    #[serde(rename = "etaMs", with = "opt_millis", skip_serializing_if = "Option::is_none")]
    pub eta: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Event emitted while uploading.
///
/// Every variant carries the id of the session it belongs to, so uploads
/// running concurrently on one uploader can be told apart.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// A session was opened for `file_name`.
    Started {
        session_id: String,
        file_name: String,
        total: u64,
    },
    /// Aggregate progress for the file, triggered by chunk `index`.
    Progress {
        session_id: String,
        index: u32,
        percent: f64,
        loaded: u64,
        total: u64,
        bytes_per_second: f64,
        eta: Option<Duration>,
    },
    /// A chunk was accepted by the server.
    ChunkUploaded {
        session_id: String,
        index: u32,
        status: u16,
    },
    /// Every chunk of the file was accepted.
    Completed {
        session_id: String,
        file_name: String,
    },
    /// The upload failed; `index` is the chunk that caused it, if any.
    Failed {
        session_id: String,
        index: Option<u32>,
        error: String,
    },
}

impl UploadEvent {
    pub fn session_id(&self) -> &str {
        match self {
            UploadEvent::Started { session_id, .. }
            | UploadEvent::Progress { session_id, .. }
            | UploadEvent::ChunkUploaded { session_id, .. }
            | UploadEvent::Completed { session_id, .. }
            | UploadEvent::Failed { session_id, .. } => session_id,
        }
    }
}
