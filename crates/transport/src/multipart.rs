//! Cloneable multipart form model.
//!
//! `reqwest::multipart::Form` is consumed by a request and cannot be cloned,
//! so retries keep a [`MultipartPayload`] and build a fresh form per attempt.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};

use crate::TransportError;
use crate::request::{Progress, ProgressCallback};

/// Bytes handed to the HTTP stack per progress step.
pub(crate) const PROGRESS_STEP: usize = 64 * 1024;

/// One form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: Option<String>,
        data: Vec<u8>,
    },
}

impl Field {
    pub fn name(&self) -> &str {
        match self {
            Field::Text { name, .. } | Field::File { name, .. } => name,
        }
    }
}

/// Ordered list of form fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartPayload {
    fields: Vec<Field>,
}

impl MultipartPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(Field::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Appends a binary file field.
    pub fn file(mut self, name: impl Into<String>, file_name: impl Into<String>, data: Vec<u8>) -> Self {
        self.fields.push(Field::File {
            name: name.into(),
            file_name: file_name.into(),
            content_type: None,
            data,
        });
        self
    }

    /// Appends a binary file field with an explicit part content type.
    pub fn file_with_type(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.fields.push(Field::File {
            name: name.into(),
            file_name: file_name.into(),
            content_type: Some(content_type.into()),
            data,
        });
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Value of the first text field called `name`.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.fields.iter().find_map(|f| match f {
            Field::Text { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    /// Data of the first file field called `name`.
    pub fn get_file(&self, name: &str) -> Option<&[u8]> {
        self.fields.iter().find_map(|f| match f {
            Field::File { name: n, data, .. } if n == name => Some(data.as_slice()),
            _ => None,
        })
    }

    /// Total bytes across all file fields; the denominator for upload progress.
    pub fn file_bytes(&self) -> u64 {
        self.fields
            .iter()
            .map(|f| match f {
                Field::File { data, .. } => data.len() as u64,
                Field::Text { .. } => 0,
            })
            .sum()
    }

    /// Builds a `reqwest` form.
    ///
    /// With a progress callback, file fields are streamed in
    /// [`PROGRESS_STEP`] pieces and progress counts file bytes only.
    pub(crate) fn into_form(self, progress: Option<ProgressCallback>) -> Result<Form, TransportError> {
        let total = self.file_bytes();
        let loaded = Arc::new(AtomicU64::new(0));
        let mut form = Form::new();

        for field in self.fields {
            form = match field {
                Field::Text { name, value } => form.text(name, value),
                Field::File {
                    name,
                    file_name,
                    content_type,
                    data,
                } => {
                    let len = data.len() as u64;
                    let part = match &progress {
                        Some(cb) => {
                            let stream = progress_stream(data, Arc::clone(&loaded), total, Arc::clone(cb));
                            Part::stream_with_length(reqwest::Body::wrap_stream(stream), len)
                        }
                        None => Part::bytes(data),
                    };
                    let mut part = part.file_name(file_name);
                    if let Some(ct) = content_type {
                        part = part
                            .mime_str(&ct)
                            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                    }
                    form.part(name, part)
                }
            };
        }
        Ok(form)
    }
}

/// Splits `data` into pieces and reports progress as the HTTP stack pulls them.
pub(crate) fn progress_stream(
    data: Vec<u8>,
    loaded: Arc<AtomicU64>,
    total: u64,
    callback: ProgressCallback,
) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
    let pieces: Vec<Vec<u8>> = data.chunks(PROGRESS_STEP).map(<[u8]>::to_vec).collect();
    futures_util::stream::iter(pieces).map(move |piece| {
        let n = piece.len() as u64;
        let now = loaded.fetch_add(n, Ordering::Relaxed) + n;
        callback(Progress::new(now, total));
        Ok(piece)
    })
}
