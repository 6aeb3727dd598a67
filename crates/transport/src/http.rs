//! `reqwest`-backed transport.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::multipart::progress_stream;
use crate::request::{Progress, ProgressCallback, Request, RequestBody, Response};
use crate::{Transport, TransportError};

/// HTTP transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    default_timeout: Option<Duration>,
}

impl HttpTransport {
    /// Creates a transport with a fresh client and no default timeout.
    pub fn new() -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::with_client(http))
    }

    /// Wraps an existing client (shares its connection pool).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            default_timeout: None,
        }
    }

    /// Timeout applied to requests that don't set their own.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Performs one exchange, honouring cancellation and timeout.
    pub async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        let cancel = request.cancel.clone().unwrap_or_else(CancellationToken::new);
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        let timeout = request.timeout.or(self.default_timeout);
        let url = request.url.clone();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%url, "request cancelled in flight");
                Err(TransportError::Cancelled)
            }
            result = with_timeout(timeout, self.exchange(request)) => result,
        }
    }

    async fn exchange(&self, request: Request) -> Result<Response, TransportError> {
        let has_content_type = request.has_content_type();
        let Request {
            url,
            method,
            headers,
            body,
            on_upload_progress,
            on_download_progress,
            ..
        } = request;

        let multipart = matches!(body, RequestBody::Multipart(_));
        let mut builder = self.http.request(method.into(), &url);
        for (name, value) in &headers {
            // The multipart encoder owns Content-Type (it carries the boundary).
            if multipart && name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(data) => attach(builder, data, on_upload_progress),
            RequestBody::Json(value) => {
                let data = serde_json::to_vec(&value)?;
                if !has_content_type {
                    builder = builder.header(CONTENT_TYPE, "application/json");
                }
                attach(builder, data, on_upload_progress)
            }
            RequestBody::Multipart(payload) => {
                builder.multipart(payload.into_form(on_upload_progress)?)
            }
        };

        let mut resp = builder.send().await?;
        let status = resp.status();
        let resp_headers = resp
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();

        let total = resp.content_length();
        let mut body = Vec::with_capacity(total.unwrap_or(0).min(16 * 1024 * 1024) as usize);
        while let Some(piece) = resp.chunk().await? {
            body.extend_from_slice(&piece);
            if let (Some(total), Some(cb)) = (total, &on_download_progress) {
                cb(Progress::new(body.len() as u64, total));
            }
        }

        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(Response {
            status: status.as_u16(),
            headers: resp_headers,
            body,
        })
    }
}

/// Attaches a byte body, streaming it when upload progress is requested.
fn attach(
    builder: reqwest::RequestBuilder,
    data: Vec<u8>,
    progress: Option<ProgressCallback>,
) -> reqwest::RequestBuilder {
    match progress {
        Some(cb) => {
            let len = data.len() as u64;
            let stream = progress_stream(data, Arc::new(AtomicU64::new(0)), len, cb);
            builder
                .header(CONTENT_LENGTH, len.to_string())
                .body(reqwest::Body::wrap_stream(stream))
        }
        None => builder.body(data),
    }
}

async fn with_timeout<F>(timeout: Option<Duration>, fut: F) -> Result<Response, TransportError>
where
    F: Future<Output = Result<Response, TransportError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| TransportError::Timeout)?,
        None => fut.await,
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        request: Request,
    ) -> Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send + '_>> {
        Box::pin(self.execute(request))
    }
}
