//! Minimal HTTP/1.1 server for transport tests.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// A request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct Captured {
    /// Request line and headers, lowercased.
    pub head: String,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// What the server does after reading a request.
#[derive(Debug, Clone)]
pub enum Reply {
    Status { status: u16, body: String },
    Stall,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Reads one request: headers, then a `Content-Length` or chunked body.
pub async fn read_request(stream: &mut TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 16 * 1024];

    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut tmp).await.unwrap_or(0);
        if n == 0 {
            return Captured {
                head: String::from_utf8_lossy(&buf).to_lowercase(),
                body: Vec::new(),
            };
        }
        buf.extend_from_slice(&tmp[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let body_start = header_end + 4;
    let content_length = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok());

    let done = |buf: &[u8]| match content_length {
        Some(len) => buf.len() >= body_start + len,
        None if head.contains("transfer-encoding: chunked") => {
            buf[body_start..].ends_with(b"0\r\n\r\n")
        }
        None => true,
    };

    while !done(&buf) {
        let n = stream.read(&mut tmp).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
    }

    let end = content_length.map_or(buf.len(), |len| (body_start + len).min(buf.len()));
    Captured {
        head,
        body: buf[body_start..end].to_vec(),
    }
}

pub async fn write_response(stream: &mut TcpStream, status: u16, body: &str) {
    let resp = format!(
        "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(resp.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Serves `replies` in order, one per connection, forwarding what it read.
pub async fn serve(
    replies: Vec<Reply>,
) -> (String, mpsc::UnboundedReceiver<Captured>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let url = format!("http://127.0.0.1:{port}");
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        for reply in replies {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let captured = read_request(&mut stream).await;
            let _ = tx.send(captured);
            match reply {
                Reply::Status { status, body } => write_response(&mut stream, status, &body).await,
                Reply::Stall => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
            }
        }
    });

    (url, rx, handle)
}

/// URL of a port with nothing listening on it.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}
