use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::bridge::{Backend, BridgeError};

/// Canned-response HTTP server for exercising the installer, the bridge,
/// and full worker lifecycles without a real backend or registry.
pub(crate) struct StubServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

#[derive(Debug, Clone)]
pub(crate) struct StubRoute {
    pub path: String,
    pub status: u16,
    pub body: String,
}

impl StubRoute {
    pub fn new(path: &str, status: u16, body: &str) -> Self {
        Self {
            path: path.to_owned(),
            status,
            body: body.to_owned(),
        }
    }
}

impl StubServer {
    pub async fn serve(routes: Vec<StubRoute>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let routes = Arc::new(routes);
        let task = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(handle_connection(socket, routes.clone()));
            }
        });
        Ok(Self { addr, task })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_connection(mut socket: TcpStream, routes: Arc<Vec<StubRoute>>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let Ok(read) = socket.read(&mut chunk).await else {
            return;
        };
        if read == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..read]);
        if let Some(header_end) = find_header_end(&buf) {
            let expected = header_end + content_length(&buf[..header_end]);
            if buf.len() >= expected {
                break;
            }
        }
    }

    let request = String::from_utf8_lossy(&buf);
    let path = request.split_whitespace().nth(1).unwrap_or("/").to_owned();
    let (status, body) = routes
        .iter()
        .find(|route| route.path == path)
        .map(|route| (route.status, route.body.clone()))
        .unwrap_or((404, String::new()));
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

fn content_length(headers: &[u8]) -> usize {
    let text = String::from_utf8_lossy(headers);
    for line in text.lines() {
        if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            return value.trim().parse().unwrap_or(0);
        }
    }
    0
}

/// Backend double that always succeeds with a fixed reply.
pub(crate) struct FixedBackend {
    reply: String,
}

impl FixedBackend {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_owned(),
        }
    }
}

#[async_trait]
impl Backend for FixedBackend {
    async fn complete(&self, _prompt: &str) -> Result<String, BridgeError> {
        Ok(self.reply.clone())
    }
}

/// Backend double that always fails with a transport error.
pub(crate) struct FailingBackend;

#[async_trait]
impl Backend for FailingBackend {
    async fn complete(&self, _prompt: &str) -> Result<String, BridgeError> {
        Err(BridgeError::Transport("backend unavailable".to_owned()))
    }
}
