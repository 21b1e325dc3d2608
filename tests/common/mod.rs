//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use relay_proxy::config::ProxyConfig;
use relay_proxy::http::HttpServer;
use relay_proxy::lifecycle::Shutdown;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// What a mock backend sends back.
#[derive(Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: Option<&'static str>,
    /// Each entry is written as its own chunk, with a pause in between.
    pub chunks: Vec<&'static str>,
}

impl MockResponse {
    pub fn new(content_type: &'static str, body: &'static str) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type),
            chunks: vec![body],
        }
    }

    pub fn chunked(content_type: &'static str, chunks: Vec<&'static str>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type),
            chunks,
        }
    }
}

/// A running mock backend.
pub struct MockBackend {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    last_request: Arc<Mutex<Option<String>>>,
}

impl MockBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Raw head and body of the most recent request, as received.
    pub fn last_request(&self) -> Option<String> {
        self.last_request.lock().unwrap().clone()
    }
}

/// Start a mock backend on an ephemeral port.
pub async fn start_mock_backend(response: MockResponse) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let last_request = Arc::new(Mutex::new(None));

    let backend = MockBackend {
        addr,
        calls: calls.clone(),
        last_request: last_request.clone(),
    };

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let response = response.clone();
            let calls = calls.clone();
            let last_request = last_request.clone();
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                calls.fetch_add(1, Ordering::SeqCst);
                *last_request.lock().unwrap() = Some(request);
                write_response(&mut socket, &response).await;
            });
        }
    });

    backend
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return String::from_utf8_lossy(&buf).into_owned();
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    String::from_utf8_lossy(&buf).into_owned()
}

async fn write_response(socket: &mut TcpStream, response: &MockResponse) {
    let status_text = match response.status {
        200 => "200 OK",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        _ => "200 OK",
    };

    let mut head = format!("HTTP/1.1 {}\r\nConnection: close\r\n", status_text);
    if let Some(content_type) = response.content_type {
        head.push_str(&format!("Content-Type: {}\r\n", content_type));
    }

    if response.chunks.len() == 1 {
        let body = response.chunks[0];
        head.push_str(&format!("Content-Length: {}\r\n\r\n{}", body.len(), body));
        let _ = socket.write_all(head.as_bytes()).await;
    } else {
        head.push_str("Transfer-Encoding: chunked\r\n\r\n");
        let _ = socket.write_all(head.as_bytes()).await;
        for chunk in &response.chunks {
            let frame = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
            let _ = socket.write_all(frame.as_bytes()).await;
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let _ = socket.write_all(b"0\r\n\r\n").await;
    }

    let _ = socket.shutdown().await;
}

/// A relay instance bound to an ephemeral port.
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    /// Completes once the server has stopped serving.
    pub server: JoinHandle<()>,
}

impl RunningProxy {
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }
}

/// Start the relay with `config`, ignoring the configured listener.
pub async fn start_proxy(config: ProxyConfig) -> RunningProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let receiver = shutdown.subscribe();

    let server = tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });

    RunningProxy {
        addr,
        shutdown,
        server,
    }
}
