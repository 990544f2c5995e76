//! Shared utilities for integration tests: a scriptable mock upstream.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// How the mock answers one request
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    /// Answer immediately with this status and body
    Respond(u16, &'static str),
    /// Never answer; wait for the client to close the connection
    Hang,
}

/// Handle to a running mock upstream
#[derive(Clone)]
pub struct MockUpstream {
    pub addr: SocketAddr,
    /// Request heads (request line + headers) in arrival order
    pub requests: Arc<Mutex<Vec<String>>>,
    /// Number of requests received
    pub hits: Arc<AtomicUsize>,
    /// Set once a hanging request's connection was closed by the client
    pub closed: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl MockUpstream {
    /// Base URL for the gateway's `upstream.base_url`
    pub fn base_url(&self) -> String {
        format!("http://{}/validate", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<String> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// Wait until a hanging connection has been closed by the client
    pub async fn wait_closed(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.closed.load(Ordering::SeqCst) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.closed.load(Ordering::SeqCst)
    }
}

/// Start a mock upstream answering every request with the same reply
#[allow(dead_code)]
pub async fn start_mock_upstream(reply: Reply) -> MockUpstream {
    start_programmable_upstream(move |_| reply).await
}

/// Start a mock upstream that picks its reply from the request head
pub async fn start_programmable_upstream<F>(f: F) -> MockUpstream
where
    F: Fn(&str) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mock = MockUpstream {
        addr: listener.local_addr().unwrap(),
        requests: Arc::new(Mutex::new(Vec::new())),
        hits: Arc::new(AtomicUsize::new(0)),
        closed: Arc::new(AtomicBool::new(false)),
    };

    let f = Arc::new(f);
    let state = mock.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let f = f.clone();
            let state = state.clone();
            tokio::spawn(async move { serve_connection(socket, f.as_ref(), state).await });
        }
    });

    mock
}

async fn serve_connection<F>(mut socket: TcpStream, f: &F, state: MockUpstream)
where
    F: Fn(&str) -> Reply,
{
    let Some(head) = read_head(&mut socket).await else {
        return;
    };
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.requests.lock().unwrap().push(head.clone());

    match f(&head) {
        Reply::Respond(status, body) => {
            let response = format!(
                "HTTP/1.1 {} Mock\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
        Reply::Hang => {
            let mut buf = [0u8; 1024];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
            state.closed.store(true, Ordering::SeqCst);
        }
    }
}

async fn read_head(socket: &mut TcpStream) -> Option<String> {
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            return Some(String::from_utf8_lossy(&data[..end]).into_owned());
        }
    }
}
