//! Health & status API endpoints
//!
//! Operator-facing HTTP endpoints:
//! - GET /health - Simple health check
//! - GET /metrics - Prometheus metrics
//! - GET /status - Queue depth, pending withdrawals, checkpoint, uptime

use eyre::Result;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::amounts::format_ban;
use crate::ledger::LedgerStore;
use crate::metrics;
use crate::queue::OperationQueue;

/// Server start time for uptime calculation.
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Maximum concurrent connections to the API server.
const API_MAX_CONNECTIONS: usize = 128;

/// Read timeout for incoming connections.
const API_READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    uptime_seconds: u64,
    queue: QueueStatus,
    last_processed_block: u64,
}

#[derive(Serialize)]
struct QueueStatus {
    depth: u64,
    dead_letter: u64,
    /// Human-readable BAN amount waiting on hot-wallet funds.
    pending_withdrawals: String,
}

/// Start the API server (combines metrics and status endpoints).
pub async fn start_api_server(
    addr: SocketAddr,
    ledger: Arc<LedgerStore>,
    queue: Arc<OperationQueue>,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server started");

    START_TIME.get_or_init(Instant::now);
    metrics::UP.set(1.0);

    let semaphore = Arc::new(Semaphore::new(API_MAX_CONNECTIONS));

    loop {
        let (mut socket, _) = listener.accept().await?;
        let sem = semaphore.clone();
        let ledger = ledger.clone();
        let queue = queue.clone();

        tokio::spawn(async move {
            let _permit = match sem.acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };

            let mut buf = [0u8; 4096];
            let n = match tokio::time::timeout(API_READ_TIMEOUT, socket.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => n,
                _ => return,
            };

            let (method, path) = match parse_request(&buf[..n]) {
                Some(mp) => mp,
                None => {
                    let _ = socket
                        .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
                        .await;
                    return;
                }
            };

            match (method.as_str(), path.as_str()) {
                ("GET", "/metrics") => {
                    let encoder = TextEncoder::new();
                    let metric_families = prometheus::gather();
                    let mut buffer = Vec::new();
                    let _ = encoder.encode(&metric_families, &mut buffer);

                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\n\r\n",
                        buffer.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.write_all(&buffer).await;
                }
                ("GET", "/health") | ("GET", "/") => {
                    let response =
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK";
                    let _ = socket.write_all(response.as_bytes()).await;
                }
                ("GET", "/status") => {
                    let status = build_status_response(&ledger, &queue).await;
                    let body = serde_json::to_string(&status).unwrap_or_else(|_| "{}".to_string());
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                }
                _ => {
                    let response = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";
                    let _ = socket.write_all(response.as_bytes()).await;
                }
            }
        });
    }
}

/// Parse HTTP method and path from raw request bytes.
fn parse_request(buf: &[u8]) -> Option<(String, String)> {
    let request = std::str::from_utf8(buf).ok()?;
    let first_line = request.lines().next()?;
    let mut parts = first_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();
    Some((method, path))
}

async fn build_status_response(ledger: &LedgerStore, queue: &OperationQueue) -> StatusResponse {
    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);

    let pending = queue
        .pending_withdrawal_total()
        .await
        .unwrap_or_default();
    metrics::set_pending_withdrawals(format_ban(pending).parse().unwrap_or(0.0));

    StatusResponse {
        status: "ok".to_string(),
        uptime_seconds: uptime,
        queue: QueueStatus {
            depth: queue.depth().await.unwrap_or(0),
            dead_letter: queue.dead_letter_count().await.unwrap_or(0),
            pending_withdrawals: format_ban(pending),
        },
        last_processed_block: ledger.last_processed_block().await.unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        assert_eq!(
            parse_request(b"GET /status HTTP/1.1\r\nHost: x\r\n\r\n"),
            Some(("GET".to_string(), "/status".to_string()))
        );
        assert_eq!(parse_request(b"\xff\xfe"), None);
        assert_eq!(parse_request(b""), None);
    }
}
