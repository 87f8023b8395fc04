//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as WsRequest, Response as WsResponse,
};
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// A request as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: String,
}

/// Start a programmable mock backend on an ephemeral loopback port.
///
/// Every request is answered with the `(status, body)` returned by `f`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(RecordedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let Some((request, mut socket)) = read_request(socket).await else {
                    return;
                };
                let (status, body) = f(request).await;
                let status_text = match status {
                    200 => "200 OK",
                    201 => "201 Created",
                    400 => "400 Bad Request",
                    401 => "401 Unauthorized",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    502 => "502 Bad Gateway",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

async fn read_request(socket: TcpStream) -> Option<(RecordedRequest, TcpStream)> {
    let mut reader = BufReader::new(socket);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await.ok()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut content_length = 0usize;
    let mut authorization = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.ok()? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "authorization" => authorization = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await.ok()?;

    let request = RecordedRequest {
        method,
        path,
        authorization,
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    Some((request, reader.into_inner()))
}

/// One accepted push connection.
pub struct PushPeer {
    /// Request URI including the query string.
    pub uri: String,
    /// Frames to send; dropping the sender closes the connection.
    pub frames: mpsc::UnboundedSender<WsMessage>,
}

/// Start a WebSocket push server on an ephemeral loopback port.
///
/// Each accepted connection is reported on the returned receiver. The
/// server sends whatever is queued on the peer's `frames` channel and
/// closes the socket once that channel is dropped.
pub async fn start_push_server() -> (SocketAddr, mpsc::UnboundedReceiver<PushPeer>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (peers_tx, peers_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let peers_tx = peers_tx.clone();
            tokio::spawn(async move {
                let uri = Arc::new(Mutex::new(String::new()));
                let captured = uri.clone();
                let callback = move |request: &WsRequest, response: WsResponse| {
                    *captured.lock().unwrap() = request.uri().to_string();
                    Ok::<_, ErrorResponse>(response)
                };
                let Ok(mut stream) = tokio_tungstenite::accept_hdr_async(socket, callback).await
                else {
                    return;
                };

                let (frames, mut outbound) = mpsc::unbounded_channel();
                let uri = uri.lock().unwrap().clone();
                if peers_tx.send(PushPeer { uri, frames }).is_err() {
                    return;
                }

                loop {
                    tokio::select! {
                        frame = outbound.recv() => match frame {
                            Some(frame) => {
                                if stream.send(frame).await.is_err() {
                                    return;
                                }
                            }
                            None => {
                                let _ = stream.close(None).await;
                                return;
                            }
                        },
                        incoming = stream.next() => match incoming {
                            Some(Ok(_)) => {}
                            _ => return,
                        },
                    }
                }
            });
        }
    });

    (addr, peers_rx)
}

pub fn message_json(id: i64, receiver: &str, content: &str) -> String {
    format!(
        r#"{{"id":{},"receiver_username":"{}","content":"{}","created_at":"2024-01-01T00:00:00Z","is_read":false}}"#,
        id, receiver, content
    )
}
