//! Mock feed server for integration tests.
//!
//! Speaks the feed's array protocol:
//! - auth `[1, app, user, pass, details]` -> `[5, {"u": user}]` then
//!   `[1, null, null, session_id, app]`
//! - subscribe `[6, app, plugin, {cmd, ..}]` -> `[7, 0, plugin]` and, for
//!   commands with configured rounds, `[5, {"cmd": cmd, "htr": [...]}]`
//!   preceded by any configured `noise_before_data` frames
//! - heartbeat `[0, ..]` -> `[0, "pong"]`
//!
//! Every received text frame is recorded.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub const SESSION_ID: &str = "sess-1";

#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// `htr` payload returned per subscribed command.
    pub rounds: HashMap<u32, Value>,
    /// Close this many connections right after the WebSocket handshake.
    pub drop_first_connections: u32,
    /// Raw text frames sent before each channel data frame.
    pub noise_before_data: Vec<String>,
}

struct Shared {
    behavior: MockBehavior,
    messages: Mutex<Vec<String>>,
    connections: Mutex<u32>,
}

/// A mock feed server bound to an ephemeral port.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    shared: Arc<Shared>,
}

impl MockWsServer {
    pub async fn start(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let shared = Arc::new(Shared {
            behavior,
            messages: Mutex::new(Vec::new()),
            connections: Mutex::new(0),
        });

        let shared_clone = shared.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(stream, shared_clone.clone()));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            shared,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/websocket", self.addr)
    }

    pub async fn connection_count(&self) -> u32 {
        *self.shared.connections.lock().await
    }

    pub async fn received_messages(&self) -> Vec<String> {
        self.shared.messages.lock().await.clone()
    }

    /// Received frames parsed as JSON arrays with the given leading tag.
    pub async fn received_with_tag(&self, tag: u64) -> Vec<Value> {
        self.received_messages()
            .await
            .iter()
            .filter_map(|text| serde_json::from_str::<Value>(text).ok())
            .filter(|v| v.get(0).and_then(Value::as_u64) == Some(tag))
            .collect()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(stream: TcpStream, shared: Arc<Shared>) {
    let index = {
        let mut count = shared.connections.lock().await;
        *count += 1;
        *count
    };

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {e}");
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    if index <= shared.behavior.drop_first_connections {
        let _ = write.send(Message::Close(None)).await;
        return;
    }

    while let Some(msg) = read.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        shared.messages.lock().await.push(text.clone());

        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        for reply in replies(&shared.behavior, &frame) {
            if write.send(Message::Text(reply)).await.is_err() {
                return;
            }
        }
    }
}

fn replies(behavior: &MockBehavior, frame: &Value) -> Vec<String> {
    match frame.get(0).and_then(Value::as_u64) {
        Some(1) => {
            let app = frame.get(1).cloned().unwrap_or(Value::Null);
            let user = frame.get(2).cloned().unwrap_or(Value::Null);
            vec![
                json!([5, { "u": user }]).to_string(),
                json!([1, null, null, SESSION_ID, app]).to_string(),
            ]
        }
        Some(6) => {
            let plugin = frame.get(2).cloned().unwrap_or(Value::Null);
            let mut out = vec![json!([7, 0, plugin]).to_string()];
            let cmd = frame
                .get(3)
                .and_then(|p| p.get("cmd"))
                .and_then(Value::as_u64);
            if let Some(cmd) = cmd {
                if let Some(htr) = behavior.rounds.get(&(cmd as u32)) {
                    out.extend(behavior.noise_before_data.iter().cloned());
                    out.push(json!([5, { "cmd": cmd, "htr": htr }]).to_string());
                }
            }
            out
        }
        Some(0) => vec![json!([0, "pong"]).to_string()],
        _ => Vec::new(),
    }
}
