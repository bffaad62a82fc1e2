//! Per-connection WebSocket handling.
//!
//! Each connection runs two halves: the reader (this handler's own loop)
//! feeds binary PCM frames into the session's ring, and a spawned writer
//! task owns the socket sink exclusively. The writer sleeps on a wake
//! channel registered with the `WsBridge`; the courier's `defer_flush`
//! lands there, the writer clears the flush flag, drains the outbound
//! queue, and sends. Nothing outside the writer task ever touches the
//! sink.

use crate::engine::courier::{self, IoBridge};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

use super::AppState;
use crate::protocol::ServerMessage;

/// Per-session wake channels into the connection writer tasks.
///
/// This is the engine's door into the I/O layer: `defer_flush` posts a
/// wakeup bound to a session id; the session's writer task picks it up on
/// its own executor. A missing entry means the connection is already gone
/// and the wakeup is dropped (the queue is discarded at destroy).
pub struct WsBridge {
    wakers: Mutex<HashMap<String, mpsc::UnboundedSender<()>>>,
}

impl WsBridge {
    pub fn new() -> Self {
        Self {
            wakers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a session's writer; returns the receiving end of its
    /// wake channel.
    pub fn register(&self, session_id: &str) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.wakers.lock().unwrap().insert(session_id.to_string(), tx);
        rx
    }

    /// Drop a session's wake channel; subsequent flushes are no-ops.
    pub fn unregister(&self, session_id: &str) {
        self.wakers.lock().unwrap().remove(session_id);
    }

    #[cfg(test)]
    fn is_registered(&self, session_id: &str) -> bool {
        self.wakers.lock().unwrap().contains_key(session_id)
    }
}

impl Default for WsBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl IoBridge for WsBridge {
    fn defer_flush(&self, session_id: &str) {
        if let Some(waker) = self.wakers.lock().unwrap().get(session_id) {
            // A closed channel means the writer is gone; the registry
            // drain on destroy handles the leftovers.
            let _ = waker.send(());
        }
    }
}

/// Check the shared-token query parameter against the configured token.
fn token_accepted(auth_token: &str, params: &HashMap<String, String>) -> bool {
    if auth_token.is_empty() {
        return true;
    }
    params.get("token").is_some_and(|token| token == auth_token)
}

/// Upgrade handler for `GET /`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Response {
    if !token_accepted(&state.auth_token, &params) {
        return (StatusCode::UNAUTHORIZED, "Invalid or missing token").into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // Admission: a session only exists if a context slot is free.
    let session = match state.registry.create() {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("connection refused: {}", e);
            let refusal = ServerMessage::Error {
                message: "No available contexts, try again later".to_string(),
            };
            let _ = sink.send(Message::Text(refusal.to_json().into())).await;
            let _ = sink.close().await;
            return;
        }
    };
    let session_id = session.id.clone();
    tracing::info!(session = %session_id, "connected");

    if sink
        .send(Message::Text(state.ready_message.clone().into()))
        .await
        .is_err()
    {
        state.registry.destroy(&session_id);
        return;
    }

    // Writer half: sole owner of the sink for the rest of the
    // connection. Ends when the wake channel is unregistered.
    let mut wake_rx = state.bridge.register(&session_id);
    let writer_session = session.clone();
    let writer = tokio::spawn(async move {
        while wake_rx.recv().await.is_some() {
            for message in courier::take_for_flush(&writer_session) {
                if sink.send(Message::Text(message.into())).await.is_err() {
                    return;
                }
            }
        }
    });

    // Reader half: this task.
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Binary(bytes)) => {
                session.audio.push_pcm16(&decode_pcm16(&bytes));
            }
            Ok(Message::Text(text)) => {
                // Reserved for future control commands
                tracing::debug!(session = %session_id, frame = %text.as_str(), "ignoring text frame");
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // ping/pong are answered by the ws layer
            Err(e) => {
                tracing::debug!(session = %session_id, "socket error: {}", e);
                break;
            }
        }
    }

    // Teardown: detach the socket first so no further flushes land,
    // then wait out any in-flight inference off the async runtime.
    state.bridge.unregister(&session_id);
    let _ = writer.await;

    let registry = state.registry.clone();
    let destroy_id = session_id.clone();
    drop(session);
    let _ = tokio::task::spawn_blocking(move || registry.destroy(&destroy_id)).await;

    tracing::info!(session = %session_id, "disconnected");
}

/// Interpret raw bytes as little-endian 16-bit PCM samples.
///
/// A trailing odd byte cannot form a sample and is ignored.
fn decode_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pcm16_little_endian() {
        let bytes = [0x01, 0x00, 0x00, 0x80, 0xff, 0x7f];
        assert_eq!(decode_pcm16(&bytes), vec![1, i16::MIN, i16::MAX]);
    }

    #[test]
    fn test_decode_pcm16_ignores_trailing_odd_byte() {
        let bytes = [0x02, 0x00, 0xaa];
        assert_eq!(decode_pcm16(&bytes), vec![2]);
    }

    #[test]
    fn test_decode_pcm16_empty() {
        assert!(decode_pcm16(&[]).is_empty());
    }

    #[test]
    fn test_token_accepted_when_auth_disabled() {
        assert!(token_accepted("", &HashMap::new()));
    }

    #[test]
    fn test_token_accepted_on_exact_match() {
        let mut params = HashMap::new();
        params.insert("token".to_string(), "secret".to_string());
        assert!(token_accepted("secret", &params));
    }

    #[test]
    fn test_token_rejected_on_mismatch_or_absence() {
        let mut params = HashMap::new();
        params.insert("token".to_string(), "wrong".to_string());
        assert!(!token_accepted("secret", &params));
        assert!(!token_accepted("secret", &HashMap::new()));
    }

    #[test]
    fn test_bridge_register_unregister() {
        let bridge = WsBridge::new();
        let _rx = bridge.register("session-1");
        assert!(bridge.is_registered("session-1"));

        bridge.unregister("session-1");
        assert!(!bridge.is_registered("session-1"));
    }

    #[tokio::test]
    async fn test_bridge_defer_flush_wakes_registered_writer() {
        let bridge = WsBridge::new();
        let mut rx = bridge.register("session-1");

        bridge.defer_flush("session-1");
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn test_bridge_defer_flush_unknown_session_is_noop() {
        let bridge = WsBridge::new();
        bridge.defer_flush("session-unknown");
    }

    #[tokio::test]
    async fn test_bridge_unregister_ends_wake_stream() {
        let bridge = WsBridge::new();
        let mut rx = bridge.register("session-1");
        bridge.unregister("session-1");

        assert!(rx.recv().await.is_none());
    }
}
