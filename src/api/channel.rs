//! Push channel for low-latency workflow updates.
//!
//! This module provides `WsConnector`, which opens `/ws/{session_id}` over a
//! WebSocket and forwards decoded server messages through a channel.
//!
//! Architecture:
//! 1. `connect()` performs the upgrade handshake
//! 2. A background task owns the socket: it forwards frames, sends keep-alive
//!    pings and watches the shutdown signal
//! 3. The caller gets a [`PushChannel`] made of an event receiver and a
//!    [`PushCloser`]; closing or dropping the closer ends the task
//!
//! The task stops by itself when the server closes the socket. There is no
//! reconnection.

use super::error::TransportError;
use super::push::{ClientMessage, PushMessage};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

/// Events delivered by an open push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Message(PushMessage),
    /// The channel is gone; no further events follow.
    Closed { reason: Option<String> },
}

/// Shuts a push connection down. Dropping it has the same effect as `close()`.
#[derive(Debug)]
pub struct PushCloser {
    tx: Option<oneshot::Sender<()>>,
}

impl PushCloser {
    pub fn new(tx: oneshot::Sender<()>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_none_or(|tx| tx.is_closed())
    }
}

impl Drop for PushCloser {
    fn drop(&mut self) {
        self.close();
    }
}

/// An open push connection for one session.
#[derive(Debug)]
pub struct PushChannel {
    pub events: mpsc::UnboundedReceiver<PushEvent>,
    pub closer: PushCloser,
}

impl PushChannel {
    /// Builds a channel plus the producer ends: the event sender and the
    /// shutdown receiver the producer must watch.
    pub fn pair() -> (
        Self,
        mpsc::UnboundedSender<PushEvent>,
        oneshot::Receiver<()>,
    ) {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        (
            Self {
                events,
                closer: PushCloser::new(shutdown_tx),
            },
            event_tx,
            shutdown_rx,
        )
    }
}

/// Opens push channels. One call per session.
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, session_id: &str) -> Result<PushChannel, TransportError>;
}

/// tokio-tungstenite backed connector.
#[derive(Debug, Clone)]
pub struct WsConnector {
    ws_root: String,
    ping_interval: Duration,
}

impl WsConnector {
    pub fn new(ws_root: &str, ping_interval: Duration) -> Self {
        Self {
            ws_root: ws_root.trim_end_matches('/').to_string(),
            ping_interval,
        }
    }

    pub fn url_for(&self, session_id: &str) -> String {
        format!("{}/ws/{}", self.ws_root, session_id)
    }
}

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self, session_id: &str) -> Result<PushChannel, TransportError> {
        let url = self.url_for(session_id);
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Network {
                message: format!("push channel {}: {}", url, e),
            })?;
        tracing::info!("Push channel connected for session {}", session_id);

        let (channel, event_tx, shutdown_rx) = PushChannel::pair();
        let session = session_id.to_string();
        let ping_interval = self.ping_interval;
        tokio::spawn(async move {
            run_socket(socket, event_tx, shutdown_rx, ping_interval).await;
            tracing::debug!("Push channel task for session {} ended", session);
        });
        Ok(channel)
    }
}

async fn run_socket<S>(
    socket: tokio_tungstenite::WebSocketStream<S>,
    event_tx: mpsc::UnboundedSender<PushEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
    ping_interval: Duration,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = socket.split();
    let mut ping = tokio::time::interval_at(
        tokio::time::Instant::now() + ping_interval,
        ping_interval,
    );

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            _ = ping.tick() => {
                if let Err(e) = sink.send(Message::Text(ClientMessage::Ping.to_json())).await {
                    let _ = event_tx.send(PushEvent::Closed { reason: Some(e.to_string()) });
                    break;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match PushMessage::decode(&text) {
                    Ok(message) => {
                        if event_tx.send(PushEvent::Message(message)).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => tracing::warn!("Dropping malformed push frame: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty());
                    let _ = event_tx.send(PushEvent::Closed { reason });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = event_tx.send(PushEvent::Closed { reason: Some(e.to_string()) });
                    break;
                }
                None => {
                    let _ = event_tx.send(PushEvent::Closed { reason: None });
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
