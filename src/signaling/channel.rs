//! WebSocket channel to the call-room relay
//!
//! One channel per call. State moves `Closed → Opening → Open → Closed`;
//! a failed handshake goes straight back to `Closed`. A dropped connection
//! is terminal, there is no reconnect.

use super::messages::SignalMessage;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalingError {
    #[error("Signalling channel is not open")]
    NotOpen,

    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to send message: {0}")]
    SendFailed(String),
}

// ============================================================================
// CHANNEL STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Opening,
    Open,
}

// ============================================================================
// SIGNALING CHANNEL
// ============================================================================

pub struct SignalingChannel {
    room_name: String,
    /// Replaced on every `open`; a reader only ever writes its own cell
    state: Arc<RwLock<ChannelState>>,
    tx: Option<mpsc::UnboundedSender<Message>>,
    reader: Option<JoinHandle<()>>,
}

impl SignalingChannel {
    pub fn new(room_name: impl Into<String>) -> Self {
        Self {
            room_name: room_name.into(),
            state: Arc::new(RwLock::new(ChannelState::Closed)),
            tx: None,
            reader: None,
        }
    }

    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    pub fn state(&self) -> ChannelState {
        *self.state.read()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Connects to `url` and returns the inbound message queue
    ///
    /// Connection failures are logged, not returned: the channel stays
    /// `Closed` and the returned queue ends immediately.
    pub async fn open(&mut self, url: &Url) -> mpsc::UnboundedReceiver<SignalMessage> {
        self.close();

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        self.state = Arc::new(RwLock::new(ChannelState::Opening));

        let display_url = redacted(url);
        tracing::info!("Opening signalling channel for room {} at {}", self.room_name, display_url);

        let ws_stream = match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                tracing::error!("Signalling connection to {} failed: {}", display_url, e);
                *self.state.write() = ChannelState::Closed;
                return inbound_rx;
            }
        };

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        self.tx = Some(tx);
        *self.state.write() = ChannelState::Open;
        tracing::info!("Signalling channel open for room {}", self.room_name);

        // Reader: inbound frames to the queue
        let state = Arc::clone(&self.state);
        let room = self.room_name.clone();
        self.reader = Some(tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => match SignalMessage::from_json(&text) {
                        Ok(message) => {
                            tracing::debug!("Received {} in room {}", message.kind(), room);
                            if inbound_tx.send(message).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!("Dropping malformed signalling frame: {}", e),
                    },
                    Ok(Message::Close(_)) => {
                        tracing::info!("Signalling channel closed by relay");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Signalling channel error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            *state.write() = ChannelState::Closed;
        }));

        // Writer: ends once the sender is dropped or the socket fails
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let closing = matches!(frame, Message::Close(_));
                if let Err(e) = write.send(frame).await {
                    tracing::warn!("Failed to write signalling frame: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        inbound_rx
    }

    /// Serializes and queues `message`; a logged no-op unless `Open`
    pub fn send(&self, message: &SignalMessage) -> Result<(), SignalingError> {
        let tx = match (&self.tx, self.state()) {
            (Some(tx), ChannelState::Open) => tx,
            _ => {
                tracing::warn!(
                    "Dropping outbound {} for room {}: channel not open",
                    message.kind(),
                    self.room_name
                );
                return Err(SignalingError::NotOpen);
            }
        };

        let text = message
            .to_json()
            .map_err(|e| SignalingError::Encode(e.to_string()))?;

        tracing::debug!("Sending {} in room {}", message.kind(), self.room_name);
        tx.send(Message::Text(text))
            .map_err(|e| SignalingError::SendFailed(e.to_string()))
    }

    /// Releases the transport; safe to call any number of times
    pub fn close(&mut self) {
        let had_transport = self.tx.is_some() || self.reader.is_some();

        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Message::Close(None));
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        *self.state.write() = ChannelState::Closed;

        if had_transport {
            tracing::info!("Signalling channel for room {} closed", self.room_name);
        }
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SignalingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingChannel")
            .field("room_name", &self.room_name)
            .field("state", &self.state())
            .finish()
    }
}

/// The room URL carries the access token in its query; never log that part
fn redacted(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_query(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::messages::SessionDescription;

    #[test]
    fn test_new_channel_is_closed() {
        let channel = SignalingChannel::new("room-42");
        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(channel.room_name(), "room-42");
    }

    #[test]
    fn test_send_before_open_is_rejected() {
        let channel = SignalingChannel::new("room-42");
        let result = channel.send(&SignalMessage::Offer {
            offer: SessionDescription::offer("v=0"),
        });
        assert_eq!(result, Err(SignalingError::NotOpen));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut channel = SignalingChannel::new("room-42");
        channel.close();
        channel.close();
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn test_failed_open_ends_queue_and_stays_closed() {
        // Nothing listens on port 9 of localhost in the test environment
        let url = Url::parse("ws://127.0.0.1:9/ws/call/room-42/?token=secret").unwrap();
        let mut channel = SignalingChannel::new("room-42");

        let mut inbound = channel.open(&url).await;
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(inbound.recv().await.is_none());
    }

    /// Local relay: closes the first connection at once, echoes on later ones
    async fn closing_then_echo_relay() -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut first = true;
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                if std::mem::take(&mut first) {
                    let _ = ws.close(None).await;
                    continue;
                }
                tokio::spawn(async move {
                    while let Some(Ok(frame)) = ws.next().await {
                        if frame.is_text() && ws.send(frame).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        Url::parse(&format!("ws://{addr}/ws/call/room-42/")).unwrap()
    }

    #[tokio::test]
    async fn test_reopen_after_remote_close() {
        let url = closing_then_echo_relay().await;
        let mut channel = SignalingChannel::new("room-42");

        let mut first = channel.open(&url).await;
        assert!(first.recv().await.is_none());
        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(
            channel.send(&SignalMessage::Offer {
                offer: SessionDescription::offer("v=0"),
            }),
            Err(SignalingError::NotOpen)
        );

        let mut second = channel.open(&url).await;
        assert_eq!(channel.state(), ChannelState::Open);

        let offer = SignalMessage::Offer {
            offer: SessionDescription::offer("v=0 again"),
        };
        channel.send(&offer).unwrap();
        assert_eq!(second.recv().await, Some(offer));
        assert_eq!(channel.state(), ChannelState::Open);

        channel.close();
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[test]
    fn test_redacted_drops_token() {
        let url = Url::parse("wss://flow.example.edu/ws/call/r/?token=secret").unwrap();
        assert_eq!(redacted(&url).as_str(), "wss://flow.example.edu/ws/call/r/");
    }
}
