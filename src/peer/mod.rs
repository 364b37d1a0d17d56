//! Peer Module - the peer connection seam
//!
//! `CallSession` only talks to `PeerConnection`; the webrtc-rs backed
//! implementation lives in `rtc.rs`. Events the connection raises on its
//! own (local ICE candidates, remote tracks, state changes) arrive over an
//! unbounded channel handed in at construction.

mod rtc;

use crate::media::{LocalMedia, RemoteTrackInfo};
use crate::signaling::{IceCandidate, SessionDescription};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

pub use rtc::{WebRtcConnector, WebRtcPeer};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("Failed to create peer connection: {0}")]
    Setup(String),

    #[error("Invalid SDP: {0}")]
    InvalidSdp(String),

    #[error("WebRTC error: {0}")]
    WebRtc(String),

    #[error("Peer connection is closed")]
    Closed,
}

// ============================================================================
// CONFIG / EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// Locally gathered candidate, to be relayed to the other side
    IceCandidate(IceCandidate),
    RemoteTrack(RemoteTrackInfo),
    StateChanged(PeerState),
}

// ============================================================================
// TRAITS
// ============================================================================

#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn add_local_media(&self, media: &LocalMedia) -> Result<(), PeerError>;

    async fn create_offer(&self) -> Result<SessionDescription, PeerError>;

    async fn create_answer(&self) -> Result<SessionDescription, PeerError>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), PeerError>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), PeerError>;

    async fn has_remote_description(&self) -> bool;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError>;

    async fn close(&self) -> Result<(), PeerError>;
}

/// Builds peer connections; one per call
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(
        &self,
        ice_servers: &[IceServerConfig],
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>, PeerError>;
}
