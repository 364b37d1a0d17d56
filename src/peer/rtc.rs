//! webrtc-rs implementation of the peer seam

use super::{IceServerConfig, PeerConnection, PeerConnector, PeerError, PeerEvent, PeerState};
use crate::media::{LocalMedia, RemoteTrackInfo, TrackKind};
use crate::signaling::{IceCandidate, SdpKind, SessionDescription};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::TrackLocal;

// ============================================================================
// CONNECTOR
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct WebRtcConnector;

impl WebRtcConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn connect(
        &self,
        ice_servers: &[IceServerConfig],
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>, PeerError> {
        let peer = WebRtcPeer::new(ice_servers, events).await?;
        Ok(Arc::new(peer))
    }
}

// ============================================================================
// PEER
// ============================================================================

pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    closed: AtomicBool,
}

impl WebRtcPeer {
    pub async fn new(
        ice_servers: &[IceServerConfig],
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Self, PeerError> {
        // Default codec set (Opus, VP8, H264, ...)
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| PeerError::Setup(e.to_string()))?;

        // NACK, RTCP reports, TWCC
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| PeerError::Setup(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(|e| PeerError::Setup(e.to_string()))?,
        );

        register_handlers(&pc, events);
        tracing::info!("Peer connection created ({} ICE servers)", ice_servers.len());

        Ok(Self {
            pc,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), PeerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PeerError::Closed);
        }
        Ok(())
    }
}

fn register_handlers(pc: &Arc<RTCPeerConnection>, events: mpsc::UnboundedSender<PeerEvent>) {
    let tx = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
        tracing::info!("Peer connection state: {:?}", s);
        let state = match s {
            RTCPeerConnectionState::New => Some(PeerState::New),
            RTCPeerConnectionState::Connecting => Some(PeerState::Connecting),
            RTCPeerConnectionState::Connected => Some(PeerState::Connected),
            RTCPeerConnectionState::Disconnected => Some(PeerState::Disconnected),
            RTCPeerConnectionState::Failed => Some(PeerState::Failed),
            RTCPeerConnectionState::Closed => Some(PeerState::Closed),
            _ => None,
        };
        if let Some(state) = state {
            let _ = tx.send(PeerEvent::StateChanged(state));
        }
        Box::pin(async {})
    }));

    // `None` marks the end of gathering
    let tx = events.clone();
    pc.on_ice_candidate(Box::new(move |candidate| {
        if let Some(c) = candidate {
            match c.to_json() {
                Ok(init) => {
                    let _ = tx.send(PeerEvent::IceCandidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                        username_fragment: init.username_fragment,
                    }));
                }
                Err(e) => tracing::warn!("Failed to serialize local ICE candidate: {}", e),
            }
        }
        Box::pin(async {})
    }));

    let tx = events;
    pc.on_track(Box::new(move |track, _, _| {
        let kind = match track.kind() {
            RTPCodecType::Video => TrackKind::Video,
            _ => TrackKind::Audio,
        };
        let info = RemoteTrackInfo {
            id: track.id(),
            kind,
            stream_id: track.stream_id(),
            codec: track.codec().capability.mime_type,
        };
        tracing::info!("Received remote {} track {} ({})", info.kind, info.id, info.codec);
        let _ = tx.send(PeerEvent::RemoteTrack(info));

        // Nothing renders remote media here; drain the RTP stream
        Box::pin(async move {
            tokio::spawn(async move { while track.read_rtp().await.is_ok() {} });
        })
    }));
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription, PeerError> {
    match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
    }
    .map_err(|e| PeerError::InvalidSdp(e.to_string()))
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    async fn add_local_media(&self, media: &LocalMedia) -> Result<(), PeerError> {
        self.ensure_open()?;
        for track in media.tracks() {
            let sender = self
                .pc
                .add_track(track.sample_track() as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(|e| PeerError::WebRtc(e.to_string()))?;

            // RTCP must be read for the interceptors to work
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                while sender.read(&mut buf).await.is_ok() {}
            });
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, PeerError> {
        self.ensure_open()?;
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| PeerError::WebRtc(e.to_string()))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerError> {
        self.ensure_open()?;
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| PeerError::WebRtc(e.to_string()))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), PeerError> {
        self.ensure_open()?;
        self.pc
            .set_local_description(to_rtc(description)?)
            .await
            .map_err(|e| PeerError::WebRtc(e.to_string()))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), PeerError> {
        self.ensure_open()?;
        self.pc
            .set_remote_description(to_rtc(description)?)
            .await
            .map_err(|e| PeerError::WebRtc(e.to_string()))
    }

    async fn has_remote_description(&self) -> bool {
        self.pc.remote_description().await.is_some()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
        self.ensure_open()?;
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await
            .map_err(|e| PeerError::WebRtc(e.to_string()))
    }

    /// Idempotent; every later call fails with `PeerError::Closed`
    async fn close(&self) -> Result<(), PeerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.pc
            .close()
            .await
            .map_err(|e| PeerError::WebRtc(e.to_string()))
    }
}

impl std::fmt::Debug for WebRtcPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebRtcPeer")
            .field("state", &self.pc.connection_state())
            .finish()
    }
}
