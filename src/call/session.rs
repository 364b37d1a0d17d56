//! Call Session
//!
//! One `CallSession` per call view. It owns everything the call touches
//! (signalling channel, local media, peer connection, remote media) so two
//! calls can never share or corrupt each other's state. Starting a new call
//! on the same session tears the previous one down first.

use crate::auth::{AuthError, AuthSession};
use crate::config::{ClientConfig, ConfigError};
use crate::media::{LocalMedia, MediaConstraints, MediaDevices, MediaError, RemoteMedia, RemoteTrackInfo};
use crate::peer::{IceServerConfig, PeerConnection, PeerConnector, PeerError, PeerEvent, PeerState};
use crate::signaling::{
    ChannelState, IceCandidate, SdpKind, SessionDescription, SignalMessage, SignalingChannel, SignalingError,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

const ANSWER_FAILED: &str = "Failed to answer the call.";
const REMOTE_DESCRIPTION_FAILED: &str = "Failed to set remote description.";
const RELAY_LOST: &str = "Lost connection to the call server.";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum CallError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error("Could not connect to the call server")]
    ChannelUnavailable,

    #[error("No active call")]
    NoActiveCall,

    #[error("No local audio track to mute")]
    NoAudioTrack,

    #[error("Unexpected {message} while {status:?}")]
    UnexpectedSignal {
        message: &'static str,
        status: CallStatus,
    },

    #[error("ICE candidate arrived before the remote description was set")]
    CandidateBeforeRemoteDescription,

    #[error("Expected {expected:?} description, got {actual:?}")]
    WrongDescriptionKind { expected: SdpKind, actual: SdpKind },

    /// The peer refused the remote SDP; the call keeps its previous state
    #[error("Remote description rejected: {0}")]
    RemoteDescriptionRejected(#[source] PeerError),

    #[error("Call session is no longer running")]
    SessionClosed,
}

impl CallError {
    /// Alert text for the user
    pub fn user_message(&self) -> String {
        match self {
            CallError::Media(_) => {
                "Failed to access camera and microphone. Please check your permissions.".to_string()
            }
            CallError::Auth(_) => "Your session has expired. Please sign in again.".to_string(),
            CallError::Config(ConfigError::InvalidRoomName(_)) => "Please enter a room name.".to_string(),
            CallError::ChannelUnavailable => RELAY_LOST.to_string(),
            _ => "Failed to start the call. Please try again.".to_string(),
        }
    }

    /// Out-of-order or early signalling; logged, never fatal
    fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            CallError::UnexpectedSignal { .. }
                | CallError::NoActiveCall
                | CallError::CandidateBeforeRemoteDescription
                | CallError::WrongDescriptionKind { .. }
        )
    }
}

// ============================================================================
// STATUS / EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Idle,
    Starting,
    /// Offer sent, waiting for the callee
    AwaitingAnswer,
    /// Prepared as callee, waiting for an offer
    AwaitingOffer,
    Answering,
    Connected,
    Ended,
    Failed,
}

impl CallStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CallStatus::Idle => "",
            CallStatus::Starting => "Starting call...",
            CallStatus::AwaitingAnswer => "Call started.",
            CallStatus::AwaitingOffer => "Waiting for caller...",
            CallStatus::Answering => "Answering call...",
            CallStatus::Connected => "Call connected.",
            CallStatus::Ended => "Call ended.",
            CallStatus::Failed => "Call failed.",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CallStatus::Starting
                | CallStatus::AwaitingAnswer
                | CallStatus::AwaitingOffer
                | CallStatus::Answering
                | CallStatus::Connected
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    Caller,
    Callee,
}

#[derive(Debug, Clone)]
pub enum CallEvent {
    StatusChanged(CallStatus),
    /// Local stream acquired; the view renders it immediately
    LocalMediaReady(LocalMedia),
    RemoteTrackAdded(RemoteTrackInfo),
    PeerStateChanged(PeerState),
    MuteChanged { muted: bool },
    Alert(String),
    /// The call is over and the view should navigate away
    Ended { room_name: Option<String> },
}

/// Anything the session reacts to besides direct calls
#[derive(Debug)]
pub enum CallInput {
    Signal(SignalMessage),
    Peer(PeerEvent),
    ChannelClosed,
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct CallConfig {
    pub client: ClientConfig,
    /// Source of the `?token=` on the room URL; `None` connects without one
    pub auth: Option<Arc<AuthSession>>,
    pub ice_servers: Vec<IceServerConfig>,
    pub constraints: MediaConstraints,
}

impl CallConfig {
    /// Single public STUN server from the client config, audio + video
    pub fn new(client: ClientConfig, auth: Option<Arc<AuthSession>>) -> Self {
        let ice_servers = vec![IceServerConfig::stun(client.stun_url.clone())];
        Self {
            client,
            auth,
            ice_servers,
            constraints: MediaConstraints::default(),
        }
    }
}

// ============================================================================
// CALL SESSION
// ============================================================================

pub struct CallSession {
    config: CallConfig,
    devices: Arc<dyn MediaDevices>,
    connector: Arc<dyn PeerConnector>,

    room_name: Option<String>,
    role: Option<CallRole>,
    status: CallStatus,
    muted: bool,
    offer_sent: bool,

    channel: Option<SignalingChannel>,
    signals: Option<mpsc::UnboundedReceiver<SignalMessage>>,
    peer: Option<Arc<dyn PeerConnection>>,
    peer_events: Option<mpsc::UnboundedReceiver<PeerEvent>>,
    local_media: Option<LocalMedia>,
    remote_media: Option<RemoteMedia>,

    events: broadcast::Sender<CallEvent>,
}

impl CallSession {
    pub fn new(config: CallConfig, devices: Arc<dyn MediaDevices>, connector: Arc<dyn PeerConnector>) -> Self {
        let (events, _) = broadcast::channel(64);

        Self {
            config,
            devices,
            connector,
            room_name: None,
            role: None,
            status: CallStatus::Idle,
            muted: false,
            offer_sent: false,
            channel: None,
            signals: None,
            peer: None,
            peer_events: None,
            local_media: None,
            remote_media: None,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<CallEvent> {
        self.events.clone()
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn role(&self) -> Option<CallRole> {
        self.role
    }

    pub fn room_name(&self) -> Option<&str> {
        self.room_name.as_deref()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Button text derived from the mute state
    pub fn mute_label(&self) -> &'static str {
        if self.muted {
            "Unmute"
        } else {
            "Mute"
        }
    }

    pub fn local_media(&self) -> Option<&LocalMedia> {
        self.local_media.as_ref()
    }

    pub fn remote_media(&self) -> Option<&RemoteMedia> {
        self.remote_media.as_ref()
    }

    pub fn has_peer(&self) -> bool {
        self.peer.is_some()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel
            .as_ref()
            .map_or(ChannelState::Closed, SignalingChannel::state)
    }

    // ========================================================================
    // STARTING A CALL
    // ========================================================================

    /// Opens the room, acquires media, builds the peer and sends one offer
    pub async fn start_as_caller(&mut self, room_name: &str) -> Result<(), CallError> {
        tracing::info!("Starting call in room {}", room_name);
        let result = self.try_start_as_caller(room_name).await;
        if let Err(e) = &result {
            self.fail(e).await;
        }
        result
    }

    /// Same preparation as the caller, then waits for the caller's offer
    pub async fn join_as_callee(&mut self, room_name: &str) -> Result<(), CallError> {
        tracing::info!("Joining room {} as callee", room_name);
        let result = self.prepare(room_name, CallRole::Callee).await;
        match &result {
            Ok(()) => self.set_status(CallStatus::AwaitingOffer),
            Err(e) => self.fail(e).await,
        }
        result
    }

    async fn try_start_as_caller(&mut self, room_name: &str) -> Result<(), CallError> {
        self.prepare(room_name, CallRole::Caller).await?;
        let peer = self.active_peer()?;

        let offer = peer.create_offer().await?;
        peer.set_local_description(offer.clone()).await?;
        self.send_signal(SignalMessage::Offer { offer });
        self.offer_sent = true;

        self.set_status(CallStatus::AwaitingAnswer);
        Ok(())
    }

    async fn prepare(&mut self, room_name: &str, role: CallRole) -> Result<(), CallError> {
        let room_name = room_name.trim();
        if room_name.is_empty() {
            return Err(ConfigError::InvalidRoomName(room_name.to_string()).into());
        }

        // At most one call per session: release the previous one first
        self.teardown().await;

        self.room_name = Some(room_name.to_string());
        self.role = Some(role);
        self.muted = false;
        self.set_status(CallStatus::Starting);

        let token = match &self.config.auth {
            Some(auth) => Some(auth.access_token().await?),
            None => None,
        };
        let url = self.config.client.room_url(room_name, token.as_deref())?;

        let mut channel = SignalingChannel::new(room_name);
        let signals = channel.open(&url).await;
        let open = channel.is_open();
        self.channel = Some(channel);
        self.signals = Some(signals);
        if !open {
            return Err(CallError::ChannelUnavailable);
        }

        let media = self.devices.get_user_media(self.config.constraints).await?;
        self.local_media = Some(media.clone());
        self.emit(CallEvent::LocalMediaReady(media.clone()));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let peer = self
            .connector
            .connect(&self.config.ice_servers, events_tx)
            .await?;
        self.peer = Some(Arc::clone(&peer));
        self.peer_events = Some(events_rx);
        self.remote_media = Some(RemoteMedia::default());

        peer.add_local_media(&media).await?;
        tracing::debug!("Peer connection created and local tracks added");
        Ok(())
    }

    // ========================================================================
    // INBOUND SIGNALLING
    // ========================================================================

    /// Callee side: apply the offer, answer it exactly once
    pub async fn handle_inbound_offer(&mut self, offer: SessionDescription) -> Result<(), CallError> {
        let peer = self.active_peer()?;

        // An offer after our own is glare; an offer after a remote description is a duplicate
        if self.offer_sent || peer.has_remote_description().await {
            return Err(CallError::UnexpectedSignal {
                message: "offer",
                status: self.status,
            });
        }
        if offer.kind != SdpKind::Offer {
            return Err(CallError::WrongDescriptionKind {
                expected: SdpKind::Offer,
                actual: offer.kind,
            });
        }

        let previous = self.status;
        self.set_status(CallStatus::Answering);
        if let Err(e) = peer.set_remote_description(offer).await {
            self.set_status(previous);
            return Err(CallError::RemoteDescriptionRejected(e));
        }
        let answer = peer.create_answer().await?;
        peer.set_local_description(answer.clone()).await?;
        self.send_signal(SignalMessage::Answer { answer });

        self.set_status(CallStatus::Connected);
        Ok(())
    }

    /// Caller side: only an answer to our own offer connects the call
    pub async fn handle_inbound_answer(&mut self, answer: SessionDescription) -> Result<(), CallError> {
        let peer = self.active_peer()?;

        if self.status != CallStatus::AwaitingAnswer {
            return Err(CallError::UnexpectedSignal {
                message: "answer",
                status: self.status,
            });
        }
        if answer.kind != SdpKind::Answer {
            return Err(CallError::WrongDescriptionKind {
                expected: SdpKind::Answer,
                actual: answer.kind,
            });
        }

        peer.set_remote_description(answer)
            .await
            .map_err(CallError::RemoteDescriptionRejected)?;
        self.set_status(CallStatus::Connected);
        Ok(())
    }

    pub async fn handle_inbound_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), CallError> {
        let peer = self.active_peer()?;

        if !peer.has_remote_description().await {
            return Err(CallError::CandidateBeforeRemoteDescription);
        }

        peer.add_ice_candidate(candidate).await?;
        tracing::debug!("ICE candidate added");
        Ok(())
    }

    /// Routes one inbound frame; failures are logged or alerted, never returned
    pub async fn handle_signal(&mut self, message: SignalMessage) {
        let kind = message.kind();
        let (result, alert) = match message {
            SignalMessage::Offer { offer } => (self.handle_inbound_offer(offer).await, Some(ANSWER_FAILED)),
            SignalMessage::Answer { answer } => (
                self.handle_inbound_answer(answer).await,
                Some(REMOTE_DESCRIPTION_FAILED),
            ),
            SignalMessage::NewIceCandidate { candidate } => {
                (self.handle_inbound_ice_candidate(candidate).await, None)
            }
        };

        let Err(e) = result else {
            return;
        };

        if e.is_protocol_violation() {
            tracing::warn!("Ignoring inbound {}: {}", kind, e);
            return;
        }

        match (&e, alert) {
            // Bad SDP from the room: tell the user, keep waiting for a good one
            (CallError::RemoteDescriptionRejected(_), _) => {
                tracing::warn!("Inbound {} rejected: {}", kind, e);
                self.emit(CallEvent::Alert(REMOTE_DESCRIPTION_FAILED.to_string()));
            }
            (_, Some(alert)) => {
                tracing::error!("Handling inbound {} failed: {}", kind, e);
                self.emit(CallEvent::Alert(alert.to_string()));
                self.teardown().await;
                self.set_status(CallStatus::Failed);
            }
            (_, None) => tracing::warn!("Ignoring inbound {}: {}", kind, e),
        }
    }

    pub async fn handle_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::IceCandidate(candidate) => {
                tracing::debug!("Forwarding local ICE candidate");
                self.send_signal(SignalMessage::NewIceCandidate { candidate });
            }
            PeerEvent::RemoteTrack(track) => {
                if let Some(remote) = self.remote_media.as_mut() {
                    remote.add_track(track.clone());
                    self.emit(CallEvent::RemoteTrackAdded(track));
                }
            }
            PeerEvent::StateChanged(state) => {
                if state == PeerState::Failed {
                    tracing::warn!("Peer connection failed");
                }
                self.emit(CallEvent::PeerStateChanged(state));
            }
        }
    }

    // ========================================================================
    // EVENT LOOP PLUMBING
    // ========================================================================

    /// Waits for the next inbound frame or peer event
    ///
    /// Cancel safe: nothing is lost if the future is dropped before it
    /// resolves. Pends forever while no call is active.
    pub async fn next_input(&mut self) -> CallInput {
        loop {
            let signals = self.signals.as_mut();
            let peer_events = self.peer_events.as_mut();

            tokio::select! {
                biased;

                signal = recv_or_pending(signals) => match signal {
                    Some(message) => return CallInput::Signal(message),
                    None => {
                        self.signals = None;
                        return CallInput::ChannelClosed;
                    }
                },
                event = recv_or_pending(peer_events) => match event {
                    Some(event) => return CallInput::Peer(event),
                    None => self.peer_events = None,
                },
            }
        }
    }

    pub async fn handle_input(&mut self, input: CallInput) {
        match input {
            CallInput::Signal(message) => self.handle_signal(message).await,
            CallInput::Peer(event) => self.handle_peer_event(event).await,
            CallInput::ChannelClosed => {
                tracing::info!("Signalling channel closed");
                // Before the exchange completes there is no way left to finish it
                if matches!(
                    self.status,
                    CallStatus::Starting
                        | CallStatus::AwaitingAnswer
                        | CallStatus::AwaitingOffer
                        | CallStatus::Answering
                ) {
                    self.emit(CallEvent::Alert(RELAY_LOST.to_string()));
                    self.teardown().await;
                    self.set_status(CallStatus::Failed);
                }
            }
        }
    }

    /// `next_input` followed by `handle_input`
    pub async fn process_next(&mut self) {
        let input = self.next_input().await;
        self.handle_input(input).await;
    }

    // ========================================================================
    // USER ACTIONS
    // ========================================================================

    /// Flips mute and returns the new state; `audio.enabled == !muted`
    pub fn toggle_mute(&mut self) -> Result<bool, CallError> {
        let media = self.local_media.as_ref().ok_or(CallError::NoActiveCall)?;
        if media.audio_tracks().next().is_none() {
            return Err(CallError::NoAudioTrack);
        }

        self.muted = !self.muted;
        media.set_audio_enabled(!self.muted);
        tracing::info!("Microphone {}", if self.muted { "muted" } else { "unmuted" });

        self.emit(CallEvent::MuteChanged { muted: self.muted });
        Ok(self.muted)
    }

    /// Releases everything and signals the view to leave; idempotent
    pub async fn end_call(&mut self) {
        if self.status == CallStatus::Ended {
            return;
        }

        tracing::info!("Ending call in room {:?}", self.room_name);
        self.teardown().await;
        self.set_status(CallStatus::Ended);
        self.emit(CallEvent::Ended {
            room_name: self.room_name.clone(),
        });
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    fn active_peer(&self) -> Result<Arc<dyn PeerConnection>, CallError> {
        self.peer.clone().ok_or(CallError::NoActiveCall)
    }

    /// Stops local tracks, closes the peer, clears remote media, closes the channel
    async fn teardown(&mut self) {
        if let Some(media) = self.local_media.take() {
            media.stop();
            tracing::debug!("Local stream stopped");
        }
        if let Some(peer) = self.peer.take() {
            if let Err(e) = peer.close().await {
                tracing::warn!("Closing peer connection failed: {}", e);
            }
            tracing::debug!("Peer connection closed");
        }
        self.peer_events = None;
        self.remote_media = None;

        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.signals = None;
        self.offer_sent = false;
    }

    async fn fail(&mut self, error: &CallError) {
        tracing::error!("Call failed: {}", error);
        self.emit(CallEvent::Alert(error.user_message()));
        self.teardown().await;
        self.set_status(CallStatus::Failed);
    }

    fn send_signal(&self, message: SignalMessage) {
        match &self.channel {
            Some(channel) => {
                if let Err(e) = channel.send(&message) {
                    tracing::warn!("Could not send {}: {}", message.kind(), e);
                }
            }
            None => tracing::warn!("Could not send {}: no channel", message.kind()),
        }
    }

    fn set_status(&mut self, status: CallStatus) {
        if self.status != status {
            tracing::info!("Call status: {:?} -> {:?}", self.status, status);
            self.status = status;
            self.emit(CallEvent::StatusChanged(status));
        }
    }

    fn emit(&self, event: CallEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        if let Some(media) = self.local_media.take() {
            media.stop();
        }
        if let Some(peer) = self.peer.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        let _ = peer.close().await;
                    });
                }
                Err(_) => tracing::warn!("Dropping a live peer connection outside a runtime"),
            }
        }
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("room_name", &self.room_name)
            .field("role", &self.role)
            .field("status", &self.status)
            .field("muted", &self.muted)
            .field("channel", &self.channel_state())
            .finish()
    }
}

async fn recv_or_pending<T>(rx: Option<&mut mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// TESTS
// ============================================================================
