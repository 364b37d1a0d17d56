//! Media Module - local and remote media handles
//!
//! The client does not capture or encode anything itself. `LocalTrack`s wrap
//! webrtc-rs sample tracks that the embedding application feeds with encoded
//! frames; the enabled flag gates those writes (mute).

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Permission to use camera and microphone was denied")]
    PermissionDenied,

    #[error("No {0} device found")]
    NotFound(TrackKind),

    #[error("Neither audio nor video was requested")]
    NoTracksRequested,

    #[error("Media device error: {0}")]
    Device(String),
}

// ============================================================================
// TRACKS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// What `get_user_media` should acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// One outgoing track; clones share the enabled/stopped flags
#[derive(Clone)]
pub struct LocalTrack {
    id: String,
    kind: TrackKind,
    enabled: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    sample_track: Arc<TrackLocalStaticSample>,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, stream_id: &str) -> Self {
        let id = format!("{}-{}", kind, uuid::Uuid::new_v4());
        let capability = match kind {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48_000,
                channels: 2,
                ..Default::default()
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90_000,
                ..Default::default()
            },
        };

        let sample_track = Arc::new(TrackLocalStaticSample::new(
            capability,
            id.clone(),
            stream_id.to_owned(),
        ));

        Self {
            id,
            kind,
            enabled: Arc::new(AtomicBool::new(true)),
            stopped: Arc::new(AtomicBool::new(false)),
            sample_track,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Permanently ends the track
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!("Stopped local {} track {}", self.kind, self.id);
        }
    }

    /// The webrtc-rs track handed to the peer connection
    pub fn sample_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.sample_track)
    }

    /// Sends one encoded frame; dropped while disabled or after `stop`
    pub async fn write_sample(&self, sample: &Sample) -> Result<bool, MediaError> {
        if self.is_stopped() || !self.is_enabled() {
            return Ok(false);
        }
        self.sample_track
            .write_sample(sample)
            .await
            .map_err(|e| MediaError::Device(e.to_string()))?;
        Ok(true)
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

// ============================================================================
// LOCAL / REMOTE MEDIA
// ============================================================================

/// The local stream: what `getUserMedia` hands back
#[derive(Debug, Clone)]
pub struct LocalMedia {
    id: String,
    tracks: Vec<LocalTrack>,
}

impl LocalMedia {
    pub fn new(id: impl Into<String>, tracks: Vec<LocalTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &LocalTrack> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &LocalTrack> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Video)
    }

    /// Enabled flag of the first audio track, if there is one
    pub fn audio_enabled(&self) -> Option<bool> {
        self.audio_tracks().next().map(LocalTrack::is_enabled)
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        for track in self.audio_tracks() {
            track.set_enabled(enabled);
        }
    }

    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.tracks.iter().all(LocalTrack::is_stopped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrackInfo {
    pub id: String,
    pub kind: TrackKind,
    pub stream_id: String,
    pub codec: String,
}

/// Tracks received from the other participant
#[derive(Debug, Clone, Default)]
pub struct RemoteMedia {
    tracks: Vec<RemoteTrackInfo>,
}

impl RemoteMedia {
    pub fn add_track(&mut self, track: RemoteTrackInfo) {
        if self.tracks.iter().any(|t| t.id == track.id) {
            return;
        }
        self.tracks.push(track);
    }

    pub fn tracks(&self) -> &[RemoteTrackInfo] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

// ============================================================================
// MEDIA DEVICES
// ============================================================================

#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<LocalMedia, MediaError>;
}

/// Hands out sample tracks for the application to feed
#[derive(Debug, Clone)]
pub struct SampleMediaDevices {
    has_audio: bool,
    has_video: bool,
}

impl SampleMediaDevices {
    pub fn new() -> Self {
        Self {
            has_audio: true,
            has_video: true,
        }
    }

    /// A machine without a camera
    pub fn audio_only() -> Self {
        Self {
            has_audio: true,
            has_video: false,
        }
    }
}

impl Default for SampleMediaDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaDevices for SampleMediaDevices {
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<LocalMedia, MediaError> {
        if !constraints.audio && !constraints.video {
            return Err(MediaError::NoTracksRequested);
        }
        if constraints.audio && !self.has_audio {
            return Err(MediaError::NotFound(TrackKind::Audio));
        }
        if constraints.video && !self.has_video {
            return Err(MediaError::NotFound(TrackKind::Video));
        }

        let stream_id = format!("flow-{}", uuid::Uuid::new_v4());
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(LocalTrack::new(TrackKind::Audio, &stream_id));
        }
        if constraints.video {
            tracks.push(LocalTrack::new(TrackKind::Video, &stream_id));
        }

        tracing::info!("Local stream {} started with {} tracks", stream_id, tracks.len());
        Ok(LocalMedia::new(stream_id, tracks))
    }
}
