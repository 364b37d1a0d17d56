//! Message Types for the call-room relay
//!
//! The relay forwards JSON frames verbatim between the members of a room.
//! Every frame carries a `type` discriminator; the payload field is named
//! after the type (`offer`, `answer`, `candidate`).

use serde::{Deserialize, Serialize};

// ============================================================================
// SESSION DESCRIPTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// `RTCSessionDescriptionInit` as browsers serialize it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

// ============================================================================
// ICE CANDIDATE
// ============================================================================

/// `RTCIceCandidateInit` with browser field names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

// ============================================================================
// SIGNAL MESSAGES
// ============================================================================

/// One call-control frame, in either direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalMessage {
    #[serde(rename = "offer")]
    Offer { offer: SessionDescription },

    #[serde(rename = "answer")]
    Answer { answer: SessionDescription },

    #[serde(rename = "new-ice-candidate")]
    NewIceCandidate { candidate: IceCandidate },
}

impl SignalMessage {
    /// The wire `type` value, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::NewIceCandidate { .. } => "new-ice-candidate",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
