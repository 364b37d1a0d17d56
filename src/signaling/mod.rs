//! Signaling Module - call-room relay over WebSocket
//!
//! - Wire types for `offer`, `answer` and `new-ice-candidate`
//! - The per-call channel that carries them

mod channel;
mod messages;

pub use channel::{ChannelState, SignalingChannel, SignalingError};
pub use messages::{IceCandidate, SdpKind, SessionDescription, SignalMessage};
