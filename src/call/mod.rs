//! Call Module - one peer-to-peer call room
//!
//! - `CallSession`: the per-call state machine (offer/answer/ICE, mute, end)
//! - `CallHandle`: the session running on its own task

mod handle;
mod session;

pub use handle::CallHandle;
pub use session::{CallConfig, CallError, CallEvent, CallInput, CallRole, CallSession, CallStatus};
