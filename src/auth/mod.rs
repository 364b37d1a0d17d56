//! Auth Module - JWT session of the signed-in user
//!
//! - Token decoding and expiry checks
//! - Token persistence (`authToken` / `refreshToken`)
//! - Sign-in, sign-out and the refresh lifecycle

mod session;
mod store;
pub mod token;

pub use session::{AuthError, AuthSession, SignedInUser};
pub use store::{MemoryTokenStore, TokenPair, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
