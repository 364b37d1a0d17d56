//! API Module - typed access to the Flow REST backend
//!
//! Every authenticated call goes through `ApiClient`, which pulls the
//! current access token from the `AuthSession`.

mod account;
mod client;
mod conversations;
mod friends;
mod market;
pub mod models;
mod posts;
mod rooms;

pub use client::{ApiClient, ApiError};
pub use models::Room;
