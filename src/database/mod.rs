//! Database Module - local SQLite storage
//!
//! Keeps the session tokens across restarts, in place of the browser's
//! local storage.

mod tokens;

pub use tokens::{DatabaseError, TokenDatabase};
