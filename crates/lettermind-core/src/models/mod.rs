//! Data models for lettermind accounts.
//!
//! This module contains the data structures shared by the session manager
//! and the key registry:
//!
//! - `User`: Account record returned by login and profile endpoints
//! - `Provider`: AI service a stored API key belongs to
//! - `KeyStatus`: Masked, display-safe status of one stored key

pub mod provider;
pub mod user;

pub use provider::{Provider, UnknownProvider};
pub use user::{KeyStatus, KeyStatusMap, User};
