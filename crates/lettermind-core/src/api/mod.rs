//! REST API client module for the lettermind backend.
//!
//! This module provides the `ApiClient` for signing in (password,
//! registration, demo and Google identity tokens) and for reading and
//! updating the user's per-provider API keys.
//!
//! Authenticated endpoints take a bearer token supplied by the session.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
