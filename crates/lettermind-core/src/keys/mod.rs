//! Per-provider API key management.
//!
//! The backend keeps the user's keys for Gemini, OpenAI, Anthropic and
//! OpenRouter. This module reads their masked status and submits new keys;
//! plaintext only ever travels client → backend, once.

pub mod registry;

pub use registry::{ApiKeyRegistry, KeyBackend, KeyDraft};
