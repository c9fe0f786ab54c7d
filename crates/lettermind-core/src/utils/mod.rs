//! Utility functions for string formatting and secret masking.

pub mod format;

// Re-export commonly used functions at module level
pub use format::{format_date, format_optional, mask_key, truncate_string};
