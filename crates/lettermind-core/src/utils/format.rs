use chrono::{DateTime, Utc};

/// Number of trailing characters left visible by `mask_key`
const MASK_VISIBLE_CHARS: usize = 4;

/// Mask a secret for display, leaving only the last four characters visible.
/// Keys too short to mask safely are hidden entirely.
pub fn mask_key(key: &str) -> String {
    let key = key.trim();
    let len = key.chars().count();
    if len <= MASK_VISIBLE_CHARS * 2 {
        return "*".repeat(len.max(MASK_VISIBLE_CHARS));
    }
    let visible: String = key.chars().skip(len - MASK_VISIBLE_CHARS).collect();
    format!("****{}", visible)
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format an optional string, returning a default if None
pub fn format_optional(value: &Option<String>, default: &str) -> String {
    value.as_deref().unwrap_or(default).to_string()
}

/// Format a timestamp as a short calendar date
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%b %d, %Y").to_string()
}
