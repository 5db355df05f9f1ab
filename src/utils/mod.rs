//! Small helpers shared by the client and the interceptors.

use sha2::{Digest, Sha256};

/// First `max_chars` characters of `s`, never splitting a UTF-8 code point.
pub fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Log-friendly preview: truncated text with a trailing `...` when shortened.
pub fn preview(s: &str, max_chars: usize) -> String {
    let t = truncate(s, max_chars);
    if t.len() < s.len() {
        format!("{}...", t)
    } else {
        t.to_string()
    }
}

/// Short stable fingerprint of a secret, safe to log.
pub fn fingerprint(secret: &str) -> String {
    if secret.is_empty() {
        return "-".to_string();
    }
    let digest = Sha256::digest(secret.as_bytes());
    digest[..4].iter().map(|b| format!("{:02x}", b)).collect()
}
