//! Shared utility helpers.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

/// Generate a random 16-char hex nonce.
pub fn generate_nonce() -> String {
    let s = RandomState::new();
    let mut h = s.build_hasher();
    h.write_u64(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64,
    );
    format!("{:016x}", h.finish())
}

/// Synthetic id for a tool call whose backend did not supply one.
pub fn synthetic_call_id() -> String {
    format!("call_{}", generate_nonce())
}

/// Truncate a string to `max` bytes (on a char boundary), appending `…` if trimmed.
pub fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

/// First `max` characters of `s`, counted in chars rather than bytes.
pub fn take_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonces_differ() {
        assert_ne!(generate_nonce(), generate_nonce());
    }

    #[test]
    fn synthetic_ids_are_prefixed() {
        let id = synthetic_call_id();
        assert!(id.starts_with("call_"));
        assert_eq!(id.len(), "call_".len() + 16);
    }

    #[test]
    fn truncate_respects_char_boundary() {
        assert_eq!(truncate_str("héllo", 2), "h…");
        assert_eq!(truncate_str("short", 10), "short");
    }

    #[test]
    fn take_chars_counts_chars() {
        assert_eq!(take_chars("äöü", 2), "äö");
        assert_eq!(take_chars("ab", 5), "ab");
    }
}
