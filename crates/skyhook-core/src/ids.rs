//! ID generation.
//!
//! All randomness comes from UUIDv4; the session id is a random negative
//! decimal derived from the UUID bytes so it never collides across
//! restarts and is never persisted.

use uuid::Uuid;

/// Upstream request ID: `agent-<uuid>`.
#[must_use]
pub fn request_id() -> String {
    format!("agent-{}", Uuid::new_v4())
}

/// Per-credential session ID: a random negative decimal string,
/// regenerated every time credentials load.
#[must_use]
pub fn session_id() -> String {
    let bytes = *Uuid::new_v4().as_bytes();
    let n = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"));
    // Keep it within the upstream's accepted range.
    format!("-{}", n % 9_000_000_000_000_000_000)
}

/// Tool call ID: `call_<uuid without dashes>`.
#[must_use]
pub fn tool_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Claude tool-use block ID: `toolu_<uuid without dashes>`.
#[must_use]
pub fn tool_use_id() -> String {
    format!("toolu_{}", Uuid::new_v4().simple())
}

/// Chat completion ID: `chatcmpl-<8 hex chars>`.
#[must_use]
pub fn chat_completion_id() -> String {
    let u = Uuid::new_v4().to_string();
    format!("chatcmpl-{}", &u[..8])
}

/// Fallback project ID for credentials that carry none:
/// `<adjective>-<noun>-<5 alphanumerics>`.
#[must_use]
pub fn project_id() -> String {
    const ADJECTIVES: &[&str] = &[
        "useful", "bright", "swift", "calm", "bold", "happy", "clever", "gentle", "quick", "brave",
    ];
    const NOUNS: &[&str] = &[
        "fuze", "wave", "spark", "flow", "core", "beam", "star", "wind", "leaf", "cloud",
    ];
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

    let bytes = *Uuid::new_v4().as_bytes();
    let adjective = ADJECTIVES[bytes[0] as usize % ADJECTIVES.len()];
    let noun = NOUNS[bytes[1] as usize % NOUNS.len()];
    let suffix: String = bytes[2..7]
        .iter()
        .map(|b| CHARSET[*b as usize % CHARSET.len()] as char)
        .collect();
    format!("{adjective}-{noun}-{suffix}")
}

/// Opaque hex token for admin sessions.
#[must_use]
pub fn secure_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_prefix() {
        let id = request_id();
        assert!(id.starts_with("agent-"));
        assert_eq!(id.len(), "agent-".len() + 36);
    }

    #[test]
    fn session_id_is_negative_decimal() {
        let id = session_id();
        assert!(id.starts_with('-'));
        assert!(id[1..].chars().all(|c| c.is_ascii_digit()));
        assert!(id[1..].parse::<u64>().unwrap() < 9_000_000_000_000_000_000);
    }

    #[test]
    fn session_ids_differ() {
        assert_ne!(session_id(), session_id());
    }

    #[test]
    fn tool_call_id_shape() {
        let id = tool_call_id();
        assert!(id.starts_with("call_"));
        assert_eq!(id.len(), "call_".len() + 32);
        assert!(!id.contains('-'));
    }

    #[test]
    fn tool_use_id_shape() {
        assert!(tool_use_id().starts_with("toolu_"));
    }

    #[test]
    fn chat_completion_id_shape() {
        let id = chat_completion_id();
        assert!(id.starts_with("chatcmpl-"));
        assert_eq!(id.len(), "chatcmpl-".len() + 8);
    }

    #[test]
    fn project_id_shape() {
        let id = project_id();
        let segments: Vec<&str> = id.split('-').collect();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2].len(), 5);
        assert!(segments[2].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn secure_token_is_long_hex() {
        let tok = secure_token();
        assert_eq!(tok.len(), 64);
        assert!(tok.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
