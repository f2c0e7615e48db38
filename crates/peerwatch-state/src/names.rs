//! Identifier validation shared by the config store and the command runner.
//!
//! Interface names and peer keys end up as section names in the settings
//! file and as arguments to privileged commands, so both are checked
//! against strict allow-list patterns before use.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{StateError, StateResult};

static INTERFACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,15}$").expect("interface pattern"));

static PEER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+/=]{32,64}$").expect("peer pattern"));

/// Validate a tunnel interface name (alphanumeric, `.`, `_`, `-`, at most 15 chars).
pub fn validate_interface(name: &str) -> StateResult<&str> {
    if INTERFACE_RE.is_match(name) {
        Ok(name)
    } else {
        Err(StateError::InvalidInterface(name.to_string()))
    }
}

/// Validate a peer public key (base64 alphabet, 32–64 chars).
pub fn validate_peer_id(key: &str) -> StateResult<&str> {
    if PEER_RE.is_match(key) {
        Ok(key)
    } else {
        Err(StateError::InvalidPeer)
    }
}
