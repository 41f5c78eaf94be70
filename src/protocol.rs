//! # Wire Protocol
//!
//! Tokens, sentinels, and framing for the line-oriented chat protocol.
//! One logical packet is one line on the secure channel.
//!
//! | Direction | Form |
//! |-----------|------|
//! | Login | `<username>:<password>` → `OK` / `FAIL` |
//! | Key exchange | decimal ASCII public values, server first |
//! | Chat | `<text>\|\|<tag>` → relayed as `<sender>: <text>\|\|<tag>` |
//! | Control | `__EXIT__`, `__CMD__:<token>` |
//!
//! Tags are hex encoded, so the delimiter is split at its *last* occurrence:
//! a literal `||` inside message text cannot land in the tag half.

/// Graceful-exit control token.
pub const EXIT_TOKEN: &str = "__EXIT__";

/// Prefix for directory-style command packets.
pub const CMD_PREFIX: &str = "__CMD__:";

/// Separator between message text and its authentication tag.
pub const TAG_DELIMITER: &str = "||";

/// Sent to the sender only, when an inbound tag fails verification.
pub const TAMPERED_REPLY: &str = "BAD";

/// Sent to the sender when the partner's session no longer exists.
pub const NO_PARTNER_REPLY: &str = "NOPART";

/// Successful login reply.
pub const LOGIN_OK: &str = "OK";

/// Failed login reply.
pub const LOGIN_FAIL: &str = "FAIL";

/// Confirmation sent to both endpoints once a pair is formed.
pub fn pairing_notice(partner: &str) -> String {
    format!("Você está conectado com {partner}")
}

/// Free-text notice delivered to the surviving partner on disconnect.
pub fn departure_notice(user: &str) -> String {
    format!("{user} saiu do chat")
}

/// Extract the command token from a `__CMD__:` packet, if it is one.
pub fn command_token(packet: &str) -> Option<&str> {
    packet.strip_prefix(CMD_PREFIX)
}

/// Split a chat packet into `(text, tag)` at the last delimiter occurrence.
///
/// Returns `None` when the delimiter is absent (a malformed packet, dropped
/// silently by the relay).
pub fn split_envelope(packet: &str) -> Option<(&str, &str)> {
    packet.rsplit_once(TAG_DELIMITER)
}

/// Assemble an outgoing `text||tag` packet.
pub fn seal_envelope(text: &str, tag: &str) -> String {
    format!("{text}{TAG_DELIMITER}{tag}")
}

/// Assemble the forwarded form of a relayed message. The tag covers `text`
/// only, never the sender prefix.
pub fn relayed_line(sender: &str, text: &str, tag: &str) -> String {
    format!("{sender}: {text}{TAG_DELIMITER}{tag}")
}
