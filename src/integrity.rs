//! # Integrity Tagger
//!
//! Keyed message authentication over UTF-8 text using HMAC-SHA256. A tag is
//! meaningful only between the two endpoints of one session (client and
//! server); it is not transitive across a relay hop, so the server always
//! re-tags before forwarding.

use hmac::{Hmac, Mac};
use num_bigint::BigUint;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Symmetric key bound to one connection between a client and the server.
///
/// The canonical byte form is the decimal ASCII rendering of the shared
/// secret, so numeric and textual key material tag identically on both ends.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    /// Canonicalize a Diffie-Hellman shared secret.
    pub fn from_secret(secret: &BigUint) -> Self {
        Self(secret.to_str_radix(10).into_bytes())
    }

    /// Canonicalize textual key material.
    pub fn from_text(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        write!(f, "SessionKey({} bytes)", self.0.len())
    }
}

/// Compute the hex-encoded authentication code for `text` under `key`.
pub fn tag(key: &SessionKey, text: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(text.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Check `tag_hex` against `text` under `key`.
///
/// The comparison is constant time (`Mac::verify_slice`); a malformed hex
/// tag simply fails.
pub fn verify(key: &SessionKey, text: &str, tag_hex: &str) -> bool {
    let Ok(expected) = hex::decode(tag_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(text.as_bytes());
    mac.verify_slice(&expected).is_ok()
}
