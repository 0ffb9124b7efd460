//! Alert fingerprint for cooldown deduplication
//!
//! The fingerprint is the first 12 hex chars of SHA-256 over `"{host}:{message}"`.
//! It is stable across processes and releases, so it can name on-disk records.
//!
//! Severity is not part of the fingerprint; it is the other
//! dimension of the cooldown key (see `cooldown::CooldownStore`).

use sha2::{Digest, Sha256};

/// Length of the hex digest prefix kept as the fingerprint
pub const FINGERPRINT_LEN: usize = 12;

/// Deterministic identity of an alert's content
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertFingerprint(String);

impl AlertFingerprint {
    /// Compute the fingerprint of `(host, message)`
    pub fn of(host: &str, message: &str) -> Self {
        let content = format!("{}:{}", host, message);
        let digest = Sha256::digest(content.as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(FINGERPRINT_LEN);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AlertFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
