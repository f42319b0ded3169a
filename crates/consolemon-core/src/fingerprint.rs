//! Content fingerprints for captured session text.
//!
//! fingerprint = lowercase hex SHA-1 of the UTF-8 text. No salt, so the same
//! text hashes the same across runs and matches registries written by older
//! tooling. The empty string has a well-defined fingerprint, which is what a
//! failed capture hashes to.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

/// Hex-encoded SHA-1 of a session's captured text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash captured text.
    pub fn of(text: &str) -> Self {
        let digest = Sha1::digest(text.as_bytes());
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    /// Parse a caller-supplied fingerprint (40 hex chars, any case).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 40 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("not a SHA-1 hex fingerprint: '{s}'"));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}
