//! SHA256 digest utilities for manifest verification
//!
//! Registries normally report a manifest digest through the
//! `Docker-Content-Digest` header; when they don't, the digest is computed
//! from the manifest bytes exactly as returned.

use sha2::{Digest, Sha256};

/// Placeholder recorded when a copy method cannot report the source digest up front
pub const PENDING_DIGEST: &str = "pending";

/// Utilities for working with SHA256 digests in registry context
pub struct DigestUtils;

impl DigestUtils {
    /// Compute SHA256 hex digest from byte data
    pub fn compute_sha256(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Compute full digest (with sha256: prefix) from byte data
    pub fn compute_docker_digest(data: &[u8]) -> String {
        format!("sha256:{}", Self::compute_sha256(data))
    }

    /// Validate SHA256 hex string (64 characters, all hex)
    pub fn is_valid_sha256_hex(digest: &str) -> bool {
        digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Validate full digest format (sha256:xxxxx)
    pub fn is_valid_docker_digest(digest: &str) -> bool {
        digest
            .strip_prefix("sha256:")
            .is_some_and(Self::is_valid_sha256_hex)
    }

    /// Clean up a digest printed by an external tool; `None` if it isn't one
    pub fn parse_tool_output(output: &str) -> Option<String> {
        output
            .lines()
            .map(str::trim)
            .find(|line| Self::is_valid_docker_digest(line))
            .map(str::to_string)
    }
}
