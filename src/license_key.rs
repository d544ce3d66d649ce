//! License key format, validation policy, and key generation.
//!
//! Keys are human-readable strings in the format `PREFIX-XXX-XXX-XXX`:
//! a configurable prefix followed by a configurable number of alphanumeric
//! segments. Comparison is case-insensitive throughout.
//!
//! Whether a well-formed key is *accepted* is decided by a [`KeyPolicy`]:
//!
//! - `Allowlist` (default): membership in a configured set of keys. The
//!   documented demo key [`DEMO_KEY`] is always part of the default set.
//! - `MachineDerived`: the key must equal a deterministic derivation from
//!   the machine identifier, giving each machine exactly one valid key.
//!
//! Both policies are pure functions of their inputs: the same key always
//! validates the same way for the same machine.

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::config::LicenseConfig;

/// The documented demo key. Always present in the default allowlist.
pub const DEMO_KEY: &str = "DEMO-123-456-789";

/// Character set for license key generation.
/// Excludes ambiguous characters: 0, O, I, L, 1
const LICENSE_KEY_CHARSET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Configuration for the license key format.
/// This is a convenience wrapper that can be constructed from `LicenseConfig`.
#[derive(Debug, Clone)]
pub struct LicenseKeyConfig {
    /// Prefix for the license key (e.g., "DEMO")
    pub prefix: String,
    /// Number of segments after the prefix
    pub segments: u8,
    /// Length of each segment
    pub segment_length: u8,
}

impl Default for LicenseKeyConfig {
    fn default() -> Self {
        Self {
            prefix: "DEMO".to_string(),
            segments: 3,
            segment_length: 3,
        }
    }
}

impl From<&LicenseConfig> for LicenseKeyConfig {
    fn from(config: &LicenseConfig) -> Self {
        Self {
            prefix: config.key_prefix.clone(),
            segments: config.key_segments,
            segment_length: config.key_segment_length,
        }
    }
}

/// Outcome of validating a candidate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationResult {
    /// Well-formed and accepted by the policy.
    Accepted,
    /// Does not match the expected key shape.
    RejectedMalformed,
    /// Well-formed but not recognized by the policy.
    RejectedUnknown,
}

/// The accepted-key policy.
#[derive(Debug, Clone)]
pub enum KeyPolicy {
    /// Accept keys from a fixed set. Entries are stored normalized.
    Allowlist(Vec<String>),
    /// Accept only the key derived from the machine identifier.
    MachineDerived,
}

impl KeyPolicy {
    /// Build the policy selected by the configuration.
    pub fn from_config(config: &LicenseConfig) -> Self {
        match config.policy.as_str() {
            "machine-derived" => KeyPolicy::MachineDerived,
            _ => KeyPolicy::Allowlist(
                config.accepted_keys.iter().map(|k| normalize_key(k)).collect(),
            ),
        }
    }
}

/// Normalize a key for comparison: trimmed and uppercased.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_uppercase()
}

/// Validate that a candidate key matches the expected format.
///
/// This validates, case-insensitively:
/// - The key starts with the configured prefix
/// - The key has the correct number of segments
/// - Each segment has the correct length
/// - All segment characters are ASCII alphanumeric
pub fn is_well_formed(key: &str, config: &LicenseKeyConfig) -> bool {
    let key = normalize_key(key);
    let prefix = config.prefix.to_uppercase();

    let parts: Vec<&str> = key.split('-').collect();

    // Expected: prefix + N segments
    let expected_parts = 1 + config.segments as usize;
    if parts.len() != expected_parts {
        return false;
    }

    if parts[0] != prefix {
        return false;
    }

    for segment in &parts[1..] {
        if segment.len() != config.segment_length as usize {
            return false;
        }

        if !segment.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return false;
        }
    }

    true
}

/// Derive the single accepted key for a machine under the
/// machine-derived policy.
///
/// The machine identifier is folded through SHA-256 together with the key
/// prefix, and the hex digest is chunked into the configured segment shape.
pub fn derive_machine_key(machine_id: &str, config: &LicenseKeyConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(config.prefix.to_uppercase().as_bytes());
    hasher.update(b":");
    hasher.update(machine_id.as_bytes());
    let digest = hex::encode_upper(hasher.finalize());

    let segment_length = config.segment_length as usize;
    let segments: Vec<String> = digest
        .as_bytes()
        .chunks(segment_length)
        .take(config.segments as usize)
        .map(|chunk| String::from_utf8_lossy(chunk).to_string())
        .collect();

    format!("{}-{}", config.prefix.to_uppercase(), segments.join("-"))
}

/// Decide whether a candidate key is acceptable for the given machine.
///
/// Pure: no I/O, no persisted side effects. Same inputs, same output.
pub fn validate_key(
    key: &str,
    machine_id: &str,
    config: &LicenseKeyConfig,
    policy: &KeyPolicy,
) -> ValidationResult {
    if !is_well_formed(key, config) {
        return ValidationResult::RejectedMalformed;
    }

    let normalized = normalize_key(key);

    let accepted = match policy {
        KeyPolicy::Allowlist(keys) => keys.iter().any(|k| *k == normalized),
        KeyPolicy::MachineDerived => normalized == derive_machine_key(machine_id, config),
    };

    if accepted {
        ValidationResult::Accepted
    } else {
        ValidationResult::RejectedUnknown
    }
}

/// Generate a single segment of random characters.
fn generate_segment(length: u8) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..LICENSE_KEY_CHARSET.len());
            LICENSE_KEY_CHARSET[idx] as char
        })
        .collect()
}

/// Generate a well-formed license key with the given configuration.
///
/// Generated keys always pass [`is_well_formed`]; add them to the allowlist
/// to make them valid. The segment charset excludes ambiguous characters
/// for readability.
pub fn generate_license_key(config: &LicenseKeyConfig) -> String {
    let segments: Vec<String> = (0..config.segments)
        .map(|_| generate_segment(config.segment_length))
        .collect();

    format!("{}-{}", config.prefix.to_uppercase(), segments.join("-"))
}
