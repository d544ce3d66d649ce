//! Error types for the Chronolock license core.
//!
//! Every failure crosses the library boundary as an explicit `Result` value.
//! The UI shell owns the translation into user-facing messages; nothing in
//! this crate is allowed to take the process down.

use thiserror::Error;

/// Failures of the durable license state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record exists on disk but cannot be parsed. Distinct from "absent":
    /// callers must never treat a corrupt record as a first run.
    #[error("license state file is corrupt")]
    Corrupt(#[source] serde_json::Error),

    /// The underlying storage is unavailable (disk full, permission denied,
    /// unreadable directory).
    #[error("license storage I/O failure")]
    Io(#[from] std::io::Error),
}

/// Failures of a license activation attempt.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// The presented key is malformed or not recognized. The user may retry
    /// with a different key; no state was changed.
    #[error("license key was rejected")]
    InvalidKey,

    /// The key validated but the new state could not be durably saved. The
    /// stored record is whatever it was before the attempt.
    #[error("license key accepted but saving the license state failed")]
    PersistenceFailed(#[source] StoreError),
}

/// Crate-level errors for configuration and wiring.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// A store failure surfaced outside the activation path.
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type LicenseResult<T> = Result<T, LicenseError>;
