//! The license state machine.
//!
//! [`LicenseManager`] derives a [`LicenseStatus`] from the persisted facts
//! and the current clock on every query. There is no stored "current status"
//! field, so status and state can never drift apart.
//!
//! Evaluation order:
//!
//! 1. Corrupt record -> `Invalid("corrupt state")`. Never auto-repaired;
//!    only [`LicenseManager::reset`] re-enters trial.
//! 2. No record -> persist a fresh trial state and report it. The only
//!    mutation a status query may perform.
//! 3. Activated -> machine binding check against the current hardware id.
//! 4. Not activated -> trial window arithmetic.
//! 5. Future-dated trial start beyond the tolerance -> clock tampering,
//!    checked before the window is granted.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::config::get_config;
use crate::errors::{ActivationError, LicenseResult, StoreError};
use crate::hardware::get_hardware_id;
use crate::license_key::{
    normalize_key, validate_key, KeyPolicy, LicenseKeyConfig, ValidationResult,
};
use crate::storage::{LicenseState, LicenseStateStore};

/// Why a license is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// The persisted record exists but cannot be parsed.
    CorruptState,
    /// The license is bound to a different machine. Licenses do not transfer
    /// when the application moves to new hardware.
    MachineMismatch,
    /// The trial start is in the future beyond the skew tolerance.
    ClockTampering,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvalidReason::CorruptState => "corrupt state",
            InvalidReason::MachineMismatch => "license bound to a different machine",
            InvalidReason::ClockTampering => "clock tampering suspected",
        };
        write!(f, "{}", s)
    }
}

/// Current license status, derived fresh on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseStatus {
    /// Within the trial window.
    Trial {
        /// Whole days left before the trial expires.
        days_remaining: u32,
    },
    /// Activated and bound to this machine.
    Licensed,
    /// The trial window has elapsed without activation.
    Expired,
    /// The license cannot be used; see the reason.
    Invalid {
        /// Why the license is unusable.
        reason: InvalidReason,
    },
}

impl LicenseStatus {
    /// Returns true if premium behavior should be unlocked.
    pub fn unlocks_premium(&self) -> bool {
        matches!(self, Self::Licensed)
    }

    /// Returns true if the application may run at all (trial or licensed).
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Licensed | Self::Trial { .. })
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trial { days_remaining } => {
                write!(f, "trial ({days_remaining} days remaining)")
            }
            Self::Licensed => write!(f, "licensed"),
            Self::Expired => write!(f, "expired"),
            Self::Invalid { reason } => write!(f, "invalid: {reason}"),
        }
    }
}

/// Orchestrates the store, the key validator, and the machine identity.
///
/// Single-consumer: queried and mutated from one logical flow of control at
/// a time. Saves are atomically visible, but two processes racing an
/// activation against the same file is an accepted limitation.
#[derive(Debug)]
pub struct LicenseManager {
    store: LicenseStateStore,
    key_config: LicenseKeyConfig,
    policy: KeyPolicy,
    trial_days: u32,
    skew_tolerance: Duration,
}

impl LicenseManager {
    /// Manager over an explicit store and policy. The constructor used by
    /// tests; applications usually go through [`LicenseManager::from_config`].
    pub fn new(
        store: LicenseStateStore,
        key_config: LicenseKeyConfig,
        policy: KeyPolicy,
        trial_days: u32,
        skew_tolerance: Duration,
    ) -> Self {
        Self {
            store,
            key_config,
            policy,
            trial_days,
            skew_tolerance,
        }
    }

    /// Manager wired from the global configuration.
    pub fn from_config() -> LicenseResult<Self> {
        let config = get_config()?;
        Ok(Self::new(
            LicenseStateStore::from_config()?,
            LicenseKeyConfig::from(&config.license),
            KeyPolicy::from_config(&config.license),
            config.trial.duration_days,
            Duration::hours(i64::from(config.trial.skew_tolerance_hours)),
        ))
    }

    /// Compute the current license status.
    ///
    /// Read-only except for the lazy first-run initialization: when no
    /// record exists yet, a fresh trial state is persisted. An I/O failure
    /// while reading is surfaced as an error, never mistaken for a first
    /// run; a corrupt record is reported as `Invalid`, never overwritten.
    pub fn status(&self) -> Result<LicenseStatus, StoreError> {
        match self.store.load() {
            Ok(Some(state)) => Ok(self.evaluate(&state, Utc::now())),
            Ok(None) => {
                let state = LicenseState::new_trial(Utc::now());
                self.store.save(&state)?;
                log::info!("first run: trial started ({} days)", self.trial_days);
                Ok(LicenseStatus::Trial {
                    days_remaining: self.trial_days,
                })
            }
            Err(StoreError::Corrupt(e)) => {
                log::warn!("license state is corrupt: {e}");
                Ok(LicenseStatus::Invalid {
                    reason: InvalidReason::CorruptState,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Derive the status from a loaded state and the current time.
    fn evaluate(&self, state: &LicenseState, now: DateTime<Utc>) -> LicenseStatus {
        if state.is_activated {
            let current = get_hardware_id();
            return match &state.bound_machine_id {
                Some(bound) if *bound == current => LicenseStatus::Licensed,
                _ => {
                    log::warn!("activated license does not match this machine");
                    LicenseStatus::Invalid {
                        reason: InvalidReason::MachineMismatch,
                    }
                }
            };
        }

        // A trial start further in the future than the tolerance means the
        // clock was rolled back to stretch the window.
        if state.trial_start > now + self.skew_tolerance {
            log::warn!(
                "trial start {} is in the future beyond tolerance",
                state.trial_start
            );
            return LicenseStatus::Invalid {
                reason: InvalidReason::ClockTampering,
            };
        }

        // Skew inside the tolerance clamps to a full window, never more.
        let elapsed_days = (now - state.trial_start).num_days().max(0);
        if elapsed_days < i64::from(self.trial_days) {
            LicenseStatus::Trial {
                days_remaining: self.trial_days - elapsed_days as u32,
            }
        } else {
            LicenseStatus::Expired
        }
    }

    /// Attempt to activate with a candidate key.
    ///
    /// On acceptance the state is bound to the current machine and persisted
    /// before anything is reported; if the save fails, the attempt reports
    /// `PersistenceFailed` and the stored record is unchanged. Rejected keys
    /// mutate nothing. Activation is all-or-nothing either way.
    pub fn activate(&self, key: &str) -> Result<LicenseStatus, ActivationError> {
        let machine_id = get_hardware_id();

        match validate_key(key, &machine_id, &self.key_config, &self.policy) {
            ValidationResult::Accepted => {}
            ValidationResult::RejectedMalformed => {
                log::info!("activation rejected: malformed key");
                return Err(ActivationError::InvalidKey);
            }
            ValidationResult::RejectedUnknown => {
                log::info!("activation rejected: unknown key");
                return Err(ActivationError::InvalidKey);
            }
        }

        // A corrupt or unreadable record is not consumed by activation;
        // it stays on disk for an explicit reset.
        let state = match self.store.load() {
            Ok(Some(state)) => state,
            Ok(None) => LicenseState::new_trial(Utc::now()),
            Err(e) => return Err(ActivationError::PersistenceFailed(e)),
        };

        let state = state.activated(machine_id, normalize_key(key));
        self.store
            .save(&state)
            .map_err(ActivationError::PersistenceFailed)?;

        log::info!("license activated and bound to this machine");
        Ok(LicenseStatus::Licensed)
    }

    /// Explicitly re-initialize: wipe the stored record and start a fresh
    /// trial. The only sanctioned way out of a corrupt or tampered state.
    pub fn reset(&self) -> Result<LicenseStatus, StoreError> {
        self.store.wipe()?;
        log::info!("license state reset");
        self.status()
    }

    /// Whole days left in the trial window. Zero when licensed, expired, or
    /// invalid.
    pub fn remaining_trial_days(&self) -> Result<u32, StoreError> {
        Ok(match self.status()? {
            LicenseStatus::Trial { days_remaining } => days_remaining,
            _ => 0,
        })
    }
}
