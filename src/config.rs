//! Configuration system for Chronolock.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `CHRONOLOCK_TRIAL_DAYS` - Trial window length in days
//! - `CHRONOLOCK_SKEW_TOLERANCE_HOURS` - Clock-skew tolerance in hours
//! - `CHRONOLOCK_KEY_PREFIX` - License key prefix
//! - `CHRONOLOCK_KEY_POLICY` - Accepted-key policy ("allowlist" or "machine-derived")
//! - `CHRONOLOCK_LICENSE_KEY` - Extra accepted key (appended to the allowlist)
//! - `CHRONOLOCK_LICENSE_FILE` - Override path of the license state file
//! - `CHRONOLOCK_LOGGING_ENABLED` - Enable logging
//! - `CHRONOLOCK_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::errors::{LicenseError, LicenseResult};
use crate::license_key::DEMO_KEY;

/// Global configuration singleton.
static CONFIG: OnceLock<ChronolockConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChronolockConfig {
    /// Trial window configuration
    pub trial: TrialConfig,
    /// License key configuration
    pub license: LicenseConfig,
    /// Local storage configuration
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Trial window configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    /// Length of the trial window in days
    pub duration_days: u32,
    /// Tolerance for future-dated trial starts before the clock-skew guard
    /// reports tampering, in hours
    pub skew_tolerance_hours: u32,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            duration_days: 30,
            skew_tolerance_hours: 6,
        }
    }
}

/// License key configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Prefix for license keys (e.g., "DEMO" -> "DEMO-XXX-XXX-XXX")
    pub key_prefix: String,
    /// Number of segments after the prefix
    pub key_segments: u8,
    /// Characters per segment
    pub key_segment_length: u8,
    /// Accepted-key policy: "allowlist" or "machine-derived"
    pub policy: String,
    /// Keys accepted by the allowlist policy
    pub accepted_keys: Vec<String>,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            key_prefix: "DEMO".to_string(),
            key_segments: 3,
            key_segment_length: 3,
            policy: "allowlist".to_string(),
            accepted_keys: vec![DEMO_KEY.to_string()],
        }
    }
}

/// Local storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the license state file. Empty means the platform default
    /// (`<data dir>/chronolock/license_data.json`).
    pub file_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            file_path: String::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "info".to_string(),
        }
    }
}

impl ChronolockConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    fn load() -> LicenseResult<Self> {
        let builder = Config::builder()
            // Start with defaults
            .set_default("trial.duration_days", 30)
            .map_err(|e| LicenseError::Config(e.to_string()))?
            .set_default("trial.skew_tolerance_hours", 6)
            .map_err(|e| LicenseError::Config(e.to_string()))?
            .set_default("license.key_prefix", "DEMO")
            .map_err(|e| LicenseError::Config(e.to_string()))?
            .set_default("license.key_segments", 3)
            .map_err(|e| LicenseError::Config(e.to_string()))?
            .set_default("license.key_segment_length", 3)
            .map_err(|e| LicenseError::Config(e.to_string()))?
            .set_default("license.policy", "allowlist")
            .map_err(|e| LicenseError::Config(e.to_string()))?
            .set_default("license.accepted_keys", vec![DEMO_KEY])
            .map_err(|e| LicenseError::Config(e.to_string()))?
            .set_default("storage.file_path", "")
            .map_err(|e| LicenseError::Config(e.to_string()))?
            .set_default("logging.enabled", false)
            .map_err(|e| LicenseError::Config(e.to_string()))?
            .set_default("logging.level", "info")
            .map_err(|e| LicenseError::Config(e.to_string()))?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option(
                "trial.duration_days",
                env::var("CHRONOLOCK_TRIAL_DAYS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| LicenseError::Config(e.to_string()))?
            .set_override_option(
                "trial.skew_tolerance_hours",
                env::var("CHRONOLOCK_SKEW_TOLERANCE_HOURS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| LicenseError::Config(e.to_string()))?
            .set_override_option("license.key_prefix", env::var("CHRONOLOCK_KEY_PREFIX").ok())
            .map_err(|e| LicenseError::Config(e.to_string()))?
            .set_override_option("license.policy", env::var("CHRONOLOCK_KEY_POLICY").ok())
            .map_err(|e| LicenseError::Config(e.to_string()))?
            .set_override_option(
                "storage.file_path",
                env::var("CHRONOLOCK_LICENSE_FILE").ok(),
            )
            .map_err(|e| LicenseError::Config(e.to_string()))?
            .set_override_option(
                "logging.enabled",
                env::var("CHRONOLOCK_LOGGING_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(|e| LicenseError::Config(e.to_string()))?
            .set_override_option("logging.level", env::var("CHRONOLOCK_LOG_LEVEL").ok())
            .map_err(|e| LicenseError::Config(e.to_string()))?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::Config(format!("failed to build config: {e}")))?;

        let mut config: Self = settings
            .try_deserialize()
            .map_err(|e| LicenseError::Config(format!("failed to deserialize config: {e}")))?;

        // An environment-supplied key is just another allowlist candidate,
        // never a bypass.
        if let Ok(key) = env::var("CHRONOLOCK_LICENSE_KEY") {
            if !key.trim().is_empty() {
                config.license.accepted_keys.push(key);
            }
        }

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.trial.duration_days == 0 {
            return Err(LicenseError::Config(
                "trial.duration_days must be greater than 0".to_string(),
            ));
        }

        // Validate license key config
        if self.license.key_prefix.is_empty() {
            return Err(LicenseError::Config(
                "license.key_prefix cannot be empty".to_string(),
            ));
        }
        if self.license.key_segments == 0 {
            return Err(LicenseError::Config(
                "license.key_segments must be greater than 0".to_string(),
            ));
        }
        if self.license.key_segment_length == 0 {
            return Err(LicenseError::Config(
                "license.key_segment_length must be greater than 0".to_string(),
            ));
        }

        // Validate policy
        match self.license.policy.as_str() {
            "allowlist" => {}
            "machine-derived" => {
                // Derived keys are folded out of a 64-character digest.
                let key_chars =
                    self.license.key_segments as usize * self.license.key_segment_length as usize;
                if key_chars > 64 {
                    return Err(LicenseError::Config(
                        "license.policy 'machine-derived' supports at most 64 key characters"
                            .to_string(),
                    ));
                }
            }
            other => {
                return Err(LicenseError::Config(format!(
                    "license.policy must be 'allowlist' or 'machine-derived', got '{other}'"
                )));
            }
        }

        // Validate log level
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::Config(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> LicenseResult<&'static ChronolockConfig> {
    // Check if already initialized
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    // Load and validate configuration
    let config = ChronolockConfig::load()?;
    config.validate()?;

    // Try to set it (ignore if another thread beat us)
    let _ = CONFIG.set(config.clone());

    // Return the stored config (either ours or another thread's)
    Ok(CONFIG.get().expect("config was just set"))
}

/// Initialize configuration explicitly.
///
/// Call this early in your application to catch configuration errors.
/// Returns the validated configuration.
pub fn init_config() -> LicenseResult<&'static ChronolockConfig> {
    get_config()
}

/// Check whether logging is enabled.
pub fn is_logging_enabled() -> bool {
    get_config().map(|c| c.logging.enabled).unwrap_or(false)
}
