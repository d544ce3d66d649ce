//! Machine identity for license binding.
//!
//! Derives a stable identifier for the current machine from attributes that
//! survive restarts: OS, architecture, hostname, username, and the OS-level
//! machine id where one exists. The components are folded through SHA-256 so
//! the published identifier never leaks the raw attributes.
//!
//! Unavailable attributes degrade to fixed sentinel components rather than
//! failing the caller, so the result is always deterministic for a machine.

use sha2::{Digest, Sha256};
use std::env;

/// Sentinel used for any attribute that cannot be resolved.
const UNKNOWN: &str = "unknown";

/// Returns a unique identifier for the current machine.
///
/// Deterministic and session-independent: calling this twice on the same
/// machine returns the same value.
pub fn get_hardware_id() -> String {
    let components = collect_components();
    let combined = components.join("|");

    let mut hasher = Sha256::new();
    hasher.update(combined.as_bytes());
    hex::encode(hasher.finalize())
}

/// Gather the raw identity components, most stable first.
fn collect_components() -> Vec<String> {
    let mut components = vec![env::consts::OS.to_string(), env::consts::ARCH.to_string()];

    components.push(get_hostname());
    components.push(get_username());
    components.push(get_machine_id().unwrap_or_else(|| UNKNOWN.to_string()));

    components
}

/// Hostname of the current machine.
fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Name of the logged-in user.
fn get_username() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| UNKNOWN.to_string())
}

/// OS-level machine id, if the platform provides one.
fn get_machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(target_os = "windows")]
    {
        // No registry access without an extra dependency; the remaining
        // components still identify the machine.
        None
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}
