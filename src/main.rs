//! Command-line shell for the Chronolock license core.
//!
//! The real application is a windowed clock; this binary is the thin glue a
//! UI would otherwise be: it queries the manager, prints banner text, and
//! forwards activation attempts. Errors are printed verbatim and exit with
//! a nonzero code; nothing here panics.

use std::env;
use std::process::ExitCode;

use chronolock::config::{get_config, is_logging_enabled};
use chronolock::errors::ActivationError;
use chronolock::license::{LicenseManager, LicenseStatus};
use chronolock::license_key::{generate_license_key, LicenseKeyConfig};

fn main() -> ExitCode {
    if is_logging_enabled() {
        let level = get_config()
            .map(|c| c.logging.level.clone())
            .unwrap_or_else(|_| "info".to_string());
        env_logger::Builder::new().parse_filters(&level).init();
    }

    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        None | Some("status") => run_status(),
        Some("activate") => match args.get(1) {
            Some(key) => run_activate(key),
            None => {
                eprintln!("usage: chronolock activate <KEY>");
                ExitCode::FAILURE
            }
        },
        Some("reset") => run_reset(),
        Some("generate") => run_generate(),
        Some(other) => {
            eprintln!("unknown command: {other}");
            eprintln!("usage: chronolock [status | activate <KEY> | reset | generate]");
            ExitCode::FAILURE
        }
    }
}

fn manager() -> Result<LicenseManager, ExitCode> {
    LicenseManager::from_config().map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::FAILURE
    })
}

fn print_status(status: LicenseStatus) {
    println!("License status: {status}");
    if status.unlocks_premium() {
        println!("Premium timezone view is unlocked.");
    } else {
        println!("Premium timezone view is locked.");
    }
}

fn run_status() -> ExitCode {
    let manager = match manager() {
        Ok(m) => m,
        Err(code) => return code,
    };

    match manager.status() {
        Ok(status) => {
            print_status(status);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_activate(key: &str) -> ExitCode {
    let manager = match manager() {
        Ok(m) => m,
        Err(code) => return code,
    };

    match manager.activate(key) {
        Ok(status) => {
            println!("Activation successful.");
            print_status(status);
            ExitCode::SUCCESS
        }
        Err(e @ ActivationError::InvalidKey) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
        Err(e @ ActivationError::PersistenceFailed(_)) => {
            eprintln!("{e}");
            eprintln!("The previous license state is unchanged; please retry.");
            ExitCode::FAILURE
        }
    }
}

fn run_reset() -> ExitCode {
    let manager = match manager() {
        Ok(m) => m,
        Err(code) => return code,
    };

    match manager.reset() {
        Ok(status) => {
            println!("License state reset.");
            print_status(status);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_generate() -> ExitCode {
    let key_config = match get_config() {
        Ok(config) => LicenseKeyConfig::from(&config.license),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let key = generate_license_key(&key_config);
    println!("{key}");
    println!("Add this key to license.accepted_keys to make it valid.");
    ExitCode::SUCCESS
}
