//! End-to-end tests for the license manager against a real store on disk.

use std::fs;

use chrono::{Duration, Utc};
use tempfile::{tempdir, TempDir};

use chronolock::errors::{ActivationError, StoreError};
use chronolock::hardware::get_hardware_id;
use chronolock::license::{InvalidReason, LicenseManager, LicenseStatus};
use chronolock::license_key::{normalize_key, KeyPolicy, LicenseKeyConfig, DEMO_KEY};
use chronolock::storage::{LicenseState, LicenseStateStore};

fn store_in(dir: &TempDir) -> LicenseStateStore {
    LicenseStateStore::new(dir.path().join("license_data.json"))
}

fn manager_in(dir: &TempDir) -> LicenseManager {
    LicenseManager::new(
        store_in(dir),
        LicenseKeyConfig::default(),
        KeyPolicy::Allowlist(vec![normalize_key(DEMO_KEY)]),
        30,
        Duration::hours(6),
    )
}

#[test]
fn fresh_install_starts_full_trial() {
    let dir = tempdir().expect("tempdir");
    let manager = manager_in(&dir);

    let status = manager.status().expect("status should succeed");
    assert_eq!(status, LicenseStatus::Trial { days_remaining: 30 });

    // The first query persisted a fresh trial state.
    let state = store_in(&dir)
        .load()
        .expect("load should succeed")
        .expect("state should exist after first query");
    assert!(!state.is_activated);
    assert!(state.bound_machine_id.is_none());
    assert!((Utc::now() - state.trial_start).num_seconds().abs() < 60);
}

#[test]
fn status_is_idempotent() {
    let dir = tempdir().expect("tempdir");
    let manager = manager_in(&dir);

    let first = manager.status().expect("status should succeed");
    let on_disk = fs::read_to_string(store_in(&dir).path()).expect("read should succeed");

    let second = manager.status().expect("status should succeed");
    assert_eq!(first, second);

    // The second query did not rewrite the record.
    let on_disk_again = fs::read_to_string(store_in(&dir).path()).expect("read should succeed");
    assert_eq!(on_disk, on_disk_again);
}

#[test]
fn activation_round_trip_binds_this_machine() {
    let dir = tempdir().expect("tempdir");
    let manager = manager_in(&dir);

    let status = manager.activate(DEMO_KEY).expect("activation should succeed");
    assert_eq!(status, LicenseStatus::Licensed);
    assert_eq!(
        manager.status().expect("status should succeed"),
        LicenseStatus::Licensed
    );

    let state = store_in(&dir)
        .load()
        .expect("load should succeed")
        .expect("state should exist");
    assert!(state.is_activated);
    assert_eq!(state.bound_machine_id.as_deref(), Some(get_hardware_id().as_str()));
    assert_eq!(state.activated_key.as_deref(), Some(DEMO_KEY));
}

#[test]
fn activation_is_case_insensitive() {
    let dir = tempdir().expect("tempdir");
    let manager = manager_in(&dir);

    let status = manager
        .activate("demo-123-456-789")
        .expect("activation should succeed");
    assert_eq!(status, LicenseStatus::Licensed);
}

#[test]
fn rejected_key_mutates_nothing() {
    let dir = tempdir().expect("tempdir");
    let manager = manager_in(&dir);

    // Establish a trial first.
    let before = manager.status().expect("status should succeed");
    let on_disk = fs::read_to_string(store_in(&dir).path()).expect("read should succeed");

    let err = manager.activate("not-a-key").expect_err("must be rejected");
    assert!(matches!(err, ActivationError::InvalidKey));

    let err = manager
        .activate("DEMO-999-999-999")
        .expect_err("must be rejected");
    assert!(matches!(err, ActivationError::InvalidKey));

    assert_eq!(manager.status().expect("status should succeed"), before);
    let on_disk_again = fs::read_to_string(store_in(&dir).path()).expect("read should succeed");
    assert_eq!(on_disk, on_disk_again);
}

#[test]
fn trial_countdown_is_monotone() {
    let dir = tempdir().expect("tempdir");
    let manager = manager_in(&dir);
    let store = store_in(&dir);

    let mut previous = 30;
    for elapsed in 0..30 {
        store
            .save(&LicenseState::new_trial(
                Utc::now() - Duration::days(elapsed),
            ))
            .expect("save should succeed");

        match manager.status().expect("status should succeed") {
            LicenseStatus::Trial { days_remaining } => {
                assert!(days_remaining <= previous, "countdown must not increase");
                assert_eq!(i64::from(30 - days_remaining), elapsed);
                previous = days_remaining;
            }
            other => panic!("expected trial at {elapsed} days, got {other:?}"),
        }
    }
}

#[test]
fn expiry_is_permanent_without_activation() {
    let dir = tempdir().expect("tempdir");
    let manager = manager_in(&dir);
    let store = store_in(&dir);

    for elapsed in [30, 60, 3650] {
        store
            .save(&LicenseState::new_trial(
                Utc::now() - Duration::days(elapsed),
            ))
            .expect("save should succeed");
        assert_eq!(
            manager.status().expect("status should succeed"),
            LicenseStatus::Expired
        );
    }
}

#[test]
fn expired_trial_can_still_activate() {
    let dir = tempdir().expect("tempdir");
    let manager = manager_in(&dir);

    store_in(&dir)
        .save(&LicenseState::new_trial(Utc::now() - Duration::days(90)))
        .expect("save should succeed");

    let status = manager.activate(DEMO_KEY).expect("activation should succeed");
    assert_eq!(status, LicenseStatus::Licensed);
}

#[test]
fn license_bound_elsewhere_is_invalid() {
    let dir = tempdir().expect("tempdir");
    let manager = manager_in(&dir);

    store_in(&dir)
        .save(
            &LicenseState::new_trial(Utc::now())
                .activated("another-machine".to_string(), DEMO_KEY.to_string()),
        )
        .expect("save should succeed");

    assert_eq!(
        manager.status().expect("status should succeed"),
        LicenseStatus::Invalid {
            reason: InvalidReason::MachineMismatch
        }
    );
}

#[test]
fn corrupt_record_is_surfaced_and_preserved() {
    let dir = tempdir().expect("tempdir");
    let manager = manager_in(&dir);
    let store = store_in(&dir);

    fs::write(store.path(), "definitely not json").expect("write should succeed");

    assert_eq!(
        manager.status().expect("status should succeed"),
        LicenseStatus::Invalid {
            reason: InvalidReason::CorruptState
        }
    );

    // The corrupt record must not be replaced by a fresh trial.
    let on_disk = fs::read_to_string(store.path()).expect("read should succeed");
    assert_eq!(on_disk, "definitely not json");
}

#[test]
fn activation_over_corrupt_record_fails_and_preserves_it() {
    let dir = tempdir().expect("tempdir");
    let manager = manager_in(&dir);
    let store = store_in(&dir);

    fs::write(store.path(), "definitely not json").expect("write should succeed");

    let err = manager.activate(DEMO_KEY).expect_err("activation must fail");
    assert!(matches!(err, ActivationError::PersistenceFailed(_)));

    let on_disk = fs::read_to_string(store.path()).expect("read should succeed");
    assert_eq!(on_disk, "definitely not json");
}

#[test]
fn reset_reenters_trial_from_corrupt_state() {
    let dir = tempdir().expect("tempdir");
    let manager = manager_in(&dir);

    fs::write(store_in(&dir).path(), "definitely not json").expect("write should succeed");

    let status = manager.reset().expect("reset should succeed");
    assert_eq!(status, LicenseStatus::Trial { days_remaining: 30 });
}

#[test]
fn future_trial_start_is_not_a_fresh_window() {
    let dir = tempdir().expect("tempdir");
    let manager = manager_in(&dir);

    store_in(&dir)
        .save(&LicenseState::new_trial(Utc::now() + Duration::days(45)))
        .expect("save should succeed");

    assert_eq!(
        manager.status().expect("status should succeed"),
        LicenseStatus::Invalid {
            reason: InvalidReason::ClockTampering
        }
    );
}

#[test]
fn unreadable_store_is_an_error_not_a_fresh_trial() {
    let dir = tempdir().expect("tempdir");

    // The record path points "through" a plain file, so reads fail with an
    // I/O error that is neither "absent" nor "corrupt".
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "plain file").expect("write should succeed");

    let store = LicenseStateStore::new(blocker.join("license_data.json"));
    let manager = LicenseManager::new(
        store,
        LicenseKeyConfig::default(),
        KeyPolicy::Allowlist(vec![normalize_key(DEMO_KEY)]),
        30,
        Duration::hours(6),
    );

    let err = manager.status().expect_err("status must fail");
    assert!(matches!(err, StoreError::Io(_)));

    let err = manager.activate(DEMO_KEY).expect_err("activation must fail");
    assert!(matches!(err, ActivationError::PersistenceFailed(_)));
}

#[test]
fn remaining_days_mirror_status() {
    let dir = tempdir().expect("tempdir");
    let manager = manager_in(&dir);
    let store = store_in(&dir);

    store
        .save(&LicenseState::new_trial(Utc::now() - Duration::days(10)))
        .expect("save should succeed");
    assert_eq!(
        manager.remaining_trial_days().expect("query should succeed"),
        20
    );

    store
        .save(&LicenseState::new_trial(Utc::now() - Duration::days(90)))
        .expect("save should succeed");
    assert_eq!(
        manager.remaining_trial_days().expect("query should succeed"),
        0
    );

    manager.activate(DEMO_KEY).expect("activation should succeed");
    assert_eq!(
        manager.remaining_trial_days().expect("query should succeed"),
        0
    );
}

#[test]
fn machine_derived_policy_end_to_end() {
    let dir = tempdir().expect("tempdir");
    let key_config = LicenseKeyConfig::default();
    let manager = LicenseManager::new(
        store_in(&dir),
        key_config.clone(),
        KeyPolicy::MachineDerived,
        30,
        Duration::hours(6),
    );

    // The demo key is not valid under this policy.
    let err = manager.activate(DEMO_KEY).expect_err("must be rejected");
    assert!(matches!(err, ActivationError::InvalidKey));

    let key = chronolock::license_key::derive_machine_key(&get_hardware_id(), &key_config);
    let status = manager.activate(&key).expect("activation should succeed");
    assert_eq!(status, LicenseStatus::Licensed);
}
