//! Administrative operations of the facade against the emulated device.

mod common;

use std::fs;

use common::{Fixture, wait_for_state};
use fpc_core::{FingerprintError, GroupId, HwAuthToken, PrintId, RequestStatus};
use fpc_hardware::mock::{EmulatorConfig, applet::FPC_ERROR_INPUT, emulated_device};
use fpc_service::{BiometricsFingerprint, CallbackEvent, HalConfig};
use fpc_worker::WorkerState;
use rstest::{fixture, rstest};

#[fixture]
fn device() -> Fixture {
    Fixture::new(1)
}

#[rstest]
fn test_admin_call_parks_and_releases_worker(mut device: Fixture) {
    assert_eq!(device.hal.enumerate().unwrap(), RequestStatus::SysOk);
    device.wait_idle();

    let states: Vec<_> = device.hal.worker_history().iter().map(|t| t.to).collect();
    let pause = states
        .iter()
        .rposition(|s| *s == WorkerState::Pause)
        .expect("worker never paused");
    assert!(states[pause..].contains(&WorkerState::Idle));
    assert!(matches!(device.next_event(), CallbackEvent::Enumerate { .. }));
}

#[rstest]
fn test_enumerate_empty_group(mut device: Fixture) {
    assert_eq!(device.hal.enumerate().unwrap(), RequestStatus::SysOk);
    assert_eq!(
        device.next_event(),
        CallbackEvent::Enumerate {
            device: device.hal.device_id(),
            print: PrintId::NONE,
            gid: GroupId(0),
            remaining: 0,
        }
    );
    device.assert_no_events();
}

#[rstest]
fn test_enumerate_reports_prints_in_order(mut device: Fixture) {
    let first = device.enroll_finger(1);
    let second = device.enroll_finger(2);

    assert_eq!(device.hal.enumerate().unwrap(), RequestStatus::SysOk);
    let listed: Vec<_> = (0..2)
        .map(|_| match device.next_event() {
            CallbackEvent::Enumerate {
                print, remaining, ..
            } => (print, remaining),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(listed, vec![(first, 1), (second, 0)]);
    device.assert_no_events();
}

#[rstest]
fn test_overlong_listing_is_rejected(mut device: Fixture) {
    device.device.report_listing_length(Some(6));
    assert_eq!(device.hal.enumerate().unwrap(), RequestStatus::SysEinval);
    device.assert_no_events();
}

#[rstest]
fn test_remove_all_counts_down(mut device: Fixture) {
    let prints: Vec<_> = (1..=3).map(|finger| device.enroll_finger(finger)).collect();

    assert_eq!(
        device.hal.remove(GroupId(0), PrintId::NONE).unwrap(),
        RequestStatus::SysOk
    );
    let removed: Vec<_> = (0..3)
        .map(|_| match device.next_event() {
            CallbackEvent::Removed {
                print, remaining, ..
            } => (print, remaining),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(
        removed,
        vec![(prints[2], 2), (prints[1], 1), (prints[0], 0)]
    );
    assert!(device.device.enrolled_prints(0).is_empty());
    device.assert_no_events();
}

#[rstest]
fn test_remove_single_print(mut device: Fixture) {
    let keep = device.enroll_finger(1);
    let gone = device.enroll_finger(2);

    assert_eq!(device.hal.remove(GroupId(0), gone).unwrap(), RequestStatus::SysOk);
    assert!(matches!(
        device.next_event(),
        CallbackEvent::Removed { print, remaining: 0, .. } if print == gone
    ));
    assert_eq!(device.device.enrolled_prints(0), vec![keep.0]);
}

#[rstest]
fn test_remove_all_stops_at_first_failure(mut device: Fixture) {
    device.enroll_finger(1);
    let last = device.enroll_finger(2);
    device.device.fail_deletes_after(1);

    let status = device.hal.remove(GroupId(0), PrintId::NONE).unwrap();
    assert_ne!(status, RequestStatus::SysOk);

    assert!(matches!(
        device.next_event(),
        CallbackEvent::Removed { print, remaining: 1, .. } if print == last
    ));
    assert!(matches!(
        device.next_event(),
        CallbackEvent::Error {
            error: FingerprintError::UnableToRemove,
            ..
        }
    ));
    device.assert_no_events();
    assert_eq!(device.device.enrolled_prints(0).len(), 1);
}

#[rstest]
fn test_interrupted_store_keeps_previous_database(mut device: Fixture) {
    let print = device.enroll_finger(1);
    let before = fs::read(device.db_path()).unwrap();

    device.device.fail_next_store();
    let status = device.hal.remove(GroupId(0), print).unwrap();
    assert_ne!(status, RequestStatus::SysOk);

    assert_eq!(fs::read(device.db_path()).unwrap(), before);
    assert!(!device.storage.path().join("user.db.tmp").exists());
}

#[test]
fn test_operations_need_a_callback() {
    let (env, sensor, _device) = emulated_device(EmulatorConfig::default());
    let hal = BiometricsFingerprint::open(env, sensor, HalConfig::default()).unwrap();

    assert_eq!(hal.enumerate().unwrap(), RequestStatus::SysEfault);
    assert_eq!(
        hal.remove(GroupId(0), PrintId::NONE).unwrap(),
        RequestStatus::SysEinval
    );
}

#[rstest]
fn test_set_active_group_creates_database(device: Fixture) {
    let other = tempfile::tempdir().unwrap();
    let status = device
        .hal
        .set_active_group(GroupId(3), other.path().to_str().unwrap())
        .unwrap();
    assert_eq!(status, RequestStatus::SysOk);
    assert!(other.path().join("user.db").is_file());

    let id = device.hal.get_authenticator_id().unwrap();
    assert_ne!(id, 0);
    assert_eq!(device.hal.get_authenticator_id().unwrap(), id);
}

#[rstest]
#[case::empty("")]
#[case::missing("/nonexistent/fingerprint/storage")]
fn test_set_active_group_rejects_bad_paths(device: Fixture, #[case] path: &str) {
    assert_eq!(
        device.hal.set_active_group(GroupId(0), path).unwrap(),
        RequestStatus::SysEinval
    );
}

#[rstest]
fn test_set_active_group_rejects_file(device: Fixture) {
    let file = device.storage.path().join("not-a-dir");
    fs::write(&file, b"x").unwrap();
    assert_eq!(
        device
            .hal
            .set_active_group(GroupId(0), file.to_str().unwrap())
            .unwrap(),
        RequestStatus::SysEinval
    );
}

#[rstest]
fn test_authenticator_id_changes_after_enroll(mut device: Fixture) {
    let before = device.hal.get_authenticator_id().unwrap();
    device.enroll_finger(4);
    assert_ne!(device.hal.get_authenticator_id().unwrap(), before);
}

#[rstest]
fn test_rejected_enroll_token_leaves_worker_idle(mut device: Fixture) {
    let challenge = device.hal.pre_enroll().unwrap();
    let stale = device.device.mint_auth_token(challenge.wrapping_add(1), 0);

    // The trustlet's rejection code maps through the common status table.
    let rejected = RequestStatus::from_code(FPC_ERROR_INPUT);
    let status = device.hal.enroll(&stale.to_bytes(), GroupId(0), 60).unwrap();
    assert_eq!(status, rejected);

    let unsigned = HwAuthToken::empty().to_bytes();
    assert_eq!(device.hal.enroll(&unsigned, GroupId(0), 60).unwrap(), rejected);

    device.wait_idle();
    device.assert_no_events();
}

#[rstest]
fn test_post_enroll_resets_challenge(device: Fixture) {
    assert_ne!(device.hal.pre_enroll().unwrap(), 0);
    assert_eq!(device.hal.post_enroll().unwrap(), RequestStatus::SysOk);
}

#[rstest]
fn test_no_shared_regions_leak(mut device: Fixture) {
    let print = device.enroll_finger(1);
    device.hal.enumerate().unwrap();
    device.hal.get_authenticator_id().unwrap();
    device.hal.remove(GroupId(0), print).unwrap();
    device.device.report_listing_length(Some(9));
    device.hal.enumerate().unwrap();
    device.wait_idle();

    assert_eq!(device.device.outstanding_regions(), 0);
}

#[rstest]
#[case::primary_missing(vec!["keymaste"], true)]
#[case::both_missing(vec!["keymaste", "keymaster"], false)]
#[case::fingerprint_missing(vec!["tzfingerprint"], false)]
fn test_open_with_missing_trustlets(#[case] missing: Vec<&str>, #[case] opens: bool) {
    let (env, sensor, device) = emulated_device(EmulatorConfig {
        missing_trustlets: missing.into_iter().map(String::from).collect(),
        ..EmulatorConfig::default()
    });

    match BiometricsFingerprint::open(env, sensor, HalConfig::default()) {
        Ok(hal) => {
            assert!(opens, "open should have failed");
            assert!(device.key_provisioned());
            wait_for_state(&hal, WorkerState::Idle);
        }
        Err(e) => {
            assert!(!opens, "open failed: {e}");
            assert!(e.is_fatal());
            assert!(!device.is_powered());
            assert!(device.loaded_trustlets().is_empty());
        }
    }
}

#[test]
fn test_drop_shuts_device_down() {
    let (env, sensor, device) = emulated_device(EmulatorConfig::default());
    let hal = BiometricsFingerprint::open(env, sensor, HalConfig::default()).unwrap();
    assert_eq!(device.loaded_trustlets(), vec!["tzfingerprint".to_string()]);

    drop(hal);
    assert!(device.loaded_trustlets().is_empty());
    assert_eq!(device.outstanding_regions(), 0);
}
