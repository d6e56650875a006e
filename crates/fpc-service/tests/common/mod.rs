//! Shared fixtures for the service integration tests.

#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use fpc_core::{GroupId, PrintId, RequestStatus};
use fpc_hardware::mock::{EmulatorConfig, EmulatorHandle, MockSecureEnvironment, emulated_device};
use fpc_service::{BiometricsFingerprint, CallbackEvent, ChannelCallback, HalConfig};
use fpc_worker::WorkerState;
use tempfile::TempDir;
use tokio::sync::mpsc::{UnboundedReceiver, error::TryRecvError};

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub type Hal = BiometricsFingerprint<MockSecureEnvironment>;

pub struct Fixture {
    pub hal: Hal,
    pub device: EmulatorHandle,
    pub events: UnboundedReceiver<CallbackEvent>,
    pub storage: TempDir,
    pub touches: u32,
}

impl Fixture {
    /// Open a device with a registered callback and group 0 active in a
    /// fresh directory.
    pub fn new(touches: u32) -> Self {
        Self::with_config(EmulatorConfig {
            enroll_touches: touches,
            ..EmulatorConfig::default()
        })
    }

    pub fn with_config(config: EmulatorConfig) -> Self {
        let touches = config.enroll_touches.max(1);
        let (env, sensor, device) = emulated_device(config);
        let hal = match BiometricsFingerprint::open(env, sensor, HalConfig::default()) {
            Ok(hal) => hal,
            Err(e) => panic!("device did not open: {e}"),
        };
        let (callback, events) = ChannelCallback::new();
        hal.set_notification_callback(callback).unwrap();

        let storage = tempfile::tempdir().unwrap();
        let status = hal
            .set_active_group(GroupId(0), storage.path().to_str().unwrap())
            .unwrap();
        assert_eq!(status, RequestStatus::SysOk);
        wait_for_state(&hal, WorkerState::Idle);

        Self {
            hal,
            device,
            events,
            storage,
            touches,
        }
    }

    pub fn next_event(&mut self) -> CallbackEvent {
        next_event(&mut self.events)
    }

    /// Next event that is not acquisition feedback.
    pub fn next_result(&mut self) -> CallbackEvent {
        loop {
            match self.next_event() {
                CallbackEvent::Acquired { .. } => continue,
                event => return event,
            }
        }
    }

    pub fn assert_no_events(&mut self) {
        thread::sleep(Duration::from_millis(50));
        if let Ok(event) = self.events.try_recv() {
            panic!("unexpected event {event:?}");
        }
    }

    pub fn wait_idle(&self) {
        wait_for_state(&self.hal, WorkerState::Idle);
    }

    pub fn db_path(&self) -> std::path::PathBuf {
        self.storage.path().join("user.db")
    }

    /// Start an authorized enrollment of group 0.
    pub fn start_enroll(&mut self) -> RequestStatus {
        let challenge = self.hal.pre_enroll().unwrap();
        let token = self.device.mint_auth_token(challenge, 0).to_bytes();
        self.hal.enroll(&token, GroupId(0), 60).unwrap()
    }

    /// Enroll `finger` into group 0 and return its print id.
    pub fn enroll_finger(&mut self, finger: u32) -> PrintId {
        assert_eq!(self.start_enroll(), RequestStatus::SysOk);
        for _ in 0..self.touches {
            self.device.touch(finger).unwrap();
        }
        loop {
            match self.next_result() {
                CallbackEvent::EnrollResult {
                    print, remaining: 0, ..
                } => {
                    self.wait_idle();
                    return print;
                }
                CallbackEvent::EnrollResult { .. } => continue,
                other => panic!("enrollment of finger {finger} failed: {other:?}"),
            }
        }
    }
}

pub fn next_event(events: &mut UnboundedReceiver<CallbackEvent>) -> CallbackEvent {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    loop {
        match events.try_recv() {
            Ok(event) => return event,
            Err(TryRecvError::Empty) if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(e) => panic!("no callback event: {e:?}"),
        }
    }
}

pub fn wait_for_state(hal: &Hal, state: WorkerState) {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while hal.worker_state() != state {
        assert!(
            Instant::now() < deadline,
            "worker stuck in {} waiting for {state}",
            hal.worker_state()
        );
        thread::sleep(Duration::from_millis(5));
    }
}
