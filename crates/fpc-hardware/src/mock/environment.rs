//! Emulated secure environment.
//!
//! Hosts the emulated fingerprint and keymaster trustlets, hands out shared
//! regions and keeps track of the ones that were never freed so tests can
//! assert on leaks.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use fpc_core::HwAuthToken;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::applet::{
    DEFAULT_ENROLL_TOUCHES, FingerprintApplet, KeymasterApplet, sign_token,
};
use super::sensor::{MockSensor, MockSensorHandle, SensorBus, Touch};
use crate::{
    Result,
    error::HardwareError,
    traits::{SecureEnvironment, SharedRegion, TrustletHandle},
};

/// Name under which the emulated fingerprint trustlet is loadable.
pub const FINGERPRINT_TRUSTLET: &str = "tzfingerprint";

/// Names under which the emulated keymaster trustlet is loadable.
pub const KEYMASTER_TRUSTLETS: [&str; 2] = ["keymaste", "keymaster"];

/// Behaviour of the emulated device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Good touches needed to complete an enrollment.
    pub enroll_touches: u32,
    /// Trustlet names that fail to load.
    pub missing_trustlets: Vec<String>,
    /// Key blob held by keymaster. A random key is generated when empty.
    pub keymaster_key: Vec<u8>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            enroll_touches: DEFAULT_ENROLL_TOUCHES,
            missing_trustlets: Vec::new(),
            keymaster_key: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrustletKind {
    Fingerprint,
    Keymaster,
}

#[derive(Debug)]
struct EnvState {
    fingerprint: FingerprintApplet,
    keymaster: KeymasterApplet,
    missing: HashSet<String>,
    loaded: HashMap<u64, (String, TrustletKind)>,
    regions: HashSet<u64>,
    next_id: u64,
    transport_failure: bool,
    commands_sent: u64,
}

impl EnvState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn kind_of(&self, trustlet: &TrustletHandle) -> Result<TrustletKind> {
        self.loaded
            .get(&trustlet.id())
            .map(|(_, kind)| *kind)
            .ok_or_else(|| HardwareError::trustlet_not_loaded(trustlet.name()))
    }
}

#[derive(Debug, Clone)]
struct SharedState(Arc<Mutex<EnvState>>);

impl SharedState {
    fn lock(&self) -> Result<MutexGuard<'_, EnvState>> {
        self.0
            .lock()
            .map_err(|_| HardwareError::other("emulator state lock poisoned"))
    }
}

/// Emulated secure world.
#[derive(Debug)]
pub struct MockSecureEnvironment {
    state: SharedState,
    bus: SensorBus,
}

/// Create an emulated secure environment and sensor sharing one bus, plus
/// the handle that drives and inspects both.
///
/// # Examples
///
/// ```
/// use fpc_hardware::mock::{EmulatorConfig, emulated_device};
/// use fpc_hardware::traits::SecureEnvironment;
///
/// let (mut env, _sensor, handle) = emulated_device(EmulatorConfig::default());
/// let trustlet = env.load_trustlet("/vendor/firmware/", "tzfingerprint", 128).unwrap();
/// assert_eq!(handle.loaded_trustlets(), vec!["tzfingerprint".to_string()]);
/// env.shutdown_trustlet(trustlet).unwrap();
/// ```
pub fn emulated_device(config: EmulatorConfig) -> (MockSecureEnvironment, MockSensor, EmulatorHandle) {
    let bus = SensorBus::default();
    let (sensor, sensor_handle) = MockSensor::with_bus(bus.clone());

    let key = if config.keymaster_key.is_empty() {
        uuid::Uuid::new_v4()
            .as_bytes()
            .iter()
            .chain(uuid::Uuid::new_v4().as_bytes())
            .copied()
            .collect()
    } else {
        config.keymaster_key.clone()
    };

    let state = SharedState(Arc::new(Mutex::new(EnvState {
        fingerprint: FingerprintApplet::new(config.enroll_touches),
        keymaster: KeymasterApplet::new(key),
        missing: config.missing_trustlets.iter().cloned().collect(),
        loaded: HashMap::new(),
        regions: HashSet::new(),
        next_id: 0,
        transport_failure: false,
        commands_sent: 0,
    })));

    let env = MockSecureEnvironment {
        state: state.clone(),
        bus,
    };
    let handle = EmulatorHandle {
        state,
        sensor: sensor_handle,
    };
    (env, sensor, handle)
}

impl SecureEnvironment for MockSecureEnvironment {
    fn load_trustlet(
        &mut self,
        path: &str,
        name: &str,
        shared_len: usize,
    ) -> Result<TrustletHandle> {
        let mut state = self.state.lock()?;
        let kind = match name {
            FINGERPRINT_TRUSTLET => TrustletKind::Fingerprint,
            n if KEYMASTER_TRUSTLETS.contains(&n) => TrustletKind::Keymaster,
            _ => return Err(HardwareError::trustlet_not_found(path, name)),
        };
        if state.missing.contains(name) {
            return Err(HardwareError::trustlet_not_found(path, name));
        }

        let id = state.next_id();
        state.loaded.insert(id, (name.to_string(), kind));
        info!(trustlet = name, path, id, "trustlet loaded");
        Ok(TrustletHandle::new(id, name, shared_len))
    }

    fn shutdown_trustlet(&mut self, trustlet: TrustletHandle) -> Result<()> {
        let mut state = self.state.lock()?;
        let (name, kind) = state
            .loaded
            .remove(&trustlet.id())
            .ok_or_else(|| HardwareError::trustlet_not_loaded(trustlet.name()))?;
        if kind == TrustletKind::Fingerprint {
            state.fingerprint.reset();
        }
        info!(trustlet = %name, "trustlet shut down");
        Ok(())
    }

    fn alloc_shared(&mut self, len: usize) -> Result<SharedRegion> {
        if len == 0 {
            return Err(HardwareError::allocation_failed(len));
        }
        let mut state = self.state.lock()?;
        let id = state.next_id();
        state.regions.insert(id);
        Ok(SharedRegion::new(id, len))
    }

    fn free_shared(&mut self, region: SharedRegion) -> Result<()> {
        let mut state = self.state.lock()?;
        if !state.regions.remove(&region.id()) {
            warn!(region = region.id(), "freeing unknown shared region");
            return Err(HardwareError::invalid_data(format!(
                "shared region {} is not allocated",
                region.id()
            )));
        }
        Ok(())
    }

    fn send_modified_command(
        &mut self,
        trustlet: &TrustletHandle,
        region: &mut SharedRegion,
    ) -> Result<i32> {
        let mut state = self.state.lock()?;
        if state.transport_failure {
            return Err(HardwareError::communication("secure monitor call failed"));
        }
        if state.kind_of(trustlet)? != TrustletKind::Fingerprint {
            return Err(HardwareError::invalid_data(format!(
                "{trustlet} does not accept shared region commands"
            )));
        }
        if !state.regions.contains(&region.id()) {
            return Err(HardwareError::invalid_data(format!(
                "shared region {} is not allocated",
                region.id()
            )));
        }
        state.commands_sent += 1;

        let mut bus = self.bus.lock()?;
        let response = state.fingerprint.handle(&mut bus, region.as_mut_slice());
        debug!(trustlet = %trustlet, response, "modified command");
        Ok(response)
    }

    fn send_command(
        &mut self,
        trustlet: &TrustletHandle,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<()> {
        let mut state = self.state.lock()?;
        if state.transport_failure {
            return Err(HardwareError::communication("secure monitor call failed"));
        }
        if state.kind_of(trustlet)? != TrustletKind::Keymaster {
            return Err(HardwareError::invalid_data(format!(
                "{trustlet} does not accept plain commands"
            )));
        }
        state.commands_sent += 1;
        state.keymaster.handle(request, response)
    }
}

/// Handle for driving and inspecting an emulated device.
///
/// Sensor control is forwarded to the [`MockSensorHandle`]; everything else
/// reaches into the emulated trustlets.
#[derive(Debug, Clone)]
pub struct EmulatorHandle {
    state: SharedState,
    sensor: MockSensorHandle,
}

impl EmulatorHandle {
    fn with_state<R>(&self, f: impl FnOnce(&mut EnvState) -> R) -> Option<R> {
        self.state.lock().ok().map(|mut state| f(&mut state))
    }

    /// Place `finger` on the sensor with a good image.
    pub fn touch(&self, finger: u32) -> Result<()> {
        self.sensor.touch(finger)
    }

    pub fn touch_with(&self, touch: Touch) -> Result<()> {
        self.sensor.touch_with(touch)
    }

    pub fn hold_finger(&self, held: bool) {
        self.sensor.hold_finger(held);
    }

    pub fn set_power_failure(&self, failing: bool) {
        self.sensor.set_power_failure(failing);
    }

    pub fn is_powered(&self) -> bool {
        self.sensor.is_powered()
    }

    pub fn power_cycles(&self) -> u32 {
        self.sensor.power_cycles()
    }

    /// Shared regions allocated and not yet freed.
    pub fn outstanding_regions(&self) -> usize {
        self.with_state(|s| s.regions.len()).unwrap_or(0)
    }

    /// Names of the currently loaded trustlets, in load order.
    pub fn loaded_trustlets(&self) -> Vec<String> {
        self.with_state(|s| {
            let mut loaded: Vec<_> = s.loaded.iter().collect();
            loaded.sort_by_key(|(id, _)| **id);
            loaded.into_iter().map(|(_, (name, _))| name.clone()).collect()
        })
        .unwrap_or_default()
    }

    /// Commands delivered to any trustlet so far.
    pub fn commands_sent(&self) -> u64 {
        self.with_state(|s| s.commands_sent).unwrap_or(0)
    }

    /// Print ids enrolled in `gid`, in trustlet order.
    pub fn enrolled_prints(&self, gid: u32) -> Vec<u32> {
        self.with_state(|s| s.fingerprint.prints_in(gid))
            .unwrap_or_default()
    }

    /// Whether the fingerprint trustlet received the keymaster key.
    pub fn key_provisioned(&self) -> bool {
        self.with_state(|s| s.fingerprint.key() == Some(s.keymaster.key()))
            .unwrap_or(false)
    }

    /// Mint an enroll authorization token for `challenge`, signed with the
    /// key shared between keymaster and the fingerprint trustlet.
    pub fn mint_auth_token(&self, challenge: u64, user_id: u64) -> HwAuthToken {
        let mut token = HwAuthToken::empty();
        token.challenge = challenge;
        token.user_id = user_id;
        token.authenticator_type = 1;
        if let Some(key) = self.with_state(|s| s.keymaster.key().to_vec()) {
            sign_token(&key, &mut token);
        }
        token
    }

    /// Make the next `count` deletions succeed and every later one fail.
    pub fn fail_deletes_after(&self, count: u32) {
        self.with_state(|s| s.fingerprint.faults.deletes_before_failure = Some(count));
    }

    /// Make the next identify report `status`.
    pub fn inject_identify_error(&self, status: i32) {
        self.with_state(|s| s.fingerprint.faults.identify_error = Some(status));
    }

    /// Make arming the finger detector report `status` until cleared.
    pub fn fail_finger_arming(&self, status: Option<i32>) {
        self.with_state(|s| s.fingerprint.faults.arm_status = status);
    }

    /// Interrupt the next database store half way.
    pub fn fail_next_store(&self) {
        self.with_state(|s| s.fingerprint.faults.fail_next_store = true);
    }

    /// Report `length` in print listings instead of the real count.
    pub fn report_listing_length(&self, length: Option<u32>) {
        self.with_state(|s| s.fingerprint.faults.listing_length = length);
    }

    /// Fail every secure world call until cleared.
    pub fn set_transport_failure(&self, failing: bool) {
        self.with_state(|s| s.transport_failure = failing);
    }

    /// Make trustlet `name` fail to load.
    pub fn set_trustlet_missing(&self, name: &str, missing: bool) {
        self.with_state(|s| {
            if missing {
                s.missing.insert(name.to_string());
            } else {
                s.missing.remove(name);
            }
        });
    }

    pub fn sensor(&self) -> &MockSensorHandle {
        &self.sensor
    }
}
