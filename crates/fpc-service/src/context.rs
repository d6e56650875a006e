//! State shared between the service facade and the capture engine.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use fpc_core::{DeviceId, Error, GroupId, Result};
use fpc_hardware::{SecureEnvironment, SensorDevice};
use tracing::{error, warn};

use crate::applet::FpcClient;
use crate::callback::FingerprintCallback;

pub(crate) type CallbackSlot = Option<Box<dyn FingerprintCallback>>;

/// Group selected by the last successful `set_active_group`.
#[derive(Debug, Clone, Default)]
pub(crate) struct ActiveGroup {
    pub gid: GroupId,
    pub db_path: Option<PathBuf>,
}

pub(crate) struct DeviceContext<E> {
    pub device_id: DeviceId,
    client: Mutex<FpcClient<E>>,
    callback: Mutex<CallbackSlot>,
    // Lets callers check for a callback without waiting on a capture loop
    // that holds the callback lock.
    callback_registered: AtomicBool,
    group: Mutex<ActiveGroup>,
    enroll_challenge: AtomicU64,
    auth_challenge: AtomicU64,
    poison: Mutex<Option<String>>,
}

impl<E: SecureEnvironment> DeviceContext<E> {
    pub fn new(device_id: DeviceId, client: FpcClient<E>) -> Self {
        Self {
            device_id,
            client: Mutex::new(client),
            callback: Mutex::new(None),
            callback_registered: AtomicBool::new(false),
            group: Mutex::new(ActiveGroup::default()),
            enroll_challenge: AtomicU64::new(0),
            auth_challenge: AtomicU64::new(0),
            poison: Mutex::new(None),
        }
    }

    /// Run `f` with the client locked for its duration.
    pub fn with_client<T>(&self, f: impl FnOnce(&mut FpcClient<E>) -> Result<T>) -> Result<T> {
        let mut client = self
            .client
            .lock()
            .map_err(|_| Error::Poisoned("applet client lock".into()))?;
        f(&mut client)
    }

    pub fn callback(&self) -> Result<MutexGuard<'_, CallbackSlot>> {
        self.callback
            .lock()
            .map_err(|_| Error::Poisoned("callback lock".into()))
    }

    pub fn set_callback(&self, callback: Box<dyn FingerprintCallback>) -> Result<()> {
        *self.callback()? = Some(callback);
        self.callback_registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_callback_registered(&self) -> bool {
        self.callback_registered.load(Ordering::SeqCst)
    }

    pub fn active_group(&self) -> Result<ActiveGroup> {
        self.group
            .lock()
            .map(|group| group.clone())
            .map_err(|_| Error::Poisoned("active group lock".into()))
    }

    pub fn set_active_group(&self, group: ActiveGroup) -> Result<()> {
        *self
            .group
            .lock()
            .map_err(|_| Error::Poisoned("active group lock".into()))? = group;
        Ok(())
    }

    pub fn set_enroll_challenge(&self, challenge: u64) {
        self.enroll_challenge.store(challenge, Ordering::SeqCst);
    }

    pub fn auth_challenge(&self) -> u64 {
        self.auth_challenge.load(Ordering::SeqCst)
    }

    pub fn set_auth_challenge(&self, challenge: u64) {
        self.auth_challenge.store(challenge, Ordering::SeqCst);
    }

    /// Fail with the recorded fatal error once the device is poisoned.
    pub fn check_poisoned(&self) -> Result<()> {
        let poison = self
            .poison
            .lock()
            .map_err(|_| Error::Poisoned("poison lock".into()))?;
        match poison.as_ref() {
            Some(reason) => Err(Error::Poisoned(reason.clone())),
            None => Ok(()),
        }
    }

    fn poison(&self, reason: String) {
        error!(reason = %reason, "fingerprint device poisoned");
        if let Ok(mut poison) = self.poison.lock() {
            poison.get_or_insert(reason);
        }
    }

    /// Store the template database of the active group.
    pub fn store_database(&self) -> Result<()> {
        let group = self.active_group()?;
        let Some(db_path) = group.db_path else {
            return Err(Error::InvalidStoragePath("no active group".into()));
        };
        self.with_client(|client| client.store_database(&db_path))
    }

    /// Restart the trustlet connection and reload the active group.
    ///
    /// A failed restart poisons the device. A failed reload is only logged.
    pub fn reinitialize<S: SensorDevice>(&self, sensor: &mut S) -> Result<()> {
        if let Err(e) = self.with_client(|client| client.reinit(sensor)) {
            self.poison(e.to_string());
            return Err(e);
        }

        let group = self.active_group()?;
        if let Some(db_path) = group.db_path {
            if let Err(e) =
                self.with_client(|client| client.activate_group(group.gid.0, &db_path))
            {
                warn!(gid = %group.gid, error = %e, "could not reload group after re-initialization");
            }
        }
        Ok(())
    }

    /// Shut the trustlet down.
    pub fn close(&self) {
        match self.client.lock() {
            Ok(mut client) => client.close(),
            Err(_) => warn!("applet client lock poisoned, trustlet left open"),
        }
    }
}
