//! The fingerprint service facade.
//!
//! [`BiometricsFingerprint`] is what the framework talks to. Quick
//! administrative operations run on the caller's thread with the worker
//! parked in `Pause`; enroll and authenticate do their checks the same way
//! and then hand the sensor to the worker, whose capture loop reports
//! through the registered callback.
//!
//! Status-returning operations give `Ok(RequestStatus)` for every outcome
//! the framework is expected to handle, including `SysEbusy` while a capture
//! loop runs. `Err` is reserved for fatal conditions: the worker did not
//! acknowledge a transition, its thread is gone, or the trustlet could not
//! be restarted.

use std::sync::Arc;

use fpc_core::{
    DeviceId, Error, FingerprintError, GroupId, HwAuthToken, PrintId, RequestStatus, Result,
    constants::AUTH_TOKEN_LENGTH,
};
use fpc_hardware::{DeviceEventSource, SecureEnvironment, SensorDevice, WakeSlot};
use fpc_worker::{StateTransition, Worker, WorkerState};
use tracing::{debug, error, info, warn};

use crate::applet::FpcClient;
use crate::callback::FingerprintCallback;
use crate::capture::CaptureEngine;
use crate::config::HalConfig;
use crate::context::{ActiveGroup, DeviceContext};
use crate::storage::database_path;

/// One fingerprint device.
pub struct BiometricsFingerprint<E: SecureEnvironment + 'static> {
    ctx: Arc<DeviceContext<E>>,
    worker: Worker,
    config: HalConfig,
}

impl<E: SecureEnvironment + 'static> BiometricsFingerprint<E> {
    /// Initialize the trustlet and start the worker.
    ///
    /// # Errors
    ///
    /// Returns `Error::InitializationFailed` when the trustlet cannot be
    /// brought up and `Error::WorkerUnavailable` when the worker thread
    /// cannot be started. Both are fatal.
    pub fn open<S: SensorDevice + 'static>(env: E, mut sensor: S, config: HalConfig) -> Result<Self> {
        let mut client = FpcClient::new(env, config.applet.clone());
        client.init(&mut sensor)?;

        let device_id = DeviceId::generate();
        let ctx = Arc::new(DeviceContext::new(device_id, client));

        let slot = WakeSlot::new();
        let events = DeviceEventSource::new(sensor, slot.subscribe());
        let engine = CaptureEngine::new(Arc::clone(&ctx), events);
        let worker = match Worker::start(config.worker.clone(), slot, engine) {
            Ok(worker) => worker,
            Err(e) => {
                ctx.close();
                return Err(e);
            }
        };

        info!(device = %device_id, "fingerprint device opened");
        Ok(Self { ctx, worker, config })
    }

    pub fn device_id(&self) -> DeviceId {
        self.ctx.device_id
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Recent worker transitions, oldest first.
    pub fn worker_history(&self) -> Vec<StateTransition> {
        self.worker.history()
    }

    pub fn config(&self) -> &HalConfig {
        &self.config
    }

    /// Register the receiver of asynchronous results and return the device
    /// id passed to every callback.
    ///
    /// Waits for a running capture loop to finish with the previous
    /// callback.
    pub fn set_notification_callback(
        &self,
        callback: impl FingerprintCallback + 'static,
    ) -> Result<DeviceId> {
        self.ctx.check_poisoned()?;
        self.ctx.set_callback(Box::new(callback))?;
        debug!(device = %self.ctx.device_id, "notification callback registered");
        Ok(self.ctx.device_id)
    }

    /// Fetch a fresh enroll challenge from the trustlet.
    pub fn pre_enroll(&self) -> Result<u64> {
        self.ctx.check_poisoned()?;
        let challenge = self.ctx.with_client(|c| c.load_auth_challenge())?;
        self.ctx.set_enroll_challenge(challenge);
        info!(challenge, "enroll challenge issued");
        Ok(challenge)
    }

    /// Start an enrollment authorized by `token`.
    ///
    /// The token must answer the challenge from [`Self::pre_enroll`].
    /// A token the trustlet rejects leaves the worker idle and returns the
    /// trustlet's status mapped like every other applet call.
    pub fn enroll(
        &self,
        token: &[u8; AUTH_TOKEN_LENGTH],
        gid: GroupId,
        timeout_sec: u32,
    ) -> Result<RequestStatus> {
        self.ctx.check_poisoned()?;
        if !self.pause()? {
            return Ok(RequestStatus::SysEbusy);
        }

        if let Ok(hat) = HwAuthToken::from_bytes(token) {
            debug!(
                challenge = hat.challenge,
                user_id = hat.user_id,
                authenticator_id = hat.authenticator_id,
                authenticator_type = hat.authenticator_type,
                timestamp = hat.timestamp,
                gid = %gid,
                timeout_sec,
                "enroll requested"
            );
        }

        if let Err(e) = self.ctx.with_client(|c| c.authorize_enroll(token)) {
            warn!(error = %e, "enroll authorization rejected");
            self.worker.resume()?;
            return status_of(Err(e));
        }

        self.transition(WorkerState::Enroll)
    }

    /// Forget the enroll challenge.
    pub fn post_enroll(&self) -> Result<RequestStatus> {
        self.ctx.check_poisoned()?;
        info!("resetting enroll challenge");
        self.ctx.set_enroll_challenge(0);
        Ok(RequestStatus::SysOk)
    }

    /// Id of the active template database.
    pub fn get_authenticator_id(&self) -> Result<u64> {
        self.ctx.check_poisoned()?;
        let id = self.ctx.with_client(|c| c.authenticator_id())?;
        debug!(id, "authenticator id");
        Ok(id)
    }

    /// Return the worker to idle, ending a running capture loop.
    pub fn cancel(&self) -> Result<RequestStatus> {
        self.ctx.check_poisoned()?;
        info!("cancel requested");
        status_of(self.worker.resume())
    }

    /// Report every print of the active group through `on_enumerate`.
    ///
    /// An empty group still produces one call with print id 0 and nothing
    /// remaining.
    pub fn enumerate(&self) -> Result<RequestStatus> {
        self.ctx.check_poisoned()?;
        if !self.ctx.is_callback_registered() {
            error!("enumerate without a registered callback");
            return Ok(RequestStatus::SysEfault);
        }
        if !self.pause()? {
            return Ok(RequestStatus::SysEbusy);
        }

        let result = self.enumerate_paused();
        self.worker.resume()?;
        status_of(result)
    }

    fn enumerate_paused(&self) -> Result<()> {
        let prints = self.ctx.with_client(|c| c.fingerprint_ids())?;
        let gid = self.ctx.active_group()?.gid;
        let device = self.ctx.device_id;

        let guard = self.ctx.callback()?;
        let callback = guard.as_deref().ok_or(Error::CallbackNotRegistered)?;

        if prints.is_empty() {
            callback.on_enumerate(device, PrintId::NONE, gid, 0);
            return Ok(());
        }
        let count = prints.len();
        for (index, print) in prints.into_iter().enumerate() {
            debug!(print = %print, index, "enumerated print");
            callback.on_enumerate(device, print, gid, (count - index - 1) as u32);
        }
        Ok(())
    }

    /// Delete print `print` of group `gid`, or every print when `print` is
    /// [`PrintId::NONE`].
    ///
    /// Batch deletion runs from the last listed print to the first and
    /// stops at the first failure, which is reported once through
    /// `on_error(UnableToRemove)`. Prints already removed stay removed.
    pub fn remove(&self, gid: GroupId, print: PrintId) -> Result<RequestStatus> {
        self.ctx.check_poisoned()?;
        if !self.ctx.is_callback_registered() {
            error!("remove without a registered callback");
            return Ok(RequestStatus::SysEinval);
        }
        if !self.pause()? {
            return Ok(RequestStatus::SysEbusy);
        }

        let result = self.remove_paused(gid, print);
        self.worker.resume()?;
        status_of(result)
    }

    fn remove_paused(&self, gid: GroupId, print: PrintId) -> Result<()> {
        let device = self.ctx.device_id;
        let guard = self.ctx.callback()?;
        let callback = guard.as_deref().ok_or(Error::CallbackNotRegistered)?;

        let deleted = if print.is_none() {
            info!(gid = %gid, "deleting all prints");
            self.delete_all(gid, callback)
        } else {
            info!(gid = %gid, print = %print, "deleting print");
            self.ctx
                .with_client(|c| c.delete_fingerprint(print))
                .map(|()| callback.on_removed(device, print, gid, 0))
        };

        if let Err(e) = deleted {
            error!(error = %e, "print removal failed");
            callback.on_error(device, FingerprintError::UnableToRemove, 0);
            return Err(e);
        }
        self.ctx.store_database()
    }

    fn delete_all(&self, gid: GroupId, callback: &dyn FingerprintCallback) -> Result<()> {
        let device = self.ctx.device_id;
        let prints = self.ctx.with_client(|c| c.fingerprint_ids())?;

        for (remaining, print) in prints.iter().enumerate().rev() {
            debug!(print = %print, remaining, "deleting print");
            self.ctx.with_client(|c| c.delete_fingerprint(*print))?;
            callback.on_removed(device, *print, gid, remaining as u32);
        }
        Ok(())
    }

    /// Select group `gid` with its database under `storage_path`.
    ///
    /// The database is `<storage_path>/user.db`; an empty one is created
    /// when it does not exist yet. The path must name a writable directory.
    pub fn set_active_group(&self, gid: GroupId, storage_path: &str) -> Result<RequestStatus> {
        self.ctx.check_poisoned()?;
        let applet = &self.config.applet;
        let db_path = match database_path(
            storage_path,
            &applet.database_file_name,
            applet.max_path_length,
        ) {
            Ok(path) => path,
            Err(e) => {
                error!(error = %e, "rejected storage path");
                return status_of(Err(e));
            }
        };

        if !self.pause()? {
            return Ok(RequestStatus::SysEbusy);
        }

        info!(gid = %gid, path = %db_path.display(), "activating group");
        let result = self
            .ctx
            .set_active_group(ActiveGroup {
                gid,
                db_path: Some(db_path.clone()),
            })
            .and_then(|()| self.ctx.with_client(|c| c.activate_group(gid.0, &db_path)));
        self.worker.resume()?;
        status_of(result)
    }

    /// Start matching fingers. `operation_id` is bound into the token of a
    /// successful match; with `0` the token is all zeros.
    pub fn authenticate(&self, operation_id: u64, gid: GroupId) -> Result<RequestStatus> {
        self.ctx.check_poisoned()?;
        info!(operation_id, gid = %gid, "authenticate requested");
        if !self.pause()? {
            return Ok(RequestStatus::SysEbusy);
        }

        let result = self.ctx.with_client(|c| c.set_auth_challenge(operation_id));
        self.ctx.set_auth_challenge(operation_id);
        if let Err(e) = result {
            error!(operation_id, error = %e, "could not set auth challenge");
            self.worker.resume()?;
            if e.is_fatal() {
                return Err(e);
            }
            return Ok(RequestStatus::SysEagain);
        }

        self.transition(WorkerState::Authenticate)
    }

    /// Park the worker. `Ok(false)` when a capture loop refuses.
    fn pause(&self) -> Result<bool> {
        match self.worker.pause() {
            Ok(()) => Ok(true),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "worker busy");
                Ok(false)
            }
        }
    }

    fn transition(&self, state: WorkerState) -> Result<RequestStatus> {
        status_of(self.worker.wait_for_transition(state))
    }
}

impl<E: SecureEnvironment + 'static> Drop for BiometricsFingerprint<E> {
    fn drop(&mut self) {
        if let Err(e) = self.worker.stop() {
            error!(error = %e, "worker did not stop");
        }
        self.ctx.close();
        debug!(device = %self.ctx.device_id, "fingerprint device closed");
    }
}

/// Map an outcome to the status reported to the framework. Fatal errors
/// stay errors.
fn status_of(result: Result<()>) -> Result<RequestStatus> {
    match result {
        Ok(()) => Ok(RequestStatus::SysOk),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            let status = RequestStatus::from_code(e.errno());
            if status == RequestStatus::SysUnknown {
                warn!(error = %e, code = e.errno(), "unmapped error code");
            }
            Ok(status)
        }
    }
}
