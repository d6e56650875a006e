//! Enroll and authenticate capture loops.
//!
//! Both loops run on the worker thread and follow the same outline:
//!
//! 1. Take the callback lock for the whole run and power the sensor on.
//! 2. Capture images until one of them fails. Each capture waits for the
//!    finger to leave, arms the detector and waits on the event source,
//!    where a pending worker transition interrupts it.
//! 3. A pending transition at any check point reports `Canceled` and ends
//!    the loop.
//! 4. Quality codes are forwarded through `on_acquired`; a good image is
//!    fed to the enrollment or matched against the templates.
//! 5. The sensor is powered off on every exit. A failed capture reports
//!    `HwUnavailable`.
//!
//! Every run ends with exactly one terminal callback: an enroll result with
//! no touches remaining, a matching authentication, or an error.

#![allow(clippy::await_holding_lock)]

use std::sync::Arc;
use std::time::Duration;

use fpc_core::{
    DeviceId, Error, FingerprintAcquiredInfo, FingerprintError, GroupId, PrintId, Result,
    constants::{
        AUTH_TOKEN_LENGTH, CAPTURE_FINGER_STILL_DOWN, CAPTURE_INTERRUPTED,
        FINGER_LOST_POLL_INTERVAL_MS,
    },
    error::errno,
};
use fpc_hardware::{DeviceEventSource, EventKind, SecureEnvironment, SensorDevice};
use fpc_worker::{WorkHandler, WorkerState};
use tracing::{debug, error, info, warn};

use crate::callback::FingerprintCallback;
use crate::context::DeviceContext;

/// What a processed good image means for the running loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Done,
    /// The trustlet connection had to be restarted.
    Failed,
}

/// The worker's handler: owns the sensor and runs the capture loops.
pub struct CaptureEngine<E, S> {
    ctx: Arc<DeviceContext<E>>,
    events: DeviceEventSource<S, WorkerState>,
}

impl<E, S> CaptureEngine<E, S>
where
    E: SecureEnvironment + 'static,
    S: SensorDevice + 'static,
{
    pub(crate) fn new(ctx: Arc<DeviceContext<E>>, events: DeviceEventSource<S, WorkerState>) -> Self {
        Self { ctx, events }
    }

    /// Capture one image and return its status, or one of the
    /// [`CAPTURE_FINGER_STILL_DOWN`] / [`CAPTURE_INTERRUPTED`] markers.
    /// Failures come back negative.
    ///
    /// A resting finger is polled every [`FINGER_LOST_POLL_INTERVAL_MS`].
    /// When the detector cannot be armed nothing is captured and the
    /// interrupted marker is returned after the same pause.
    async fn capture_image(&mut self) -> i32 {
        match self.try_capture().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "image capture failed");
                e.errno().min(-1)
            }
        }
    }

    async fn try_capture(&mut self) -> Result<i32> {
        if self.ctx.with_client(|c| c.wait_finger_lost())? == 0 {
            tokio::time::sleep(Duration::from_millis(FINGER_LOST_POLL_INTERVAL_MS)).await;
            return Ok(CAPTURE_FINGER_STILL_DOWN);
        }

        let armed = self.ctx.with_client(|c| c.arm_finger_down())?;
        if armed != 0 {
            debug!(status = armed, "finger detector not armed");
            tokio::time::sleep(Duration::from_millis(FINGER_LOST_POLL_INTERVAL_MS)).await;
            return Ok(CAPTURE_INTERRUPTED);
        }
        match self.events.wait().await? {
            EventKind::Wake => return Ok(CAPTURE_INTERRUPTED),
            EventKind::Finger => debug!("finger down, capturing image"),
        }

        self.ctx.with_client(|c| c.capture_image())
    }

    fn power(&mut self, on: bool) -> Result<()> {
        self.events.sensor_mut().set_power(on).map_err(Error::from)
    }

    fn power_off(&mut self) {
        if let Err(e) = self.power(false) {
            error!(error = %e, "could not power sensor off");
        }
    }

    /// Shared loop skeleton. `on_good` handles an image with status
    /// `Good`.
    async fn capture_loop(
        &mut self,
        operation: &str,
        callback: &dyn FingerprintCallback,
        mut on_good: impl FnMut(&mut Self, &dyn FingerprintCallback) -> Step,
    ) {
        let device = self.ctx.device_id;
        let mut status = 0;

        loop {
            if self.events.is_wake_pending() {
                info!(operation, "capture loop canceled");
                callback.on_error(device, FingerprintError::Canceled, 0);
                break;
            }

            status = self.capture_image().await;
            debug!(operation, status, "capture");
            if status < 0 {
                break;
            }

            if self.events.is_wake_pending() {
                info!(operation, "capture loop canceled");
                callback.on_error(device, FingerprintError::Canceled, 0);
                break;
            }

            if let Some(info) = FingerprintAcquiredInfo::from_capture_status(status) {
                callback.on_acquired(device, info, 0);
            }
            if status != FingerprintAcquiredInfo::Good.code() {
                continue;
            }

            match on_good(self, callback) {
                Step::Continue => {}
                Step::Done => break,
                Step::Failed => {
                    status = -1;
                    break;
                }
            }
        }

        self.power_off();
        if status < 0 {
            callback.on_error(device, FingerprintError::HwUnavailable, 0);
        }
    }

    async fn enroll(&mut self) {
        let ctx = Arc::clone(&self.ctx);
        let Ok(guard) = ctx.callback() else {
            error!("callback lock poisoned, enroll skipped");
            return;
        };
        let Some(callback) = guard.as_deref() else {
            error!("enroll started without a registered callback");
            return;
        };
        let device = ctx.device_id;

        if let Err(e) = self.power(true) {
            error!(error = %e, "could not power sensor on");
            callback.on_error(device, FingerprintError::UnableToProcess, 0);
            return;
        }

        if let Err(e) = ctx.with_client(|c| c.begin_enroll()) {
            error!(error = %e, "could not start enrollment");
            self.power_off();
            callback.on_error(device, FingerprintError::UnableToProcess, 0);
            return;
        }

        let gid = match ctx.active_group() {
            Ok(group) => group.gid,
            Err(e) => {
                error!(error = %e, "active group unavailable");
                self.power_off();
                callback.on_error(device, FingerprintError::UnableToProcess, 0);
                return;
            }
        };

        self.capture_loop("enroll", callback, |engine, callback| {
            engine.enroll_step(device, gid, callback)
        })
        .await;
    }

    fn enroll_step(&mut self, device: DeviceId, gid: GroupId, callback: &dyn FingerprintCallback) -> Step {
        let remaining = match self.ctx.with_client(|c| c.enroll_step()) {
            Ok(remaining) => remaining,
            Err(e) => {
                error!(error = %e, "enroll step failed, aborting enrollment");
                callback.on_error(device, FingerprintError::UnableToProcess, 0);
                return Step::Done;
            }
        };

        if remaining > 0 {
            debug!(remaining, "enroll step accepted");
            callback.on_enroll_result(device, PrintId::NONE, gid, remaining);
            return Step::Continue;
        }

        let print = match self.ctx.with_client(|c| c.end_enroll()) {
            Ok(print) => print,
            Err(e) => {
                error!(error = %e, "could not finish enrollment");
                callback.on_error(device, FingerprintError::UnableToProcess, 0);
                return Step::Done;
            }
        };

        if let Err(e) = self.ctx.store_database() {
            error!(error = %e, "enrolled print not persisted");
        }
        info!(print = %print, gid = %gid, "enrollment complete");
        callback.on_enroll_result(device, print, gid, 0);
        Step::Done
    }

    async fn authenticate(&mut self) {
        let ctx = Arc::clone(&self.ctx);
        let Ok(guard) = ctx.callback() else {
            error!("callback lock poisoned, authenticate skipped");
            return;
        };
        let Some(callback) = guard.as_deref() else {
            error!("authenticate started without a registered callback");
            return;
        };
        let device = ctx.device_id;

        if let Err(e) = self.power(true) {
            error!(error = %e, "could not power sensor on");
            callback.on_error(device, FingerprintError::UnableToProcess, 0);
            return;
        }

        self.capture_loop("authenticate", callback, |engine, callback| {
            engine.identify_step(device, callback)
        })
        .await;
    }

    fn identify_step(&mut self, device: DeviceId, callback: &dyn FingerprintCallback) -> Step {
        let gid = self
            .ctx
            .active_group()
            .map(|group| group.gid)
            .unwrap_or_default();

        match self.ctx.with_client(|c| c.identify()) {
            Ok(print) => {
                match self.ctx.with_client(|c| c.update_template()) {
                    Ok(true) => {
                        debug!("template updated, storing database");
                        if let Err(e) = self.ctx.store_database() {
                            error!(error = %e, "updated template not persisted");
                        }
                    }
                    Ok(false) => {}
                    Err(e) => error!(error = %e, "template update failed"),
                }

                if print.is_none() {
                    debug!("finger not recognized");
                    callback.on_authenticated(device, PrintId::NONE, gid, &[]);
                    return Step::Continue;
                }

                let token = self.auth_token();
                info!(print = %print, gid = %gid, "finger recognized");
                callback.on_authenticated(device, print, gid, &token);
                Step::Done
            }
            Err(e) if e.errno() == -errno::EAGAIN => {
                debug!("identify asked for another capture");
                callback.on_authenticated(device, PrintId::NONE, gid, &[]);
                Step::Continue
            }
            Err(e) => {
                error!(error = %e, "identify failed, re-initializing trustlet");
                let sensor = self.events.sensor_mut();
                if let Err(e) = self.ctx.reinitialize(sensor) {
                    error!(error = %e, "re-initialization failed");
                }
                Step::Failed
            }
        }
    }

    /// Token for a match. All zeros unless an auth challenge was set.
    fn auth_token(&self) -> [u8; AUTH_TOKEN_LENGTH] {
        if self.ctx.auth_challenge() == 0 {
            debug!("no auth challenge set, reporting empty token");
            return [0; AUTH_TOKEN_LENGTH];
        }
        match self.ctx.with_client(|c| c.hw_auth_token()) {
            Ok(token) => {
                debug!(
                    challenge = token.challenge,
                    user_id = token.user_id,
                    authenticator_id = token.authenticator_id,
                    "auth token issued"
                );
                token.to_bytes()
            }
            Err(e) => {
                error!(error = %e, "could not fetch auth token");
                [0; AUTH_TOKEN_LENGTH]
            }
        }
    }
}

impl<E, S> WorkHandler for CaptureEngine<E, S>
where
    E: SecureEnvironment + 'static,
    S: SensorDevice + 'static,
{
    async fn run_enroll(&mut self) {
        self.enroll().await;
    }

    async fn run_authenticate(&mut self) {
        self.authenticate().await;
    }
}
