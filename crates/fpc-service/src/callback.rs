//! Notifications delivered to the fingerprint framework.

use fpc_core::{DeviceId, FingerprintAcquiredInfo, FingerprintError, GroupId, PrintId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Receiver of asynchronous results.
///
/// Called from the worker thread while a capture loop runs, and from the
/// caller's thread for enumerate and remove.
pub trait FingerprintCallback: Send {
    fn on_enroll_result(&self, device: DeviceId, print: PrintId, gid: GroupId, remaining: u32);

    fn on_acquired(&self, device: DeviceId, info: FingerprintAcquiredInfo, vendor_code: i32);

    /// `token` is empty for a non-matching finger and a full 69-byte
    /// hardware auth token for a match.
    fn on_authenticated(&self, device: DeviceId, print: PrintId, gid: GroupId, token: &[u8]);

    fn on_error(&self, device: DeviceId, error: FingerprintError, vendor_code: i32);

    fn on_removed(&self, device: DeviceId, print: PrintId, gid: GroupId, remaining: u32);

    fn on_enumerate(&self, device: DeviceId, print: PrintId, gid: GroupId, remaining: u32);
}

/// One callback invocation as a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CallbackEvent {
    EnrollResult {
        device: DeviceId,
        print: PrintId,
        gid: GroupId,
        remaining: u32,
    },
    Acquired {
        device: DeviceId,
        info: FingerprintAcquiredInfo,
        vendor_code: i32,
    },
    Authenticated {
        device: DeviceId,
        print: PrintId,
        gid: GroupId,
        token: Vec<u8>,
    },
    Error {
        device: DeviceId,
        error: FingerprintError,
        vendor_code: i32,
    },
    Removed {
        device: DeviceId,
        print: PrintId,
        gid: GroupId,
        remaining: u32,
    },
    Enumerate {
        device: DeviceId,
        print: PrintId,
        gid: GroupId,
        remaining: u32,
    },
}

/// Callback that forwards every invocation into an unbounded channel.
///
/// # Examples
///
/// ```
/// use fpc_core::{DeviceId, FingerprintError};
/// use fpc_service::{CallbackEvent, ChannelCallback, FingerprintCallback};
///
/// let (callback, mut events) = ChannelCallback::new();
/// callback.on_error(DeviceId::from_raw(1), FingerprintError::Canceled, 0);
///
/// assert!(matches!(
///     events.try_recv(),
///     Ok(CallbackEvent::Error { error: FingerprintError::Canceled, .. })
/// ));
/// ```
#[derive(Debug, Clone)]
pub struct ChannelCallback {
    tx: mpsc::UnboundedSender<CallbackEvent>,
}

impl ChannelCallback {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CallbackEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: CallbackEvent) {
        if self.tx.send(event).is_err() {
            debug!("callback receiver dropped, event discarded");
        }
    }
}

impl FingerprintCallback for ChannelCallback {
    fn on_enroll_result(&self, device: DeviceId, print: PrintId, gid: GroupId, remaining: u32) {
        self.emit(CallbackEvent::EnrollResult {
            device,
            print,
            gid,
            remaining,
        });
    }

    fn on_acquired(&self, device: DeviceId, info: FingerprintAcquiredInfo, vendor_code: i32) {
        self.emit(CallbackEvent::Acquired {
            device,
            info,
            vendor_code,
        });
    }

    fn on_authenticated(&self, device: DeviceId, print: PrintId, gid: GroupId, token: &[u8]) {
        self.emit(CallbackEvent::Authenticated {
            device,
            print,
            gid,
            token: token.to_vec(),
        });
    }

    fn on_error(&self, device: DeviceId, error: FingerprintError, vendor_code: i32) {
        self.emit(CallbackEvent::Error {
            device,
            error,
            vendor_code,
        });
    }

    fn on_removed(&self, device: DeviceId, print: PrintId, gid: GroupId, remaining: u32) {
        self.emit(CallbackEvent::Removed {
            device,
            print,
            gid,
            remaining,
        });
    }

    fn on_enumerate(&self, device: DeviceId, print: PrintId, gid: GroupId, remaining: u32) {
        self.emit(CallbackEvent::Enumerate {
            device,
            print,
            gid,
            remaining,
        });
    }
}
