//! Hardware boundary of the fingerprint HAL.
//!
//! This crate defines what the HAL needs from the device below it and
//! nothing more:
//!
//! - [`SecureEnvironment`]: load trustlets and exchange commands with them
//!   through shared memory regions.
//! - [`SensorDevice`]: sensor power control and the finger interrupt.
//! - [`WakeSlot`]: the single-slot channel that carries a pending worker
//!   transition and wakes whoever is blocked.
//! - [`DeviceEventSource`]: one wait over the finger interrupt and the wake
//!   slot, used by the capture loop.
//!
//! # Waiting for a finger
//!
//! ```no_run
//! use fpc_hardware::{DeviceEventSource, EventKind, SensorDevice, Result};
//!
//! async fn next_touch<S: SensorDevice>(events: &mut DeviceEventSource<S, u8>) -> Result<bool> {
//!     match events.wait().await? {
//!         EventKind::Finger => Ok(true),
//!         // Someone asked the worker to move on.
//!         EventKind::Wake => Ok(false),
//!     }
//! }
//! ```
//!
//! # Emulation
//!
//! The [`mock`] module contains an emulated secure environment running an
//! emulated fingerprint trustlet and keymaster, and an emulated sensor
//! driven by a test handle. See [`mock::emulated_device`].

pub mod error;
pub mod event;
pub mod mock;
pub mod traits;
pub mod wake;

pub use error::{HardwareError, Result};
pub use event::{DeviceEventSource, EventKind};
pub use traits::{SecureEnvironment, SensorDevice, SharedRegion, TrustletHandle};
pub use wake::{WakeReceiver, WakeSlot};
