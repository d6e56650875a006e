//! Fingerprint HAL service.
//!
//! Ties the trustlet client, the background worker and the capture loops
//! together behind [`BiometricsFingerprint`].
//!
//! # Layout
//!
//! - [`applet`]: [`FpcClient`], one shared-memory exchange per trustlet
//!   command, key provisioning and database persistence.
//! - `capture`: the enroll and authenticate loops the worker runs.
//! - [`service`]: the facade the framework calls.
//! - [`callback`]: how results travel back to the framework.
//! - [`config`] and [`storage`]: configuration and storage path checks.
//!
//! # Example
//!
//! ```
//! use fpc_core::{GroupId, RequestStatus};
//! use fpc_hardware::mock::{EmulatorConfig, emulated_device};
//! use fpc_service::{BiometricsFingerprint, ChannelCallback, HalConfig};
//!
//! let (env, sensor, _device) = emulated_device(EmulatorConfig::default());
//! let hal = BiometricsFingerprint::open(env, sensor, HalConfig::default()).unwrap();
//!
//! let (callback, mut events) = ChannelCallback::new();
//! hal.set_notification_callback(callback).unwrap();
//!
//! let storage = std::env::temp_dir().join(format!("fpc-doc-{}", std::process::id()));
//! std::fs::create_dir_all(&storage).unwrap();
//! let status = hal.set_active_group(GroupId(0), storage.to_str().unwrap()).unwrap();
//! assert_eq!(status, RequestStatus::SysOk);
//!
//! assert_eq!(hal.enumerate().unwrap(), RequestStatus::SysOk);
//! assert!(events.try_recv().is_ok());
//! # std::fs::remove_dir_all(&storage).unwrap();
//! ```

pub mod applet;
pub mod callback;
mod capture;
pub mod config;
mod context;
pub mod service;
pub mod storage;

pub use applet::FpcClient;
pub use callback::{CallbackEvent, ChannelCallback, FingerprintCallback};
pub use config::{AppletConfig, HalConfig};
pub use service::BiometricsFingerprint;
