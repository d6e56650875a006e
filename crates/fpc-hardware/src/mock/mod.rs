//! Emulated hardware for testing and development.
//!
//! The real secure world and sensor only exist on the device. This module
//! provides stand-ins that implement [`SecureEnvironment`] and
//! [`SensorDevice`] closely enough to run the whole HAL against them.
//!
//! [`SecureEnvironment`]: crate::traits::SecureEnvironment
//! [`SensorDevice`]: crate::traits::SensorDevice

pub mod applet;
pub mod environment;
pub mod sensor;

pub use applet::{FingerprintApplet, KeymasterApplet, StoredDatabase, StoredPrint};
pub use environment::{EmulatorConfig, EmulatorHandle, MockSecureEnvironment, emulated_device};
pub use sensor::{MockSensor, MockSensorHandle, SensorBus, Touch};
