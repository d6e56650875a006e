//! Emulated fingerprint sensor.
//!
//! The sensor is driven by a [`MockSensorHandle`]: every [`Touch`] queued on
//! the handle raises one finger interrupt. The touch is then left on the
//! [`SensorBus`] where the emulated trustlet picks it up when asked to
//! capture an image, the same way the real trustlet reads the sensor over
//! SPI after the kernel driver reported the interrupt.

use crate::{
    Result,
    error::HardwareError,
    traits::SensorDevice,
};
use fpc_core::FingerprintAcquiredInfo;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

/// One finger placed on the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Touch {
    /// Which physical finger touched the sensor. The emulated trustlet
    /// matches prints by this value.
    pub finger: u32,
    /// Capture status the trustlet reports for the image.
    pub status: i32,
}

impl Touch {
    /// A clean touch that yields a good image.
    pub fn good(finger: u32) -> Self {
        Self { finger, status: 0 }
    }

    /// A touch whose image has the given quality problem.
    pub fn with_quality(finger: u32, quality: FingerprintAcquiredInfo) -> Self {
        Self {
            finger,
            status: quality.code(),
        }
    }
}

/// State shared between the sensor, its handle and the emulated trustlet.
#[derive(Debug, Default)]
pub struct BusState {
    pub powered: bool,
    pub finger_held: bool,
    pub last_touch: Option<Touch>,
    pub power_failure: bool,
    pub power_cycles: u32,
}

/// Shared handle on the sensor bus.
#[derive(Debug, Clone, Default)]
pub struct SensorBus(Arc<Mutex<BusState>>);

impl SensorBus {
    pub fn lock(&self) -> Result<MutexGuard<'_, BusState>> {
        self.0
            .lock()
            .map_err(|_| HardwareError::other("sensor bus lock poisoned"))
    }
}

/// Emulated sensor device node.
///
/// # Examples
///
/// ```
/// use fpc_hardware::mock::MockSensor;
/// use fpc_hardware::traits::SensorDevice;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> fpc_hardware::Result<()> {
///     let (mut sensor, handle) = MockSensor::new();
///
///     sensor.set_power(true)?;
///     handle.touch(2)?;
///     sensor.wait_for_finger().await?;
///
///     assert!(handle.is_powered());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockSensor {
    touch_rx: mpsc::UnboundedReceiver<Touch>,
    bus: SensorBus,
}

impl MockSensor {
    /// Create a sensor on its own bus.
    pub fn new() -> (Self, MockSensorHandle) {
        Self::with_bus(SensorBus::default())
    }

    /// Create a sensor attached to an existing bus.
    pub fn with_bus(bus: SensorBus) -> (Self, MockSensorHandle) {
        let (touch_tx, touch_rx) = mpsc::unbounded_channel();
        let sensor = Self {
            touch_rx,
            bus: bus.clone(),
        };
        let handle = MockSensorHandle { touch_tx, bus };
        (sensor, handle)
    }
}

impl SensorDevice for MockSensor {
    fn set_power(&mut self, on: bool) -> Result<()> {
        let mut bus = self.bus.lock()?;
        if on && bus.power_failure {
            return Err(HardwareError::power("sensor did not respond to power on"));
        }
        if on && !bus.powered {
            bus.power_cycles += 1;
        }
        bus.powered = on;
        debug!(powered = on, "sensor power");
        Ok(())
    }

    fn power(&self) -> Result<bool> {
        Ok(self.bus.lock()?.powered)
    }

    async fn wait_for_finger(&mut self) -> Result<()> {
        let touch = self
            .touch_rx
            .recv()
            .await
            .ok_or_else(|| HardwareError::disconnected("mock sensor touch channel"))?;
        debug!(finger = touch.finger, status = touch.status, "finger down");
        self.bus.lock()?.last_touch = Some(touch);
        Ok(())
    }
}

/// Handle for driving a [`MockSensor`].
#[derive(Debug, Clone)]
pub struct MockSensorHandle {
    touch_tx: mpsc::UnboundedSender<Touch>,
    bus: SensorBus,
}

impl MockSensorHandle {
    /// Place `finger` on the sensor with a good image.
    ///
    /// # Errors
    /// Returns an error if the sensor has been dropped.
    pub fn touch(&self, finger: u32) -> Result<()> {
        self.touch_with(Touch::good(finger))
    }

    /// Queue an arbitrary touch.
    ///
    /// # Errors
    /// Returns an error if the sensor has been dropped.
    pub fn touch_with(&self, touch: Touch) -> Result<()> {
        self.touch_tx
            .send(touch)
            .map_err(|_| HardwareError::disconnected("mock sensor touch channel"))
    }

    /// Keep a finger resting on the sensor so "wait finger lost" never
    /// succeeds.
    pub fn hold_finger(&self, held: bool) {
        if let Ok(mut bus) = self.bus.lock() {
            bus.finger_held = held;
        }
    }

    /// Make the next power-on attempts fail.
    pub fn set_power_failure(&self, failing: bool) {
        if let Ok(mut bus) = self.bus.lock() {
            bus.power_failure = failing;
        }
    }

    pub fn is_powered(&self) -> bool {
        self.bus.lock().map(|bus| bus.powered).unwrap_or(false)
    }

    /// Number of off-to-on power transitions so far.
    pub fn power_cycles(&self) -> u32 {
        self.bus.lock().map(|bus| bus.power_cycles).unwrap_or(0)
    }

    pub fn bus(&self) -> &SensorBus {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_toggle() {
        let (mut sensor, handle) = MockSensor::new();
        assert!(!sensor.power().unwrap());
        sensor.set_power(true).unwrap();
        assert!(handle.is_powered());
        sensor.set_power(true).unwrap();
        sensor.set_power(false).unwrap();
        assert!(!handle.is_powered());
        assert_eq!(handle.power_cycles(), 1);
    }

    #[test]
    fn test_power_failure() {
        let (mut sensor, handle) = MockSensor::new();
        handle.set_power_failure(true);
        assert!(matches!(
            sensor.set_power(true),
            Err(HardwareError::PowerFailure { .. })
        ));
        // Powering off still works.
        assert!(sensor.set_power(false).is_ok());
    }

    #[tokio::test]
    async fn test_touch_lands_on_bus() {
        let (mut sensor, handle) = MockSensor::new();
        handle
            .touch_with(Touch::with_quality(4, FingerprintAcquiredInfo::Partial))
            .unwrap();
        sensor.wait_for_finger().await.unwrap();

        let bus = handle.bus().lock().unwrap();
        assert_eq!(bus.last_touch, Some(Touch { finger: 4, status: 1 }));
    }

    #[tokio::test]
    async fn test_dropped_handle_disconnects() {
        let (mut sensor, handle) = MockSensor::new();
        drop(handle);
        assert!(matches!(
            sensor.wait_for_finger().await,
            Err(HardwareError::Disconnected { .. })
        ));
    }
}
