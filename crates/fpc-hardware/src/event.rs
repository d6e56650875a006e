//! Device event source.
//!
//! Combines the sensor's finger interrupt with the worker wake channel into a
//! single wait. This is the only place the capture loop blocks on the
//! sensor, and therefore the only place a pending worker transition can
//! interrupt it.

use tracing::trace;

use crate::{
    error::Result,
    traits::SensorDevice,
    wake::WakeReceiver,
};

/// What ended a [`DeviceEventSource::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The sensor raised its finger interrupt.
    Finger,
    /// A worker transition is pending.
    Wake,
}

/// Sensor plus wake receiver, owned by whoever runs the capture loop.
pub struct DeviceEventSource<S, T> {
    sensor: S,
    wake: WakeReceiver<T>,
}

impl<S: SensorDevice, T> DeviceEventSource<S, T> {
    pub fn new(sensor: S, wake: WakeReceiver<T>) -> Self {
        Self { sensor, wake }
    }

    /// Wait for a finger or a pending transition, whichever comes first.
    ///
    /// A transition that is already pending wins without touching the
    /// sensor.
    pub async fn wait(&mut self) -> Result<EventKind> {
        tokio::select! {
            biased;
            woken = self.wake.pending() => {
                woken?;
                trace!("event source woken by pending transition");
                Ok(EventKind::Wake)
            }
            finger = self.sensor.wait_for_finger() => {
                finger?;
                trace!("finger interrupt");
                Ok(EventKind::Finger)
            }
        }
    }

    /// Whether a transition is waiting to be consumed by the worker.
    pub fn is_wake_pending(&self) -> bool {
        self.wake.is_pending()
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSensor;
    use crate::wake::WakeSlot;
    use std::time::Duration;

    #[tokio::test]
    async fn test_finger_event() {
        let (sensor, handle) = MockSensor::new();
        let slot: WakeSlot<u8> = WakeSlot::new();
        let mut events = DeviceEventSource::new(sensor, slot.subscribe());

        handle.touch(1).unwrap();
        assert_eq!(events.wait().await.unwrap(), EventKind::Finger);
    }

    #[tokio::test]
    async fn test_pending_wake_wins_over_queued_finger() {
        let (sensor, handle) = MockSensor::new();
        let slot = WakeSlot::new();
        let mut events = DeviceEventSource::new(sensor, slot.subscribe());

        handle.touch(1).unwrap();
        slot.send(9u8);
        assert_eq!(events.wait().await.unwrap(), EventKind::Wake);
        assert!(events.is_wake_pending());

        // The queued touch is still delivered once the wake is consumed.
        slot.take();
        assert_eq!(events.wait().await.unwrap(), EventKind::Finger);
    }

    #[tokio::test]
    async fn test_wake_interrupts_blocked_wait() {
        let (sensor, _handle) = MockSensor::new();
        let slot = WakeSlot::new();
        let mut events = DeviceEventSource::new(sensor, slot.subscribe());

        let sender = slot.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sender.send(1u8);
        });

        let kind = tokio::time::timeout(Duration::from_secs(1), events.wait())
            .await
            .expect("wait was not interrupted")
            .unwrap();
        assert_eq!(kind, EventKind::Wake);
    }
}
