//! Single-slot wake channel.
//!
//! The slot holds at most one pending value. Sending overwrites whatever is
//! still unconsumed and hands the displaced value back to the sender, so
//! "latest request wins" stays observable. Taking empties the slot.
//!
//! Receivers are level triggered: [`WakeReceiver::pending`] completes as long
//! as the slot is occupied, no matter how many times it was already observed.
//! This lets several independent waits (idle, pause, finger-down) share one
//! wake source without consuming it.
//!
//! ```
//! use fpc_hardware::wake::WakeSlot;
//!
//! let slot = WakeSlot::new();
//! assert_eq!(slot.send("pause"), None);
//! assert_eq!(slot.send("enroll"), Some("pause"));
//! assert!(slot.is_pending());
//! assert_eq!(slot.take(), Some("enroll"));
//! assert_eq!(slot.take(), None);
//! ```

use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{HardwareError, Result};

/// Sending side of the wake channel. Cheap to clone.
#[derive(Debug)]
pub struct WakeSlot<T> {
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for WakeSlot<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> Default for WakeSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WakeSlot<T> {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Store `value`, waking every receiver. Returns the value it displaced.
    pub fn send(&self, value: T) -> Option<T> {
        self.tx.send_replace(Some(value))
    }

    /// Remove and return the pending value.
    ///
    /// Receivers are not notified; they only care about the slot becoming
    /// occupied.
    pub fn take(&self) -> Option<T> {
        let mut taken = None;
        self.tx.send_if_modified(|slot| {
            taken = slot.take();
            false
        });
        taken
    }

    pub fn is_pending(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Create a receiver observing this slot.
    pub fn subscribe(&self) -> WakeReceiver<T> {
        WakeReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Whether every receiver has been dropped, meaning nobody will ever
    /// consume what is sent.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Observing side of the wake channel.
#[derive(Debug, Clone)]
pub struct WakeReceiver<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T> WakeReceiver<T> {
    /// Wait until the slot holds a value.
    ///
    /// Cancel safe. Returns immediately if a value is already pending.
    ///
    /// # Errors
    /// Returns `HardwareError::Disconnected` once every [`WakeSlot`] clone is
    /// gone and the slot is empty.
    pub async fn pending(&mut self) -> Result<()> {
        self.rx
            .wait_for(Option::is_some)
            .await
            .map(|_| ())
            .map_err(|_| HardwareError::disconnected("wake channel"))
    }

    pub fn is_pending(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_overwrite_returns_displaced() {
        let slot = WakeSlot::new();
        assert_eq!(slot.send(1), None);
        assert_eq!(slot.send(2), Some(1));
        assert_eq!(slot.send(3), Some(2));
        assert_eq!(slot.take(), Some(3));
    }

    #[test]
    fn test_take_empty_slot() {
        let slot: WakeSlot<u8> = WakeSlot::new();
        assert_eq!(slot.take(), None);
        assert!(!slot.is_pending());
    }

    #[tokio::test]
    async fn test_pending_is_level_triggered() {
        let slot = WakeSlot::new();
        let mut rx = slot.subscribe();
        slot.send("wake");

        // Observing twice must not consume the value.
        rx.pending().await.unwrap();
        rx.pending().await.unwrap();
        assert!(rx.is_pending());

        slot.take();
        assert!(!rx.is_pending());
    }

    #[tokio::test]
    async fn test_pending_wakes_blocked_receiver() {
        let slot = WakeSlot::new();
        let mut rx = slot.subscribe();

        let sender = slot.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            sender.send(7u32);
        });

        tokio::time::timeout(Duration::from_secs(1), rx.pending())
            .await
            .expect("receiver was not woken")
            .unwrap();
        task.await.unwrap();
        assert_eq!(slot.take(), Some(7));
    }

    #[tokio::test]
    async fn test_closed_when_slot_dropped() {
        let slot: WakeSlot<u8> = WakeSlot::new();
        let mut rx = slot.subscribe();
        drop(slot);
        assert!(rx.pending().await.is_err());
    }

    #[test]
    fn test_is_closed_tracks_receivers() {
        let slot: WakeSlot<u8> = WakeSlot::new();
        assert!(slot.is_closed());
        let rx = slot.subscribe();
        assert!(!slot.is_closed());
        drop(rx);
        assert!(slot.is_closed());
    }
}
