//! Hardware boundary trait definitions.
//!
//! Two devices sit below the HAL:
//!
//! - the **secure environment**, which loads trustlets into the secure world
//!   and exchanges commands with them through shared memory regions, and
//! - the **sensor device node**, which controls sensor power and raises an
//!   interrupt when a finger touches the sensor.
//!
//! The secure environment is driven synchronously: every call completes
//! before it returns and has no timeout. The sensor interrupt is waited on
//! asynchronously so it can be raced against a worker wake-up in
//! [`DeviceEventSource`](crate::event::DeviceEventSource).
//!
//! `wait_for_finger` is a native `async fn` (Edition 2024 RPITIT).

#![allow(async_fn_in_trait)]

use crate::error::Result;
use std::fmt;

/// Handle to a trustlet loaded in the secure world.
///
/// Obtained from [`SecureEnvironment::load_trustlet`] and given back to
/// [`SecureEnvironment::shutdown_trustlet`].
#[derive(Debug, PartialEq, Eq)]
pub struct TrustletHandle {
    id: u64,
    name: String,
    shared_len: usize,
}

impl TrustletHandle {
    /// Create a handle. Only secure environment implementations do this.
    pub fn new(id: u64, name: impl Into<String>, shared_len: usize) -> Self {
        Self {
            id,
            name: name.into(),
            shared_len,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the trustlet's own command buffer.
    pub fn shared_len(&self) -> usize {
        self.shared_len
    }
}

impl fmt::Display for TrustletHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// A shared memory region visible to both worlds.
///
/// Regions are single use: allocate, fill, send, read back, free. They must
/// be returned with [`SecureEnvironment::free_shared`]; dropping one leaks
/// the underlying allocation.
#[derive(Debug)]
pub struct SharedRegion {
    id: u64,
    buf: Vec<u8>,
}

impl SharedRegion {
    /// Create a zero-filled region. Only secure environment implementations
    /// do this.
    pub fn new(id: u64, len: usize) -> Self {
        Self {
            id,
            buf: vec![0u8; len],
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

/// Access to the secure world.
pub trait SecureEnvironment: Send {
    /// Load trustlet `name` from `path` with a command buffer of
    /// `shared_len` bytes.
    fn load_trustlet(&mut self, path: &str, name: &str, shared_len: usize)
    -> Result<TrustletHandle>;

    /// Shut down a loaded trustlet.
    fn shutdown_trustlet(&mut self, trustlet: TrustletHandle) -> Result<()>;

    /// Allocate a zero-filled shared region of `len` bytes.
    fn alloc_shared(&mut self, len: usize) -> Result<SharedRegion>;

    /// Release a shared region.
    fn free_shared(&mut self, region: SharedRegion) -> Result<()>;

    /// Hand `region` to the trustlet, which processes the record it contains
    /// and writes its answer back in place.
    ///
    /// Returns the trustlet's response word: `0` when the command was
    /// processed, a negative trustlet error code otherwise. `Err` means the
    /// call never reached the trustlet.
    fn send_modified_command(
        &mut self,
        trustlet: &TrustletHandle,
        region: &mut SharedRegion,
    ) -> Result<i32>;

    /// Send a plain request through the trustlet's own command buffer.
    fn send_command(
        &mut self,
        trustlet: &TrustletHandle,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<()>;
}

/// The fingerprint sensor device node.
pub trait SensorDevice: Send {
    /// Power the sensor on or off.
    fn set_power(&mut self, on: bool) -> Result<()>;

    /// Current power state.
    fn power(&self) -> Result<bool>;

    /// Wait until the sensor raises its finger interrupt.
    ///
    /// Must be cancel safe: it is raced against the worker wake-up and may
    /// be dropped before completion.
    async fn wait_for_finger(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_is_zeroed() {
        let region = SharedRegion::new(1, 64);
        assert_eq!(region.len(), 64);
        assert!(region.as_slice().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_trustlet_display() {
        let handle = TrustletHandle::new(3, "tzfingerprint", 128);
        assert_eq!(handle.to_string(), "tzfingerprint#3");
        assert_eq!(handle.shared_len(), 128);
    }
}
