//! Keymaster key provisioning records.
//!
//! During initialization the HAL asks the keymaster trustlet for the key blob
//! that the fingerprint trustlet uses to sign authentication tokens. These
//! records have no fingerprint header; they go through the plain
//! (non shared-region) command path.

use bytes::{Buf, BufMut};
use fpc_core::{Error, Result};

use crate::record::{Record, ensure_remaining};

/// Keymaster command id that returns the fingerprint key blob.
pub const KEYMASTER_GET_KEY_CMD: u32 = 0x205;

/// Argument word sent alongside [`KEYMASTER_GET_KEY_CMD`].
pub const KEYMASTER_GET_KEY_ARG: u32 = 0x02;

/// Size of the request area in the keymaster shared buffer. The response
/// area follows it.
pub const KEYMASTER_REQUEST_AREA: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeymasterRequest {
    pub cmd_id: u32,
    pub ret_val: u32,
    pub length: u32,
}

impl KeymasterRequest {
    /// Request for the fingerprint key blob.
    #[must_use]
    pub fn key_request() -> Self {
        Self {
            cmd_id: KEYMASTER_GET_KEY_CMD,
            ret_val: KEYMASTER_GET_KEY_ARG,
            length: 0,
        }
    }
}

impl Record for KeymasterRequest {
    const NAME: &'static str = "KeymasterRequest";
    const SIZE: usize = 12;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.cmd_id);
        buf.put_u32_le(self.ret_val);
        buf.put_u32_le(self.length);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        Ok(Self {
            cmd_id: buf.get_u32_le(),
            ret_val: buf.get_u32_le(),
            length: buf.get_u32_le(),
        })
    }

    fn status(&self) -> i32 {
        0
    }
}

/// Keymaster answer locating the key blob inside the response area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeymasterResponse {
    pub status: i32,
    pub offset: u32,
    pub length: u32,
}

impl KeymasterResponse {
    /// Slice the key blob out of the full response area.
    ///
    /// # Errors
    /// Returns `Error::InvalidRecord` if `offset + length` lies outside
    /// `response`.
    pub fn key_blob<'a>(&self, response: &'a [u8]) -> Result<&'a [u8]> {
        let start = self.offset as usize;
        let end = start
            .checked_add(self.length as usize)
            .filter(|end| *end <= response.len())
            .ok_or_else(|| {
                Error::InvalidRecord(format!(
                    "key blob at {}+{} exceeds response of {} bytes",
                    self.offset,
                    self.length,
                    response.len()
                ))
            })?;
        Ok(&response[start..end])
    }
}

impl Record for KeymasterResponse {
    const NAME: &'static str = "KeymasterResponse";
    const SIZE: usize = 12;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32_le(self.status);
        buf.put_u32_le(self.offset);
        buf.put_u32_le(self.length);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        Ok(Self {
            status: buf.get_i32_le(),
            offset: buf.get_u32_le(),
            length: buf.get_u32_le(),
        })
    }

    fn status(&self) -> i32 {
        self.status
    }
}
