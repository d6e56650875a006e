//! Variable-length buffer command.
//!
//! Used wherever a command needs a payload that does not fit a fixed record:
//! database paths, the enroll authorization token and the key blob handed
//! over during provisioning.
//!
//! ```text
//! +----------+--------+--------+--------+------------------+
//! | group_id | cmd_id | status | length | data[length]     |
//! +----------+--------+--------+--------+------------------+
//! ```

use bytes::{Buf, BufMut};
use fpc_core::{Error, Result};

use crate::{
    commands::Command,
    record::{Header, Record, ensure_remaining},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferCommand {
    pub header: Header,
    pub status: i32,
    pub data: Vec<u8>,
}

impl BufferCommand {
    /// Command carrying `data` to the trustlet.
    pub fn new(command: Command, data: impl Into<Vec<u8>>) -> Self {
        Self {
            header: Header::new(command),
            status: 0,
            data: data.into(),
        }
    }

    /// Payload interpreted as a NUL-terminated UTF-8 string.
    ///
    /// # Errors
    /// Returns `Error::InvalidRecord` if the payload is not valid UTF-8.
    pub fn data_as_str(&self) -> Result<&str> {
        let end = self
            .data
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.data.len());
        std::str::from_utf8(&self.data[..end])
            .map_err(|e| Error::InvalidRecord(format!("buffer payload is not UTF-8: {e}")))
    }
}

impl Record for BufferCommand {
    const NAME: &'static str = "BufferCommand";
    const SIZE: usize = Header::SIZE + 8;

    fn encoded_len(&self) -> usize {
        Self::SIZE + self.data.len()
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.header.put(buf);
        buf.put_i32_le(self.status);
        buf.put_u32_le(self.data.len() as u32);
        buf.put_slice(&self.data);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        let header = Header::get(buf)?;
        let status = buf.get_i32_le();
        let length = buf.get_u32_le() as usize;
        ensure_remaining(buf, length)?;
        let mut data = vec![0u8; length];
        buf.copy_to_slice(&mut data);
        Ok(Self {
            header,
            status,
            data,
        })
    }

    fn status(&self) -> i32 {
        self.status
    }
}
