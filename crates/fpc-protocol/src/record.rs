//! The [`Record`] trait and the common record header.
//!
//! A record is the fixed-layout structure exchanged with a trustlet through a
//! shared memory region. The HAL encodes a request into the region, the
//! trustlet overwrites it in place with its response, and the HAL decodes the
//! same layout back. All integers are little-endian and there is no padding
//! between fields.

use bytes::{Buf, BufMut};
use fpc_core::{Error, Result};

use crate::commands::Command;

/// Leading `(group_id, cmd_id)` pair shared by all fingerprint records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header {
    pub group_id: u32,
    pub cmd_id: u32,
}

impl Header {
    pub const SIZE: usize = 8;

    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            group_id: command.group().as_u32(),
            cmd_id: command.id(),
        }
    }

    /// Command named by the header, if it is a known one.
    #[must_use]
    pub fn command(&self) -> Option<Command> {
        Command::from_ids(self.group_id, self.cmd_id)
    }

    /// Read the header at the start of `bytes` without consuming anything.
    ///
    /// # Errors
    /// Returns `Error::BufferTooSmall` when fewer than 8 bytes are available.
    pub fn peek(bytes: &[u8]) -> Result<Self> {
        let mut cursor = bytes;
        Self::get(&mut cursor)
    }

    pub(crate) fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.group_id);
        buf.put_u32_le(self.cmd_id);
    }

    pub(crate) fn get<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        Ok(Self {
            group_id: buf.get_u32_le(),
            cmd_id: buf.get_u32_le(),
        })
    }
}

/// A structure with a fixed little-endian layout exchanged with a trustlet.
pub trait Record: Sized {
    /// Human readable record name for logs and errors.
    const NAME: &'static str;

    /// Encoded size in bytes. Variable-length records report the size of
    /// their fixed prefix and override [`Record::encoded_len`].
    const SIZE: usize;

    /// Number of bytes this particular value encodes to.
    fn encoded_len(&self) -> usize {
        Self::SIZE
    }

    fn encode<B: BufMut>(&self, buf: &mut B);

    /// # Errors
    /// Returns an error when the buffer is shorter than the record.
    fn decode<B: Buf>(buf: &mut B) -> Result<Self>;

    /// Status word carried by the record, `0` when it has none.
    fn status(&self) -> i32;
}

/// Encode a record into a freshly allocated, exactly sized buffer.
pub fn encode_record<R: Record>(record: &R) -> Vec<u8> {
    let mut buf = Vec::with_capacity(record.encoded_len());
    record.encode(&mut buf);
    buf
}

/// Decode a record from the start of `bytes`. Trailing bytes are ignored,
/// shared regions are usually larger than the record they hold.
///
/// # Errors
/// Returns `Error::BufferTooSmall` when `bytes` is shorter than the record.
pub fn decode_record<R: Record>(bytes: &[u8]) -> Result<R> {
    let mut cursor = bytes;
    R::decode(&mut cursor)
}

pub(crate) fn ensure_remaining<B: Buf>(buf: &B, needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(Error::BufferTooSmall {
            needed,
            actual: buf.remaining(),
        });
    }
    Ok(())
}
