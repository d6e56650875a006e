//! Fixed-layout command records of the fingerprint trustlet.
//!
//! Each record starts with a [`Header`] followed by its command specific
//! fields. Fields marked *out* are written by the trustlet when it answers.
//!
//! | Record                | Body after header                                   | Size |
//! |-----------------------|-----------------------------------------------------|------|
//! | [`StandardCommand`]   | ret_val (out)                                       | 12   |
//! | [`AuthChallenge`]     | challenge u64 (in/out), status (out)                | 20   |
//! | [`SetGid`]            | gid, status (out)                                   | 16   |
//! | [`EnrollStep`]        | status (out), remaining_touches (out)               | 16   |
//! | [`EndEnroll`]         | print_id (out), status (out)                        | 16   |
//! | [`Identify`]          | status (out), id (out), dbg1, dbg2                  | 24   |
//! | [`FingerprintList`]   | status (out), length (out), prints `[u32; 5]` (out) | 36   |
//! | [`DeleteFingerprint`] | fingerprint_id, status (out)                        | 16   |
//! | [`AuthResult`]        | result (out), length (out), token `[u8; 69]` (out)  | 85   |
//! | [`TemplateId`]        | auth_id u64 (out)                                   | 16   |

use bytes::{Buf, BufMut};
use fpc_core::{Result, constants::AUTH_TOKEN_LENGTH, constants::MAX_FINGERPRINTS};

use crate::{
    commands::Command,
    record::{Header, Record, ensure_remaining},
};

/// Command without arguments whose answer is a single return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardCommand {
    pub header: Header,
    pub ret_val: i32,
}

impl StandardCommand {
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            header: Header::new(command),
            ret_val: 0,
        }
    }
}

impl Record for StandardCommand {
    const NAME: &'static str = "StandardCommand";
    const SIZE: usize = Header::SIZE + 4;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.header.put(buf);
        buf.put_i32_le(self.ret_val);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        Ok(Self {
            header: Header::get(buf)?,
            ret_val: buf.get_i32_le(),
        })
    }

    fn status(&self) -> i32 {
        self.ret_val
    }
}

/// Sets or reads an authentication challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthChallenge {
    pub header: Header,
    pub challenge: u64,
    pub status: i32,
}

impl AuthChallenge {
    #[must_use]
    pub fn new(command: Command, challenge: u64) -> Self {
        Self {
            header: Header::new(command),
            challenge,
            status: 0,
        }
    }
}

impl Record for AuthChallenge {
    const NAME: &'static str = "AuthChallenge";
    const SIZE: usize = Header::SIZE + 12;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.header.put(buf);
        buf.put_u64_le(self.challenge);
        buf.put_i32_le(self.status);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        Ok(Self {
            header: Header::get(buf)?,
            challenge: buf.get_u64_le(),
            status: buf.get_i32_le(),
        })
    }

    fn status(&self) -> i32 {
        self.status
    }
}

/// Selects the active group inside the loaded database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetGid {
    pub header: Header,
    pub gid: u32,
    pub status: i32,
}

impl SetGid {
    #[must_use]
    pub fn new(gid: u32) -> Self {
        Self {
            header: Header::new(Command::SetGid),
            gid,
            status: 0,
        }
    }
}

impl Record for SetGid {
    const NAME: &'static str = "SetGid";
    const SIZE: usize = Header::SIZE + 8;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.header.put(buf);
        buf.put_u32_le(self.gid);
        buf.put_i32_le(self.status);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        Ok(Self {
            header: Header::get(buf)?,
            gid: buf.get_u32_le(),
            status: buf.get_i32_le(),
        })
    }

    fn status(&self) -> i32 {
        self.status
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollStep {
    pub header: Header,
    pub status: i32,
    pub remaining_touches: u32,
}

impl EnrollStep {
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: Header::new(Command::EnrolStep),
            status: 0,
            remaining_touches: 0,
        }
    }
}

impl Default for EnrollStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Record for EnrollStep {
    const NAME: &'static str = "EnrollStep";
    const SIZE: usize = Header::SIZE + 8;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.header.put(buf);
        buf.put_i32_le(self.status);
        buf.put_u32_le(self.remaining_touches);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        Ok(Self {
            header: Header::get(buf)?,
            status: buf.get_i32_le(),
            remaining_touches: buf.get_u32_le(),
        })
    }

    fn status(&self) -> i32 {
        self.status
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndEnroll {
    pub header: Header,
    pub print_id: u32,
    pub status: i32,
}

impl EndEnroll {
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: Header::new(Command::EndEnrol),
            print_id: 0,
            status: 0,
        }
    }
}

impl Default for EndEnroll {
    fn default() -> Self {
        Self::new()
    }
}

impl Record for EndEnroll {
    const NAME: &'static str = "EndEnroll";
    const SIZE: usize = Header::SIZE + 8;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.header.put(buf);
        buf.put_u32_le(self.print_id);
        buf.put_i32_le(self.status);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        Ok(Self {
            header: Header::get(buf)?,
            print_id: buf.get_u32_le(),
            status: buf.get_i32_le(),
        })
    }

    fn status(&self) -> i32 {
        self.status
    }
}

/// One identification attempt against the enrolled templates.
///
/// `dbg1` and `dbg2` carry trustlet diagnostics and are only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identify {
    pub header: Header,
    pub status: i32,
    pub id: u32,
    pub dbg1: u32,
    pub dbg2: u32,
}

impl Identify {
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: Header::new(Command::Identify),
            status: 0,
            id: 0,
            dbg1: 0,
            dbg2: 0,
        }
    }
}

impl Default for Identify {
    fn default() -> Self {
        Self::new()
    }
}

impl Record for Identify {
    const NAME: &'static str = "Identify";
    const SIZE: usize = Header::SIZE + 16;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.header.put(buf);
        buf.put_i32_le(self.status);
        buf.put_u32_le(self.id);
        buf.put_u32_le(self.dbg1);
        buf.put_u32_le(self.dbg2);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        Ok(Self {
            header: Header::get(buf)?,
            status: buf.get_i32_le(),
            id: buf.get_u32_le(),
            dbg1: buf.get_u32_le(),
            dbg2: buf.get_u32_le(),
        })
    }

    fn status(&self) -> i32 {
        self.status
    }
}

/// Listing of the print ids enrolled in the active group.
///
/// `length` is reported by the trustlet and is not trusted: readers must
/// check it against [`MAX_FINGERPRINTS`] before using [`FingerprintList::prints`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintList {
    pub header: Header,
    pub status: i32,
    pub length: u32,
    pub fingerprints: [u32; MAX_FINGERPRINTS],
}

impl FingerprintList {
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: Header::new(Command::GetFingerprints),
            status: 0,
            length: 0,
            fingerprints: [0; MAX_FINGERPRINTS],
        }
    }

    /// Valid prefix of the listing, clamped to the array capacity.
    #[must_use]
    pub fn prints(&self) -> &[u32] {
        let len = (self.length as usize).min(MAX_FINGERPRINTS);
        &self.fingerprints[..len]
    }
}

impl Default for FingerprintList {
    fn default() -> Self {
        Self::new()
    }
}

impl Record for FingerprintList {
    const NAME: &'static str = "FingerprintList";
    const SIZE: usize = Header::SIZE + 8 + 4 * MAX_FINGERPRINTS;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.header.put(buf);
        buf.put_i32_le(self.status);
        buf.put_u32_le(self.length);
        for id in &self.fingerprints {
            buf.put_u32_le(*id);
        }
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        let header = Header::get(buf)?;
        let status = buf.get_i32_le();
        let length = buf.get_u32_le();
        let mut fingerprints = [0u32; MAX_FINGERPRINTS];
        for slot in &mut fingerprints {
            *slot = buf.get_u32_le();
        }
        Ok(Self {
            header,
            status,
            length,
            fingerprints,
        })
    }

    fn status(&self) -> i32 {
        self.status
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteFingerprint {
    pub header: Header,
    pub fingerprint_id: u32,
    pub status: i32,
}

impl DeleteFingerprint {
    #[must_use]
    pub fn new(fingerprint_id: u32) -> Self {
        Self {
            header: Header::new(Command::DeleteFingerprint),
            fingerprint_id,
            status: 0,
        }
    }
}

impl Record for DeleteFingerprint {
    const NAME: &'static str = "DeleteFingerprint";
    const SIZE: usize = Header::SIZE + 8;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.header.put(buf);
        buf.put_u32_le(self.fingerprint_id);
        buf.put_i32_le(self.status);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        Ok(Self {
            header: Header::get(buf)?,
            fingerprint_id: buf.get_u32_le(),
            status: buf.get_i32_le(),
        })
    }

    fn status(&self) -> i32 {
        self.status
    }
}

/// Hardware authentication token produced after a successful identify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    pub header: Header,
    pub result: i32,
    pub length: u32,
    pub token: [u8; AUTH_TOKEN_LENGTH],
}

impl AuthResult {
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: Header::new(Command::GetAuthResult),
            result: 0,
            length: AUTH_TOKEN_LENGTH as u32,
            token: [0; AUTH_TOKEN_LENGTH],
        }
    }
}

impl Default for AuthResult {
    fn default() -> Self {
        Self::new()
    }
}

impl Record for AuthResult {
    const NAME: &'static str = "AuthResult";
    const SIZE: usize = Header::SIZE + 8 + AUTH_TOKEN_LENGTH;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.header.put(buf);
        buf.put_i32_le(self.result);
        buf.put_u32_le(self.length);
        buf.put_slice(&self.token);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        let header = Header::get(buf)?;
        let result = buf.get_i32_le();
        let length = buf.get_u32_le();
        let mut token = [0u8; AUTH_TOKEN_LENGTH];
        buf.copy_to_slice(&mut token);
        Ok(Self {
            header,
            result,
            length,
            token,
        })
    }

    fn status(&self) -> i32 {
        self.result
    }
}

/// Database id used as the authenticator id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateId {
    pub header: Header,
    pub auth_id: u64,
}

impl TemplateId {
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: Header::new(Command::GetTemplateId),
            auth_id: 0,
        }
    }
}

impl Default for TemplateId {
    fn default() -> Self {
        Self::new()
    }
}

impl Record for TemplateId {
    const NAME: &'static str = "TemplateId";
    const SIZE: usize = Header::SIZE + 8;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.header.put(buf);
        buf.put_u64_le(self.auth_id);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        Ok(Self {
            header: Header::get(buf)?,
            auth_id: buf.get_u64_le(),
        })
    }

    fn status(&self) -> i32 {
        0
    }
}
