//! Emulated fingerprint and keymaster trustlets.
//!
//! The fingerprint trustlet keeps its template database in memory and
//! persists it as JSON when asked to store it. Prints are matched by the
//! [`Touch::finger`](super::Touch) value of the captured image, which is
//! enough to exercise every path of the HAL without image processing.
//!
//! Authentication tokens carry an HMAC-SHA256 ([`token_hmac`]) keyed with
//! the blob the trustlet received from keymaster.

use std::fs;
use std::path::Path;

use bytes::BufMut;
use chrono::Utc;
use fpc_core::{
    HwAuthToken,
    constants::{AUTH_TOKEN_HMAC_LENGTH, AUTH_TOKEN_LENGTH, AUTHENTICATOR_TYPE_FINGERPRINT, MAX_FINGERPRINTS},
};
use fpc_protocol::{
    AuthChallenge, AuthResult, BufferCommand, Command, DeleteFingerprint, EndEnroll, EnrollStep,
    FingerprintList, Header, Identify, KeymasterRequest, KeymasterResponse, Record, SetGid,
    StandardCommand, TemplateId, decode_record,
    keymaster::KEYMASTER_GET_KEY_CMD,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};

use super::sensor::BusState;
use crate::{Result, error::HardwareError};

// Trustlet error codes, see `fpc_protocol::applet_error_name`.
pub const FPC_ERROR_CONFIG: i32 = -10;
pub const FPC_ERROR_HARDWARE: i32 = -9;
pub const FPC_ERROR_NOENTITY: i32 = -8;
pub const FPC_ERROR_IO: i32 = -6;
pub const FPC_ERROR_NOSPACE: i32 = -5;
pub const FPC_ERROR_INPUT: i32 = -1;

/// Identify status asking the caller to capture again.
pub const IDENTIFY_RETRY: i32 = -11;

type HmacSha256 = Hmac<Sha256>;

/// Default number of good touches an enrollment needs.
pub const DEFAULT_ENROLL_TOUCHES: u32 = 4;

/// HMAC-SHA256 of `data` under `key`.
pub fn token_hmac(key: &[u8], data: &[u8]) -> [u8; AUTH_TOKEN_HMAC_LENGTH] {
    let mut out = [0u8; AUTH_TOKEN_HMAC_LENGTH];
    // HMAC accepts keys of any length.
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return out;
    };
    mac.update(data);
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Sign `token` in place with `key`.
pub fn sign_token(key: &[u8], token: &mut HwAuthToken) {
    token.hmac = token_hmac(key, &token.signed_bytes());
}

fn random_nonzero_u64() -> u64 {
    let (high, low) = uuid::Uuid::new_v4().as_u64_pair();
    (high ^ low) | 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPrint {
    pub id: u32,
    pub gid: u32,
    pub finger: u32,
}

/// On-disk form of the template database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDatabase {
    pub db_id: u64,
    pub prints: Vec<StoredPrint>,
}

impl StoredDatabase {
    fn empty() -> Self {
        Self {
            db_id: random_nonzero_u64(),
            prints: Vec::new(),
        }
    }

    fn prints_in(&self, gid: u32) -> impl Iterator<Item = &StoredPrint> {
        self.prints.iter().filter(move |p| p.gid == gid)
    }

    fn next_print_id(&self) -> u32 {
        loop {
            let candidate = (random_nonzero_u64() & 0x7FFF_FFFF) as u32;
            if candidate != 0 && self.prints.iter().all(|p| p.id != candidate) {
                return candidate;
            }
        }
    }
}

#[derive(Debug)]
struct Enrollment {
    finger: Option<u32>,
    remaining: u32,
}

/// Faults a test can arm on the emulated trustlet.
#[derive(Debug, Default)]
pub struct AppletFaults {
    /// Number of deletions that succeed before every further one fails.
    pub deletes_before_failure: Option<u32>,
    /// Status the next identify reports instead of matching.
    pub identify_error: Option<i32>,
    /// Make the next database store write a truncated file and fail.
    pub fail_next_store: bool,
    /// Length to report in print listings instead of the real count.
    pub listing_length: Option<u32>,
    /// Status every finger detector arming reports while set.
    pub arm_status: Option<i32>,
}

/// Emulated fingerprint trustlet.
#[derive(Debug)]
pub struct FingerprintApplet {
    enroll_touches: u32,
    initialized: bool,
    key: Option<Vec<u8>>,
    db: StoredDatabase,
    active_gid: u32,
    enroll_challenge: u64,
    auth_challenge: u64,
    enroll_authorized: bool,
    enrollment: Option<Enrollment>,
    last_capture: Option<u32>,
    last_match: Option<u32>,
    last_identified: Option<u32>,
    pub faults: AppletFaults,
}

impl FingerprintApplet {
    pub fn new(enroll_touches: u32) -> Self {
        Self {
            enroll_touches: enroll_touches.max(1),
            initialized: false,
            key: None,
            db: StoredDatabase::empty(),
            active_gid: 0,
            enroll_challenge: 0,
            auth_challenge: 0,
            enroll_authorized: false,
            enrollment: None,
            last_capture: None,
            last_match: None,
            last_identified: None,
            faults: AppletFaults::default(),
        }
    }

    /// Forget everything that lives in trustlet memory, as a trustlet
    /// restart would.
    pub fn reset(&mut self) {
        let faults = std::mem::take(&mut self.faults);
        *self = Self::new(self.enroll_touches);
        self.faults = faults;
    }

    pub fn prints_in(&self, gid: u32) -> Vec<u32> {
        self.db.prints_in(gid).map(|p| p.id).collect()
    }

    pub fn enroll_challenge(&self) -> u64 {
        self.enroll_challenge
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    /// Process the record in `region` and return the response word.
    pub fn handle(&mut self, bus: &mut BusState, region: &mut [u8]) -> i32 {
        let Ok(header) = Header::peek(region) else {
            warn!(len = region.len(), "region too small for a command header");
            return FPC_ERROR_INPUT;
        };
        let Some(command) = header.command() else {
            warn!(
                group = header.group_id,
                cmd = header.cmd_id,
                "unknown trustlet command"
            );
            return FPC_ERROR_INPUT;
        };
        if !self.initialized && command != Command::Init {
            warn!(%command, "command before FPC_INIT");
            return FPC_ERROR_CONFIG;
        }
        debug!(%command, "trustlet command");

        let outcome = match command {
            Command::Init => exchange(region, |cmd: &mut StandardCommand| {
                self.initialized = true;
                cmd.ret_val = 0;
            }),
            Command::WaitFingerLost => exchange(region, |cmd: &mut StandardCommand| {
                cmd.ret_val = if bus.finger_held { 0 } else { 1 };
            }),
            Command::WaitFingerDown => exchange(region, |cmd: &mut StandardCommand| {
                cmd.ret_val = match self.faults.arm_status {
                    Some(status) => status,
                    None if bus.powered => {
                        bus.last_touch = None;
                        0
                    }
                    None => FPC_ERROR_HARDWARE,
                };
            }),
            Command::GetFingerStatus => exchange(region, |cmd: &mut StandardCommand| {
                cmd.ret_val = i32::from(bus.finger_held);
            }),
            Command::CaptureImage => exchange(region, |cmd: &mut StandardCommand| {
                cmd.ret_val = self.capture(bus);
            }),
            Command::BeginEnrol => exchange(region, |cmd: &mut StandardCommand| {
                cmd.ret_val = self.begin_enrol();
            }),
            Command::EnrolStep => exchange(region, |cmd: &mut EnrollStep| self.enrol_step(cmd)),
            Command::EndEnrol => exchange(region, |cmd: &mut EndEnroll| self.end_enrol(cmd)),
            Command::Identify => exchange(region, |cmd: &mut Identify| self.identify(cmd)),
            Command::UpdateTemplate => exchange(region, |cmd: &mut StandardCommand| {
                cmd.ret_val = i32::from(self.last_match.take().is_some_and(|id| id != 0));
            }),
            Command::LoadEmptyDb => exchange(region, |cmd: &mut StandardCommand| {
                self.db = StoredDatabase::empty();
                cmd.ret_val = 0;
            }),
            Command::GetFingerprints => {
                exchange(region, |cmd: &mut FingerprintList| self.list(cmd))
            }
            Command::DeleteFingerprint => {
                exchange(region, |cmd: &mut DeleteFingerprint| self.delete(cmd))
            }
            Command::SetGid => exchange(region, |cmd: &mut SetGid| {
                self.active_gid = cmd.gid;
                cmd.status = 0;
            }),
            Command::GetTemplateId => exchange(region, |cmd: &mut TemplateId| {
                cmd.auth_id = self.db.db_id;
            }),
            Command::LoadDb => exchange(region, |cmd: &mut BufferCommand| self.load_db(cmd)),
            Command::StoreDb => exchange(region, |cmd: &mut BufferCommand| self.store_db(cmd)),
            Command::SetAuthChallenge => exchange(region, |cmd: &mut AuthChallenge| {
                self.auth_challenge = cmd.challenge;
                cmd.status = 0;
            }),
            Command::GetAuthChallenge => exchange(region, |cmd: &mut AuthChallenge| {
                self.enroll_challenge = random_nonzero_u64();
                cmd.challenge = self.enroll_challenge;
                cmd.status = 0;
            }),
            Command::AuthorizeEnrol => {
                exchange(region, |cmd: &mut BufferCommand| self.authorize_enrol(cmd))
            }
            Command::GetAuthResult => exchange(region, |cmd: &mut AuthResult| self.auth_result(cmd)),
            Command::SetKeyData => exchange(region, |cmd: &mut BufferCommand| {
                self.key = Some(cmd.data.clone());
                cmd.status = 0;
            }),
            Command::IsUserValid => exchange(region, |cmd: &mut StandardCommand| {
                cmd.ret_val = 0;
            }),
            other => {
                debug!(command = %other, "command not supported by emulated trustlet");
                Err(FPC_ERROR_INPUT)
            }
        };

        match outcome {
            Ok(()) => 0,
            Err(code) => code,
        }
    }

    fn capture(&mut self, bus: &mut BusState) -> i32 {
        if !bus.powered {
            return FPC_ERROR_HARDWARE;
        }
        match bus.last_touch.take() {
            Some(touch) => {
                self.last_capture = (touch.status == 0).then_some(touch.finger);
                touch.status
            }
            None => FPC_ERROR_IO,
        }
    }

    fn begin_enrol(&mut self) -> i32 {
        if !std::mem::take(&mut self.enroll_authorized) {
            warn!("enrollment started without authorization");
            return FPC_ERROR_INPUT;
        }
        if self.db.prints_in(self.active_gid).count() >= MAX_FINGERPRINTS {
            return FPC_ERROR_NOSPACE;
        }
        self.enrollment = Some(Enrollment {
            finger: None,
            remaining: self.enroll_touches,
        });
        0
    }

    fn enrol_step(&mut self, cmd: &mut EnrollStep) {
        let (Some(enrollment), Some(finger)) = (self.enrollment.as_mut(), self.last_capture.take())
        else {
            cmd.status = FPC_ERROR_INPUT;
            return;
        };
        enrollment.finger.get_or_insert(finger);
        enrollment.remaining = enrollment.remaining.saturating_sub(1);
        cmd.status = 0;
        cmd.remaining_touches = enrollment.remaining;
    }

    fn end_enrol(&mut self, cmd: &mut EndEnroll) {
        match self.enrollment.take() {
            Some(Enrollment {
                finger: Some(finger),
                remaining: 0,
            }) => {
                let id = self.db.next_print_id();
                self.db.prints.push(StoredPrint {
                    id,
                    gid: self.active_gid,
                    finger,
                });
                self.db.db_id = random_nonzero_u64();
                cmd.print_id = id;
                cmd.status = 0;
            }
            _ => cmd.status = FPC_ERROR_INPUT,
        }
    }

    fn identify(&mut self, cmd: &mut Identify) {
        if let Some(code) = self.faults.identify_error.take() {
            cmd.status = code;
            return;
        }
        let Some(finger) = self.last_capture.take() else {
            cmd.status = IDENTIFY_RETRY;
            return;
        };
        let id = self
            .db
            .prints_in(self.active_gid)
            .find(|p| p.finger == finger)
            .map_or(0, |p| p.id);
        self.last_match = Some(id);
        self.last_identified = (id != 0).then_some(id);
        cmd.status = 0;
        cmd.id = id;
    }

    fn list(&mut self, cmd: &mut FingerprintList) {
        let ids = self.prints_in(self.active_gid);
        cmd.fingerprints = [0; MAX_FINGERPRINTS];
        for (slot, id) in cmd.fingerprints.iter_mut().zip(&ids) {
            *slot = *id;
        }
        cmd.length = self.faults.listing_length.unwrap_or(ids.len() as u32);
        cmd.status = 0;
    }

    fn delete(&mut self, cmd: &mut DeleteFingerprint) {
        if let Some(remaining) = self.faults.deletes_before_failure.as_mut() {
            if *remaining == 0 {
                cmd.status = FPC_ERROR_IO;
                return;
            }
            *remaining -= 1;
        }
        let gid = self.active_gid;
        let before = self.db.prints.len();
        self.db
            .prints
            .retain(|p| !(p.gid == gid && p.id == cmd.fingerprint_id));
        if self.db.prints.len() == before {
            cmd.status = FPC_ERROR_NOENTITY;
            return;
        }
        self.db.db_id = random_nonzero_u64();
        cmd.status = 0;
    }

    fn load_db(&mut self, cmd: &mut BufferCommand) {
        cmd.status = match cmd.data_as_str().map(|p| p.to_owned()) {
            Ok(path) => match fs::read(&path) {
                Ok(bytes) => match serde_json::from_slice::<StoredDatabase>(&bytes) {
                    Ok(db) => {
                        self.db = db;
                        0
                    }
                    Err(e) => {
                        warn!(path = %path, error = %e, "corrupt template database");
                        FPC_ERROR_IO
                    }
                },
                Err(_) => FPC_ERROR_NOENTITY,
            },
            Err(_) => FPC_ERROR_INPUT,
        };
    }

    fn store_db(&mut self, cmd: &mut BufferCommand) {
        let Ok(path) = cmd.data_as_str().map(|p| p.to_owned()) else {
            cmd.status = FPC_ERROR_INPUT;
            return;
        };
        let Ok(bytes) = serde_json::to_vec(&self.db) else {
            cmd.status = FPC_ERROR_IO;
            return;
        };

        if std::mem::take(&mut self.faults.fail_next_store) {
            // Interrupted write: only half of the file reaches storage.
            let _ = fs::write(Path::new(&path), &bytes[..bytes.len() / 2]);
            cmd.status = FPC_ERROR_IO;
            return;
        }

        cmd.status = match fs::write(Path::new(&path), &bytes) {
            Ok(()) => 0,
            Err(e) => {
                warn!(path = %path, error = %e, "template database write failed");
                FPC_ERROR_IO
            }
        };
    }

    fn authorize_enrol(&mut self, cmd: &mut BufferCommand) {
        self.enroll_authorized = false;
        let Some(key) = self.key.as_deref() else {
            cmd.status = FPC_ERROR_CONFIG;
            return;
        };
        if cmd.data.len() != AUTH_TOKEN_LENGTH {
            cmd.status = FPC_ERROR_INPUT;
            return;
        }
        let Ok(token) = HwAuthToken::from_bytes(&cmd.data) else {
            cmd.status = FPC_ERROR_INPUT;
            return;
        };

        let expected = token_hmac(key, &token.signed_bytes());
        let challenge_ok = self.enroll_challenge != 0 && token.challenge == self.enroll_challenge;
        if challenge_ok && token.hmac_matches(&expected) {
            self.enroll_authorized = true;
            cmd.status = 0;
        } else {
            warn!(challenge_ok, "enroll authorization token rejected");
            cmd.status = FPC_ERROR_INPUT;
        }
    }

    fn auth_result(&mut self, cmd: &mut AuthResult) {
        let (Some(key), Some(_print)) = (self.key.as_deref(), self.last_identified.take()) else {
            cmd.result = FPC_ERROR_INPUT;
            return;
        };
        let mut token = HwAuthToken {
            version: 0,
            challenge: self.auth_challenge,
            user_id: u64::from(self.active_gid),
            authenticator_id: self.db.db_id,
            authenticator_type: AUTHENTICATOR_TYPE_FINGERPRINT,
            timestamp: Utc::now().timestamp_millis().max(0) as u64,
            hmac: [0; AUTH_TOKEN_HMAC_LENGTH],
        };
        sign_token(key, &mut token);
        cmd.result = 0;
        cmd.length = AUTH_TOKEN_LENGTH as u32;
        cmd.token = token.to_bytes();
    }
}

/// Decode a record from `region`, let `respond` fill in the answer, and
/// write it back in place.
fn exchange<R: Record>(region: &mut [u8], respond: impl FnOnce(&mut R)) -> std::result::Result<(), i32> {
    let mut record: R = decode_record(region).map_err(|e| {
        warn!(record = R::NAME, error = %e, "malformed record");
        FPC_ERROR_INPUT
    })?;
    respond(&mut record);
    let mut out: &mut [u8] = region;
    if out.remaining_mut() < record.encoded_len() {
        return Err(FPC_ERROR_INPUT);
    }
    record.encode(&mut out);
    Ok(())
}

/// Emulated keymaster trustlet. Only knows how to hand out the fingerprint
/// key blob.
#[derive(Debug, Clone)]
pub struct KeymasterApplet {
    key: Vec<u8>,
}

impl KeymasterApplet {
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Answer a plain keymaster request.
    pub fn handle(&self, request: &[u8], response: &mut [u8]) -> Result<()> {
        let request: KeymasterRequest = decode_record(request)
            .map_err(|e| HardwareError::invalid_data(format!("keymaster request: {e}")))?;
        if request.cmd_id != KEYMASTER_GET_KEY_CMD {
            return Err(HardwareError::invalid_data(format!(
                "unsupported keymaster command {:#x}",
                request.cmd_id
            )));
        }

        let offset = KeymasterResponse::SIZE;
        if response.len() < offset + self.key.len() {
            return Err(HardwareError::communication(format!(
                "keymaster response buffer of {} bytes too small",
                response.len()
            )));
        }
        let header = KeymasterResponse {
            status: 0,
            offset: offset as u32,
            length: self.key.len() as u32,
        };
        let mut out: &mut [u8] = response;
        header.encode(&mut out);
        response[offset..offset + self.key.len()].copy_from_slice(&self.key);
        Ok(())
    }
}
