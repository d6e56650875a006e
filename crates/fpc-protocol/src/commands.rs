//! Command identifiers understood by the fingerprint trustlet.
//!
//! Every command record starts with a two-word header naming the command
//! group and the command inside that group:
//!
//! ```text
//! +----------+--------+----------------------
//! | group_id | cmd_id | command specific body
//! +----------+--------+----------------------
//!   u32 LE     u32 LE
//! ```
//!
//! The same numeric command id is reused across groups (for example
//! `0x03` is `IDENTIFY` in the normal group but `AUTHORIZE_ENROL` in the
//! data group), so a command is only identified by the pair.
//!
//! # Examples
//!
//! ```
//! use fpc_protocol::{Command, CommandGroup};
//!
//! let cmd = Command::Identify;
//! assert_eq!(cmd.group(), CommandGroup::Normal);
//! assert_eq!(cmd.id(), 0x03);
//! assert_eq!(cmd.name(), "FPC_IDENTIFY");
//!
//! assert_eq!(Command::from_ids(3, 0x03), Some(Command::AuthorizeEnrol));
//! assert_eq!(Command::from_ids(9, 0x03), None);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Command group, the first header word of every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum CommandGroup {
    Normal = 0x1,
    Db = 0x2,
    FpcData = 0x3,
    Debug = 0x6,
    Qc = 0x7,
}

impl CommandGroup {
    /// Parse a raw group word.
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x1 => Some(Self::Normal),
            0x2 => Some(Self::Db),
            0x3 => Some(Self::FpcData),
            0x6 => Some(Self::Debug),
            0x7 => Some(Self::Qc),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// A command the HAL can issue to the fingerprint trustlet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Command {
    // Normal group
    BeginEnrol,
    EnrolStep,
    EndEnrol,
    Identify,
    UpdateTemplate,
    WaitFingerLost,
    WaitFingerDown,
    GetFingerStatus,
    LoadEmptyDb,
    GetFingerprints,
    DeleteFingerprint,
    CaptureImage,
    SetGid,
    GetTemplateId,
    Init,

    // Database group
    LoadDb,
    StoreDb,

    // Data group
    SetAuthChallenge,
    GetAuthChallenge,
    AuthorizeEnrol,
    GetAuthResult,
    SetKeyData,
    IsUserValid,

    // Debug group
    GetSensorInfo,

    // QC group
    SetQcAuthNonce,
    GetQcAuthResult,
}

const ALL_COMMANDS: [Command; 26] = [
    Command::BeginEnrol,
    Command::EnrolStep,
    Command::EndEnrol,
    Command::Identify,
    Command::UpdateTemplate,
    Command::WaitFingerLost,
    Command::WaitFingerDown,
    Command::GetFingerStatus,
    Command::LoadEmptyDb,
    Command::GetFingerprints,
    Command::DeleteFingerprint,
    Command::CaptureImage,
    Command::SetGid,
    Command::GetTemplateId,
    Command::Init,
    Command::LoadDb,
    Command::StoreDb,
    Command::SetAuthChallenge,
    Command::GetAuthChallenge,
    Command::AuthorizeEnrol,
    Command::GetAuthResult,
    Command::SetKeyData,
    Command::IsUserValid,
    Command::GetSensorInfo,
    Command::SetQcAuthNonce,
    Command::GetQcAuthResult,
];

impl Command {
    /// Group the command belongs to.
    #[must_use]
    pub fn group(self) -> CommandGroup {
        match self {
            Self::BeginEnrol
            | Self::EnrolStep
            | Self::EndEnrol
            | Self::Identify
            | Self::UpdateTemplate
            | Self::WaitFingerLost
            | Self::WaitFingerDown
            | Self::GetFingerStatus
            | Self::LoadEmptyDb
            | Self::GetFingerprints
            | Self::DeleteFingerprint
            | Self::CaptureImage
            | Self::SetGid
            | Self::GetTemplateId
            | Self::Init => CommandGroup::Normal,
            Self::LoadDb | Self::StoreDb => CommandGroup::Db,
            Self::SetAuthChallenge
            | Self::GetAuthChallenge
            | Self::AuthorizeEnrol
            | Self::GetAuthResult
            | Self::SetKeyData
            | Self::IsUserValid => CommandGroup::FpcData,
            Self::GetSensorInfo => CommandGroup::Debug,
            Self::SetQcAuthNonce | Self::GetQcAuthResult => CommandGroup::Qc,
        }
    }

    /// Command id within its group.
    #[must_use]
    pub fn id(self) -> u32 {
        match self {
            Self::BeginEnrol => 0x00,
            Self::EnrolStep => 0x01,
            Self::EndEnrol => 0x02,
            Self::Identify => 0x03,
            Self::UpdateTemplate => 0x04,
            Self::WaitFingerLost => 0x05,
            Self::WaitFingerDown => 0x07,
            Self::GetFingerStatus => 0x08,
            Self::LoadEmptyDb => 0x0A,
            Self::GetFingerprints => 0x0D,
            Self::DeleteFingerprint => 0x0E,
            Self::CaptureImage => 0x0F,
            Self::SetGid => 0x10,
            Self::GetTemplateId => 0x11,
            Self::Init => 0x12,
            Self::LoadDb => 0x0B,
            Self::StoreDb => 0x0C,
            Self::SetAuthChallenge => 0x01,
            Self::GetAuthChallenge => 0x02,
            Self::AuthorizeEnrol => 0x03,
            Self::GetAuthResult => 0x04,
            Self::SetKeyData => 0x05,
            Self::IsUserValid => 0x07,
            Self::GetSensorInfo => 0x03,
            Self::SetQcAuthNonce => 0x01,
            Self::GetQcAuthResult => 0x02,
        }
    }

    /// Symbolic name used in log output.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::BeginEnrol => "FPC_BEGIN_ENROL",
            Self::EnrolStep => "FPC_ENROL_STEP",
            Self::EndEnrol => "FPC_END_ENROL",
            Self::Identify => "FPC_IDENTIFY",
            Self::UpdateTemplate => "FPC_UPDATE_TEMPLATE",
            Self::WaitFingerLost => "FPC_WAIT_FINGER_LOST",
            Self::WaitFingerDown => "FPC_WAIT_FINGER_DOWN",
            Self::GetFingerStatus => "FPC_GET_FINGER_STATUS",
            Self::LoadEmptyDb => "FPC_LOAD_EMPTY_DB",
            Self::GetFingerprints => "FPC_GET_FINGERPRINTS",
            Self::DeleteFingerprint => "FPC_DELETE_FINGERPRINT",
            Self::CaptureImage => "FPC_CAPTURE_IMAGE",
            Self::SetGid => "FPC_SET_GID",
            Self::GetTemplateId => "FPC_GET_TEMPLATE_ID",
            Self::Init => "FPC_INIT",
            Self::LoadDb => "FPC_LOAD_DB",
            Self::StoreDb => "FPC_STORE_DB",
            Self::SetAuthChallenge => "FPC_SET_AUTH_CHALLENGE",
            Self::GetAuthChallenge => "FPC_GET_AUTH_CHALLENGE",
            Self::AuthorizeEnrol => "FPC_AUTHORIZE_ENROL",
            Self::GetAuthResult => "FPC_GET_AUTH_RESULT",
            Self::SetKeyData => "FPC_SET_KEY_DATA",
            Self::IsUserValid => "FPC_IS_USER_VALID",
            Self::GetSensorInfo => "FPC_GET_SENSOR_INFO",
            Self::SetQcAuthNonce => "FPC_SET_QC_AUTH_NONCE",
            Self::GetQcAuthResult => "FPC_GET_QC_AUTH_RESULT",
        }
    }

    /// Resolve a (group, command id) header pair.
    #[must_use]
    pub fn from_ids(group_id: u32, cmd_id: u32) -> Option<Self> {
        let group = CommandGroup::from_u32(group_id)?;
        ALL_COMMANDS
            .iter()
            .copied()
            .find(|cmd| cmd.group() == group && cmd.id() == cmd_id)
    }

    /// Every command known to the protocol.
    #[must_use]
    pub fn all() -> &'static [Command] {
        &ALL_COMMANDS
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}
