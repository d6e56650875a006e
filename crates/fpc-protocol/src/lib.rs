pub mod buffer;
pub mod commands;
pub mod keymaster;
pub mod record;
pub mod records;
pub mod status;

pub use buffer::BufferCommand;
pub use commands::{Command, CommandGroup};
pub use keymaster::{KeymasterRequest, KeymasterResponse};
pub use record::{Header, Record, decode_record, encode_record};
pub use records::{
    AuthChallenge, AuthResult, DeleteFingerprint, EndEnroll, EnrollStep, FingerprintList,
    Identify, SetGid, StandardCommand, TemplateId,
};
pub use status::applet_error_name;
