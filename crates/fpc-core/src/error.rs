use thiserror::Error;

/// errno values used when an error has to be reported as a negative status.
pub mod errno {
    pub const ENOENT: i32 = 2;
    pub const EINTR: i32 = 4;
    pub const EIO: i32 = 5;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EACCES: i32 = 13;
    pub const EFAULT: i32 = 14;
    pub const EBUSY: i32 = 16;
    pub const EINVAL: i32 = 22;
    pub const ENOSPC: i32 = 28;
    pub const ETIMEDOUT: i32 = 110;
}

#[derive(Error, Debug)]
pub enum Error {
    // Protocol errors
    #[error("Invalid command record: {0}")]
    InvalidRecord(String),

    #[error("Buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("Secure applet command {command} failed with status {status}")]
    Applet { command: String, status: i32 },

    #[error("Secure world transport failed: {0}")]
    Transport(String),

    // Hardware errors
    #[error("Hardware operation failed: {0}")]
    HardwareError(String),

    // Worker errors
    #[error("Worker busy: cannot move from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Timed out after {timeout_ms}ms waiting for worker to enter {state}")]
    TransitionTimeout { state: String, timeout_ms: u64 },

    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    // Device lifecycle
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Device poisoned by earlier fatal error: {0}")]
    Poisoned(String),

    #[error("Notification callback not registered")]
    CallbackNotRegistered,

    // Storage errors
    #[error("Invalid storage path: {0}")]
    InvalidStoragePath(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an applet error for a named command.
    pub fn applet(command: impl Into<String>, status: i32) -> Self {
        Self::Applet {
            command: command.into(),
            status,
        }
    }

    /// Whether the error leaves the device in a state that cannot be
    /// continued from. Fatal errors are returned to the host instead of
    /// being folded into a request status.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::TransitionTimeout { .. }
                | Error::WorkerUnavailable(_)
                | Error::InitializationFailed(_)
                | Error::Poisoned(_)
        )
    }

    /// Negative errno-style code for this error.
    ///
    /// Applet errors keep the code the applet returned.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Error::Applet { status, .. } => *status,
            Error::InvalidRecord(_) | Error::BufferTooSmall { .. } => -errno::EINVAL,
            Error::InvalidStoragePath(_) | Error::Config(_) => -errno::EINVAL,
            Error::InvalidStateTransition { .. } => -errno::EBUSY,
            Error::TransitionTimeout { .. } => -errno::ETIMEDOUT,
            Error::CallbackNotRegistered => -errno::EFAULT,
            Error::Transport(_)
            | Error::HardwareError(_)
            | Error::WorkerUnavailable(_)
            | Error::InitializationFailed(_)
            | Error::Poisoned(_)
            | Error::Io(_) => -errno::EIO,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(
            Error::TransitionTimeout {
                state: "Pause".into(),
                timeout_ms: 3000
            }
            .is_fatal()
        );
        assert!(Error::WorkerUnavailable("gone".into()).is_fatal());
        assert!(!Error::applet("FPC_IDENTIFY", -4).is_fatal());
        assert!(
            !Error::InvalidStateTransition {
                from: "Enroll".into(),
                to: "Authenticate".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_errno_keeps_applet_status() {
        assert_eq!(Error::applet("FPC_SET_GID", -8).errno(), -8);
        assert_eq!(
            Error::InvalidStoragePath("".into()).errno(),
            -errno::EINVAL
        );
        assert_eq!(
            Error::InvalidStateTransition {
                from: "Enroll".into(),
                to: "Pause".into()
            }
            .errno(),
            -errno::EBUSY
        );
    }

    #[test]
    fn test_error_display() {
        let error = Error::applet("FPC_ENROL_STEP", -9);
        assert_eq!(
            error.to_string(),
            "Secure applet command FPC_ENROL_STEP failed with status -9"
        );
    }
}
