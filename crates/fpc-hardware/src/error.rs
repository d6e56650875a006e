//! Error types for secure environment and sensor operations.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while talking to the secure world or the sensor.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Device node or channel is gone.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// A trustlet image could not be found or started.
    #[error("Trustlet {name} could not be loaded from {path}")]
    TrustletNotFound { path: String, name: String },

    /// Operation on a trustlet handle that is not loaded.
    #[error("Trustlet {name} is not loaded")]
    TrustletNotLoaded { name: String },

    /// Shared memory allocation failed.
    #[error("Shared memory allocation of {len} bytes failed")]
    AllocationFailed { len: usize },

    /// Secure world call failed before the trustlet produced a status.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Invalid data received from the device.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Sensor power control failed.
    #[error("Sensor power control failed: {message}")]
    PowerFailure { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl HardwareError {
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    pub fn trustlet_not_found(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::TrustletNotFound {
            path: path.into(),
            name: name.into(),
        }
    }

    pub fn trustlet_not_loaded(name: impl Into<String>) -> Self {
        Self::TrustletNotLoaded { name: name.into() }
    }

    pub fn allocation_failed(len: usize) -> Self {
        Self::AllocationFailed { len }
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn power(message: impl Into<String>) -> Self {
        Self::PowerFailure {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<HardwareError> for fpc_core::Error {
    fn from(error: HardwareError) -> Self {
        match error {
            HardwareError::CommunicationError { message } => fpc_core::Error::Transport(message),
            HardwareError::Io(e) => fpc_core::Error::Io(e),
            other => fpc_core::Error::HardwareError(other.to_string()),
        }
    }
}
