//! Core constants shared by the fingerprint HAL crates.
//!
//! These values mirror the limits of the FPC1145 trustlet and the Android
//! fingerprint HAL contract. Changing them breaks compatibility with the
//! secure applet or with the framework.
//!
//! # Usage
//!
//! ```
//! use fpc_core::constants::*;
//!
//! assert_eq!(AUTH_TOKEN_LENGTH, 69);
//! assert!(MAX_FINGERPRINTS <= 5);
//! ```

// ============================================================================
// Secure applet limits
// ============================================================================

/// Maximum number of prints the applet reports in one listing.
pub const MAX_FINGERPRINTS: usize = 5;

/// Size of a serialized hardware authentication token in bytes.
///
/// The layout is version (1) + challenge (8) + user id (8) +
/// authenticator id (8) + authenticator type (4) + timestamp (8) + HMAC (32).
pub const AUTH_TOKEN_LENGTH: usize = 69;

/// Length of the HMAC trailing a hardware authentication token.
pub const AUTH_TOKEN_HMAC_LENGTH: usize = 32;

/// Authenticator type bit for fingerprint tokens (`HW_AUTH_FINGERPRINT`).
pub const AUTHENTICATOR_TYPE_FINGERPRINT: u32 = 1 << 1;

// ============================================================================
// Capture status markers
// ============================================================================

/// Capture status reported when the finger never left the sensor.
///
/// Values at or above this are informational markers, never acquisition
/// quality codes, and are not forwarded to `onAcquired`.
pub const CAPTURE_FINGER_STILL_DOWN: i32 = 1000;

/// Capture status reported when the finger-down wait was interrupted by a
/// pending worker transition.
pub const CAPTURE_INTERRUPTED: i32 = 1001;

/// Pause before checking again whether a resting finger has left.
pub const FINGER_LOST_POLL_INTERVAL_MS: u64 = 20;

// ============================================================================
// Storage
// ============================================================================

/// File name of the per-group user database inside the storage directory.
pub const USER_DB_FILE_NAME: &str = "user.db";

/// Suffix appended to the database path for the staging file.
pub const TEMP_DB_SUFFIX: &str = ".tmp";

/// Maximum accepted storage path length (`PATH_MAX`).
pub const MAX_STORAGE_PATH_LENGTH: usize = 4096;

// ============================================================================
// Worker
// ============================================================================

/// Default time a caller waits for the worker to acknowledge a transition.
pub const DEFAULT_TRANSITION_TIMEOUT_MS: u64 = 3000;

/// Name given to the background worker thread.
pub const WORKER_THREAD_NAME: &str = "fpc-worker";
