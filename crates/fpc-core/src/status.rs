//! Status codes exchanged with the fingerprint framework.
//!
//! [`RequestStatus`] is what synchronous facade calls return.
//! [`FingerprintError`] and [`FingerprintAcquiredInfo`] travel through the
//! asynchronous callbacks.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::errno;

/// Result of a synchronous request, modelled on negated errno values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum RequestStatus {
    SysOk = 0,
    SysEnoent = -errno::ENOENT,
    SysEintr = -errno::EINTR,
    SysEio = -errno::EIO,
    SysEagain = -errno::EAGAIN,
    SysEnomem = -errno::ENOMEM,
    SysEacces = -errno::EACCES,
    SysEfault = -errno::EFAULT,
    SysEbusy = -errno::EBUSY,
    SysEinval = -errno::EINVAL,
    SysEnospc = -errno::ENOSPC,
    SysEtimedout = -errno::ETIMEDOUT,
    SysUnknown = 1,
}

impl RequestStatus {
    /// Map a status returned by the vendor library to a request status.
    ///
    /// Codes outside the known errno set collapse to [`RequestStatus::SysUnknown`].
    ///
    /// # Examples
    ///
    /// ```
    /// use fpc_core::RequestStatus;
    ///
    /// assert_eq!(RequestStatus::from_code(0), RequestStatus::SysOk);
    /// assert_eq!(RequestStatus::from_code(-16), RequestStatus::SysEbusy);
    /// assert_eq!(RequestStatus::from_code(-9), RequestStatus::SysUnknown);
    /// ```
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::SysOk,
            c if c == -errno::ENOENT => Self::SysEnoent,
            c if c == -errno::EINTR => Self::SysEintr,
            c if c == -errno::EIO => Self::SysEio,
            c if c == -errno::EAGAIN => Self::SysEagain,
            c if c == -errno::ENOMEM => Self::SysEnomem,
            c if c == -errno::EACCES => Self::SysEacces,
            c if c == -errno::EFAULT => Self::SysEfault,
            c if c == -errno::EBUSY => Self::SysEbusy,
            c if c == -errno::EINVAL => Self::SysEinval,
            c if c == -errno::ENOSPC => Self::SysEnospc,
            c if c == -errno::ETIMEDOUT => Self::SysEtimedout,
            _ => Self::SysUnknown,
        }
    }

    /// Raw numeric value of the status.
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, Self::SysOk)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SysOk => "OK",
            Self::SysEnoent => "ENOENT",
            Self::SysEintr => "EINTR",
            Self::SysEio => "EIO",
            Self::SysEagain => "EAGAIN",
            Self::SysEnomem => "ENOMEM",
            Self::SysEacces => "EACCES",
            Self::SysEfault => "EFAULT",
            Self::SysEbusy => "EBUSY",
            Self::SysEinval => "EINVAL",
            Self::SysEnospc => "ENOSPC",
            Self::SysEtimedout => "ETIMEDOUT",
            Self::SysUnknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Error reported through `onError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum FingerprintError {
    HwUnavailable = 1,
    UnableToProcess = 2,
    Timeout = 3,
    NoSpace = 4,
    Canceled = 5,
    UnableToRemove = 6,
    Lockout = 7,
    Vendor = 8,
}

impl FingerprintError {
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Image acquisition feedback reported through `onAcquired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum FingerprintAcquiredInfo {
    Good = 0,
    Partial = 1,
    Insufficient = 2,
    ImagerDirty = 3,
    TooSlow = 4,
    TooFast = 5,
    Vendor = 6,
}

impl FingerprintAcquiredInfo {
    /// Interpret a capture status as acquisition feedback.
    ///
    /// Only genuine quality codes (`Good` through `TooFast`) are reported to
    /// the framework; informational markers and vendor codes yield `None`.
    #[must_use]
    pub fn from_capture_status(status: i32) -> Option<Self> {
        match status {
            0 => Some(Self::Good),
            1 => Some(Self::Partial),
            2 => Some(Self::Insufficient),
            3 => Some(Self::ImagerDirty),
            4 => Some(Self::TooSlow),
            5 => Some(Self::TooFast),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, RequestStatus::SysOk)]
    #[case(-2, RequestStatus::SysEnoent)]
    #[case(-4, RequestStatus::SysEintr)]
    #[case(-5, RequestStatus::SysEio)]
    #[case(-11, RequestStatus::SysEagain)]
    #[case(-12, RequestStatus::SysEnomem)]
    #[case(-13, RequestStatus::SysEacces)]
    #[case(-14, RequestStatus::SysEfault)]
    #[case(-16, RequestStatus::SysEbusy)]
    #[case(-22, RequestStatus::SysEinval)]
    #[case(-28, RequestStatus::SysEnospc)]
    #[case(-110, RequestStatus::SysEtimedout)]
    fn test_known_codes(#[case] code: i32, #[case] expected: RequestStatus) {
        assert_eq!(RequestStatus::from_code(code), expected);
        assert_eq!(expected.code(), code);
    }

    #[rstest]
    #[case(-1)]
    #[case(-9)]
    #[case(7)]
    #[case(i32::MIN)]
    fn test_unknown_codes(#[case] code: i32) {
        assert_eq!(RequestStatus::from_code(code), RequestStatus::SysUnknown);
    }

    #[test]
    fn test_acquired_threshold() {
        assert_eq!(
            FingerprintAcquiredInfo::from_capture_status(0),
            Some(FingerprintAcquiredInfo::Good)
        );
        assert_eq!(
            FingerprintAcquiredInfo::from_capture_status(5),
            Some(FingerprintAcquiredInfo::TooFast)
        );
        assert_eq!(FingerprintAcquiredInfo::from_capture_status(6), None);
        assert_eq!(FingerprintAcquiredInfo::from_capture_status(1000), None);
        assert_eq!(FingerprintAcquiredInfo::from_capture_status(1001), None);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(RequestStatus::SysEbusy.to_string(), "EBUSY");
        assert_eq!(RequestStatus::SysUnknown.to_string(), "UNKNOWN");
    }

    proptest! {
        #[test]
        fn prop_from_code_is_stable(code in any::<i32>()) {
            let status = RequestStatus::from_code(code);
            if status != RequestStatus::SysUnknown {
                prop_assert_eq!(status.code(), code);
            }
        }
    }
}
