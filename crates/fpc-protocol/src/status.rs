//! Trustlet error codes.
//!
//! The fingerprint trustlet reports failures as small negative integers.
//! They are only used to make log lines readable; callers propagate the
//! numeric code unchanged.

/// Symbolic name of a trustlet error code.
///
/// # Examples
///
/// ```
/// use fpc_protocol::applet_error_name;
///
/// assert_eq!(applet_error_name(-10), "FPC_ERROR_CONFIG");
/// assert_eq!(applet_error_name(-1), "FPC_ERROR_INPUT");
/// assert_eq!(applet_error_name(0), "FPC_ERROR_UNKNOWN");
/// ```
#[must_use]
pub fn applet_error_name(code: i32) -> &'static str {
    match code.saturating_add(10) {
        0 => "FPC_ERROR_CONFIG",
        1 => "FPC_ERROR_HARDWARE",
        2 => "FPC_ERROR_NOENTITY",
        3 => "FPC_ERROR_CANCELLED",
        4 => "FPC_ERROR_IO",
        5 => "FPC_ERROR_NOSPACE",
        6 => "FPC_ERROR_COMM",
        7 => "FPC_ERROR_ALLOC",
        8 => "FPC_ERROR_TIMEDOUT",
        9 => "FPC_ERROR_INPUT",
        _ => "FPC_ERROR_UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(-10, "FPC_ERROR_CONFIG")]
    #[case(-9, "FPC_ERROR_HARDWARE")]
    #[case(-8, "FPC_ERROR_NOENTITY")]
    #[case(-7, "FPC_ERROR_CANCELLED")]
    #[case(-6, "FPC_ERROR_IO")]
    #[case(-5, "FPC_ERROR_NOSPACE")]
    #[case(-4, "FPC_ERROR_COMM")]
    #[case(-3, "FPC_ERROR_ALLOC")]
    #[case(-2, "FPC_ERROR_TIMEDOUT")]
    #[case(-1, "FPC_ERROR_INPUT")]
    #[case(0, "FPC_ERROR_UNKNOWN")]
    #[case(-11, "FPC_ERROR_UNKNOWN")]
    #[case(i32::MAX, "FPC_ERROR_UNKNOWN")]
    fn test_error_names(#[case] code: i32, #[case] name: &str) {
        assert_eq!(applet_error_name(code), name);
    }
}
