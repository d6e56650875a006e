use crate::{
    Result,
    constants::{AUTH_TOKEN_HMAC_LENGTH, AUTH_TOKEN_LENGTH},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Opaque handle identifying one fingerprint service instance.
///
/// Returned from `setNotificationCallback` and passed back with every
/// callback so the framework can tell devices apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(u64);

impl DeviceId {
    /// Generate a fresh, non-zero device handle.
    #[must_use]
    pub fn generate() -> Self {
        let (high, low) = uuid::Uuid::new_v4().as_u64_pair();
        DeviceId((high ^ low) | 1)
    }

    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        DeviceId(raw)
    }

    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// User profile partition of enrolled prints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one enrolled template. Zero means "no print".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrintId(pub u32);

impl PrintId {
    pub const NONE: PrintId = PrintId(0);

    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PrintId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hardware authentication token proving a successful user verification.
///
/// Serialized as 69 bytes. The authenticator type and timestamp are stored
/// in network byte order, all other integers in host (little-endian) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwAuthToken {
    pub version: u8,
    pub challenge: u64,
    pub user_id: u64,
    pub authenticator_id: u64,
    pub authenticator_type: u32,
    pub timestamp: u64,
    pub hmac: [u8; AUTH_TOKEN_HMAC_LENGTH],
}

impl HwAuthToken {
    /// An all-zero token, reported when no authentication challenge is set.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: 0,
            challenge: 0,
            user_id: 0,
            authenticator_id: 0,
            authenticator_type: 0,
            timestamp: 0,
            hmac: [0; AUTH_TOKEN_HMAC_LENGTH],
        }
    }

    /// Parse a token from its serialized form.
    ///
    /// # Errors
    /// Returns `Error::InvalidRecord` if `bytes` is not exactly 69 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != AUTH_TOKEN_LENGTH {
            return Err(Error::InvalidRecord(format!(
                "auth token must be {AUTH_TOKEN_LENGTH} bytes, got {}",
                bytes.len()
            )));
        }

        let u64_le = |at: usize| u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap_or_default());
        let mut hmac = [0u8; AUTH_TOKEN_HMAC_LENGTH];
        hmac.copy_from_slice(&bytes[37..69]);

        Ok(Self {
            version: bytes[0],
            challenge: u64_le(1),
            user_id: u64_le(9),
            authenticator_id: u64_le(17),
            authenticator_type: u32::from_be_bytes(bytes[25..29].try_into().unwrap_or_default()),
            timestamp: u64::from_be_bytes(bytes[29..37].try_into().unwrap_or_default()),
            hmac,
        })
    }

    /// Serialize the token into its 69-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; AUTH_TOKEN_LENGTH] {
        let mut out = [0u8; AUTH_TOKEN_LENGTH];
        out[0] = self.version;
        out[1..9].copy_from_slice(&self.challenge.to_le_bytes());
        out[9..17].copy_from_slice(&self.user_id.to_le_bytes());
        out[17..25].copy_from_slice(&self.authenticator_id.to_le_bytes());
        out[25..29].copy_from_slice(&self.authenticator_type.to_be_bytes());
        out[29..37].copy_from_slice(&self.timestamp.to_be_bytes());
        out[37..69].copy_from_slice(&self.hmac);
        out
    }

    /// Bytes covered by the HMAC (everything but the HMAC itself).
    #[must_use]
    pub fn signed_bytes(&self) -> [u8; AUTH_TOKEN_LENGTH - AUTH_TOKEN_HMAC_LENGTH] {
        let mut out = [0u8; AUTH_TOKEN_LENGTH - AUTH_TOKEN_HMAC_LENGTH];
        out.copy_from_slice(&self.to_bytes()[..AUTH_TOKEN_LENGTH - AUTH_TOKEN_HMAC_LENGTH]);
        out
    }

    /// Compare the token's HMAC against `expected` in constant time.
    #[must_use]
    pub fn hmac_matches(&self, expected: &[u8; AUTH_TOKEN_HMAC_LENGTH]) -> bool {
        self.hmac.ct_eq(expected).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample_token() -> HwAuthToken {
        HwAuthToken {
            version: 0,
            challenge: 0x1122_3344_5566_7788,
            user_id: 42,
            authenticator_id: 7,
            authenticator_type: 2,
            timestamp: 1_700_000_000_000,
            hmac: [0xAB; AUTH_TOKEN_HMAC_LENGTH],
        }
    }

    #[test]
    fn test_token_layout() {
        let bytes = sample_token().to_bytes();
        assert_eq!(bytes.len(), AUTH_TOKEN_LENGTH);
        assert_eq!(&bytes[1..9], &0x1122_3344_5566_7788u64.to_le_bytes());
        // Authenticator type is big-endian on the wire.
        assert_eq!(&bytes[25..29], &[0, 0, 0, 2]);
        assert_eq!(HwAuthToken::from_bytes(&bytes).unwrap(), sample_token());
    }

    #[rstest]
    #[case(0)]
    #[case(68)]
    #[case(70)]
    fn test_token_wrong_length(#[case] len: usize) {
        let bytes = vec![0u8; len];
        assert!(matches!(
            HwAuthToken::from_bytes(&bytes),
            Err(Error::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_hmac_matches() {
        let token = sample_token();
        assert!(token.hmac_matches(&[0xAB; AUTH_TOKEN_HMAC_LENGTH]));
        assert!(!token.hmac_matches(&[0xAC; AUTH_TOKEN_HMAC_LENGTH]));
    }

    #[test]
    fn test_empty_token_is_zero() {
        assert!(HwAuthToken::empty().to_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_device_id_is_nonzero() {
        for _ in 0..16 {
            assert_ne!(DeviceId::generate().as_u64(), 0);
        }
    }

    #[test]
    fn test_print_id_none() {
        assert!(PrintId::NONE.is_none());
        assert!(!PrintId(3).is_none());
    }

    #[test]
    fn test_token_serde_roundtrip() {
        let json = serde_json::to_string(&sample_token()).unwrap();
        let back: HwAuthToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample_token());
    }
}
