//! Security policy and authentication mechanism definitions

use crate::constants::MECHANISM_NAME_PREFIX;
use crate::error::{SecurityError, SecurityResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Security policy byte of a ciphered APDU
///
/// The three policies the ciphering engine handles sit in bits 4 and 5.
/// Any other byte value (key agreement schemes: ephemeral or static unified
/// model, one-pass Diffie-Hellman, non-zero suite ids) is kept as
/// [`SecurityPolicy::Other`] so it round-trips unchanged; the engine refuses
/// to process it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum SecurityPolicy {
    /// No ciphering
    #[default]
    None,
    /// All messages authenticated (0x10)
    Authentication,
    /// All messages encrypted (0x20)
    Encryption,
    /// All messages authenticated and encrypted (0x30)
    AuthenticationEncryption,
    /// Any other policy byte
    Other(u8),
}

impl SecurityPolicy {
    /// Authentication bit
    pub const AUTHENTICATION_BIT: u8 = 0x10;
    /// Encryption bit
    pub const ENCRYPTION_BIT: u8 = 0x20;

    /// Decode from the policy byte
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => SecurityPolicy::None,
            0x10 => SecurityPolicy::Authentication,
            0x20 => SecurityPolicy::Encryption,
            0x30 => SecurityPolicy::AuthenticationEncryption,
            other => SecurityPolicy::Other(other),
        }
    }

    /// Get the policy byte
    pub fn to_byte(self) -> u8 {
        match self {
            SecurityPolicy::None => 0x00,
            SecurityPolicy::Authentication => 0x10,
            SecurityPolicy::Encryption => 0x20,
            SecurityPolicy::AuthenticationEncryption => 0x30,
            SecurityPolicy::Other(byte) => byte,
        }
    }

    /// Check if messages carry an authentication tag
    pub fn is_authenticated(self) -> bool {
        matches!(
            self,
            SecurityPolicy::Authentication | SecurityPolicy::AuthenticationEncryption
        )
    }

    /// Check if message bodies are encrypted
    pub fn is_encrypted(self) -> bool {
        matches!(
            self,
            SecurityPolicy::Encryption | SecurityPolicy::AuthenticationEncryption
        )
    }

    /// Check if any ciphering applies
    pub fn is_ciphered(self) -> bool {
        self != SecurityPolicy::None
    }

    /// Reject policies the engine cannot process
    pub fn ensure_supported(self) -> SecurityResult<Self> {
        match self {
            SecurityPolicy::Authentication
            | SecurityPolicy::Encryption
            | SecurityPolicy::AuthenticationEncryption => Ok(self),
            other => Err(SecurityError::UnsupportedSecurityPolicy(other.to_byte())),
        }
    }
}

impl From<u8> for SecurityPolicy {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

impl From<SecurityPolicy> for u8 {
    fn from(policy: SecurityPolicy) -> Self {
        policy.to_byte()
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityPolicy::Other(byte) => write!(f, "Other(0x{:02X})", byte),
            policy => write!(f, "{:?}", policy),
        }
    }
}

/// Authentication mechanism negotiated in the AARQ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum AuthenticationMechanism {
    /// No authentication used
    #[default]
    None = 0,
    /// Shared password sent as secret
    Low = 1,
    /// Manufacturer specific, AES-ECB of the challenge
    High = 2,
    /// MD5 of challenge and secret
    HighMd5 = 3,
    /// SHA-1 of challenge and secret
    HighSha1 = 4,
    /// GMAC over the challenge
    HighGmac = 5,
    /// SHA-256 of challenge and secret
    HighSha256 = 6,
}

impl AuthenticationMechanism {
    /// Get mechanism ID
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Get mechanism from ID
    pub fn from_id(id: u8) -> SecurityResult<Self> {
        match id {
            0 => Ok(AuthenticationMechanism::None),
            1 => Ok(AuthenticationMechanism::Low),
            2 => Ok(AuthenticationMechanism::High),
            3 => Ok(AuthenticationMechanism::HighMd5),
            4 => Ok(AuthenticationMechanism::HighSha1),
            5 => Ok(AuthenticationMechanism::HighGmac),
            6 => Ok(AuthenticationMechanism::HighSha256),
            _ => Err(SecurityError::UnknownMechanism(id)),
        }
    }

    /// Check if this is an HLS mechanism (challenge-response)
    pub fn is_hls(self) -> bool {
        self.id() >= AuthenticationMechanism::High.id()
    }

    /// Mechanism name OID `{2, 16, 756, 5, 8, 2, id}`
    pub fn mechanism_name(self) -> Vec<u32> {
        let mut oid = MECHANISM_NAME_PREFIX.to_vec();
        oid.push(self.id() as u32);
        oid
    }

    /// Get mechanism from its name OID
    pub fn from_mechanism_name(oid: &[u32]) -> Option<Self> {
        match oid.split_last() {
            Some((&id, prefix)) if prefix == MECHANISM_NAME_PREFIX => {
                u8::try_from(id).ok().and_then(|id| Self::from_id(id).ok())
            }
            _ => None,
        }
    }
}

impl TryFrom<u8> for AuthenticationMechanism {
    type Error = SecurityError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::from_id(id)
    }
}

impl From<AuthenticationMechanism> for u8 {
    fn from(mechanism: AuthenticationMechanism) -> Self {
        mechanism.id()
    }
}
