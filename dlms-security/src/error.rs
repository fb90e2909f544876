//! Error types for the security layer

use dlms_core::DlmsError;
use thiserror::Error;

/// Errors reported by the ciphering engine and HLS authentication
#[derive(Error, Debug)]
pub enum SecurityError {
    /// A key or system title of the wrong size was assigned
    #[error("Invalid {field} length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The recomputed authentication tag does not match the received one
    #[error("Decrypt failed. Invalid tag.")]
    InvalidTag,

    /// The APDU tag is not one of the ciphered APDUs
    #[error("Unknown ciphered command: 0x{0:02X}")]
    UnknownCommand(u8),

    /// The security policy is not one the engine can process
    #[error("Unsupported security policy: 0x{0:02X}")]
    UnsupportedSecurityPolicy(u8),

    /// The authentication mechanism id is not defined by DLMS
    #[error("Unknown authentication mechanism: {0}")]
    UnknownMechanism(u8),

    /// The frame counter of a received frame was already seen
    #[error("Replayed frame: counter {received} is not greater than {last}")]
    ReplayedFrame { received: u32, last: u32 },

    /// A key required for the operation is not configured
    #[error("{0} is not set")]
    MissingKey(&'static str),

    /// Ciphered data is shorter than its header claims
    #[error("Ciphered data truncated: {0}")]
    Truncated(String),

    /// The challenge does not fit the mechanism
    #[error("Challenge too long: at most {max} bytes, got {actual}")]
    ChallengeTooLong { max: usize, actual: usize },

    /// The frame counter reached its maximum; new keys are needed
    #[error("Frame counter exhausted")]
    CounterExhausted,

    /// An HLS handshake step was called out of order
    #[error("Invalid handshake state: {0}")]
    Handshake(&'static str),

    /// The system random generator failed
    #[error("Random generator failure")]
    Random,

    #[error(transparent)]
    Buffer(#[from] DlmsError),
}

/// Result type alias for security operations
pub type SecurityResult<T> = Result<T, SecurityError>;

impl From<SecurityError> for DlmsError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::Buffer(inner) => inner,
            other => DlmsError::Security(other.to_string()),
        }
    }
}

/// Check the size of a key, system title or similar fixed-size field
pub(crate) fn check_length(field: &'static str, expected: usize, bytes: &[u8]) -> SecurityResult<()> {
    if bytes.len() != expected {
        return Err(SecurityError::InvalidKeyLength {
            field,
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}
