//! Error type shared by the DLMS crates

use thiserror::Error;

/// Error surface seen by layers above the security engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DlmsError {
    /// An APDU tag or structure that the protocol does not define
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Ciphering, deciphering or authentication failed
    #[error("Security error: {0}")]
    Security(String),

    /// Malformed or truncated bytes
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for DLMS operations
pub type DlmsResult<T> = Result<T, DlmsError>;
