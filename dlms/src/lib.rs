//! dlms - transport security for the DLMS/COSEM protocol
//!
//! This library ciphers and authenticates xDLMS APDUs the way smart meters
//! expect them on the wire, and computes the HLS challenge responses used
//! while an association is established.
//!
//! # Architecture
//!
//! - `dlms-core`: error type, byte buffer with A-XDR length encoding, APDU tags
//! - `dlms-security`: AES-128, GHASH, GCM, the ciphered APDU envelope,
//!   per-association security settings and HLS authentication
//!
//! # Usage
//!
//! ```
//! use dlms::{ByteBuffer, Command, SecurityPolicy, SecuritySettings};
//!
//! let mut client = SecuritySettings::builder()
//!     .set_security_policy(SecurityPolicy::AuthenticationEncryption)
//!     .set_system_title(b"CLIENT01".to_vec())
//!     .set_source_system_title(b"METER001".to_vec())
//!     .set_block_cipher_key(vec![0x11; 16])
//!     .set_authentication_key(vec![0x22; 16])
//!     .build()?;
//! let mut meter = SecuritySettings::builder()
//!     .set_security_policy(SecurityPolicy::AuthenticationEncryption)
//!     .set_system_title(b"METER001".to_vec())
//!     .set_source_system_title(b"CLIENT01".to_vec())
//!     .set_block_cipher_key(vec![0x11; 16])
//!     .set_authentication_key(vec![0x22; 16])
//!     .build()?;
//!
//! let frame = client.encrypt(Command::GetRequest, &[0x01, 0x02])?;
//! let mut buffer = ByteBuffer::from(frame);
//! assert_eq!(meter.decrypt(&mut buffer)?, Command::GloGetRequest);
//! assert_eq!(buffer.as_slice(), &[0x01, 0x02]);
//! # Ok::<(), dlms::SecurityError>(())
//! ```

// Re-export core types
pub use dlms_core::{ByteBuffer, Command, DlmsError, DlmsResult};

// Re-export the security layer
pub use dlms_security::{
    AuthenticationChallengeEngine, AuthenticationMechanism, CipherKey, CipherParameters,
    DlmsCipheringEngine, HlsHandshake, OutputShape, SecurityConfig, SecurityError,
    SecurityPolicy, SecurityResult, SecuritySettings, SystemTitle,
};

pub mod security {
    pub use dlms_security::*;
}
