//! Security layer for DLMS/COSEM
//!
//! This crate implements the transport security of xDLMS APDUs:
//!
//! - [`block_cipher`]: table-driven AES-128 (forward transform)
//! - [`ghash`]: GHASH multiplication with precomputed tables
//! - [`gcm`]: streaming GCM with the 12-byte DLMS tag
//! - [`ciphering`]: ciphered APDU envelope (`glo-*` tags)
//! - [`settings`]: keys, system titles and the frame counter of an association
//! - [`authentication`] and [`auth_flow`]: HLS challenge-response
//! - [`xdlms`] and [`utils`]: key material, key derivation and key wrapping

pub mod auth_flow;
pub mod authentication;
pub mod block_cipher;
pub mod ciphering;
pub mod constants;
pub mod error;
pub mod gcm;
pub mod ghash;
pub mod settings;
pub mod suite;
pub mod utils;
pub mod xdlms;

pub use auth_flow::{HandshakeState, HlsHandshake};
pub use authentication::{AuthenticationChallengeEngine, HlsKeys};
pub use block_cipher::AesBlockCipher;
pub use ciphering::{CipherParameters, DlmsCipheringEngine, OutputShape, TraceSink};
pub use error::{SecurityError, SecurityResult};
pub use gcm::{AeadCipher, GcmCipher, GcmCipherStream, TAG_SIZE};
pub use ghash::GhashTables;
pub use settings::{SecurityConfig, SecuritySettings, SecuritySettingsBuilder};
pub use suite::{AuthenticationMechanism, SecurityPolicy};
pub use xdlms::{CipherKey, KeyDerivationFunction, SystemTitle};
