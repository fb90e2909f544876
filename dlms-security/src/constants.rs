//! DLMS/COSEM security constants
//!
//! Application context names and authentication mechanism names as carried
//! in AARQ/AARE. The object identifiers come from the DLMS Green Book.

/// Application Context Name for Logical Name Referencing without ciphering
///
/// OID: {2, 16, 756, 5, 8, 1, 1}
pub const CONTEXT_LN_NO_CIPHER: &[u32] = &[2, 16, 756, 5, 8, 1, 1];

/// Application Context Name for Short Name Referencing without ciphering
///
/// OID: {2, 16, 756, 5, 8, 1, 2}
pub const CONTEXT_SN_NO_CIPHER: &[u32] = &[2, 16, 756, 5, 8, 1, 2];

/// Application Context Name for Logical Name Referencing with ciphering
///
/// OID: {2, 16, 756, 5, 8, 1, 3}
pub const CONTEXT_LN_CIPHER: &[u32] = &[2, 16, 756, 5, 8, 1, 3];

/// Application Context Name for Short Name Referencing with ciphering
///
/// OID: {2, 16, 756, 5, 8, 1, 4}
pub const CONTEXT_SN_CIPHER: &[u32] = &[2, 16, 756, 5, 8, 1, 4];

/// Prefix shared by all authentication mechanism names
///
/// The full name is this prefix followed by the mechanism id:
/// `{2, 16, 756, 5, 8, 2, id}`.
pub const MECHANISM_NAME_PREFIX: &[u32] = &[2, 16, 756, 5, 8, 2];

/// Challenge length used for HLS
///
/// The standard allows 8 to 64 bytes; several meters only accept 16.
pub const CHALLENGE_SIZE: usize = 16;

/// Pick the application context name for an association
pub fn application_context_name(logical_name: bool, ciphered: bool) -> &'static [u32] {
    match (logical_name, ciphered) {
        (true, false) => CONTEXT_LN_NO_CIPHER,
        (false, false) => CONTEXT_SN_NO_CIPHER,
        (true, true) => CONTEXT_LN_CIPHER,
        (false, true) => CONTEXT_SN_CIPHER,
    }
}
