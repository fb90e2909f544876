//! xDLMS key material
//!
//! - [`SystemTitle`]: 8-byte identifier of a communication partner, the high
//!   part of every GCM nonce
//! - [`CipherKey`]: 16-byte block cipher or authentication key
//! - [`KeyDerivationFunction`]: derivation of global keys from a master key
//!
//! Sizes are checked when a value is created, so no cryptographic operation
//! ever sees a key or title of the wrong length.

use crate::block_cipher::{AesBlockCipher, KEY_SIZE};
use crate::error::{SecurityResult, check_length};
use crate::utils::KeyId;
use std::fmt;

/// System Title length in bytes
pub const SYSTEM_TITLE_SIZE: usize = 8;

/// System Title
///
/// An 8-byte identifier that uniquely identifies a DLMS/COSEM device.
///
/// # Format
/// System Title is typically:
/// - 3 bytes: Manufacturer ID (FLAG id)
/// - 5 bytes: Device serial number
///
/// # Usage
/// Exchanged in the AARQ/AARE and used as the first 8 bytes of the GCM
/// nonce, followed by the frame counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SystemTitle {
    value: [u8; SYSTEM_TITLE_SIZE],
}

impl SystemTitle {
    /// Create a new System Title from bytes
    pub fn new(bytes: [u8; SYSTEM_TITLE_SIZE]) -> Self {
        Self { value: bytes }
    }

    /// Create System Title from slice
    ///
    /// # Errors
    /// Returns `InvalidKeyLength` if the slice is not exactly 8 bytes
    pub fn from_slice(bytes: &[u8]) -> SecurityResult<Self> {
        check_length("system title", SYSTEM_TITLE_SIZE, bytes)?;
        let mut value = [0u8; SYSTEM_TITLE_SIZE];
        value.copy_from_slice(bytes);
        Ok(Self { value })
    }

    /// Get the System Title as bytes
    pub fn as_bytes(&self) -> &[u8; SYSTEM_TITLE_SIZE] {
        &self.value
    }

    /// Get the System Title as slice
    pub fn as_slice(&self) -> &[u8] {
        &self.value
    }
}

impl TryFrom<&[u8]> for SystemTitle {
    type Error = crate::error::SecurityError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_slice(bytes)
    }
}

/// AES-128 key (block cipher key or authentication key)
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct CipherKey {
    value: [u8; KEY_SIZE],
}

impl CipherKey {
    /// Create a key from bytes
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self { value: bytes }
    }

    /// Create a key from a slice
    ///
    /// # Errors
    /// Returns `InvalidKeyLength` naming `field` if the slice is not 16 bytes
    pub fn from_slice(field: &'static str, bytes: &[u8]) -> SecurityResult<Self> {
        check_length(field, KEY_SIZE, bytes)?;
        let mut value = [0u8; KEY_SIZE];
        value.copy_from_slice(bytes);
        Ok(Self { value })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.value
    }
}

// Keys never end up in logs.
impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

/// Key Derivation Function (KDF)
///
/// Derives global keys from a master key (KEK):
///
/// 1. Build input block: System Title (8 bytes) || Key ID (1 byte) || zero padding (7 bytes)
/// 2. Encrypt the block with AES-128 under the master key
/// 3. The encrypted block is the derived key
pub struct KeyDerivationFunction;

impl KeyDerivationFunction {
    /// Derive a key from master key
    ///
    /// # Example
    /// ```
    /// use dlms_security::xdlms::{CipherKey, SystemTitle, KeyDerivationFunction};
    /// use dlms_security::utils::KeyId;
    ///
    /// let master_key = CipherKey::new([0u8; 16]);
    /// let system_title = SystemTitle::new([1, 2, 3, 4, 5, 6, 7, 8]);
    /// let derived = KeyDerivationFunction::derive_key(
    ///     &master_key,
    ///     &system_title,
    ///     KeyId::GlobalUnicastEncryptionKey,
    /// );
    /// assert_ne!(derived, master_key);
    /// ```
    pub fn derive_key(master_key: &CipherKey, system_title: &SystemTitle, key_id: KeyId) -> CipherKey {
        let mut input_block = [0u8; 16];
        input_block[0..8].copy_from_slice(system_title.as_bytes());
        input_block[8] = key_id.id();

        let cipher = AesBlockCipher::new(master_key.as_bytes());
        CipherKey::new(cipher.encrypt_block(&input_block))
    }

    /// Derive encryption key for unicast communication
    pub fn derive_unicast_encryption_key(master_key: &CipherKey, system_title: &SystemTitle) -> CipherKey {
        Self::derive_key(master_key, system_title, KeyId::GlobalUnicastEncryptionKey)
    }

    /// Derive encryption key for broadcast communication
    pub fn derive_broadcast_encryption_key(master_key: &CipherKey, system_title: &SystemTitle) -> CipherKey {
        Self::derive_key(master_key, system_title, KeyId::GlobalBroadcastEncryptionKey)
    }

    /// Derive authentication key
    pub fn derive_authentication_key(master_key: &CipherKey, system_title: &SystemTitle) -> CipherKey {
        Self::derive_key(master_key, system_title, KeyId::AuthenticationKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SecurityError;

    #[test]
    fn test_system_title() {
        let title = SystemTitle::new([1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(title.as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8]);

        let title2 = SystemTitle::from_slice(b"ABCDEFGH").unwrap();
        assert_eq!(title2.as_slice(), b"ABCDEFGH");
    }

    #[test]
    fn test_system_title_length_is_enforced() {
        for len in [0usize, 7, 9, 16] {
            let bytes = vec![0u8; len];
            match SystemTitle::from_slice(&bytes) {
                Err(SecurityError::InvalidKeyLength { expected, actual, .. }) => {
                    assert_eq!(expected, 8);
                    assert_eq!(actual, len);
                }
                other => panic!("unexpected result for length {}: {:?}", len, other),
            }
        }
    }

    #[test]
    fn test_key_length_is_enforced() {
        assert!(CipherKey::from_slice("block cipher key", &[0u8; 15]).is_err());
        assert!(CipherKey::from_slice("authentication key", &[0u8; 17]).is_err());
        let key = CipherKey::from_slice("block cipher key", &[9u8; 16]).unwrap();
        assert_eq!(key.as_bytes(), &[9u8; 16]);
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = CipherKey::new([0xAB; 16]);
        assert_eq!(format!("{:?}", key), "CipherKey(..)");
    }

    #[test]
    fn test_kdf_matches_block_encryption() {
        let master_key = CipherKey::new([
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D,
            0x0E, 0x0F,
        ]);
        let system_title = SystemTitle::new([0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17]);

        let derived = KeyDerivationFunction::derive_unicast_encryption_key(&master_key, &system_title);
        let mut block = [0u8; 16];
        block[..8].copy_from_slice(system_title.as_bytes());
        let expected = AesBlockCipher::new(master_key.as_bytes()).encrypt_block(&block);
        assert_eq!(derived.as_bytes(), &expected);
    }

    #[test]
    fn test_kdf_key_ids_differ() {
        let master_key = CipherKey::new([0xAA; 16]);
        let system_title = SystemTitle::new([0xBB; 8]);

        let unicast = KeyDerivationFunction::derive_unicast_encryption_key(&master_key, &system_title);
        let broadcast = KeyDerivationFunction::derive_broadcast_encryption_key(&master_key, &system_title);
        let auth = KeyDerivationFunction::derive_authentication_key(&master_key, &system_title);
        assert_ne!(unicast, broadcast);
        assert_ne!(unicast, auth);
        assert_ne!(broadcast, auth);

        let again = KeyDerivationFunction::derive_unicast_encryption_key(&master_key, &system_title);
        assert_eq!(unicast, again);
    }

    #[test]
    fn test_kdf_different_system_titles() {
        let master_key = CipherKey::new([0u8; 16]);
        let key1 = KeyDerivationFunction::derive_unicast_encryption_key(
            &master_key,
            &SystemTitle::new([1, 2, 3, 4, 5, 6, 7, 8]),
        );
        let key2 = KeyDerivationFunction::derive_unicast_encryption_key(
            &master_key,
            &SystemTitle::new([9, 10, 11, 12, 13, 14, 15, 16]),
        );
        assert_ne!(key1, key2);
    }
}
