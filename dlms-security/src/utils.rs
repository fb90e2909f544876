//! Security utility functions for DLMS/COSEM

use crate::block_cipher::AesBlockCipher;
use crate::error::{SecurityError, SecurityResult};
use crate::xdlms::CipherKey;
use ring::rand::{SecureRandom, SystemRandom};

/// Key ID for different key types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyId {
    /// Global unicast encryption key
    GlobalUnicastEncryptionKey = 0,
    /// Global broadcast encryption key
    GlobalBroadcastEncryptionKey = 1,
    /// Authentication key
    AuthenticationKey = 2,
}

impl KeyId {
    /// Get key ID value
    pub fn id(&self) -> u8 {
        *self as u8
    }

    /// Get key ID from value
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(KeyId::GlobalUnicastEncryptionKey),
            1 => Some(KeyId::GlobalBroadcastEncryptionKey),
            2 => Some(KeyId::AuthenticationKey),
            _ => None,
        }
    }
}

/// Generate a random AES-128 key
pub fn generate_aes128_key() -> SecurityResult<CipherKey> {
    let rng = SystemRandom::new();
    let mut key = [0u8; 16];
    rng.fill(&mut key).map_err(|_| SecurityError::Random)?;
    Ok(CipherKey::new(key))
}

const KEY_WRAP_IV: [u8; 8] = [0xA6; 8];

/// Wrap a key using AES key wrap (RFC 3394)
///
/// Used when transferring new global keys to a meter. The key to wrap must
/// be at least 16 bytes and a multiple of 8 bytes.
pub fn wrap_aes_rfc3394_key(kek: &CipherKey, key: &[u8]) -> SecurityResult<Vec<u8>> {
    if key.len() < 16 || key.len() % 8 != 0 {
        return Err(SecurityError::InvalidKeyLength {
            field: "wrapped key",
            expected: 16,
            actual: key.len(),
        });
    }

    let cipher = AesBlockCipher::new(kek.as_bytes());
    let n = key.len() / 8;
    let mut a = KEY_WRAP_IV;
    let mut r: Vec<[u8; 8]> = key
        .chunks_exact(8)
        .map(|chunk| {
            let mut block = [0u8; 8];
            block.copy_from_slice(chunk);
            block
        })
        .collect();

    for j in 0..6 {
        for (i, ri) in r.iter_mut().enumerate() {
            let mut block = [0u8; 16];
            block[..8].copy_from_slice(&a);
            block[8..].copy_from_slice(ri);
            let b = cipher.encrypt_block(&block);

            let t = ((n * j + i + 1) as u64).to_be_bytes();
            for k in 0..8 {
                a[k] = b[k] ^ t[k];
            }
            ri.copy_from_slice(&b[8..]);
        }
    }

    let mut wrapped = Vec::with_capacity(8 * (n + 1));
    wrapped.extend_from_slice(&a);
    for block in &r {
        wrapped.extend_from_slice(block);
    }
    Ok(wrapped)
}
