//! Galois/Counter Mode with the DLMS tag profile
//!
//! [`GcmCipherStream`] ciphers one message: it is seeded with the nonce and
//! the additional authenticated data, accepts the payload in chunks of any
//! size and produces the output plus a 12-byte tag when it is flushed.
//!
//! # Algorithm (NIST SP 800-38D)
//! ```text
//! J0      = nonce(12) || 00 00 00 01
//! S       = GHASH_H(AAD)
//! for each 16-byte block B_i:
//!     counter = inc32(counter)
//!     C_i     = B_i XOR E_K(counter)        (skipped for Authentication)
//!     S       = (S XOR C_i) · H             (ciphertext in both directions)
//! S       = (S XOR [len(AAD)·8 || len(C)·8]) · H
//! tag     = MSB_96(E_K(J0) XOR S)
//! ```
//!
//! The encryption-only policy produces no tag and skips GHASH entirely.

use crate::block_cipher::{AesBlockCipher, BLOCK_SIZE, KEY_SIZE};
use crate::error::{SecurityError, SecurityResult};
use crate::ghash::GhashTables;
use crate::suite::SecurityPolicy;
use subtle::ConstantTimeEq;

/// Length of the truncated DLMS authentication tag
pub const TAG_SIZE: usize = 12;

/// Length of the GCM nonce (system title + frame counter)
pub const NONCE_SIZE: usize = 12;

/// Truncated authentication tag
pub type Tag = [u8; TAG_SIZE];

/// Build the DLMS nonce: `system_title(8) || frame_counter(4, big-endian)`
pub fn build_nonce(system_title: &[u8; 8], frame_counter: u32) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..8].copy_from_slice(system_title);
    nonce[8..].copy_from_slice(&frame_counter.to_be_bytes());
    nonce
}

/// Direction of a cipher stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// Outcome of the tag computation when a stream is finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStatus {
    /// The policy carries no tag
    NotAuthenticated,
    /// A tag was computed for an outgoing message
    Computed(Tag),
    /// The received tag matched
    Verified,
    /// The received tag did not match
    Mismatch,
    /// Decryption of an authenticated message was started without a tag
    Missing,
}

/// Result of sealing a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Ciphertext, or the unchanged payload under the authentication policy
    pub data: Vec<u8>,
    /// Authentication tag, absent for the encryption-only policy
    pub tag: Option<Tag>,
}

/// Result of opening a message, before the caller decides about the tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    /// Recovered bytes
    pub data: Vec<u8>,
    /// Tag verification outcome
    pub status: TagStatus,
}

impl Opened {
    /// Recovered bytes if the tag verified (or none was expected)
    pub fn into_verified(self) -> SecurityResult<Vec<u8>> {
        match self.status {
            TagStatus::Mismatch => Err(SecurityError::InvalidTag),
            TagStatus::Missing => Err(SecurityError::Truncated(
                "authentication tag missing".to_string(),
            )),
            _ => Ok(self.data),
        }
    }
}

/// Authenticated encryption with associated data, as used for DLMS APDUs
pub trait AeadCipher {
    /// Encrypt and/or authenticate `plaintext` according to `policy`
    fn seal(
        &self,
        policy: SecurityPolicy,
        nonce: &[u8; NONCE_SIZE],
        aad: &[u8],
        plaintext: &[u8],
    ) -> SecurityResult<Sealed>;

    /// Decrypt and/or check `ciphertext`, reporting the tag outcome
    fn open(
        &self,
        policy: SecurityPolicy,
        nonce: &[u8; NONCE_SIZE],
        aad: &[u8],
        ciphertext: &[u8],
        tag: Option<&Tag>,
    ) -> SecurityResult<Opened>;

    /// Decrypt and fail with `InvalidTag` if the tag does not verify
    fn decrypt(
        &self,
        policy: SecurityPolicy,
        nonce: &[u8; NONCE_SIZE],
        aad: &[u8],
        ciphertext: &[u8],
        tag: Option<&Tag>,
    ) -> SecurityResult<Vec<u8>> {
        self.open(policy, nonce, aad, ciphertext, tag)?.into_verified()
    }
}

/// AES-128-GCM key material: round keys and GHASH tables for `H = E_K(0)`
#[derive(Debug, Clone)]
pub struct GcmCipher {
    cipher: AesBlockCipher,
    tables: GhashTables,
}

impl GcmCipher {
    /// Prepare a key
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        let cipher = AesBlockCipher::new(key);
        let tables = GhashTables::from_cipher(&cipher);
        Self { cipher, tables }
    }

    /// Start a stream over one message
    pub fn stream(
        &self,
        policy: SecurityPolicy,
        direction: Direction,
        nonce: &[u8; NONCE_SIZE],
        aad: &[u8],
        expected_tag: Option<&Tag>,
    ) -> SecurityResult<GcmCipherStream<'_>> {
        GcmCipherStream::new(self, policy, direction, nonce, aad, expected_tag)
    }
}

impl AeadCipher for GcmCipher {
    fn seal(
        &self,
        policy: SecurityPolicy,
        nonce: &[u8; NONCE_SIZE],
        aad: &[u8],
        plaintext: &[u8],
    ) -> SecurityResult<Sealed> {
        let mut stream = self.stream(policy, Direction::Encrypt, nonce, aad, None)?;
        stream.write(plaintext);
        let (data, status) = stream.finish();
        let tag = match status {
            TagStatus::Computed(tag) => Some(tag),
            _ => None,
        };
        Ok(Sealed { data, tag })
    }

    fn open(
        &self,
        policy: SecurityPolicy,
        nonce: &[u8; NONCE_SIZE],
        aad: &[u8],
        ciphertext: &[u8],
        tag: Option<&Tag>,
    ) -> SecurityResult<Opened> {
        let mut stream = self.stream(policy, Direction::Decrypt, nonce, aad, tag)?;
        stream.write(ciphertext);
        let (data, status) = stream.finish();
        Ok(Opened { data, status })
    }
}

/// Streaming GCM over a single message
pub struct GcmCipherStream<'k> {
    key: &'k GcmCipher,
    policy: SecurityPolicy,
    direction: Direction,
    expected_tag: Option<Tag>,
    j0: [u8; BLOCK_SIZE],
    counter: [u8; BLOCK_SIZE],
    hash: [u8; BLOCK_SIZE],
    aad_len: usize,
    data_len: usize,
    pending: [u8; BLOCK_SIZE],
    pending_len: usize,
    output: Vec<u8>,
}

impl<'k> GcmCipherStream<'k> {
    /// Initialize a stream
    ///
    /// # Errors
    /// Returns `UnsupportedSecurityPolicy` for policies other than
    /// authentication, encryption or both.
    pub fn new(
        key: &'k GcmCipher,
        policy: SecurityPolicy,
        direction: Direction,
        nonce: &[u8; NONCE_SIZE],
        aad: &[u8],
        expected_tag: Option<&Tag>,
    ) -> SecurityResult<Self> {
        let policy = policy.ensure_supported()?;

        let mut j0 = [0u8; BLOCK_SIZE];
        j0[..NONCE_SIZE].copy_from_slice(nonce);
        j0[BLOCK_SIZE - 1] = 1;

        let hash = if policy.is_authenticated() {
            key.tables.ghash(aad)
        } else {
            [0u8; BLOCK_SIZE]
        };

        Ok(Self {
            key,
            policy,
            direction,
            expected_tag: expected_tag.copied(),
            j0,
            counter: j0,
            hash,
            aad_len: aad.len(),
            data_len: 0,
            pending: [0u8; BLOCK_SIZE],
            pending_len: 0,
            output: Vec::new(),
        })
    }

    /// Feed payload bytes; may be called any number of times
    pub fn write(&mut self, mut data: &[u8]) {
        self.output.reserve(data.len());
        while !data.is_empty() {
            let take = (BLOCK_SIZE - self.pending_len).min(data.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&data[..take]);
            self.pending_len += take;
            data = &data[take..];
            if self.pending_len == BLOCK_SIZE {
                let block = self.pending;
                self.process_block(&block);
                self.pending_len = 0;
            }
        }
    }

    /// 32-bit big-endian increment of the last counter word
    fn increment_counter(&mut self) {
        for byte in self.counter[12..].iter_mut().rev() {
            *byte = byte.wrapping_add(1);
            if *byte != 0 {
                break;
            }
        }
    }

    fn process_block(&mut self, input: &[u8]) {
        self.data_len += input.len();
        let start = self.output.len();

        if self.policy.is_encrypted() {
            self.increment_counter();
            let keystream = self.key.cipher.encrypt_block(&self.counter);
            self.output
                .extend(input.iter().zip(keystream.iter()).map(|(b, k)| b ^ k));
        } else {
            self.output.extend_from_slice(input);
        }

        if self.policy.is_authenticated() {
            let Self { key, hash, output, direction, .. } = self;
            let ciphertext = match direction {
                Direction::Encrypt => &output[start..],
                Direction::Decrypt => input,
            };
            key.tables.fold_block(hash, ciphertext);
        }
    }

    /// Process the final partial block and compute or check the tag
    pub fn finish(mut self) -> (Vec<u8>, TagStatus) {
        if self.pending_len > 0 {
            let block = self.pending;
            let len = self.pending_len;
            self.process_block(&block[..len]);
            self.pending_len = 0;
        }

        if !self.policy.is_authenticated() {
            return (self.output, TagStatus::NotAuthenticated);
        }

        let mut lengths = [0u8; BLOCK_SIZE];
        lengths[..8].copy_from_slice(&((self.aad_len as u64) * 8).to_be_bytes());
        lengths[8..].copy_from_slice(&((self.data_len as u64) * 8).to_be_bytes());
        self.key.tables.fold_block(&mut self.hash, &lengths);

        let mask = self.key.cipher.encrypt_block(&self.j0);
        let mut tag = [0u8; TAG_SIZE];
        for (i, t) in tag.iter_mut().enumerate() {
            *t = mask[i] ^ self.hash[i];
        }

        let status = match (self.direction, self.expected_tag) {
            (Direction::Encrypt, _) => TagStatus::Computed(tag),
            (Direction::Decrypt, Some(expected)) => {
                if bool::from(tag.ct_eq(&expected)) {
                    TagStatus::Verified
                } else {
                    TagStatus::Mismatch
                }
            }
            (Direction::Decrypt, None) => TagStatus::Missing,
        };
        (self.output, status)
    }

    /// Finish the stream, failing if a received tag does not verify
    pub fn flush_final_block(self) -> SecurityResult<Sealed> {
        let (data, status) = self.finish();
        match status {
            TagStatus::Computed(tag) => Ok(Sealed { data, tag: Some(tag) }),
            status => Opened { data, status }
                .into_verified()
                .map(|data| Sealed { data, tag: None }),
        }
    }
}
