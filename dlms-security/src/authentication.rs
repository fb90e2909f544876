//! HLS challenge-response computation
//!
//! During association both partners send a challenge (CtoS in the AARQ,
//! StoC in the AARE) and prove knowledge of the shared secret by returning
//! `f(challenge)` in the first action request and response.
//!
//! | Mechanism    | f(challenge)                                          |
//! |--------------|-------------------------------------------------------|
//! | None, Low    | challenge unchanged                                   |
//! | High         | iterated AES-ECB, keyed by the secret blocks          |
//! | HighMd5      | MD5(challenge ‖ secret)                               |
//! | HighSha1     | SHA-1(challenge ‖ secret)                             |
//! | HighSha256   | SHA-256(challenge ‖ secret)                           |
//! | HighGmac     | 0x10 ‖ invocation counter ‖ GMAC tag over challenge   |

use crate::block_cipher::{AesBlockCipher, BLOCK_SIZE};
use crate::ciphering::{CipherParameters, DlmsCipheringEngine, OutputShape};
use crate::constants::CHALLENGE_SIZE;
use crate::error::{SecurityError, SecurityResult};
use crate::gcm::{AeadCipher, GcmCipher, TAG_SIZE};
use crate::suite::{AuthenticationMechanism, SecurityPolicy};
use crate::xdlms::{CipherKey, SystemTitle};
use md5::Md5;
use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Length of a HighGmac response: policy byte, invocation counter, tag
pub const GMAC_RESPONSE_SIZE: usize = 1 + 4 + TAG_SIZE;

/// Keys used by the HighGmac mechanism
#[derive(Debug, Clone, Copy)]
pub struct HlsKeys<'a> {
    pub block_cipher_key: &'a CipherKey,
    pub authentication_key: &'a CipherKey,
}

/// Computes and checks HLS challenge responses
pub struct AuthenticationChallengeEngine;

impl AuthenticationChallengeEngine {
    /// Generate a challenge to send to the partner
    ///
    /// Always 16 bytes; some meters reject other lengths.
    pub fn generate_challenge(mechanism: AuthenticationMechanism) -> Vec<u8> {
        let mut challenge = vec![0u8; CHALLENGE_SIZE];
        rand::thread_rng().fill_bytes(&mut challenge);
        log::trace!("Generated {} byte challenge for {:?}", challenge.len(), mechanism);
        challenge
    }

    /// Compute `f(challenge)`
    ///
    /// For HighGmac `secret` is the system title of the responding side and
    /// `invocation_counter` its current frame counter.
    pub fn respond(
        mechanism: AuthenticationMechanism,
        challenge: &[u8],
        secret: &[u8],
        invocation_counter: u32,
        keys: HlsKeys<'_>,
    ) -> SecurityResult<Vec<u8>> {
        match mechanism {
            AuthenticationMechanism::HighGmac => {
                let cipher = GcmCipher::new(keys.block_cipher_key.as_bytes());
                Self::respond_gmac(&cipher, challenge, secret, invocation_counter, keys.authentication_key)
            }
            other => Self::respond_with_secret(other, challenge, secret),
        }
    }

    /// Compute `f(challenge)` for the mechanisms that need no cipher keys
    pub fn respond_with_secret(
        mechanism: AuthenticationMechanism,
        challenge: &[u8],
        secret: &[u8],
    ) -> SecurityResult<Vec<u8>> {
        log::trace!("Computing {:?} response over {} byte challenge", mechanism, challenge.len());
        let response = match mechanism {
            AuthenticationMechanism::None | AuthenticationMechanism::Low => challenge.to_vec(),
            AuthenticationMechanism::High => Self::iterated_ecb(challenge, secret)?.to_vec(),
            AuthenticationMechanism::HighMd5 => Self::digest::<Md5>(challenge, secret),
            AuthenticationMechanism::HighSha1 => Self::digest::<Sha1>(challenge, secret),
            AuthenticationMechanism::HighSha256 => Self::digest::<Sha256>(challenge, secret),
            AuthenticationMechanism::HighGmac => {
                return Err(SecurityError::MissingKey("block cipher key"));
            }
        };
        Ok(response)
    }

    /// HighGmac response with prepared key material
    pub fn respond_gmac<C: AeadCipher + ?Sized>(
        cipher: &C,
        challenge: &[u8],
        system_title: &[u8],
        invocation_counter: u32,
        authentication_key: &CipherKey,
    ) -> SecurityResult<Vec<u8>> {
        let system_title = SystemTitle::from_slice(system_title)?;
        let mut params = CipherParameters {
            command_tag: 0,
            security_policy: SecurityPolicy::Authentication,
            frame_counter: invocation_counter,
            system_title,
            block_cipher_key: CipherKey::default(),
            authentication_key: *authentication_key,
            output_shape: OutputShape::TagOnly,
            computed_tag: None,
        };
        let tag = DlmsCipheringEngine::encrypt_with(cipher, &mut params, challenge)?;

        let mut response = Vec::with_capacity(GMAC_RESPONSE_SIZE);
        response.push(SecurityPolicy::Authentication.to_byte());
        response.extend_from_slice(&invocation_counter.to_be_bytes());
        response.extend_from_slice(&tag);
        log::trace!("HighGmac response with invocation counter {}", invocation_counter);
        Ok(response)
    }

    /// Check a partner's `f(challenge)` in constant time
    ///
    /// For HighGmac the invocation counter is taken from `response` and
    /// `secret` is the partner's system title.
    pub fn verify(
        mechanism: AuthenticationMechanism,
        challenge: &[u8],
        secret: &[u8],
        keys: HlsKeys<'_>,
        response: &[u8],
    ) -> SecurityResult<bool> {
        let invocation_counter = if mechanism == AuthenticationMechanism::HighGmac {
            if response.len() != GMAC_RESPONSE_SIZE
                || response[0] != SecurityPolicy::Authentication.to_byte()
            {
                return Ok(false);
            }
            u32::from_be_bytes([response[1], response[2], response[3], response[4]])
        } else {
            0
        };
        let expected = Self::respond(mechanism, challenge, secret, invocation_counter, keys)?;
        Ok(expected.len() == response.len() && bool::from(expected.ct_eq(response)))
    }

    // The challenge fills one zero-padded block; longer challenges are
    // refused so no challenge byte goes unproven. The secret is zero-padded
    // to whole blocks (at least one) and each block keys one encryption of
    // the running value.
    fn iterated_ecb(challenge: &[u8], secret: &[u8]) -> SecurityResult<[u8; BLOCK_SIZE]> {
        if challenge.len() > BLOCK_SIZE {
            return Err(SecurityError::ChallengeTooLong {
                max: BLOCK_SIZE,
                actual: challenge.len(),
            });
        }
        let mut x = [0u8; BLOCK_SIZE];
        x[..challenge.len()].copy_from_slice(challenge);

        let blocks = secret.len().div_ceil(BLOCK_SIZE).max(1);
        let mut padded = vec![0u8; blocks * BLOCK_SIZE];
        padded[..secret.len()].copy_from_slice(secret);

        for key in padded.chunks_exact(BLOCK_SIZE) {
            let mut round_key = [0u8; BLOCK_SIZE];
            round_key.copy_from_slice(key);
            x = AesBlockCipher::new(&round_key).encrypt_block(&x);
        }
        Ok(x)
    }

    fn digest<D: Digest>(challenge: &[u8], secret: &[u8]) -> Vec<u8> {
        let mut hasher = D::new();
        hasher.update(challenge);
        hasher.update(secret);
        hasher.finalize().to_vec()
    }
}
