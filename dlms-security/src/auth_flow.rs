//! HLS association handshake
//!
//! High-level security authenticates both partners in four passes:
//!
//! 1. **AARQ**: client sends its challenge CtoS
//! 2. **AARE**: server answers with its challenge StoC
//! 3. **Action request**: client sends f(StoC)
//! 4. **Action response**: server sends f(CtoS), which the client checks
//!
//! [`HlsHandshake`] tracks the client side of this exchange; the responses
//! are computed by [`SecuritySettings`] with the negotiated mechanism.
//!
//! # Usage
//!
//! ```rust,no_run
//! use dlms_security::auth_flow::HlsHandshake;
//! use dlms_security::settings::SecuritySettings;
//! use dlms_security::suite::AuthenticationMechanism;
//!
//! # fn main() -> dlms_security::error::SecurityResult<()> {
//! let mut settings = SecuritySettings::builder()
//!     .set_authentication_mechanism(AuthenticationMechanism::HighSha256)
//!     .build()?;
//! let mut handshake = HlsHandshake::new(AuthenticationMechanism::HighSha256, b"secret".to_vec())?;
//!
//! let ctos = handshake.start()?;
//! // ... send CtoS in the AARQ, receive StoC in the AARE
//! # let stoc = [0u8; 16];
//! let f_stoc = handshake.respond(&mut settings, &stoc)?;
//! // ... send f(StoC), receive f(CtoS)
//! # let f_ctos = [0u8; 32];
//! let authenticated = handshake.verify(&settings, &f_ctos)?;
//! # Ok(())
//! # }
//! ```

use crate::authentication::AuthenticationChallengeEngine;
use crate::error::{SecurityError, SecurityResult};
use crate::settings::SecuritySettings;
use crate::suite::AuthenticationMechanism;
use std::time::{Duration, Instant};

/// Handshake state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Not authenticated (initial state)
    NotAuthenticated,
    /// CtoS generated, waiting for the server challenge
    ChallengeSent,
    /// f(StoC) sent, waiting for f(CtoS)
    ResponseSent,
    /// Server response verified
    Authenticated,
    /// Server response rejected or expired
    Failed,
}

/// Client side of the HLS handshake
pub struct HlsHandshake {
    mechanism: AuthenticationMechanism,
    secret: Vec<u8>,
    state: HandshakeState,
    challenge: Option<Vec<u8>>,
    started: Option<Instant>,
    timeout: Duration,
}

impl HlsHandshake {
    /// Create a handshake for an HLS mechanism
    ///
    /// # Arguments
    /// * `mechanism` - Negotiated mechanism, `High` or above
    /// * `secret` - Shared HLS secret; ignored by HighGmac
    ///
    /// # Errors
    /// Returns `Handshake` for `None` and `Low`, which have no challenge exchange
    pub fn new(mechanism: AuthenticationMechanism, secret: Vec<u8>) -> SecurityResult<Self> {
        if !mechanism.is_hls() {
            return Err(SecurityError::Handshake("mechanism has no challenge exchange"));
        }
        Ok(Self {
            mechanism,
            secret,
            state: HandshakeState::NotAuthenticated,
            challenge: None,
            started: None,
            timeout: Duration::from_secs(30),
        })
    }

    /// Change how long the handshake may take once started
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get current state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Get the mechanism
    pub fn mechanism(&self) -> AuthenticationMechanism {
        self.mechanism
    }

    /// Check if the server was authenticated
    pub fn is_authenticated(&self) -> bool {
        self.state == HandshakeState::Authenticated
    }

    /// The CtoS challenge, once generated
    pub fn challenge(&self) -> Option<&[u8]> {
        self.challenge.as_deref()
    }

    /// Check if the handshake has run longer than its timeout
    pub fn is_expired(&self) -> bool {
        self.started
            .map(|started| started.elapsed() > self.timeout)
            .unwrap_or(false)
    }

    /// Generate CtoS for the AARQ
    pub fn start(&mut self) -> SecurityResult<Vec<u8>> {
        if self.state != HandshakeState::NotAuthenticated {
            return Err(SecurityError::Handshake("handshake already started"));
        }
        let challenge = AuthenticationChallengeEngine::generate_challenge(self.mechanism);
        self.challenge = Some(challenge.clone());
        self.started = Some(Instant::now());
        self.state = HandshakeState::ChallengeSent;
        Ok(challenge)
    }

    /// Compute f(StoC) for the server challenge received in the AARE
    pub fn respond(&mut self, settings: &mut SecuritySettings, server_challenge: &[u8]) -> SecurityResult<Vec<u8>> {
        if self.state != HandshakeState::ChallengeSent {
            return Err(SecurityError::Handshake("no challenge sent"));
        }
        self.check_mechanism(settings)?;
        let response = settings.challenge_response(server_challenge, &self.secret)?;
        self.state = HandshakeState::ResponseSent;
        Ok(response)
    }

    /// Check f(CtoS) returned by the server
    ///
    /// # Returns
    /// `true` if the server proved knowledge of the secret
    pub fn verify(&mut self, settings: &SecuritySettings, server_response: &[u8]) -> SecurityResult<bool> {
        if self.state != HandshakeState::ResponseSent {
            return Err(SecurityError::Handshake("no response sent"));
        }
        self.check_mechanism(settings)?;
        if self.is_expired() {
            self.state = HandshakeState::Failed;
            return Err(SecurityError::Handshake("handshake expired"));
        }
        let challenge = self
            .challenge
            .as_deref()
            .ok_or(SecurityError::Handshake("no challenge sent"))?;

        let verified = settings.verify_challenge_response(challenge, &self.secret, server_response)?;
        if verified {
            log::debug!("HLS {:?} handshake completed", self.mechanism);
            self.state = HandshakeState::Authenticated;
        } else {
            log::warn!("HLS {:?} server response rejected", self.mechanism);
            self.state = HandshakeState::Failed;
        }
        Ok(verified)
    }

    /// Return to the initial state
    pub fn reset(&mut self) {
        self.state = HandshakeState::NotAuthenticated;
        self.challenge = None;
        self.started = None;
    }

    fn check_mechanism(&self, settings: &SecuritySettings) -> SecurityResult<()> {
        if settings.authentication_mechanism() != self.mechanism {
            return Err(SecurityError::Handshake("settings use a different mechanism"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::SecurityPolicy;

    const BLOCK_CIPHER_KEY: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
        0x0F,
    ];
    const AUTHENTICATION_KEY: [u8; 16] = [
        0xD0, 0xD1, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD, 0xDE,
        0xDF,
    ];

    fn settings(mechanism: AuthenticationMechanism, own: &[u8], peer: &[u8]) -> SecuritySettings {
        SecuritySettings::builder()
            .set_security_policy(SecurityPolicy::AuthenticationEncryption)
            .set_authentication_mechanism(mechanism)
            .set_system_title(own.to_vec())
            .set_source_system_title(peer.to_vec())
            .set_block_cipher_key(BLOCK_CIPHER_KEY.to_vec())
            .set_authentication_key(AUTHENTICATION_KEY.to_vec())
            .build()
            .unwrap()
    }

    fn run(mechanism: AuthenticationMechanism, meter_secret: &[u8]) -> (HlsHandshake, bool) {
        let mut client = settings(mechanism, b"CLIENT01", b"METER001");
        let mut meter = settings(mechanism, b"METER001", b"CLIENT01");
        let mut handshake = HlsHandshake::new(mechanism, b"HLS secret".to_vec()).unwrap();

        let ctos = handshake.start().unwrap();
        assert_eq!(handshake.state(), HandshakeState::ChallengeSent);
        let stoc = AuthenticationChallengeEngine::generate_challenge(mechanism);

        let f_stoc = handshake.respond(&mut client, &stoc).unwrap();
        assert_eq!(handshake.state(), HandshakeState::ResponseSent);
        assert!(meter.verify_challenge_response(&stoc, b"HLS secret", &f_stoc).unwrap());

        let f_ctos = meter.challenge_response(&ctos, meter_secret).unwrap();
        let verified = handshake.verify(&client, &f_ctos).unwrap();
        (handshake, verified)
    }

    #[test]
    fn test_full_handshake_all_mechanisms() {
        for mechanism in [
            AuthenticationMechanism::High,
            AuthenticationMechanism::HighMd5,
            AuthenticationMechanism::HighSha1,
            AuthenticationMechanism::HighGmac,
            AuthenticationMechanism::HighSha256,
        ] {
            let (handshake, verified) = run(mechanism, b"HLS secret");
            assert!(verified, "{:?}", mechanism);
            assert!(handshake.is_authenticated());
            assert_eq!(handshake.challenge().map(<[u8]>::len), Some(16));
        }
    }

    #[test]
    fn test_wrong_secret_fails() {
        let (handshake, verified) = run(AuthenticationMechanism::HighSha256, b"wrong secret");
        assert!(!verified);
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }

    #[test]
    fn test_low_level_has_no_handshake() {
        assert!(matches!(
            HlsHandshake::new(AuthenticationMechanism::Low, b"password".to_vec()),
            Err(SecurityError::Handshake(_))
        ));
        assert!(HlsHandshake::new(AuthenticationMechanism::None, Vec::new()).is_err());
    }

    #[test]
    fn test_steps_out_of_order() {
        let mut client = settings(AuthenticationMechanism::HighMd5, b"CLIENT01", b"METER001");
        let mut handshake = HlsHandshake::new(AuthenticationMechanism::HighMd5, b"secret".to_vec()).unwrap();
        assert!(handshake.respond(&mut client, &[0u8; 16]).is_err());
        assert!(handshake.verify(&client, &[0u8; 16]).is_err());

        handshake.start().unwrap();
        assert!(handshake.start().is_err());
        assert!(handshake.verify(&client, &[0u8; 16]).is_err());
    }

    #[test]
    fn test_mechanism_mismatch() {
        let mut client = settings(AuthenticationMechanism::HighSha1, b"CLIENT01", b"METER001");
        let mut handshake = HlsHandshake::new(AuthenticationMechanism::HighMd5, b"secret".to_vec()).unwrap();
        handshake.start().unwrap();
        assert!(handshake.respond(&mut client, &[0u8; 16]).is_err());
        assert_eq!(handshake.state(), HandshakeState::ChallengeSent);
    }

    #[test]
    fn test_expired_handshake() {
        let mut client = settings(AuthenticationMechanism::HighSha1, b"CLIENT01", b"METER001");
        let mut handshake = HlsHandshake::new(AuthenticationMechanism::HighSha1, b"secret".to_vec())
            .unwrap()
            .with_timeout(Duration::ZERO);
        handshake.start().unwrap();
        handshake.respond(&mut client, &[0u8; 16]).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(handshake.is_expired());
        assert!(handshake.verify(&client, &[0u8; 20]).is_err());
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }

    #[test]
    fn test_reset() {
        let mut handshake = HlsHandshake::new(AuthenticationMechanism::HighGmac, Vec::new()).unwrap();
        handshake.start().unwrap();
        handshake.reset();
        assert_eq!(handshake.state(), HandshakeState::NotAuthenticated);
        assert!(handshake.challenge().is_none());
        assert!(!handshake.is_expired());
        assert!(handshake.start().is_ok());
    }
}
