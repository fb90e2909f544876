//! Per-association security state
//!
//! [`SecuritySettings`] owns the keys, system titles and the invocation
//! (frame) counter of one association. Every successful [`encrypt`] uses
//! the current counter for the nonce and then increments it by one, so a
//! `(key, nonce)` pair is never used twice. All mutating operations take
//! `&mut self`: share an instance between tasks only behind a lock.
//!
//! [`encrypt`]: SecuritySettings::encrypt

use crate::authentication::{AuthenticationChallengeEngine, HlsKeys};
use crate::ciphering::{CipherParameters, DlmsCipheringEngine};
use crate::constants::application_context_name;
use crate::error::{SecurityError, SecurityResult};
use crate::gcm::GcmCipher;
use crate::suite::{AuthenticationMechanism, SecurityPolicy};
use crate::xdlms::{CipherKey, SystemTitle};
use dlms_core::{ByteBuffer, Command};
use serde::{Deserialize, Serialize};

/// Serializable security configuration of a connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Security policy byte
    pub security_policy: SecurityPolicy,
    /// Authentication mechanism id
    pub authentication_mechanism: AuthenticationMechanism,
    /// Local system title (8 bytes)
    #[serde(with = "serde_bytes")]
    pub system_title: Option<Vec<u8>>,
    /// Block cipher key (16 bytes)
    #[serde(with = "serde_bytes")]
    pub block_cipher_key: Option<Vec<u8>>,
    /// Authentication key (16 bytes)
    #[serde(with = "serde_bytes")]
    pub authentication_key: Option<Vec<u8>>,
    /// Invocation counter to continue from
    pub invocation_counter: u32,
    /// Reject received frames whose counter does not increase
    pub replay_protection: bool,
}

/// Builder for [`SecuritySettings`]
#[derive(Debug, Clone, Default)]
pub struct SecuritySettingsBuilder {
    security_policy: SecurityPolicy,
    authentication_mechanism: AuthenticationMechanism,
    system_title: Option<Vec<u8>>,
    source_system_title: Option<Vec<u8>>,
    block_cipher_key: Option<Vec<u8>>,
    authentication_key: Option<Vec<u8>>,
    frame_counter: u32,
    replay_protection: bool,
}

impl SecuritySettingsBuilder {
    /// Create a builder for an unciphered association
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the security policy
    pub fn set_security_policy(mut self, policy: SecurityPolicy) -> Self {
        self.security_policy = policy;
        self
    }

    /// Set the authentication mechanism
    pub fn set_authentication_mechanism(mut self, mechanism: AuthenticationMechanism) -> Self {
        self.authentication_mechanism = mechanism;
        self
    }

    /// Set the local system title
    pub fn set_system_title(mut self, system_title: Vec<u8>) -> Self {
        self.system_title = Some(system_title);
        self
    }

    /// Set the system title of the partner
    pub fn set_source_system_title(mut self, system_title: Vec<u8>) -> Self {
        self.source_system_title = Some(system_title);
        self
    }

    /// Set the block cipher key
    pub fn set_block_cipher_key(mut self, key: Vec<u8>) -> Self {
        self.block_cipher_key = Some(key);
        self
    }

    /// Set the authentication key
    pub fn set_authentication_key(mut self, key: Vec<u8>) -> Self {
        self.authentication_key = Some(key);
        self
    }

    /// Set the first invocation counter to use
    pub fn set_frame_counter(mut self, frame_counter: u32) -> Self {
        self.frame_counter = frame_counter;
        self
    }

    /// Enable receive-side replay protection
    pub fn set_replay_protection(mut self, enabled: bool) -> Self {
        self.replay_protection = enabled;
        self
    }

    /// Build the settings
    ///
    /// # Errors
    /// Returns `InvalidKeyLength` for a key or title of the wrong size,
    /// `UnsupportedSecurityPolicy` for a policy the engine cannot process and
    /// `MissingKey` when a ciphered policy lacks a key or the system title.
    pub fn build(self) -> SecurityResult<SecuritySettings> {
        let system_title = self
            .system_title
            .as_deref()
            .map(SystemTitle::from_slice)
            .transpose()?;
        let source_system_title = self
            .source_system_title
            .as_deref()
            .map(SystemTitle::from_slice)
            .transpose()?;
        let block_cipher_key = self
            .block_cipher_key
            .as_deref()
            .map(|key| CipherKey::from_slice("block cipher key", key))
            .transpose()?;
        let authentication_key = self
            .authentication_key
            .as_deref()
            .map(|key| CipherKey::from_slice("authentication key", key))
            .transpose()?;

        if self.security_policy.is_ciphered() {
            self.security_policy.ensure_supported()?;
            if system_title.is_none() {
                return Err(SecurityError::MissingKey("system title"));
            }
            if block_cipher_key.is_none() {
                return Err(SecurityError::MissingKey("block cipher key"));
            }
            if authentication_key.is_none() {
                return Err(SecurityError::MissingKey("authentication key"));
            }
        }

        Ok(SecuritySettings {
            security_policy: self.security_policy,
            authentication_mechanism: self.authentication_mechanism,
            system_title,
            source_system_title,
            cipher: block_cipher_key.map(|key| GcmCipher::new(key.as_bytes())),
            block_cipher_key,
            authentication_key,
            frame_counter: self.frame_counter,
            replay_protection: self.replay_protection,
            last_received_counter: None,
        })
    }
}

/// Keys, titles and counters of one association
#[derive(Debug, Clone)]
pub struct SecuritySettings {
    security_policy: SecurityPolicy,
    authentication_mechanism: AuthenticationMechanism,
    system_title: Option<SystemTitle>,
    source_system_title: Option<SystemTitle>,
    block_cipher_key: Option<CipherKey>,
    authentication_key: Option<CipherKey>,
    cipher: Option<GcmCipher>,
    frame_counter: u32,
    replay_protection: bool,
    last_received_counter: Option<u32>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            security_policy: SecurityPolicy::None,
            authentication_mechanism: AuthenticationMechanism::None,
            system_title: None,
            source_system_title: None,
            block_cipher_key: None,
            authentication_key: None,
            cipher: None,
            frame_counter: 0,
            replay_protection: false,
            last_received_counter: None,
        }
    }
}

impl SecuritySettings {
    /// Create a new settings builder
    pub fn builder() -> SecuritySettingsBuilder {
        SecuritySettingsBuilder::new()
    }

    /// Create settings from a deserialized configuration
    pub fn from_config(config: &SecurityConfig) -> SecurityResult<Self> {
        let mut builder = Self::builder()
            .set_security_policy(config.security_policy)
            .set_authentication_mechanism(config.authentication_mechanism)
            .set_frame_counter(config.invocation_counter)
            .set_replay_protection(config.replay_protection);
        if let Some(title) = &config.system_title {
            builder = builder.set_system_title(title.clone());
        }
        if let Some(key) = &config.block_cipher_key {
            builder = builder.set_block_cipher_key(key.clone());
        }
        if let Some(key) = &config.authentication_key {
            builder = builder.set_authentication_key(key.clone());
        }
        builder.build()
    }

    /// Get the security policy
    pub fn security_policy(&self) -> SecurityPolicy {
        self.security_policy
    }

    /// Change the security policy
    pub fn set_security_policy(&mut self, policy: SecurityPolicy) {
        self.security_policy = policy;
    }

    /// Get the authentication mechanism
    pub fn authentication_mechanism(&self) -> AuthenticationMechanism {
        self.authentication_mechanism
    }

    /// Change the authentication mechanism
    pub fn set_authentication_mechanism(&mut self, mechanism: AuthenticationMechanism) {
        self.authentication_mechanism = mechanism;
    }

    /// Get the local system title
    pub fn system_title(&self) -> Option<&SystemTitle> {
        self.system_title.as_ref()
    }

    /// Replace the local system title
    pub fn set_system_title(&mut self, system_title: &[u8]) -> SecurityResult<()> {
        self.system_title = Some(SystemTitle::from_slice(system_title)?);
        Ok(())
    }

    /// Get the partner's system title
    pub fn source_system_title(&self) -> Option<&SystemTitle> {
        self.source_system_title.as_ref()
    }

    /// Record the partner's system title, as received in the AARQ/AARE
    pub fn set_source_system_title(&mut self, system_title: &[u8]) -> SecurityResult<()> {
        self.source_system_title = Some(SystemTitle::from_slice(system_title)?);
        Ok(())
    }

    /// Get the block cipher key
    pub fn block_cipher_key(&self) -> Option<&CipherKey> {
        self.block_cipher_key.as_ref()
    }

    /// Replace the block cipher key
    pub fn set_block_cipher_key(&mut self, key: &[u8]) -> SecurityResult<()> {
        let key = CipherKey::from_slice("block cipher key", key)?;
        self.cipher = Some(GcmCipher::new(key.as_bytes()));
        self.block_cipher_key = Some(key);
        Ok(())
    }

    /// Get the authentication key
    pub fn authentication_key(&self) -> Option<&CipherKey> {
        self.authentication_key.as_ref()
    }

    /// Replace the authentication key
    pub fn set_authentication_key(&mut self, key: &[u8]) -> SecurityResult<()> {
        self.authentication_key = Some(CipherKey::from_slice("authentication key", key)?);
        Ok(())
    }

    /// Invocation counter the next encrypted frame will carry
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    /// Continue from a stored invocation counter
    pub fn set_frame_counter(&mut self, frame_counter: u32) {
        self.frame_counter = frame_counter;
    }

    /// Counter of the last frame accepted with replay protection enabled
    pub fn last_received_counter(&self) -> Option<u32> {
        self.last_received_counter
    }

    /// Check if replay protection is enabled
    pub fn replay_protection(&self) -> bool {
        self.replay_protection
    }

    /// Enable or disable replay protection
    pub fn set_replay_protection(&mut self, enabled: bool) {
        self.replay_protection = enabled;
    }

    /// Check if any ciphering applies
    pub fn is_ciphered(&self) -> bool {
        self.security_policy.is_ciphered()
    }

    /// Application context name to request in the AARQ
    pub fn application_context_name(&self, logical_name: bool) -> &'static [u32] {
        application_context_name(logical_name, self.is_ciphered())
    }

    /// Forget the state of the last association
    ///
    /// Keys and the local system title stay so the association can be
    /// established again.
    pub fn reset(&mut self) {
        self.security_policy = SecurityPolicy::None;
        self.frame_counter = 0;
        self.source_system_title = None;
        self.last_received_counter = None;
    }

    fn cipher_and_key(&self) -> SecurityResult<(&GcmCipher, CipherKey, CipherKey)> {
        let cipher = self
            .cipher
            .as_ref()
            .ok_or(SecurityError::MissingKey("block cipher key"))?;
        let block_cipher_key = self
            .block_cipher_key
            .ok_or(SecurityError::MissingKey("block cipher key"))?;
        let authentication_key = self
            .authentication_key
            .ok_or(SecurityError::MissingKey("authentication key"))?;
        Ok((cipher, block_cipher_key, authentication_key))
    }

    fn local_title(&self) -> SecurityResult<SystemTitle> {
        self.system_title.ok_or(SecurityError::MissingKey("system title"))
    }

    fn peer_title(&self) -> SecurityResult<SystemTitle> {
        self.source_system_title.map_or_else(|| self.local_title(), Ok)
    }

    /// Cipher an APDU body
    ///
    /// Association APDUs and unciphered associations pass through
    /// unchanged. Otherwise the frame counter is incremented after the
    /// frame was produced.
    pub fn encrypt(&mut self, command: Command, plaintext: &[u8]) -> SecurityResult<Vec<u8>> {
        if !self.is_ciphered() || command.is_association() {
            return Ok(plaintext.to_vec());
        }
        let ciphered = command
            .to_global_ciphered()
            .ok_or(SecurityError::UnknownCommand(command.tag()))?;
        let next_counter = self
            .frame_counter
            .checked_add(1)
            .ok_or(SecurityError::CounterExhausted)?;

        let (cipher, block_cipher_key, authentication_key) = self.cipher_and_key()?;
        let mut params = CipherParameters::new(
            ciphered.tag(),
            self.security_policy,
            self.frame_counter,
            self.local_title()?,
            block_cipher_key,
            authentication_key,
        );
        let frame = DlmsCipheringEngine::encrypt_with(cipher, &mut params, plaintext)?;
        self.frame_counter = next_counter;
        Ok(frame)
    }

    /// Decipher the APDU in `buffer`, replacing the contents with the plaintext
    ///
    /// Returns the ciphered command tag that was received.
    pub fn decrypt(&mut self, buffer: &mut ByteBuffer) -> SecurityResult<Command> {
        let (cipher, block_cipher_key, authentication_key) = self.cipher_and_key()?;
        let mut params = CipherParameters::new(
            0,
            self.security_policy,
            0,
            self.peer_title()?,
            block_cipher_key,
            authentication_key,
        );
        // A rejected frame leaves the read position where the caller had it.
        let start = buffer.position();
        let plaintext = match DlmsCipheringEngine::decrypt_with(cipher, &mut params, buffer) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                buffer.set_position(start)?;
                return Err(err);
            }
        };

        if self.replay_protection {
            if let Some(last) = self.last_received_counter {
                if params.frame_counter <= last {
                    log::warn!(
                        "Replayed frame: counter {} after {}",
                        params.frame_counter,
                        last
                    );
                    buffer.set_position(start)?;
                    return Err(SecurityError::ReplayedFrame {
                        received: params.frame_counter,
                        last,
                    });
                }
            }
            self.last_received_counter = Some(params.frame_counter);
        }

        buffer.replace(plaintext);
        Ok(Command::from_tag(params.command_tag)?)
    }

    /// Compute `f(challenge)` to prove this side knows the secret
    ///
    /// HighGmac uses the local system title and consumes one invocation
    /// counter; the other mechanisms use `secret`.
    pub fn challenge_response(&mut self, challenge: &[u8], secret: &[u8]) -> SecurityResult<Vec<u8>> {
        if self.authentication_mechanism != AuthenticationMechanism::HighGmac {
            return AuthenticationChallengeEngine::respond_with_secret(
                self.authentication_mechanism,
                challenge,
                secret,
            );
        }
        let next_counter = self
            .frame_counter
            .checked_add(1)
            .ok_or(SecurityError::CounterExhausted)?;
        let (cipher, _, authentication_key) = self.cipher_and_key()?;
        let response = AuthenticationChallengeEngine::respond_gmac(
            cipher,
            challenge,
            self.local_title()?.as_slice(),
            self.frame_counter,
            &authentication_key,
        )?;
        self.frame_counter = next_counter;
        Ok(response)
    }

    /// Check the partner's `f(challenge)`
    ///
    /// HighGmac responses are checked against the partner's system title.
    pub fn verify_challenge_response(
        &self,
        challenge: &[u8],
        secret: &[u8],
        response: &[u8],
    ) -> SecurityResult<bool> {
        if self.authentication_mechanism != AuthenticationMechanism::HighGmac {
            let default_key = CipherKey::default();
            let keys = HlsKeys {
                block_cipher_key: &default_key,
                authentication_key: &default_key,
            };
            return AuthenticationChallengeEngine::verify(
                self.authentication_mechanism,
                challenge,
                secret,
                keys,
                response,
            );
        }
        let (_, block_cipher_key, authentication_key) = self.cipher_and_key()?;
        let keys = HlsKeys {
            block_cipher_key: &block_cipher_key,
            authentication_key: &authentication_key,
        };
        AuthenticationChallengeEngine::verify(
            self.authentication_mechanism,
            challenge,
            self.peer_title()?.as_slice(),
            keys,
            response,
        )
    }
}
