//! Ciphered APDU construction and parsing
//!
//! # Envelope
//! ```text
//! Command tag            (1 byte, glo-* APDU tag)
//! Length                 (object count of the rest)
//! Security policy        (1 byte)
//! Frame counter          (4 bytes, big-endian)
//! Ciphertext / plaintext (variable)
//! Authentication tag     (12 bytes, authenticated policies only)
//! ```
//!
//! # Additional Authenticated Data
//! | Policy                   | AAD                                  | Payload       |
//! |--------------------------|--------------------------------------|---------------|
//! | Authentication           | policy ‖ authentication key ‖ data   | clear text    |
//! | Encryption               | authentication key                   | ciphertext    |
//! | AuthenticationEncryption | policy ‖ authentication key          | ciphertext    |
//!
//! The GCM nonce is the sender's system title followed by the frame counter.

use crate::error::{SecurityError, SecurityResult};
use crate::gcm::{AeadCipher, GcmCipher, Opened, TAG_SIZE, Tag, TagStatus, build_nonce};
use crate::suite::SecurityPolicy;
use crate::xdlms::{CipherKey, SystemTitle};
use dlms_core::{ByteBuffer, Command, object_count_size};

/// Which parts of the ciphered result are returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputShape {
    /// Complete APDU: tag, length, policy, frame counter, data and tag
    #[default]
    Packet,
    /// Only the (cipher)text
    DataOnly,
    /// Only the authentication tag
    TagOnly,
    /// (Cipher)text followed by the authentication tag
    DataAndTag,
}

impl OutputShape {
    /// Policy byte and frame counter are written
    pub fn includes_header(self) -> bool {
        self == OutputShape::Packet
    }

    /// (Cipher)text is written
    pub fn includes_data(self) -> bool {
        !matches!(self, OutputShape::TagOnly)
    }

    /// Authentication tag is written
    pub fn includes_tag(self) -> bool {
        !matches!(self, OutputShape::DataOnly)
    }
}

/// Per-call ciphering parameters
///
/// The payload travels next to the parameters. After a call the engine
/// fills in [`CipherParameters::computed_tag`]; after a decrypt it also
/// records the command, policy and frame counter found in the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherParameters {
    /// Ciphered APDU tag written in front of a packet
    pub command_tag: u8,
    /// Security policy
    pub security_policy: SecurityPolicy,
    /// Invocation (frame) counter, low 4 bytes of the nonce
    pub frame_counter: u32,
    /// System title of the sender, high 8 bytes of the nonce
    pub system_title: SystemTitle,
    /// Block cipher key (global unicast encryption key)
    pub block_cipher_key: CipherKey,
    /// Authentication key
    pub authentication_key: CipherKey,
    /// Requested output
    pub output_shape: OutputShape,
    /// Tag computed by the last operation
    pub computed_tag: Option<Tag>,
}

impl CipherParameters {
    /// Parameters for a packet with the given keys
    pub fn new(
        command_tag: u8,
        security_policy: SecurityPolicy,
        frame_counter: u32,
        system_title: SystemTitle,
        block_cipher_key: CipherKey,
        authentication_key: CipherKey,
    ) -> Self {
        Self {
            command_tag,
            security_policy,
            frame_counter,
            system_title,
            block_cipher_key,
            authentication_key,
            output_shape: OutputShape::Packet,
            computed_tag: None,
        }
    }

    /// Change the output shape
    pub fn with_output_shape(mut self, output_shape: OutputShape) -> Self {
        self.output_shape = output_shape;
        self
    }
}

/// Receiver of diagnostics while decoding captured traffic
///
/// Only protocol trace and inspection tools pass a sink; with a sink a tag
/// mismatch becomes a comment and the recovered bytes are still returned.
#[cfg_attr(test, mockall::automock)]
pub trait TraceSink {
    /// Record a comment next to the decoded APDU
    fn comment(&mut self, text: &str);
}

impl TraceSink for Vec<String> {
    fn comment(&mut self, text: &str) {
        self.push(text.to_string());
    }
}

/// APDU tags accepted by [`DlmsCipheringEngine::decrypt`]
pub const CIPHERED_COMMANDS: [Command; 8] = [
    Command::GloInitiateRequest,
    Command::GloInitiateResponse,
    Command::GloGetRequest,
    Command::GloSetRequest,
    Command::GloMethodRequest,
    Command::GloGetResponse,
    Command::GloSetResponse,
    Command::GloMethodResponse,
];

/// Stateless encoder/decoder of ciphered APDUs
pub struct DlmsCipheringEngine;

impl DlmsCipheringEngine {
    /// Additional authenticated data for a policy
    pub fn authenticated_data(
        policy: SecurityPolicy,
        authentication_key: &CipherKey,
        data: &[u8],
    ) -> SecurityResult<Vec<u8>> {
        let mut aad = Vec::with_capacity(1 + 16 + data.len());
        match policy.ensure_supported()? {
            SecurityPolicy::Authentication => {
                aad.push(policy.to_byte());
                aad.extend_from_slice(authentication_key.as_bytes());
                aad.extend_from_slice(data);
            }
            SecurityPolicy::AuthenticationEncryption => {
                aad.push(policy.to_byte());
                aad.extend_from_slice(authentication_key.as_bytes());
            }
            _ => aad.extend_from_slice(authentication_key.as_bytes()),
        }
        Ok(aad)
    }

    /// Cipher `data` with a cipher built from the parameters' block cipher key
    pub fn encrypt(params: &mut CipherParameters, data: &[u8]) -> SecurityResult<Vec<u8>> {
        let cipher = GcmCipher::new(params.block_cipher_key.as_bytes());
        Self::encrypt_with(&cipher, params, data)
    }

    /// Cipher `data` with prepared key material
    pub fn encrypt_with<C: AeadCipher + ?Sized>(
        cipher: &C,
        params: &mut CipherParameters,
        data: &[u8],
    ) -> SecurityResult<Vec<u8>> {
        let policy = params.security_policy.ensure_supported()?;
        let shape = params.output_shape;
        let nonce = build_nonce(params.system_title.as_bytes(), params.frame_counter);
        let aad = Self::authenticated_data(policy, &params.authentication_key, data)?;

        let sealed = if policy == SecurityPolicy::Authentication {
            cipher.seal(policy, &nonce, &aad, &[])?
        } else {
            cipher.seal(policy, &nonce, &aad, data)?
        };
        params.computed_tag = sealed.tag;

        let mut body = ByteBuffer::with_capacity(5 + data.len() + TAG_SIZE);
        if shape.includes_header() {
            body.set_u8(policy.to_byte());
            body.set_u32(params.frame_counter);
        }
        if shape.includes_data() {
            body.set(if policy == SecurityPolicy::Authentication {
                data
            } else {
                sealed.data.as_slice()
            });
        }
        if let Some(tag) = sealed.tag.filter(|_| shape.includes_tag()) {
            body.set(&tag);
        }

        log::debug!(
            "Ciphered command 0x{:02X}: policy {}, frame counter {}, {} bytes",
            params.command_tag,
            policy,
            params.frame_counter,
            data.len()
        );

        if !shape.includes_header() {
            return Ok(body.into_vec());
        }
        let mut packet = ByteBuffer::with_capacity(1 + object_count_size(body.len()) + body.len());
        packet.set_u8(params.command_tag);
        packet.set_object_count(body.len())?;
        packet.set(body.as_slice());
        Ok(packet.into_vec())
    }

    /// Decipher the APDU at the read position of `buffer`
    ///
    /// `params` supplies the keys and the peer system title; command,
    /// policy and frame counter are taken from the envelope and stored back.
    pub fn decrypt(params: &mut CipherParameters, buffer: &mut ByteBuffer) -> SecurityResult<Vec<u8>> {
        let cipher = GcmCipher::new(params.block_cipher_key.as_bytes());
        Self::decrypt_with(&cipher, params, buffer)
    }

    /// Decipher with prepared key material
    pub fn decrypt_with<C: AeadCipher + ?Sized>(
        cipher: &C,
        params: &mut CipherParameters,
        buffer: &mut ByteBuffer,
    ) -> SecurityResult<Vec<u8>> {
        let opened = Self::open(cipher, params, buffer)?;
        if opened.status == TagStatus::Mismatch {
            log::warn!(
                "Invalid tag on command 0x{:02X}, frame counter {}",
                params.command_tag,
                params.frame_counter
            );
        }
        opened.into_verified()
    }

    /// Decipher captured traffic, reporting a bad tag to `sink` instead of failing
    pub fn decrypt_traced<C: AeadCipher + ?Sized>(
        cipher: &C,
        params: &mut CipherParameters,
        buffer: &mut ByteBuffer,
        sink: &mut dyn TraceSink,
    ) -> SecurityResult<Vec<u8>> {
        let opened = Self::open(cipher, params, buffer)?;
        match opened.status {
            TagStatus::Mismatch => {
                sink.comment(&SecurityError::InvalidTag.to_string());
                Ok(opened.data)
            }
            _ => opened.into_verified(),
        }
    }

    fn open<C: AeadCipher + ?Sized>(
        cipher: &C,
        params: &mut CipherParameters,
        buffer: &mut ByteBuffer,
    ) -> SecurityResult<Opened> {
        let tag_byte = buffer.get_u8()?;
        let command = Command::from_tag(tag_byte)
            .ok()
            .filter(|command| CIPHERED_COMMANDS.contains(command))
            .ok_or(SecurityError::UnknownCommand(tag_byte))?;

        let length = buffer.get_object_count()?;
        if length > buffer.available() {
            return Err(SecurityError::Truncated(format!(
                "length {} exceeds {} available bytes",
                length,
                buffer.available()
            )));
        }
        let mut body = ByteBuffer::from(buffer.get(length)?);

        let policy = SecurityPolicy::from_byte(body.get_u8()?).ensure_supported()?;
        let frame_counter = body.get_u32()?;
        params.command_tag = command.tag();
        params.security_policy = policy;
        params.frame_counter = frame_counter;

        let rest = body.remaining();
        let (data, tag) = if policy.is_authenticated() {
            if rest.len() < TAG_SIZE {
                return Err(SecurityError::Truncated(format!(
                    "{} bytes cannot hold a {}-byte tag",
                    rest.len(),
                    TAG_SIZE
                )));
            }
            let (data, tag_bytes) = rest.split_at(rest.len() - TAG_SIZE);
            let mut tag: Tag = [0u8; TAG_SIZE];
            tag.copy_from_slice(tag_bytes);
            (data, Some(tag))
        } else {
            (rest, None)
        };

        let nonce = build_nonce(params.system_title.as_bytes(), frame_counter);
        let aad = Self::authenticated_data(policy, &params.authentication_key, data)?;

        log::debug!(
            "Deciphering command 0x{:02X}: policy {}, frame counter {}, {} bytes",
            tag_byte,
            policy,
            frame_counter,
            data.len()
        );

        let opened = if policy == SecurityPolicy::Authentication {
            let opened = cipher.open(policy, &nonce, &aad, &[], tag.as_ref())?;
            Opened {
                data: data.to_vec(),
                status: opened.status,
            }
        } else {
            cipher.open(policy, &nonce, &aad, data, tag.as_ref())?
        };
        params.computed_tag = tag;
        Ok(opened)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    const BLOCK_CIPHER_KEY: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
        0x0F,
    ];
    const AUTHENTICATION_KEY: [u8; 16] = [
        0xD0, 0xD1, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD, 0xDE,
        0xDF,
    ];

    fn params(policy: SecurityPolicy, frame_counter: u32) -> CipherParameters {
        CipherParameters::new(
            Command::GloGetRequest.tag(),
            policy,
            frame_counter,
            SystemTitle::new(*b"ABCDEFGH"),
            CipherKey::new(BLOCK_CIPHER_KEY),
            CipherKey::new(AUTHENTICATION_KEY),
        )
    }

    fn decrypt(packet: &[u8]) -> SecurityResult<Vec<u8>> {
        let mut p = params(SecurityPolicy::None, 0);
        DlmsCipheringEngine::decrypt(&mut p, &mut ByteBuffer::from(packet))
    }

    const POLICIES: [SecurityPolicy; 3] = [
        SecurityPolicy::Authentication,
        SecurityPolicy::Encryption,
        SecurityPolicy::AuthenticationEncryption,
    ];

    #[test]
    fn test_encryption_packet_layout() {
        let mut p = params(SecurityPolicy::Encryption, 0);
        let packet = DlmsCipheringEngine::encrypt(&mut p, b"Hello").unwrap();
        assert_eq!(
            packet,
            vec![
                0xC8, 0x0A, 0x20, 0x00, 0x00, 0x00, 0x00, 0x56, 0x3D, 0x27, 0x5C, 0x5B
            ]
        );
        assert!(p.computed_tag.is_none());

        let mut p = params(SecurityPolicy::Encryption, 1);
        let next = DlmsCipheringEngine::encrypt(&mut p, b"Hello").unwrap();
        assert_eq!(&next[3..7], &[0x00, 0x00, 0x00, 0x01]);
        assert_eq!(&next[7..], &[0xBC, 0x3A, 0x9D, 0x88, 0xD5]);
    }

    #[test]
    fn test_authenticated_encryption_packet_layout() {
        let mut p = params(SecurityPolicy::AuthenticationEncryption, 0);
        let packet = DlmsCipheringEngine::encrypt(&mut p, b"Hello").unwrap();
        let mut expected = vec![0xC8, 0x16, 0x30, 0x00, 0x00, 0x00, 0x00];
        expected.extend_from_slice(&[0x56, 0x3D, 0x27, 0x5C, 0x5B]);
        expected.extend_from_slice(&[
            0x28, 0xB1, 0x03, 0x04, 0x54, 0x03, 0xED, 0xAB, 0x13, 0x42, 0x81, 0xBB,
        ]);
        assert_eq!(packet, expected);
        assert_eq!(p.computed_tag.unwrap()[..], expected[12..]);
    }

    #[test]
    fn test_authentication_packet_layout() {
        let mut p = params(SecurityPolicy::Authentication, 0);
        let packet = DlmsCipheringEngine::encrypt(&mut p, b"Hello").unwrap();
        let mut expected = vec![0xC8, 0x16, 0x10, 0x00, 0x00, 0x00, 0x00];
        expected.extend_from_slice(b"Hello");
        expected.extend_from_slice(&[
            0xE0, 0x77, 0xCB, 0x83, 0xEF, 0x3D, 0xFD, 0x5F, 0x27, 0x62, 0x97, 0xB5,
        ]);
        assert_eq!(packet, expected);
    }

    // Worked example from the DLMS UA Green Book: Get.request ciphered with
    // authenticated encryption.
    const GREEN_BOOK_SYSTEM_TITLE: [u8; 8] = [0x4D, 0x4D, 0x4D, 0x00, 0x00, 0xBC, 0x61, 0x4E];
    const GREEN_BOOK_FRAME_COUNTER: u32 = 0x0123_4567;
    const GREEN_BOOK_PLAINTEXT: [u8; 13] = [
        0xC0, 0x01, 0x00, 0x00, 0x08, 0x00, 0x00, 0x01, 0x00, 0x00, 0xFF, 0x02, 0x00,
    ];

    fn green_book_params(policy: SecurityPolicy) -> CipherParameters {
        CipherParameters::new(
            Command::GloGetRequest.tag(),
            policy,
            GREEN_BOOK_FRAME_COUNTER,
            SystemTitle::new(GREEN_BOOK_SYSTEM_TITLE),
            CipherKey::new(BLOCK_CIPHER_KEY),
            CipherKey::new(AUTHENTICATION_KEY),
        )
    }

    #[test]
    fn test_green_book_authenticated_encryption() {
        let ciphertext = [
            0x41, 0x13, 0x12, 0xFF, 0x93, 0x5A, 0x47, 0x56, 0x68, 0x27, 0xC4, 0x67, 0xBC,
        ];
        let tag = [
            0x7D, 0x82, 0x5C, 0x3B, 0xE4, 0xA7, 0x7C, 0x3F, 0xCC, 0x05, 0x6B, 0x6B,
        ];

        let mut p = green_book_params(SecurityPolicy::AuthenticationEncryption)
            .with_output_shape(OutputShape::DataAndTag);
        let sealed = DlmsCipheringEngine::encrypt(&mut p, &GREEN_BOOK_PLAINTEXT).unwrap();
        assert_eq!(&sealed[..13], &ciphertext);
        assert_eq!(&sealed[13..], &tag);

        let mut p = green_book_params(SecurityPolicy::AuthenticationEncryption);
        let packet = DlmsCipheringEngine::encrypt(&mut p, &GREEN_BOOK_PLAINTEXT).unwrap();
        let mut expected = vec![0xC8, 0x1E, 0x30, 0x01, 0x23, 0x45, 0x67];
        expected.extend_from_slice(&ciphertext);
        expected.extend_from_slice(&tag);
        assert_eq!(packet, expected);

        let mut p = green_book_params(SecurityPolicy::None);
        let plaintext = DlmsCipheringEngine::decrypt(&mut p, &mut ByteBuffer::from(packet)).unwrap();
        assert_eq!(plaintext, GREEN_BOOK_PLAINTEXT);
        assert_eq!(p.frame_counter, GREEN_BOOK_FRAME_COUNTER);
        assert_eq!(p.security_policy, SecurityPolicy::AuthenticationEncryption);
    }

    #[test]
    fn test_green_book_authentication_only() {
        let mut p = green_book_params(SecurityPolicy::Authentication)
            .with_output_shape(OutputShape::TagOnly);
        let tag = DlmsCipheringEngine::encrypt(&mut p, &GREEN_BOOK_PLAINTEXT).unwrap();
        assert_eq!(
            tag,
            vec![0x06, 0x72, 0x5D, 0x91, 0x0F, 0x92, 0x21, 0xD2, 0x63, 0x87, 0x75, 0x16]
        );
    }

    #[test]
    fn test_output_shapes() {
        let plaintext = [0x5Au8; 21];

        let mut p = params(SecurityPolicy::Encryption, 3).with_output_shape(OutputShape::DataOnly);
        assert_eq!(DlmsCipheringEngine::encrypt(&mut p, &plaintext).unwrap().len(), plaintext.len());

        let mut p = params(SecurityPolicy::AuthenticationEncryption, 3)
            .with_output_shape(OutputShape::DataAndTag);
        assert_eq!(
            DlmsCipheringEngine::encrypt(&mut p, &plaintext).unwrap().len(),
            plaintext.len() + TAG_SIZE
        );

        let mut p = params(SecurityPolicy::Authentication, 3).with_output_shape(OutputShape::TagOnly);
        let tag = DlmsCipheringEngine::encrypt(&mut p, &plaintext).unwrap();
        assert_eq!(tag.len(), TAG_SIZE);
        assert_eq!(p.computed_tag.unwrap().to_vec(), tag);

        let mut p = params(SecurityPolicy::Authentication, 3).with_output_shape(OutputShape::DataOnly);
        assert_eq!(DlmsCipheringEngine::encrypt(&mut p, &plaintext).unwrap(), plaintext);
    }

    #[test]
    fn test_roundtrip_all_policies_and_lengths() {
        for policy in POLICIES {
            for len in [0usize, 1, 15, 16, 17, 31, 32, 33, 64, 100, 200] {
                let plaintext: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
                let mut p = params(policy, 42);
                let packet = DlmsCipheringEngine::encrypt(&mut p, &plaintext).unwrap();

                let mut received = params(SecurityPolicy::None, 0);
                let decrypted =
                    DlmsCipheringEngine::decrypt(&mut received, &mut ByteBuffer::from(packet)).unwrap();
                assert_eq!(decrypted, plaintext, "policy {} length {}", policy, len);
                assert_eq!(received.security_policy, policy);
                assert_eq!(received.frame_counter, 42);
                assert_eq!(received.command_tag, Command::GloGetRequest.tag());
            }
        }
    }

    #[test]
    fn test_long_form_length() {
        let plaintext = vec![0x11u8; 300];
        let mut p = params(SecurityPolicy::AuthenticationEncryption, 9);
        let packet = DlmsCipheringEngine::encrypt(&mut p, &plaintext).unwrap();
        assert_eq!(&packet[1..4], &[0x82, 0x01, 0x3D]);
        assert_eq!(decrypt(&packet).unwrap(), plaintext);
    }

    #[test]
    fn test_tamper_detection() {
        let mut rng = rand::thread_rng();
        for policy in [SecurityPolicy::Authentication, SecurityPolicy::AuthenticationEncryption] {
            let mut p = params(policy, 7);
            let packet = DlmsCipheringEngine::encrypt(&mut p, b"tamper evident payload").unwrap();
            // Flip bits after tag, length, policy byte and frame counter.
            for _ in 0..200 {
                let mut corrupted = packet.clone();
                let index = rng.gen_range(7..corrupted.len());
                corrupted[index] ^= 1u8 << rng.gen_range(0..8u32);
                assert!(
                    matches!(decrypt(&corrupted), Err(SecurityError::InvalidTag)),
                    "policy {} byte {}",
                    policy,
                    index
                );
            }
        }
    }

    #[test]
    fn test_frame_counter_is_authenticated() {
        let mut p = params(SecurityPolicy::AuthenticationEncryption, 7);
        let mut packet = DlmsCipheringEngine::encrypt(&mut p, b"payload").unwrap();
        packet[6] ^= 0x01;
        assert!(matches!(decrypt(&packet), Err(SecurityError::InvalidTag)));
    }

    #[test]
    fn test_wrong_key_fails() {
        let mut p = params(SecurityPolicy::AuthenticationEncryption, 1);
        let packet = DlmsCipheringEngine::encrypt(&mut p, b"payload").unwrap();

        let mut received = params(SecurityPolicy::None, 0);
        received.authentication_key = CipherKey::new([0u8; 16]);
        let result = DlmsCipheringEngine::decrypt(&mut received, &mut ByteBuffer::from(packet));
        assert!(matches!(result, Err(SecurityError::InvalidTag)));
    }

    #[test]
    fn test_unknown_command() {
        let mut p = params(SecurityPolicy::Encryption, 0);
        let mut packet = DlmsCipheringEngine::encrypt(&mut p, b"Hello").unwrap();
        packet[0] = Command::GetRequest.tag();
        assert!(matches!(decrypt(&packet), Err(SecurityError::UnknownCommand(0xC0))));
        packet[0] = 0xFF;
        assert!(matches!(decrypt(&packet), Err(SecurityError::UnknownCommand(0xFF))));
        packet[0] = Command::GloEventNotification.tag();
        assert!(matches!(decrypt(&packet), Err(SecurityError::UnknownCommand(0xCA))));
    }

    #[test]
    fn test_unsupported_policy() {
        let mut p = params(SecurityPolicy::Other(0x40), 0);
        assert!(matches!(
            DlmsCipheringEngine::encrypt(&mut p, b"x"),
            Err(SecurityError::UnsupportedSecurityPolicy(0x40))
        ));

        let packet = [0xC8, 0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01];
        assert!(matches!(decrypt(&packet), Err(SecurityError::UnsupportedSecurityPolicy(0x00))));
    }

    #[test]
    fn test_truncated_packets() {
        assert!(matches!(
            decrypt(&[0xC8, 0x10, 0x30, 0x00]),
            Err(SecurityError::Truncated(_))
        ));
        let short_tag = [0xC8, 0x08, 0x30, 0x00, 0x00, 0x00, 0x01, 0xAA, 0xBB, 0xCC];
        assert!(matches!(decrypt(&short_tag), Err(SecurityError::Truncated(_))));
        assert!(matches!(decrypt(&[0xC8]), Err(SecurityError::Buffer(_))));
    }

    #[test]
    fn test_decrypt_stops_at_packet_end() {
        let mut p = params(SecurityPolicy::Encryption, 5);
        let mut data = DlmsCipheringEngine::encrypt(&mut p, b"first").unwrap();
        data.extend_from_slice(&[0xEE, 0xFF]);
        let mut buffer = ByteBuffer::from(data);
        let mut received = params(SecurityPolicy::None, 0);
        assert_eq!(DlmsCipheringEngine::decrypt(&mut received, &mut buffer).unwrap(), b"first");
        assert_eq!(buffer.remaining(), &[0xEE, 0xFF]);
    }

    #[test]
    fn test_trace_mode_reports_invalid_tag() {
        let mut p = params(SecurityPolicy::AuthenticationEncryption, 2);
        let mut packet = DlmsCipheringEngine::encrypt(&mut p, b"capture").unwrap();
        let last = packet.len() - 1;
        packet[last] ^= 0xFF;

        let cipher = GcmCipher::new(&BLOCK_CIPHER_KEY);
        let mut sink = MockTraceSink::new();
        sink.expect_comment()
            .withf(|text| text.to_string() == "Decrypt failed. Invalid tag.")
            .times(1)
            .return_const(());

        let mut received = params(SecurityPolicy::None, 0);
        let data = DlmsCipheringEngine::decrypt_traced(
            &cipher,
            &mut received,
            &mut ByteBuffer::from(packet.clone()),
            &mut sink,
        )
        .unwrap();
        assert_eq!(data, b"capture");

        let mut received = params(SecurityPolicy::None, 0);
        let strict = DlmsCipheringEngine::decrypt_with(&cipher, &mut received, &mut ByteBuffer::from(packet));
        assert!(matches!(strict, Err(SecurityError::InvalidTag)));
    }

    #[test]
    fn test_trace_mode_is_silent_for_valid_frames() {
        let mut p = params(SecurityPolicy::Authentication, 2);
        let packet = DlmsCipheringEngine::encrypt(&mut p, b"capture").unwrap();
        let cipher = GcmCipher::new(&BLOCK_CIPHER_KEY);
        let mut comments: Vec<String> = Vec::new();
        let mut received = params(SecurityPolicy::None, 0);
        let data = DlmsCipheringEngine::decrypt_traced(
            &cipher,
            &mut received,
            &mut ByteBuffer::from(packet),
            &mut comments,
        )
        .unwrap();
        assert_eq!(data, b"capture");
        assert!(comments.is_empty());
    }

    #[test]
    fn test_authenticated_data_layout() {
        let key = CipherKey::new(AUTHENTICATION_KEY);
        let aad = DlmsCipheringEngine::authenticated_data(SecurityPolicy::Authentication, &key, b"xy").unwrap();
        assert_eq!(aad.len(), 19);
        assert_eq!(aad[0], 0x10);
        assert_eq!(&aad[17..], b"xy");

        let aad = DlmsCipheringEngine::authenticated_data(SecurityPolicy::Encryption, &key, b"xy").unwrap();
        assert_eq!(aad, AUTHENTICATION_KEY);

        let aad = DlmsCipheringEngine::authenticated_data(
            SecurityPolicy::AuthenticationEncryption,
            &key,
            b"xy",
        )
        .unwrap();
        assert_eq!(aad[0], 0x30);
        assert_eq!(aad.len(), 17);
    }
}
