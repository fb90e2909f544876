//! APDU tags handled by the security layer
//!
//! Only the tags the ciphering engine has to reason about are listed: the
//! association APDUs (never ciphered), the plain xDLMS service APDUs and
//! their global-ciphering (`glo-*`) counterparts.

use crate::error::{DlmsError, DlmsResult};

/// APDU tag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// xDLMS InitiateRequest
    InitiateRequest = 0x01,
    /// xDLMS InitiateResponse
    InitiateResponse = 0x08,
    /// Association request (AARQ)
    Aarq = 0x60,
    /// Association response (AARE)
    Aare = 0x61,
    /// Release request (RLRQ)
    ReleaseRequest = 0x62,
    /// Release response (RLRE)
    ReleaseResponse = 0x63,
    /// GET-Request
    GetRequest = 0xC0,
    /// SET-Request
    SetRequest = 0xC1,
    /// EventNotification-Request
    EventNotification = 0xC2,
    /// ACTION-Request
    MethodRequest = 0xC3,
    /// GET-Response
    GetResponse = 0xC4,
    /// SET-Response
    SetResponse = 0xC5,
    /// ACTION-Response
    MethodResponse = 0xC7,
    /// glo-InitiateRequest
    GloInitiateRequest = 0x21,
    /// glo-InitiateResponse
    GloInitiateResponse = 0x28,
    /// glo-GET-Request
    GloGetRequest = 0xC8,
    /// glo-SET-Request
    GloSetRequest = 0xC9,
    /// glo-EventNotification-Request
    GloEventNotification = 0xCA,
    /// glo-ACTION-Request
    GloMethodRequest = 0xCB,
    /// glo-GET-Response
    GloGetResponse = 0xCC,
    /// glo-SET-Response
    GloSetResponse = 0xCD,
    /// glo-ACTION-Response
    GloMethodResponse = 0xCF,
}

impl Command {
    /// Get the tag byte
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Get the command from a tag byte
    pub fn from_tag(tag: u8) -> DlmsResult<Self> {
        use Command::*;
        Ok(match tag {
            0x01 => InitiateRequest,
            0x08 => InitiateResponse,
            0x60 => Aarq,
            0x61 => Aare,
            0x62 => ReleaseRequest,
            0x63 => ReleaseResponse,
            0xC0 => GetRequest,
            0xC1 => SetRequest,
            0xC2 => EventNotification,
            0xC3 => MethodRequest,
            0xC4 => GetResponse,
            0xC5 => SetResponse,
            0xC7 => MethodResponse,
            0x21 => GloInitiateRequest,
            0x28 => GloInitiateResponse,
            0xC8 => GloGetRequest,
            0xC9 => GloSetRequest,
            0xCA => GloEventNotification,
            0xCB => GloMethodRequest,
            0xCC => GloGetResponse,
            0xCD => GloSetResponse,
            0xCF => GloMethodResponse,
            _ => {
                return Err(DlmsError::Protocol(format!(
                    "Unknown command tag: 0x{:02X}",
                    tag
                )));
            }
        })
    }

    /// Association APDUs travel in clear text even on ciphered associations
    pub fn is_association(self) -> bool {
        matches!(self, Command::Aarq | Command::Aare)
    }

    /// Check if this is one of the global-ciphering tags
    pub fn is_global_ciphered(self) -> bool {
        use Command::*;
        matches!(
            self,
            GloInitiateRequest
                | GloInitiateResponse
                | GloGetRequest
                | GloSetRequest
                | GloEventNotification
                | GloMethodRequest
                | GloGetResponse
                | GloSetResponse
                | GloMethodResponse
        )
    }

    /// Global-ciphering tag that carries this command
    ///
    /// Ciphered commands map to themselves. Returns `None` for commands
    /// that have no ciphered form.
    pub fn to_global_ciphered(self) -> Option<Self> {
        use Command::*;
        match self {
            InitiateRequest => Some(GloInitiateRequest),
            InitiateResponse => Some(GloInitiateResponse),
            GetRequest => Some(GloGetRequest),
            SetRequest => Some(GloSetRequest),
            EventNotification => Some(GloEventNotification),
            MethodRequest => Some(GloMethodRequest),
            GetResponse => Some(GloGetResponse),
            SetResponse => Some(GloSetResponse),
            MethodResponse => Some(GloMethodResponse),
            cmd if cmd.is_global_ciphered() => Some(cmd),
            _ => None,
        }
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> Self {
        command.tag()
    }
}
