//! The three NTLM messages and their wire format.
//!
//! Every message starts with the signature `NTLMSSP\0` and a 32-bit message type, followed by a
//! fixed header of flags, security buffers and optional blocks, followed by the payload the
//! security buffers point into. All integers are little-endian. Each `to_bytes` is the exact
//! inverse of the corresponding `TryFrom<&[u8]>` implementation.


use tracing::{debug, trace};

use crate::Flags;
use crate::buffer::{
    MessageWriter, SecurityBuffer, payload_start, read_array, read_u32_le, read_u64_le,
};
use crate::error::{ParsingError, StoringError};
use crate::oem::{oem_to_string, string_to_oem};
use crate::target_info::TargetInfo;


/// The signature at the start of every NTLM message.
pub const NTLMSSP_SIGNATURE: [u8; 8] = *b"NTLMSSP\0";

const NEGOTIATE_MESSAGE_TYPE: u32 = 0x0000_0001;
const CHALLENGE_MESSAGE_TYPE: u32 = 0x0000_0002;
const AUTHENTICATE_MESSAGE_TYPE: u32 = 0x0000_0003;

/// Signature and message type.
const COMMON_HEADER_LEN: u32 = 8 + 4;

/// Length of an encoded [`OsVersion`].
const OS_VERSION_LEN: u32 = 8;


/// An NTLM message.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Message {
    Negotiate(NegotiateMessage),
    Challenge(ChallengeMessage),
    Authenticate(AuthenticateMessage),
}
impl Message {
    /// Returns the 32-bit message number identifying the type of this message.
    pub fn message_number(&self) -> u32 {
        match self {
            Self::Negotiate(_) => NEGOTIATE_MESSAGE_TYPE,
            Self::Challenge(_) => CHALLENGE_MESSAGE_TYPE,
            Self::Authenticate(_) => AUTHENTICATE_MESSAGE_TYPE,
        }
    }

    /// Serializes the NTLM message into bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        match self {
            Self::Negotiate(m) => m.to_bytes(),
            Self::Challenge(m) => m.to_bytes(),
            Self::Authenticate(m) => m.to_bytes(),
        }
    }
}
impl TryFrom<&[u8]> for Message {
    type Error = ParsingError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        match read_message_type(value)? {
            NEGOTIATE_MESSAGE_TYPE => NegotiateMessage::try_from(value)
                .map(Message::Negotiate),
            CHALLENGE_MESSAGE_TYPE => ChallengeMessage::try_from(value)
                .map(Message::Challenge),
            AUTHENTICATE_MESSAGE_TYPE => AuthenticateMessage::try_from(value)
                .map(Message::Authenticate),
            other => Err(ParsingError::UnknownMessageType(other)),
        }
    }
}


/// A structure representing the version of an operating system as well as the NTLM revision used.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OsVersion {
    pub major_version: u8,
    pub minor_version: u8,
    pub build_number: u16,
    pub reserved: [u8; 3],
    pub ntlm_revision: u8,
}
impl OsVersion {
    /// The NTLM revision current since Windows Server 2003.
    pub const NTLMSSP_REVISION_W2K3: u8 = 0x0F;

    /// Windows 7 with Service Pack 1, the version announced by default.
    pub const WINDOWS_7_SP1: OsVersion = OsVersion::new(6, 1, 7601);

    pub const fn new(major_version: u8, minor_version: u8, build_number: u16) -> Self {
        Self {
            major_version,
            minor_version,
            build_number,
            reserved: [0, 0, 0],
            ntlm_revision: Self::NTLMSSP_REVISION_W2K3,
        }
    }

    /// Serializes the OS version structure into bytes.
    pub fn to_bytes(&self) -> [u8; 8] {
        let build = self.build_number.to_le_bytes();
        [
            self.major_version, self.minor_version, build[0], build[1],
            self.reserved[0], self.reserved[1], self.reserved[2], self.ntlm_revision,
        ]
    }

    fn read(message: &[u8], at: usize) -> Result<Self, ParsingError> {
        let bytes: [u8; 8] = read_array(message, at)?;
        Ok(Self {
            major_version: bytes[0],
            minor_version: bytes[1],
            build_number: u16::from_le_bytes([bytes[2], bytes[3]]),
            reserved: [bytes[4], bytes[5], bytes[6]],
            ntlm_revision: bytes[7],
        })
    }
}


/// The contents of an NTLM Negotiate message.
///
/// The Negotiate message is the first message in an NTLM challenge-response process and is sent by
/// the client to the server; the server is expected to respond with a Challenge message. Its
/// domain and workstation are always transmitted as OEM text.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NegotiateMessage {
    /// Stores which information has been specified and which NTLM behavior should be negotiated.
    pub flags: Flags,

    /// The domain against which the client wishes to authenticate.
    pub supplied_domain: String,

    /// The NetBIOS name of the client.
    pub supplied_workstation: String,

    /// Version information about the client's operating system.
    pub os_version: Option<OsVersion>,
}

impl NegotiateMessage {
    /// Serializes the Negotiate message into bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        let header_len: u32
            = COMMON_HEADER_LEN
            + 4 // flags
            + 8 // supplied domain secbuffer
            + 8 // supplied workstation secbuffer
            + if self.os_version.is_some() { OS_VERSION_LEN } else { 0 }
            ;

        let domain = encode_oem(&self.supplied_domain)?;
        let workstation = encode_oem(&self.supplied_workstation)?;

        let mut writer = MessageWriter::new(header_len);
        writer.write_bytes(&NTLMSSP_SIGNATURE);
        writer.write_bytes(&NEGOTIATE_MESSAGE_TYPE.to_le_bytes());
        writer.write_bytes(&self.flags.bits().to_le_bytes());
        writer.append_buffer(&domain)?;
        writer.append_buffer(&workstation)?;
        if let Some(os_version) = &self.os_version {
            writer.write_bytes(&os_version.to_bytes());
        }
        Ok(writer.finish())
    }
}
impl TryFrom<&[u8]> for NegotiateMessage {
    type Error = ParsingError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        expect_message_type(value, NEGOTIATE_MESSAGE_TYPE)?;

        let flags = Flags::from_bits_retain(read_u32_le(value, 12)?);
        let domain_secbuf = SecurityBuffer::read(value, 16)?;
        let workstation_secbuf = SecurityBuffer::read(value, 24)?;

        // the version block is present if the payload leaves room for it
        let version_end = COMMON_HEADER_LEN + 4 + 8 + 8 + OS_VERSION_LEN;
        let os_version = match payload_start(&[&domain_secbuf, &workstation_secbuf]) {
            Some(start) if start >= version_end => Some(OsVersion::read(value, 32)?),
            _ => None,
        };

        let supplied_domain = oem_to_string(domain_secbuf.apply_to_slice(value)?);
        let supplied_workstation = oem_to_string(workstation_secbuf.apply_to_slice(value)?);

        Ok(Self {
            flags,
            supplied_domain,
            supplied_workstation,
            os_version,
        })
    }
}


/// The contents of an NTLM Challenge message.
///
/// The Challenge message is sent by the server in response to the client's Negotiate message; the
/// client is expected to respond with an Authenticate message.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChallengeMessage {
    /// The name of the server or domain against which the client is authenticating.
    pub target_name: String,

    /// Stores which NTLM behavior has been accepted by the server from the client's request.
    pub flags: Flags,

    /// The challenge value.
    pub challenge: [u8; 8],

    /// The context value. Reserved; servers send zero.
    pub context: u64,

    /// Information about the target of the authentication. Only transmitted if
    /// [`Flags::NEGOTIATE_TARGET_INFO`] is set.
    pub target_information: TargetInfo,

    /// Version information about the server's operating system. Present exactly if
    /// [`Flags::NEGOTIATE_VERSION`] is set.
    pub os_version: Option<OsVersion>,
}

impl ChallengeMessage {
    const TARGET_INFO_SECBUF_POS: usize = 40;
    const OS_VERSION_POS: usize = 48;

    /// Serializes the Challenge message into bytes.
    ///
    /// Fails if `os_version` disagrees with [`Flags::NEGOTIATE_VERSION`] or if target information
    /// is given without [`Flags::NEGOTIATE_TARGET_INFO`], since neither could be parsed back.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        let sends_target_info = self.flags.contains(Flags::NEGOTIATE_TARGET_INFO);
        if self.os_version.is_some() != self.flags.contains(Flags::NEGOTIATE_VERSION) {
            return Err(StoringError::VersionFlagMismatch);
        }
        if !sends_target_info && !self.target_information.is_empty() {
            return Err(StoringError::TargetInfoFlagMismatch);
        }

        // the version block sits behind the target information secbuffer
        let has_target_info_secbuf = sends_target_info || self.os_version.is_some();

        let header_len: u32
            = COMMON_HEADER_LEN
            + 8 // target name secbuffer
            + 4 // flags
            + 8 // challenge
            + 8 // context
            + if has_target_info_secbuf { 8 } else { 0 }
            + if self.os_version.is_some() { OS_VERSION_LEN } else { 0 }
            ;

        let target_name = encode_text(self.flags, &self.target_name)?;

        let mut writer = MessageWriter::new(header_len);
        writer.write_bytes(&NTLMSSP_SIGNATURE);
        writer.write_bytes(&CHALLENGE_MESSAGE_TYPE.to_le_bytes());
        writer.append_buffer(&target_name)?;
        writer.write_bytes(&self.flags.bits().to_le_bytes());
        writer.write_bytes(&self.challenge);
        writer.write_bytes(&self.context.to_le_bytes());
        if has_target_info_secbuf {
            let target_info_bytes = if sends_target_info {
                self.target_information.to_bytes()?
            } else {
                Vec::new()
            };
            writer.append_buffer(&target_info_bytes)?;
        }
        if let Some(os_version) = &self.os_version {
            writer.write_bytes(&os_version.to_bytes());
        }
        Ok(writer.finish())
    }
}
impl TryFrom<&[u8]> for ChallengeMessage {
    type Error = ParsingError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        expect_message_type(value, CHALLENGE_MESSAGE_TYPE)?;

        let target_name_secbuf = SecurityBuffer::read(value, 12)?;
        let flags = Flags::from_bits_retain(read_u32_le(value, 20)?);
        let challenge: [u8; 8] = read_array(value, 24)?;
        let context = read_u64_le(value, 32)?;

        // the target info secbuffer only exists if the payload begins behind it
        let target_info_end = Self::TARGET_INFO_SECBUF_POS + SecurityBuffer::SIZE;
        let has_target_info_secbuf = payload_start(&[&target_name_secbuf])
            .map_or(false, |start| start as usize >= target_info_end);
        let target_info_secbuf = if flags.contains(Flags::NEGOTIATE_TARGET_INFO) && has_target_info_secbuf {
            Some(SecurityBuffer::read(value, Self::TARGET_INFO_SECBUF_POS)?)
        } else {
            None
        };

        let os_version = if flags.contains(Flags::NEGOTIATE_VERSION) {
            let version_end = Self::OS_VERSION_POS + OS_VERSION_LEN as usize;
            let mut secbufs = vec![&target_name_secbuf];
            secbufs.extend(target_info_secbuf.as_ref());
            let overlaps_payload = payload_start(&secbufs)
                .map_or(false, |start| (start as usize) < version_end);
            if value.len() < version_end || overlaps_payload {
                return Err(ParsingError::VersionBlockMismatch);
            }
            Some(OsVersion::read(value, Self::OS_VERSION_POS)?)
        } else {
            None
        };

        let target_name = ntlm_bytes_to_string(flags, target_name_secbuf.apply_to_slice(value)?)?;
        let target_information = match &target_info_secbuf {
            Some(secbuf) => TargetInfo::try_from(secbuf.apply_to_slice(value)?)?,
            None => TargetInfo::default(),
        };

        debug!(
            flags = format_args!("{:#010x}", flags.bits()),
            target_name = %target_name,
            target_info_entries = target_information.entries.len(),
            has_version = os_version.is_some(),
            "parsed NTLM challenge"
        );

        Ok(Self {
            target_name,
            flags,
            challenge,
            context,
            target_information,
            os_version,
        })
    }
}


/// The contents of an NTLM Authenticate message.
///
/// The Authenticate message is sent by the client in response to the server's Challenge message;
/// once it is accepted by the server, the authentication has succeeded.
///
/// The session key buffer and the flags word are transmitted together: if either is `Some`, both
/// are written, the missing one as empty. Text is encoded as UTF-16 unless `flags` selects OEM
/// without Unicode.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AuthenticateMessage {
    pub lm_response: Vec<u8>,
    pub nt_response: Vec<u8>,
    pub domain_name: String,
    pub user_name: String,
    pub workstation_name: String,
    pub session_key: Option<Vec<u8>>,
    pub flags: Option<Flags>,
    pub os_version: Option<OsVersion>,
}

impl AuthenticateMessage {
    /// Five security buffers for responses and names.
    const BASE_HEADER_LEN: u32 = COMMON_HEADER_LEN + 5 * 8;

    /// Session key security buffer and flags.
    const KEY_BLOCK_LEN: u32 = 8 + 4;

    fn has_key_block(&self) -> bool {
        self.session_key.is_some() || self.flags.is_some()
    }

    /// Serializes the Authenticate message into bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        let has_key_block = self.has_key_block();
        let header_len: u32
            = Self::BASE_HEADER_LEN
            + if has_key_block { Self::KEY_BLOCK_LEN } else { 0 }
            + if self.os_version.is_some() { OS_VERSION_LEN } else { 0 }
            ;

        let text_flags = authenticate_text_flags(self.flags);
        let domain_name = encode_text(text_flags, &self.domain_name)?;
        let user_name = encode_text(text_flags, &self.user_name)?;
        let workstation_name = encode_text(text_flags, &self.workstation_name)?;

        let mut writer = MessageWriter::new(header_len);
        writer.write_bytes(&NTLMSSP_SIGNATURE);
        writer.write_bytes(&AUTHENTICATE_MESSAGE_TYPE.to_le_bytes());
        writer.append_buffer(&self.lm_response)?;
        writer.append_buffer(&self.nt_response)?;
        writer.append_buffer(&domain_name)?;
        writer.append_buffer(&user_name)?;
        writer.append_buffer(&workstation_name)?;
        if has_key_block {
            writer.append_buffer(self.session_key.as_deref().unwrap_or(&[]))?;
            writer.write_bytes(&self.flags.unwrap_or_default().bits().to_le_bytes());
        }
        if let Some(os_version) = &self.os_version {
            writer.write_bytes(&os_version.to_bytes());
        }
        Ok(writer.finish())
    }
}
impl TryFrom<&[u8]> for AuthenticateMessage {
    type Error = ParsingError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        expect_message_type(value, AUTHENTICATE_MESSAGE_TYPE)?;

        let lm_response_secbuf = SecurityBuffer::read(value, 12)?;
        let nt_response_secbuf = SecurityBuffer::read(value, 20)?;
        let domain_name_secbuf = SecurityBuffer::read(value, 28)?;
        let user_name_secbuf = SecurityBuffer::read(value, 36)?;
        let workstation_name_secbuf = SecurityBuffer::read(value, 44)?;

        // optional blocks are present if the payload begins behind them
        let start = payload_start(&[
            &lm_response_secbuf, &nt_response_secbuf, &domain_name_secbuf,
            &user_name_secbuf, &workstation_name_secbuf,
        ]).unwrap_or(0);
        let key_block_end = Self::BASE_HEADER_LEN + Self::KEY_BLOCK_LEN;
        let version_end = key_block_end + OS_VERSION_LEN;

        let (session_key_secbuf, flags) = if start >= key_block_end {
            let secbuf = SecurityBuffer::read(value, 52)?;
            let flags = Flags::from_bits_retain(read_u32_le(value, 60)?);
            (Some(secbuf), Some(flags))
        } else {
            (None, None)
        };
        let os_version = if start >= version_end {
            Some(OsVersion::read(value, key_block_end as usize)?)
        } else {
            None
        };
        trace!(payload_start = start, has_flags = flags.is_some(), has_version = os_version.is_some(), "parsing NTLM authenticate");

        let text_flags = authenticate_text_flags(flags);
        let lm_response = Vec::from(lm_response_secbuf.apply_to_slice(value)?);
        let nt_response = Vec::from(nt_response_secbuf.apply_to_slice(value)?);
        let domain_name = ntlm_bytes_to_string(text_flags, domain_name_secbuf.apply_to_slice(value)?)?;
        let user_name = ntlm_bytes_to_string(text_flags, user_name_secbuf.apply_to_slice(value)?)?;
        let workstation_name = ntlm_bytes_to_string(text_flags, workstation_name_secbuf.apply_to_slice(value)?)?;
        let session_key = match &session_key_secbuf {
            Some(secbuf) => Some(Vec::from(secbuf.apply_to_slice(value)?)),
            None => None,
        };

        Ok(Self {
            lm_response,
            nt_response,
            domain_name,
            user_name,
            workstation_name,
            session_key,
            flags,
            os_version,
        })
    }
}


// text and header helpers


/// Reads signature and message type, returning the latter.
fn read_message_type(value: &[u8]) -> Result<u32, ParsingError> {
    let header_len = COMMON_HEADER_LEN as usize;
    if value.len() < header_len {
        return Err(ParsingError::ShortHeader { expected_min_len: header_len, obtained_len: value.len() });
    }
    let signature: [u8; 8] = read_array(value, 0)?;
    if signature != NTLMSSP_SIGNATURE {
        return Err(ParsingError::SignatureMismatch { expected: NTLMSSP_SIGNATURE, obtained: Vec::from(signature) });
    }
    read_u32_le(value, 8)
}

fn expect_message_type(value: &[u8], expected: u32) -> Result<(), ParsingError> {
    let obtained = read_message_type(value)?;
    if obtained != expected {
        return Err(ParsingError::WrongMessageType { expected, obtained });
    }
    Ok(())
}

/// The Authenticate message is Unicode unless the client explicitly settled on OEM.
fn authenticate_text_flags(flags: Option<Flags>) -> Flags {
    match flags {
        Some(f) if f.contains(Flags::NEGOTIATE_OEM) && !f.contains(Flags::NEGOTIATE_UNICODE) => Flags::NEGOTIATE_OEM,
        _ => Flags::NEGOTIATE_UNICODE,
    }
}

/// Encodes a string as UTF-16 in little-endian byte order.
pub(crate) fn string_to_utf16_le_bytes(string: &str) -> Vec<u8> {
    string.encode_utf16()
        .flat_map(|w| w.to_le_bytes())
        .collect()
}

/// Converts UTF-16 values stored as bytes in little-endian format into a string.
pub(crate) fn utf16_le_bytes_to_string(bytes: &[u8]) -> Result<String, ParsingError> {
    if bytes.len() % 2 != 0 {
        return Err(ParsingError::ItemLengthNotDivisible { expected_divisor: 2, obtained_length: bytes.len() });
    }
    let u16s: Vec<u16> = bytes.chunks_exact(2)
        .map(|chk| u16::from_le_bytes([chk[0], chk[1]]))
        .collect();
    String::from_utf16(&u16s)
        .or(Err(ParsingError::InvalidUtf16 { value: u16s }))
}

fn encode_oem(string: &str) -> Result<Vec<u8>, StoringError> {
    string_to_oem(string)
        .ok_or_else(|| StoringError::NonOemEncodable { string: string.to_owned() })
}

/// Encodes a string as UTF-16 or OEM text, depending on the `flags`.
fn encode_text(flags: Flags, string: &str) -> Result<Vec<u8>, StoringError> {
    if flags.contains(Flags::NEGOTIATE_UNICODE) {
        Ok(string_to_utf16_le_bytes(string))
    } else if flags.contains(Flags::NEGOTIATE_OEM) {
        encode_oem(string)
    } else {
        Err(StoringError::NeitherUnicodeNorOem)
    }
}

/// Decodes UTF-16 or OEM text, depending on the `flags`.
fn ntlm_bytes_to_string(flags: Flags, bytes: &[u8]) -> Result<String, ParsingError> {
    if flags.contains(Flags::NEGOTIATE_UNICODE) {
        utf16_le_bytes_to_string(bytes)
    } else if flags.contains(Flags::NEGOTIATE_OEM) {
        Ok(oem_to_string(bytes))
    } else {
        Err(ParsingError::NeitherUnicodeNorOem)
    }
}
