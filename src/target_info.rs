//! The target information attribute list carried by the Challenge message.
//!
//! The list consists of entries of the form kind (2 bytes), length (2 bytes), value (length
//! bytes) and ends with an entry of kind 0 and length 0. Name entries are always UTF-16 in
//! little-endian byte order, whatever the negotiated flags say.


use crate::buffer::read_u16_le;
use crate::error::{ParsingError, StoringError};
use crate::message::{string_to_utf16_le_bytes, utf16_le_bytes_to_string};


/// The type of a target information entry.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TargetInfoType {
    Terminator,
    NtServer,
    NtDomain,
    DnsServer,
    DnsDomain,
    DnsForest,
    Flags,
    Timestamp,
    SingleHost,
    TargetName,
    ChannelBindings,
    Unknown(u16),
}
impl From<TargetInfoType> for u16 {
    fn from(t: TargetInfoType) -> Self {
        match t {
            TargetInfoType::Terminator => 0x0000,
            TargetInfoType::NtServer => 0x0001,
            TargetInfoType::NtDomain => 0x0002,
            TargetInfoType::DnsServer => 0x0003,
            TargetInfoType::DnsDomain => 0x0004,
            TargetInfoType::DnsForest => 0x0005,
            TargetInfoType::Flags => 0x0006,
            TargetInfoType::Timestamp => 0x0007,
            TargetInfoType::SingleHost => 0x0008,
            TargetInfoType::TargetName => 0x0009,
            TargetInfoType::ChannelBindings => 0x000A,
            TargetInfoType::Unknown(w) => w,
        }
    }
}
impl From<u16> for TargetInfoType {
    fn from(w: u16) -> Self {
        match w {
            0x0000 => TargetInfoType::Terminator,
            0x0001 => TargetInfoType::NtServer,
            0x0002 => TargetInfoType::NtDomain,
            0x0003 => TargetInfoType::DnsServer,
            0x0004 => TargetInfoType::DnsDomain,
            0x0005 => TargetInfoType::DnsForest,
            0x0006 => TargetInfoType::Flags,
            0x0007 => TargetInfoType::Timestamp,
            0x0008 => TargetInfoType::SingleHost,
            0x0009 => TargetInfoType::TargetName,
            0x000A => TargetInfoType::ChannelBindings,
            other => TargetInfoType::Unknown(other),
        }
    }
}


/// An entry of target information. The value is kept as raw bytes so that entries this crate
/// does not interpret survive unchanged.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TargetInfoEntry {
    pub entry_type: TargetInfoType,
    pub data: Vec<u8>,
}

impl TargetInfoEntry {
    /// Creates a target info entry from an entry type and a string.
    pub fn from_string(entry_type: TargetInfoType, string: &str) -> Self {
        Self {
            entry_type,
            data: string_to_utf16_le_bytes(string),
        }
    }

    /// Attempts to interpret the data of this entry as a UTF-16 string.
    pub fn to_string(&self) -> Result<String, ParsingError> {
        utf16_le_bytes_to_string(&self.data)
    }

    /// Appends the encoded entry to `out`.
    fn write_to(&self, out: &mut Vec<u8>) -> Result<(), StoringError> {
        let entry_type: u16 = self.entry_type.into();
        let length: u16 = self.data.len()
            .try_into()
            .map_err(|_| StoringError::BufferTooLong { length: self.data.len() })?;
        out.extend_from_slice(&entry_type.to_le_bytes());
        out.extend_from_slice(&length.to_le_bytes());
        out.extend_from_slice(&self.data);
        Ok(())
    }
}


/// The ordered list of target information entries, without the terminator.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TargetInfo {
    pub entries: Vec<TargetInfoEntry>,
}

impl TargetInfo {
    pub fn new(entries: Vec<TargetInfoEntry>) -> Self {
        Self { entries }
    }

    /// Whether the list contains no entries besides the terminator.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the list including its terminator.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        let mut ret = Vec::new();
        for entry in &self.entries {
            entry.write_to(&mut ret)?;
        }
        ret.extend_from_slice(&[0, 0, 0, 0]);
        Ok(ret)
    }

    /// Returns the first entry of the given type.
    pub fn entry(&self, entry_type: TargetInfoType) -> Option<&TargetInfoEntry> {
        self.entries.iter()
            .find(|e| e.entry_type == entry_type)
    }

    fn string_entry(&self, entry_type: TargetInfoType) -> Option<String> {
        self.entry(entry_type)
            .and_then(|e| e.to_string().ok())
    }

    /// The NetBIOS domain name of the server.
    pub fn domain_name(&self) -> Option<String> {
        self.string_entry(TargetInfoType::NtDomain)
    }

    /// The NetBIOS name of the server.
    pub fn server_name(&self) -> Option<String> {
        self.string_entry(TargetInfoType::NtServer)
    }

    /// The DNS domain name of the server.
    pub fn dns_domain_name(&self) -> Option<String> {
        self.string_entry(TargetInfoType::DnsDomain)
    }

    /// The fully qualified DNS name of the server.
    pub fn dns_host_name(&self) -> Option<String> {
        self.string_entry(TargetInfoType::DnsServer)
    }

    /// The DNS name of the forest the server belongs to.
    pub fn dns_forest_name(&self) -> Option<String> {
        self.string_entry(TargetInfoType::DnsForest)
    }

    /// The server's current time as a Windows FILETIME value.
    pub fn timestamp(&self) -> Option<i64> {
        self.entry(TargetInfoType::Timestamp)
            .and_then(|e| <[u8; 8]>::try_from(e.data.as_slice()).ok())
            .map(i64::from_le_bytes)
    }
}
impl TryFrom<&[u8]> for TargetInfo {
    type Error = ParsingError;

    /// Decodes entries up to and including the terminator; anything behind it is ignored.
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let mut entries = Vec::new();
        let mut rest = value;
        loop {
            if rest.len() < 4 {
                return Err(ParsingError::MissingTerminator);
            }
            let entry_type: TargetInfoType = read_u16_le(rest, 0)?.into();
            let length = usize::from(read_u16_le(rest, 2)?);
            rest = &rest[4..];

            if entry_type == TargetInfoType::Terminator {
                if length != 0 {
                    // only kind 0 with length 0 ends the list
                    return Err(ParsingError::MissingTerminator);
                }
                break;
            }
            if length > rest.len() {
                return Err(ParsingError::EntryOverrun { declared: length, remaining: rest.len() });
            }

            let (data, next) = rest.split_at(length);
            entries.push(TargetInfoEntry {
                entry_type,
                data: Vec::from(data),
            });
            rest = next;
        }
        Ok(Self { entries })
    }
}
