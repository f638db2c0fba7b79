//! Security buffers and the bookkeeping needed to read and write them.
//!
//! An NTLM message consists of a fixed header followed by a payload block. Variable-length fields
//! are stored in the payload; the header only contains a security buffer (length, capacity,
//! offset) pointing at them. Offsets are relative to the start of the message, signature included.


use crate::error::{ParsingError, StoringError};


/// An NTLM security buffer, pointing to data contained later in the message.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SecurityBuffer {
    pub length: u16,
    pub capacity: u16,
    pub offset: u32,
}

impl SecurityBuffer {
    /// The size of an encoded security buffer in bytes.
    pub const SIZE: usize = 8;

    /// Generates a security buffer for the given slice of bytes, placed at `offset`.
    ///
    /// The length and capacity are both set to the length of the slice.
    pub fn for_slice(slice: &[u8], offset: u32) -> Result<Self, StoringError> {
        let length: u16 = slice.len()
            .try_into()
            .map_err(|_| StoringError::BufferTooLong { length: slice.len() })?;
        Ok(Self {
            length,
            capacity: length,
            offset,
        })
    }

    /// Serializes the security buffer into bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut ret = [0u8; Self::SIZE];
        ret[0..2].copy_from_slice(&self.length.to_le_bytes());
        ret[2..4].copy_from_slice(&self.capacity.to_le_bytes());
        ret[4..8].copy_from_slice(&self.offset.to_le_bytes());
        ret
    }

    /// Reads the security buffer located at `at` within `message`.
    pub fn read(message: &[u8], at: usize) -> Result<Self, ParsingError> {
        let bytes: [u8; Self::SIZE] = read_array(message, at)?;
        Self::try_from(&bytes[..])
    }

    /// Extracts the data the security buffer points to from the complete message.
    ///
    /// Fails unless `offset + length` lies within the message. An empty buffer may point directly
    /// behind the last byte.
    pub fn apply_to_slice<'a>(&self, message: &'a [u8]) -> Result<&'a [u8], ParsingError> {
        let out_of_range = || ParsingError::BufferOutOfRange {
            offset: self.offset,
            length: self.length,
            message_len: message.len(),
        };

        let start = usize::try_from(self.offset)
            .map_err(|_| out_of_range())?;
        let end = start.checked_add(usize::from(self.length))
            .ok_or_else(out_of_range)?;
        if end > message.len() {
            return Err(out_of_range());
        }
        Ok(&message[start..end])
    }
}
impl TryFrom<&[u8]> for SecurityBuffer {
    type Error = ParsingError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() != Self::SIZE {
            return Err(ParsingError::ItemLengthMismatch { expected: Self::SIZE, obtained: value.len() });
        }

        Ok(Self {
            length: read_u16_le(value, 0)?,
            capacity: read_u16_le(value, 2)?,
            offset: read_u32_le(value, 4)?,
        })
    }
}


/// Returns the offset at which the payload of a message begins, judging by its security buffers.
///
/// This is the smallest offset among the non-empty buffers; if all buffers are empty, the
/// smallest offset overall. Used to infer whether optional header blocks are present.
pub(crate) fn payload_start(buffers: &[&SecurityBuffer]) -> Option<u32> {
    buffers.iter()
        .filter(|sb| sb.length > 0)
        .map(|sb| sb.offset)
        .min()
        .or_else(|| buffers.iter().map(|sb| sb.offset).min())
}


/// Assembles a message from a fixed header and a payload block.
///
/// The header length must be known up front since the first security buffer points directly
/// behind it.
#[derive(Debug)]
pub(crate) struct MessageWriter {
    header: Vec<u8>,
    payload: Vec<u8>,
    header_len: u32,
    next_offset: u32,
}
impl MessageWriter {
    pub fn new(header_len: u32) -> Self {
        Self {
            header: Vec::with_capacity(header_len as usize),
            payload: Vec::new(),
            header_len,
            next_offset: header_len,
        }
    }

    /// Appends a fixed-size field to the header.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.header.extend_from_slice(bytes);
    }

    /// Appends a security buffer to the header and its data to the payload.
    pub fn append_buffer(&mut self, data: &[u8]) -> Result<(), StoringError> {
        let sb = SecurityBuffer::for_slice(data, self.next_offset)?;
        self.header.extend_from_slice(&sb.to_bytes());
        self.payload.extend_from_slice(data);

        // the whole message must stay addressable by a 32-bit offset
        self.next_offset = self.next_offset
            .checked_add(u32::from(sb.length))
            .ok_or(StoringError::BufferTooLong { length: self.payload.len() })?;
        Ok(())
    }

    /// Joins header and payload.
    pub fn finish(mut self) -> Vec<u8> {
        debug_assert_eq!(self.header.len(), self.header_len as usize, "precomputed header length is wrong");
        tracing::trace!(header_len = self.header.len(), payload_len = self.payload.len(), "assembled NTLM message");
        self.header.append(&mut self.payload);
        self.header
    }
}


/// Reads `N` bytes at position `at`, failing if the message is too short.
pub(crate) fn read_array<const N: usize>(bytes: &[u8], at: usize) -> Result<[u8; N], ParsingError> {
    bytes.get(at..at.saturating_add(N))
        .and_then(|slice| slice.try_into().ok())
        .ok_or(ParsingError::ShortHeader { expected_min_len: at.saturating_add(N), obtained_len: bytes.len() })
}

pub(crate) fn read_u16_le(bytes: &[u8], at: usize) -> Result<u16, ParsingError> {
    read_array(bytes, at).map(u16::from_le_bytes)
}

pub(crate) fn read_u32_le(bytes: &[u8], at: usize) -> Result<u32, ParsingError> {
    read_array(bytes, at).map(u32::from_le_bytes)
}

pub(crate) fn read_u64_le(bytes: &[u8], at: usize) -> Result<u64, ParsingError> {
    read_array(bytes, at).map(u64::from_le_bytes)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_length_twice() {
        let sb = SecurityBuffer::for_slice(b"myDomain", 0x28).unwrap();
        assert_eq!(sb.to_bytes(), [0x08, 0x00, 0x08, 0x00, 0x28, 0x00, 0x00, 0x00]);
        assert_eq!(SecurityBuffer::try_from(&sb.to_bytes()[..]).unwrap(), sb);
    }

    #[test]
    fn slices_within_bounds() {
        let message = b"0123456789";
        let sb = SecurityBuffer { length: 4, capacity: 4, offset: 6 };
        assert_eq!(sb.apply_to_slice(message).unwrap(), b"6789");

        let empty_at_end = SecurityBuffer { length: 0, capacity: 0, offset: 10 };
        assert_eq!(empty_at_end.apply_to_slice(message).unwrap(), b"");
    }

    #[test]
    fn rejects_out_of_bounds() {
        let message = b"0123456789";
        let overlong = SecurityBuffer { length: 5, capacity: 5, offset: 6 };
        assert_eq!(
            overlong.apply_to_slice(message),
            Err(ParsingError::BufferOutOfRange { offset: 6, length: 5, message_len: 10 }),
        );

        let far_away = SecurityBuffer { length: 0, capacity: 0, offset: u32::MAX };
        assert!(far_away.apply_to_slice(message).is_err());
    }

    #[test]
    fn read_past_end_is_short_header() {
        assert_eq!(
            SecurityBuffer::read(b"\x01\x00\x01\x00", 0),
            Err(ParsingError::ShortHeader { expected_min_len: 8, obtained_len: 4 }),
        );
        assert!(read_u64_le(b"", usize::MAX).is_err());
    }

    #[test]
    fn refuses_oversized_buffer() {
        let data = vec![0u8; usize::from(u16::MAX) + 1];
        assert_eq!(
            SecurityBuffer::for_slice(&data, 0),
            Err(StoringError::BufferTooLong { length: data.len() }),
        );
    }

    #[test]
    fn writer_chains_offsets() {
        let mut writer = MessageWriter::new(2 + 2 * 8);
        writer.write_bytes(b"hd");
        writer.append_buffer(b"abc").unwrap();
        writer.append_buffer(b"de").unwrap();
        let message = writer.finish();

        let first = SecurityBuffer::read(&message, 2).unwrap();
        let second = SecurityBuffer::read(&message, 10).unwrap();
        assert_eq!(first.offset, 18);
        assert_eq!(second.offset, 21);
        assert_eq!(first.apply_to_slice(&message).unwrap(), b"abc");
        assert_eq!(second.apply_to_slice(&message).unwrap(), b"de");
        assert_eq!(payload_start(&[&first, &second]), Some(18));
    }
}
