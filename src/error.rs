//! Error types.
//!
//! Parsing, storing and cryptographic failures each have their own type so that the codec and
//! crypto functions can be used without the mechanism; [`Error`] unifies them for
//! [`NtlmMechanism::respond`](crate::NtlmMechanism::respond).


use thiserror::Error;

use crate::mechanism::MechanismState;


/// An error that may occur while parsing an NTLM message. Every variant means the message is
/// malformed and the exchange cannot continue.
#[derive(Clone, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
pub enum ParsingError {
    /// The message is shorter than its fixed header.
    #[error("header too short (expected at least {expected_min_len} bytes, obtained {obtained_len})")]
    ShortHeader { expected_min_len: usize, obtained_len: usize },

    /// The signature does not match `NTLMSSP\0`.
    #[error("mismatched signature (expected {expected:?}, obtained {obtained:?})")]
    SignatureMismatch { expected: [u8; 8], obtained: Vec<u8> },

    /// The message type discriminant is not the one the caller asked for.
    #[error("wrong message type (expected {expected}, obtained {obtained})")]
    WrongMessageType { expected: u32, obtained: u32 },

    /// The message type discriminant is not one of the three known ones.
    #[error("unknown message type {0}")]
    UnknownMessageType(u32),

    /// An internal item has a different length than expected.
    #[error("wrong length for an internal item (expected {expected}, obtained {obtained})")]
    ItemLengthMismatch { expected: usize, obtained: usize },

    /// A security buffer points outside of the message.
    #[error("buffer at offset {offset} with length {length} exceeds the message ({message_len} bytes)")]
    BufferOutOfRange { offset: u32, length: u16, message_len: usize },

    /// The target information list ended without its terminator entry.
    #[error("target information list is missing its terminator")]
    MissingTerminator,

    /// A target information entry declares more data than the list contains.
    #[error("target information entry of length {declared} overruns the list ({remaining} bytes remain)")]
    EntryOverrun { declared: usize, remaining: usize },

    /// The version flag disagrees with the space available for the version block.
    #[error("version flag is set but the message has no room for the version block")]
    VersionBlockMismatch,

    /// An internal item's length is not divisible by an expected divisor.
    #[error("item length {obtained_length} not divisible by {expected_divisor}")]
    ItemLengthNotDivisible { expected_divisor: usize, obtained_length: usize },

    /// A string of 16-bit characters could not be decoded.
    #[error("failed to decode value as UTF-16: {value:?}")]
    InvalidUtf16 { value: Vec<u16> },

    /// Neither Unicode nor OEM encoding was selected.
    #[error("neither Unicode nor OEM encoding was selected")]
    NeitherUnicodeNorOem,
}

/// An error that may occur while writing an NTLM message.
#[derive(Clone, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
pub enum StoringError {
    /// The string cannot be encoded using the OEM encoding.
    #[error("failed to encode {string:?} using OEM encoding")]
    NonOemEncodable { string: String },

    /// Neither Unicode nor OEM encoding was selected.
    #[error("neither Unicode nor OEM encoding was selected")]
    NeitherUnicodeNorOem,

    /// The OS version is present without the version flag, or the other way around.
    #[error("OS version presence disagrees with the version flag")]
    VersionFlagMismatch,

    /// Target information is given but the target information flag is not set.
    #[error("target information is given but the target information flag is not set")]
    TargetInfoFlagMismatch,

    /// The data does not fit into a security buffer.
    #[error("{length} bytes do not fit into a security buffer")]
    BufferTooLong { length: usize },
}

/// An error caused by invalid input to a response computation.
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
pub enum CryptoError {
    /// The server challenge is not exactly 8 bytes long.
    #[error("server challenge must be 8 bytes long, obtained {obtained}")]
    InvalidChallengeLength { obtained: usize },
}

/// Any error that aborts an NTLM authentication attempt.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// The server sent a malformed message.
    #[error("malformed NTLM message: {0}")]
    Malformed(#[from] ParsingError),

    /// A message could not be serialized.
    #[error("failed to store NTLM message: {0}")]
    Storing(#[from] StoringError),

    /// The response could not be computed.
    #[error("failed to compute NTLM response: {0}")]
    Crypto(#[from] CryptoError),

    /// The mechanism was driven in a state that does not accept input.
    #[error("NTLM mechanism cannot respond in state {state:?}")]
    IllegalState { state: MechanismState },
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_convert_into_mechanism_error() {
        let err: Error = ParsingError::MissingTerminator.into();
        assert_eq!(err, Error::Malformed(ParsingError::MissingTerminator));
        assert_eq!(err.to_string(), "malformed NTLM message: target information list is missing its terminator");

        let err: Error = CryptoError::InvalidChallengeLength { obtained: 0 }.into();
        assert_eq!(err.to_string(), "failed to compute NTLM response: server challenge must be 8 bytes long, obtained 0");
    }
}
