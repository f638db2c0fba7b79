//! The NTLM authentication mechanism for SASL exchanges, such as IMAP `AUTHENTICATE NTLM`.
//!
//! The crate produces and consumes raw NTLM messages; base64 framing and the surrounding protocol
//! are the caller's business. Sample usage:
//! ```
//! use base64::prelude::{BASE64_STANDARD, Engine};
//! use sasl_ntlm::{NtlmMechanism, SaslMechanism};
//!
//! fn authenticate_lines(username: &str, password: &str, server_challenge_b64: &str) -> Vec<String> {
//!     let mut mechanism = NtlmMechanism::new(username, password);
//!     let mut lines = Vec::new();
//!
//!     // the client speaks first
//!     let negotiate = mechanism.respond(&[])
//!         .expect("failed to build NTLM negotiate message");
//!     lines.push(BASE64_STANDARD.encode(&negotiate));
//!
//!     // answer the server's "+ <challenge>" continuation
//!     let challenge = BASE64_STANDARD.decode(server_challenge_b64)
//!         .expect("challenge is not valid base64");
//!     match mechanism.respond(&challenge) {
//!         Ok(authenticate) => lines.push(BASE64_STANDARD.encode(&authenticate)),
//!         // abort the exchange as IMAP expects
//!         Err(_) => lines.push("*".to_owned()),
//!     }
//!
//!     lines
//! }
//! ```


mod buffer;
pub mod crypto;
mod error;
mod mechanism;
mod message;
mod oem;
mod sasl;
mod target_info;


use bitflags::bitflags;

pub use crate::buffer::SecurityBuffer;
pub use crate::crypto::ChallengeResponse;
pub use crate::error::{CryptoError, Error, ParsingError, StoringError};
pub use crate::mechanism::{DomainFallback, MechanismState, NtlmMechanism, NtlmSettings, ResponseScheme};
pub use crate::message::{
    AuthenticateMessage, ChallengeMessage, Message, NTLMSSP_SIGNATURE, NegotiateMessage, OsVersion,
};
pub use crate::sasl::SaslMechanism;
pub use crate::target_info::{TargetInfo, TargetInfoEntry, TargetInfoType};


/// Standard NTLM credentials, consisting of username, password and domain.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Credentials {
    /// The username part of the credentials.
    pub username: String,

    /// The password part of the credentials.
    pub password: String,

    /// The domain part of the credentials.
    ///
    /// Often specified in combination with the username as `<DOMAIN>\<USERNAME>`. In credentials
    /// without a domain, the domain is an empty string.
    pub domain: String,
}
impl Credentials {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            domain: String::new(),
        }
    }

    pub fn with_domain<D: Into<String>>(mut self, domain: D) -> Self {
        self.domain = domain.into();
        self
    }
}
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}


bitflags! {
    /// NTLM negotiation flags.
    ///
    /// Every bit has a name, so values read from the wire keep all their bits.
    #[derive(Clone, Copy, Debug, Default, Hash, Eq, Ord, PartialEq, PartialOrd)]
    pub struct Flags: u32 {
        /// Text is transmitted as UTF-16.
        const NEGOTIATE_UNICODE = 0x0000_0001;
        /// Text is transmitted in the OEM character set.
        const NEGOTIATE_OEM = 0x0000_0002;
        /// The server should send its name in the Challenge message.
        const REQUEST_TARGET = 0x0000_0004;
        const RESERVED_8 = 0x0000_0008;
        const NEGOTIATE_SIGN = 0x0000_0010;
        const NEGOTIATE_SEAL = 0x0000_0020;
        const NEGOTIATE_DATAGRAM = 0x0000_0040;
        const NEGOTIATE_LANMAN_KEY = 0x0000_0080;
        const NEGOTIATE_NETWARE = 0x0000_0100;
        /// NTLMv1 responses are in use.
        const NEGOTIATE_NTLM = 0x0000_0200;
        const RESERVED_400 = 0x0000_0400;
        const NEGOTIATE_ANONYMOUS = 0x0000_0800;
        /// The Negotiate message carries a domain.
        const NEGOTIATE_DOMAIN_SUPPLIED = 0x0000_1000;
        /// The Negotiate message carries a workstation.
        const NEGOTIATE_WORKSTATION_SUPPLIED = 0x0000_2000;
        const NEGOTIATE_LOCAL_CALL = 0x0000_4000;
        const NEGOTIATE_ALWAYS_SIGN = 0x0000_8000;
        /// The target name is a domain name.
        const TARGET_TYPE_DOMAIN = 0x0001_0000;
        /// The target name is a server name.
        const TARGET_TYPE_SERVER = 0x0002_0000;
        const TARGET_TYPE_SHARE = 0x0004_0000;
        /// NTLM2 session security (extended session security).
        const NEGOTIATE_NTLM2_KEY = 0x0008_0000;
        const REQUEST_INIT_RESPONSE = 0x0010_0000;
        const REQUEST_ACCEPT_RESPONSE = 0x0020_0000;
        const REQUEST_NON_NT_SESSION_KEY = 0x0040_0000;
        /// The Challenge message carries target information.
        const NEGOTIATE_TARGET_INFO = 0x0080_0000;
        const RESERVED_1000000 = 0x0100_0000;
        /// The message carries an OS version block.
        const NEGOTIATE_VERSION = 0x0200_0000;
        const RESERVED_4000000 = 0x0400_0000;
        const RESERVED_8000000 = 0x0800_0000;
        const RESERVED_10000000 = 0x1000_0000;
        const NEGOTIATE_128BIT = 0x2000_0000;
        const NEGOTIATE_KEY_EXCHANGE = 0x4000_0000;
        const NEGOTIATE_56BIT = 0x8000_0000;
    }
}
