use base64::prelude::{BASE64_STANDARD, Engine};
use hex_literal::hex;
use sasl_ntlm::{Error, MechanismState, NtlmMechanism, ParsingError, SaslMechanism};


const INITIAL_RESPONSE: [u8; 57] = hex!(
    "4e544c4d53535000010000000532000006000600280000000b000b002e000000"
    "0601b11d0000000f646f6d61696e776f726b73746174696f6e"
);

// issued by an Exchange 2003 server
const EXCHANGE_CHALLENGE: [u8; 232] = hex!(
    "4e544c4d5353500002000000120012003800000005028102829f92c122639902"
    "00000000000000009e009e004a0000000502ce0e0000000f4c004f0043004100"
    "4c0048004f0053005400020012004c004f00430041004c0048004f0053005400"
    "01001e0056004d0057004100520045002d003500540035004700430039005000"
    "5500040012006c006f00630061006c0068006f00730074000300320076006d00"
    "77006100720065002d00350074003500670063003900700075002e006c006f00"
    "630061006c0068006f0073007400050012006c006f00630061006c0068006f00"
    "7300740000000000"
);

const EXCHANGE_FINAL: [u8; 150] = hex!(
    "4e544c4d53535000030000001800180048000000180018006000000000000000"
    "7800000008000800780000001600160080000000000000009600000000000000"
    "0601b11d0000000f16f6c64965d6731450d152564394048b89cdef4122751a4e"
    "50ef891c1d8eac10dded7c35e562c875755e10a5434426705400450053005400"
    "57006f0072006b00730074006100740069006f006e00"
);

// issued by dovecot
const DOVECOT_CHALLENGE: [u8; 80] = hex!(
    "4e544c4d53535000020000000c000c00300000000502820078355230d2cad9b8"
    "0000000000000000140014003c000000640065006200690061006e0003000c00"
    "640065006200690061006e0000000000"
);

const DOVECOT_FINAL: [u8; 150] = hex!(
    "4e544c4d53535000030000001800180048000000180018006000000000000000"
    "7800000008000800780000001600160080000000000000009600000000000000"
    "0601b11d0000000f4ee9dd7b8462626764d2d211c3efd3c1323515b834ab95fd"
    "3dd2aa04c26d11ec3e22e4257318bb3d1e4552a139b7663b7400650073007400"
    "57006f0072006b00730074006100740069006f006e00"
);


fn run_exchange(username: &str, password: &str, challenge: &[u8], expected_final: &[u8]) {
    let mut mechanism = NtlmMechanism::new(username, password);
    assert_eq!(mechanism.name(), "NTLM");
    assert!(mechanism.has_initial_response());

    assert_eq!(mechanism.respond(&[]).unwrap(), INITIAL_RESPONSE);
    assert_eq!(mechanism.state(), MechanismState::AwaitingChallenge);

    assert_eq!(mechanism.respond(challenge).unwrap(), expected_final);
    assert!(mechanism.is_completed());

    assert_eq!(
        mechanism.respond(challenge),
        Err(Error::IllegalState { state: MechanismState::Completed }),
    );
}

#[test]
fn exchange_server_exchange() {
    run_exchange("TEST", "TEST", &EXCHANGE_CHALLENGE, &EXCHANGE_FINAL);
}

#[test]
fn dovecot_exchange() {
    run_exchange("test", "test", &DOVECOT_CHALLENGE, &DOVECOT_FINAL);
}

#[test]
fn truncated_challenge_aborts() {
    let mut mechanism = NtlmMechanism::new("test", "test");
    mechanism.respond(&[]).unwrap();

    let truncated = &DOVECOT_CHALLENGE[..DOVECOT_CHALLENGE.len() - 1];
    assert_eq!(
        mechanism.respond(truncated),
        Err(Error::Malformed(ParsingError::BufferOutOfRange { offset: 60, length: 20, message_len: 79 })),
    );
    assert!(mechanism.is_completed());
}

#[test]
fn imap_transcript() {
    // C: a1 AUTHENTICATE NTLM
    // S: +
    // C: <negotiate>
    // S: + <challenge>
    // C: <authenticate>
    let mut mechanism = NtlmMechanism::new("test", "test");

    let negotiate = BASE64_STANDARD.encode(mechanism.respond(&[]).unwrap());
    assert_eq!(negotiate, "TlRMTVNTUAABAAAABTIAAAYABgAoAAAACwALAC4AAAAGAbEdAAAAD2RvbWFpbndvcmtzdGF0aW9u");

    let challenge = BASE64_STANDARD
        .decode("TlRMTVNTUAACAAAADAAMADAAAAAFAoIAeDVSMNLK2bgAAAAAAAAAABQAFAA8AAAAZABlAGIAaQBhAG4AAwAMAGQAZQBiAGkAYQBuAAAAAAA=")
        .unwrap();
    let authenticate = BASE64_STANDARD.encode(mechanism.respond(&challenge).unwrap());
    assert_eq!(
        authenticate,
        concat!(
            "TlRMTVNTUAADAAAAGAAYAEgAAAAYABgAYAAAAAAAAAB4AAAACAAIAHgAAAAWABYAgAAAAAAAAACWAAAAAAAAAAYBsR0AAAAP",
            "Tunde4RiYmdk0tIRw+/TwTI1Fbg0q5X9PdKqBMJtEew+IuQlcxi7PR5FUqE5t2Y7dABlAHMAdABXAG8AcgBrAHMAdABhAHQAaQBvAG4A",
        ),
    );
}
