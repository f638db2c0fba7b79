use hex_literal::hex;
use proptest::prelude::*;
use sasl_ntlm::{
    AuthenticateMessage, ChallengeMessage, Flags, Message, NegotiateMessage, OsVersion,
    ParsingError, TargetInfo,
};
use sasl_ntlm::crypto::respond_challenge_classic;


const NEGOTIATE: [u8; 61] = hex!(
    "4e544c4d53535000010000000532000008000800280000000d000d0030000000"
    "0601b11d0000000f6d79446f6d61696e6d79576f726b73746174696f6e"
);

const CHALLENGE_WITHOUT_VERSION: [u8; 158] = hex!(
    "4e544c4d53535000020000000c000c0030000000010281000123456789abcdef"
    "0000000000000000620062003c00000044004f004d00410049004e0002000c00"
    "44004f004d00410049004e0001000c0053004500520056004500520004001400"
    "64006f006d00610069006e002e0063006f006d00030022007300650072007600"
    "650072002e0064006f006d00610069006e002e0063006f006d0000000000"
);

const CHALLENGE_WITH_VERSION: [u8; 232] = hex!(
    "4e544c4d5353500002000000120012003800000005028102a6bcaf32a5513665"
    "00000000000000009e009e004a0000000502ce0e0000000f4c004f0043004100"
    "4c0048004f0053005400020012004c004f00430041004c0048004f0053005400"
    "01001e0056004d0057004100520045002d003500540035004700430039005000"
    "5500040012006c006f00630061006c0068006f00730074000300320076006d00"
    "77006100720065002d00350074003500670063003900700075002e006c006f00"
    "630061006c0068006f0073007400050012006c006f00630061006c0068006f00"
    "7300740000000000"
);

const AUTHENTICATE: [u8; 162] = hex!(
    "4e544c4d53535000030000001800180048000000180018006000000000000000"
    "7800000010001000780000001a001a008800000000000000a200000000000000"
    "0601b11d0000000ff60c9317971c449aafbfc6d944c9062e476fcd57bc42d2ec"
    "bc85c77300aa9feb6af3026cf7918d15f3e2b384de46bedb5400650073007400"
    "75007300650072004d00790057006f0072006b00730074006100740069006f00"
    "6e00"
);


#[test]
fn serializes_negotiate() {
    let msg = NegotiateMessage {
        flags: Flags::from_bits_retain(0x3205),
        supplied_domain: "myDomain".to_owned(),
        supplied_workstation: "myWorkstation".to_owned(),
        os_version: Some(OsVersion::WINDOWS_7_SP1),
    };
    assert_eq!(msg.to_bytes().unwrap(), NEGOTIATE);
    assert_eq!(NegotiateMessage::try_from(&NEGOTIATE[..]).unwrap(), msg);
}

#[test]
fn parses_challenge_without_version() {
    let msg = ChallengeMessage::try_from(&CHALLENGE_WITHOUT_VERSION[..]).unwrap();
    assert_eq!(
        msg.flags,
        Flags::NEGOTIATE_UNICODE | Flags::NEGOTIATE_NTLM | Flags::TARGET_TYPE_DOMAIN | Flags::NEGOTIATE_TARGET_INFO,
    );
    assert_eq!(msg.challenge, hex!("0123456789abcdef"));
    assert_eq!(msg.context, 0);
    assert_eq!(msg.target_name, "DOMAIN");
    assert_eq!(msg.os_version, None);

    let info = &msg.target_information;
    assert_eq!(info.domain_name().as_deref(), Some("DOMAIN"));
    assert_eq!(info.server_name().as_deref(), Some("SERVER"));
    assert_eq!(info.dns_domain_name().as_deref(), Some("domain.com"));
    assert_eq!(info.dns_host_name().as_deref(), Some("server.domain.com"));
    assert_eq!(info.timestamp(), None);
}

#[test]
fn parses_challenge_with_version() {
    let msg = ChallengeMessage::try_from(&CHALLENGE_WITH_VERSION[..]).unwrap();
    assert_eq!(msg.flags.bits(), 42009093);
    assert_eq!(msg.challenge, hex!("a6bcaf32a5513665"));
    assert_eq!(msg.context, 0);
    assert_eq!(msg.target_name, "LOCALHOST");

    let info = &msg.target_information;
    assert_eq!(info.domain_name().as_deref(), Some("LOCALHOST"));
    assert_eq!(info.server_name().as_deref(), Some("VMWARE-5T5GC9PU"));
    assert_eq!(info.dns_domain_name().as_deref(), Some("localhost"));
    assert_eq!(info.dns_host_name().as_deref(), Some("vmware-5t5gc9pu.localhost"));
    assert_eq!(info.dns_forest_name().as_deref(), Some("localhost"));

    let version = msg.os_version.unwrap();
    assert_eq!(version.major_version, 5);
    assert_eq!(version.minor_version, 2);
    assert_eq!(version.build_number, 3790);
    assert_eq!(version.ntlm_revision, OsVersion::NTLMSSP_REVISION_W2K3);
}

#[test]
fn challenges_reserialize_identically() {
    for bytes in [&CHALLENGE_WITHOUT_VERSION[..], &CHALLENGE_WITH_VERSION[..]] {
        let msg = ChallengeMessage::try_from(bytes).unwrap();
        assert_eq!(msg.to_bytes().unwrap(), bytes);
    }
}

#[test]
fn serializes_authenticate() {
    let challenge = ChallengeMessage::try_from(&CHALLENGE_WITH_VERSION[..]).unwrap();
    let response = respond_challenge_classic(&challenge.challenge, "Testpassword").unwrap();
    let msg = AuthenticateMessage {
        lm_response: response.lm_response,
        nt_response: response.nt_response,
        domain_name: String::new(),
        user_name: "Testuser".to_owned(),
        workstation_name: "MyWorkstation".to_owned(),
        session_key: Some(Vec::new()),
        flags: Some(Flags::empty()),
        os_version: Some(OsVersion::WINDOWS_7_SP1),
    };
    assert_eq!(msg.to_bytes().unwrap(), AUTHENTICATE);
    assert_eq!(AuthenticateMessage::try_from(&AUTHENTICATE[..]).unwrap(), msg);
}

#[test]
fn dispatches_on_message_type() {
    assert!(matches!(Message::try_from(&NEGOTIATE[..]), Ok(Message::Negotiate(_))));
    assert!(matches!(Message::try_from(&CHALLENGE_WITH_VERSION[..]), Ok(Message::Challenge(_))));
    assert!(matches!(Message::try_from(&AUTHENTICATE[..]), Ok(Message::Authenticate(_))));
}

#[test]
fn rejects_unterminated_target_info() {
    // drop the terminator and shrink the target info buffer accordingly
    let mut bytes = Vec::from(&CHALLENGE_WITH_VERSION[..]);
    bytes.truncate(bytes.len() - 4);
    bytes[40..42].copy_from_slice(&(0x9Eu16 - 4).to_le_bytes());
    bytes[42..44].copy_from_slice(&(0x9Eu16 - 4).to_le_bytes());
    assert_eq!(ChallengeMessage::try_from(bytes.as_slice()), Err(ParsingError::MissingTerminator));

    assert_eq!(
        TargetInfo::try_from(&hex!("03000c00640065006200690061006e00")[..]),
        Err(ParsingError::MissingTerminator),
    );
}

#[test]
fn rejects_buffer_past_end() {
    let err = Message::try_from(&NEGOTIATE[..NEGOTIATE.len() - 1]).unwrap_err();
    assert_eq!(err, ParsingError::BufferOutOfRange { offset: 48, length: 13, message_len: 60 });
}


fn oem_text() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 .\\-äöüß]{0,24}"
}

proptest! {
    #[test]
    fn negotiate_round_trip(
        flags in any::<u32>(),
        domain in oem_text(),
        workstation in oem_text(),
        version in proptest::option::of((any::<u8>(), any::<u8>(), any::<u16>())),
    ) {
        let msg = NegotiateMessage {
            flags: Flags::from_bits_retain(flags),
            supplied_domain: domain,
            supplied_workstation: workstation,
            os_version: version.map(|(major, minor, build)| OsVersion::new(major, minor, build)),
        };
        let bytes = msg.to_bytes().unwrap();
        prop_assert_eq!(NegotiateMessage::try_from(bytes.as_slice()).unwrap(), msg);
    }

    #[test]
    fn truncated_vectors_fail(cut in 1usize..=232) {
        for vector in [&NEGOTIATE[..], &CHALLENGE_WITHOUT_VERSION[..], &CHALLENGE_WITH_VERSION[..], &AUTHENTICATE[..]] {
            if cut <= vector.len() {
                let truncated = &vector[..vector.len() - cut];
                prop_assert!(Message::try_from(truncated).is_err());
            }
        }
    }
}
