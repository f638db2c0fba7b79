//! OEM (8-bit) text conversion.
//!
//! NTLM calls the non-Unicode text encoding the "OEM" character set. Its actual meaning depends on
//! the configuration of the Windows machine; we use ISO-8859-1 everywhere so that the produced
//! messages do not depend on the platform, and every character maps to exactly one byte.


/// Converts the given OEM string into a Rust string.
pub(crate) fn oem_to_string(oem: &[u8]) -> String {
    // ISO-8859-1 maps every byte to the code point of the same value
    oem.iter().map(|&b| char::from(b)).collect()
}


/// Converts the given Rust string into an OEM string, or returns `None` if it contains characters
/// outside of ISO-8859-1.
pub(crate) fn string_to_oem(string: &str) -> Option<Vec<u8>> {
    string.chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_round_trip() {
        let bytes = string_to_oem("Grüße").unwrap();
        assert_eq!(bytes, b"Gr\xFC\xDFe");
        assert_eq!(oem_to_string(&bytes), "Grüße");
    }

    #[test]
    fn rejects_characters_outside_latin1() {
        assert_eq!(string_to_oem("€uro"), None);
        assert_eq!(string_to_oem(""), Some(Vec::new()));
    }
}
