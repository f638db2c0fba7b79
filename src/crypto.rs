//! Password hashes and challenge response calculation.
//!
//! The classic scheme, which is what the mechanism uses by default, derives two 16-byte hashes
//! from the password and uses each of them as three DES keys to encrypt the server challenge.
//! The NTLM2 session response and NTLMv2 are available for servers that insist on them.


use chrono::Utc;
use cipher::{BlockEncrypt, KeyInit};
use cipher::generic_array::GenericArray;
use cipher::generic_array::typenum::U8;
use des::Des;
use digest::Digest;
use hmac::{Hmac, Mac};
use md4::Md4;
use md5::Md5;
use rand::Rng;
use rand::rngs::OsRng;

use crate::Credentials;
use crate::error::CryptoError;
use crate::message::string_to_utf16_le_bytes;
use crate::oem::string_to_oem;


/// The plaintext encrypted with the password halves to obtain the LM hash.
const LM_MAGIC: [u8; 8] = *b"KGS!@#$%";

/// Number of 100-nanosecond intervals between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_EPOCH: i64 = 116_444_736_000_000_000;


/// The response to an NTLM challenge.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ChallengeResponse {
    /// The LanManager (LM) response, or the value the chosen scheme puts in its place.
    pub lm_response: Vec<u8>,

    /// The NT LanManager (NTLM) response.
    pub nt_response: Vec<u8>,
}


/// Obtains the current time in the format NTLM uses, which is the Windows FILETIME format: tenths
/// of a microsecond since 1601-01-01T00:00:00Z.
pub fn get_ntlm_time() -> i64 {
    let now = Utc::now();
    now.timestamp() * 10_000_000
        + i64::from(now.timestamp_subsec_nanos() / 100)
        + FILETIME_UNIX_EPOCH
}

/// Generates a random 8-byte client challenge.
pub fn random_client_challenge() -> [u8; 8] {
    let mut client_challenge = [0u8; 8];
    OsRng.fill(&mut client_challenge);
    client_challenge
}


/// Spreads 56 key bits over the upper seven bits of eight bytes, as DES expects them. The lowest
/// bit of each byte is the parity bit, which DES ignores.
fn expand_des_key(key: &[u8; 7]) -> [u8; 8] {
    let bits = key.iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    let mut ret = [0u8; 8];
    for (i, b) in ret.iter_mut().enumerate() {
        let group = (bits >> (49 - 7 * i)) & 0x7F;
        *b = (group as u8) << 1;
    }
    ret
}

/// Encrypts one block with single DES under a 56-bit key.
fn des_encrypt(key: &[u8; 7], block: &[u8; 8]) -> [u8; 8] {
    let des_key = expand_des_key(key);
    let des = Des::new(GenericArray::from_slice(&des_key));
    let mut buf: GenericArray<u8, U8> = GenericArray::clone_from_slice(block);
    des.encrypt_block(&mut buf);

    let mut ret = [0u8; 8];
    ret.copy_from_slice(buf.as_slice());
    ret
}

/// Performs the NTLMv1 DES encryption to calculate the response value to the challenge.
///
/// The 16-byte key is padded with zeroes to 21 bytes and split into three 7-byte DES keys; each
/// encrypts `data`, and the three results are concatenated.
pub fn des_long(key: &[u8; 16], data: &[u8; 8]) -> [u8; 24] {
    let mut padded = [0u8; 21];
    padded[0..16].copy_from_slice(key);

    let mut ret = [0u8; 24];
    for (out, key_part) in ret.chunks_exact_mut(8).zip(padded.chunks_exact(7)) {
        let mut des_key = [0u8; 7];
        des_key.copy_from_slice(key_part);
        out.copy_from_slice(&des_encrypt(&des_key, data));
    }
    ret
}

fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> [u8; 16] {
    let mut mac = <Hmac<Md5> as Mac>::new_from_slice(key)
        .expect("HMAC accepts keys of any length");
    for part in parts {
        mac.update(part);
    }
    copy_16(&mac.finalize().into_bytes())
}

fn copy_16(bytes: &[u8]) -> [u8; 16] {
    let mut ret = [0u8; 16];
    ret.copy_from_slice(bytes);
    ret
}

fn server_challenge_array(server_challenge: &[u8]) -> Result<[u8; 8], CryptoError> {
    server_challenge.try_into()
        .map_err(|_| CryptoError::InvalidChallengeLength { obtained: server_challenge.len() })
}


/// Derives the LM hash from a password.
///
/// ```plain
///            ┌────────────┐  ┌─────────────┐  ┌─────────────┐
/// password ──┤ convert to ├──┤ encode as   ├──┤ truncate or ├──┐
///            │ uppercase  │  │ OEM text    │  │ pad to 14 B │  │
///            └────────────┘  └─────────────┘  └─────────────┘  │
///           ┌──────────────────────────────────────────────────┘
///           │┌───────┐
///           └┤ split │           "KGS!@#$%"
///            └─┬───┬─┘               │ input
///         0..7 │   │ 7..14    key ┌──┴──┐ output
///              │   └──────────────┤ DES ├────────────┐
///              │                  └─────┘            │ 8..16
///              │                                  ┌──┴───┐
///              │                 "KGS!@#$%"       │ join ├──── hash
///              │                     │ input      └──┬───┘
///              │              key ┌──┴──┐ output     │ 0..8
///              └──────────────────┤ DES ├────────────┘
///                                 └─────┘
/// ```
///
/// A password that cannot be represented as OEM text yields an all-zero hash.
pub fn lm_hash(password: &str) -> [u8; 16] {
    let mut password_bytes = match string_to_oem(&password.to_uppercase()) {
        Some(bs) => bs,
        None => return [0; 16],
    };
    password_bytes.resize(14, 0x00);

    let mut ret = [0u8; 16];
    for (out, half) in ret.chunks_exact_mut(8).zip(password_bytes.chunks_exact(7)) {
        let mut key = [0u8; 7];
        key.copy_from_slice(half);
        out.copy_from_slice(&des_encrypt(&key, &LM_MAGIC));
    }
    ret
}

/// Derives the NT hash from a password: MD4 over the password encoded as UTF-16 in little-endian
/// byte order.
pub fn nt_hash(password: &str) -> [u8; 16] {
    let mut md4 = <Md4 as Digest>::new();
    md4.update(string_to_utf16_le_bytes(password));
    copy_16(&md4.finalize())
}

/// Calculates the classic 24-byte LM response to the server challenge.
pub fn lm_response(password: &str, server_challenge: &[u8]) -> Result<[u8; 24], CryptoError> {
    let challenge = server_challenge_array(server_challenge)?;
    Ok(des_long(&lm_hash(password), &challenge))
}

/// Calculates the classic 24-byte NT response to the server challenge.
pub fn nt_response(password: &str, server_challenge: &[u8]) -> Result<[u8; 24], CryptoError> {
    let challenge = server_challenge_array(server_challenge)?;
    Ok(des_long(&nt_hash(password), &challenge))
}

/// The NTLMv1 session base key: MD4 over the NT hash.
pub fn ntlm_v1_session_base_key(password: &str) -> [u8; 16] {
    let mut md4 = <Md4 as Digest>::new();
    md4.update(nt_hash(password));
    copy_16(&md4.finalize())
}

/// Derives the NTLMv2 key: HMAC-MD5 keyed with the NT hash over the uppercased username followed
/// by the domain, both as UTF-16 in little-endian byte order.
pub fn ntlm_v2_hash(creds: &Credentials) -> [u8; 16] {
    let upper_user_bytes = string_to_utf16_le_bytes(&creds.username.to_uppercase());
    let domain_bytes = string_to_utf16_le_bytes(&creds.domain);
    hmac_md5(&nt_hash(&creds.password), &[&upper_user_bytes, &domain_bytes])
}


/// The NTLMv2 session base key: HMAC-MD5 keyed with the NTLMv2 hash over the first 16 bytes of
/// the NTLMv2 response.
pub fn ntlm_v2_session_base_key(creds: &Credentials, nt_proof_string: &[u8; 16]) -> [u8; 16] {
    hmac_md5(&ntlm_v2_hash(creds), &[nt_proof_string])
}


/// Calculates the classic LM and NT responses.
pub fn respond_challenge_classic(server_challenge: &[u8], password: &str) -> Result<ChallengeResponse, CryptoError> {
    Ok(ChallengeResponse {
        lm_response: Vec::from(lm_response(password, server_challenge)?),
        nt_response: Vec::from(nt_response(password, server_challenge)?),
    })
}

/// Calculates an NTLM2 session response.
///
/// The NT response encrypts the first half of MD5(server challenge, client challenge) instead of
/// the server challenge itself; the LM response field carries the client challenge padded with
/// zeroes.
pub fn respond_challenge_extended(server_challenge: &[u8], client_challenge: [u8; 8], password: &str) -> Result<ChallengeResponse, CryptoError> {
    let server_challenge = server_challenge_array(server_challenge)?;

    let session_hash: [u8; 8] = {
        let mut md5 = <Md5 as Digest>::new();
        md5.update(server_challenge);
        md5.update(client_challenge);
        let digest = md5.finalize();

        let mut sh = [0u8; 8];
        sh.copy_from_slice(&digest.as_slice()[0..8]);
        sh
    };

    let mut lm_response = vec![0u8; 24];
    lm_response[0..8].copy_from_slice(&client_challenge);

    Ok(ChallengeResponse {
        lm_response,
        nt_response: Vec::from(des_long(&nt_hash(password), &session_hash)),
    })
}

/// Calculates an NTLMv2 response, which includes the target information and a timestamp to
/// protect against replay attacks.
///
/// `target_info` is the encoded target information list including its terminator.
pub fn respond_challenge_ntlm_v2(server_challenge: &[u8], client_challenge: [u8; 8], target_info: &[u8], time: i64, creds: &Credentials) -> Result<ChallengeResponse, CryptoError> {
    let server_challenge = server_challenge_array(server_challenge)?;

    let mut temp = Vec::with_capacity(28 + target_info.len() + 4);
    temp.push(0x01); // response version
    temp.push(0x01); // highest response version understood
    temp.extend_from_slice(&[0; 6]);
    temp.extend_from_slice(&time.to_le_bytes());
    temp.extend_from_slice(&client_challenge);
    temp.extend_from_slice(&[0; 4]);
    temp.extend_from_slice(target_info);
    temp.extend_from_slice(&[0; 4]);

    let ntlm_key = ntlm_v2_hash(creds);
    let nt_proof_string = hmac_md5(&ntlm_key, &[&server_challenge, &temp]);

    let mut nt_response = Vec::with_capacity(16 + temp.len());
    nt_response.extend_from_slice(&nt_proof_string);
    nt_response.extend_from_slice(&temp);

    let mut lm_response = Vec::with_capacity(16 + 8);
    lm_response.extend_from_slice(&hmac_md5(&ntlm_key, &[&server_challenge, &client_challenge]));
    lm_response.extend_from_slice(&client_challenge);

    Ok(ChallengeResponse {
        lm_response,
        nt_response,
    })
}
