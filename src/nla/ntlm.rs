use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use hmac::{Hmac, Mac};
use md4::Md4;
use md5::{Digest, Md5};
use std::io::{Cursor, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::model::error::{RdpErrorKind, RdpResult};
use crate::model::rnd::random;
use crate::model::unicode::Unicode;
use crate::nla::rc4::Rc4;
use crate::nla::sspi::{AuthenticationProtocol, GenericSecurityService};
use crate::rdp_error;

const NTLM_SIGNATURE: [u8; 8] = *b"NTLMSSP\0";

const NEGOTIATE_MESSAGE: u32 = 0x0000_0001;
const CHALLENGE_MESSAGE: u32 = 0x0000_0002;

const NTLMSSP_NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const NTLMSSP_REQUEST_TARGET: u32 = 0x0000_0004;
const NTLMSSP_NEGOTIATE_SIGN: u32 = 0x0000_0010;
const NTLMSSP_NEGOTIATE_SEAL: u32 = 0x0000_0020;
const NTLMSSP_NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NTLMSSP_NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NTLMSSP_NEGOTIATE_EXTENDED_SESSION_SECURITY: u32 = 0x0008_0000;
const NTLMSSP_NEGOTIATE_128: u32 = 0x2000_0000;
const NTLMSSP_NEGOTIATE_KEY_EXCH: u32 = 0x4000_0000;

/// Flag set announced in the negotiate message
const CLIENT_NEGOTIATE_FLAGS: u32 = NTLMSSP_NEGOTIATE_KEY_EXCH
    | NTLMSSP_NEGOTIATE_128
    | NTLMSSP_NEGOTIATE_EXTENDED_SESSION_SECURITY
    | NTLMSSP_NEGOTIATE_ALWAYS_SIGN
    | NTLMSSP_NEGOTIATE_NTLM
    | NTLMSSP_NEGOTIATE_SEAL
    | NTLMSSP_NEGOTIATE_SIGN
    | NTLMSSP_REQUEST_TARGET
    | NTLMSSP_NEGOTIATE_UNICODE;

/// AvId of the timestamp pair inside the challenge target info
const MSV_AV_EOL: u16 = 0x0000;
const MSV_AV_TIMESTAMP: u16 = 0x0007;

fn hmac_md5(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Md5>::new_from_slice(key).expect("hmac accepts keys of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn md5_digest(data: &[u8]) -> Vec<u8> {
    let mut hash = Md5::new();
    hash.update(data);
    hash.finalize().to_vec()
}

/// NTOWFv2 of MS-NLMP 3.3.2
fn ntowf_v2(password: &str, user: &str, domain: &str) -> Vec<u8> {
    let mut md4 = Md4::new();
    md4.update(password.to_unicode());
    let password_hash = md4.finalize();
    hmac_md5(&password_hash, &(user.to_uppercase() + domain).to_unicode())
}

/// LMOWFv2 is the same derivation
fn lmowf_v2(password: &str, user: &str, domain: &str) -> Vec<u8> {
    ntowf_v2(password, user, domain)
}

/// ComputeResponse of MS-NLMP 3.3.2 for the v2 flavor
///
/// Returns the NT response, the LM response and the session
/// base key
fn compute_response_v2(
    response_key_nt: &[u8],
    response_key_lm: &[u8],
    server_challenge: &[u8],
    client_challenge: &[u8],
    time: u64,
    target_info: &[u8],
) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
    let mut temp = Vec::new();
    // response version and hi response version
    temp.extend_from_slice(&[0x01, 0x01]);
    temp.extend_from_slice(&[0u8; 6]);
    temp.extend_from_slice(&time.to_le_bytes());
    temp.extend_from_slice(client_challenge);
    temp.extend_from_slice(&[0u8; 4]);
    temp.extend_from_slice(target_info);
    temp.extend_from_slice(&[0u8; 4]);

    let mut challenge_and_temp = server_challenge.to_vec();
    challenge_and_temp.extend_from_slice(&temp);
    let nt_proof = hmac_md5(response_key_nt, &challenge_and_temp);

    let mut nt_response = nt_proof.clone();
    nt_response.extend_from_slice(&temp);

    let mut both_challenges = server_challenge.to_vec();
    both_challenges.extend_from_slice(client_challenge);
    let mut lm_response = hmac_md5(response_key_lm, &both_challenges);
    lm_response.extend_from_slice(client_challenge);

    let session_base_key = hmac_md5(response_key_nt, &nt_proof);

    (nt_response, lm_response, session_base_key)
}

/// RC4 with a fresh key over a whole message
fn rc4k(key: &[u8], plaintext: &[u8]) -> Vec<u8> {
    Rc4::new(key).process(plaintext)
}

/// Signing and sealing keys of MS-NLMP 3.4.5.2 and 3.4.5.3
fn generate_key(exported_session_key: &[u8], magic: &[u8]) -> Vec<u8> {
    let mut input = exported_session_key.to_vec();
    input.extend_from_slice(magic);
    md5_digest(&input)
}

const CLIENT_SIGNING_MAGIC: &[u8] = b"session key to client-to-server signing key magic constant\0";
const SERVER_SIGNING_MAGIC: &[u8] = b"session key to server-to-client signing key magic constant\0";
const CLIENT_SEALING_MAGIC: &[u8] = b"session key to client-to-server sealing key magic constant\0";
const SERVER_SEALING_MAGIC: &[u8] = b"session key to server-to-client sealing key magic constant\0";

/// Current time as a FILETIME, used when the server sent no
/// timestamp in its target info
fn filetime_now() -> u64 {
    let unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    (unix + 11_644_473_600) * 10_000_000
}

/// Server challenge fields we care about
struct Challenge {
    negotiate_flags: u32,
    server_challenge: [u8; 8],
    target_info: Vec<u8>,
    timestamp: u64,
}

fn read_challenge_message(data: &[u8]) -> RdpResult<Challenge> {
    if data.len() < 48 || data[0..8] != NTLM_SIGNATURE {
        return Err(rdp_error!(RdpErrorKind::InvalidData, "malformed NTLM challenge"));
    }

    let mut stream = Cursor::new(data);
    stream.set_position(8);
    if stream.read_u32::<LittleEndian>()? != CHALLENGE_MESSAGE {
        return Err(rdp_error!(RdpErrorKind::UnexpectedType, "not an NTLM challenge"));
    }

    // target name field, resolved through its absolute offset
    let _target_name_length = stream.read_u16::<LittleEndian>()?;
    let _target_name_max_length = stream.read_u16::<LittleEndian>()?;
    let _target_name_offset = stream.read_u32::<LittleEndian>()?;

    let negotiate_flags = stream.read_u32::<LittleEndian>()?;

    let mut server_challenge = [0u8; 8];
    std::io::Read::read_exact(&mut stream, &mut server_challenge)?;

    let mut reserved = [0u8; 8];
    std::io::Read::read_exact(&mut stream, &mut reserved)?;

    let target_info_length = stream.read_u16::<LittleEndian>()? as usize;
    let _target_info_max_length = stream.read_u16::<LittleEndian>()?;
    let target_info_offset = stream.read_u32::<LittleEndian>()? as usize;

    if target_info_offset + target_info_length > data.len() {
        return Err(rdp_error!(RdpErrorKind::InvalidSize, "NTLM target info out of bounds"));
    }
    let target_info = data[target_info_offset..target_info_offset + target_info_length].to_vec();

    // pick the server clock when it advertises one
    let mut timestamp = None;
    let mut pairs = Cursor::new(target_info.as_slice());
    while let Ok(av_id) = pairs.read_u16::<LittleEndian>() {
        let av_length = pairs.read_u16::<LittleEndian>()? as usize;
        if av_id == MSV_AV_EOL {
            break;
        }
        if av_id == MSV_AV_TIMESTAMP && av_length == 8 {
            timestamp = Some(pairs.read_u64::<LittleEndian>()?);
        } else {
            pairs.set_position(pairs.position() + av_length as u64);
        }
    }

    Ok(Challenge {
        negotiate_flags,
        server_challenge,
        target_info,
        timestamp: timestamp.unwrap_or_else(filetime_now),
    })
}

/// One payload field of an NTLM message, written as
/// length, max length and absolute offset
fn write_field(payload_offset: &mut u32, field: &[u8], stream: &mut Cursor<Vec<u8>>) -> RdpResult<()> {
    stream.write_u16::<LittleEndian>(field.len() as u16)?;
    stream.write_u16::<LittleEndian>(field.len() as u16)?;
    stream.write_u32::<LittleEndian>(*payload_offset)?;
    *payload_offset += field.len() as u32;
    Ok(())
}

/// NTLMv2 implementation of the NLA authentication protocol
///
/// https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-nlmp/b38c36ed-2804-4868-a9ff-8dd3182128e4
pub struct Ntlm {
    domain: String,
    user: String,
    password: String,
    response_key_nt: Vec<u8>,
    response_key_lm: Vec<u8>,
    /// Filled once the challenge went through
    exported_session_key: Option<Vec<u8>>,
    negotiate_flags: u32,
}

impl Ntlm {
    pub fn new(domain: String, user: String, password: String) -> Self {
        Ntlm {
            response_key_nt: ntowf_v2(&password, &user, &domain),
            response_key_lm: lmowf_v2(&password, &user, &domain),
            domain,
            user,
            password,
            exported_session_key: None,
            negotiate_flags: CLIENT_NEGOTIATE_FLAGS,
        }
    }
}

impl AuthenticationProtocol for Ntlm {
    /// The negotiate message is fully static for this client
    fn create_negotiate_message(&mut self) -> RdpResult<Vec<u8>> {
        let mut stream = Cursor::new(Vec::new());
        stream.write_all(&NTLM_SIGNATURE)?;
        stream.write_u32::<LittleEndian>(NEGOTIATE_MESSAGE)?;
        stream.write_u32::<LittleEndian>(CLIENT_NEGOTIATE_FLAGS)?;
        // empty domain and workstation fields
        let mut offset = 0;
        write_field(&mut offset, &[], &mut stream)?;
        write_field(&mut offset, &[], &mut stream)?;
        // version placeholder
        stream.write_all(&[0u8; 8])?;
        Ok(stream.into_inner())
    }

    /// Consume the challenge and build the authenticate message
    fn read_challenge(&mut self, request: &[u8]) -> RdpResult<Vec<u8>> {
        let challenge = read_challenge_message(request)?;
        self.negotiate_flags = challenge.negotiate_flags;

        let client_challenge = random(8);
        let (nt_response, lm_response, session_base_key) = compute_response_v2(
            &self.response_key_nt,
            &self.response_key_lm,
            &challenge.server_challenge,
            &client_challenge,
            challenge.timestamp,
            &challenge.target_info,
        );

        // for v2 the key exchange key is the session base key
        let key_exchange_key = session_base_key;
        let (exported_session_key, encrypted_session_key) =
            if challenge.negotiate_flags & NTLMSSP_NEGOTIATE_KEY_EXCH != 0 {
                let exported = random(16);
                let encrypted = rc4k(&key_exchange_key, &exported);
                (exported, encrypted)
            } else {
                (key_exchange_key, Vec::new())
            };

        let domain = self.domain.to_unicode();
        let user = self.user.to_unicode();
        let workstation: Vec<u8> = Vec::new();

        let mut stream = Cursor::new(Vec::new());
        stream.write_all(&NTLM_SIGNATURE)?;
        stream.write_u32::<LittleEndian>(0x0000_0003)?;
        // fixed part is 72 bytes, payload fields follow in order
        let mut offset = 72u32;
        let payload_order = [
            lm_response.as_slice(),
            nt_response.as_slice(),
            domain.as_slice(),
            user.as_slice(),
            workstation.as_slice(),
            encrypted_session_key.as_slice(),
        ];
        write_field(&mut offset, payload_order[0], &mut stream)?;
        write_field(&mut offset, payload_order[1], &mut stream)?;
        write_field(&mut offset, payload_order[2], &mut stream)?;
        write_field(&mut offset, payload_order[3], &mut stream)?;
        write_field(&mut offset, payload_order[4], &mut stream)?;
        write_field(&mut offset, payload_order[5], &mut stream)?;
        stream.write_u32::<LittleEndian>(challenge.negotiate_flags)?;
        // version placeholder
        stream.write_all(&[0u8; 8])?;
        for field in payload_order {
            stream.write_all(field)?;
        }

        self.exported_session_key = Some(exported_session_key);
        Ok(stream.into_inner())
    }

    fn build_security_interface(&self) -> RdpResult<Box<dyn GenericSecurityService + Send>> {
        let exported_session_key = self
            .exported_session_key
            .as_ref()
            .ok_or_else(|| rdp_error!(RdpErrorKind::InvalidAutomata, "no session key before the challenge"))?;

        Ok(Box::new(NtlmSecurityInterface {
            encrypt: Rc4::new(&generate_key(exported_session_key, CLIENT_SEALING_MAGIC)),
            decrypt: Rc4::new(&generate_key(exported_session_key, SERVER_SEALING_MAGIC)),
            signing_key: generate_key(exported_session_key, CLIENT_SIGNING_MAGIC),
            verify_key: generate_key(exported_session_key, SERVER_SIGNING_MAGIC),
            send_seq_num: 0,
        }))
    }

    fn get_domain_name(&self) -> Vec<u8> {
        self.domain.to_unicode()
    }

    fn get_user_name(&self) -> Vec<u8> {
        self.user.to_unicode()
    }

    fn get_password(&self) -> Vec<u8> {
        self.password.to_unicode()
    }
}

/// GSS wrapping bound to the NTLM session keys
///
/// Payloads are sealed first, then the checksum, with the same
/// RC4 stream so ordering is not negotiable
pub struct NtlmSecurityInterface {
    encrypt: Rc4,
    decrypt: Rc4,
    signing_key: Vec<u8>,
    verify_key: Vec<u8>,
    send_seq_num: u32,
}

impl GenericSecurityService for NtlmSecurityInterface {
    fn gss_wrapex(&mut self, data: &[u8]) -> RdpResult<Vec<u8>> {
        let sealed = self.encrypt.process(data);

        let mut to_sign = self.send_seq_num.to_le_bytes().to_vec();
        to_sign.extend_from_slice(data);
        let checksum = hmac_md5(&self.signing_key, &to_sign);
        let sealed_checksum = self.encrypt.process(&checksum[0..8]);

        let mut result = Vec::with_capacity(16 + sealed.len());
        // signature version is always one
        result.extend_from_slice(&1u32.to_le_bytes());
        result.extend_from_slice(&sealed_checksum);
        result.extend_from_slice(&self.send_seq_num.to_le_bytes());
        result.extend_from_slice(&sealed);
        self.send_seq_num += 1;
        Ok(result)
    }

    fn gss_unwrapex(&mut self, data: &[u8]) -> RdpResult<Vec<u8>> {
        if data.len() < 16 {
            return Err(rdp_error!(RdpErrorKind::InvalidSize, "sealed message too short"));
        }
        let signature = &data[0..16];
        let payload = &data[16..];

        let plaintext = self.decrypt.process(payload);
        let checksum = self.decrypt.process(&signature[4..12]);

        let seq_num = &signature[12..16];
        let mut to_sign = seq_num.to_vec();
        to_sign.extend_from_slice(&plaintext);
        let expected = hmac_md5(&self.verify_key, &to_sign);

        if expected[0..8] != checksum[..] {
            return Err(rdp_error!(RdpErrorKind::InvalidChecksum, "NTLM message signature mismatch"));
        }
        Ok(plaintext)
    }
}
