use bytes::{Buf, BytesMut};
use md5::{Digest, Md5};
use num_bigint::BigUint;
use sha1::Sha1;
use std::io::{Cursor, Read};
use tracing::{debug, warn};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::core::gcc::EncryptionMethod;
use crate::model::data::check_remaining;
use crate::model::error::{RdpErrorKind, RdpResult};
use crate::model::unicode::Unicode;
use crate::nla::rc4::Rc4;
use crate::rdp_error;

/// Basic security header flags
/// https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/e89c1a32-e1d8-4df3-9844-bbd9e0cf0bb4
pub const SEC_EXCHANGE_PKT: u16 = 0x0001;
pub const SEC_ENCRYPT: u16 = 0x0008;
pub const SEC_INFO_PKT: u16 = 0x0040;
pub const SEC_LICENSE_PKT: u16 = 0x0080;
pub const SEC_SECURE_CHECKSUM: u16 = 0x0800;

/// Fast path action security bits
pub const FASTPATH_OUTPUT_SECURE_CHECKSUM: u8 = 0x1;
pub const FASTPATH_OUTPUT_ENCRYPTED: u8 = 0x2;

/// Info PDU flags
const INFO_MOUSE: u32 = 0x0000_0001;
const INFO_DISABLECTRLALTDEL: u32 = 0x0000_0002;
const INFO_AUTOLOGON: u32 = 0x0000_0008;
const INFO_UNICODE: u32 = 0x0000_0010;
const INFO_MAXIMIZESHELL: u32 = 0x0000_0020;
const INFO_LOGONNOTIFY: u32 = 0x0000_0040;
const INFO_ENABLEWINDOWSKEY: u32 = 0x0000_0100;
const INFO_LOGONERRORS: u32 = 0x0010_0000;

/// Keys are refreshed after this many sealed packets
const PACKET_COUNT_BEFORE_UPDATE: u32 = 4096;

const PAD_1: [u8; 40] = [0x36; 40];
const PAD_2: [u8; 48] = [0x5C; 48];

fn md5_digest(input: &[u8]) -> Vec<u8> {
    let mut hash = Md5::new();
    hash.update(input);
    hash.finalize().to_vec()
}

fn sha1_digest(input: &[u8]) -> Vec<u8> {
    let mut hash = Sha1::new();
    hash.update(input);
    hash.finalize().to_vec()
}

/// SaltedHash of MS-RDPBCGR 5.3.5.1
fn salted_hash(input: &[u8], salt: &[u8], client_random: &[u8], server_random: &[u8]) -> Vec<u8> {
    let mut sha_input = salt.to_vec();
    sha_input.extend_from_slice(input);
    sha_input.extend_from_slice(client_random);
    sha_input.extend_from_slice(server_random);
    let sha = sha1_digest(&sha_input);

    let mut md5_input = input.to_vec();
    md5_input.extend_from_slice(&sha);
    md5_digest(&md5_input)
}

/// The A, BB, CCC expansion used for both the master secret
/// and the session key blob
pub(crate) fn expand_48(input: &[u8], salts: [&[u8]; 3], client_random: &[u8], server_random: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(48);
    for salt in salts {
        result.extend(salted_hash(input, salt, client_random, server_random));
    }
    result
}

/// FinalHash of MS-RDPBCGR 5.3.5.1
pub(crate) fn final_hash(key: &[u8], client_random: &[u8], server_random: &[u8]) -> Vec<u8> {
    let mut input = key.to_vec();
    input.extend_from_slice(client_random);
    input.extend_from_slice(server_random);
    md5_digest(&input)
}

/// Reduce the effective strength of a session key
fn apply_key_strength(key: &mut [u8], method: u32) {
    if method == EncryptionMethod::EncryptionFlag40bit as u32 {
        key[0..3].copy_from_slice(&[0xD1, 0x26, 0x9E]);
    } else if method == EncryptionMethod::EncryptionFlag56bit as u32 {
        key[0] = 0xD1;
    }
}

/// The three session keys of the standard security layer
pub struct SessionKeys {
    pub mac_key: Vec<u8>,
    pub decrypt_key: Vec<u8>,
    pub encrypt_key: Vec<u8>,
}

/// Full key ladder of MS-RDPBCGR 5.3.5.1
pub fn derive_keys(client_random: &[u8], server_random: &[u8], method: u32) -> SessionKeys {
    let mut pre_master = client_random[0..24].to_vec();
    pre_master.extend_from_slice(&server_random[0..24]);

    let master = expand_48(&pre_master, [b"A", b"BB", b"CCC"], client_random, server_random);
    let session = expand_48(&master, [b"X", b"YY", b"ZZZ"], client_random, server_random);

    let mut mac_key = session[0..16].to_vec();
    let mut decrypt_key = final_hash(&session[16..32], client_random, server_random);
    let mut encrypt_key = final_hash(&session[32..48], client_random, server_random);

    apply_key_strength(&mut mac_key, method);
    apply_key_strength(&mut decrypt_key, method);
    apply_key_strength(&mut encrypt_key, method);

    SessionKeys {
        mac_key,
        decrypt_key,
        encrypt_key,
    }
}

/// Full 16 byte MAC digest, the license sub protocol uses it
/// unshortened
pub(crate) fn mac_data_full(mac_key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut sha_input = mac_key.to_vec();
    sha_input.extend_from_slice(&PAD_1);
    sha_input.extend_from_slice(&(data.len() as u32).to_le_bytes());
    sha_input.extend_from_slice(data);
    let sha = sha1_digest(&sha_input);

    let mut md5_input = mac_key.to_vec();
    md5_input.extend_from_slice(&PAD_2);
    md5_input.extend_from_slice(&sha);
    md5_digest(&md5_input)
}

/// 8 byte MAC prefix of an encrypted payload, MS-RDPBCGR 5.3.6.1
pub fn mac_data(mac_key: &[u8], data: &[u8]) -> Vec<u8> {
    mac_data_full(mac_key, data)[0..8].to_vec()
}

/// Salted MAC used when SEC_SECURE_CHECKSUM was negotiated,
/// the packet counter enters the digest
pub fn mac_salted_data(mac_key: &[u8], data: &[u8], count: u32) -> Vec<u8> {
    let mut sha_input = mac_key.to_vec();
    sha_input.extend_from_slice(&PAD_1);
    sha_input.extend_from_slice(&(data.len() as u32).to_le_bytes());
    sha_input.extend_from_slice(data);
    sha_input.extend_from_slice(&count.to_le_bytes());
    let sha = sha1_digest(&sha_input);

    let mut md5_input = mac_key.to_vec();
    md5_input.extend_from_slice(&PAD_2);
    md5_input.extend_from_slice(&sha);
    md5_digest(&md5_input)[0..8].to_vec()
}

/// Session key refresh of MS-RDPBCGR 5.3.7.1
pub fn update_key(initial_key: &[u8], current_key: &[u8], method: u32) -> Vec<u8> {
    let mut sha_input = initial_key.to_vec();
    sha_input.extend_from_slice(&PAD_1);
    sha_input.extend_from_slice(current_key);
    let sha = sha1_digest(&sha_input);

    let mut md5_input = initial_key.to_vec();
    md5_input.extend_from_slice(&PAD_2);
    md5_input.extend_from_slice(&sha);
    let temp_key = md5_digest(&md5_input);

    let mut new_key = Rc4::new(&temp_key).process(&temp_key);
    apply_key_strength(&mut new_key, method);
    new_key
}

/// RSA public key of the server certificate
///
/// The modulus is kept in the little endian order the
/// protocol uses on the wire
pub struct PublicKey {
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
}

impl PublicKey {
    /// Raw RSA of a client secret, little endian in and out
    pub fn encrypt_le(&self, plaintext: &[u8]) -> Vec<u8> {
        let n = BigUint::from_bytes_le(&self.modulus);
        let e = BigUint::from_bytes_le(&self.exponent);
        let m = BigUint::from_bytes_le(plaintext);
        let mut cipher = m.modpow(&e, &n).to_bytes_le();
        cipher.resize(self.modulus.len(), 0);
        cipher
    }
}

const RSA1_MAGIC: u32 = 0x3141_5352;
const CERT_CHAIN_VERSION_1: u32 = 0x0000_0001;

/// Parse the server certificate of the security data,
/// proprietary or X.509 chain
/// https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/54e72cc6-3422-404c-a6b4-2486db125342
pub fn parse_server_certificate(data: &[u8]) -> RdpResult<PublicKey> {
    let mut stream = Cursor::new(data);
    let version = stream.read_u32::<LittleEndian>()?;

    if version & 0x7FFF_FFFF == CERT_CHAIN_VERSION_1 {
        // proprietary certificate
        let _signature_algorithm = stream.read_u32::<LittleEndian>()?;
        let _key_algorithm = stream.read_u32::<LittleEndian>()?;
        let _blob_type = stream.read_u16::<LittleEndian>()?;
        let _blob_length = stream.read_u16::<LittleEndian>()?;

        if stream.read_u32::<LittleEndian>()? != RSA1_MAGIC {
            return Err(rdp_error!(RdpErrorKind::InvalidData, "invalid RSA1 magic"));
        }
        let key_length = stream.read_u32::<LittleEndian>()? as usize;
        let _bit_length = stream.read_u32::<LittleEndian>()?;
        let _data_length = stream.read_u32::<LittleEndian>()?;
        let mut exponent = vec![0u8; 4];
        stream.read_exact(&mut exponent)?;
        // the trailing eight bytes of the blob are padding
        if key_length < 8 {
            return Err(rdp_error!(RdpErrorKind::InvalidSize, "RSA modulus too short"));
        }
        let mut modulus = vec![0u8; key_length - 8];
        stream.read_exact(&mut modulus)?;
        Ok(PublicKey { modulus, exponent })
    } else {
        // X.509 certificate chain, the leaf holds the key
        let count = stream.read_u32::<LittleEndian>()? as usize;
        let mut leaf = Vec::new();
        for _ in 0..count {
            let length = stream.read_u32::<LittleEndian>()? as usize;
            leaf = vec![0u8; length];
            stream.read_exact(&mut leaf)?;
        }

        let (_, certificate) = x509_parser::parse_x509_certificate(&leaf)
            .map_err(|e| crate::model::error::Error::X509Error(format!("{:?}", e)))?;
        let spki = certificate.tbs_certificate.subject_pki.subject_public_key.data;

        // RSAPublicKey ::= SEQUENCE { modulus INTEGER, publicExponent INTEGER }
        let (modulus_be, exponent_be) = yasna::parse_der(spki, |reader| {
            reader.read_sequence(|sequence| {
                let modulus = sequence.next().read_biguint()?;
                let exponent = sequence.next().read_biguint()?;
                Ok((modulus, exponent))
            })
        })?;

        Ok(PublicKey {
            modulus: modulus_be.to_bytes_le(),
            exponent: exponent_be.to_bytes_le(),
        })
    }
}

/// Client security exchange PDU carrying the RSA sealed
/// client random, MS-RDPBCGR 2.2.1.10
pub fn write_security_exchange(client_random: &[u8], certificate: &PublicKey) -> RdpResult<Vec<u8>> {
    let encrypted = certificate.encrypt_le(client_random);

    let mut result = Vec::new();
    result.extend_from_slice(&SEC_EXCHANGE_PKT.to_le_bytes());
    result.extend_from_slice(&0u16.to_le_bytes());
    result.extend_from_slice(&((encrypted.len() + 8) as u32).to_le_bytes());
    result.extend_from_slice(&encrypted);
    // mandatory zero padding
    result.extend_from_slice(&[0u8; 8]);
    Ok(result)
}

/// Client Info PDU body, everything UTF-16LE NUL terminated
/// https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/732394f5-e2b5-4ac5-8a0a-35345386b0d1
pub fn write_info(domain: &str, username: &str, password: &str) -> Vec<u8> {
    let mut flags = INFO_MOUSE
        | INFO_UNICODE
        | INFO_LOGONNOTIFY
        | INFO_LOGONERRORS
        | INFO_DISABLECTRLALTDEL
        | INFO_ENABLEWINDOWSKEY
        | INFO_MAXIMIZESHELL;
    if !password.is_empty() {
        flags |= INFO_AUTOLOGON;
    }

    let mut result = Vec::new();
    // code page
    result.extend_from_slice(&0u32.to_le_bytes());
    result.extend_from_slice(&flags.to_le_bytes());

    let domain = domain.to_unicode();
    let username = username.to_unicode();
    let password = password.to_unicode();
    // lengths exclude the terminator
    result.extend_from_slice(&(domain.len() as u16).to_le_bytes());
    result.extend_from_slice(&(username.len() as u16).to_le_bytes());
    result.extend_from_slice(&(password.len() as u16).to_le_bytes());
    // alternate shell and working dir stay empty
    result.extend_from_slice(&0u16.to_le_bytes());
    result.extend_from_slice(&0u16.to_le_bytes());
    for string in [domain, username, password, Vec::new(), Vec::new()] {
        result.extend_from_slice(&string);
        result.extend_from_slice(&[0, 0]);
    }

    // extended info for version 5 and later
    // address family AF_INET
    result.extend_from_slice(&2u16.to_le_bytes());
    let address = "0.0.0.0".to_unicode();
    result.extend_from_slice(&((address.len() + 2) as u16).to_le_bytes());
    result.extend_from_slice(&address);
    result.extend_from_slice(&[0, 0]);
    let directory = "C:\\Windows\\System32\\mstscax.dll".to_unicode();
    result.extend_from_slice(&((directory.len() + 2) as u16).to_le_bytes());
    result.extend_from_slice(&directory);
    result.extend_from_slice(&[0, 0]);
    // client time zone
    result.extend_from_slice(&[0u8; 172]);
    // session id
    result.extend_from_slice(&0u32.to_le_bytes());
    // performance flags, disable wallpaper
    result.extend_from_slice(&1u32.to_le_bytes());
    result
}

/// Mutable state of the standard security layer
///
/// When enhanced security (TLS or NLA) was selected the
/// context stays disabled and only frames headers for the
/// Info PDU and license packets
pub struct SecurityContext {
    encryption_enabled: bool,
    secure_checksum: bool,
    encryption_method: u32,
    mac_key: Vec<u8>,
    initial_decrypt_key: Vec<u8>,
    initial_encrypt_key: Vec<u8>,
    current_decrypt_key: Vec<u8>,
    current_encrypt_key: Vec<u8>,
    decrypt_stream: Option<Rc4>,
    encrypt_stream: Option<Rc4>,
    decrypt_count: u32,
    encrypt_count: u32,
}

impl SecurityContext {
    /// Context of an enhanced security session
    pub fn disabled() -> Self {
        SecurityContext {
            encryption_enabled: false,
            secure_checksum: false,
            encryption_method: 0,
            mac_key: Vec::new(),
            initial_decrypt_key: Vec::new(),
            initial_encrypt_key: Vec::new(),
            current_decrypt_key: Vec::new(),
            current_encrypt_key: Vec::new(),
            decrypt_stream: None,
            encrypt_stream: None,
            decrypt_count: 0,
            encrypt_count: 0,
        }
    }

    /// Activate standard encryption with freshly derived keys
    pub fn new(client_random: &[u8], server_random: &[u8], method: u32) -> Self {
        let keys = derive_keys(client_random, server_random, method);
        SecurityContext {
            encryption_enabled: true,
            secure_checksum: false,
            encryption_method: method,
            decrypt_stream: Some(Rc4::new(&keys.decrypt_key)),
            encrypt_stream: Some(Rc4::new(&keys.encrypt_key)),
            mac_key: keys.mac_key,
            initial_decrypt_key: keys.decrypt_key.clone(),
            initial_encrypt_key: keys.encrypt_key.clone(),
            current_decrypt_key: keys.decrypt_key,
            current_encrypt_key: keys.encrypt_key,
            decrypt_count: 0,
            encrypt_count: 0,
        }
    }

    pub fn encryption_enabled(&self) -> bool {
        self.encryption_enabled
    }

    /// Wrap a payload with the basic security header
    ///
    /// With encryption active the payload gains the MAC
    /// prefix and gets sealed with the send stream
    pub fn seal(&mut self, flags: u16, payload: &[u8]) -> RdpResult<Vec<u8>> {
        let mut flags = flags;
        if self.encryption_enabled {
            flags |= SEC_ENCRYPT;
            if self.secure_checksum {
                flags |= SEC_SECURE_CHECKSUM;
            }
        }
        if flags == 0 {
            return Ok(payload.to_vec());
        }

        let mut result = Vec::with_capacity(payload.len() + 12);
        result.extend_from_slice(&flags.to_le_bytes());
        result.extend_from_slice(&0u16.to_le_bytes());

        if flags & SEC_ENCRYPT != 0 {
            self.refresh_encrypt_key();
            let mac = if self.secure_checksum {
                mac_salted_data(&self.mac_key, payload, self.encrypt_count)
            } else {
                mac_data(&self.mac_key, payload)
            };
            let stream = self
                .encrypt_stream
                .as_mut()
                .ok_or_else(|| rdp_error!(RdpErrorKind::InvalidAutomata, "no encryption stream"))?;
            let sealed = stream.process(payload);
            self.encrypt_count += 1;
            result.extend_from_slice(&mac);
            result.extend_from_slice(&sealed);
        } else {
            result.extend_from_slice(payload);
        }
        Ok(result)
    }

    /// Read the basic security header and recover the payload
    ///
    /// Returns the header flags so callers can route license
    /// packets and redirections
    pub fn parse_header(&mut self, payload: &mut BytesMut) -> RdpResult<u16> {
        check_remaining(payload, 4, "security header")?;
        let flags = payload.get_u16_le();
        let _flags_hi = payload.get_u16_le();

        if flags & SEC_ENCRYPT != 0 {
            check_remaining(payload, 8, "security mac")?;
            let mut mac = [0u8; 8];
            mac.copy_from_slice(&payload[0..8]);
            payload.advance(8);

            self.refresh_decrypt_key();
            let stream = self
                .decrypt_stream
                .as_mut()
                .ok_or_else(|| rdp_error!(RdpErrorKind::InvalidAutomata, "no decryption stream"))?;
            let plaintext = stream.process(payload);

            let expected = if flags & SEC_SECURE_CHECKSUM != 0 {
                mac_salted_data(&self.mac_key, &plaintext, self.decrypt_count)
            } else {
                mac_data(&self.mac_key, &plaintext)
            };
            self.decrypt_count += 1;
            if expected != mac {
                return Err(rdp_error!(RdpErrorKind::InvalidChecksum, "invalid packet mac"));
            }

            payload.clear();
            payload.extend_from_slice(&plaintext);
        }
        Ok(flags)
    }

    /// Strip the security envelope of a session phase payload
    pub fn unseal(&mut self, payload: &mut BytesMut) -> RdpResult<()> {
        if self.encryption_enabled {
            self.parse_header(payload)?;
        }
        Ok(())
    }

    /// Fast path variant, the flags ride in the action byte
    pub fn decrypt_fast_path(&mut self, sec_flags: u8, payload: &mut BytesMut) -> RdpResult<()> {
        if sec_flags & FASTPATH_OUTPUT_ENCRYPTED == 0 {
            return Ok(());
        }

        check_remaining(payload, 8, "fast path mac")?;
        let mut mac = [0u8; 8];
        mac.copy_from_slice(&payload[0..8]);
        payload.advance(8);

        self.refresh_decrypt_key();
        let stream = self
            .decrypt_stream
            .as_mut()
            .ok_or_else(|| rdp_error!(RdpErrorKind::InvalidAutomata, "no decryption stream"))?;
        let plaintext = stream.process(payload);

        let expected = if sec_flags & FASTPATH_OUTPUT_SECURE_CHECKSUM != 0 {
            mac_salted_data(&self.mac_key, &plaintext, self.decrypt_count)
        } else {
            mac_data(&self.mac_key, &plaintext)
        };
        self.decrypt_count += 1;
        if expected != mac {
            return Err(rdp_error!(RdpErrorKind::InvalidChecksum, "invalid fast path mac"));
        }

        payload.clear();
        payload.extend_from_slice(&plaintext);
        Ok(())
    }

    fn refresh_decrypt_key(&mut self) {
        if self.decrypt_count == PACKET_COUNT_BEFORE_UPDATE {
            debug!("refreshing the receive session key");
            self.current_decrypt_key = update_key(
                &self.initial_decrypt_key,
                &self.current_decrypt_key,
                self.encryption_method,
            );
            self.decrypt_stream = Some(Rc4::new(&self.current_decrypt_key));
            self.decrypt_count = 0;
        }
    }

    fn refresh_encrypt_key(&mut self) {
        if self.encrypt_count == PACKET_COUNT_BEFORE_UPDATE {
            debug!("refreshing the send session key");
            self.current_encrypt_key = update_key(
                &self.initial_encrypt_key,
                &self.current_encrypt_key,
                self.encryption_method,
            );
            self.encrypt_stream = Some(Rc4::new(&self.current_encrypt_key));
            self.encrypt_count = 0;
        }
    }
}

/// Soft failure on unknown encryption methods, the strongest
/// supported one is announced anyway
pub fn check_encryption_method(method: u32) -> u32 {
    match method {
        m if m == EncryptionMethod::EncryptionFlag40bit as u32
            || m == EncryptionMethod::EncryptionFlag56bit as u32
            || m == EncryptionMethod::EncryptionFlag128bit as u32 =>
        {
            m
        }
        other => {
            warn!("unexpected server encryption method {:#x}", other);
            other
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn randoms() -> (Vec<u8>, Vec<u8>) {
        (vec![0x00; 32], vec![0x01; 32])
    }

    #[test]
    fn test_derive_keys_reference_vectors() {
        let (client, server) = randoms();
        let keys = derive_keys(&client, &server, EncryptionMethod::EncryptionFlag128bit as u32);
        assert_eq!(keys.mac_key, hex::decode("7c1bbbbe57a2872a445d054a65cff49f").unwrap());
        assert_eq!(
            keys.decrypt_key,
            hex::decode("6b676229b1db66960d780c4e5e51127d").unwrap()
        );
        assert_eq!(
            keys.encrypt_key,
            hex::decode("cecb936c81357db0b440b52fa53bc0a6").unwrap()
        );
    }

    #[test]
    fn test_derive_keys_40bit_salt() {
        let (client, server) = randoms();
        let keys = derive_keys(&client, &server, EncryptionMethod::EncryptionFlag40bit as u32);
        assert_eq!(keys.mac_key, hex::decode("d1269ebe57a2872a445d054a65cff49f").unwrap());
    }

    #[test]
    fn test_mac_data_reference_vector() {
        let (client, server) = randoms();
        let keys = derive_keys(&client, &server, EncryptionMethod::EncryptionFlag128bit as u32);
        assert_eq!(
            mac_data(&keys.mac_key, &[0x01, 0x02, 0x03, 0x04]),
            hex::decode("85dc96c4193a34b0").unwrap()
        );
    }

    #[test]
    fn test_seal_and_parse_round_trip() {
        let (client, server) = randoms();
        let method = EncryptionMethod::EncryptionFlag128bit as u32;
        let mut sender = SecurityContext::new(&client, &server, method);
        // the receiving side decrypts with the sender encrypt key
        let keys = derive_keys(&client, &server, method);
        let mut receiver = SecurityContext::new(&client, &server, method);
        receiver.decrypt_stream = Some(Rc4::new(&keys.encrypt_key));

        let sealed = sender.seal(0, b"confirm active").unwrap();
        let mut payload = BytesMut::from(&sealed[..]);
        let flags = receiver.parse_header(&mut payload).unwrap();
        assert_ne!(flags & SEC_ENCRYPT, 0);
        assert_eq!(&payload[..], b"confirm active");
    }

    #[test]
    fn test_parse_detects_bad_mac() {
        let (client, server) = randoms();
        let method = EncryptionMethod::EncryptionFlag128bit as u32;
        let mut sender = SecurityContext::new(&client, &server, method);
        let keys = derive_keys(&client, &server, method);
        let mut receiver = SecurityContext::new(&client, &server, method);
        receiver.decrypt_stream = Some(Rc4::new(&keys.encrypt_key));

        let mut sealed = sender.seal(0, b"confirm active").unwrap();
        // corrupt one mac byte
        sealed[5] ^= 0xFF;
        let mut payload = BytesMut::from(&sealed[..]);
        let result = receiver.parse_header(&mut payload);
        assert_eq!(result.unwrap_err().kind(), RdpErrorKind::InvalidChecksum);
    }

    #[test]
    fn test_disabled_context_passthrough() {
        let mut context = SecurityContext::disabled();
        assert_eq!(context.seal(0, b"data").unwrap(), b"data");

        let mut payload = BytesMut::from(&b"data"[..]);
        context.unseal(&mut payload).unwrap();
        assert_eq!(&payload[..], b"data");
    }

    #[test]
    fn test_rsa_encrypt_little_endian() {
        // n = 3233 = 0x0CA1, e = 17, m = 65 -> c = 2790 = 0x0AE6
        let key = PublicKey {
            modulus: vec![0xA1, 0x0C],
            exponent: vec![0x11],
        };
        assert_eq!(key.encrypt_le(&[65]), [0xE6, 0x0A]);
    }

    #[test]
    fn test_security_exchange_layout() {
        let key = PublicKey {
            modulus: vec![0xA1, 0x0C],
            exponent: vec![0x11],
        };
        let pdu = write_security_exchange(&[65], &key).unwrap();
        // flags, flags hi, length then sealed random and padding
        assert_eq!(&pdu[0..4], [0x01, 0x00, 0x00, 0x00]);
        assert_eq!(&pdu[4..8], [0x0A, 0x00, 0x00, 0x00]);
        assert_eq!(&pdu[8..10], [0xE6, 0x0A]);
        assert_eq!(&pdu[10..18], [0u8; 8]);
    }

    #[test]
    fn test_update_key_changes_value() {
        let (client, server) = randoms();
        let keys = derive_keys(&client, &server, EncryptionMethod::EncryptionFlag128bit as u32);
        let updated = update_key(
            &keys.encrypt_key,
            &keys.encrypt_key,
            EncryptionMethod::EncryptionFlag128bit as u32,
        );
        assert_eq!(updated.len(), 16);
        assert_ne!(updated, keys.encrypt_key);
    }

    #[test]
    fn test_info_pdu_lengths() {
        let info = write_info("dom", "user", "pass");
        // code page then flags with autologon
        assert_eq!(&info[0..4], [0, 0, 0, 0]);
        let flags = u32::from_le_bytes([info[4], info[5], info[6], info[7]]);
        assert_ne!(flags & INFO_AUTOLOGON, 0);
        // cbDomain excludes the terminator
        assert_eq!(u16::from_le_bytes([info[8], info[9]]), 6);
        assert_eq!(u16::from_le_bytes([info[10], info[11]]), 8);
        assert_eq!(u16::from_le_bytes([info[12], info[13]]), 8);
    }

    #[test]
    fn test_parse_proprietary_certificate() {
        let mut cert = Vec::new();
        cert.extend_from_slice(&1u32.to_le_bytes());
        // signature and key algorithm
        cert.extend_from_slice(&1u32.to_le_bytes());
        cert.extend_from_slice(&1u32.to_le_bytes());
        // blob type and length
        cert.extend_from_slice(&6u16.to_le_bytes());
        cert.extend_from_slice(&(16u16 + 16 + 8).to_le_bytes());
        cert.extend_from_slice(&RSA1_MAGIC.to_le_bytes());
        // key length includes the padding
        cert.extend_from_slice(&24u32.to_le_bytes());
        cert.extend_from_slice(&1024u32.to_le_bytes());
        cert.extend_from_slice(&127u32.to_le_bytes());
        cert.extend_from_slice(&65537u32.to_le_bytes());
        cert.extend_from_slice(&[0xAB; 16]);
        cert.extend_from_slice(&[0x00; 8]);

        let key = parse_server_certificate(&cert).unwrap();
        assert_eq!(key.modulus, [0xAB; 16]);
        assert_eq!(key.exponent, 65537u32.to_le_bytes());
    }
}
