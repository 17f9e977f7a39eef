use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_enum::TryFromPrimitive;
use std::io::{Cursor, Read, Write};
use tracing::debug;

use crate::core::sec::{self, PublicKey};
use crate::model::error::{RdpErrorKind, RdpResult};
use crate::model::rnd::random;
use crate::model::unicode::Unicode;
use crate::nla::rc4::Rc4;
use crate::rdp_error;

/// Licensing packet types of MS-RDPELE
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
pub enum MessageType {
    LicenseRequest = 0x01,
    PlatformChallenge = 0x02,
    NewLicense = 0x03,
    UpgradeLicense = 0x04,
    LicenseInfo = 0x12,
    NewLicenseRequest = 0x13,
    PlatformChallengeResponse = 0x15,
    ErrorAlert = 0xFF,
}

/// Binary blob types
const BB_DATA_BLOB: u16 = 0x0001;
const BB_RANDOM_BLOB: u16 = 0x0002;
const BB_CLIENT_USER_NAME_BLOB: u16 = 0x000F;
const BB_CLIENT_MACHINE_NAME_BLOB: u16 = 0x0010;

/// Error alert codes
const STATUS_VALID_CLIENT: u32 = 0x0000_0007;
const ST_NO_TRANSITION: u32 = 0x0000_0002;

const KEY_EXCHANGE_ALG_RSA: u32 = 0x0000_0001;
/// WinNT post 5.2 image from Microsoft
const CLIENT_PLATFORM_ID: u32 = 0x0401_0000;

/// Preamble version 3 with extended error support
const PREAMBLE_VERSION: u8 = 0x83;

/// What the caller should do with the packet it handed over
#[derive(Debug)]
pub enum LicenseAction {
    /// Send this licensing packet back on the global channel
    Respond(Vec<u8>),
    /// The server granted or waived the license
    Completed,
}

fn write_preamble(message_type: MessageType, body: &[u8]) -> RdpResult<Vec<u8>> {
    let mut result = Cursor::new(Vec::new());
    result.write_u8(message_type as u8)?;
    result.write_u8(PREAMBLE_VERSION)?;
    result.write_u16::<LittleEndian>(body.len() as u16 + 4)?;
    result.write_all(body)?;
    Ok(result.into_inner())
}

fn write_blob(blob_type: u16, data: &[u8], s: &mut dyn Write) -> RdpResult<()> {
    s.write_u16::<LittleEndian>(blob_type)?;
    s.write_u16::<LittleEndian>(data.len() as u16)?;
    s.write_all(data)?;
    Ok(())
}

fn read_blob(s: &mut dyn Read) -> RdpResult<(u16, Vec<u8>)> {
    let blob_type = s.read_u16::<LittleEndian>()?;
    let length = s.read_u16::<LittleEndian>()? as usize;
    let mut data = vec![0u8; length];
    s.read_exact(&mut data)?;
    Ok((blob_type, data))
}

/// Licensing key ladder of MS-RDPELE 5.1.3, note the random
/// order swap between the two expansions
pub fn derive_license_keys(premaster: &[u8], client_random: &[u8], server_random: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let master = sec::expand_48(premaster, [b"A", b"BB", b"CCC"], client_random, server_random);
    let session_blob = sec::expand_48(&master, [b"A", b"BB", b"CCC"], server_random, client_random);

    let mac_salt_key = session_blob[0..16].to_vec();
    let licensing_key = sec::final_hash(&session_blob[16..32], client_random, server_random);
    (mac_salt_key, licensing_key)
}

/// Client side of the license mini exchange
///
/// Entered right after the Info PDU went out, left on
/// NEW_LICENSE or the valid client error alert
pub struct License {
    username: String,
    hostname: String,
    /// Certificate of the MCS security data, used when the
    /// license request does not carry its own
    fallback_certificate: Option<Vec<u8>>,
    client_random: Vec<u8>,
    premaster: Vec<u8>,
    mac_salt_key: Vec<u8>,
    licensing_key: Vec<u8>,
}

impl License {
    pub fn new(username: &str, hostname: &str, fallback_certificate: Option<Vec<u8>>) -> Self {
        License {
            username: username.to_string(),
            hostname: hostname.to_string(),
            fallback_certificate,
            client_random: random(32),
            premaster: random(48),
            mac_salt_key: Vec::new(),
            licensing_key: Vec::new(),
        }
    }

    /// Dispatch one incoming licensing packet
    pub fn handle_packet(&mut self, payload: &[u8]) -> RdpResult<LicenseAction> {
        let mut stream = Cursor::new(payload);
        let message_type = MessageType::try_from(stream.read_u8()?)?;
        let _version = stream.read_u8()?;
        let _size = stream.read_u16::<LittleEndian>()?;

        match message_type {
            MessageType::LicenseRequest => {
                debug!("license request, answering with a new license request");
                self.read_license_request(&mut stream)
            }
            MessageType::PlatformChallenge => {
                debug!("license platform challenge");
                self.read_platform_challenge(&mut stream)
            }
            MessageType::NewLicense | MessageType::UpgradeLicense => {
                debug!("license granted");
                Ok(LicenseAction::Completed)
            }
            MessageType::ErrorAlert => {
                let code = stream.read_u32::<LittleEndian>()?;
                let transition = stream.read_u32::<LittleEndian>()?;
                if code == STATUS_VALID_CLIENT && transition == ST_NO_TRANSITION {
                    debug!("client already holds a valid license");
                    Ok(LicenseAction::Completed)
                } else {
                    Err(rdp_error!(RdpErrorKind::RejectedByServer, "license error alert"))
                }
            }
            _ => Err(rdp_error!(RdpErrorKind::UnexpectedType, "unexpected license packet")),
        }
    }

    /// SERVER_LICENSE_REQUEST in, NEW_LICENSE_REQUEST out
    fn read_license_request(&mut self, stream: &mut Cursor<&[u8]>) -> RdpResult<LicenseAction> {
        let mut server_random = vec![0u8; 32];
        stream.read_exact(&mut server_random)?;

        // product info
        let _product_version = stream.read_u32::<LittleEndian>()?;
        let company_length = stream.read_u32::<LittleEndian>()? as usize;
        let mut company = vec![0u8; company_length];
        stream.read_exact(&mut company)?;
        let product_length = stream.read_u32::<LittleEndian>()? as usize;
        let mut product = vec![0u8; product_length];
        stream.read_exact(&mut product)?;

        // key exchange list then an optional certificate
        let (_, _key_exchange_list) = read_blob(stream)?;
        let (_, server_certificate) = read_blob(stream)?;

        let certificate_data = if server_certificate.is_empty() {
            self.fallback_certificate
                .clone()
                .ok_or_else(|| rdp_error!(RdpErrorKind::InvalidRespond, "no server certificate for licensing"))?
        } else {
            server_certificate
        };
        let certificate = sec::parse_server_certificate(&certificate_data)?;

        let (mac_salt_key, licensing_key) = derive_license_keys(&self.premaster, &self.client_random, &server_random);
        self.mac_salt_key = mac_salt_key;
        self.licensing_key = licensing_key;

        Ok(LicenseAction::Respond(self.write_new_license_request(&certificate)?))
    }

    fn write_new_license_request(&self, certificate: &PublicKey) -> RdpResult<Vec<u8>> {
        let mut encrypted_premaster = certificate.encrypt_le(&self.premaster);
        encrypted_premaster.extend_from_slice(&[0u8; 8]);

        let mut username = self.username.to_unicode();
        username.extend_from_slice(&[0, 0]);
        let mut hostname = self.hostname.to_unicode();
        hostname.extend_from_slice(&[0, 0]);

        let mut body = Cursor::new(Vec::new());
        body.write_u32::<LittleEndian>(KEY_EXCHANGE_ALG_RSA)?;
        body.write_u32::<LittleEndian>(CLIENT_PLATFORM_ID)?;
        body.write_all(&self.client_random)?;
        write_blob(BB_RANDOM_BLOB, &encrypted_premaster, &mut body)?;
        write_blob(BB_CLIENT_USER_NAME_BLOB, &username, &mut body)?;
        write_blob(BB_CLIENT_MACHINE_NAME_BLOB, &hostname, &mut body)?;

        write_preamble(MessageType::NewLicenseRequest, &body.into_inner())
    }

    /// PLATFORM_CHALLENGE in, CLIENT_PLATFORM_CHALLENGE_RESPONSE out
    fn read_platform_challenge(&mut self, stream: &mut Cursor<&[u8]>) -> RdpResult<LicenseAction> {
        // connect flags are reserved
        let _connect_flags = stream.read_u32::<LittleEndian>()?;
        let (_, encrypted_challenge) = read_blob(stream)?;
        let mut mac = [0u8; 16];
        stream.read_exact(&mut mac)?;

        if self.licensing_key.is_empty() {
            return Err(rdp_error!(
                RdpErrorKind::InvalidAutomata,
                "platform challenge before the license request"
            ));
        }

        let challenge = Rc4::new(&self.licensing_key).process(&encrypted_challenge);
        if sec::mac_data_full(&self.mac_salt_key, &challenge) != mac {
            return Err(rdp_error!(RdpErrorKind::InvalidChecksum, "invalid platform challenge mac"));
        }

        // hwid carries the platform id and a stable random tail
        let mut hwid = CLIENT_PLATFORM_ID.to_le_bytes().to_vec();
        hwid.extend_from_slice(&random(16));

        let mut mac_input = challenge.clone();
        mac_input.extend_from_slice(&hwid);
        let response_mac = sec::mac_data_full(&self.mac_salt_key, &mac_input);

        let encrypted_response = Rc4::new(&self.licensing_key).process(&challenge);
        let encrypted_hwid = Rc4::new(&self.licensing_key).process(&hwid);

        let mut body = Cursor::new(Vec::new());
        write_blob(BB_DATA_BLOB, &encrypted_response, &mut body)?;
        write_blob(BB_DATA_BLOB, &encrypted_hwid, &mut body)?;
        body.write_all(&response_mac)?;

        Ok(LicenseAction::Respond(write_preamble(
            MessageType::PlatformChallengeResponse,
            &body.into_inner(),
        )?))
    }
}
