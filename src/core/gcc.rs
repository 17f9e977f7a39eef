use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use indexmap::IndexMap;
use std::io::{Cursor, Read, Write};

use crate::core::per;
use crate::model::error::{RdpErrorKind, RdpResult};
use crate::model::unicode::Unicode;
use crate::rdp_error;

const T124_02_98_OID: [u8; 6] = [0, 0, 20, 124, 0, 1];
const H221_CS_KEY: [u8; 4] = *b"Duca";
const H221_SC_KEY: [u8; 4] = *b"McDn";

/// RDP protocol version
/// https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/00f1da4a-ee9c-421a-852f-c19f92343d73
#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Version {
    RdpVersion = 0x0008_0001,
    RdpVersion5plus = 0x0008_0004,
    Unknown,
}

impl From<u32> for Version {
    fn from(e: u32) -> Self {
        match e {
            0x0008_0001 => Version::RdpVersion,
            0x0008_0004 => Version::RdpVersion5plus,
            _ => Version::Unknown,
        }
    }
}

/// Color depth
/// This flag is deprecated
#[repr(u16)]
#[derive(Clone, Copy, Debug)]
enum ColorDepth {
    RnsUdColor8BPP = 0xCA01,
}

#[repr(u16)]
#[derive(Clone, Copy, Debug)]
enum Sequence {
    RnsUdSasDel = 0xAA03,
}

/// Keyboard layout
/// https://docs.microsoft.com/en-us/previous-versions/windows/it-pro/windows-vista/cc766503(v=ws.10)
#[repr(u32)]
#[derive(Clone, Copy, Debug)]
pub enum KeyboardLayout {
    Arabic = 0x0000_0401,
    Bulgarian = 0x0000_0402,
    ChineseUsKeyboard = 0x0000_0404,
    Czech = 0x0000_0405,
    Danish = 0x0000_0406,
    German = 0x0000_0407,
    Greek = 0x0000_0408,
    US = 0x0000_0409,
    Spanish = 0x0000_040a,
    Finnish = 0x0000_040b,
    French = 0x0000_040c,
    Hebrew = 0x0000_040d,
    Hungarian = 0x0000_040e,
    Icelandic = 0x0000_040f,
    Italian = 0x0000_0410,
    Japanese = 0x0000_0411,
    Korean = 0x0000_0412,
    Dutch = 0x0000_0413,
    Norwegian = 0x0000_0414,
}

/// `Ibm101102Keys` is the most common keyboard type
#[repr(u32)]
#[derive(Clone, Copy, Debug)]
enum KeyboardType {
    Ibm101102Keys = 0x0000_0004,
}

#[repr(u16)]
#[derive(Clone, Copy, Debug)]
enum HighColor {
    HighColor16BPP = 0x0010,
}

/// Supported color depth announced to the server
#[repr(u16)]
#[derive(Clone, Copy, Debug)]
enum Support {
    RnsUd24BPP = 0x0001,
    RnsUd16BPP = 0x0002,
    RnsUd32BPP = 0x0008,
}

/// Negotiation of some capability for the pdu layer
#[repr(u16)]
#[derive(Clone, Copy, Debug)]
enum CapabilityFlag {
    RnsUdCsSupportErrinfoPDU = 0x0001,
}

/// Supported encryption methods for standard security
/// https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/6b58e11e-a32b-4903-b736-339f3cfe46ec
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncryptionMethod {
    EncryptionFlag40bit = 0x0000_0001,
    EncryptionFlag128bit = 0x0000_0002,
    EncryptionFlag56bit = 0x0000_0008,
    FipsEncryptionFlag = 0x0000_0010,
}

#[repr(u16)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MessageType {
    //server -> client
    ScCore = 0x0C01,
    ScSecurity = 0x0C02,
    ScNet = 0x0C03,
    //client -> server
    CsCore = 0xC001,
    CsSecurity = 0xC002,
    CsNet = 0xC003,
    CsCluster = 0xC004,
    CsMonitor = 0xC005,
    Unknown = 0,
}

impl From<u16> for MessageType {
    fn from(e: u16) -> Self {
        match e {
            0x0C01 => MessageType::ScCore,
            0x0C02 => MessageType::ScSecurity,
            0x0C03 => MessageType::ScNet,
            0xC001 => MessageType::CsCore,
            0xC002 => MessageType::CsSecurity,
            0xC003 => MessageType::CsNet,
            0xC004 => MessageType::CsCluster,
            0xC005 => MessageType::CsMonitor,
            _ => MessageType::Unknown,
        }
    }
}

/// All mandatory fields needed by client core data
#[derive(Clone, Debug)]
pub struct ClientData {
    pub width: u16,
    pub height: u16,
    pub layout: KeyboardLayout,
    pub server_selected_protocol: u32,
    pub rdp_version: Version,
    pub name: String,
}

/// Static channel announced in the client network data
#[derive(Clone, Debug)]
pub struct ChannelDef {
    pub name: String,
    pub options: u32,
}

fn write_block_header(data_type: MessageType, length: u16, s: &mut dyn Write) -> RdpResult<()> {
    s.write_u16::<LittleEndian>(data_type as u16)?;
    s.write_u16::<LittleEndian>(length + 4)?;
    Ok(())
}

/// Client core data block
///
/// Most of these fields are obsolete for modern RDP
/// but still need to be present on the wire
/// https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/00f1da4a-ee9c-421a-852f-c19f92343d73
pub fn client_core_data(parameter: &ClientData) -> RdpResult<Vec<u8>> {
    let client_name = if parameter.name.len() >= 16 {
        parameter.name[0..16].to_string()
    } else {
        parameter.name.clone() + &"\x00".repeat(16 - parameter.name.len())
    };

    let mut body = Cursor::new(Vec::new());
    body.write_u32::<LittleEndian>(parameter.rdp_version as u32)?;
    body.write_u16::<LittleEndian>(parameter.width)?;
    body.write_u16::<LittleEndian>(parameter.height)?;
    body.write_u16::<LittleEndian>(ColorDepth::RnsUdColor8BPP as u16)?;
    body.write_u16::<LittleEndian>(Sequence::RnsUdSasDel as u16)?;
    body.write_u32::<LittleEndian>(parameter.layout as u32)?;
    // client build
    body.write_u32::<LittleEndian>(3790)?;
    body.write_all(&client_name.to_unicode())?;
    body.write_u32::<LittleEndian>(KeyboardType::Ibm101102Keys as u32)?;
    // keyboard sub type
    body.write_u32::<LittleEndian>(0)?;
    // keyboard function keys
    body.write_u32::<LittleEndian>(12)?;
    // ime file name
    body.write_all(&[0u8; 64])?;
    body.write_u16::<LittleEndian>(ColorDepth::RnsUdColor8BPP as u16)?;
    // client product id
    body.write_u16::<LittleEndian>(1)?;
    // serial number
    body.write_u32::<LittleEndian>(0)?;
    body.write_u16::<LittleEndian>(HighColor::HighColor16BPP as u16)?;
    body.write_u16::<LittleEndian>(Support::RnsUd16BPP as u16 | Support::RnsUd24BPP as u16 | Support::RnsUd32BPP as u16)?;
    body.write_u16::<LittleEndian>(CapabilityFlag::RnsUdCsSupportErrinfoPDU as u16)?;
    // client dig product id
    body.write_all(&[0u8; 64])?;
    // connection type
    body.write_u8(0)?;
    // pad1octet
    body.write_u8(0)?;
    body.write_u32::<LittleEndian>(parameter.server_selected_protocol)?;

    let body = body.into_inner();
    let mut result = Cursor::new(Vec::new());
    write_block_header(MessageType::CsCore, body.len() as u16, &mut result)?;
    result.write_all(&body)?;
    Ok(result.into_inner())
}

/// Client security data, related to the standard RDP security layer
pub fn client_security_data() -> RdpResult<Vec<u8>> {
    let mut result = Cursor::new(Vec::new());
    write_block_header(MessageType::CsSecurity, 8, &mut result)?;
    result.write_u32::<LittleEndian>(
        EncryptionMethod::EncryptionFlag40bit as u32
            | EncryptionMethod::EncryptionFlag56bit as u32
            | EncryptionMethod::EncryptionFlag128bit as u32,
    )?;
    // extended encryption methods
    result.write_u32::<LittleEndian>(0)?;
    Ok(result.into_inner())
}

/// Client network data with the static channel definitions
///
/// The channel id table of the server network data answers
/// in the same order
pub fn client_network_data(channels: &[ChannelDef]) -> RdpResult<Vec<u8>> {
    let mut body = Cursor::new(Vec::new());
    body.write_u32::<LittleEndian>(channels.len() as u32)?;
    for channel in channels {
        let mut name = [0u8; 8];
        let raw = channel.name.as_bytes();
        if raw.len() > 7 {
            return Err(rdp_error!(RdpErrorKind::InvalidSize, "channel name too long"));
        }
        name[..raw.len()].copy_from_slice(raw);
        body.write_all(&name)?;
        body.write_u32::<LittleEndian>(channel.options)?;
    }

    let body = body.into_inner();
    let mut result = Cursor::new(Vec::new());
    write_block_header(MessageType::CsNet, body.len() as u16, &mut result)?;
    result.write_all(&body)?;
    Ok(result.into_inner())
}

/// Wrap the client blocks into a GCC conference create request
pub fn write_conference_create_request(user_data: &[u8]) -> RdpResult<Vec<u8>> {
    let mut result = Cursor::new(vec![]);
    per::write_choice(0, &mut result)?;
    per::write_object_identifier(&T124_02_98_OID, &mut result)?;
    per::write_length(user_data.len() as u16 + 14, &mut result)?;
    per::write_choice(0, &mut result)?;
    per::write_selection(0x08, &mut result)?;
    per::write_numeric_string(b"1", 1, &mut result)?;
    per::write_padding(1, &mut result)?;
    per::write_number_of_set(1, &mut result)?;
    per::write_choice(0xC0, &mut result)?;
    per::write_octet_stream(&H221_CS_KEY, 4, &mut result)?;
    per::write_octet_stream(user_data, 0, &mut result)?;
    Ok(result.into_inner())
}

/// Server security data of the conference create response
///
/// Server random and certificate are only present when the
/// server actually enabled standard encryption
#[derive(Clone, Debug, Default)]
pub struct ServerSecurityData {
    pub encryption_method: u32,
    pub encryption_level: u32,
    pub server_random: Vec<u8>,
    pub server_certificate: Vec<u8>,
}

/// Everything we keep from the conference create response
#[derive(Clone, Debug)]
pub struct ServerData {
    pub channel_ids: Vec<u16>,
    pub rdp_version: Version,
    pub security: ServerSecurityData,
}

fn read_server_core_data(buffer: &mut Cursor<Vec<u8>>) -> RdpResult<Version> {
    Ok(Version::from(buffer.read_u32::<LittleEndian>()?))
}

fn read_server_security_data(buffer: &mut Cursor<Vec<u8>>) -> RdpResult<ServerSecurityData> {
    let mut data = ServerSecurityData {
        encryption_method: buffer.read_u32::<LittleEndian>()?,
        encryption_level: buffer.read_u32::<LittleEndian>()?,
        ..Default::default()
    };

    if data.encryption_method != 0 || data.encryption_level != 0 {
        let random_length = buffer.read_u32::<LittleEndian>()? as usize;
        let certificate_length = buffer.read_u32::<LittleEndian>()? as usize;
        data.server_random = vec![0u8; random_length];
        buffer.read_exact(&mut data.server_random)?;
        data.server_certificate = vec![0u8; certificate_length];
        buffer.read_exact(&mut data.server_certificate)?;
    }
    Ok(data)
}

fn read_server_network_data(buffer: &mut Cursor<Vec<u8>>) -> RdpResult<Vec<u16>> {
    // io channel id is always 1003
    let io_channel = buffer.read_u16::<LittleEndian>()?;
    if io_channel != 1003 {
        return Err(rdp_error!(RdpErrorKind::InvalidRespond, "unexpected MCS io channel id"));
    }
    let count = buffer.read_u16::<LittleEndian>()? as usize;
    let mut channel_ids = Vec::with_capacity(count);
    for _ in 0..count {
        channel_ids.push(buffer.read_u16::<LittleEndian>()?);
    }
    Ok(channel_ids)
}

/// Read a conference create response
pub fn read_conference_create_response(cc_response: &mut dyn Read) -> RdpResult<ServerData> {
    per::read_choice(cc_response)?;
    per::read_object_identifier(&T124_02_98_OID, cc_response)?;
    per::read_length(cc_response)?;
    per::read_choice(cc_response)?;
    per::read_integer_16(1001, cc_response)?;
    per::read_integer(cc_response)?;
    per::read_enumerates(cc_response)?;
    per::read_number_of_set(cc_response)?;
    per::read_choice(cc_response)?;
    per::read_octet_stream(&H221_SC_KEY, 4, cc_response)?;

    let length = per::read_length(cc_response)?;
    let mut blocks = IndexMap::new();
    let mut sub = cc_response.take(u64::from(length));
    loop {
        let message_type = match sub.read_u16::<LittleEndian>() {
            Ok(t) => MessageType::from(t),
            // no more blocks to read
            Err(_) => break,
        };
        let block_length = sub.read_u16::<LittleEndian>()? as usize;
        if block_length < 4 {
            return Err(rdp_error!(RdpErrorKind::InvalidSize, "invalid GCC block length"));
        }

        let mut body = vec![0u8; block_length - 4];
        sub.read_exact(&mut body)?;
        blocks.insert(message_type, Cursor::new(body));
    }

    let rdp_version = read_server_core_data(
        blocks
            .get_mut(&MessageType::ScCore)
            .ok_or_else(|| rdp_error!(RdpErrorKind::InvalidRespond, "GCC server core data is missing"))?,
    )?;
    let security = read_server_security_data(
        blocks
            .get_mut(&MessageType::ScSecurity)
            .ok_or_else(|| rdp_error!(RdpErrorKind::InvalidRespond, "GCC server security data is missing"))?,
    )?;
    let channel_ids = read_server_network_data(
        blocks
            .get_mut(&MessageType::ScNet)
            .ok_or_else(|| rdp_error!(RdpErrorKind::InvalidRespond, "GCC server network data is missing"))?,
    )?;

    Ok(ServerData {
        channel_ids,
        rdp_version,
        security,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn client_data() -> ClientData {
        ClientData {
            width: 800,
            height: 600,
            layout: KeyboardLayout::US,
            server_selected_protocol: 1,
            rdp_version: Version::RdpVersion5plus,
            name: "test".to_string(),
        }
    }

    #[test]
    fn test_client_core_data_layout() {
        let body = client_core_data(&client_data()).unwrap();
        // header + fixed size core block
        assert_eq!(body.len(), 4 + 212);
        assert_eq!(&body[0..2], [0x01, 0xC0]);
        assert_eq!(&body[2..4], [0xDC, 0x00]);
        // rdp version 5+
        assert_eq!(&body[4..8], [0x04, 0x00, 0x08, 0x00]);
        // width and height
        assert_eq!(&body[8..10], [0x20, 0x03]);
        assert_eq!(&body[10..12], [0x58, 0x02]);
    }

    #[test]
    fn test_client_security_data_methods() {
        let body = client_security_data().unwrap();
        assert_eq!(
            body,
            [0x02, 0xC0, 0x0C, 0x00, 0x0B, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_client_network_data_channel_padding() {
        let body = client_network_data(&[ChannelDef {
            name: "rdpdr".to_string(),
            options: 0x8000_0000,
        }])
        .unwrap();
        assert_eq!(body.len(), 4 + 4 + 12);
        // channel names are zero padded to eight bytes
        assert_eq!(&body[8..16], b"rdpdr\x00\x00\x00");
    }

    #[test]
    fn test_conference_create_request_wrapper() {
        let request = write_conference_create_request(&[0xDE, 0xAD]).unwrap();
        assert_eq!(
            request,
            [
                0x00, 0x05, 0x00, 0x14, 0x7C, 0x00, 0x01, 0x10, 0x00, 0x08, 0x00, 0x10, 0x00, 0x01, 0xC0, 0x00,
                0x44, 0x75, 0x63, 0x61, 0x02, 0xDE, 0xAD
            ]
        );
    }

    #[test]
    fn test_conference_create_response_parse() {
        let mut blocks = Cursor::new(Vec::new());
        // server core
        blocks.write_u16::<LittleEndian>(0x0C01).unwrap();
        blocks.write_u16::<LittleEndian>(8).unwrap();
        blocks.write_u32::<LittleEndian>(0x0008_0004).unwrap();
        // server security, encryption disabled
        blocks.write_u16::<LittleEndian>(0x0C02).unwrap();
        blocks.write_u16::<LittleEndian>(12).unwrap();
        blocks.write_u32::<LittleEndian>(0).unwrap();
        blocks.write_u32::<LittleEndian>(0).unwrap();
        // server network
        blocks.write_u16::<LittleEndian>(0x0C03).unwrap();
        blocks.write_u16::<LittleEndian>(10).unwrap();
        blocks.write_u16::<LittleEndian>(1003).unwrap();
        blocks.write_u16::<LittleEndian>(2).unwrap();
        blocks.write_u16::<LittleEndian>(1004).unwrap();
        blocks.write_u16::<LittleEndian>(1005).unwrap();
        let blocks = blocks.into_inner();

        let mut response = Cursor::new(Vec::new());
        per::write_choice(0, &mut response).unwrap();
        per::write_object_identifier(&T124_02_98_OID, &mut response).unwrap();
        per::write_length(100, &mut response).unwrap();
        per::write_choice(0, &mut response).unwrap();
        per::write_integer_16(1001, 1001, &mut response).unwrap();
        per::write_integer(1, &mut response).unwrap();
        per::write_enumerates(0, &mut response).unwrap();
        per::write_number_of_set(1, &mut response).unwrap();
        per::write_choice(0xC0, &mut response).unwrap();
        per::write_octet_stream(&H221_SC_KEY, 4, &mut response).unwrap();
        per::write_length(blocks.len() as u16, &mut response).unwrap();
        response.write_all(&blocks).unwrap();

        let mut read = Cursor::new(response.into_inner());
        let server_data = read_conference_create_response(&mut read).unwrap();
        assert_eq!(server_data.rdp_version, Version::RdpVersion5plus);
        assert_eq!(server_data.channel_ids, [1004, 1005]);
        assert_eq!(server_data.security.encryption_method, 0);
    }
}
