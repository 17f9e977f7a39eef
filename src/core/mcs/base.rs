use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_enum::TryFromPrimitive;
use std::io::{Cursor, Read, Write};

use crate::core::{ber, per};
use crate::model::error::{RdpErrorKind, RdpResult};
use crate::rdp_error;

/// T.125 domain PDU discriminants, the two low bits of the
/// opcode byte carry per options
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
pub enum DomainPDU {
    ErectDomainRequest = 1,
    DisconnectProviderUltimatum = 8,
    AttachUserRequest = 10,
    AttachUserConfirm = 11,
    ChannelJoinRequest = 14,
    ChannelJoinConfirm = 15,
    SendDataRequest = 25,
    SendDataIndication = 26,
}

const CONNECT_INITIAL_TAG: u8 = 101;
const CONNECT_RESPONSE_TAG: u8 = 102;

/// Both selectors are the single byte domain "\x01"
const DOMAIN_SELECTOR: [u8; 1] = [0x01];

fn write_domain_parameters(
    max_channels: u32,
    max_users: u32,
    max_tokens: u32,
    max_pdu_size: u32,
    s: &mut dyn Write,
) -> RdpResult<()> {
    let mut body = Cursor::new(Vec::new());
    ber::write_integer(max_channels, &mut body)?;
    ber::write_integer(max_users, &mut body)?;
    ber::write_integer(max_tokens, &mut body)?;
    // number of priorities
    ber::write_integer(1, &mut body)?;
    // min throughput
    ber::write_integer(0, &mut body)?;
    // max height
    ber::write_integer(1, &mut body)?;
    ber::write_integer(max_pdu_size, &mut body)?;
    // protocol version
    ber::write_integer(2, &mut body)?;

    let body = body.into_inner();
    ber::write_universal_tag(ber::BER_TAG_SEQUENCE, s)?;
    ber::write_length(body.len() as u16, s)?;
    s.write_all(&body)?;
    Ok(())
}

fn read_domain_parameters(s: &mut dyn Read) -> RdpResult<()> {
    ber::read_universal_tag(ber::BER_TAG_SEQUENCE, s)?;
    let length = ber::read_length(s)? as usize;
    let mut skipped = vec![0u8; length];
    s.read_exact(&mut skipped)?;
    Ok(())
}

/// BER encoded Connect-Initial carrying the GCC conference
/// create request as user data
pub fn write_connect_initial(user_data: &[u8]) -> RdpResult<Vec<u8>> {
    let mut body = Cursor::new(Vec::new());
    ber::write_octet_string(&DOMAIN_SELECTOR, &mut body)?;
    ber::write_octet_string(&DOMAIN_SELECTOR, &mut body)?;
    ber::write_boolean(true, &mut body)?;
    write_domain_parameters(34, 2, 0, 0xFFFF, &mut body)?;
    write_domain_parameters(1, 1, 1, 0x420, &mut body)?;
    write_domain_parameters(0xFFFF, 0xFC17, 0xFFFF, 0xFFFF, &mut body)?;
    ber::write_octet_string(user_data, &mut body)?;

    let body = body.into_inner();
    let mut result = Cursor::new(Vec::new());
    ber::write_application_tag(CONNECT_INITIAL_TAG, body.len() as u16, &mut result)?;
    result.write_all(&body)?;
    Ok(result.into_inner())
}

/// Parse a Connect-Response down to its GCC user data
pub fn read_connect_response(s: &mut dyn Read) -> RdpResult<Vec<u8>> {
    ber::read_application_tag(CONNECT_RESPONSE_TAG, s)?;
    let result = ber::read_enumerated(s)?;
    if result != 0 {
        return Err(rdp_error!(RdpErrorKind::RejectedByServer, "MCS connect was rejected"));
    }
    // called connect id
    ber::read_integer(s)?;
    read_domain_parameters(s)?;
    ber::read_octet_string(s)
}

pub fn write_erect_domain_request() -> RdpResult<Vec<u8>> {
    let mut result = Cursor::new(Vec::new());
    per::write_choice((DomainPDU::ErectDomainRequest as u8) << 2, &mut result)?;
    // sub height and sub interval
    per::write_integer(0, &mut result)?;
    per::write_integer(0, &mut result)?;
    Ok(result.into_inner())
}

pub fn write_attach_user_request() -> RdpResult<Vec<u8>> {
    let mut result = Cursor::new(Vec::new());
    per::write_choice((DomainPDU::AttachUserRequest as u8) << 2, &mut result)?;
    Ok(result.into_inner())
}

/// Yields the user id granted by the server
pub fn read_attach_user_confirm(s: &mut dyn Read) -> RdpResult<u16> {
    let opcode = per::read_choice(s)?;
    if opcode >> 2 != DomainPDU::AttachUserConfirm as u8 {
        return Err(rdp_error!(
            RdpErrorKind::UnexpectedType,
            "expecting an attach user confirm"
        ));
    }
    if per::read_enumerates(s)? != 0 {
        return Err(rdp_error!(RdpErrorKind::RejectedByServer, "attach user was rejected"));
    }
    if opcode & 2 == 0 {
        return Err(rdp_error!(
            RdpErrorKind::InvalidOptionalField,
            "attach user confirm has no initiator"
        ));
    }
    per::read_integer_16(1001, s)
}

pub fn write_channel_join_request(user_id: u16, channel_id: u16) -> RdpResult<Vec<u8>> {
    let mut result = Cursor::new(Vec::new());
    per::write_choice((DomainPDU::ChannelJoinRequest as u8) << 2, &mut result)?;
    per::write_integer_16(user_id, 1001, &mut result)?;
    result.write_u16::<BigEndian>(channel_id)?;
    Ok(result.into_inner())
}

/// Yields the confirmed channel id
pub fn read_channel_join_confirm(s: &mut dyn Read) -> RdpResult<u16> {
    let opcode = per::read_choice(s)?;
    if opcode >> 2 != DomainPDU::ChannelJoinConfirm as u8 {
        return Err(rdp_error!(
            RdpErrorKind::UnexpectedType,
            "expecting a channel join confirm"
        ));
    }
    if per::read_enumerates(s)? != 0 {
        return Err(rdp_error!(RdpErrorKind::RejectedByServer, "channel join was rejected"));
    }
    per::read_integer_16(1001, s)?;
    let requested = s.read_u16::<BigEndian>()?;
    if opcode & 2 != 0 {
        Ok(s.read_u16::<BigEndian>()?)
    } else {
        Ok(requested)
    }
}

/// Header of a Send-Data-Request, payload follows verbatim
pub fn write_send_data_request_header(user_id: u16, channel_id: u16, payload_length: usize) -> RdpResult<Vec<u8>> {
    let mut result = Cursor::new(Vec::new());
    per::write_choice((DomainPDU::SendDataRequest as u8) << 2, &mut result)?;
    per::write_integer_16(user_id, 1001, &mut result)?;
    result.write_u16::<BigEndian>(channel_id)?;
    // priority high, segmentation begin and end
    per::write_choice(0x70, &mut result)?;
    per::write_length(payload_length as u16 | 0x8000, &mut result)?;
    Ok(result.into_inner())
}

/// Yields the channel id of a Send-Data-Indication, the
/// cursor stops right at the payload
pub fn read_send_data_indication_header(s: &mut dyn Read) -> RdpResult<u16> {
    per::read_integer_16(1001, s)?;
    let channel_id = s.read_u16::<BigEndian>()?;
    // priority and segmentation
    per::read_choice(s)?;
    per::read_length(s)?;
    Ok(channel_id)
}
