use byteorder::ReadBytesExt;
use std::io::{Cursor, Read};
use yasna::Tag;

use crate::core::ber;
use crate::model::error::{RdpErrorKind, RdpResult};
use crate::rdp_error;

/// CredSSP protocol version advertised in every TSRequest
const TS_REQUEST_VERSION: i64 = 2;

/// TSRequest, the single message shape of the CredSSP exchange
///
/// https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-cssp/6aac4dea-08ef-47a6-8747-22ea7f6d8685
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TsRequest {
    pub nego_tokens: Option<Vec<u8>>,
    pub auth_info: Option<Vec<u8>>,
    pub pub_key_auth: Option<Vec<u8>>,
}

impl TsRequest {
    /// DER encoding, fields are emitted in tag order and
    /// absent fields are skipped entirely
    pub fn to_der(&self) -> Vec<u8> {
        yasna::construct_der(|writer| {
            writer.write_sequence(|sequence| {
                sequence
                    .next()
                    .write_tagged(Tag::context(0), |version| version.write_i64(TS_REQUEST_VERSION));
                if let Some(nego_tokens) = &self.nego_tokens {
                    sequence.next().write_tagged(Tag::context(1), |tokens| {
                        tokens.write_sequence(|sequence_of| {
                            sequence_of.next().write_sequence(|nego_data| {
                                nego_data
                                    .next()
                                    .write_tagged(Tag::context(0), |token| token.write_bytes(nego_tokens));
                            });
                        });
                    });
                }
                if let Some(auth_info) = &self.auth_info {
                    sequence
                        .next()
                        .write_tagged(Tag::context(2), |info| info.write_bytes(auth_info));
                }
                if let Some(pub_key_auth) = &self.pub_key_auth {
                    sequence
                        .next()
                        .write_tagged(Tag::context(3), |auth| auth.write_bytes(pub_key_auth));
                }
            });
        })
    }

    /// Parse a DER encoded TSRequest
    ///
    /// The context tags are walked in order, unknown tags are
    /// skipped so newer servers stay readable
    pub fn from_der(data: &[u8]) -> RdpResult<TsRequest> {
        let mut stream = Cursor::new(data);
        ber::read_universal_tag(ber::BER_TAG_SEQUENCE, &mut stream)?;
        let length = ber::read_length(&mut stream)? as u64;
        let end = stream.position() + length;

        let mut request = TsRequest::default();
        while stream.position() < end && (stream.position() as usize) < data.len() {
            let context_tag = stream.read_u8()?;
            let field_length = ber::read_length(&mut stream)? as usize;
            match context_tag {
                // version
                0xA0 => {
                    ber::read_integer(&mut stream)?;
                }
                // negoTokens, a sequence of sequence of tagged tokens
                // only the first token is relevant for NTLM
                0xA1 => {
                    ber::read_universal_tag(ber::BER_TAG_SEQUENCE, &mut stream)?;
                    ber::read_length(&mut stream)?;
                    ber::read_universal_tag(ber::BER_TAG_SEQUENCE, &mut stream)?;
                    ber::read_length(&mut stream)?;
                    if stream.read_u8()? != 0xA0 {
                        return Err(rdp_error!(RdpErrorKind::InvalidRespond, "malformed negoTokens"));
                    }
                    ber::read_length(&mut stream)?;
                    request.nego_tokens = Some(ber::read_octet_string(&mut stream)?);
                }
                0xA2 => {
                    request.auth_info = Some(ber::read_octet_string(&mut stream)?);
                }
                0xA3 => {
                    request.pub_key_auth = Some(ber::read_octet_string(&mut stream)?);
                }
                // errorCode or anything newer
                _ => {
                    let mut skipped = vec![0u8; field_length];
                    stream.read_exact(&mut skipped)?;
                }
            }
        }
        Ok(request)
    }

    /// Total size of the message whose DER header starts
    /// in `header`, used to frame reads from the TLS stream
    pub fn read_length(header: &[u8]) -> RdpResult<usize> {
        if header.len() < 4 || header[0] != ber::BER_TAG_SEQUENCE {
            return Err(rdp_error!(RdpErrorKind::InvalidData, "not a TSRequest"));
        }
        match header[1] {
            0x82 => Ok(4 + ((header[2] as usize) << 8 | header[3] as usize)),
            0x81 => Ok(3 + header[2] as usize),
            length if length < 0x80 => Ok(2 + length as usize),
            _ => Err(rdp_error!(RdpErrorKind::InvalidSize, "TSRequest too large")),
        }
    }
}

/// TSCredentials with a TSPasswordCreds inside, both DER
///
/// Everything is UTF-16LE, the empty triple is valid and used
/// by restricted admin mode
pub fn write_ts_credentials(domain: &[u8], user: &[u8], password: &[u8]) -> Vec<u8> {
    let password_creds = yasna::construct_der(|writer| {
        writer.write_sequence(|sequence| {
            sequence
                .next()
                .write_tagged(Tag::context(0), |field| field.write_bytes(domain));
            sequence
                .next()
                .write_tagged(Tag::context(1), |field| field.write_bytes(user));
            sequence
                .next()
                .write_tagged(Tag::context(2), |field| field.write_bytes(password));
        });
    });

    yasna::construct_der(|writer| {
        writer.write_sequence(|sequence| {
            // credType password
            sequence
                .next()
                .write_tagged(Tag::context(0), |cred_type| cred_type.write_i64(1));
            sequence
                .next()
                .write_tagged(Tag::context(1), |creds| creds.write_bytes(&password_creds));
        });
    })
}
