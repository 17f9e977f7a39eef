use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::model::error::{RdpErrorKind, RdpResult};
use crate::model::link::Stream;
use crate::nla::asn1::{write_ts_credentials, TsRequest};
use crate::nla::sspi::AuthenticationProtocol;
use crate::rdp_error;

/// Read one DER encoded TSRequest from the TLS stream
///
/// The header carries the total length, everything else
/// follows in a single read
async fn read_ts_request(link: &mut Stream) -> RdpResult<TsRequest> {
    let mut header = [0u8; 4];
    link.read_exact(&mut header).await?;

    let total = TsRequest::read_length(&header)?;
    if total < header.len() {
        return Err(rdp_error!(RdpErrorKind::InvalidSize, "TSRequest too short"));
    }
    let mut message = header.to_vec();
    message.resize(total, 0);
    link.read_exact(&mut message[4..]).await?;

    TsRequest::from_der(&message)
}

async fn write_ts_request(link: &mut Stream, request: &TsRequest) -> RdpResult<()> {
    link.write_all(&request.to_der()).await?;
    link.flush().await?;
    Ok(())
}

/// CredSSP connection sequence over an established TLS stream
///
/// Three legs as MS-CSSP describes them: the nego token
/// exchange, the public key binding, then the delegated
/// credentials. Any DER or signature failure aborts the session
pub async fn cssp_connect(
    link: &mut Stream,
    authentication_protocol: &mut (dyn AuthenticationProtocol + Send),
    restricted_admin_mode: bool,
) -> RdpResult<()> {
    // first leg, negotiate token
    let negotiate = authentication_protocol.create_negotiate_message()?;
    write_ts_request(
        link,
        &TsRequest {
            nego_tokens: Some(negotiate),
            ..Default::default()
        },
    )
    .await?;

    // second leg, challenge in, authenticate and sealed public key out
    let challenge_request = read_ts_request(link).await?;
    let challenge = challenge_request
        .nego_tokens
        .ok_or_else(|| rdp_error!(RdpErrorKind::InvalidRespond, "server sent no NTLM challenge"))?;
    let authenticate = authentication_protocol.read_challenge(&challenge)?;

    let mut security_interface = authentication_protocol.build_security_interface()?;
    let public_key = link.peer_public_key()?;
    let pub_key_auth = security_interface.gss_wrapex(&public_key)?;

    write_ts_request(
        link,
        &TsRequest {
            nego_tokens: Some(authenticate),
            pub_key_auth: Some(pub_key_auth),
            ..Default::default()
        },
    )
    .await?;

    // third leg, the server proves it saw the same channel
    let binding_response = read_ts_request(link).await?;
    let sealed_binding = binding_response
        .pub_key_auth
        .ok_or_else(|| rdp_error!(RdpErrorKind::AccessDenied, "server rejected the credentials"))?;
    let incremented = security_interface.gss_unwrapex(&sealed_binding)?;

    let mut expected = public_key;
    integer_increment_le(&mut expected);
    if incremented != expected {
        return Err(rdp_error!(
            RdpErrorKind::InvalidChecksum,
            "public key binding check failed"
        ));
    }
    debug!("CredSSP channel binding verified");

    // delegate credentials, blank in restricted admin mode
    let credentials = if restricted_admin_mode {
        write_ts_credentials(&[], &[], &[])
    } else {
        write_ts_credentials(
            &authentication_protocol.get_domain_name(),
            &authentication_protocol.get_user_name(),
            &authentication_protocol.get_password(),
        )
    };
    let auth_info = security_interface.gss_wrapex(&credentials)?;
    write_ts_request(
        link,
        &TsRequest {
            auth_info: Some(auth_info),
            ..Default::default()
        },
    )
    .await?;

    Ok(())
}

/// The binding answer is the public key plus one, as a little
/// endian integer of the same width
fn integer_increment_le(buffer: &mut [u8]) {
    for byte in buffer.iter_mut() {
        let (value, overflow) = byte.overflowing_add(1);
        *byte = value;
        if !overflow {
            break;
        }
    }
}
