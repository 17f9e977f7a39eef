use rdp_client::core::tpkt::client::TpktClient;
use rdp_client::core::x224::base::{NegotiationType, Protocols, RdpNegRequest};
use rdp_client::core::x224::client::X224Client;
use rdp_client::model::data::Message;
use rdp_client::model::error::RdpErrorKind;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

#[tokio::test]
async fn test_x224_neg_request_encoding() {
    let (mut server, mut client) = tokio::io::duplex(128);
    let request = RdpNegRequest::new(
        Some(NegotiationType::TypeRDPNegReq),
        None,
        Some(Protocols::ProtocolSSL as u32),
    );
    request.write_to(&mut client).await.unwrap();

    let mut buf = [0; 8];
    server.read_exact(&mut buf).await.unwrap();

    assert_eq!(buf, [1, 0, 8, 0, 1, 0, 0, 0]);
}

#[tokio::test]
async fn test_x224_connection_request_carries_cookie() {
    let (mut server, client) = tokio::io::duplex(256);
    let mut client = TpktClient::new(client);

    X224Client::<DuplexStream>::write_connection_request(&mut client, "john", Protocols::ProtocolSSL as u32, Some(0))
        .await
        .unwrap();

    let mut header = [0; 4];
    server.read_exact(&mut header).await.unwrap();
    let length = u16::from_be_bytes([header[2], header[3]]) as usize;
    let mut body = vec![0; length - 4];
    server.read_exact(&mut body).await.unwrap();

    // connection request code then the routing cookie
    assert_eq!(body[1], 0xE0);
    let cookie = b"Cookie: mstshash=john\r\n";
    assert_eq!(&body[7..7 + cookie.len()], cookie);
    // the negotiation block closes the pdu
    assert_eq!(&body[body.len() - 8..body.len() - 4], [1, 0, 8, 0]);
}

/// Build a tpkt framed connection confirm with the given
/// negotiation type and payload value
async fn write_confirm(server: &mut DuplexStream, neg_type: u8, value: u32) {
    let mut body = vec![
        // li, code and the five fixed bytes
        14, 0xD0, 0, 0, 0, 0, 0, // negotiation block
        neg_type, 0,
    ];
    body.extend_from_slice(&8u16.to_le_bytes());
    body.extend_from_slice(&value.to_le_bytes());

    let mut frame = vec![3, 0];
    frame.extend_from_slice(&((body.len() + 4) as u16).to_be_bytes());
    frame.extend_from_slice(&body);
    server.write_all(&frame).await.unwrap();
}

#[tokio::test]
async fn test_x224_connection_confirm_selects_protocol() {
    let (mut server, client) = tokio::io::duplex(256);
    let mut client = TpktClient::new(client);

    write_confirm(&mut server, NegotiationType::TypeRDPNegRsp as u8, Protocols::ProtocolSSL as u32).await;

    let selected = X224Client::<DuplexStream>::read_connection_confirm(&mut client)
        .await
        .unwrap();
    assert_eq!(selected, Protocols::ProtocolSSL);
}

#[tokio::test]
async fn test_x224_negotiation_failure_closes_the_session() {
    let (mut server, client) = tokio::io::duplex(256);
    let mut client = TpktClient::new(client);

    // SSL_NOT_ALLOWED_BY_SERVER
    write_confirm(&mut server, NegotiationType::TypeRDPNegFailure as u8, 0x02).await;

    let result = X224Client::<DuplexStream>::read_connection_confirm(&mut client).await;
    assert_eq!(result.unwrap_err().kind(), RdpErrorKind::ProtocolNegFailure);
}

#[tokio::test]
async fn test_x224_data_header_encoding() {
    let (mut server, client) = tokio::io::duplex(128);
    let mut client = X224Client::new(TpktClient::new(client), Protocols::ProtocolSSL);

    client.write(Vec::<u8>::new()).await.unwrap();

    let mut buf = [0; 7];
    server.read_exact(&mut buf).await.unwrap();
    // tpkt header then the three byte data header
    assert_eq!(buf, [3, 0, 0, 7, 0x02, 0xF0, 0x80]);
}

#[tokio::test]
async fn test_x224_read_strips_data_header() {
    let (mut server, client) = tokio::io::duplex(128);
    let mut client = X224Client::new(TpktClient::new(client), Protocols::ProtocolSSL);

    server
        .write_all(&[3, 0, 0, 9, 0x02, 0xF0, 0x80, 0xBE, 0xEF])
        .await
        .unwrap();

    match client.read().await.unwrap() {
        rdp_client::core::tpkt::base::Payload::Raw(payload) => {
            assert_eq!(payload.to_vec(), vec![0xBE, 0xEF]);
        }
        _ => panic!("expected a slow path payload"),
    }
}
