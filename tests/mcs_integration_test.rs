use byteorder::{LittleEndian, WriteBytesExt};
use rdp_client::core::gcc::{ChannelDef, ClientData, KeyboardLayout, Version};
use rdp_client::core::mcs::client::{McsClient, McsPayload};
use rdp_client::core::tpkt::client::TpktClient;
use rdp_client::core::x224::base::Protocols;
use rdp_client::core::x224::client::X224Client;
use rdp_client::core::{ber, per};
use std::io::Cursor;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Frame a server payload the way the client expects it,
/// tpkt envelope plus the x224 data header
fn frame(payload: &[u8]) -> Vec<u8> {
    let mut result = vec![3, 0];
    result.extend_from_slice(&((payload.len() + 7) as u16).to_be_bytes());
    result.extend_from_slice(&[0x02, 0xF0, 0x80]);
    result.extend_from_slice(payload);
    result
}

/// Read and discard one client frame, returning its payload
async fn read_frame(server: &mut DuplexStream) -> Vec<u8> {
    let mut header = [0; 4];
    server.read_exact(&mut header).await.unwrap();
    let length = u16::from_be_bytes([header[2], header[3]]) as usize;
    let mut payload = vec![0; length - 4];
    server.read_exact(&mut payload).await.unwrap();
    // drop the x224 data header
    payload.split_off(3)
}

fn gcc_server_blocks() -> Vec<u8> {
    let mut blocks = Cursor::new(Vec::new());
    // server core data
    WriteBytesExt::write_u16::<LittleEndian>(&mut blocks, 0x0C01).unwrap();
    WriteBytesExt::write_u16::<LittleEndian>(&mut blocks, 8).unwrap();
    WriteBytesExt::write_u32::<LittleEndian>(&mut blocks, 0x0008_0004).unwrap();
    // server security data without standard encryption
    WriteBytesExt::write_u16::<LittleEndian>(&mut blocks, 0x0C02).unwrap();
    WriteBytesExt::write_u16::<LittleEndian>(&mut blocks, 12).unwrap();
    WriteBytesExt::write_u32::<LittleEndian>(&mut blocks, 0).unwrap();
    WriteBytesExt::write_u32::<LittleEndian>(&mut blocks, 0).unwrap();
    // server network data with one static channel
    WriteBytesExt::write_u16::<LittleEndian>(&mut blocks, 0x0C03).unwrap();
    WriteBytesExt::write_u16::<LittleEndian>(&mut blocks, 10).unwrap();
    WriteBytesExt::write_u16::<LittleEndian>(&mut blocks, 1003).unwrap();
    WriteBytesExt::write_u16::<LittleEndian>(&mut blocks, 1).unwrap();
    WriteBytesExt::write_u16::<LittleEndian>(&mut blocks, 1004).unwrap();
    blocks.into_inner()
}

fn conference_create_response() -> Vec<u8> {
    let blocks = gcc_server_blocks();
    let mut response = Cursor::new(Vec::new());
    per::write_choice(0, &mut response).unwrap();
    per::write_object_identifier(&[0, 0, 20, 124, 0, 1], &mut response).unwrap();
    per::write_length(blocks.len() as u16 + 14, &mut response).unwrap();
    per::write_choice(0, &mut response).unwrap();
    per::write_integer_16(1001, 1001, &mut response).unwrap();
    per::write_integer(1, &mut response).unwrap();
    per::write_enumerates(0, &mut response).unwrap();
    per::write_number_of_set(1, &mut response).unwrap();
    per::write_choice(0xC0, &mut response).unwrap();
    per::write_octet_stream(b"McDn", 4, &mut response).unwrap();
    per::write_octet_stream(&blocks, 0, &mut response).unwrap();
    response.into_inner()
}

fn connect_response() -> Vec<u8> {
    let user_data = conference_create_response();

    let mut body = Cursor::new(Vec::new());
    // result successful
    ber::write_universal_tag(ber::BER_TAG_ENUMERATED, &mut body).unwrap();
    ber::write_length(1, &mut body).unwrap();
    std::io::Write::write_all(&mut body, &[0]).unwrap();
    // called connect id
    ber::write_integer(0, &mut body).unwrap();
    // domain parameters
    let mut parameters = Cursor::new(Vec::new());
    for value in [34u32, 3, 0, 1, 0, 1, 0xFFFF, 2] {
        ber::write_integer(value, &mut parameters).unwrap();
    }
    let parameters = parameters.into_inner();
    ber::write_universal_tag(ber::BER_TAG_SEQUENCE, &mut body).unwrap();
    ber::write_length(parameters.len() as u16, &mut body).unwrap();
    std::io::Write::write_all(&mut body, &parameters).unwrap();
    ber::write_octet_string(&user_data, &mut body).unwrap();

    let body = body.into_inner();
    let mut result = Cursor::new(Vec::new());
    ber::write_application_tag(102, body.len() as u16, &mut result).unwrap();
    std::io::Write::write_all(&mut result, &body).unwrap();
    result.into_inner()
}

async fn run_mcs_server(mut server: DuplexStream) -> DuplexStream {
    // connect initial
    read_frame(&mut server).await;
    server.write_all(&frame(&connect_response())).await.unwrap();

    // erect domain then attach user
    read_frame(&mut server).await;
    read_frame(&mut server).await;
    // user id 1006
    server.write_all(&frame(&[0x2E, 0x00, 0x00, 0x05])).await.unwrap();

    // one join confirm per request, echoing the channel
    for _ in 0..3 {
        let request = read_frame(&mut server).await;
        assert_eq!(request[0], 0x38);
        let channel = [request[3], request[4]];
        let mut confirm = vec![0x3E, 0x00, 0x00, 0x03];
        confirm.extend_from_slice(&channel);
        confirm.extend_from_slice(&channel);
        server.write_all(&frame(&confirm)).await.unwrap();
    }
    server
}

fn client_data() -> ClientData {
    ClientData {
        width: 800,
        height: 600,
        layout: KeyboardLayout::US,
        server_selected_protocol: Protocols::ProtocolSSL as u32,
        rdp_version: Version::RdpVersion5plus,
        name: "test".to_string(),
    }
}

#[tokio::test]
async fn test_mcs_connect_sequence() {
    let (server, client) = tokio::io::duplex(16 * 1024);
    let server = tokio::spawn(run_mcs_server(server));

    let x224 = X224Client::new(TpktClient::new(client), Protocols::ProtocolSSL);
    let channels = [ChannelDef {
        name: "rdpdr".to_string(),
        options: 0,
    }];
    let mcs = McsClient::connect(x224, client_data(), &channels).await.unwrap();

    // every join request got its confirm before readiness
    assert_eq!(mcs.user_id(), 1006);
    assert_eq!(mcs.channel_count(), 3);
    assert_eq!(mcs.channel_name(1003), Some("global"));
    assert_eq!(mcs.channel_name(1006), Some("user"));
    assert_eq!(mcs.channel_name(1004), Some("rdpdr"));
    assert_eq!(mcs.server_security().encryption_method, 0);

    server.await.unwrap();
}

#[tokio::test]
async fn test_mcs_send_data_and_indication() {
    let (server, client) = tokio::io::duplex(16 * 1024);
    let handshake = tokio::spawn(run_mcs_server(server));
    // reacquire the server half once the handshake is done
    let x224 = X224Client::new(TpktClient::new(client), Protocols::ProtocolSSL);
    let mut mcs = McsClient::connect(x224, client_data(), &[]).await.unwrap();
    let mut server = handshake.await.unwrap();

    // client send shows up as a send data request on 1003
    mcs.write("global", vec![0xAAu8, 0xBB]).await.unwrap();
    let request = read_frame(&mut server).await;
    assert_eq!(request[0], 0x64);
    assert_eq!(&request[3..5], [0x03, 0xEB]);
    assert_eq!(&request[request.len() - 2..], [0xAA, 0xBB]);

    // and an indication comes back up with its channel id
    let indication = [0x68, 0x00, 0x03, 0x03, 0xEB, 0x70, 0x02, 0xDE, 0xAD];
    server.write_all(&frame(&indication)).await.unwrap();
    match mcs.read().await.unwrap() {
        McsPayload::Channel(channel, payload) => {
            assert_eq!(channel, 1003);
            assert_eq!(payload.to_vec(), vec![0xDE, 0xAD]);
        }
        _ => panic!("expected a channel payload"),
    }
}

#[tokio::test]
async fn test_mcs_disconnect_provider_ultimatum() {
    let (server, client) = tokio::io::duplex(16 * 1024);
    let handshake = tokio::spawn(run_mcs_server(server));
    let x224 = X224Client::new(TpktClient::new(client), Protocols::ProtocolSSL);
    let mut mcs = McsClient::connect(x224, client_data(), &[]).await.unwrap();
    let mut server = handshake.await.unwrap();

    // ultimatum with reason user requested
    server.write_all(&frame(&[0x21, 0x80, 0x00])).await.unwrap();
    assert!(matches!(mcs.read().await.unwrap(), McsPayload::Disconnect));
}
