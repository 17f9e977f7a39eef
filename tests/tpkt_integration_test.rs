use rdp_client::core::tpkt::base::Payload;
use rdp_client::core::tpkt::client::TpktClient;
use rdp_client::model::data::U32;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn test_tpkt_client_write() {
    let (mut server, client) = tokio::io::duplex(128);
    let mut client = TpktClient::new(client);

    let x = U32::BE(1);
    let mut buf = [0; 8];

    client.write(x).await.unwrap();
    server.read_exact(&mut buf).await.unwrap();

    assert_eq!(buf, [3, 0, 0, 8, 0, 0, 0, 1]);
}

#[tokio::test]
async fn test_tpkt_client_write_raw_payload() {
    let (mut server, client) = tokio::io::duplex(128);
    let mut client = TpktClient::new(client);

    let mut buf = [0; 6];
    client.write(vec![0x01u8, 0x02]).await.unwrap();
    server.read_exact(&mut buf).await.unwrap();

    assert_eq!(buf, [3, 0, 0, 6, 1, 2]);
}

#[tokio::test]
async fn test_tpkt_client_read() {
    let (mut server, client) = tokio::io::duplex(128);
    let mut client = TpktClient::new(client);

    server.write_all(&[3, 0, 0, 8, 0, 0, 0, 1]).await.unwrap();
    let payload = client.read().await.unwrap();

    match payload {
        Payload::Raw(data) => {
            assert_eq!(data.to_vec(), vec![0, 0, 0, 1])
        }
        _ => panic!("expected a slow path payload"),
    }
}

#[tokio::test]
async fn test_tpkt_client_read_fast_path_short() {
    let (mut server, client) = tokio::io::duplex(128);
    let mut client = TpktClient::new(client);

    // encrypted fast path frame with a two byte body
    server.write_all(&[0x80, 4, 0xDE, 0xAD]).await.unwrap();
    let payload = client.read().await.unwrap();

    match payload {
        Payload::FastPath(flag, data) => {
            assert_eq!(flag, 2);
            assert_eq!(data.to_vec(), vec![0xDE, 0xAD]);
        }
        _ => panic!("expected a fast path payload"),
    }
}

#[tokio::test]
async fn test_tpkt_client_read_fast_path_long() {
    let (mut server, client) = tokio::io::duplex(512);
    let mut client = TpktClient::new(client);

    // long form length, 0x83 extends the length to 15 bits
    let mut frame = vec![0x00, 0x80 | 0x01, 0x03];
    frame.extend_from_slice(&[0x55u8; 0x100]);
    server.write_all(&frame).await.unwrap();
    let payload = client.read().await.unwrap();

    match payload {
        Payload::FastPath(flag, data) => {
            assert_eq!(flag, 0);
            assert_eq!(data.len(), 0x100);
        }
        _ => panic!("expected a fast path payload"),
    }
}

#[tokio::test]
async fn test_tpkt_client_write_fast_path() {
    let (mut server, client) = tokio::io::duplex(128);
    let mut client = TpktClient::new(client);

    client.write_fast_path(0, vec![0xAA, 0xBB]).await.unwrap();
    let mut buf = [0; 4];
    server.read_exact(&mut buf).await.unwrap();

    assert_eq!(buf, [0x00, 0x04, 0xAA, 0xBB]);
}

#[tokio::test]
async fn test_tpkt_client_read_invalid_action() {
    let (mut server, client) = tokio::io::duplex(128);
    let mut client = TpktClient::new(client);

    server.write_all(&[0x01, 0, 0, 0]).await.unwrap();
    assert!(client.read().await.is_err());
}
