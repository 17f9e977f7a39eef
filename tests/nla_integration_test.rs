use rdp_client::nla::asn1::TsRequest;
use rdp_client::nla::ntlm::Ntlm;
use rdp_client::nla::sspi::AuthenticationProtocol;

/// The first CredSSP message of a fresh NTLM context is fully
/// deterministic, down to the byte
#[test]
fn test_first_ts_request_der_encoding() {
    let mut ntlm = Ntlm::new(String::new(), String::new(), String::new());
    let request = TsRequest {
        nego_tokens: Some(ntlm.create_negotiate_message().unwrap()),
        ..Default::default()
    };

    let der = request.to_der();
    let expected = hex::decode(concat!(
        // TSRequest with version 2 and one nego token
        "3037a003020102a130302e302ca02a0428",
        // NTLM negotiate message
        "4e544c4d53535000",
        "01000000",
        "35820860",
        "0000000000000000",
        "0000000000000000",
        "0000000000000000",
    ))
    .unwrap();

    assert_eq!(der.len(), 57);
    assert_eq!(der, expected);
}

#[test]
fn test_ts_request_der_is_a_fixed_point() {
    let mut ntlm = Ntlm::new("dom".to_string(), "user".to_string(), "pwd".to_string());
    let request = TsRequest {
        nego_tokens: Some(ntlm.create_negotiate_message().unwrap()),
        pub_key_auth: Some(vec![0xAB; 270]),
        ..Default::default()
    };

    let decoded = TsRequest::from_der(&request.to_der()).unwrap();
    assert_eq!(decoded, request);
}
