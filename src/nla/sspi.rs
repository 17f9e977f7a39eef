use crate::model::error::RdpResult;

/// Authentication interface for the NLA security layer
///
/// Today only NTLMv2 implements it but the CredSSP exchange
/// itself does not care which package produced the tokens
pub trait AuthenticationProtocol {
    /// First token of the handshake, sent before anything
    /// came back from the server
    fn create_negotiate_message(&mut self) -> RdpResult<Vec<u8>>;

    /// Consume the server challenge and produce the final
    /// authentication token
    fn read_challenge(&mut self, request: &[u8]) -> RdpResult<Vec<u8>>;

    /// Once the handshake completed the protocol can derive
    /// a wrapping service bound to the exchanged keys
    fn build_security_interface(&self) -> RdpResult<Box<dyn GenericSecurityService + Send>>;

    /// Credentials as UTF-16LE, delegated at the end of CredSSP
    fn get_domain_name(&self) -> Vec<u8>;
    fn get_user_name(&self) -> Vec<u8>;
    fn get_password(&self) -> Vec<u8>;
}

/// GSS style wrapping service
///
/// Sealed messages carry a 16 byte signature followed by the
/// encrypted payload
pub trait GenericSecurityService {
    fn gss_wrapex(&mut self, data: &[u8]) -> RdpResult<Vec<u8>>;
    fn gss_unwrapex(&mut self, data: &[u8]) -> RdpResult<Vec<u8>>;
}
