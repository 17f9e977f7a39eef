use crate::model::data::{check_remaining, Message, U16, U32};
use crate::model::error::RdpResult;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use num_enum::TryFromPrimitive;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[repr(u8)]
#[derive(Copy, Clone, TryFromPrimitive)]
pub enum NegotiationType {
    /// Negotiation Request
    /// Send from client to server
    TypeRDPNegReq = 0x01,
    /// Negotiation Response
    /// Send from server to client
    TypeRDPNegRsp = 0x02,
    /// Negotiation failure
    /// Send when security level is not expected
    /// e.g. server ask for NLA and client doesn't support it
    TypeRDPNegFailure = 0x03,
}

#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
pub enum Protocols {
    /// Standard RDP security with RC4 encryption
    ProtocolRDP = 0x00,
    /// Secure Socket Layer
    ProtocolSSL = 0x01,
    /// Network Level Authentication over SSL
    ProtocolHybrid = 0x02,
    /// NLA + SSL + Quick respond
    /// Not supported by this client
    ProtocolHybridEx = 0x08,
}

/// Failure codes of a negotiation failure PDU
/// https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/1b3920e7-0116-4345-bc45-f2c4ad012761
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
pub enum NegotiationFailureCode {
    SslRequiredByServer = 0x01,
    SslNotAllowedByServer = 0x02,
    SslCertNotOnServer = 0x03,
    InconsistentFlags = 0x04,
    HybridRequiredByServer = 0x05,
    SslWithUserAuthRequiredByServer = 0x06,
}

#[derive(Copy, Clone)]
pub enum MessageType {
    X224TPDUConnectionRequest = 0xE0,
    X224TPDUConnectionConfirm = 0xD0,
    X224TPDUDisconnectRequest = 0x80,
    X224TPDUData = 0xF0,
    X224TPDUError = 0x70,
}

/// Credential mode
#[repr(u8)]
pub enum RequestMode {
    /// Restricted admin mode
    /// Use to auth only with NLA mode
    /// Protect against credential forward
    RestrictedAdminModeRequired = 0x01,
    /// New feature present in latest windows 10
    RedirectedAuthenticationModeRequired = 0x02,
    CorrelationInfoPresent = 0x08,
}

/// Data TPDU header, three bytes before every payload
pub struct X224Header {
    header: u8,
    message_type: u8,
    separator: u8,
}

impl X224Header {
    pub fn new() -> Self {
        X224Header {
            header: 2,
            message_type: MessageType::X224TPDUData as u8,
            separator: 0x80,
        }
    }
}

impl Default for X224Header {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Message for X224Header {
    async fn write_to(&self, writer: &mut (impl AsyncWrite + Unpin + Send)) -> std::io::Result<()> {
        writer.write_u8(self.header).await?;
        writer.write_u8(self.message_type).await?;
        writer.write_u8(self.separator).await?;
        Ok(())
    }

    async fn read_from(&mut self, reader: &mut (impl AsyncRead + Unpin + Send)) -> std::io::Result<()> {
        self.header = reader.read_u8().await?;
        self.message_type = reader.read_u8().await?;
        self.separator = reader.read_u8().await?;
        Ok(())
    }

    #[inline]
    fn length(&self) -> usize {
        3
    }
}

/// Fixed part of a connection request or confirm TPDU
pub struct X224CRQ {
    pub len: u8,
    pub code: u8,
    pub padding: [u8; 5],
}

impl X224CRQ {
    pub fn new(len: u8, code: MessageType) -> Self {
        X224CRQ {
            len: len + 6,
            code: code as u8,
            padding: [0u8; 5],
        }
    }

    pub fn read_from_buffer(&mut self, buffer: &mut BytesMut) -> RdpResult<()> {
        check_remaining(buffer, 7, "x224 request header")?;
        self.len = buffer.get_u8();
        self.code = buffer.get_u8();
        for byte in self.padding.iter_mut() {
            *byte = buffer.get_u8();
        }
        Ok(())
    }
}

#[async_trait]
impl Message for X224CRQ {
    async fn write_to(&self, writer: &mut (impl AsyncWrite + Unpin + Send)) -> std::io::Result<()> {
        writer.write_u8(self.len).await?;
        writer.write_u8(self.code).await?;
        writer.write_all(&self.padding).await?;
        Ok(())
    }

    async fn read_from(&mut self, reader: &mut (impl AsyncRead + Unpin + Send)) -> std::io::Result<()> {
        self.len = reader.read_u8().await?;
        self.code = reader.read_u8().await?;
        reader.read_exact(&mut self.padding).await?;
        Ok(())
    }

    #[inline]
    fn length(&self) -> usize {
        7
    }
}

/// RDP Negotiation Request
/// Use to inform the server about the supported
/// security protocols
///
/// https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/902b090b-9cb3-4efc-92bf-ee13373371e3
pub struct RdpNegRequest {
    pub tpe: u8,
    pub flags: u8,
    pub length: U16,
    pub protocols: U32,
}

impl RdpNegRequest {
    pub fn new(tpe: Option<NegotiationType>, flags: Option<u8>, protocols: Option<u32>) -> Self {
        Self {
            tpe: tpe.unwrap_or(NegotiationType::TypeRDPNegReq) as u8,
            flags: flags.unwrap_or(0),
            length: U16::LE(0x0008),
            protocols: U32::LE(protocols.unwrap_or(0)),
        }
    }

    pub fn read_from_buffer(&mut self, buffer: &mut BytesMut) -> RdpResult<()> {
        check_remaining(buffer, 8, "x224 negotiation block")?;
        self.tpe = buffer.get_u8();
        self.flags = buffer.get_u8();
        self.length = U16::LE(buffer.get_u16_le());
        self.protocols = U32::LE(buffer.get_u32_le());
        Ok(())
    }
}

#[async_trait]
impl Message for RdpNegRequest {
    async fn write_to(&self, writer: &mut (impl AsyncWrite + Unpin + Send)) -> std::io::Result<()> {
        writer.write_u8(self.tpe).await?;
        writer.write_u8(self.flags).await?;
        self.length.write_to(writer).await?;
        self.protocols.write_to(writer).await?;
        Ok(())
    }

    async fn read_from(&mut self, reader: &mut (impl AsyncRead + Unpin + Send)) -> std::io::Result<()> {
        self.tpe = reader.read_u8().await?;
        self.flags = reader.read_u8().await?;
        self.length.read_from(reader).await?;
        self.protocols.read_from(reader).await?;
        Ok(())
    }

    #[inline]
    fn length(&self) -> usize {
        8
    }
}

/// Routing cookie advertised in the connection request
///
/// The server uses it for load balancing session brokering
pub fn negotiation_cookie(username: &str) -> Vec<u8> {
    // only the user part before an eventual domain separator
    let identifier: String = username.chars().take_while(|c| *c != '@' && *c != '\\').collect();
    format!("Cookie: mstshash={}\r\n", identifier).into_bytes()
}

/// Connection PDU
/// Includes nego for security protocols
/// and the routing cookie
pub struct X224ConnectionPDU {
    pub header: X224CRQ,
    pub cookie: Vec<u8>,
    pub negotiation: RdpNegRequest,
}

impl X224ConnectionPDU {
    /// Client connection request with the wanted protocols
    pub fn new_request(username: &str, protocols: u32, mode: Option<u8>) -> Self {
        let cookie = negotiation_cookie(username);
        let negotiation = RdpNegRequest::new(Some(NegotiationType::TypeRDPNegReq), mode, Some(protocols));
        Self {
            header: X224CRQ::new(
                (cookie.len() + negotiation.length()) as u8,
                MessageType::X224TPDUConnectionRequest,
            ),
            cookie,
            negotiation,
        }
    }

    /// Empty confirm waiting to be filled by `read_from_buffer`
    pub fn new() -> Self {
        Self {
            header: X224CRQ::new(0, MessageType::X224TPDUConnectionConfirm),
            cookie: Vec::new(),
            negotiation: RdpNegRequest::new(None, None, None),
        }
    }

    pub fn read_from_buffer(&mut self, buffer: &mut BytesMut) -> RdpResult<()> {
        self.header.read_from_buffer(buffer)?;
        self.negotiation.read_from_buffer(buffer)?;
        Ok(())
    }
}

impl Default for X224ConnectionPDU {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Message for X224ConnectionPDU {
    async fn write_to(&self, writer: &mut (impl AsyncWrite + Unpin + Send)) -> std::io::Result<()> {
        self.header.write_to(writer).await?;
        self.cookie.write_to(writer).await?;
        self.negotiation.write_to(writer).await?;
        Ok(())
    }

    async fn read_from(&mut self, reader: &mut (impl AsyncRead + Unpin + Send)) -> std::io::Result<()> {
        self.header.read_from(reader).await?;
        self.negotiation.read_from(reader).await?;
        Ok(())
    }

    #[inline]
    fn length(&self) -> usize {
        self.header.length() + self.cookie.length() + self.negotiation.length()
    }
}
