use crate::core::tpkt::base::Payload;
use crate::core::tpkt::client::TpktClient;
use crate::core::x224::base::{
    NegotiationFailureCode, NegotiationType, Protocols, RequestMode, X224ConnectionPDU, X224Header,
};
use crate::model::data::{check_remaining, Message};
use crate::model::error::{RdpErrorKind, RdpResult};
use crate::model::link::Stream;
use crate::nla::sspi::AuthenticationProtocol;
use crate::rdp_error;

use bytes::Buf;
use std::convert::TryFrom;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// x224 client
///
/// Owns the security protocol negotiation and once connected
/// frames every payload with the three byte data header
pub struct X224Client<S> {
    /// Transport layer, x224 uses a tpkt
    transport: TpktClient<S>,
    /// Security protocol selected by the server
    selected_protocol: Protocols,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> X224Client<S> {
    /// Constructor use by the connector
    pub fn new(transport: TpktClient<S>, selected_protocol: Protocols) -> Self {
        Self {
            transport,
            selected_protocol,
        }
    }

    /// Send a new x224 formatted message
    /// using the underlying layer
    pub async fn write<T: 'static>(&mut self, message: T) -> RdpResult<()>
    where
        T: Message + Sync,
    {
        self.transport.write((X224Header::new(), message)).await
    }

    /// Read an entire x224 payload
    ///
    /// Returns either a x224 data payload with its header stripped
    /// or a fast path payload coming from the underlying layer
    pub async fn read(&mut self) -> RdpResult<Payload> {
        match self.transport.read().await? {
            Payload::Raw(mut payload) => {
                check_remaining(&payload, 3, "x224 data header")?;
                // skip the data header
                payload.advance(3);
                Ok(Payload::Raw(payload))
            }
            Payload::FastPath(flag, payload) => Ok(Payload::FastPath(flag, payload)),
        }
    }

    /// Getter for the selected protocol
    pub fn selected_protocol(&self) -> Protocols {
        self.selected_protocol
    }

    #[inline]
    pub async fn shutdown(&mut self) -> RdpResult<()> {
        self.transport.shutdown().await
    }

    /// Send a connection request with the routing cookie and
    /// the negotiation block
    pub async fn write_connection_request(
        client: &mut TpktClient<S>,
        username: &str,
        security_protocols: u32,
        mode: Option<u8>,
    ) -> RdpResult<()> {
        client
            .write(X224ConnectionPDU::new_request(username, security_protocols, mode))
            .await
    }

    /// Expect a connection confirm payload
    pub async fn read_connection_confirm(client: &mut TpktClient<S>) -> RdpResult<Protocols> {
        let mut buffer = match client.read().await? {
            Payload::Raw(p) => p,
            _ => {
                return Err(rdp_error!(
                    RdpErrorKind::InvalidRespond,
                    "fast path received during negotiation"
                ))
            }
        };

        let mut pdu = X224ConnectionPDU::new();
        pdu.read_from_buffer(&mut buffer)?;

        match NegotiationType::try_from(pdu.negotiation.tpe)? {
            NegotiationType::TypeRDPNegFailure => {
                let code = NegotiationFailureCode::try_from(pdu.negotiation.protocols.inner());
                Err(rdp_error!(
                    RdpErrorKind::ProtocolNegFailure,
                    &match code {
                        Ok(code) => format!("negotiation failure {:?}", code),
                        Err(_) => "negotiation failure with unknown code".to_string(),
                    }
                ))
            }
            NegotiationType::TypeRDPNegReq => Err(rdp_error!(
                RdpErrorKind::InvalidRespond,
                "server sent a negotiation request"
            )),
            NegotiationType::TypeRDPNegRsp => Ok(Protocols::try_from(pdu.negotiation.protocols.inner())?),
        }
    }
}

impl X224Client<Stream> {
    /// Launch the connection sequence of the x224 stack
    ///
    /// Negotiates the security protocol then upgrades the
    /// transport according to the server's choice:
    /// RDP stays raw (standard security will take over),
    /// SSL upgrades to TLS, Hybrid upgrades to TLS and runs
    /// CredSSP, HybridEx is refused
    ///
    /// security_protocols is a valid mix of Protocols
    /// RDP -> Protocols::ProtocolRDP as u32
    /// SSL -> Protocols::ProtocolSSL as u32
    /// NLA -> Protocols::ProtocolSSL as u32 | Protocols::ProtocolHybrid as u32
    pub async fn connect(
        mut client: TpktClient<Stream>,
        username: &str,
        name: &str,
        security_protocols: u32,
        check_certificate: bool,
        authentication_protocol: Option<&mut (dyn AuthenticationProtocol + Send)>,
        restricted_admin_mode: bool,
        blank_creds: bool,
    ) -> RdpResult<X224Client<Stream>> {
        Self::write_connection_request(
            &mut client,
            username,
            security_protocols,
            Some(if restricted_admin_mode {
                RequestMode::RestrictedAdminModeRequired as u8
            } else {
                0
            }),
        )
        .await?;

        let selected = Self::read_connection_confirm(&mut client).await?;
        debug!("server selected security protocol {:?}", selected);

        match selected {
            Protocols::ProtocolRDP => Ok(X224Client::new(client, Protocols::ProtocolRDP)),
            Protocols::ProtocolSSL => Ok(X224Client::new(
                client.start_tls(check_certificate, name).await?,
                Protocols::ProtocolSSL,
            )),
            Protocols::ProtocolHybrid => Ok(X224Client::new(
                client
                    .start_nla(
                        check_certificate,
                        name,
                        authentication_protocol.ok_or_else(|| {
                            rdp_error!(
                                RdpErrorKind::InvalidProtocol,
                                "NLA selected without an authentication protocol"
                            )
                        })?,
                        restricted_admin_mode || blank_creds,
                    )
                    .await?,
                Protocols::ProtocolHybrid,
            )),
            Protocols::ProtocolHybridEx => Err(rdp_error!(
                RdpErrorKind::InvalidProtocol,
                "server selected HybridEx which is not supported"
            )),
        }
    }
}
