use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::tpkt::base::{Action, Payload, TpktHeader, FASTPATH_SEC_FLAG_SHIFT};
use crate::model::data::Message;
use crate::model::error::{RdpErrorKind, RdpResult};
use crate::model::link::Stream;
use crate::nla::cssp::cssp_connect;
use crate::nla::sspi::AuthenticationProtocol;
use crate::rdp_error;

/// Client context of the TPKT layer
///
/// First framing layer of the stack, it also detects
/// fast path frames which bypass X224 and MCS entirely
pub struct TpktClient<S> {
    transport: S,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> TpktClient<S> {
    /// Create a new client based on a low level connection instance
    pub fn new(transport: S) -> Self {
        TpktClient { transport }
    }

    /// Send a message to the link layer with the slow path header
    pub async fn write<T: 'static>(&mut self, message: T) -> RdpResult<()>
    where
        T: Message,
    {
        let header = TpktHeader::new(message.length());
        header.write_to(&mut self.transport).await?;
        message.write_to(&mut self.transport).await?;
        self.transport.flush().await?;
        Ok(())
    }

    /// Send a client fast path packet
    ///
    /// The two high bits of the action byte carry the security
    /// flags of the payload
    pub async fn write_fast_path(&mut self, sec_flag: u8, payload: Vec<u8>) -> RdpResult<()> {
        self.transport
            .write_u8((sec_flag << FASTPATH_SEC_FLAG_SHIFT) | Action::FastPathActionFastPath as u8)
            .await?;

        // the length field counts the header itself
        if payload.len() + 2 > 0x7F {
            let size = (payload.len() + 3) as u16;
            self.transport.write_u8((size >> 8) as u8 | 0x80).await?;
            self.transport.write_u8((size & 0xFF) as u8).await?;
        } else {
            self.transport.write_u8((payload.len() + 2) as u8).await?;
        }

        self.transport.write_all(&payload).await?;
        self.transport.flush().await?;
        Ok(())
    }

    /// Read a payload from the underlying layer
    ///
    /// The first byte classifies the frame as slow path or
    /// fast path and the matching length encoding is used
    pub async fn read(&mut self) -> RdpResult<Payload> {
        let action = self.transport.read_u8().await?;

        if action == Action::FastPathActionX224 as u8 {
            let _flag = self.transport.read_u8().await?;
            let size = self.transport.read_u16().await? as usize;

            if size < 4 {
                return Err(rdp_error!(RdpErrorKind::InvalidSize, "invalid minimal size for TPKT"));
            }

            Ok(Payload::Raw(self.read_exact(size - 4).await?))
        } else {
            if action & 0x3 != Action::FastPathActionFastPath as u8 {
                return Err(rdp_error!(RdpErrorKind::InvalidData, "invalid TPKT action code"));
            }

            let sec_flag = (action >> FASTPATH_SEC_FLAG_SHIFT) & 0x3;
            let short_length = self.transport.read_u8().await?;

            if short_length & 0x80 == 0 {
                if (short_length as usize) < 2 {
                    return Err(rdp_error!(RdpErrorKind::InvalidSize, "invalid minimal size for TPKT"));
                }
                let payload = self.read_exact(short_length as usize - 2).await?;
                Ok(Payload::FastPath(sec_flag, payload))
            } else {
                let hi_length = self.transport.read_u8().await?;
                let length = (((short_length & !0x80) as usize) << 8) | hi_length as usize;

                if length < 3 {
                    return Err(rdp_error!(RdpErrorKind::InvalidSize, "invalid minimal size for TPKT"));
                }
                let payload = self.read_exact(length - 3).await?;
                Ok(Payload::FastPath(sec_flag, payload))
            }
        }
    }

    async fn read_exact(&mut self, size: usize) -> RdpResult<BytesMut> {
        let mut buffer = BytesMut::with_capacity(size);
        buffer.resize(size, 0);
        self.transport.read_exact(&mut buffer).await?;
        Ok(buffer)
    }

    /// Shutdown current connection
    pub async fn shutdown(&mut self) -> RdpResult<()> {
        Ok(self.transport.shutdown().await?)
    }
}

impl TpktClient<Stream> {
    /// Transform the link layer with a raw data stream
    /// into a TLS data stream
    pub async fn start_tls(self, check_certificate: bool, name: &str) -> RdpResult<TpktClient<Stream>> {
        Ok(TpktClient::new(
            self.transport.start_tls(check_certificate, name).await?,
        ))
    }

    /// Used when NLA (Network Level Authentication) is negotiated
    ///
    /// Upgrades to TLS first, then runs the CredSSP handshake
    /// directly over the TLS stream
    pub async fn start_nla(
        self,
        check_certificate: bool,
        name: &str,
        authentication_protocol: &mut (dyn AuthenticationProtocol + Send),
        restricted_admin_mode: bool,
    ) -> RdpResult<TpktClient<Stream>> {
        let mut transport = self.transport.start_tls(check_certificate, name).await?;
        cssp_connect(&mut transport, authentication_protocol, restricted_admin_mode).await?;
        Ok(TpktClient::new(transport))
    }

    /// Peer TLS certificate, present once `start_tls` happened
    pub fn peer_public_key(&self) -> RdpResult<Vec<u8>> {
        self.transport.peer_public_key()
    }
}
