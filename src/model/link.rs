use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_native_tls::{TlsConnector, TlsStream};

use crate::model::error::{RdpErrorKind, RdpResult};
use crate::rdp_error;

/// Connect timeout of the underlying TCP socket
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Underlying byte stream of the whole stack
///
/// Starts as a raw TCP socket and may be upgraded exactly once
/// to TLS when the X224 negotiation selects SSL or NLA
pub enum Stream {
    Raw(TcpStream),
    Ssl(TlsStream<TcpStream>),
}

impl Stream {
    /// Open the TCP connection
    ///
    /// Connection establishment is bounded, everything after
    /// blocks until bytes arrive or the socket fails
    pub async fn connect(addr: &str) -> RdpResult<Self> {
        let tcp = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| rdp_error!(RdpErrorKind::Timeout, "tcp connect timeout"))??;
        Ok(Stream::Raw(tcp))
    }

    /// Upgrade the raw socket to TLS
    ///
    /// The server certificate is not checked against a trust store
    /// unless `check_certificate` is set
    pub async fn start_tls(self, check_certificate: bool, name: &str) -> RdpResult<Self> {
        let tcp = match self {
            Stream::Raw(tcp) => tcp,
            Stream::Ssl(_) => {
                return Err(rdp_error!(
                    RdpErrorKind::InvalidAutomata,
                    "tls is already started"
                ))
            }
        };

        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(!check_certificate)
            .danger_accept_invalid_hostnames(!check_certificate)
            .use_sni(false)
            .build()?;

        let stream = TlsConnector::from(connector).connect(name, tcp).await?;
        Ok(Stream::Ssl(stream))
    }

    /// DER encoding of the peer TLS certificate
    pub fn peer_certificate_der(&self) -> RdpResult<Vec<u8>> {
        match self {
            Stream::Raw(_) => Err(rdp_error!(
                RdpErrorKind::InvalidAutomata,
                "no certificate on a raw stream"
            )),
            Stream::Ssl(stream) => {
                let certificate = stream
                    .get_ref()
                    .peer_certificate()?
                    .ok_or_else(|| rdp_error!(RdpErrorKind::InvalidRespond, "peer certificate is missing"))?;
                Ok(certificate.to_der()?)
            }
        }
    }

    /// SubjectPublicKeyInfo key bits of the peer TLS certificate
    ///
    /// CredSSP binds the NTLM exchange to the TLS channel by
    /// sealing exactly these bytes
    pub fn peer_public_key(&self) -> RdpResult<Vec<u8>> {
        let der = self.peer_certificate_der()?;
        let (_, certificate) = x509_parser::parse_x509_certificate(&der)
            .map_err(|e| crate::model::error::Error::X509Error(format!("{:?}", e)))?;
        Ok(certificate
            .tbs_certificate
            .subject_pki
            .subject_public_key
            .data
            .to_vec())
    }
}

impl AsyncRead for Stream {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Stream::Raw(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Ssl(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match &mut *self {
            Stream::Raw(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Ssl(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Stream::Raw(s) => Pin::new(s).poll_flush(cx),
            Stream::Ssl(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Stream::Raw(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Ssl(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
