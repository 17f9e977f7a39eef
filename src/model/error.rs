use std::fmt;
use std::io;
use std::string::FromUtf8Error;

/// Fine grained error kind used all over the stack
///
/// Every layer map its failure into one of these kinds
/// before bubbling it up to the session
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RdpErrorKind {
    /// Unexpected data on the wire
    InvalidData,
    /// A respond from the server is not the expected one
    InvalidRespond,
    /// Feature is known but not implemented by this client
    NotImplemented,
    /// Security protocol negotiation failed (X224 failure PDU)
    ProtocolNegFailure,
    /// A state machine received an event it cannot handle in its state
    InvalidAutomata,
    /// The selected protocol is not handled by this client
    InvalidProtocol,
    /// A message was parsed with the wrong protocol layer
    WrongProtocol,
    /// During security exchange a checksum didn't match
    InvalidChecksum,
    InvalidOptionalField,
    InvalidSize,
    /// Credentials were rejected by the server
    RejectedByServer,
    /// Authentication failed
    AccessDenied,
    /// The peer closed the domain or the socket
    Disconnect,
    Timeout,
    Unknown,
    UnexpectedType,
}

#[derive(Debug)]
pub struct RdpError {
    kind: RdpErrorKind,
    message: String,
}

impl RdpError {
    pub fn new(kind: RdpErrorKind, message: &str) -> Self {
        RdpError {
            kind,
            message: String::from(message),
        }
    }

    pub fn kind(&self) -> RdpErrorKind {
        self.kind
    }
}

#[derive(Debug)]
pub enum Error {
    /// RDP specific error
    RdpError(RdpError),
    Io(io::Error),
    /// TLS handshake or record error from native-tls
    SslError(native_tls::Error),
    ASN1Error(yasna::ASN1Error),
    X509Error(String),
    TryError(String),
}

impl Error {
    /// Kind of the error when it is an RDP one, `Unknown` otherwise
    ///
    /// Mostly use by tests and by the session to decide
    /// if a license error is the benign valid client case
    pub fn kind(&self) -> RdpErrorKind {
        match self {
            Error::RdpError(e) => e.kind(),
            _ => RdpErrorKind::Unknown,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::RdpError(e) => write!(f, "{:?}: {}", e.kind, e.message),
            Error::Io(e) => write!(f, "io: {}", e),
            Error::SslError(e) => write!(f, "ssl: {}", e),
            Error::ASN1Error(e) => write!(f, "asn1: {:?}", e),
            Error::X509Error(e) => write!(f, "x509: {}", e),
            Error::TryError(e) => write!(f, "cast: {}", e),
        }
    }
}

impl std::error::Error for Error {}

pub type RdpResult<T> = Result<T, Error>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<native_tls::Error> for Error {
    fn from(e: native_tls::Error) -> Self {
        Error::SslError(e)
    }
}

impl From<yasna::ASN1Error> for Error {
    fn from(e: yasna::ASN1Error) -> Self {
        Error::ASN1Error(e)
    }
}

impl From<FromUtf8Error> for Error {
    fn from(e: FromUtf8Error) -> Self {
        Error::TryError(format!("invalid utf8: {}", e))
    }
}

impl<T: num_enum::TryFromPrimitive> From<num_enum::TryFromPrimitiveError<T>> for Error {
    fn from(e: num_enum::TryFromPrimitiveError<T>) -> Self {
        Error::TryError(format!("{}", e))
    }
}

/// Shorthand to build an `Error::RdpError`
///
/// # Example
/// ```
/// use rdp_client::model::error::{Error, RdpErrorKind};
/// use rdp_client::rdp_error;
/// let e = rdp_error!(RdpErrorKind::InvalidData, "bad length");
/// assert_eq!(e.kind(), RdpErrorKind::InvalidData);
/// ```
#[macro_export]
macro_rules! rdp_error {
    ($kind:expr, $message:expr) => {
        $crate::model::error::Error::RdpError($crate::model::error::RdpError::new($kind, $message))
    };
}
