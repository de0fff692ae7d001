//! Mail client error types.

use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;
#[cfg(any(feature = "native-tls", feature = "rustls-tls"))]
use std::net::TcpStream;
use std::result;

use base64::DecodeError;
use bufstream::IntoInnerError as BufError;
#[cfg(feature = "native-tls")]
use native_tls::Error as TlsError;
#[cfg(feature = "native-tls")]
use native_tls::HandshakeError as TlsHandshakeError;
#[cfg(feature = "rustls-tls")]
use rustls_connector::HandshakeError as RustlsHandshakeError;

/// A convenience wrapper around `Result` for `mailwire::Error`.
pub type Result<T> = result::Result<T, Error>;

/// A set of errors that can occur in the IMAP and POP3 clients.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An `io::Error` that occurred while trying to read or write to a network stream.
    Io(IoError),
    /// An error from the `native_tls` library during the TLS handshake.
    #[cfg(feature = "native-tls")]
    TlsHandshake(TlsHandshakeError<TcpStream>),
    /// An error from the `native_tls` library while managing the socket.
    #[cfg(feature = "native-tls")]
    Tls(TlsError),
    /// An error from the `rustls` library during the TLS handshake.
    #[cfg(feature = "rustls-tls")]
    RustlsHandshake(RustlsHandshakeError<TcpStream>),
    /// A TLS connection was requested, but the crate was built without a TLS backend.
    TlsUnavailable,
    /// A BAD response from the IMAP server.
    Bad(String),
    /// A NO response from the IMAP server.
    No(String),
    /// An `-ERR` response from the POP3 server.
    Pop(String),
    /// The server answered with something other than what the running command expects, such as
    /// a missing continuation request.
    Unexpected(String),
    /// The connection was terminated unexpectedly.
    ConnectionLost,
    /// Error parsing a server response or a message.
    Parse(ParseError),
    /// Error validating input data.
    Validate(ValidateError),
    /// The operation is not allowed in the current connection phase.
    State(StateError),
}

impl Error {
    /// Whether this error means the underlying stream is gone.
    ///
    /// Once a transport error has been returned, the background reader has stopped, and every
    /// further command on the same connection will fail too.
    pub fn is_transport(&self) -> bool {
        match self {
            Error::Io(_) | Error::ConnectionLost | Error::TlsUnavailable => true,
            #[cfg(feature = "native-tls")]
            Error::Tls(_) | Error::TlsHandshake(_) => true,
            #[cfg(feature = "rustls-tls")]
            Error::RustlsHandshake(_) => true,
            _ => false,
        }
    }

    /// Whether the server rejected the command. The connection remains usable.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Error::Bad(_) | Error::No(_) | Error::Pop(_) | Error::Unexpected(_)
        )
    }
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Error {
        Error::Io(err)
    }
}

impl<T> From<BufError<T>> for Error {
    fn from(err: BufError<T>) -> Error {
        Error::Io(err.into())
    }
}

#[cfg(feature = "native-tls")]
impl From<TlsHandshakeError<TcpStream>> for Error {
    fn from(err: TlsHandshakeError<TcpStream>) -> Error {
        Error::TlsHandshake(err)
    }
}

#[cfg(feature = "native-tls")]
impl From<TlsError> for Error {
    fn from(err: TlsError) -> Error {
        Error::Tls(err)
    }
}

#[cfg(feature = "rustls-tls")]
impl From<RustlsHandshakeError<TcpStream>> for Error {
    fn from(err: RustlsHandshakeError<TcpStream>) -> Error {
        Error::RustlsHandshake(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

impl From<StateError> for Error {
    fn from(err: StateError) -> Error {
        Error::State(err)
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Error {
        Error::Parse(ParseError::Base64(err))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Io(ref e) => fmt::Display::fmt(e, f),
            #[cfg(feature = "native-tls")]
            Error::Tls(ref e) => fmt::Display::fmt(e, f),
            #[cfg(feature = "native-tls")]
            Error::TlsHandshake(ref e) => fmt::Display::fmt(e, f),
            #[cfg(feature = "rustls-tls")]
            Error::RustlsHandshake(ref e) => fmt::Display::fmt(e, f),
            Error::TlsUnavailable => f.write_str("No TLS backend compiled in"),
            Error::Validate(ref e) => fmt::Display::fmt(e, f),
            Error::Parse(ref e) => fmt::Display::fmt(e, f),
            Error::State(ref e) => fmt::Display::fmt(e, f),
            Error::No(ref data) => write!(f, "No Response: {}", data),
            Error::Bad(ref data) => write!(f, "Bad Response: {}", data),
            Error::Pop(ref data) => write!(f, "Error Response: {}", data),
            Error::Unexpected(ref data) => write!(f, "Unexpected Response: {}", data),
            Error::ConnectionLost => f.write_str("Connection Lost"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            #[cfg(feature = "native-tls")]
            Error::Tls(ref e) => Some(e),
            #[cfg(feature = "native-tls")]
            Error::TlsHandshake(ref e) => Some(e),
            #[cfg(feature = "rustls-tls")]
            Error::RustlsHandshake(ref e) => Some(e),
            Error::Parse(ref e) => Some(e),
            Error::Validate(ref e) => Some(e),
            Error::State(ref e) => Some(e),
            _ => None,
        }
    }
}

/// An error occured while trying to parse a server response or a message.
#[derive(Debug)]
#[non_exhaustive]
pub enum ParseError {
    /// Indicates an error parsing the status response. Such as OK, NO, and BAD.
    Invalid(Vec<u8>),
    /// The client could not find or decode the server's authentication challenge.
    Authentication(String, Option<DecodeError>),
    /// A base64 payload could not be decoded.
    Base64(DecodeError),
    /// A mailbox name was not valid modified UTF-7.
    MailboxName(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ParseError::Invalid(_) => f.write_str("Unable to parse status response"),
            ParseError::Authentication(_, _) => {
                f.write_str("Unable to parse authentication response")
            }
            ParseError::Base64(ref e) => write!(f, "Unable to decode base64 data: {}", e),
            ParseError::MailboxName(ref name) => {
                write!(f, "Invalid modified UTF-7 mailbox name: {:?}", name)
            }
        }
    }
}

impl StdError for ParseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            ParseError::Authentication(_, Some(ref e)) => Some(e),
            ParseError::Base64(ref e) => Some(e),
            _ => None,
        }
    }
}

/// An operation was attempted in a connection phase that does not allow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StateError {
    /// The command requires a logged-in session.
    NotAuthenticated,
    /// The command requires a logged-out session, e.g. `LOGIN` after a successful login.
    AlreadyAuthenticated,
    /// The command requires a selected mailbox.
    NoMailboxSelected,
    /// The IDLE pump owns the connection; pause it before issuing commands.
    Idling,
    /// The connection was logged out or lost.
    Disconnected,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            StateError::NotAuthenticated => "Not authenticated",
            StateError::AlreadyAuthenticated => "Already authenticated",
            StateError::NoMailboxSelected => "No mailbox selected",
            StateError::Idling => "Connection is idling; pause it before issuing commands",
            StateError::Disconnected => "Connection is closed",
        })
    }
}

impl StdError for StateError {}

/// An invalid character was found in an input string.
#[derive(Debug)]
pub struct ValidateError(pub char);

impl fmt::Display for ValidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // print character in debug form because invalid ones are often whitespaces
        write!(f, "Invalid character in input: {:?}", self.0)
    }
}

impl StdError for ValidateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_from_each_source() {
        let err = crate::utf7::decode("&Jjo").unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::MailboxName(ref n)) if n == "&Jjo"));
        assert!(!err.is_transport());

        let err = crate::imap::parse::parse_response(b"garbage\r\n").unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::Invalid(_))));

        let decode = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, "!!");
        let err = Error::from(decode.unwrap_err());
        match err {
            Error::Parse(ref p @ ParseError::Base64(_)) => assert!(p.source().is_some()),
            ref other => panic!("unexpected {:?}", other),
        }
        assert!(err.to_string().contains("base64"));
    }
}
