use crate::error::{Error, Result};

use std::fmt::{Debug, Formatter};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Must be implemented for a transport in order for a client to run its background reader over
/// it.
///
/// The reader thread sets a short read timeout so that a blocked read returns periodically and
/// the thread can notice a shutdown request.
pub trait SetReadTimeout {
    /// Set the timeout for subsequent reads to the given one.
    ///
    /// If `timeout` is `None`, the read timeout should be removed.
    ///
    /// See also `std::net::TcpStream::set_read_timeout`.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;
}

/// A duplex byte stream a client can run over.
pub trait Transport: Read + Write + Send + SetReadTimeout + 'static {}

impl<T> Transport for T where T: Read + Write + Send + SetReadTimeout + 'static {}

impl Debug for dyn Transport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Mail transport")
    }
}

/// A boxed transport, as produced by [`ClientBuilder`](crate::ClientBuilder).
pub type Connection = Box<dyn Transport>;

impl SetReadTimeout for Box<dyn Transport> {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        (**self).set_read_timeout(timeout)
    }
}

impl SetReadTimeout for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        TcpStream::set_read_timeout(self, timeout).map_err(Error::Io)
    }
}

#[cfg(feature = "native-tls")]
impl<T: SetReadTimeout + Read + Write> SetReadTimeout for native_tls::TlsStream<T> {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.get_mut().set_read_timeout(timeout)
    }
}

#[cfg(feature = "rustls-tls")]
impl SetReadTimeout for rustls_connector::TlsStream<TcpStream> {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.get_ref().set_read_timeout(timeout).map_err(Error::Io)
    }
}
