use std::net::TcpStream;
use std::time::Duration;

use crate::conn::Connection;
use crate::error::Result;
use crate::imap::Client;
use crate::pop3::Pop3Client;

#[cfg(feature = "native-tls")]
use native_tls::TlsConnector;
#[cfg(all(feature = "rustls-tls", not(feature = "native-tls")))]
use rustls_connector::RustlsConnector;

/// How the connection to the server is secured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionMode {
    /// No encryption at all.
    Plaintext,
    /// TLS from the first byte (ports 993 and 995).
    #[default]
    Tls,
    /// Plaintext first, upgraded with `STARTTLS` (IMAP) or `STLS` (POP3) before anything else
    /// is sent.
    StartTls,
}

/// Tunables shared by the IMAP and POP3 clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientOptions {
    /// How long the reader thread blocks in a read before checking whether it should stop.
    pub poll_interval: Duration,
    /// How long an IDLE runs before it is ended and reissued.
    pub idle_keepalive: Duration,
    /// How long `pause` waits for the IDLE pump to wind down.
    pub pause_timeout: Duration,
    /// How long a command waits for each response line; `None` waits forever.
    pub response_timeout: Option<Duration>,
    /// Log the protocol exchange at debug level rather than trace.
    pub debug: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            poll_interval: Duration::from_millis(50),
            idle_keepalive: Duration::from_secs(29 * 60),
            pause_timeout: Duration::from_secs(30),
            response_timeout: None,
            debug: false,
        }
    }
}

/// A convenience builder for IMAP [`Client`]s and [`Pop3Client`]s over TCP.
///
/// ```no_run
/// # use mailwire::ClientBuilder;
/// # fn main() -> Result<(), mailwire::Error> {
/// let client = ClientBuilder::new("imap.example.com", 993).connect()?;
/// # Ok(())
/// # }
/// ```
///
/// To use `STARTTLS`, pick the mode before connecting:
/// ```no_run
/// # use mailwire::{ClientBuilder, ConnectionMode};
/// # fn main() -> Result<(), mailwire::Error> {
/// let pop = ClientBuilder::new("pop.example.com", 110)
///     .mode(ConnectionMode::StartTls)
///     .connect_pop3()?;
/// # Ok(())
/// # }
/// ```
///
/// The greeting is read before the client is handed out.
#[derive(Clone, Debug)]
pub struct ClientBuilder<D>
where
    D: AsRef<str>,
{
    domain: D,
    port: u16,
    mode: ConnectionMode,
    skip_tls_verify: bool,
    options: ClientOptions,
}

impl<D> ClientBuilder<D>
where
    D: AsRef<str>,
{
    /// Make a new `ClientBuilder` using the given domain and port.
    pub fn new(domain: D, port: u16) -> Self {
        ClientBuilder {
            domain,
            port,
            mode: ConnectionMode::default(),
            skip_tls_verify: false,
            options: ClientOptions::default(),
        }
    }

    pub fn mode(&mut self, mode: ConnectionMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Use `STARTTLS` (or `STLS`) for this connection.
    pub fn starttls(&mut self) -> &mut Self {
        self.mode(ConnectionMode::StartTls)
    }

    /// Accept invalid certificates and host names.
    ///
    /// Only honored by the `native-tls` backend.
    pub fn danger_skip_tls_verify(&mut self, skip: bool) -> &mut Self {
        self.skip_tls_verify = skip;
        self
    }

    pub fn poll_interval(&mut self, interval: Duration) -> &mut Self {
        self.options.poll_interval = interval;
        self
    }

    pub fn idle_keepalive(&mut self, keepalive: Duration) -> &mut Self {
        self.options.idle_keepalive = keepalive;
        self
    }

    pub fn pause_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.options.pause_timeout = timeout;
        self
    }

    pub fn response_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.options.response_timeout = timeout;
        self
    }

    pub fn debug(&mut self, debug: bool) -> &mut Self {
        self.options.debug = debug;
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    fn tcp(&self) -> Result<TcpStream> {
        log::debug!("connecting to {}:{} ({:?})", self.domain.as_ref(), self.port, self.mode);
        Ok(TcpStream::connect((self.domain.as_ref(), self.port))?)
    }

    #[cfg(feature = "native-tls")]
    fn tls(&self, tcp: TcpStream) -> Result<Connection> {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(self.skip_tls_verify)
            .danger_accept_invalid_hostnames(self.skip_tls_verify)
            .build()?;
        Ok(Box::new(connector.connect(self.domain.as_ref(), tcp)?))
    }

    #[cfg(all(feature = "rustls-tls", not(feature = "native-tls")))]
    fn tls(&self, tcp: TcpStream) -> Result<Connection> {
        if self.skip_tls_verify {
            log::warn!("rustls always verifies certificates; ignoring danger_skip_tls_verify");
        }
        let connector = RustlsConnector::new_with_native_certs()?;
        Ok(Box::new(connector.connect(self.domain.as_ref(), tcp)?))
    }

    #[cfg(not(any(feature = "native-tls", feature = "rustls-tls")))]
    fn tls(&self, _tcp: TcpStream) -> Result<Connection> {
        Err(crate::error::Error::TlsUnavailable)
    }

    /// Connects, secures the connection as configured, and reads the IMAP greeting.
    pub fn connect(&mut self) -> Result<Client<Connection>> {
        let stream: Connection = match self.mode {
            ConnectionMode::Plaintext => Box::new(self.tcp()?),
            ConnectionMode::Tls => self.tls(self.tcp()?)?,
            ConnectionMode::StartTls => {
                let mut client = Client::with_options(self.tcp()?, self.options.clone())?;
                client.read_greeting()?;
                client.starttls()?;
                let tls = self.tls(client.into_inner()?)?;
                return Client::with_options(tls, self.options.clone());
            }
        };
        let mut client = Client::with_options(stream, self.options.clone())?;
        client.read_greeting()?;
        Ok(client)
    }

    /// Connects, secures the connection as configured, and reads the POP3 greeting.
    pub fn connect_pop3(&mut self) -> Result<Pop3Client<Connection>> {
        let stream: Connection = match self.mode {
            ConnectionMode::Plaintext => Box::new(self.tcp()?),
            ConnectionMode::Tls => self.tls(self.tcp()?)?,
            ConnectionMode::StartTls => {
                let mut client = Pop3Client::with_options(self.tcp()?, self.options.clone())?;
                client.read_greeting()?;
                client.stls()?;
                let tls = self.tls(client.into_inner()?)?;
                return Pop3Client::with_options(tls, self.options.clone());
            }
        };
        let mut client = Pop3Client::with_options(stream, self.options.clone())?;
        client.read_greeting()?;
        Ok(client)
    }
}
