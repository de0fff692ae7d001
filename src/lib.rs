//! This crate lets you talk to mail servers over IMAP ([RFC 3501](https://tools.ietf.org/html/rfc3501))
//! and POP3 ([RFC 1939](https://tools.ietf.org/html/rfc1939)), and decode the messages they hand
//! back.
//!
//! Every client runs a background thread that reads the server's responses into a queue, so
//! that a mailbox can be watched with IDLE while events are delivered to any number of
//! [`Subscription`](imap::Subscription)s. Messages are decoded into [`mime::Message`] with
//! headers unfolded, encoded words resolved and text converted to UTF-8.
//!
//! Connections are opened with a [`ClientBuilder`]:
//!
//! ```no_run
//! # #[cfg(feature = "native-tls")]
//! # {
//! fn fetch_inbox_top() -> mailwire::error::Result<Option<String>> {
//!     let mut client = mailwire::ClientBuilder::new("imap.example.com", 993).connect()?;
//!     client.login("me@example.com", "password")?;
//!
//!     client.select("INBOX")?;
//!     let message = client.fetch_message(1)?;
//!     let subject = message.subject().map(str::to_string);
//!
//!     client.logout()?;
//!     Ok(subject)
//! }
//! # }
//! ```
//!
//! Watching a mailbox:
//!
//! ```no_run
//! # #[cfg(feature = "native-tls")]
//! # {
//! # fn watch() -> mailwire::error::Result<()> {
//! let mut client = mailwire::ClientBuilder::new("imap.example.com", 993).connect()?;
//! client.login("me@example.com", "password")?;
//! client.select("INBOX")?;
//!
//! let events = client.subscribe()?;
//! while let Some(event) = events.recv() {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! # }
//! ```
//!
//! ## Opting out of `native_tls`
//!
//! For situations where using openssl becomes problematic, you can disable the default feature
//! which provides integration with the `native_tls` crate. One major reason you might want to do
//! this is cross-compiling. To opt out of native_tls, add this to your Cargo.toml file:
//!
//! ```toml
//! [dependencies.mailwire]
//! version = "<some version>"
//! default-features = false
//! features = ["rustls-tls"]
//! ```

pub mod authenticator;
mod client_builder;
mod conn;
pub mod error;
pub mod imap;
mod literal;
pub mod mime;
pub mod pop3;
mod reader;
pub mod types;
pub mod utf7;
mod utils;

#[cfg(test)]
mod mock_stream;

pub use crate::authenticator::Authenticator;
pub use crate::client_builder::{ClientBuilder, ClientOptions, ConnectionMode};
pub use crate::conn::{Connection, SetReadTimeout, Transport};
pub use crate::error::{Error, Result};
pub use crate::imap::Client;
pub use crate::pop3::Pop3Client;
pub use crate::types::*;
