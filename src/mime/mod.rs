//! Decoding of RFC 5322 messages and their MIME structure.
//!
//! [`Message::parse`] turns the raw bytes returned by `FETCH` or `RETR` into a tree of
//! [`MimePart`]s. Headers are unfolded and their encoded words decoded, transfer encodings are
//! undone, and textual parts are converted to UTF-8.

use encoding_rs::Encoding;

pub mod address;
pub mod date;
pub mod encoding;
mod header;
mod message;
mod part;
pub mod rfc2047;

pub use self::address::MailAddress;
pub use self::encoding::TransferEncoding;
pub use self::header::{HeaderEnum, HeaderMap, HeaderValue};
pub use self::message::{HeaderBearing, Importance, Message};
pub use self::part::{Body, MimePart};

/// The charset assumed for text that does not declare one, or declares one nobody knows.
pub static DEFAULT_CHARSET: &Encoding = &encoding_rs::WINDOWS_1252_INIT;
