//! The IMAP4rev1 client ([RFC 3501](https://tools.ietf.org/html/rfc3501)).

mod client;
mod connection;
mod idle;
pub(crate) mod parse;
mod search;

pub use self::client::{Client, Phase};
pub use self::idle::Subscription;
pub use self::search::SearchCondition;
