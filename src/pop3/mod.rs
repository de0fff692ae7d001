//! The POP3 client ([RFC 1939](https://tools.ietf.org/html/rfc1939)).

mod client;

pub use self::client::{Listing, Pop3Client, Stat, UniqueId};
