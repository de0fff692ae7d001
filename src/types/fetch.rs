use super::{Flag, Seq, Uid};
use chrono::{DateTime, FixedOffset};

/// An IMAP [`FETCH` response](https://tools.ietf.org/html/rfc3501#section-7.4.2) that contains
/// data about a particular message.
///
/// Only the data items that were requested (or that the server sent unprompted) are populated.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Fetch {
    /// The ordinal number of this message in its containing mailbox.
    pub message: Seq,

    /// A number expressing the unique identifier of the message.
    /// Only present if `UID` was specified in the query argument to `FETCH` and the server
    /// supports UIDs.
    pub uid: Option<Uid>,

    /// A number expressing the [RFC-2822](https://tools.ietf.org/html/rfc2822) size of the message.
    pub size: Option<u32>,

    /// The flags currently set on the message.
    pub flags: Vec<Flag>,

    /// The internal date of the message, as assigned by the server.
    pub internal_date: Option<DateTime<FixedOffset>>,

    /// The bytes of `BODY[HEADER]`, `BODY.PEEK[HEADER]` or `RFC822.HEADER`.
    pub header: Option<Vec<u8>>,

    /// The bytes of `BODY[TEXT]` or `RFC822.TEXT`.
    pub text: Option<Vec<u8>>,

    /// The bytes of the whole message, from `BODY[]` or `RFC822`.
    pub body: Option<Vec<u8>>,
}

impl Fetch {
    /// The raw message as best known: the full body if fetched, otherwise the header block
    /// followed by the text if either was fetched.
    pub fn raw(&self) -> Option<Vec<u8>> {
        if let Some(body) = &self.body {
            return Some(body.clone());
        }
        match (&self.header, &self.text) {
            (None, None) => None,
            (header, text) => {
                let mut raw = header.clone().unwrap_or_default();
                raw.extend_from_slice(text.as_deref().unwrap_or_default());
                Some(raw)
            }
        }
    }
}
