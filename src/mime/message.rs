use chrono::{DateTime, FixedOffset};

use super::address::MailAddress;
use super::encoding::TransferEncoding;
use super::header::{HeaderEnum, HeaderMap};
use super::part::MimePart;
use crate::types::{Fetch, Flag, Seq, Uid};

/// Anything that carries a header block: a whole [`Message`] or one of its parts.
///
/// Everything except [`HeaderBearing::headers`] has a default implementation in terms of it.
pub trait HeaderBearing {
    fn headers(&self) -> &HeaderMap;

    /// The decoded primary value of a header.
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get_str(name)
    }

    /// The lowercased media type, `text/plain` if none is given.
    fn content_type(&self) -> String {
        self.headers()
            .get_str("Content-Type")
            .map(|ct| ct.trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| "text/plain".to_string())
    }

    /// The `charset` parameter of `Content-Type`.
    fn charset(&self) -> Option<&str> {
        self.headers()
            .get("Content-Type")
            .and_then(|ct| ct.param("charset"))
    }

    fn transfer_encoding(&self) -> TransferEncoding {
        self.headers()
            .get_str("Content-Transfer-Encoding")
            .map(TransferEncoding::from)
            .unwrap_or_default()
    }

    /// The lowercased `Content-Disposition`, e.g. `attachment` or `inline`.
    fn disposition(&self) -> Option<String> {
        self.headers()
            .get_str("Content-Disposition")
            .map(|d| d.trim().to_ascii_lowercase())
    }

    /// The file name from `Content-Disposition`, or the `name` parameter of `Content-Type`.
    fn filename(&self) -> Option<&str> {
        self.headers()
            .get("Content-Disposition")
            .and_then(|d| d.param("filename"))
            .or_else(|| {
                self.headers()
                    .get("Content-Type")
                    .and_then(|ct| ct.param("name"))
            })
    }

    /// Whether the part is an attachment: disposed as one, or carrying a file name.
    fn is_attachment(&self) -> bool {
        self.disposition().as_deref() == Some("attachment") || self.filename().is_some()
    }
}

/// The `Importance` header.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
}

impl HeaderEnum for Importance {
    const VOCABULARY: &'static [(&'static str, Self)] = &[
        ("low", Importance::Low),
        ("normal", Importance::Normal),
        ("high", Importance::High),
    ];
}

/// A parsed message together with what the server told us about it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    root: MimePart,
    /// The message sequence number, for messages fetched over IMAP or retrieved over POP3.
    pub seq: Option<Seq>,
    /// The IMAP unique identifier.
    pub uid: Option<Uid>,
    /// The size the server reported, in octets.
    pub size: Option<u32>,
    pub flags: Vec<Flag>,
    /// When the server received the message.
    pub internal_date: Option<DateTime<FixedOffset>>,
}

impl Message {
    /// Parses a raw RFC 5322 message.
    pub fn parse(raw: &[u8], headers_only: bool) -> Message {
        Message::from_part(MimePart::parse(raw, headers_only))
    }

    pub fn from_part(root: MimePart) -> Message {
        Message {
            root,
            seq: None,
            uid: None,
            size: None,
            flags: Vec::new(),
            internal_date: None,
        }
    }

    /// Builds a message from a FETCH response, using whichever of the full body or the header
    /// block it carries.
    pub fn from_fetch(fetch: &Fetch, headers_only: bool) -> Message {
        let raw = fetch.raw().unwrap_or_default();
        let headers_only = headers_only || (fetch.body.is_none() && fetch.text.is_none());
        let mut message = Message::parse(&raw, headers_only);
        message.seq = Some(fetch.message);
        message.uid = fetch.uid;
        message.size = fetch.size;
        message.flags = fetch.flags.clone();
        message.internal_date = fetch.internal_date;
        message
    }

    /// The top-level MIME part.
    pub fn root(&self) -> &MimePart {
        &self.root
    }

    fn textual_leaves(&self) -> impl Iterator<Item = &MimePart> {
        self.root
            .leaves()
            .into_iter()
            .filter(|p| !p.is_attachment() && p.text().is_some())
    }

    /// The first `text/plain` part that is not an attachment, or an empty string.
    pub fn body_text(&self) -> &str {
        self.textual_leaves()
            .find(|p| p.content_type() == "text/plain")
            .and_then(MimePart::text)
            .unwrap_or("")
    }

    /// The first part whose type mentions `html` and that is not an attachment.
    pub fn body_html(&self) -> Option<&str> {
        self.textual_leaves()
            .find(|p| p.content_type().contains("html"))
            .and_then(MimePart::text)
    }

    /// Every textual rendering of the message body, e.g. both halves of a
    /// `multipart/alternative`.
    pub fn alternate_views(&self) -> Vec<&MimePart> {
        self.textual_leaves().collect()
    }

    pub fn attachments(&self) -> Vec<&MimePart> {
        self.root
            .leaves()
            .into_iter()
            .filter(|p| p.is_attachment())
            .collect()
    }

    pub fn subject(&self) -> Option<&str> {
        self.header("Subject")
    }

    pub fn message_id(&self) -> Option<&str> {
        self.header("Message-ID")
    }

    pub fn from(&self) -> Vec<MailAddress> {
        self.root.headers().addresses("From")
    }

    pub fn sender(&self) -> Option<MailAddress> {
        self.root.headers().addresses("Sender").into_iter().next()
    }

    pub fn to(&self) -> Vec<MailAddress> {
        self.root.headers().addresses("To")
    }

    pub fn cc(&self) -> Vec<MailAddress> {
        self.root.headers().addresses("Cc")
    }

    pub fn bcc(&self) -> Vec<MailAddress> {
        self.root.headers().addresses("Bcc")
    }

    pub fn reply_to(&self) -> Vec<MailAddress> {
        self.root.headers().addresses("Reply-To")
    }

    /// The date the message was written; `None` if no header yields one.
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.root.headers().date()
    }

    pub fn importance(&self) -> Importance {
        self.root.headers().get_enum("Importance")
    }
}

impl HeaderBearing for Message {
    fn headers(&self) -> &HeaderMap {
        self.root.headers()
    }
}
