use super::Flag;
use std::fmt;

/// Meta-information about an IMAP mailbox, as returned by
/// [`SELECT`](https://tools.ietf.org/html/rfc3501#section-6.3.1), `EXAMINE`, and `STATUS`.
///
/// A fresh `Mailbox` is produced by every select; it is a snapshot, not a live view.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct Mailbox {
    /// The decoded name of the mailbox.
    pub name: String,

    /// Defined flags in the mailbox.  See the description of the [FLAGS
    /// response](https://tools.ietf.org/html/rfc3501#section-7.2.6) for more detail.
    pub flags: Vec<Flag>,

    /// The number of messages in the mailbox.
    pub exists: u32,

    /// The number of messages with the \Recent flag set.
    pub recent: u32,

    /// For `SELECT`, the message sequence number of the first unseen message. For `STATUS`, the
    /// number of unseen messages.
    pub unseen: Option<u32>,

    /// A list of message flags that the client can change permanently.  If this is missing, the
    /// client should assume that all flags can be changed permanently.
    pub permanent_flags: Vec<Flag>,

    /// The next unique identifier value.
    pub uid_next: Option<u32>,

    /// The unique identifier validity value.
    pub uid_validity: Option<u32>,

    /// Whether the mailbox was opened read-only.
    pub read_only: bool,
}

impl Mailbox {
    pub(crate) fn named(name: &str) -> Self {
        Mailbox {
            name: name.to_string(),
            ..Mailbox::default()
        }
    }

    /// Whether messages in this mailbox may be changed.
    pub fn is_writable(&self) -> bool {
        !self.read_only
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name: {:?}, flags: {:?}, exists: {}, recent: {}, unseen: {:?}, \
             permanent_flags: {:?}, uid_next: {:?}, uid_validity: {:?}, read_only: {}",
            self.name,
            self.flags,
            self.exists,
            self.recent,
            self.unseen,
            self.permanent_flags,
            self.uid_next,
            self.uid_validity,
            self.read_only,
        )
    }
}
