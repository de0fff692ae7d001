use std::fmt::{Display, Formatter};

/// A resource named in a [`QUOTA` response](https://datatracker.ietf.org/doc/html/rfc2087#section-3).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum QuotaResourceName {
    /// Sum of messages' RFC822.SIZE, in units of 1024 octets
    Storage,
    /// Number of messages
    Message,
    /// Any other string (for future RFCs)
    Atom(String),
}

impl From<&str> for QuotaResourceName {
    fn from(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "STORAGE" => QuotaResourceName::Storage,
            "MESSAGE" => QuotaResourceName::Message,
            _ => QuotaResourceName::Atom(s.to_string()),
        }
    }
}

impl<'a> From<&imap_proto::QuotaResourceName<'a>> for QuotaResourceName {
    fn from(name: &imap_proto::QuotaResourceName<'a>) -> Self {
        match name {
            imap_proto::QuotaResourceName::Storage => QuotaResourceName::Storage,
            imap_proto::QuotaResourceName::Message => QuotaResourceName::Message,
            imap_proto::QuotaResourceName::Atom(s) => QuotaResourceName::from(&**s),
        }
    }
}

impl Display for QuotaResourceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaResourceName::Storage => write!(f, "STORAGE"),
            QuotaResourceName::Message => write!(f, "MESSAGE"),
            QuotaResourceName::Atom(s) => write!(f, "{}", s),
        }
    }
}

/// Usage and limit of one resource under a quota root.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QuotaRoot {
    /// The quota root the resource is counted against.
    pub name: String,
    /// Which resource this entry describes.
    pub resource: QuotaResourceName,
    /// Current usage.
    pub used: u64,
    /// The server-imposed limit.
    pub max: u64,
}

impl QuotaRoot {
    /// `used / max`, or `None` if the server reported a zero limit.
    pub fn ratio(&self) -> Option<f64> {
        if self.max == 0 {
            None
        } else {
            Some(self.used as f64 / self.max as f64)
        }
    }
}

impl Display for QuotaRoot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}/{}", self.name, self.resource, self.used, self.max)
    }
}
