use std::fmt;
use std::str::FromStr;

/// With the exception of [`Flag::Keyword`], these flags are system flags that are pre-defined in
/// [RFC 3501 section 2.3.2](https://tools.ietf.org/html/rfc3501#section-2.3.2). All system flags
/// begin with `\` in the IMAP protocol.  Certain system flags (`\Deleted` and `\Seen`) have
/// special semantics described elsewhere.
///
/// > Note: The `\Recent` system flag is a special case of a session flag.  `\Recent` can not be
/// > used as an argument in a `STORE` or `APPEND` command, and thus can not be changed at all.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[non_exhaustive]
pub enum Flag {
    /// Message has been read
    Seen,

    /// Message has been answered
    Answered,

    /// Message is "flagged" for urgent/special attention
    Flagged,

    /// Message is "deleted" for removal by later EXPUNGE
    Deleted,

    /// Message has not completed composition (marked as a draft).
    Draft,

    /// Message is "recently" arrived in this mailbox.
    Recent,

    /// The [`Mailbox::permanent_flags`](crate::types::Mailbox::permanent_flags) can include this
    /// special flag (`\*`), which indicates that it is possible to create new keywords by
    /// attempting to store those flags in the mailbox.
    MayCreate,

    /// A keyword or other non-standard flag, kept verbatim.
    Keyword(String),
}

impl Flag {
    fn system(s: &str) -> Option<Self> {
        let flag = match s.to_ascii_lowercase().as_str() {
            "\\seen" => Flag::Seen,
            "\\answered" => Flag::Answered,
            "\\flagged" => Flag::Flagged,
            "\\deleted" => Flag::Deleted,
            "\\draft" => Flag::Draft,
            "\\recent" => Flag::Recent,
            "\\*" => Flag::MayCreate,
            _ => return None,
        };
        Some(flag)
    }

    /// Whether a client may set or clear this flag with `STORE`.
    pub fn is_storable(&self) -> bool {
        !matches!(self, Flag::Recent | Flag::MayCreate)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Flag::Seen => write!(f, "\\Seen"),
            Flag::Answered => write!(f, "\\Answered"),
            Flag::Flagged => write!(f, "\\Flagged"),
            Flag::Deleted => write!(f, "\\Deleted"),
            Flag::Draft => write!(f, "\\Draft"),
            Flag::Recent => write!(f, "\\Recent"),
            Flag::MayCreate => write!(f, "\\*"),
            Flag::Keyword(ref s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Flag {
    fn from(s: &str) -> Self {
        Flag::system(s).unwrap_or_else(|| Flag::Keyword(s.to_string()))
    }
}

impl From<String> for Flag {
    fn from(s: String) -> Self {
        Flag::system(&s).unwrap_or(Flag::Keyword(s))
    }
}

impl FromStr for Flag {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Flag::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_flags_are_case_insensitive() {
        assert_eq!(Flag::from("\\SEEN"), Flag::Seen);
        assert_eq!(Flag::from("\\*"), Flag::MayCreate);
        assert_eq!(Flag::from("$Forwarded"), Flag::Keyword("$Forwarded".into()));
    }

    #[test]
    fn display_round_trips() {
        for flag in [Flag::Seen, Flag::Deleted, Flag::Keyword("Junk".into())] {
            assert_eq!(Flag::from(flag.to_string()), flag);
        }
    }
}
