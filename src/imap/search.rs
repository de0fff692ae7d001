use std::fmt;
use std::ops;

use chrono::NaiveDate;

use crate::utils::{iter_join, quote};

/// A typed `SEARCH` criterion.
///
/// Conditions combine with [`and`](SearchCondition::and), [`or`](SearchCondition::or), and `!`,
/// and render as the criteria of a `SEARCH` command:
///
/// ```
/// use mailwire::imap::SearchCondition;
///
/// let query = SearchCondition::Unseen
///     .and(SearchCondition::From("alice@example.com".into()))
///     .or(!SearchCondition::Deleted);
/// assert_eq!(query.to_string(), r#"OR (UNSEEN FROM "alice@example.com") NOT DELETED"#);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum SearchCondition {
    All,
    Answered,
    Unanswered,
    Deleted,
    Undeleted,
    Draft,
    Flagged,
    Unflagged,
    New,
    Old,
    Recent,
    Seen,
    Unseen,
    From(String),
    To(String),
    Cc(String),
    Bcc(String),
    Subject(String),
    Body(String),
    Text(String),
    Header(String, String),
    Keyword(String),
    /// Internal date on or after the day.
    Since(NaiveDate),
    /// Internal date before the day.
    Before(NaiveDate),
    On(NaiveDate),
    SentSince(NaiveDate),
    SentBefore(NaiveDate),
    Larger(u32),
    Smaller(u32),
    /// A UID set such as `1:4,7`.
    Uid(String),
    /// A sequence set such as `1:*`.
    Sequence(String),
    Not(Box<SearchCondition>),
    Or(Box<SearchCondition>, Box<SearchCondition>),
    /// Every condition must hold. An empty conjunction matches everything.
    And(Vec<SearchCondition>),
}

impl SearchCondition {
    pub fn and(self, other: SearchCondition) -> SearchCondition {
        match (self, other) {
            (SearchCondition::And(mut a), SearchCondition::And(b)) => {
                a.extend(b);
                SearchCondition::And(a)
            }
            (SearchCondition::And(mut a), b) => {
                a.push(b);
                SearchCondition::And(a)
            }
            (a, b) => SearchCondition::And(vec![a, b]),
        }
    }

    pub fn or(self, other: SearchCondition) -> SearchCondition {
        SearchCondition::Or(Box::new(self), Box::new(other))
    }

    /// Renders the condition where a single search key is expected.
    fn fmt_key(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchCondition::And(all) if all.len() > 1 => write!(f, "({})", self),
            _ => write!(f, "{}", self),
        }
    }
}

impl ops::Not for SearchCondition {
    type Output = SearchCondition;

    fn not(self) -> SearchCondition {
        match self {
            SearchCondition::Not(inner) => *inner,
            other => SearchCondition::Not(Box::new(other)),
        }
    }
}

fn date(d: &NaiveDate) -> String {
    d.format("%d-%b-%Y").to_string()
}

fn text(s: &str) -> String {
    quote!(s)
}

impl fmt::Display for SearchCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SearchCondition::*;
        match self {
            All => write!(f, "ALL"),
            Answered => write!(f, "ANSWERED"),
            Unanswered => write!(f, "UNANSWERED"),
            Deleted => write!(f, "DELETED"),
            Undeleted => write!(f, "UNDELETED"),
            Draft => write!(f, "DRAFT"),
            Flagged => write!(f, "FLAGGED"),
            Unflagged => write!(f, "UNFLAGGED"),
            New => write!(f, "NEW"),
            Old => write!(f, "OLD"),
            Recent => write!(f, "RECENT"),
            Seen => write!(f, "SEEN"),
            Unseen => write!(f, "UNSEEN"),
            From(s) => write!(f, "FROM {}", text(s)),
            To(s) => write!(f, "TO {}", text(s)),
            Cc(s) => write!(f, "CC {}", text(s)),
            Bcc(s) => write!(f, "BCC {}", text(s)),
            Subject(s) => write!(f, "SUBJECT {}", text(s)),
            Body(s) => write!(f, "BODY {}", text(s)),
            Text(s) => write!(f, "TEXT {}", text(s)),
            Header(name, value) => write!(f, "HEADER {} {}", text(name), text(value)),
            Keyword(k) => write!(f, "KEYWORD {}", k),
            Since(d) => write!(f, "SINCE {}", date(d)),
            Before(d) => write!(f, "BEFORE {}", date(d)),
            On(d) => write!(f, "ON {}", date(d)),
            SentSince(d) => write!(f, "SENTSINCE {}", date(d)),
            SentBefore(d) => write!(f, "SENTBEFORE {}", date(d)),
            Larger(n) => write!(f, "LARGER {}", n),
            Smaller(n) => write!(f, "SMALLER {}", n),
            Uid(set) => write!(f, "UID {}", set),
            Sequence(set) => write!(f, "{}", set),
            Not(inner) => {
                write!(f, "NOT ")?;
                inner.fmt_key(f)
            }
            Or(a, b) => {
                write!(f, "OR ")?;
                a.fmt_key(f)?;
                write!(f, " ")?;
                b.fmt_key(f)
            }
            And(all) if all.is_empty() => write!(f, "ALL"),
            And(all) => write!(f, "{}", iter_join(all, " ")),
        }
    }
}
