//! Address lists such as `"Doe, Jane" <jane@example.com>, bob@example.com`.

use std::fmt;

use encoding_rs::Encoding;
use lazy_static::lazy_static;
use regex::Regex;

use super::rfc2047;

lazy_static! {
    static ref ADDRESS: Regex = Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$"
    )
    .unwrap();
}

/// One mailbox out of an address header.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MailAddress {
    /// The decoded display name, if one was given.
    pub name: Option<String>,
    /// The `local@domain` part.
    pub address: String,
}

impl MailAddress {
    /// Parses a single `name <addr>` or bare `addr` token. Returns `None` if the address is not
    /// shaped like one.
    pub fn parse(token: &str, fallback: &'static Encoding) -> Option<MailAddress> {
        let token = token.trim();
        let open = outside_quotes(token).find(|&(_, c)| c == '<').map(|(i, _)| i);
        let close = outside_quotes(token)
            .filter(|&(_, c)| c == '>')
            .last()
            .map(|(i, _)| i);
        let (name, address) = match (open, close) {
            (Some(open), Some(close)) if open < close => {
                (display_name(&token[..open], fallback), &token[open + 1..close])
            }
            _ => (None, token),
        };
        let address = address.trim();
        if !ADDRESS.is_match(address) {
            log::trace!("dropping malformed address {:?}", token);
            return None;
        }
        Some(MailAddress {
            name,
            address: address.to_string(),
        })
    }
}

impl fmt::Display for MailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(ref name) => write!(f, "\"{}\" <{}>", name.replace('"', "\\\""), self.address),
            None => f.write_str(&self.address),
        }
    }
}

fn display_name(raw: &str, fallback: &'static Encoding) -> Option<String> {
    let raw = raw.trim();
    let unquoted = match raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        Some(inner) => unescape(inner),
        None => raw.to_string(),
    };
    let name = rfc2047::decode(&unquoted, fallback);
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// The characters of `raw` that sit outside quoted strings, with their byte offsets.
///
/// The quotes themselves and backslash escapes inside quotes are skipped too.
fn outside_quotes(raw: &str) -> impl Iterator<Item = (usize, char)> + '_ {
    let mut in_quotes = false;
    let mut escaped = false;
    raw.char_indices().filter(move |&(_, c)| {
        if escaped {
            escaped = false;
            return false;
        }
        match c {
            '\\' if in_quotes => {
                escaped = true;
                false
            }
            '"' => {
                in_quotes = !in_quotes;
                false
            }
            _ => !in_quotes,
        }
    })
}

/// Splits an address list into tokens.
///
/// `,` and `;` separate tokens unless they appear inside a quoted string or angle brackets. A
/// closing `>` ends the token it belongs to.
pub(crate) fn split_list(raw: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_angle = false;
    for (i, c) in outside_quotes(raw) {
        match c {
            '<' => in_angle = true,
            '>' if in_angle => {
                in_angle = false;
                tokens.push(&raw[start..=i]);
                start = i + 1;
            }
            ',' | ';' if !in_angle => {
                tokens.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    tokens.push(&raw[start..]);
    tokens.retain(|t| !t.trim().is_empty());
    tokens
}

/// Parses an address list, silently dropping entries that are not valid addresses.
pub fn parse_list(raw: &str, fallback: &'static Encoding) -> Vec<MailAddress> {
    split_list(raw)
        .into_iter()
        .filter_map(|token| MailAddress::parse(token, fallback))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::UTF_8;

    #[test]
    fn quoted_comma_and_bare_address() {
        let list = parse_list(r#""A, B" <a@x.com>, bare@y.com"#, UTF_8);
        assert_eq!(
            list,
            vec![
                MailAddress {
                    name: Some("A, B".into()),
                    address: "a@x.com".into()
                },
                MailAddress {
                    name: None,
                    address: "bare@y.com".into()
                },
            ]
        );
    }

    #[test]
    fn malformed_entry_is_dropped() {
        let list = parse_list(r#""A, B" <a@x.com>, bare@y.com, not an address"#, UTF_8);
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].address, "bare@y.com");
    }

    #[test]
    fn escaped_quotes_and_encoded_names() {
        let list = parse_list(
            r#""Jane \"JD\" Doe" <jd@example.com>; =?UTF-8?Q?J=C3=B6rg?= <joerg@example.de>"#,
            UTF_8,
        );
        assert_eq!(list[0].name.as_deref(), Some(r#"Jane "JD" Doe"#));
        assert_eq!(list[1].name.as_deref(), Some("Jörg"));
        assert_eq!(list[1].address, "joerg@example.de");
    }

    #[test]
    fn brackets_inside_quoted_names() {
        let list = parse_list(r#""Smith <Sales>" <s@x.com>, b@y.com"#, UTF_8);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name.as_deref(), Some("Smith <Sales>"));
        assert_eq!(list[0].address, "s@x.com");
        assert_eq!(list[1].address, "b@y.com");

        let a = MailAddress::parse(r#""a \"<b>\" c" <c@d.org>"#, UTF_8).unwrap();
        assert_eq!(a.name.as_deref(), Some(r#"a "<b>" c"#));
        assert_eq!(a.address, "c@d.org");
    }

    #[test]
    fn bracket_closes_token() {
        assert_eq!(
            split_list("x <a@b.c>y@z.org, w@v.net"),
            vec!["x <a@b.c>", "y@z.org", " w@v.net"]
        );
    }

    #[test]
    fn display() {
        let a = MailAddress::parse("Bob <bob@example.com>", UTF_8).unwrap();
        assert_eq!(a.to_string(), "\"Bob\" <bob@example.com>");
    }
}
