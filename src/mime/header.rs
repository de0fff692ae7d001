//! Header blocks.
//!
//! A [`HeaderMap`] is built once from the raw header block of a message or body part. Lookups
//! are case-insensitive and iteration follows the order headers appeared in.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use encoding_rs::Encoding;

use super::address::{self, MailAddress};
use super::encoding::{decode_charset, lookup_charset};
use super::{date, rfc2047};

/// Headers that may legitimately repeat; every occurrence is kept.
const ADDITIVE: &[&str] = &["received", "comments", "keywords"];

fn is_additive(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ADDITIVE.contains(&lower.as_str()) || lower.starts_with("resent-")
}

/// Headers whose values carry `;`-separated parameters.
const PARAMETERIZED: &[&str] = &["content-type", "content-disposition"];

fn has_params(name: &str) -> bool {
    PARAMETERIZED.iter().any(|p| p.eq_ignore_ascii_case(name))
}

/// One header value. Parameterized headers are split into a primary value and `;`-separated
/// parameters; any other header's value is the whole decoded text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HeaderValue {
    raw: String,
    value: String,
    params: Vec<(String, String)>,
}

impl HeaderValue {
    /// Parses an unfolded header value. Encoded words in the primary value and in parameters are
    /// decoded, falling back to `fallback` for unknown charsets.
    pub fn parse(raw: &str, fallback: &'static Encoding) -> HeaderValue {
        let mut pieces = split_unquoted(raw, ';').into_iter();
        let value = pieces.next().unwrap_or_default();
        let value = rfc2047::decode(value.trim(), fallback);

        let mut params: Vec<(String, String)> = Vec::new();
        let mut extended: Vec<(String, u32, bool, String)> = Vec::new();
        for piece in pieces {
            let Some((name, val)) = piece.split_once('=') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            let val = unquote(val.trim());
            match parse_extended_name(&name) {
                Some((base, index, encoded)) => extended.push((base, index, encoded, val)),
                None => params.push((name, rfc2047::decode(&val, fallback))),
            }
        }
        for (name, val) in join_extended(extended, fallback) {
            params.retain(|(n, _)| *n != name);
            params.push((name, val));
        }

        HeaderValue {
            raw: raw.to_string(),
            value,
            params,
        }
    }

    /// Decodes the whole unfolded value as text, without looking for parameters.
    pub fn unstructured(raw: &str, fallback: &'static Encoding) -> HeaderValue {
        HeaderValue {
            raw: raw.to_string(),
            value: rfc2047::decode(raw.trim(), fallback),
            params: Vec::new(),
        }
    }

    fn for_header(name: &str, raw: &str, fallback: &'static Encoding) -> HeaderValue {
        if has_params(name) {
            HeaderValue::parse(raw, fallback)
        } else {
            HeaderValue::unstructured(raw, fallback)
        }
    }

    /// The unfolded value exactly as it appeared.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The decoded value: the part before the first `;` for a parameterized header, the whole
    /// text otherwise.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Looks up a parameter by case-insensitive name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All parameters, in order, with lowercased names.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Splits `s` on `sep`, ignoring separators inside double quotes.
fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' && in_quotes {
            escaped = true;
        } else if c == '"' {
            in_quotes = !in_quotes;
        } else if c == sep && !in_quotes {
            out.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    out.push(&s[start..]);
    out
}

fn unquote(s: &str) -> String {
    match s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => s.to_string(),
    }
}

/// Recognizes RFC 2231 names: `name*`, `name*0`, `name*1*`.
fn parse_extended_name(name: &str) -> Option<(String, u32, bool)> {
    let (base, rest) = name.split_once('*')?;
    let (index, encoded) = match rest {
        "" => (0, true),
        _ => match rest.strip_suffix('*') {
            Some(digits) => (digits.parse().ok()?, true),
            None => (rest.parse().ok()?, false),
        },
    };
    Some((base.to_string(), index, encoded))
}

fn percent_decode(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if let [b'%', hi, lo, ..] = &bytes[i..] {
            let digits = [*hi, *lo];
            if let Some(b) = std::str::from_utf8(&digits)
                .ok()
                .and_then(|d| u8::from_str_radix(d, 16).ok())
            {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// Joins continuation segments and decodes `charset'lang'%XX` values.
fn join_extended(
    mut segments: Vec<(String, u32, bool, String)>,
    fallback: &'static Encoding,
) -> Vec<(String, String)> {
    segments.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    let mut out: Vec<(String, String)> = Vec::new();
    let mut charset: Option<&'static Encoding> = None;
    let mut bytes = Vec::new();
    let mut current: Option<String> = None;

    let mut flush = |name: Option<String>, bytes: &mut Vec<u8>, charset: Option<&'static Encoding>| {
        if let Some(name) = name {
            let encoding = charset.unwrap_or(fallback);
            out.push((name, encoding.decode(bytes).0.into_owned()));
            bytes.clear();
        }
    };

    for (name, index, encoded, val) in segments {
        if current.as_deref() != Some(name.as_str()) {
            flush(current.take(), &mut bytes, charset.take());
            current = Some(name);
        }
        let mut val = val.as_str();
        if encoded && index == 0 {
            let mut parts = val.splitn(3, '\'');
            if let (Some(cs), Some(_lang), Some(rest)) = (parts.next(), parts.next(), parts.next()) {
                charset = lookup_charset(cs);
                val = rest;
            }
        }
        if encoded {
            bytes.extend(percent_decode(val));
        } else {
            bytes.extend_from_slice(val.as_bytes());
        }
    }
    flush(current.take(), &mut bytes, charset.take());
    out
}

/// A closed set of values a header may take, matched case-insensitively.
pub trait HeaderEnum: Default + Clone + 'static {
    /// Every accepted spelling and the value it maps to.
    const VOCABULARY: &'static [(&'static str, Self)];
}

/// A case-insensitive, ordered collection of headers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HeaderMap {
    entries: Vec<(String, HeaderValue)>,
    fallback: &'static Encoding,
}

impl Default for HeaderMap {
    fn default() -> Self {
        HeaderMap::new(super::DEFAULT_CHARSET)
    }
}

impl HeaderMap {
    /// An empty map whose values will be decoded with `fallback` for unknown charsets.
    pub fn new(fallback: &'static Encoding) -> Self {
        HeaderMap {
            entries: Vec::new(),
            fallback,
        }
    }

    /// Parses a raw header block, stopping at the first empty line.
    ///
    /// Lines that start with a space or tab continue the previous header; the pieces are joined
    /// with a single space.
    pub fn parse(raw: &[u8], fallback: &'static Encoding) -> HeaderMap {
        let text = match std::str::from_utf8(raw) {
            Ok(text) => text.to_string(),
            Err(_) => decode_charset(raw, None, fallback),
        };

        let mut logical: Vec<String> = Vec::new();
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                break;
            }
            if line.starts_with([' ', '\t']) {
                if let Some(prev) = logical.last_mut() {
                    let piece = line.trim_start();
                    if !piece.is_empty() {
                        let trimmed = prev.trim_end().len();
                        prev.truncate(trimmed);
                        prev.push(' ');
                        prev.push_str(piece);
                    }
                    continue;
                }
            }
            logical.push(line.to_string());
        }

        let mut map = HeaderMap::new(fallback);
        for line in logical {
            match line.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => {
                    map.insert_or_append(name.trim(), value.trim());
                }
                _ => log::trace!("skipping header line without a name: {:?}", line),
            }
        }
        map
    }

    fn insert_or_append(&mut self, name: &str, raw: &str) {
        if is_additive(name) {
            self.append(name, raw);
        } else {
            self.insert(name, raw);
        }
    }

    /// Sets `name`, replacing every existing value of it.
    pub fn insert(&mut self, name: &str, raw: &str) {
        let value = HeaderValue::for_header(name, raw, self.fallback);
        match self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(at) => {
                self.entries[at] = (name.to_string(), value);
                let mut i = at + 1;
                while i < self.entries.len() {
                    if self.entries[i].0.eq_ignore_ascii_case(name) {
                        self.entries.remove(i);
                    } else {
                        i += 1;
                    }
                }
            }
            None => self.entries.push((name.to_string(), value)),
        }
    }

    /// Adds another value for `name`, keeping the existing ones.
    pub fn append(&mut self, name: &str, raw: &str) {
        let value = HeaderValue::for_header(name, raw, self.fallback);
        self.entries.push((name.to_string(), value));
    }

    /// Removes every value of `name`.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// The first value of `name`.
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// The decoded primary value of `name`.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).map(HeaderValue::value)
    }

    /// Every value of `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a HeaderValue> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The charset used when a value declares none or an unknown one.
    pub fn fallback_charset(&self) -> &'static Encoding {
        self.fallback
    }

    /// The message date: the `Date` header if it parses, otherwise the last date found in the
    /// `Received` headers. `None` means the date is unknown.
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.get("Date")
            .and_then(|d| date::parse_date(d.raw()))
            .or_else(|| date::from_received(self.get_all("Received").map(HeaderValue::raw)))
    }

    /// The addresses listed in `name`, skipping malformed entries.
    pub fn addresses(&self, name: &str) -> Vec<MailAddress> {
        self.get_all(name)
            .flat_map(|v| address::parse_list(v.raw(), self.fallback))
            .collect()
    }

    /// Matches the value of `name` against `E::VOCABULARY`, defaulting on no match.
    pub fn get_enum<E: HeaderEnum>(&self, name: &str) -> E {
        self.get_str(name)
            .map(str::trim)
            .and_then(|raw| {
                E::VOCABULARY
                    .iter()
                    .find(|(word, _)| word.eq_ignore_ascii_case(raw))
                    .map(|(_, value)| value.clone())
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::UTF_8;

    #[test]
    fn folding_joins_with_one_space() {
        let map = HeaderMap::parse(b"Subject: Hello\r\n World\r\n\r\nbody", UTF_8);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("subject").unwrap().raw(), "Hello World");
        assert_eq!(map.get_str("SUBJECT"), Some("Hello World"));
    }

    #[test]
    fn folding_with_tabs_and_bare_lf() {
        let map = HeaderMap::parse(b"To: a@b.c,\n\t d@e.f\nX-A: 1\n", UTF_8);
        assert_eq!(map.get_str("to"), Some("a@b.c, d@e.f"));
        assert_eq!(map.get_str("x-a"), Some("1"));
    }

    #[test]
    fn last_write_wins_except_additive() {
        let map = HeaderMap::parse(
            b"Subject: one\r\nReceived: r1\r\nSubject: two\r\nReceived: r2\r\nResent-To: x@y.z\r\nResent-To: w@y.z\r\n",
            UTF_8,
        );
        assert_eq!(map.get_str("subject"), Some("two"));
        assert_eq!(map.get_all("received").count(), 2);
        assert_eq!(map.addresses("Resent-To").len(), 2);
    }

    #[test]
    fn insert_and_append() {
        let mut map = HeaderMap::new(UTF_8);
        map.append("Keywords", "a");
        map.append("Keywords", "b");
        map.insert("keywords", "c");
        assert_eq!(map.get_all("Keywords").map(HeaderValue::raw).collect::<Vec<_>>(), ["c"]);
        map.remove("KEYWORDS");
        assert!(map.is_empty());
    }

    #[test]
    fn encoded_words_in_values() {
        let map = HeaderMap::parse(b"Subject: =?UTF-8?B?SGVsbG8=?=\r\n", UTF_8);
        assert_eq!(map.get_str("Subject"), Some("Hello"));
        assert_eq!(map.get("Subject").unwrap().raw(), "=?UTF-8?B?SGVsbG8=?=");
    }

    #[test]
    fn unstructured_values_keep_semicolons() {
        let map = HeaderMap::parse(
            b"Subject: Re: lunch; agenda=attached\r\nContent-Type: text/plain; charset=utf-8\r\n",
            UTF_8,
        );
        assert_eq!(map.get_str("Subject"), Some("Re: lunch; agenda=attached"));
        assert_eq!(map.get("Subject").unwrap().param("agenda"), None);
        assert_eq!(map.get_str("Content-Type"), Some("text/plain"));
        assert_eq!(map.get("content-type").unwrap().param("charset"), Some("utf-8"));
    }

    #[test]
    fn parameters() {
        let v = HeaderValue::parse(
            r#"multipart/mixed; boundary="a;b=c"; CHARSET=utf-8"#,
            UTF_8,
        );
        assert_eq!(v.value(), "multipart/mixed");
        assert_eq!(v.param("boundary"), Some("a;b=c"));
        assert_eq!(v.param("charset"), Some("utf-8"));
        assert_eq!(v.param("name"), None);
    }

    #[test]
    fn rfc2231_parameters() {
        let v = HeaderValue::parse(
            "attachment; filename*=utf-8''%E2%82%AC%20rates.txt",
            UTF_8,
        );
        assert_eq!(v.param("filename"), Some("€ rates.txt"));

        let v = HeaderValue::parse(
            "attachment; filename*0*=us-ascii'en'long%20; filename*1=name.pdf",
            UTF_8,
        );
        assert_eq!(v.param("filename"), Some("long name.pdf"));
    }

    #[test]
    fn dates() {
        let map = HeaderMap::parse(b"Date: Tue, 1 Jul 2003 10:52:37 +0200\r\n", UTF_8);
        assert!(map.date().is_some());

        let map = HeaderMap::parse(
            b"Date: garbage\r\nReceived: from a by b; 1 Jul 2003 10:52:37 +0200\r\n",
            UTF_8,
        );
        assert!(map.date().is_some());
        assert!(HeaderMap::parse(b"Date: garbage\r\n", UTF_8).date().is_none());
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    enum Sensitivity {
        #[default]
        Normal,
        Personal,
        Private,
    }

    impl HeaderEnum for Sensitivity {
        const VOCABULARY: &'static [(&'static str, Self)] = &[
            ("normal", Sensitivity::Normal),
            ("personal", Sensitivity::Personal),
            ("private", Sensitivity::Private),
        ];
    }

    #[test]
    fn enums() {
        let map = HeaderMap::parse(b"Sensitivity: PRIVATE\r\nX-Other: ?\r\n", UTF_8);
        assert_eq!(map.get_enum::<Sensitivity>("sensitivity"), Sensitivity::Private);
        assert_eq!(map.get_enum::<Sensitivity>("x-other"), Sensitivity::Normal);
        assert_eq!(map.get_enum::<Sensitivity>("missing"), Sensitivity::Normal);
    }
}
