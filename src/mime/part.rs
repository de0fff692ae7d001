use std::borrow::Cow;

use encoding_rs::Encoding;

use super::encoding::{decode_base64, decode_charset, decode_quoted_printable, TransferEncoding};
use super::header::HeaderMap;
use super::message::HeaderBearing;

/// Multipart nesting deeper than this is kept as raw bytes.
const MAX_DEPTH: usize = 32;

/// The body of a [`MimePart`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Body {
    /// Only the headers were parsed.
    Empty,
    /// Textual content, transfer-decoded and converted from its charset.
    Text(String),
    /// Non-textual content, still in its transfer encoding. See [`MimePart::content`].
    Binary(Vec<u8>),
    /// The children of a `multipart/*` part.
    Multipart(Vec<MimePart>),
}

/// A node of a message's MIME tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MimePart {
    headers: HeaderMap,
    body: Body,
    encoding: TransferEncoding,
}

/// Splits a raw entity at the first empty line.
fn split_head(raw: &[u8]) -> (&[u8], &[u8]) {
    if raw.starts_with(b"\r\n") {
        return (&raw[..0], &raw[2..]);
    }
    if raw.starts_with(b"\n") {
        return (&raw[..0], &raw[1..]);
    }
    let crlf = find(raw, b"\r\n\r\n").map(|at| (at + 2, at + 4));
    let lf = find(raw, b"\n\n").map(|at| (at + 1, at + 2));
    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };
    match split {
        Some((head_end, body_start)) => (&raw[..head_end], &raw[body_start..]),
        None => (raw, &raw[raw.len()..]),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\r' | b'\n' | b' ' | b'\t') {
        end -= 1;
    }
    &line[..end]
}

/// Cuts a multipart body into the raw bytes of each part.
///
/// The preamble before the first delimiter is skipped, as is the epilogue after `--boundary--`.
/// A body that ends without the closing delimiter ends its last part at the end of input.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{}", boundary);
    let closing = format!("--{}--", boundary);
    let mut parts = Vec::new();
    let mut part_start: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|at| pos + at + 1)
            .unwrap_or(body.len());
        let line = trim_line_end(&body[pos..line_end]);
        let is_closing = line == closing.as_bytes();
        if is_closing || line == delimiter.as_bytes() {
            if let Some(start) = part_start.take() {
                // the line break before a delimiter belongs to the delimiter
                let mut end = pos.max(start);
                if end > start && body[end - 1] == b'\n' {
                    end -= 1;
                    if end > start && body[end - 1] == b'\r' {
                        end -= 1;
                    }
                }
                parts.push(&body[start..end]);
            }
            if is_closing {
                return parts;
            }
            part_start = Some(line_end);
        }
        pos = line_end;
    }

    if let Some(start) = part_start {
        log::trace!("multipart body for boundary {:?} is not terminated", boundary);
        parts.push(&body[start.min(body.len())..]);
    }
    parts
}

impl MimePart {
    /// Parses a raw entity (headers, an empty line, and a body).
    ///
    /// With `headers_only`, the body is not decoded and [`Body::Empty`] is stored.
    pub fn parse(raw: &[u8], headers_only: bool) -> MimePart {
        MimePart::parse_with(raw, headers_only, super::DEFAULT_CHARSET)
    }

    /// Like [`MimePart::parse`], with the charset used when a part declares none or an unknown
    /// one.
    pub fn parse_with(raw: &[u8], headers_only: bool, fallback: &'static Encoding) -> MimePart {
        MimePart::parse_at(raw, headers_only, fallback, 0)
    }

    fn parse_at(raw: &[u8], headers_only: bool, fallback: &'static Encoding, depth: usize) -> MimePart {
        let (head, body) = split_head(raw);
        let headers = HeaderMap::parse(head, fallback);
        let mut part = MimePart {
            headers,
            body: Body::Empty,
            encoding: TransferEncoding::Identity,
        };
        if headers_only {
            return part;
        }

        let boundary = part
            .headers
            .get("Content-Type")
            .filter(|ct| ct.value().to_ascii_lowercase().starts_with("multipart/"))
            .and_then(|ct| ct.param("boundary"))
            .map(str::to_string);
        match boundary {
            Some(boundary) if depth < MAX_DEPTH => {
                let children = split_multipart(body, &boundary)
                    .into_iter()
                    .map(|raw| MimePart::parse_at(raw, false, fallback, depth + 1))
                    .collect();
                part.body = Body::Multipart(children);
            }
            _ => part.decode_leaf(body, fallback),
        }
        part
    }

    fn decode_leaf(&mut self, body: &[u8], fallback: &'static Encoding) {
        let encoding = HeaderBearing::transfer_encoding(self);
        let textual = self.is_textual();
        let charset = self.charset().map(str::to_string);
        let charset = charset.as_deref();

        match encoding {
            TransferEncoding::QuotedPrintable => {
                let bytes = decode_quoted_printable(body);
                self.body = if textual {
                    Body::Text(decode_charset(&bytes, charset, fallback))
                } else {
                    Body::Binary(bytes)
                };
            }
            TransferEncoding::Base64 if textual => match decode_base64(body) {
                Ok(bytes) => self.body = Body::Text(decode_charset(&bytes, charset, fallback)),
                Err(e) => {
                    log::debug!("undecodable base64 text part: {}", e);
                    self.body = Body::Binary(body.to_vec());
                    self.encoding = TransferEncoding::Base64;
                }
            },
            TransferEncoding::Identity if textual => {
                self.body = Body::Text(decode_charset(body, charset, fallback));
            }
            other => {
                self.body = Body::Binary(body.to_vec());
                self.encoding = other;
            }
        }
    }

    /// Whether the content type is `text/*` (a missing type counts as `text/plain`).
    pub fn is_textual(&self) -> bool {
        self.content_type().starts_with("text/")
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// The decoded text, for textual leaves.
    pub fn text(&self) -> Option<&str> {
        match self.body {
            Body::Text(ref text) => Some(text),
            _ => None,
        }
    }

    /// The child parts of a multipart; empty for leaves.
    pub fn parts(&self) -> &[MimePart] {
        match self.body {
            Body::Multipart(ref parts) => parts,
            _ => &[],
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.body, Body::Multipart(_))
    }

    /// The encoding [`Body::Binary`] content is still in. Textual content is always decoded, so
    /// this is [`TransferEncoding::Identity`] for it.
    pub fn pending_encoding(&self) -> &TransferEncoding {
        &self.encoding
    }

    /// The decoded bytes of this part.
    ///
    /// Base64 content is decoded on demand; if that fails the raw bytes are returned instead.
    pub fn content(&self) -> Cow<'_, [u8]> {
        match self.body {
            Body::Text(ref text) => Cow::Borrowed(text.as_bytes()),
            Body::Binary(ref raw) if self.encoding == TransferEncoding::Base64 => {
                match decode_base64(raw) {
                    Ok(bytes) => Cow::Owned(bytes),
                    Err(e) => {
                        log::debug!("returning raw bytes of undecodable part: {}", e);
                        Cow::Borrowed(raw)
                    }
                }
            }
            Body::Binary(ref raw) => Cow::Borrowed(raw),
            Body::Empty | Body::Multipart(_) => Cow::Borrowed(&[]),
        }
    }

    /// Every leaf below this part, depth-first, including this part if it is a leaf.
    pub fn leaves(&self) -> Vec<&MimePart> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a MimePart>) {
        match self.body {
            Body::Multipart(ref parts) => parts.iter().for_each(|p| p.collect_leaves(out)),
            _ => out.push(self),
        }
    }
}

impl HeaderBearing for MimePart {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &[u8] = b"Content-Type: multipart/alternative; boundary=XYZ\r\n\
        \r\n\
        preamble\r\n\
        --XYZ\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        \r\n\
        plain body\r\n\
        --XYZ\r\n\
        Content-Type: text/html\r\n\
        Content-Transfer-Encoding: quoted-printable\r\n\
        \r\n\
        <p>html=20body</p>\r\n\
        --XYZ--\r\n\
        epilogue\r\n";

    #[test]
    fn multipart_children() {
        let part = MimePart::parse(MULTIPART, false);
        assert!(part.is_multipart());
        let children = part.parts();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].text(), Some("plain body"));
        assert_eq!(children[1].text(), Some("<p>html body</p>"));
        assert_eq!(children[1].content_type(), "text/html");
    }

    #[test]
    fn headers_only() {
        let part = MimePart::parse(MULTIPART, true);
        assert_eq!(part.body(), &Body::Empty);
        assert!(part.headers().contains("content-type"));
    }

    #[test]
    fn unterminated_multipart() {
        let raw = b"Content-Type: multipart/mixed; boundary=\"b 1\"\r\n\r\n--b 1\r\n\r\nfirst\r\n--b 1\r\n\r\nsecond\r\n";
        let part = MimePart::parse(raw, false);
        let texts: Vec<_> = part.parts().iter().filter_map(MimePart::text).collect();
        assert_eq!(texts, ["first", "second\r\n"]);
    }

    #[test]
    fn nested_multipart() {
        let raw = b"Content-Type: multipart/mixed; boundary=outer\r\n\r\n\
            --outer\r\n\
            Content-Type: multipart/alternative; boundary=inner\r\n\r\n\
            --inner\r\n\r\na\r\n--inner\r\n\r\nb\r\n--inner--\r\n\
            --outer\r\n\
            Content-Type: application/octet-stream\r\n\
            Content-Transfer-Encoding: base64\r\n\r\n\
            AAEC\r\n\
            --outer--\r\n";
        let part = MimePart::parse(raw, false);
        let leaves = part.leaves();
        assert_eq!(leaves.len(), 3);
        assert_eq!(leaves[1].text(), Some("b"));
        assert_eq!(leaves[2].pending_encoding(), &TransferEncoding::Base64);
        assert_eq!(&leaves[2].content()[..], &[0, 1, 2]);
    }

    #[test]
    fn base64_text_is_decoded_with_charset() {
        let raw = b"Content-Type: text/plain; charset=iso-8859-1\r\n\
            Content-Transfer-Encoding: base64\r\n\r\nY2Fm6Q==\r\n";
        let part = MimePart::parse(raw, false);
        assert_eq!(part.text(), Some("caf\u{e9}"));
        assert_eq!(part.pending_encoding(), &TransferEncoding::Identity);
    }

    #[test]
    fn undecodable_base64_falls_back_to_raw() {
        let raw = b"Content-Type: image/png\r\nContent-Transfer-Encoding: base64\r\n\r\n@@@@";
        let part = MimePart::parse(raw, false);
        assert_eq!(&part.content()[..], b"@@@@");
    }

    #[test]
    fn missing_header_block() {
        let part = MimePart::parse(b"\r\njust text", false);
        assert!(part.headers().is_empty());
        assert_eq!(part.text(), Some("just text"));
    }
}
