//! Transfer encodings and charset conversion.

use std::fmt;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use encoding_rs::Encoding;

use crate::error::{ParseError, Result};

/// Accepts missing padding and stray trailing bits, which real mail is full of.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// The value of a `Content-Transfer-Encoding` header.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum TransferEncoding {
    /// `7bit`, `8bit`, `binary`, or content that has already been decoded.
    #[default]
    Identity,
    QuotedPrintable,
    Base64,
    /// An encoding this crate does not know; the content is left alone.
    Other(String),
}

impl From<&str> for TransferEncoding {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "7bit" | "8bit" | "binary" => TransferEncoding::Identity,
            "quoted-printable" => TransferEncoding::QuotedPrintable,
            "base64" => TransferEncoding::Base64,
            other => TransferEncoding::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TransferEncoding::Identity => f.write_str("8bit"),
            TransferEncoding::QuotedPrintable => f.write_str("quoted-printable"),
            TransferEncoding::Base64 => f.write_str("base64"),
            TransferEncoding::Other(ref s) => f.write_str(s),
        }
    }
}

fn hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decodes quoted-printable content.
///
/// Soft line breaks (`=` right before a line break) are removed and `=XX` escapes become the byte
/// they name. An `=` that starts neither is kept as-is.
pub fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] != b'=' {
            out.push(input[i]);
            i += 1;
            continue;
        }
        match &input[i + 1..] {
            [b'\r', b'\n', ..] => i += 3,
            [b'\n', ..] => i += 2,
            [hi, lo, ..] => match (hex(*hi), hex(*lo)) {
                (Some(hi), Some(lo)) => {
                    out.push(hi << 4 | lo);
                    i += 3;
                }
                _ => {
                    out.push(b'=');
                    i += 1;
                }
            },
            _ => {
                out.push(b'=');
                i += 1;
            }
        }
    }
    out
}

/// Decodes base64 content, ignoring line breaks and other whitespace.
pub fn decode_base64(input: &[u8]) -> Result<Vec<u8>> {
    let compact: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LENIENT
        .decode(compact)
        .map_err(|e| ParseError::Base64(e).into())
}

/// Looks up a charset label such as `utf-8` or `ISO-8859-1`.
pub fn lookup_charset(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().trim_matches('"').as_bytes())
}

/// Converts `bytes` to text using `charset`, or `fallback` if the charset is missing or unknown.
/// Malformed sequences become U+FFFD.
pub fn decode_charset(bytes: &[u8], charset: Option<&str>, fallback: &'static Encoding) -> String {
    let encoding = charset.and_then(lookup_charset).unwrap_or(fallback);
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        log::trace!("malformed {} content", encoding.name());
    }
    text.into_owned()
}
