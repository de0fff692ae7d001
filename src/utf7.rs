//! Modified UTF-7 mailbox names ([RFC 3501 section 5.1.3]).
//!
//! Printable US-ASCII other than `&` stands for itself, `&` is written `&-`, and every other run
//! of characters is written as `&`, the modified BASE64 of its UTF-16BE code units, and `-`.
//!
//! [RFC 3501 section 5.1.3]: https://tools.ietf.org/html/rfc3501#section-5.1.3

use base64::alphabet::IMAP_MUTF7;
use base64::engine::general_purpose::NO_PAD;
use base64::engine::GeneralPurpose;
use base64::Engine;

use crate::error::{ParseError, Result};

const ENGINE: GeneralPurpose = GeneralPurpose::new(&IMAP_MUTF7, NO_PAD);

fn is_direct(c: char) -> bool {
    (' '..='~').contains(&c)
}

fn flush_shifted(out: &mut String, run: &mut Vec<u16>) {
    if run.is_empty() {
        return;
    }
    let bytes: Vec<u8> = run.iter().flat_map(|u| u.to_be_bytes()).collect();
    out.push('&');
    out.push_str(&ENGINE.encode(bytes));
    out.push('-');
    run.clear();
}

/// Encodes a mailbox name for the wire.
pub fn encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut run = Vec::new();
    for c in name.chars() {
        if is_direct(c) {
            flush_shifted(&mut out, &mut run);
            if c == '&' {
                out.push_str("&-");
            } else {
                out.push(c);
            }
        } else {
            let mut units = [0u16; 2];
            run.extend_from_slice(c.encode_utf16(&mut units));
        }
    }
    flush_shifted(&mut out, &mut run);
    out
}

/// Decodes a mailbox name received from the server.
///
/// Besides the standard alphabet, a shifted run may use `&` in place of `+`, which some older
/// encoders emit.
pub fn decode(name: &str) -> Result<String> {
    let invalid = || ParseError::MailboxName(name.to_string());
    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let shifted = &rest[amp + 1..];
        let end = shifted.find('-').ok_or_else(invalid)?;
        if end == 0 {
            out.push('&');
        } else {
            let b64 = shifted[..end].replace('&', "+");
            let bytes = ENGINE.decode(b64.as_bytes()).map_err(|_| invalid())?;
            if bytes.len() % 2 != 0 {
                return Err(invalid().into());
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            out.push_str(&String::from_utf16(&units).map_err(|_| invalid())?);
        }
        rest = &shifted[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_unchanged() {
        assert_eq!(encode("Inbox"), "Inbox");
        assert_eq!(encode("Sent Items/2024"), "Sent Items/2024");
        assert_eq!(decode("Inbox").unwrap(), "Inbox");
    }

    #[test]
    fn ampersand_is_escaped() {
        assert_eq!(encode("Tom & Jerry"), "Tom &- Jerry");
        assert_eq!(decode("Tom &- Jerry").unwrap(), "Tom & Jerry");
    }

    #[test]
    fn umlaut_round_trip() {
        let encoded = encode("Entwürfe");
        assert_eq!(encoded, "Entw&APw-rfe");
        assert_eq!(decode(&encoded).unwrap(), "Entwürfe");
    }

    #[test]
    fn rfc_examples() {
        assert_eq!(
            decode("~peter/mail/&U,BTFw-/&ZeVnLIqe-").unwrap(),
            "~peter/mail/台北/日本語"
        );
        assert_eq!(encode("~peter/mail/台北/日本語"), "~peter/mail/&U,BTFw-/&ZeVnLIqe-");
        assert_eq!(decode("&Jjo-!").unwrap(), "☺!");
    }

    #[test]
    fn astral_characters_use_surrogates() {
        let name = "Mail 📬";
        assert_eq!(decode(&encode(name)).unwrap(), name);
    }

    #[test]
    fn ampersand_for_plus_variant() {
        // U+FBFF encodes to "+/8" in standard base64; "&," in the variant alphabet
        assert_eq!(encode("\u{fbff}"), "&+,8-");
        assert_eq!(decode("&&,8-").unwrap(), "\u{fbff}");
    }

    #[test]
    fn unterminated_shift_is_rejected() {
        assert!(decode("&Jjo!").is_err());
    }
}
