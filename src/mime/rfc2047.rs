//! RFC 2047 encoded words: `=?charset?B?...?=` and `=?charset?Q?...?=`.

use encoding_rs::Encoding;
use lazy_static::lazy_static;
use regex::Regex;

use super::encoding::{decode_base64, decode_quoted_printable, lookup_charset};

lazy_static! {
    static ref ENCODED_WORD: Regex =
        Regex::new(r"=\?([^?\s]+)\?([BbQq])\?([^?\s]*)\?=").unwrap();
}

fn decode_word(charset: &str, kind: &str, text: &str, fallback: &'static Encoding) -> Option<String> {
    let bytes = if kind.eq_ignore_ascii_case("b") {
        decode_base64(text.as_bytes()).ok()?
    } else {
        decode_quoted_printable(text.replace('_', " ").as_bytes())
    };
    // RFC 2231 allows a language suffix: =?utf-8*en?Q?...?=
    let label = charset.split('*').next().unwrap_or(charset);
    let encoding = lookup_charset(label).unwrap_or(fallback);
    Some(encoding.decode(&bytes).0.into_owned())
}

/// Decodes every encoded word in `input`.
///
/// Whitespace between two adjacent encoded words is dropped. Words that fail to decode are left
/// as they are, and an unknown charset falls back to `fallback`.
pub fn decode(input: &str, fallback: &'static Encoding) -> String {
    if !input.contains("=?") {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    let mut after_word = false;
    for caps in ENCODED_WORD.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        let gap = &input[last..whole.start()];
        if !(after_word && gap.chars().all(char::is_whitespace)) {
            out.push_str(gap);
        }
        match decode_word(&caps[1], &caps[2], &caps[3], fallback) {
            Some(text) => {
                out.push_str(&text);
                after_word = true;
            }
            None => {
                out.push_str(whole.as_str());
                after_word = false;
            }
        }
        last = whole.end();
    }
    out.push_str(&input[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{UTF_8, WINDOWS_1252};

    #[test]
    fn base64_word() {
        assert_eq!(decode("=?UTF-8?B?SGVsbG8=?=", UTF_8), "Hello");
    }

    #[test]
    fn q_word_with_underscores() {
        assert_eq!(
            decode("=?iso-8859-1?Q?Andr=E9_Pirard?= <pirard@example.org>", UTF_8),
            "André Pirard <pirard@example.org>"
        );
    }

    #[test]
    fn adjacent_words_are_joined() {
        assert_eq!(decode("=?UTF-8?Q?a?= =?UTF-8?Q?b?=", UTF_8), "ab");
        assert_eq!(decode("=?UTF-8?Q?a?=  x =?UTF-8?Q?b?=", UTF_8), "a  x b");
        assert_eq!(decode("Re: =?UTF-8?Q?a?=", UTF_8), "Re: a");
    }

    #[test]
    fn unknown_charset_uses_fallback() {
        assert_eq!(decode("=?x-klingon?Q?caf=E9?=", WINDOWS_1252), "café");
    }

    #[test]
    fn language_suffix() {
        assert_eq!(decode("=?US-ASCII*EN?Q?Keith_Moore?=", UTF_8), "Keith Moore");
    }

    #[test]
    fn undecodable_word_is_kept() {
        assert_eq!(decode("x =?UTF-8?B?!!!?= y", UTF_8), "x =?UTF-8?B?!!!?= y");
    }
}
