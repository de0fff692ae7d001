//! Byte-counted literals (`{N}\r\n` followed by exactly `N` octets).
//!
//! The background reader uses [`pending_literal`] while framing the raw byte stream, so that
//! literal payloads are consumed by count before any line splitting happens; a payload that
//! contains CR or LF therefore survives intact. `imap-proto` lifts the payload back out when the
//! assembled response is parsed.

use nom::{
    bytes::complete::tag,
    character::complete::{char, digit1},
    combinator::{all_consuming, map_res, opt},
    sequence::{delimited, terminated, tuple},
    IResult,
};

fn literal_len(input: &[u8]) -> IResult<&[u8], usize> {
    map_res(digit1, |d: &[u8]| {
        std::str::from_utf8(d)
            .map_err(|_| ())
            .and_then(|s| s.parse::<usize>().map_err(|_| ()))
    })(input)
}

/// `{N}` or `{N+}`, then the line ending.
fn marker(input: &[u8]) -> IResult<&[u8], usize> {
    terminated(
        delimited(char('{'), terminated(literal_len, opt(char('+'))), char('}')),
        tuple((opt(char('\r')), tag("\n"))),
    )(input)
}

/// If `line` (one physical line, including its line ending) ends with a literal marker, returns
/// the announced number of octets.
///
/// Both synchronizing (`{N}`) and non-synchronizing (`{N+}`) markers are accepted, as is a bare
/// LF line ending.
pub fn pending_literal(line: &[u8]) -> Option<usize> {
    let open = line.iter().rposition(|&b| b == b'{')?;
    all_consuming(marker)(&line[open..])
        .ok()
        .map(|(_, len)| len)
}
