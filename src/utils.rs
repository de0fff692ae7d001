use crate::error::{Error, Result, ValidateError};

/// Wraps `$x` in double quotes, escaping backslashes and quotes.
macro_rules! quote {
    ($x:expr) => {
        format!("\"{}\"", $x.replace('\\', r"\\").replace('"', "\\\""))
    };
}
pub(crate) use quote;

/// Quotes `value` for use as an IMAP string, rejecting line breaks.
pub(crate) fn validate_str(value: &str) -> Result<String> {
    if let Some(c) = value.chars().find(|&c| c == '\n' || c == '\r') {
        return Err(Error::Validate(ValidateError(c)));
    }
    Ok(quote!(value))
}

/// Rejects line breaks in a value sent unquoted, such as a POP3 argument.
pub(crate) fn validate_line(value: &str) -> Result<&str> {
    match value.chars().find(|&c| c == '\n' || c == '\r') {
        Some(c) => Err(Error::Validate(ValidateError(c))),
        None => Ok(value),
    }
}

/// Lovingly borrowed from the cargo crate
///
/// Joins an iterator of [std::fmt::Display]'ables into an output writable
pub(crate) fn iter_join_onto<W, I, T>(mut w: W, iter: I, delim: &str) -> std::fmt::Result
where
    W: std::fmt::Write,
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    let mut it = iter.into_iter().peekable();
    while let Some(n) = it.next() {
        write!(w, "{}", n)?;
        if it.peek().is_some() {
            write!(w, "{}", delim)?;
        }
    }
    Ok(())
}

/// Joins an iterator of [std::fmt::Display]'ables to a new [std::string::String].
pub(crate) fn iter_join<I, T>(iter: I, delim: &str) -> String
where
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    let mut s = String::new();
    let _ = iter_join_onto(&mut s, iter, delim);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_escapes() {
        assert_eq!(quote!(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn line_breaks_are_rejected() {
        assert!(matches!(
            validate_str("user\r\nA1 DELETE INBOX"),
            Err(Error::Validate(ValidateError('\r')))
        ));
        assert!(matches!(
            validate_line("pass\n"),
            Err(Error::Validate(ValidateError('\n')))
        ));
        assert_eq!(validate_str("INBOX").unwrap(), "\"INBOX\"");
    }

    #[test]
    fn join() {
        assert_eq!(iter_join(["\\Seen", "\\Deleted"], " "), "\\Seen \\Deleted");
        assert_eq!(iter_join(Vec::<u32>::new(), ","), "");
    }
}
