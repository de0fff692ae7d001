use std::io;

use crate::client_builder::ClientOptions;
use crate::conn::Transport;
use crate::error::{Error, Result, StateError};
use crate::mime::Message;
use crate::reader::{Framing, LineReader, Next};
use crate::types::Seq;
use crate::utils::validate_line;

/// The answer to `STAT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stat {
    /// Messages in the maildrop, not counting ones marked deleted.
    pub count: u32,
    /// Their total size in octets.
    pub size: u64,
}

/// One line of a `LIST` answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Listing {
    pub seq: Seq,
    pub size: u64,
}

/// One line of a `UIDL` answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniqueId {
    pub seq: Seq,
    pub uid: String,
}

/// A POP3 session over a transport `T`.
///
/// Like the IMAP client, responses are read by a background thread; every command blocks until
/// its status line (and, for multi-line answers, the terminating `.`) has arrived.
#[derive(Debug)]
pub struct Pop3Client<T: Transport> {
    reader: LineReader<T>,
    options: ClientOptions,
    authenticated: bool,
    closed: bool,
}

/// Splits a status line into its verdict and text.
fn parse_status(line: &[u8]) -> Result<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(text) = line.strip_prefix("+OK") {
        Ok(text.trim_start().to_string())
    } else if let Some(text) = line.strip_prefix("-ERR") {
        Err(Error::Pop(text.trim_start().to_string()))
    } else {
        Err(Error::Unexpected(format!("not a POP3 status line: {:?}", line)))
    }
}

/// Whether `line` is the `.` that ends a multi-line answer.
fn is_terminator(line: &[u8]) -> bool {
    matches!(line, b".\r\n" | b".\n" | b".")
}

/// Removes the extra leading dot the server adds to lines that start with one.
fn unstuff(mut line: Vec<u8>) -> Vec<u8> {
    if line.starts_with(b"..") {
        line.remove(0);
    }
    line
}

fn number<N: std::str::FromStr>(word: Option<&str>, line: &str) -> Result<N> {
    word.and_then(|w| w.parse().ok())
        .ok_or_else(|| Error::Unexpected(format!("malformed POP3 answer: {:?}", line)))
}

impl<T: Transport> Pop3Client<T> {
    /// Creates a new client with the underlying stream and default options.
    pub fn new(stream: T) -> Result<Pop3Client<T>> {
        Pop3Client::with_options(stream, ClientOptions::default())
    }

    pub fn with_options(stream: T, options: ClientOptions) -> Result<Pop3Client<T>> {
        Ok(Pop3Client {
            reader: LineReader::start(stream, Framing::Lines, options.poll_interval, options.debug)?,
            options,
            authenticated: false,
            closed: false,
        })
    }

    fn read_line(&mut self) -> Result<Vec<u8>> {
        loop {
            let next = self.reader.next(self.options.response_timeout);
            match self.track(next)? {
                Next::Line(line) => return Ok(line),
                Next::Interrupt => continue,
                Next::Timeout => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "no response from server",
                    )))
                }
            }
        }
    }

    fn track<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(ref e) = result {
            if e.is_transport() {
                self.closed = true;
            }
        }
        result
    }

    fn require(&self, authenticated: bool) -> Result<()> {
        if self.closed {
            Err(StateError::Disconnected.into())
        } else if authenticated && !self.authenticated {
            Err(StateError::NotAuthenticated.into())
        } else {
            Ok(())
        }
    }

    /// Sends a command and returns the text of its `+OK`.
    fn command(&mut self, command: &str) -> Result<String> {
        let written = self.reader.write_line(command.as_bytes());
        self.track(written)?;
        let line = self.read_line()?;
        parse_status(&line)
    }

    /// Sends a command whose `+OK` is followed by lines up to a lone `.`.
    fn multiline(&mut self, command: &str) -> Result<Vec<Vec<u8>>> {
        self.command(command)?;
        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            if is_terminator(&line) {
                return Ok(lines);
            }
            lines.push(unstuff(line));
        }
    }

    /// Reads the `+OK` greeting the server sends on connect.
    pub fn read_greeting(&mut self) -> Result<()> {
        let line = self.read_line()?;
        parse_status(&line).map(|_| ())
    }

    /// Upgrades the session; the caller performs the TLS handshake on [`Pop3Client::into_inner`].
    pub(crate) fn stls(&mut self) -> Result<()> {
        self.require(false)?;
        self.command("STLS").map(|_| ())
    }

    /// Logs in with `USER` and `PASS`.
    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.require(false)?;
        if self.authenticated {
            return Err(StateError::AlreadyAuthenticated.into());
        }
        self.command(&format!("USER {}", validate_line(username)?))?;
        self.command(&format!("PASS {}", validate_line(password)?))?;
        self.authenticated = true;
        Ok(())
    }

    pub fn stat(&mut self) -> Result<Stat> {
        self.require(true)?;
        let text = self.command("STAT")?;
        let mut words = text.split_whitespace();
        Ok(Stat {
            count: number(words.next(), &text)?,
            size: number(words.next(), &text)?,
        })
    }

    /// The number of messages in the maildrop.
    pub fn message_count(&mut self) -> Result<u32> {
        self.stat().map(|s| s.count)
    }

    /// The size of every message.
    pub fn list(&mut self) -> Result<Vec<Listing>> {
        self.require(true)?;
        self.multiline("LIST")?
            .iter()
            .map(|line| {
                let line = String::from_utf8_lossy(line);
                let mut words = line.split_whitespace();
                Ok(Listing {
                    seq: number(words.next(), &line)?,
                    size: number(words.next(), &line)?,
                })
            })
            .collect()
    }

    /// The unique id of every message.
    pub fn uidl(&mut self) -> Result<Vec<UniqueId>> {
        self.require(true)?;
        self.multiline("UIDL")?
            .iter()
            .map(|line| {
                let line = String::from_utf8_lossy(line);
                let mut words = line.split_whitespace();
                let seq = number(words.next(), &line)?;
                let uid = words
                    .next()
                    .ok_or_else(|| Error::Unexpected(format!("malformed POP3 answer: {:?}", line)))?;
                Ok(UniqueId {
                    seq,
                    uid: uid.to_string(),
                })
            })
            .collect()
    }

    fn fetch_raw(&mut self, command: &str) -> Result<Vec<u8>> {
        Ok(self.multiline(command)?.concat())
    }

    /// Downloads and decodes a message.
    pub fn retrieve(&mut self, seq: Seq) -> Result<Message> {
        self.require(true)?;
        let raw = self.fetch_raw(&format!("RETR {}", seq))?;
        let mut message = Message::parse(&raw, false);
        message.seq = Some(seq);
        message.size = u32::try_from(raw.len()).ok();
        Ok(message)
    }

    /// Downloads only the headers of a message.
    pub fn top(&mut self, seq: Seq) -> Result<Message> {
        self.require(true)?;
        let raw = self.fetch_raw(&format!("TOP {} 0", seq))?;
        let mut message = Message::parse(&raw, true);
        message.seq = Some(seq);
        Ok(message)
    }

    /// Marks a message deleted. It is removed when the session ends with [`Pop3Client::quit`].
    pub fn delete(&mut self, seq: Seq) -> Result<()> {
        self.require(true)?;
        self.command(&format!("DELE {}", seq)).map(|_| ())
    }

    /// Unmarks every message marked deleted.
    pub fn reset(&mut self) -> Result<()> {
        self.require(true)?;
        self.command("RSET").map(|_| ())
    }

    pub fn noop(&mut self) -> Result<()> {
        self.require(true)?;
        self.command("NOOP").map(|_| ())
    }

    /// Ends the session, committing deletions.
    pub fn quit(&mut self) -> Result<()> {
        self.require(false)?;
        let result = self.command("QUIT").map(|_| ());
        self.closed = true;
        result
    }

    /// The server's capabilities ([RFC 2449](https://tools.ietf.org/html/rfc2449)).
    pub fn capabilities(&mut self) -> Result<Vec<String>> {
        self.require(false)?;
        Ok(self
            .multiline("CAPA")?
            .iter()
            .map(|line| String::from_utf8_lossy(line).trim_end().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }

    /// Stops the reader thread and returns the stream.
    pub fn into_inner(self) -> Result<T> {
        self.reader.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime::HeaderBearing;
    use crate::mock_stream::MockStream;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn client(mock: MockStream) -> Pop3Client<MockStream> {
        Pop3Client::with_options(
            mock,
            ClientOptions {
                poll_interval: Duration::from_millis(5),
                response_timeout: Some(Duration::from_secs(2)),
                ..ClientOptions::default()
            },
        )
        .unwrap()
    }

    fn logged_in(mock: MockStream) -> Pop3Client<MockStream> {
        let mut c = client(mock);
        c.authenticated = true;
        c
    }

    fn written(w: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8(w.lock().unwrap().clone()).unwrap()
    }

    #[test]
    fn greeting_and_login() {
        let mock = MockStream::new(b"+OK POP3 server ready\r\n".to_vec())
            .then("USER alice\r\n", "+OK\r\n")
            .then("PASS secret\r\n", "+OK maildrop locked\r\n");
        let w = mock.written();
        let mut c = client(mock);
        c.read_greeting().unwrap();
        assert!(matches!(
            c.stat(),
            Err(Error::State(StateError::NotAuthenticated))
        ));
        c.login("alice", "secret").unwrap();
        assert_eq!(written(&w), "USER alice\r\nPASS secret\r\n");
    }

    #[test]
    fn err_becomes_pop_error() {
        let mock = MockStream::default()
            .then("USER bob", "+OK\r\n")
            .then("PASS", "-ERR invalid password\r\n");
        let mut c = client(mock);
        match c.login("bob", "wrong") {
            Err(Error::Pop(text)) => assert_eq!(text, "invalid password"),
            other => panic!("expected -ERR, got {:?}", other),
        }
        assert!(!c.authenticated);
    }

    #[test]
    fn stat_and_list() {
        let mock = MockStream::default()
            .then("STAT", "+OK 2 320\r\n")
            .then("LIST", "+OK 2 messages\r\n1 120\r\n2 200\r\n.\r\n")
            .then("UIDL", "+OK\r\n1 whqtswO00WBw418f9t5JxYwZ\r\n2 QhdPYR:00WBw1Ph7x7\r\n.\r\n");
        let mut c = logged_in(mock);
        assert_eq!(c.stat().unwrap(), Stat { count: 2, size: 320 });
        assert_eq!(
            c.list().unwrap(),
            vec![Listing { seq: 1, size: 120 }, Listing { seq: 2, size: 200 }]
        );
        let ids = c.uidl().unwrap();
        assert_eq!(ids[1].uid, "QhdPYR:00WBw1Ph7x7");
    }

    #[test]
    fn retrieve_unstuffs_dots() {
        let mock = MockStream::default().then(
            "RETR 1\r\n",
            "+OK 60 octets\r\n\
             Subject: dots\r\n\
             \r\n\
             ..leading dot\r\n\
             last\r\n\
             .\r\n",
        );
        let mut c = logged_in(mock);
        let msg = c.retrieve(1).unwrap();
        assert_eq!(msg.subject(), Some("dots"));
        assert_eq!(msg.body_text(), ".leading dot\r\nlast\r\n");
        assert_eq!(msg.seq, Some(1));
    }

    #[test]
    fn top_is_headers_only() {
        let mock = MockStream::default().then(
            "TOP 3 0\r\n",
            "+OK\r\nFrom: A <a@x.com>\r\nContent-Type: text/html\r\n\r\n.\r\n",
        );
        let w = mock.written();
        let mut c = logged_in(mock);
        let msg = c.top(3).unwrap();
        assert_eq!(msg.from()[0].address, "a@x.com");
        assert_eq!(msg.content_type(), "text/html");
        assert_eq!(msg.body_html(), None);
        assert_eq!(written(&w), "TOP 3 0\r\n");
    }

    #[test]
    fn delete_reset_quit() {
        let mock = MockStream::default()
            .then("DELE 2\r\n", "+OK message 2 deleted\r\n")
            .then("RSET\r\n", "+OK\r\n")
            .then("QUIT\r\n", "+OK bye\r\n");
        let mut c = logged_in(mock);
        c.delete(2).unwrap();
        c.reset().unwrap();
        c.quit().unwrap();
        assert!(matches!(
            c.noop(),
            Err(Error::State(StateError::Disconnected))
        ));
    }

    #[test]
    fn capabilities() {
        let mock = MockStream::default().then("CAPA\r\n", "+OK\r\nTOP\r\nUIDL\r\nSTLS\r\n.\r\n");
        let mut c = client(mock);
        assert_eq!(c.capabilities().unwrap(), ["TOP", "UIDL", "STLS"]);
    }

    #[test]
    fn arguments_with_newlines_are_refused() {
        let mut c = client(MockStream::default());
        assert!(matches!(
            c.login("alice\r\nDELE 1", "x"),
            Err(Error::Validate(_))
        ));
    }
}
