//! Tagging commands and collecting their responses.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::parse::{parse_response, Response, Status, StatusResponse};
use crate::client_builder::ClientOptions;
use crate::conn::Transport;
use crate::error::{Error, ParseError, Result};
use crate::reader::{Framing, LineQueue, LineReader, Next};
use crate::types::ResponseCode;

const TAG_PREFIX: &str = "xm";

/// Everything a command produced up to and including its tagged `OK`.
#[derive(Debug, Default)]
pub(crate) struct Reply {
    /// The untagged lines, in arrival order.
    pub(crate) lines: Vec<Vec<u8>>,
    /// The response code of the tagged completion, if any.
    pub(crate) code: Option<ResponseCode>,
    pub(crate) text: String,
}

/// Turns a tagged completion into the error the caller sees.
pub(crate) fn status_error(status: StatusResponse) -> Error {
    match status.status {
        Status::No => Error::No(status.text),
        Status::Bad => Error::Bad(status.text),
        other => Error::Unexpected(format!("{:?} {}", other, status.text)),
    }
}

/// An IMAP connection: the line reader plus the tag counter.
///
/// All methods take `&self`, so the connection can be shared with the IDLE pump.
#[derive(Debug)]
pub(crate) struct Connection<T: Transport> {
    reader: LineReader<T>,
    tag: AtomicU32,
    response_timeout: Option<Duration>,
}

impl<T: Transport> Connection<T> {
    pub(crate) fn new(stream: T, options: &ClientOptions) -> Result<Self> {
        Ok(Connection {
            reader: LineReader::start(stream, Framing::Imap, options.poll_interval, options.debug)?,
            tag: AtomicU32::new(1),
            response_timeout: options.response_timeout,
        })
    }

    /// The next tag: `xm001`, `xm002`, and so on.
    pub(crate) fn next_tag(&self) -> String {
        let n = self.tag.fetch_add(1, Ordering::SeqCst);
        format!("{}{:03}", TAG_PREFIX, n)
    }

    pub(crate) fn queue(&self) -> &LineQueue {
        self.reader.queue()
    }

    pub(crate) fn next(&self, timeout: Option<Duration>) -> Result<Next> {
        self.reader.next(timeout)
    }

    pub(crate) fn write_line(&self, line: &[u8]) -> Result<()> {
        self.reader.write_line(line)
    }

    pub(crate) fn write_raw(&self, buf: &[u8]) -> Result<()> {
        self.reader.write_raw(buf)
    }

    /// Tags and sends `command`, returning the tag.
    pub(crate) fn run_command(&self, command: &str) -> Result<String> {
        let tag = self.next_tag();
        self.write_line(format!("{} {}", tag, command).as_bytes())?;
        Ok(tag)
    }

    pub(crate) fn run_command_and_read_response(&self, command: &str) -> Result<Reply> {
        let tag = self.run_command(command)?;
        self.read_response(&tag)
    }

    /// Reads one logical line, skipping stale interrupts.
    pub(crate) fn read_line(&self) -> Result<Vec<u8>> {
        loop {
            match self.next(self.response_timeout)? {
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

    /// Collects lines until the completion carrying `tag`.
    ///
    /// Completions for other tags are logged and dropped. `NO` and `BAD` become
    /// [`Error::No`] and [`Error::Bad`].
    pub(crate) fn read_response(&self, tag: &str) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            match parse_response(&line) {
                Ok(Response::Done { tag: ref t, status }) if t == tag => {
                    return match status.status {
                        Status::Ok => Ok(Reply {
                            lines,
                            code: status.code,
                            text: status.text,
                        }),
                        _ => Err(status_error(status)),
                    };
                }
                Ok(Response::Done { tag: other, .. }) => {
                    log::warn!("dropping completion for unknown tag {} while waiting for {}", other, tag);
                }
                Ok(Response::Continue(text)) => {
                    log::warn!("unexpected continuation while waiting for {}: {}", tag, text);
                }
                Ok(Response::Data(_)) => lines.push(line),
                Err(e) => {
                    if line.starts_with(tag.as_bytes()) && line.get(tag.len()) == Some(&b' ') {
                        return Err(Error::Parse(ParseError::Invalid(line)));
                    }
                    log::debug!("keeping unparsed line: {}", e);
                    lines.push(line);
                }
            }
        }
    }

    /// Stops the reader and returns the stream.
    pub(crate) fn into_inner(self) -> Result<T> {
        self.reader.into_inner()
    }
}
