use std::cmp::min;
use std::collections::VecDeque;
use std::io::{Error, ErrorKind, Read, Result, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::conn::SetReadTimeout;

/// An in-memory transport.
///
/// Bytes handed to `new` are readable right away. Replies registered with `then` only become
/// readable once the client has written their trigger, which lets tests script a conversation.
/// When nothing is readable, reads fail with `WouldBlock`, like a socket whose read timeout
/// expired.
#[derive(Debug)]
pub struct MockStream {
    read_buf: Vec<u8>,
    read_pos: usize,
    written_buf: Arc<Mutex<Vec<u8>>>,
    scan_pos: usize,
    script: VecDeque<(Vec<u8>, Vec<u8>)>,
    err_on_read: bool,
    eof_on_read: bool,
    read_delay: usize,
}

impl Default for MockStream {
    fn default() -> Self {
        MockStream {
            read_buf: Vec::new(),
            read_pos: 0,
            written_buf: Arc::new(Mutex::new(Vec::new())),
            scan_pos: 0,
            script: VecDeque::new(),
            err_on_read: false,
            eof_on_read: false,
            read_delay: 0,
        }
    }
}

impl MockStream {
    pub fn new(read_buf: Vec<u8>) -> MockStream {
        MockStream::default().with_buf(read_buf)
    }

    pub fn with_buf(mut self, read_buf: Vec<u8>) -> MockStream {
        self.read_buf = read_buf;
        self
    }

    /// Makes `reply` readable once `trigger` shows up in the written bytes, after the triggers
    /// registered before it.
    pub fn then(mut self, trigger: &str, reply: &str) -> MockStream {
        self.script
            .push_back((trigger.as_bytes().to_vec(), reply.as_bytes().to_vec()));
        self
    }

    pub fn with_eof(mut self) -> MockStream {
        self.eof_on_read = true;
        self
    }

    pub fn with_err(mut self) -> MockStream {
        self.err_on_read = true;
        self
    }

    /// The next `reads` reads return at most one byte each.
    pub fn with_delay(mut self, reads: usize) -> MockStream {
        self.read_delay = reads;
        self
    }

    /// A handle on everything written to the stream so far.
    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written_buf)
    }

    fn release_scripted(&mut self) {
        let written = self.written_buf.lock().unwrap();
        while let Some((trigger, _)) = self.script.front() {
            let haystack = &written[self.scan_pos..];
            let found = haystack
                .windows(trigger.len())
                .position(|w| w == &trigger[..]);
            match found {
                Some(at) => {
                    self.scan_pos += at + trigger.len();
                    let (_, reply) = self.script.pop_front().unwrap();
                    self.read_buf.extend_from_slice(&reply);
                }
                None => break,
            }
        }
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.err_on_read {
            return Err(Error::new(ErrorKind::Other, "MockStream Error"));
        }
        if self.read_pos >= self.read_buf.len() {
            self.release_scripted();
        }
        if self.read_pos >= self.read_buf.len() {
            if self.eof_on_read && self.script.is_empty() {
                return Ok(0);
            }
            return Err(Error::new(ErrorKind::WouldBlock, "no data"));
        }
        let mut write_len = min(buf.len(), self.read_buf.len() - self.read_pos);
        if self.read_delay > 0 {
            self.read_delay -= 1;
            write_len = min(write_len, 1);
        }
        let max_pos = self.read_pos + write_len;
        buf[..write_len].copy_from_slice(&self.read_buf[self.read_pos..max_pos]);
        self.read_pos += write_len;
        Ok(write_len)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.written_buf.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl SetReadTimeout for MockStream {
    fn set_read_timeout(&mut self, _timeout: Option<Duration>) -> crate::error::Result<()> {
        Ok(())
    }
}
