//! The background line reader.
//!
//! Every connection owns one reader thread. The thread holds the only reading end of the
//! transport: it splits the byte stream into logical response lines and pushes them onto a
//! bounded queue, from which commands (or the IDLE pump) pull them. The stream itself lives
//! behind a mutex so that the calling thread can still write commands while the reader is
//! parked in a read.
//!
//! Reads use a short timeout. Each time a read times out, the reader drops the stream lock,
//! checks whether it has been asked to stop, and yields briefly so a writer can get in.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bufstream::BufStream;

use crate::conn::Transport;
use crate::error::{Error, Result};
use crate::literal;

const CR: u8 = 0x0d;
const LF: u8 = 0x0a;

/// How many logical lines may be buffered before the reader thread waits for a consumer.
const QUEUE_CAPACITY: usize = 1024;

/// How long `stop` waits for the reader thread before detaching it.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// How the reader splits the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    /// IMAP: lines ending in a `{N}` marker are followed by exactly `N` raw octets, which belong
    /// to the same logical line.
    Imap,
    /// POP3: plain LF-terminated lines.
    Lines,
}

/// An item on the line queue.
#[derive(Debug)]
pub(crate) enum ResponseLine {
    /// One logical line, including its line ending and any embedded literals.
    Line(Vec<u8>),
    /// Pushed by the client to unblock a thread waiting on the queue.
    Interrupt,
    /// The stream ended, with the error that ended it if there was one.
    Closed(Option<io::Error>),
}

/// What [`LineQueue::next`] produced.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Next {
    Line(Vec<u8>),
    Timeout,
    Interrupt,
}

/// The consumer side of the reader thread.
#[derive(Debug)]
pub(crate) struct LineQueue {
    rx: Mutex<Receiver<ResponseLine>>,
    tx: SyncSender<ResponseLine>,
    closed: AtomicBool,
}

impl LineQueue {
    fn new() -> (Arc<Self>, SyncSender<ResponseLine>) {
        let (tx, rx) = mpsc::sync_channel(QUEUE_CAPACITY);
        let queue = Arc::new(LineQueue {
            rx: Mutex::new(rx),
            tx: tx.clone(),
            closed: AtomicBool::new(false),
        });
        (queue, tx)
    }

    /// Pulls the next line, waiting at most `timeout` (or forever if `None`).
    pub(crate) fn next(&self, timeout: Option<Duration>) -> Result<Next> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionLost);
        }
        let rx = self.rx.lock().map_err(|_| Error::ConnectionLost)?;
        let item = match timeout {
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(item) => item,
                Err(RecvTimeoutError::Timeout) => return Ok(Next::Timeout),
                Err(RecvTimeoutError::Disconnected) => ResponseLine::Closed(None),
            },
            None => rx.recv().unwrap_or(ResponseLine::Closed(None)),
        };
        match item {
            ResponseLine::Line(line) => Ok(Next::Line(line)),
            ResponseLine::Interrupt => Ok(Next::Interrupt),
            ResponseLine::Closed(err) => {
                self.closed.store(true, Ordering::SeqCst);
                Err(err.map(Error::Io).unwrap_or(Error::ConnectionLost))
            }
        }
    }

    /// Drops every queued sentinel and line.
    pub(crate) fn drain(&self) {
        if let Ok(rx) = self.rx.lock() {
            loop {
                match rx.try_recv() {
                    Ok(ResponseLine::Closed(_)) | Err(TryRecvError::Disconnected) => {
                        self.closed.store(true, Ordering::SeqCst);
                        break;
                    }
                    Ok(_) => {}
                    Err(TryRecvError::Empty) => break,
                }
            }
        }
    }

    /// Wakes up whoever is blocked in [`LineQueue::next`].
    pub(crate) fn interrupt(&self) {
        let _ = self.tx.try_send(ResponseLine::Interrupt);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Owns the transport and the thread that reads from it.
#[derive(Debug)]
pub(crate) struct LineReader<T: Transport> {
    stream: Arc<Mutex<BufStream<T>>>,
    queue: Arc<LineQueue>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    debug: bool,
}

impl<T: Transport> LineReader<T> {
    /// Takes over `stream` and starts the reader thread.
    pub(crate) fn start(mut stream: T, framing: Framing, poll: Duration, debug: bool) -> Result<Self> {
        stream.set_read_timeout(Some(poll))?;
        let stream = Arc::new(Mutex::new(BufStream::new(stream)));
        let (queue, tx) = LineQueue::new();
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = {
            let stream = Arc::clone(&stream);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("mailwire-reader".into())
                .spawn(move || read_loop(stream, tx, shutdown, framing, debug))?
        };
        log::debug!("reader thread started ({:?} framing)", framing);

        Ok(LineReader {
            stream,
            queue,
            shutdown,
            handle: Some(handle),
            debug,
        })
    }

    pub(crate) fn queue(&self) -> &Arc<LineQueue> {
        &self.queue
    }

    /// Pulls the next logical line; see [`LineQueue::next`].
    pub(crate) fn next(&self, timeout: Option<Duration>) -> Result<Next> {
        self.queue.next(timeout)
    }

    /// Writes `buf` followed by CRLF, and flushes.
    pub(crate) fn write_line(&self, buf: &[u8]) -> Result<()> {
        let mut stream = self.lock()?;
        stream.write_all(buf)?;
        stream.write_all(&[CR, LF])?;
        stream.flush()?;
        log_wire(self.debug, "C", buf);
        Ok(())
    }

    /// Writes `buf` as-is, and flushes. Used for literal payloads.
    pub(crate) fn write_raw(&self, buf: &[u8]) -> Result<()> {
        let mut stream = self.lock()?;
        stream.write_all(buf)?;
        stream.flush()?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BufStream<T>>> {
        if self.queue.is_closed() {
            return Err(Error::ConnectionLost);
        }
        self.stream.lock().map_err(|_| Error::ConnectionLost)
    }

    /// Asks the reader thread to exit and waits for it.
    pub(crate) fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let deadline = Instant::now() + STOP_GRACE;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                let _ = handle.join();
                log::debug!("reader thread stopped");
            } else {
                // The read is stuck in a transport that ignores read timeouts. The thread exits
                // by itself once that read returns.
                log::warn!("reader thread did not stop within {:?}; detaching it", STOP_GRACE);
            }
        }
    }

    /// Stops the reader thread and hands back the underlying stream.
    pub(crate) fn into_inner(mut self) -> Result<T> {
        self.stop();
        let stream = Arc::clone(&self.stream);
        drop(self);
        let stream = Arc::try_unwrap(stream).map_err(|_| Error::ConnectionLost)?;
        let stream = stream.into_inner().map_err(|_| Error::ConnectionLost)?;
        let mut stream = stream.into_inner()?;
        stream.set_read_timeout(None)?;
        Ok(stream)
    }
}

impl<T: Transport> Drop for LineReader<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn log_wire(debug: bool, who: &str, line: &[u8]) {
    let level = if debug {
        log::Level::Debug
    } else {
        log::Level::Trace
    };
    if log::log_enabled!(level) {
        let line = String::from_utf8_lossy(line);
        log::log!(level, "{}: {}", who, line.trim_end_matches(['\r', '\n']));
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Reads more bytes of the current logical line into `buf`.
///
/// While `literal_left` is non-zero, raw octets are copied without looking for line endings.
/// Otherwise bytes are read up to and including the next LF.
fn fill<T: Transport>(
    stream: &mut BufStream<T>,
    buf: &mut Vec<u8>,
    literal_left: &mut usize,
) -> io::Result<usize> {
    if *literal_left > 0 {
        let available = stream.fill_buf()?;
        if available.is_empty() {
            return Ok(0);
        }
        let n = available.len().min(*literal_left);
        buf.extend_from_slice(&available[..n]);
        stream.consume(n);
        *literal_left -= n;
        Ok(n)
    } else {
        stream.read_until(LF, buf)
    }
}

fn push(
    tx: &SyncSender<ResponseLine>,
    mut item: ResponseLine,
    shutdown: &AtomicBool,
) -> bool {
    loop {
        match tx.try_send(item) {
            Ok(()) => return true,
            Err(TrySendError::Full(back)) => {
                if shutdown.load(Ordering::SeqCst) {
                    return false;
                }
                item = back;
                thread::sleep(Duration::from_millis(1));
            }
            Err(TrySendError::Disconnected(_)) => return false,
        }
    }
}

fn read_loop<T: Transport>(
    stream: Arc<Mutex<BufStream<T>>>,
    tx: SyncSender<ResponseLine>,
    shutdown: Arc<AtomicBool>,
    framing: Framing,
    debug: bool,
) {
    let mut buf = Vec::new();
    // where the physical line currently being read starts within `buf`
    let mut line_start = 0;
    let mut literal_left = 0;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }

        let res = match stream.lock() {
            Ok(mut stream) => fill(&mut stream, &mut buf, &mut literal_left),
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "stream lock poisoned")),
        };

        match res {
            Ok(0) => {
                log::debug!("reader thread: end of stream");
                push(&tx, ResponseLine::Closed(None), &shutdown);
                return;
            }
            Ok(_) => {}
            Err(ref e) if is_timeout(e) => {
                // partial data stays in `buf`; give writers a chance at the stream
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            Err(e) => {
                log::debug!("reader thread: {}", e);
                push(&tx, ResponseLine::Closed(Some(e)), &shutdown);
                return;
            }
        }

        if literal_left > 0 || !buf.ends_with(&[LF]) {
            continue;
        }
        if line_start == buf.len() {
            // a literal just completed; the rest of the line is still to come
            continue;
        }

        if framing == Framing::Imap {
            if let Some(len) = literal::pending_literal(&buf[line_start..]) {
                literal_left = len;
                line_start = buf.len() + len;
                continue;
            }
        }

        log_wire(debug, "S", &buf);
        line_start = 0;
        if !push(&tx, ResponseLine::Line(std::mem::take(&mut buf)), &shutdown) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_stream::MockStream;

    const POLL: Duration = Duration::from_millis(5);
    const WAIT: Option<Duration> = Some(Duration::from_secs(2));

    fn line(reader: &LineReader<MockStream>) -> Vec<u8> {
        match reader.next(WAIT).unwrap() {
            Next::Line(l) => l,
            other => panic!("expected a line, got {:?}", other),
        }
    }

    #[test]
    fn splits_lines() {
        let mock = MockStream::new(b"* OK ready\r\n* 1 EXISTS\r\n".to_vec());
        let reader = LineReader::start(mock, Framing::Imap, POLL, false).unwrap();
        assert_eq!(line(&reader), b"* OK ready\r\n");
        assert_eq!(line(&reader), b"* 1 EXISTS\r\n");
    }

    #[test]
    fn literal_is_read_by_count() {
        let mock = MockStream::new(b"* 1 FETCH (RFC822 {5}\r\nAB\r\nC)\r\nxm001 OK\r\n".to_vec());
        let reader = LineReader::start(mock, Framing::Imap, POLL, false).unwrap();
        assert_eq!(line(&reader), b"* 1 FETCH (RFC822 {5}\r\nAB\r\nC)\r\n");
        assert_eq!(line(&reader), b"xm001 OK\r\n");
    }

    #[test]
    fn literal_split_across_reads() {
        let mock = MockStream::new(b"* 1 FETCH (RFC822 {5}\r\nAB\r\nC)\r\n".to_vec()).with_delay(40);
        let reader = LineReader::start(mock, Framing::Imap, POLL, false).unwrap();
        assert_eq!(line(&reader), b"* 1 FETCH (RFC822 {5}\r\nAB\r\nC)\r\n");
    }

    #[test]
    fn literal_ending_in_marker_text() {
        let mock = MockStream::new(b"* 1 FETCH (BODY[] {6}\r\nx{1}\r\n UID 3)\r\n".to_vec());
        let reader = LineReader::start(mock, Framing::Imap, POLL, false).unwrap();
        assert_eq!(line(&reader), b"* 1 FETCH (BODY[] {6}\r\nx{1}\r\n UID 3)\r\n");
    }

    #[test]
    fn line_framing_ignores_markers() {
        let mock = MockStream::new(b"a line {3}\r\nnext\r\n".to_vec());
        let reader = LineReader::start(mock, Framing::Lines, POLL, false).unwrap();
        assert_eq!(line(&reader), b"a line {3}\r\n");
        assert_eq!(line(&reader), b"next\r\n");
    }

    #[test]
    fn eof_surfaces_connection_lost() {
        let mock = MockStream::default().with_eof();
        let reader = LineReader::start(mock, Framing::Imap, POLL, false).unwrap();
        assert!(matches!(reader.next(WAIT), Err(Error::ConnectionLost)));
        // and keeps doing so
        assert!(matches!(reader.next(WAIT), Err(Error::ConnectionLost)));
        assert!(matches!(reader.write_line(b"NOOP"), Err(Error::ConnectionLost)));
    }

    #[test]
    fn stream_error_surfaces_io() {
        let mock = MockStream::default().with_err();
        let reader = LineReader::start(mock, Framing::Imap, POLL, false).unwrap();
        assert!(matches!(reader.next(WAIT), Err(Error::Io(_))));
    }

    #[test]
    fn timeout_and_interrupt() {
        let reader = LineReader::start(MockStream::default(), Framing::Imap, POLL, false).unwrap();
        assert_eq!(
            reader.next(Some(Duration::from_millis(20))).unwrap(),
            Next::Timeout
        );
        reader.queue().interrupt();
        assert_eq!(reader.next(WAIT).unwrap(), Next::Interrupt);
    }

    #[test]
    fn writes_crlf_terminated_lines() {
        let mock = MockStream::default();
        let written = mock.written();
        let reader = LineReader::start(mock, Framing::Imap, POLL, false).unwrap();
        reader.write_line(b"xm001 NOOP").unwrap();
        assert_eq!(&*written.lock().unwrap(), b"xm001 NOOP\r\n");
    }

    #[test]
    fn into_inner_returns_stream() {
        let mut reader =
            LineReader::start(MockStream::new(b"* OK\r\n".to_vec()), Framing::Imap, POLL, false)
                .unwrap();
        assert_eq!(line(&reader), b"* OK\r\n");
        reader.stop();
        assert!(reader.into_inner().is_ok());
    }
}
