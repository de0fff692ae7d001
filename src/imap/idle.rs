//! The IDLE event pump.
//!
//! While at least one [`Subscription`] is alive and the client is not paused, a pump thread
//! keeps the selected mailbox in IDLE (RFC 2177) and turns untagged `EXISTS` and `EXPUNGE`
//! responses into [`MailEvent`]s. Every `idle_keepalive` the IDLE is ended with `DONE` and
//! reissued, since servers drop connections that idle for thirty minutes.
//!
//! The pump shares the [`Connection`] with the client. The client refuses to issue commands
//! while the pump runs; [`Client::pause`](super::Client::pause) stops it and waits for it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::connection::{status_error, Connection};
use super::parse::{parse_response, Data, Response, Status, StatusResponse};
use crate::conn::Transport;
use crate::error::{Error, Result};
use crate::reader::Next;
use crate::types::MailEvent;

/// Receives the events of the selected mailbox.
///
/// Dropping a subscription is allowed; it is pruned the next time an event is dispatched. Use
/// [`Client::unsubscribe`](super::Client::unsubscribe) to stop the pump once nobody listens.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: Receiver<MailEvent>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Blocks until an event arrives; `None` once the client is gone.
    pub fn recv(&self) -> Option<MailEvent> {
        self.rx.recv().ok()
    }

    /// Waits at most `timeout` for an event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<MailEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<MailEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Iterates over events as they arrive, until the client is dropped.
    pub fn iter(&self) -> impl Iterator<Item = MailEvent> + '_ {
        self.rx.iter()
    }
}

/// The registered subscribers.
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    next_id: u64,
    senders: Vec<(u64, Sender<MailEvent>)>,
}

impl Subscribers {
    pub(crate) fn add(&mut self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        self.next_id += 1;
        self.senders.push((self.next_id, tx));
        Subscription {
            id: self.next_id,
            rx,
        }
    }

    /// Removes a subscriber; returns whether it was registered.
    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.senders.len();
        self.senders.retain(|(sid, _)| *sid != id);
        self.senders.len() != before
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.senders.len()
    }

    /// Delivers `event` to every live subscriber, dropping the ones that went away.
    fn dispatch(&mut self, event: MailEvent) {
        log::debug!("dispatching {:?} to {} subscriber(s)", event, self.senders.len());
        self.senders.retain(|(id, tx)| {
            let alive = tx.send(event).is_ok();
            if !alive {
                log::debug!("pruning subscriber {}", id);
            }
            alive
        });
    }
}

fn dispatch(subscribers: &Mutex<Subscribers>, event: MailEvent) {
    match subscribers.lock() {
        Ok(mut subs) => subs.dispatch(event),
        Err(_) => log::warn!("subscriber list poisoned; dropping {:?}", event),
    }
}

/// Maps an untagged response to an event, if it is one.
fn event(data: &Data) -> Option<MailEvent> {
    match *data {
        Data::Exists(n) => Some(MailEvent::NewMessage(n)),
        Data::Expunge(n) => Some(MailEvent::Expunged(n)),
        _ => None,
    }
}

pub(crate) fn dispatch_lines(subscribers: &Mutex<Subscribers>, lines: &[Vec<u8>]) {
    for line in lines {
        if let Ok(Response::Data(data)) = parse_response(line) {
            if let Some(ev) = event(&data) {
                dispatch(subscribers, ev);
            }
        }
    }
}

/// Sends `IDLE` and waits for the server to accept it. Returns the command's tag.
pub(crate) fn start_idle<T: Transport>(
    conn: &Connection<T>,
    subscribers: &Mutex<Subscribers>,
) -> Result<String> {
    let tag = conn.run_command("IDLE")?;
    loop {
        let line = conn.read_line()?;
        match parse_response(&line) {
            Ok(Response::Continue(_)) => return Ok(tag),
            Ok(Response::Done { tag: ref t, status }) if *t == tag => {
                return Err(match status.status {
                    Status::Ok => Error::Unexpected("IDLE completed before it started".into()),
                    _ => status_error(status),
                });
            }
            Ok(Response::Data(ref data)) => {
                if let Some(ev) = event(data) {
                    dispatch(subscribers, ev);
                }
            }
            Ok(_) => {}
            Err(e) => log::warn!("ignoring unparseable line while starting IDLE: {}", e),
        }
    }
}

/// Ends the IDLE tagged `tag`, delivering whatever the server reports on the way out.
fn end_idle<T: Transport>(
    conn: &Connection<T>,
    tag: &str,
    subscribers: &Mutex<Subscribers>,
) -> Result<()> {
    conn.write_line(b"DONE")?;
    let reply = conn.read_response(tag)?;
    dispatch_lines(subscribers, &reply.lines);
    Ok(())
}

/// Errors from refreshing IDLE surface as transport errors.
fn keepalive_failed(e: Error) -> Error {
    if e.is_transport() {
        return e;
    }
    log::warn!("IDLE keepalive failed: {}", e);
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("IDLE keepalive failed: {}", e),
    ))
}

fn pump<T: Transport>(
    conn: Arc<Connection<T>>,
    mut tag: String,
    keepalive: Duration,
    stop: Arc<AtomicBool>,
    subscribers: Arc<Mutex<Subscribers>>,
) -> Result<()> {
    let mut idle_since = Instant::now();
    loop {
        if stop.load(Ordering::SeqCst) {
            return end_idle(&conn, &tag, &subscribers);
        }

        let wait = keepalive.saturating_sub(idle_since.elapsed());
        match conn.next(Some(wait))? {
            Next::Line(line) => match parse_response(&line) {
                Ok(Response::Data(Data::Status(StatusResponse {
                    status: Status::Bye,
                    text,
                    ..
                }))) => {
                    log::info!("server is closing the connection: {}", text);
                }
                Ok(Response::Data(ref data)) => match event(data) {
                    Some(ev) => dispatch(&subscribers, ev),
                    None => log::trace!("ignoring {:?} while idling", data),
                },
                Ok(Response::Done { tag: ref t, status }) if *t == tag => {
                    if status.status != Status::Ok {
                        return Err(status_error(status));
                    }
                    log::debug!("server ended IDLE; reissuing");
                    tag = start_idle(&conn, &subscribers).map_err(keepalive_failed)?;
                    idle_since = Instant::now();
                }
                Ok(other) => log::trace!("ignoring {:?} while idling", other),
                Err(e) => log::warn!("ignoring unparseable line while idling: {}", e),
            },
            Next::Timeout => {
                log::debug!("refreshing IDLE after {:?}", keepalive);
                tag = end_idle(&conn, &tag, &subscribers)
                    .and_then(|()| start_idle(&conn, &subscribers))
                    .map_err(keepalive_failed)?;
                idle_since = Instant::now();
            }
            // the flag is checked at the top of the loop
            Next::Interrupt => {}
        }
    }
}

/// A running pump thread.
#[derive(Debug)]
pub(crate) struct Pump {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Result<()>>,
}

impl Pump {
    /// Starts IDLE on `conn` and hands the connection over to a new pump thread.
    pub(crate) fn start<T: Transport>(
        conn: Arc<Connection<T>>,
        keepalive: Duration,
        subscribers: Arc<Mutex<Subscribers>>,
    ) -> Result<Pump> {
        let tag = start_idle(&conn, &subscribers)?;
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("mailwire-idle".into())
                .spawn(move || pump(conn, tag, keepalive, stop, subscribers))?
        };
        log::debug!("IDLE pump started");
        Ok(Pump { stop, handle })
    }

    /// Whether the pump thread has exited on its own, e.g. because the connection dropped.
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Asks the pump to end IDLE and waits up to `timeout` for it.
    ///
    /// Returns the error that ended the pump, if any. If the pump does not finish in time it is
    /// detached and a timeout error is returned.
    pub(crate) fn stop<T: Transport>(self, conn: &Connection<T>, timeout: Duration) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        conn.queue().interrupt();

        let deadline = Instant::now() + timeout;
        while !self.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        if !self.handle.is_finished() {
            log::warn!("IDLE pump did not stop within {:?}; detaching it", timeout);
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "IDLE did not end in time",
            )));
        }
        let result = self
            .handle
            .join()
            .unwrap_or_else(|_| Err(Error::Unexpected("IDLE pump panicked".into())));
        log::debug!("IDLE pump stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_subscribers_are_pruned() {
        let subs = Mutex::new(Subscribers::default());
        let keep = subs.lock().unwrap().add();
        let gone = subs.lock().unwrap().add();
        drop(gone);
        dispatch(&subs, MailEvent::NewMessage(3));
        assert_eq!(subs.lock().unwrap().len(), 1);
        assert_eq!(keep.try_recv(), Some(MailEvent::NewMessage(3)));
        assert_eq!(keep.try_recv(), None);
    }

    #[test]
    fn remove_reports_membership() {
        let mut subs = Subscribers::default();
        let a = subs.add();
        let b = subs.add();
        assert_ne!(a.id(), b.id());
        assert!(subs.remove(a.id()));
        assert!(!subs.remove(a.id()));
        assert!(!subs.is_empty());
    }

    #[test]
    fn untagged_lines_map_to_events() {
        let subs = Mutex::new(Subscribers::default());
        let sub = subs.lock().unwrap().add();
        dispatch_lines(
            &subs,
            &[
                b"* 4 EXISTS\r\n".to_vec(),
                b"* 2 RECENT\r\n".to_vec(),
                b"* 1 EXPUNGE\r\n".to_vec(),
            ],
        );
        assert_eq!(sub.try_recv(), Some(MailEvent::NewMessage(4)));
        assert_eq!(sub.try_recv(), Some(MailEvent::Expunged(1)));
        assert_eq!(sub.try_recv(), None);
    }
}
