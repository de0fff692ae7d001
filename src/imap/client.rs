use std::fmt;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use super::connection::{status_error, Connection, Reply};
use super::idle::{dispatch_lines, Pump, Subscribers, Subscription};
use super::parse::{
    parse_authenticate_response, parse_capabilities, parse_expunged, parse_fetches, parse_ids,
    parse_mailbox, parse_names, parse_quota, parse_response, parse_status, Data, Response,
    Status, StatusResponse,
};
use crate::authenticator::Authenticator;
use crate::client_builder::ClientOptions;
use crate::conn::Transport;
use crate::error::{Error, ParseError, Result, StateError};
use crate::mime::Message;
use crate::types::*;
use crate::utf7;
use crate::utils::{iter_join, quote, validate_line, validate_str};

/// The query used to retrieve whole messages.
const MESSAGE_QUERY: &str = "(UID RFC822.SIZE FLAGS INTERNALDATE BODY.PEEK[])";
/// The query used to retrieve message headers.
const HEADER_QUERY: &str = "(UID RFC822.SIZE FLAGS INTERNALDATE BODY.PEEK[HEADER])";

/// The state of an IMAP session ([RFC 3501 section 3](https://tools.ietf.org/html/rfc3501#section-3)).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    NotAuthenticated,
    Authenticated,
    Selected,
    /// The IDLE pump owns the connection; commands are refused until it is paused.
    Idling,
    /// Logged out, or the connection failed.
    Disconnected,
}

/// What a command needs from the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Need {
    Any,
    NotAuthenticated,
    Authenticated,
    Selected,
}

fn mailbox_arg(name: &str) -> Result<String> {
    validate_str(&utf7::encode(name))
}

fn flag_list(flags: &[Flag]) -> String {
    let storable = flags.iter().filter(|f| {
        let ok = f.is_storable();
        if !ok {
            log::debug!("leaving out flag {} that cannot be stored", f);
        }
        ok
    });
    format!("({})", iter_join(storable, " "))
}

/// An IMAP session over a transport `T`.
///
/// A background thread reads the server's responses; commands run on the calling thread and
/// block until their tagged completion arrives. While a [`Subscription`] is active the client
/// idles, and every command fails with [`StateError::Idling`] until [`Client::pause`] is called.
#[derive(Debug)]
pub struct Client<T: Transport> {
    conn: Arc<Connection<T>>,
    options: ClientOptions,
    phase: Phase,
    mailbox: Option<Mailbox>,
    subscribers: Arc<Mutex<Subscribers>>,
    pump: Option<Pump>,
    paused: bool,
}

impl<T: Transport> Client<T> {
    /// Creates a new client with the underlying stream and default options.
    ///
    /// The server greeting is left for [`Client::read_greeting`].
    pub fn new(stream: T) -> Result<Client<T>> {
        Client::with_options(stream, ClientOptions::default())
    }

    pub fn with_options(stream: T, options: ClientOptions) -> Result<Client<T>> {
        Ok(Client {
            conn: Arc::new(Connection::new(stream, &options)?),
            options,
            phase: Phase::NotAuthenticated,
            mailbox: None,
            subscribers: Arc::new(Mutex::new(Subscribers::default())),
            pump: None,
            paused: false,
        })
    }

    /// The current session state.
    pub fn phase(&self) -> Phase {
        if self.conn.queue().is_closed() {
            Phase::Disconnected
        } else if self.pump.is_some() {
            Phase::Idling
        } else {
            self.phase
        }
    }

    /// The mailbox returned by the last successful `SELECT` or `EXAMINE`.
    pub fn mailbox(&self) -> Option<&Mailbox> {
        self.mailbox.as_ref()
    }

    /// Whether event delivery was suspended with [`Client::pause`].
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Collects a pump that exited on its own, returning the error that ended it.
    fn reap_pump(&mut self) -> Result<()> {
        let exited = self
            .pump
            .as_ref()
            .map_or(false, |p| p.is_finished() || self.conn.queue().is_closed());
        if exited {
            log::debug!("IDLE pump exited on its own");
            self.stop_pump()?;
        }
        Ok(())
    }

    fn require(&mut self, need: Need) -> Result<()> {
        self.reap_pump()?;
        if self.pump.is_some() {
            return Err(StateError::Idling.into());
        }
        let err = match (need, self.phase) {
            (_, Phase::Disconnected) => StateError::Disconnected,
            (Need::Any, _) => return Ok(()),
            (Need::NotAuthenticated, Phase::NotAuthenticated) => return Ok(()),
            (Need::NotAuthenticated, _) => StateError::AlreadyAuthenticated,
            (_, Phase::NotAuthenticated) => StateError::NotAuthenticated,
            (Need::Authenticated, _) => return Ok(()),
            (Need::Selected, Phase::Selected) => return Ok(()),
            (Need::Selected, _) => StateError::NoMailboxSelected,
        };
        Err(err.into())
    }

    /// Records a transport failure in the session state.
    fn track<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(ref e) = result {
            if e.is_transport() {
                log::debug!("connection failed: {}", e);
                self.phase = Phase::Disconnected;
            }
        }
        result
    }

    /// The single point through which commands reach the server.
    fn exchange(&mut self, need: Need, command: &str) -> Result<Reply> {
        self.require(need)?;
        let result = self.conn.run_command_and_read_response(command);
        self.track(result)
    }

    /// Runs a command in the selected mailbox's context. `EXISTS` and `EXPUNGE` it reports
    /// reach subscribers, as they would while idling.
    fn issue(&mut self, need: Need, command: &str) -> Result<Reply> {
        let reply = self.exchange(need, command)?;
        if self.phase == Phase::Selected && !self.lock_subscribers()?.is_empty() {
            dispatch_lines(&self.subscribers, &reply.lines);
        }
        Ok(reply)
    }

    fn issue_ok(&mut self, need: Need, command: &str) -> Result<()> {
        self.issue(need, command).map(|_| ())
    }

    /// Reads the untagged greeting the server sends on connect.
    pub fn read_greeting(&mut self) -> Result<()> {
        let line = self.conn.read_line();
        let line = self.track(line)?;
        match parse_response(&line)? {
            Response::Data(Data::Status(StatusResponse { status, text, .. })) => match status {
                Status::Ok => Ok(()),
                Status::PreAuth => {
                    self.phase = Phase::Authenticated;
                    Ok(())
                }
                Status::Bye => {
                    self.phase = Phase::Disconnected;
                    Err(Error::Unexpected(format!("server refused the connection: {}", text)))
                }
                _ => Err(Error::Unexpected(format!("unexpected greeting: {}", text))),
            },
            _ => Err(Error::Parse(ParseError::Invalid(line))),
        }
    }

    /// Upgrades the session; the caller performs the TLS handshake on [`Client::into_inner`].
    pub(crate) fn starttls(&mut self) -> Result<()> {
        self.issue_ok(Need::NotAuthenticated, "STARTTLS")
    }

    /// Capability requests a listing of capabilities that the server supports.
    pub fn capabilities(&mut self) -> Result<Capabilities> {
        let reply = self.issue(Need::Any, "CAPABILITY")?;
        Ok(parse_capabilities(&reply.lines, reply.code.as_ref()))
    }

    /// Log in to the IMAP server.
    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let command = format!("LOGIN {} {}", validate_str(username)?, validate_str(password)?);
        self.issue_ok(Need::NotAuthenticated, &command)?;
        self.phase = Phase::Authenticated;
        Ok(())
    }

    /// Authenticate with the server using a SASL mechanism such as `PLAIN` or `XOAUTH2`.
    pub fn authenticate<A: Authenticator>(
        &mut self,
        auth_type: &str,
        authenticator: &A,
    ) -> Result<()> {
        self.require(Need::NotAuthenticated)?;
        let command = format!("AUTHENTICATE {}", validate_line(auth_type)?);
        let result = self
            .conn
            .run_command(&command)
            .and_then(|tag| self.do_auth_handshake(&tag, authenticator));
        self.track(result)?;
        self.phase = Phase::Authenticated;
        Ok(())
    }

    fn do_auth_handshake<A: Authenticator>(&self, tag: &str, authenticator: &A) -> Result<()> {
        loop {
            let line = self.conn.read_line()?;
            if line.starts_with(b"+") {
                let data = parse_authenticate_response(&line)?;
                let challenge = match BASE64.decode(data.trim()) {
                    Ok(challenge) => challenge,
                    Err(e) => {
                        // cancel the exchange and let the server finish it
                        self.conn.write_line(b"*")?;
                        let _ = self.conn.read_response(tag);
                        return Err(ParseError::Authentication(data, Some(e)).into());
                    }
                };
                let response = authenticator.process(&challenge);
                self.conn
                    .write_line(BASE64.encode(response.as_ref()).as_bytes())?;
                continue;
            }
            match parse_response(&line) {
                Ok(Response::Done { tag: ref t, status }) if t == tag => {
                    return match status.status {
                        Status::Ok => Ok(()),
                        _ => Err(status_error(status)),
                    };
                }
                _ => log::trace!("skipping line during authentication"),
            }
        }
    }

    /// Logout informs the server that the client is done with the connection.
    ///
    /// A running IDLE is ended first.
    pub fn logout(&mut self) -> Result<()> {
        if let Err(e) = self.stop_pump() {
            log::warn!("IDLE ended with an error before logout: {}", e);
        }
        self.require(Need::Any)?;
        let result = self.conn.run_command_and_read_response("LOGOUT");
        self.phase = Phase::Disconnected;
        self.mailbox = None;
        result.map(|_| ())
    }

    /// Noop always succeeds, and it does nothing.
    pub fn noop(&mut self) -> Result<()> {
        self.issue_ok(Need::Any, "NOOP")
    }

    fn open(&mut self, command: &str, mailbox_name: &str) -> Result<Mailbox> {
        let command = format!("{} {}", command, mailbox_arg(mailbox_name)?);
        match self.exchange(Need::Authenticated, &command) {
            Ok(reply) => {
                let mut mailbox = parse_mailbox(mailbox_name, &reply.lines, reply.code.as_ref());
                if command.starts_with("EXAMINE") {
                    mailbox.read_only = true;
                }
                self.phase = Phase::Selected;
                self.mailbox = Some(mailbox.clone());
                Ok(mailbox)
            }
            Err(e) => {
                // a failed SELECT leaves no mailbox selected
                if e.is_protocol() && self.phase == Phase::Selected {
                    self.phase = Phase::Authenticated;
                    self.mailbox = None;
                }
                Err(e)
            }
        }
    }

    /// Selects a mailbox
    pub fn select(&mut self, mailbox_name: &str) -> Result<Mailbox> {
        self.open("SELECT", mailbox_name)
    }

    /// Examine is identical to Select, but the selected mailbox is identified as read-only
    pub fn examine(&mut self, mailbox_name: &str) -> Result<Mailbox> {
        self.open("EXAMINE", mailbox_name)
    }

    /// Create creates a mailbox with the given name.
    pub fn create(&mut self, mailbox_name: &str) -> Result<()> {
        let command = format!("CREATE {}", mailbox_arg(mailbox_name)?);
        self.issue_ok(Need::Authenticated, &command)
    }

    /// Delete permanently removes the mailbox with the given name.
    pub fn delete(&mut self, mailbox_name: &str) -> Result<()> {
        let command = format!("DELETE {}", mailbox_arg(mailbox_name)?);
        self.issue_ok(Need::Authenticated, &command)
    }

    /// Rename changes the name of a mailbox.
    pub fn rename(&mut self, current_mailbox_name: &str, new_mailbox_name: &str) -> Result<()> {
        let command = format!(
            "RENAME {} {}",
            mailbox_arg(current_mailbox_name)?,
            mailbox_arg(new_mailbox_name)?
        );
        self.issue_ok(Need::Authenticated, &command)
    }

    /// Adds the mailbox to the server's set of subscribed mailboxes, as returned by `LSUB`.
    ///
    /// Not to be confused with [`Client::subscribe`], which subscribes to mailbox events.
    pub fn subscribe_mailbox(&mut self, mailbox: &str) -> Result<()> {
        let command = format!("SUBSCRIBE {}", mailbox_arg(mailbox)?);
        self.issue_ok(Need::Authenticated, &command)
    }

    pub fn unsubscribe_mailbox(&mut self, mailbox: &str) -> Result<()> {
        let command = format!("UNSUBSCRIBE {}", mailbox_arg(mailbox)?);
        self.issue_ok(Need::Authenticated, &command)
    }

    fn names(&mut self, command: &str, reference_name: &str, pattern: &str) -> Result<Vec<Name>> {
        let command = format!(
            "{} {} {}",
            command,
            validate_str(reference_name)?,
            mailbox_arg(pattern)?
        );
        let reply = self.issue(Need::Authenticated, &command)?;
        Ok(parse_names(&reply.lines))
    }

    /// The LIST command returns a subset of names from the complete set
    /// of all names available to the client.
    ///
    /// Names are returned decoded from modified UTF-7.
    pub fn list(&mut self, reference_name: &str, mailbox_pattern: &str) -> Result<Vec<Name>> {
        self.names("LIST", reference_name, mailbox_pattern)
    }

    /// The LSUB command returns a subset of names from the set of names
    /// that the user has declared as being "active" or "subscribed".
    pub fn lsub(&mut self, reference_name: &str, mailbox_pattern: &str) -> Result<Vec<Name>> {
        self.names("LSUB", reference_name, mailbox_pattern)
    }

    /// The STATUS command requests the status of the indicated mailbox, e.g.
    /// `status("INBOX", "(MESSAGES UNSEEN)")`.
    pub fn status(&mut self, mailbox_name: &str, data_items: &str) -> Result<Mailbox> {
        let command = format!(
            "STATUS {} {}",
            mailbox_arg(mailbox_name)?,
            validate_line(data_items)?
        );
        let reply = self.issue(Need::Authenticated, &command)?;
        Ok(parse_status(mailbox_name, &reply.lines))
    }

    /// The number of messages in a mailbox, without selecting it.
    pub fn message_count(&mut self, mailbox_name: &str) -> Result<u32> {
        self.status(mailbox_name, "(MESSAGES)").map(|m| m.exists)
    }

    /// Fetch retrieves data associated with a set of messages in the mailbox.
    pub fn fetch(&mut self, sequence_set: &str, query: &str) -> Result<Vec<Fetch>> {
        let command = format!(
            "FETCH {} {}",
            validate_line(sequence_set)?,
            validate_line(query)?
        );
        let reply = self.issue(Need::Selected, &command)?;
        Ok(parse_fetches(&reply.lines))
    }

    pub fn uid_fetch(&mut self, uid_set: &str, query: &str) -> Result<Vec<Fetch>> {
        let command = format!(
            "UID FETCH {} {}",
            validate_line(uid_set)?,
            validate_line(query)?
        );
        let reply = self.issue(Need::Selected, &command)?;
        Ok(parse_fetches(&reply.lines))
    }

    /// Retrieves and decodes one message by sequence number, without setting `\Seen`.
    pub fn fetch_message(&mut self, seq: Seq) -> Result<Message> {
        self.fetch(&seq.to_string(), MESSAGE_QUERY)?
            .into_iter()
            .find(|f| f.message == seq)
            .map(|f| Message::from_fetch(&f, false))
            .ok_or_else(|| Error::Unexpected(format!("no FETCH response for message {}", seq)))
    }

    /// Retrieves and decodes one message by UID, without setting `\Seen`.
    pub fn fetch_message_by_uid(&mut self, uid: Uid) -> Result<Message> {
        self.uid_fetch(&uid.to_string(), MESSAGE_QUERY)?
            .into_iter()
            .find(|f| f.uid == Some(uid))
            .map(|f| Message::from_fetch(&f, false))
            .ok_or_else(|| Error::Unexpected(format!("no message with UID {}", uid)))
    }

    /// Retrieves and decodes a set of messages, e.g. `1:10`.
    ///
    /// With `headers_only`, only the header block of each message is transferred.
    pub fn fetch_messages(&mut self, sequence_set: &str, headers_only: bool) -> Result<Vec<Message>> {
        let query = if headers_only {
            HEADER_QUERY
        } else {
            MESSAGE_QUERY
        };
        Ok(self
            .fetch(sequence_set, query)?
            .iter()
            .map(|f| Message::from_fetch(f, headers_only))
            .collect())
    }

    /// Store alters data associated with a message in the mailbox.
    pub fn store(&mut self, sequence_set: &str, query: &str) -> Result<Vec<Fetch>> {
        let command = format!(
            "STORE {} {}",
            validate_line(sequence_set)?,
            validate_line(query)?
        );
        let reply = self.issue(Need::Selected, &command)?;
        Ok(parse_fetches(&reply.lines))
    }

    pub fn uid_store(&mut self, uid_set: &str, query: &str) -> Result<Vec<Fetch>> {
        let command = format!(
            "UID STORE {} {}",
            validate_line(uid_set)?,
            validate_line(query)?
        );
        let reply = self.issue(Need::Selected, &command)?;
        Ok(parse_fetches(&reply.lines))
    }

    /// Adds `flags` to the messages with the given UIDs.
    pub fn add_flags(&mut self, uid_set: &str, flags: &[Flag]) -> Result<()> {
        self.uid_store(uid_set, &format!("+FLAGS.SILENT {}", flag_list(flags)))
            .map(|_| ())
    }

    /// Removes `flags` from the messages with the given UIDs.
    pub fn remove_flags(&mut self, uid_set: &str, flags: &[Flag]) -> Result<()> {
        self.uid_store(uid_set, &format!("-FLAGS.SILENT {}", flag_list(flags)))
            .map(|_| ())
    }

    /// Replaces the flags of the messages with the given UIDs.
    pub fn set_flags(&mut self, uid_set: &str, flags: &[Flag]) -> Result<()> {
        self.uid_store(uid_set, &format!("FLAGS.SILENT {}", flag_list(flags)))
            .map(|_| ())
    }

    /// Marks a message `\Deleted`. It disappears on the next [`Client::expunge`] or
    /// [`Client::close`].
    pub fn delete_message(&mut self, uid: Uid) -> Result<()> {
        self.add_flags(&uid.to_string(), &[Flag::Deleted])
    }

    /// Copy copies the specified message to the end of the specified destination mailbox.
    pub fn copy(&mut self, sequence_set: &str, mailbox_name: &str) -> Result<()> {
        let command = format!(
            "COPY {} {}",
            validate_line(sequence_set)?,
            mailbox_arg(mailbox_name)?
        );
        self.issue_ok(Need::Selected, &command)
    }

    pub fn uid_copy(&mut self, uid_set: &str, mailbox_name: &str) -> Result<()> {
        let command = format!(
            "UID COPY {} {}",
            validate_line(uid_set)?,
            mailbox_arg(mailbox_name)?
        );
        self.issue_ok(Need::Selected, &command)
    }

    /// Copies a message to another mailbox and marks the original `\Deleted`.
    pub fn move_message(&mut self, uid: Uid, mailbox_name: &str) -> Result<()> {
        self.uid_copy(&uid.to_string(), mailbox_name)?;
        self.delete_message(uid)
    }

    /// Expunge permanently removes all messages that have the \Deleted flag set from the
    /// currently selected mailbox. Returns the sequence numbers the server reported removed.
    pub fn expunge(&mut self) -> Result<Vec<Seq>> {
        let reply = self.issue(Need::Selected, "EXPUNGE")?;
        Ok(parse_expunged(&reply.lines))
    }

    /// Check requests a checkpoint of the currently selected mailbox.
    pub fn check(&mut self) -> Result<()> {
        self.issue_ok(Need::Selected, "CHECK")
    }

    /// Close permanently removes all messages that have the \Deleted flag set from the currently
    /// selected mailbox, and returns to the authenticated state from the selected state.
    pub fn close(&mut self) -> Result<()> {
        self.issue_ok(Need::Selected, "CLOSE")?;
        self.phase = Phase::Authenticated;
        self.mailbox = None;
        Ok(())
    }

    fn run_search(&mut self, command: &str, query: String) -> Result<Vec<u32>> {
        let command = format!("{} {}", command, validate_line(&query)?);
        let reply = self.issue(Need::Selected, &command)?;
        Ok(parse_ids(&reply.lines))
    }

    /// Searches the selected mailbox, returning sequence numbers.
    ///
    /// `query` is anything that renders as search criteria: a
    /// [`SearchCondition`](super::SearchCondition) or a raw string such as `"UNSEEN"`.
    pub fn search<Q: fmt::Display>(&mut self, query: Q) -> Result<Vec<Seq>> {
        self.run_search("SEARCH", query.to_string())
    }

    /// Like [`Client::search`], returning UIDs.
    pub fn uid_search<Q: fmt::Display>(&mut self, query: Q) -> Result<Vec<Uid>> {
        self.run_search("UID SEARCH", query.to_string())
    }

    /// The APPEND command adds a mail to a mailbox, with the given flags set.
    pub fn append(&mut self, mailbox_name: &str, content: &[u8], flags: &[Flag]) -> Result<()> {
        self.require(Need::Authenticated)?;
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!("{} ", flag_list(flags))
        };
        let command = format!(
            "APPEND {} {}{{{}}}",
            mailbox_arg(mailbox_name)?,
            flags,
            content.len()
        );
        let result = self.send_literal(&command, content);
        self.track(result)
    }

    /// Sends a command ending in a literal, waiting for the server's go-ahead first.
    fn send_literal(&self, command: &str, literal: &[u8]) -> Result<()> {
        let tag = self.conn.run_command(command)?;
        loop {
            let line = self.conn.read_line()?;
            match parse_response(&line) {
                Ok(Response::Continue(_)) => break,
                Ok(Response::Done { tag: ref t, status }) if *t == tag => {
                    return Err(match status.status {
                        Status::Ok => {
                            Error::Unexpected("server completed the command without a continuation".into())
                        }
                        _ => status_error(status),
                    });
                }
                _ => log::trace!("skipping line while waiting for continuation"),
            }
        }
        self.conn.write_raw(literal)?;
        self.conn.write_line(b"")?;
        self.conn.read_response(&tag).map(|_| ())
    }

    /// The quota roots of a mailbox and their usage ([RFC 2087](https://tools.ietf.org/html/rfc2087)).
    pub fn get_quota_root(&mut self, mailbox_name: &str) -> Result<Vec<QuotaRoot>> {
        let command = format!("GETQUOTAROOT {}", mailbox_arg(mailbox_name)?);
        let reply = self.issue(Need::Authenticated, &command)?;
        Ok(parse_quota(&reply.lines))
    }

    /// The usage and limits of one quota root.
    pub fn get_quota(&mut self, quota_root: &str) -> Result<Vec<QuotaRoot>> {
        let command = format!("GETQUOTA {}", quote!(validate_line(quota_root)?));
        let reply = self.issue(Need::Authenticated, &command)?;
        Ok(parse_quota(&reply.lines))
    }

    /// Subscribes to events of the selected mailbox.
    ///
    /// The first subscription puts the connection into IDLE. From then on commands fail with
    /// [`StateError::Idling`] until [`Client::pause`] is called or the last subscription is
    /// given back with [`Client::unsubscribe`].
    pub fn subscribe(&mut self) -> Result<Subscription> {
        self.reap_pump()?;
        if self.pump.is_none() {
            self.require(Need::Selected)?;
        }
        let sub = self.lock_subscribers()?.add();
        if let Err(e) = self.start_pump() {
            self.lock_subscribers()?.remove(sub.id());
            return Err(e);
        }
        Ok(sub)
    }

    /// Gives back a subscription. Once none are left, IDLE is ended.
    ///
    /// Returns the error that ended the pump, if it failed while running.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> Result<()> {
        let now_empty = {
            let mut subs = self.lock_subscribers()?;
            subs.remove(subscription.id());
            subs.is_empty()
        };
        if now_empty {
            self.stop_pump()?;
        }
        Ok(())
    }

    /// Ends IDLE so that commands can be issued. Subscriptions stay registered.
    ///
    /// Returns the error that ended the pump, if it failed while running.
    pub fn pause(&mut self) -> Result<()> {
        self.paused = true;
        self.stop_pump()
    }

    /// Re-enters IDLE if there are subscribers.
    pub fn resume(&mut self) -> Result<()> {
        self.paused = false;
        self.start_pump()
    }

    /// Pauses, runs `f`, and resumes, even if `f` failed.
    pub fn paused<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        self.pause()?;
        let result = f(self);
        let resumed = self.resume();
        let value = result?;
        resumed?;
        Ok(value)
    }

    fn lock_subscribers(&self) -> Result<std::sync::MutexGuard<'_, Subscribers>> {
        self.subscribers
            .lock()
            .map_err(|_| Error::Unexpected("subscriber list poisoned".into()))
    }

    fn start_pump(&mut self) -> Result<()> {
        if self.pump.is_some() || self.paused || self.lock_subscribers()?.is_empty() {
            return Ok(());
        }
        self.require(Need::Selected)?;
        let pump = Pump::start(
            Arc::clone(&self.conn),
            self.options.idle_keepalive,
            Arc::clone(&self.subscribers),
        );
        self.pump = Some(self.track(pump)?);
        Ok(())
    }

    fn stop_pump(&mut self) -> Result<()> {
        let Some(pump) = self.pump.take() else {
            return Ok(());
        };
        if pump.is_finished() {
            log::debug!("IDLE pump had already exited");
        }
        let result = pump.stop(&self.conn, self.options.pause_timeout);
        self.track(result)
    }

    /// Ends IDLE, stops the reader thread, and returns the stream.
    pub fn into_inner(mut self) -> Result<T> {
        self.stop_pump()?;
        let conn = Arc::clone(&self.conn);
        drop(self);
        Arc::try_unwrap(conn)
            .map_err(|_| Error::ConnectionLost)?
            .into_inner()
    }
}

impl<T: Transport> Drop for Client<T> {
    fn drop(&mut self) {
        if let Err(e) = self.stop_pump() {
            log::debug!("IDLE ended with an error on drop: {}", e);
        }
    }
}
