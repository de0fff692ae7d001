//! IMAP response parsing on top of `imap-proto`.
//!
//! Every logical line the reader hands over (literals included) is one complete response.
//! [`parse_response`] classifies a line for the correlator and the IDLE pump; the `parse_*`
//! functions pick typed data out of the untagged lines a command produced.

use std::borrow::Cow;

use imap_proto::{AttributeValue, MailboxDatum, MessageSection, SectionPath, StatusAttribute};
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, ParseError, Result};
use crate::mime::date::parse_internal_date;
use crate::types::*;
use crate::utf7;

/// The status of a tagged or untagged status response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Status {
    Ok,
    No,
    Bad,
    PreAuth,
    Bye,
}

impl From<imap_proto::Status> for Status {
    fn from(status: imap_proto::Status) -> Self {
        match status {
            imap_proto::Status::Ok => Status::Ok,
            imap_proto::Status::No => Status::No,
            imap_proto::Status::Bad => Status::Bad,
            imap_proto::Status::PreAuth => Status::PreAuth,
            imap_proto::Status::Bye => Status::Bye,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StatusResponse {
    pub(crate) status: Status,
    pub(crate) code: Option<ResponseCode>,
    pub(crate) text: String,
}

impl StatusResponse {
    fn new(
        status: imap_proto::Status,
        code: Option<imap_proto::ResponseCode<'_>>,
        information: Option<Cow<'_, str>>,
    ) -> Self {
        StatusResponse {
            status: status.into(),
            code: code.map(ResponseCode::from),
            text: information.map(|s| s.trim().to_string()).unwrap_or_default(),
        }
    }
}

/// One parsed server response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Response {
    /// `<tag> OK|NO|BAD ...`
    Done { tag: String, status: StatusResponse },
    /// `+ ...`
    Continue(String),
    /// `* ...`
    Data(Data),
}

/// The untagged responses the session and the IDLE pump act on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Data {
    Status(StatusResponse),
    Exists(u32),
    Recent(u32),
    Expunge(Seq),
    /// Anything else, as received.
    Other(String),
}

fn invalid(line: &[u8]) -> Error {
    Error::Parse(ParseError::Invalid(line.to_vec()))
}

/// `imap-proto` insists on CRLF; some servers end lines with a bare LF.
fn with_crlf(line: &[u8]) -> Cow<'_, [u8]> {
    if line.ends_with(b"\r\n") {
        return Cow::Borrowed(line);
    }
    let mut owned = line.strip_suffix(b"\n").unwrap_or(line).to_vec();
    owned.extend_from_slice(b"\r\n");
    Cow::Owned(owned)
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).trim_end().to_string()
}

/// Status lines `imap-proto` rejects, such as `a1 OK` with no text.
fn bare_status(line: &[u8]) -> Option<Response> {
    let text = std::str::from_utf8(line).ok()?.trim_end();
    let mut words = text.splitn(3, ' ');
    let tag = words.next()?;
    let status = match words.next()?.to_ascii_uppercase().as_str() {
        "OK" => Status::Ok,
        "NO" => Status::No,
        "BAD" => Status::Bad,
        "PREAUTH" => Status::PreAuth,
        "BYE" => Status::Bye,
        _ => return None,
    };
    let status = StatusResponse {
        status,
        code: None,
        text: words.next().unwrap_or("").trim().to_string(),
    };
    Some(match tag {
        "" | "+" => return None,
        "*" => Response::Data(Data::Status(status)),
        tag => Response::Done {
            tag: tag.to_string(),
            status,
        },
    })
}

/// Parses one logical response line.
pub(crate) fn parse_response(line: &[u8]) -> Result<Response> {
    let normalized = with_crlf(line);
    let response = match imap_proto::parser::parse_response(&normalized) {
        Ok((_, response)) => response,
        Err(_) if line.starts_with(b"+") => {
            let text = lossy(&line[1..]);
            return Ok(Response::Continue(text.trim_start().to_string()));
        }
        Err(_) => {
            if let Some(response) = bare_status(line) {
                return Ok(response);
            }
            if line.starts_with(b"* ") {
                return Ok(Response::Data(Data::Other(lossy(line))));
            }
            return Err(invalid(line));
        }
    };

    Ok(match response {
        imap_proto::Response::Done {
            tag,
            status,
            code,
            information,
        } => Response::Done {
            tag: tag.0,
            status: StatusResponse::new(status, code, information),
        },
        imap_proto::Response::Continue { information, .. } => Response::Continue(
            information
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
        ),
        imap_proto::Response::Data {
            status,
            code,
            information,
        } => Response::Data(Data::Status(StatusResponse::new(status, code, information))),
        imap_proto::Response::MailboxData(MailboxDatum::Exists(n)) => Response::Data(Data::Exists(n)),
        imap_proto::Response::MailboxData(MailboxDatum::Recent(n)) => Response::Data(Data::Recent(n)),
        imap_proto::Response::Expunge(n) => Response::Data(Data::Expunge(n)),
        _ => Response::Data(Data::Other(lossy(line))),
    })
}

/// Extracts the base64 challenge from an `AUTHENTICATE` continuation line.
pub(crate) fn parse_authenticate_response(line: &[u8]) -> Result<String> {
    lazy_static! {
        static ref AUTHENTICATE_RE: Regex = Regex::new("^\\+ ?(.*)\r\n").unwrap();
    }

    let line = String::from_utf8_lossy(&with_crlf(line)).into_owned();
    if let Some(cap) = AUTHENTICATE_RE.captures(&line) {
        let data = cap.get(1).map(|x| x.as_str()).unwrap_or("");
        return Ok(String::from(data));
    }

    Err(Error::Parse(ParseError::Authentication(line, None)))
}

/// Hands every line that `imap-proto` understands to `f`, logging the rest.
fn each_response<F>(lines: &[Vec<u8>], mut f: F)
where
    F: FnMut(imap_proto::Response<'_>),
{
    for line in lines {
        let line = with_crlf(line);
        match imap_proto::parser::parse_response(&line) {
            Ok((_, response)) => f(response),
            Err(_) => log::debug!(
                "skipping unparseable response {:?}",
                String::from_utf8_lossy(&line)
            ),
        }
    }
}

fn parse_many<T, F>(lines: &[Vec<u8>], mut map: F) -> Vec<T>
where
    F: FnMut(imap_proto::Response<'_>) -> Option<T>,
{
    let mut things = Vec::new();
    each_response(lines, |response| things.extend(map(response)));
    things
}

fn mailbox_name(raw: &str) -> String {
    match utf7::decode(raw) {
        Ok(name) => name,
        Err(_) => {
            log::warn!("mailbox name {:?} is not valid modified UTF-7", raw);
            raw.to_string()
        }
    }
}

pub(crate) fn parse_capabilities(lines: &[Vec<u8>], code: Option<&ResponseCode>) -> Capabilities {
    let mut atoms: Vec<String> = parse_many(lines, |response| match response {
        imap_proto::Response::Capabilities(caps) => {
            Some(caps.iter().map(capability_atom).collect::<Vec<_>>())
        }
        imap_proto::Response::Data {
            code: Some(imap_proto::ResponseCode::Capabilities(caps)),
            ..
        } => Some(caps.iter().map(capability_atom).collect()),
        _ => None,
    })
    .into_iter()
    .flatten()
    .collect();
    if let Some(ResponseCode::Capabilities(caps)) = code {
        atoms.extend(caps.iter().cloned());
    }
    Capabilities::from_atoms(atoms.iter().map(String::as_str))
}

fn apply_code(mailbox: &mut Mailbox, code: &ResponseCode) {
    match code {
        ResponseCode::UidNext(n) => mailbox.uid_next = Some(*n),
        ResponseCode::UidValidity(n) => mailbox.uid_validity = Some(*n),
        ResponseCode::Unseen(n) => mailbox.unseen = Some(*n),
        ResponseCode::PermanentFlags(flags) => mailbox.permanent_flags = flags.clone(),
        ResponseCode::ReadOnly => mailbox.read_only = true,
        ResponseCode::ReadWrite => mailbox.read_only = false,
        _ => {}
    }
}

/// Builds a [`Mailbox`] from the responses to `SELECT` or `EXAMINE`.
pub(crate) fn parse_mailbox(name: &str, lines: &[Vec<u8>], code: Option<&ResponseCode>) -> Mailbox {
    let mut mailbox = Mailbox::named(name);
    each_response(lines, |response| match response {
        imap_proto::Response::Data {
            code: Some(code), ..
        } => apply_code(&mut mailbox, &ResponseCode::from(code)),
        imap_proto::Response::MailboxData(MailboxDatum::Exists(n)) => mailbox.exists = n,
        imap_proto::Response::MailboxData(MailboxDatum::Recent(n)) => mailbox.recent = n,
        imap_proto::Response::MailboxData(MailboxDatum::Flags(flags)) => {
            mailbox.flags = flags.iter().map(|f| Flag::from(&**f)).collect()
        }
        _ => {}
    });
    if let Some(code) = code {
        apply_code(&mut mailbox, code);
    }
    mailbox
}

/// Builds a [`Mailbox`] from a `STATUS` response.
pub(crate) fn parse_status(name: &str, lines: &[Vec<u8>]) -> Mailbox {
    let mut mailbox = Mailbox::named(name);
    each_response(lines, |response| {
        if let imap_proto::Response::MailboxData(MailboxDatum::Status { status, .. }) = response {
            for attr in status {
                match attr {
                    StatusAttribute::Messages(n) => mailbox.exists = n,
                    StatusAttribute::Recent(n) => mailbox.recent = n,
                    StatusAttribute::Unseen(n) => mailbox.unseen = Some(n),
                    StatusAttribute::UidNext(n) => mailbox.uid_next = Some(n),
                    StatusAttribute::UidValidity(n) => mailbox.uid_validity = Some(n),
                    _ => {}
                }
            }
        }
    });
    mailbox
}

/// `LIST` and `LSUB` entries, with names decoded from modified UTF-7.
pub(crate) fn parse_names(lines: &[Vec<u8>]) -> Vec<Name> {
    parse_many(lines, |response| match response {
        imap_proto::Response::MailboxData(MailboxDatum::List {
            name_attributes,
            delimiter,
            name,
        }) => Some(Name {
            attributes: name_attributes.into_iter().map(NameAttribute::from).collect(),
            delimiter: delimiter.map(Cow::into_owned),
            name: mailbox_name(&name),
        }),
        _ => None,
    })
}

fn bytes(data: Option<Cow<'_, [u8]>>) -> Option<Vec<u8>> {
    data.map(Cow::into_owned)
}

pub(crate) fn parse_fetches(lines: &[Vec<u8>]) -> Vec<Fetch> {
    parse_many(lines, |response| match response {
        imap_proto::Response::Fetch(message, attrs) => {
            let mut fetch = Fetch {
                message,
                ..Fetch::default()
            };
            for attr in attrs {
                match attr {
                    AttributeValue::Uid(uid) => fetch.uid = Some(uid),
                    AttributeValue::Rfc822Size(size) => fetch.size = Some(size),
                    AttributeValue::Flags(flags) => {
                        fetch.flags = flags.iter().map(|f| Flag::from(&**f)).collect()
                    }
                    AttributeValue::InternalDate(date) => {
                        fetch.internal_date = parse_internal_date(&date)
                    }
                    AttributeValue::Rfc822(data) => fetch.body = bytes(data),
                    AttributeValue::Rfc822Header(data) => fetch.header = bytes(data),
                    AttributeValue::BodySection {
                        section: None,
                        data,
                        ..
                    } => fetch.body = bytes(data),
                    AttributeValue::BodySection {
                        section: Some(SectionPath::Full(MessageSection::Header)),
                        data,
                        ..
                    } => fetch.header = bytes(data),
                    AttributeValue::BodySection {
                        section: Some(SectionPath::Full(MessageSection::Text)),
                        data,
                        ..
                    } => fetch.text = bytes(data),
                    other => log::trace!("ignoring fetch item {:?}", other),
                }
            }
            Some(fetch)
        }
        _ => None,
    })
}

pub(crate) fn parse_ids(lines: &[Vec<u8>]) -> Vec<u32> {
    parse_many(lines, |response| match response {
        imap_proto::Response::MailboxData(MailboxDatum::Search(ids)) => Some(ids),
        _ => None,
    })
    .into_iter()
    .flatten()
    .collect()
}

/// The sequence numbers reported by `EXPUNGE` responses, in arrival order.
pub(crate) fn parse_expunged(lines: &[Vec<u8>]) -> Vec<Seq> {
    parse_many(lines, |response| match response {
        imap_proto::Response::Expunge(n) => Some(n),
        _ => None,
    })
}

/// Joins `QUOTA` responses into one entry per resource.
pub(crate) fn parse_quota(lines: &[Vec<u8>]) -> Vec<QuotaRoot> {
    parse_many(lines, |response| match response {
        imap_proto::Response::Quota(quota) => Some(
            quota
                .resources
                .iter()
                .map(|resource| QuotaRoot {
                    name: quota.root_name.to_string(),
                    resource: QuotaResourceName::from(&resource.name),
                    used: resource.usage,
                    max: resource.limit,
                })
                .collect::<Vec<_>>(),
        ),
        _ => None,
    })
    .into_iter()
    .flatten()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<Vec<u8>> {
        raw.iter().map(|l| l.as_bytes().to_vec()).collect()
    }

    #[test]
    fn tagged_completion() {
        let r = parse_response(b"xm001 NO [TRYCREATE] No such mailbox\r\n").unwrap();
        assert_eq!(
            r,
            Response::Done {
                tag: "xm001".into(),
                status: StatusResponse {
                    status: Status::No,
                    code: Some(ResponseCode::TryCreate),
                    text: "No such mailbox".into(),
                },
            }
        );
        assert!(parse_response(b"xm001 MAYBE\r\n").is_err());
    }

    #[test]
    fn status_without_text() {
        assert_eq!(
            parse_response(b"xm007 OK\r\n").unwrap(),
            Response::Done {
                tag: "xm007".into(),
                status: StatusResponse {
                    status: Status::Ok,
                    code: None,
                    text: String::new(),
                },
            }
        );
        assert!(matches!(
            parse_response(b"* BYE\r\n").unwrap(),
            Response::Data(Data::Status(StatusResponse {
                status: Status::Bye,
                ..
            }))
        ));
    }

    #[test]
    fn bare_lf_is_accepted() {
        assert_eq!(
            parse_response(b"* 3 EXISTS\n").unwrap(),
            Response::Data(Data::Exists(3))
        );
    }

    #[test]
    fn continuation() {
        assert_eq!(
            parse_response(b"+ idling\r\n").unwrap(),
            Response::Continue("idling".into())
        );
        assert_eq!(parse_authenticate_response(b"+ YWJj\r\n").unwrap(), "YWJj");
        assert_eq!(parse_authenticate_response(b"+\r\n").unwrap(), "");
        assert!(parse_authenticate_response(b"* OK\r\n").is_err());
    }

    #[test]
    fn untagged_counts() {
        assert_eq!(
            parse_response(b"* 23 EXISTS\r\n").unwrap(),
            Response::Data(Data::Exists(23))
        );
        assert_eq!(
            parse_response(b"* 4 EXPUNGE\r\n").unwrap(),
            Response::Data(Data::Expunge(4))
        );
        assert_eq!(
            parse_expunged(&lines(&["* 4 EXPUNGE\r\n", "* 2 EXISTS\r\n", "* 4 EXPUNGE\r\n"])),
            vec![4, 4]
        );
    }

    #[test]
    fn capabilities() {
        let caps = parse_capabilities(
            &lines(&["* CAPABILITY IMAP4rev1 STARTTLS AUTH=PLAIN\r\n"]),
            None,
        );
        assert!(caps.has_str("imap4rev1"));
        assert!(caps.has_str("AUTH=PLAIN"));
        assert_eq!(caps.len(), 3);

        let code = ResponseCode::Capabilities(vec!["IDLE".into()]);
        assert!(parse_capabilities(&[], Some(&code)).has_str("IDLE"));
    }

    #[test]
    fn select_response() {
        let mailbox = parse_mailbox(
            "INBOX",
            &lines(&[
                "* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n",
                "* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n",
                "* 172 EXISTS\r\n",
                "* 1 RECENT\r\n",
                "* OK [UNSEEN 12] Message 12 is first unseen\r\n",
                "* OK [UIDVALIDITY 3857529045] UIDs valid\r\n",
                "* OK [UIDNEXT 4392] Predicted next UID\r\n",
            ]),
            Some(&ResponseCode::ReadOnly),
        );
        assert_eq!(mailbox.exists, 172);
        assert_eq!(mailbox.recent, 1);
        assert_eq!(mailbox.unseen, Some(12));
        assert_eq!(mailbox.uid_validity, Some(3857529045));
        assert_eq!(mailbox.uid_next, Some(4392));
        assert_eq!(mailbox.flags.len(), 5);
        assert_eq!(
            mailbox.permanent_flags,
            vec![Flag::Deleted, Flag::Seen, Flag::MayCreate]
        );
        assert!(mailbox.read_only);
    }

    #[test]
    fn status_response() {
        let mailbox = parse_status(
            "blurdybloop",
            &lines(&["* STATUS blurdybloop (MESSAGES 231 UIDNEXT 44292)\r\n"]),
        );
        assert_eq!(mailbox.exists, 231);
        assert_eq!(mailbox.uid_next, Some(44292));
    }

    #[test]
    fn list_names_are_decoded() {
        let names = parse_names(&lines(&[
            "* LIST (\\HasNoChildren) \"/\" \"Entw&APw-rfe\"\r\n",
            "* LIST (\\Noselect) NIL INBOX\r\n",
        ]));
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].name(), "Entwürfe");
        assert_eq!(names[0].delimiter(), Some("/"));
        assert_eq!(
            names[0].attributes(),
            &[NameAttribute::Custom("\\HasNoChildren".into())]
        );
        assert_eq!(names[1].delimiter(), None);
        assert_eq!(names[1].attributes(), &[NameAttribute::NoSelect]);
    }

    #[test]
    fn fetch_with_literal() {
        let fetches = parse_fetches(&lines(&[
            "* 12 FETCH (UID 4827 RFC822.SIZE 5 FLAGS (\\Seen) INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" BODY[] {5}\r\nAB\r\nC)\r\n",
            "* 13 FETCH (UID 4828 BODY[HEADER] NIL)\r\n",
        ]));
        assert_eq!(fetches.len(), 2);
        let f = &fetches[0];
        assert_eq!((f.message, f.uid, f.size), (12, Some(4827), Some(5)));
        assert_eq!(f.flags, vec![Flag::Seen]);
        assert!(f.internal_date.is_some());
        assert_eq!(f.body.as_deref(), Some(&b"AB\r\nC"[..]));
        assert_eq!(fetches[1].header, None);
    }

    #[test]
    fn fetch_section_with_fields() {
        let fetches = parse_fetches(&lines(&[
            "* 1 FETCH (BODY[HEADER.FIELDS (SUBJECT)] {11}\r\nSubject: x\n UID 9)\r\n",
        ]));
        assert_eq!(fetches[0].header.as_deref(), Some(&b"Subject: x\n"[..]));
        assert_eq!(fetches[0].uid, Some(9));
    }

    #[test]
    fn fetches_skip_unilateral_lines() {
        let fetches = parse_fetches(&lines(&["* 37 FETCH (UID 74)\r\n", "* 1 RECENT\r\n"]));
        assert_eq!(fetches.len(), 1);
        assert_eq!(fetches[0].uid, Some(74));
    }

    #[test]
    fn search_and_quota() {
        assert_eq!(
            parse_ids(&lines(&["* SEARCH 2 84 882\r\n", "* SEARCH\r\n"])),
            vec![2, 84, 882]
        );
        let quota = parse_quota(&lines(&[
            "* QUOTAROOT INBOX \"\"\r\n",
            "* QUOTA \"\" (STORAGE 10 512 MESSAGE 1 100)\r\n",
        ]));
        assert_eq!(quota.len(), 2);
        assert_eq!(quota[0].resource, QuotaResourceName::Storage);
        assert_eq!((quota[0].used, quota[0].max), (10, 512));
        assert_eq!(quota[1].name, "");
    }

    #[test]
    fn unknown_untagged_is_kept() {
        assert!(matches!(
            parse_response(b"* XYZZY plugh\r\n").unwrap(),
            Response::Data(Data::Other(_))
        ));
    }
}
