use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mailwire::{ClientBuilder, ConnectionMode, Flag, MailEvent};

/// One side of a scripted conversation with the client.
struct Server {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Server {
    fn send(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).unwrap();
        self.writer.flush().unwrap();
    }

    fn recv(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        line
    }

    /// Reads the next command, checks it starts with `command`, and returns its tag.
    fn expect(&mut self, command: &str) -> String {
        let line = self.recv();
        let (tag, rest) = line.split_once(' ').unwrap();
        assert!(
            rest.starts_with(command),
            "expected {:?}, got {:?}",
            command,
            line
        );
        tag.to_string()
    }

    fn ok(&mut self, tag: &str) {
        self.send(&format!("{} OK done\r\n", tag));
    }
}

fn serve<F>(script: F) -> (u16, JoinHandle<()>)
where
    F: FnOnce(Server) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let server = Server {
            reader: BufReader::new(stream.try_clone().unwrap()),
            writer: stream,
        };
        script(server);
    });
    (port, handle)
}

fn builder(port: u16) -> ClientBuilder<&'static str> {
    let mut builder = ClientBuilder::new("127.0.0.1", port);
    builder
        .mode(ConnectionMode::Plaintext)
        .poll_interval(Duration::from_millis(10))
        .response_timeout(Some(Duration::from_secs(5)));
    builder
}

const RAW: &str = "From: Alice <alice@example.com>\r\n\
                   Subject: =?UTF-8?B?SGVsbG8gV8O2cmxk?=\r\n\
                   Content-Type: text/plain; charset=utf-8\r\n\
                   \r\n\
                   Hi there\r\n";

#[test]
fn login_select_and_fetch() {
    let (port, server) = serve(|mut s| {
        s.send("* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n");
        let tag = s.expect("LOGIN \"alice\" \"secret\"");
        s.ok(&tag);
        let tag = s.expect("SELECT \"INBOX\"");
        s.send("* 3 EXISTS\r\n* 0 RECENT\r\n* FLAGS (\\Seen \\Deleted)\r\n");
        s.send("* OK [UIDVALIDITY 1] ok\r\n");
        s.send(&format!("{} OK [READ-WRITE] SELECT completed\r\n", tag));
        let tag = s.expect("FETCH 1 ");
        s.send(&format!(
            "* 1 FETCH (UID 11 FLAGS (\\Seen) BODY[] {{{}}}\r\n{})\r\n",
            RAW.len(),
            RAW
        ));
        s.ok(&tag);
        let tag = s.expect("LOGOUT");
        s.send("* BYE logging out\r\n");
        s.ok(&tag);
    });

    let mut client = builder(port).connect().unwrap();
    client.login("alice", "secret").unwrap();
    let inbox = client.select("INBOX").unwrap();
    assert_eq!(inbox.exists, 3);
    assert_eq!(inbox.uid_validity, Some(1));

    let message = client.fetch_message(1).unwrap();
    assert_eq!(message.uid, Some(11));
    assert_eq!(message.flags, vec![Flag::Seen]);
    assert_eq!(message.subject(), Some("Hello Wörld"));
    assert_eq!(message.from()[0].address, "alice@example.com");
    assert_eq!(message.body_text(), "Hi there\r\n");

    client.logout().unwrap();
    server.join().unwrap();
}

#[test]
fn idle_events_reach_subscribers() {
    let (port, server) = serve(|mut s| {
        s.send("* OK ready\r\n");
        let tag = s.expect("LOGIN");
        s.ok(&tag);
        let tag = s.expect("SELECT");
        s.send("* 1 EXISTS\r\n");
        s.ok(&tag);

        let idle = s.expect("IDLE");
        s.send("+ idling\r\n");
        s.send("* 2 EXISTS\r\n* 1 EXPUNGE\r\n");
        assert_eq!(s.recv(), "DONE\r\n");
        s.ok(&idle);

        let tag = s.expect("NOOP");
        s.ok(&tag);

        let idle = s.expect("IDLE");
        s.send("+ idling\r\n");
        assert_eq!(s.recv(), "DONE\r\n");
        s.ok(&idle);

        let tag = s.expect("LOGOUT");
        s.ok(&tag);
    });

    let mut client = builder(port).connect().unwrap();
    client.login("bob", "pw").unwrap();
    client.select("INBOX").unwrap();

    let events = client.subscribe().unwrap();
    let timeout = Duration::from_secs(5);
    assert_eq!(events.recv_timeout(timeout), Some(MailEvent::NewMessage(2)));
    assert_eq!(events.recv_timeout(timeout), Some(MailEvent::Expunged(1)));

    client.paused(|c| c.noop()).unwrap();
    assert!(!client.is_paused());

    client.unsubscribe(events).unwrap();
    client.logout().unwrap();
    server.join().unwrap();
}

#[test]
fn rejected_login_is_reported() {
    let (port, server) = serve(|mut s| {
        s.send("* OK ready\r\n");
        let tag = s.expect("LOGIN");
        s.send(&format!("{} NO [AUTHENTICATIONFAILED] bad credentials\r\n", tag));
    });

    let mut client = builder(port).connect().unwrap();
    match client.login("eve", "guess") {
        Err(mailwire::Error::No(text)) => assert!(text.contains("bad credentials")),
        other => panic!("expected NO, got {:?}", other),
    }
    server.join().unwrap();
}
