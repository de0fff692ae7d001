use super::capabilities::capability_atom;
use super::Flag;

/// The bracketed [response code](https://tools.ietf.org/html/rfc3501#section-7.1) that may
/// follow `OK`, `NO`, `BAD`, `PREAUTH` or `BYE`.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ResponseCode {
    /// A message the server wants shown to the user.
    Alert,
    /// The server failed to parse a message's headers.
    Parse,
    /// The mailbox is selected read-only.
    ReadOnly,
    /// The mailbox is selected read-write.
    ReadWrite,
    /// The target mailbox of an `APPEND` or `COPY` does not exist but may be created.
    TryCreate,
    /// The flags the client may change permanently.
    PermanentFlags(Vec<Flag>),
    /// The next unique identifier value.
    UidNext(u32),
    /// The unique identifier validity value.
    UidValidity(u32),
    /// The sequence number of the first message without `\Seen`.
    Unseen(u32),
    /// The server's capabilities, sent alongside a greeting or login.
    Capabilities(Vec<String>),
    /// Any other code `imap-proto` recognises, in its debug rendering.
    ///
    /// Codes it does not recognise stay in the response text.
    Other(String),
}

impl<'a> From<imap_proto::ResponseCode<'a>> for ResponseCode {
    fn from(r: imap_proto::ResponseCode<'a>) -> Self {
        use imap_proto::ResponseCode as Code;
        match r {
            Code::Alert => ResponseCode::Alert,
            Code::Parse => ResponseCode::Parse,
            Code::ReadOnly => ResponseCode::ReadOnly,
            Code::ReadWrite => ResponseCode::ReadWrite,
            Code::TryCreate => ResponseCode::TryCreate,
            Code::PermanentFlags(v) => {
                ResponseCode::PermanentFlags(v.iter().map(|f| Flag::from(&**f)).collect())
            }
            Code::UidNext(n) => ResponseCode::UidNext(n),
            Code::UidValidity(n) => ResponseCode::UidValidity(n),
            Code::Unseen(n) => ResponseCode::Unseen(n),
            Code::Capabilities(caps) => {
                ResponseCode::Capabilities(caps.iter().map(capability_atom).collect())
            }
            other => ResponseCode::Other(format!("{:?}", other)),
        }
    }
}
