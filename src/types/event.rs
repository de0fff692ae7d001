use super::Seq;

/// A mailbox change reported by the server while the client is idling.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum MailEvent {
    /// `* n EXISTS`: the mailbox now holds `n` messages.
    NewMessage(u32),

    /// `* n EXPUNGE`: the message with this sequence number was removed.
    Expunged(Seq),
}
