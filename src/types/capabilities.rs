use std::collections::HashSet;

/// From [section 7.2.1 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-7.2.1).
///
/// A list of capabilities that the server supports.
/// The capability list will include the atom "IMAP4rev1".
///
/// For POP3 the list is the `CAPA` response, one capability line per entry.
///
/// Capability names are compared case-insensitively.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Capabilities(pub(crate) HashSet<String>);

impl Capabilities {
    pub(crate) fn from_atoms<'a>(atoms: impl IntoIterator<Item = &'a str>) -> Self {
        Capabilities(atoms.into_iter().map(str::to_ascii_uppercase).collect())
    }

    /// Check if the server has the given capability.
    pub fn has_str<S: AsRef<str>>(&self, cap: S) -> bool {
        self.0.contains(&cap.as_ref().to_ascii_uppercase())
    }

    /// Iterate over all the server's capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns how many capabilities the server has.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the server purports to have no capabilities.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The atom a server sent for `cap`, e.g. `AUTH=PLAIN`.
pub(crate) fn capability_atom(cap: &imap_proto::Capability<'_>) -> String {
    match cap {
        imap_proto::Capability::Imap4rev1 => "IMAP4rev1".to_string(),
        imap_proto::Capability::Auth(mech) => format!("AUTH={}", mech),
        imap_proto::Capability::Atom(atom) => atom.to_string(),
    }
}
