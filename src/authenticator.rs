/// A pluggable SASL mechanism for [`Client::authenticate`](crate::imap::Client::authenticate).
///
/// The client takes care of the base64 layer: `process` sees each decoded server challenge and
/// returns the raw response, which the client encodes before sending it.
///
/// ```
/// struct Plain {
///     user: String,
///     password: String,
/// }
///
/// impl mailwire::Authenticator for Plain {
///     type Response = String;
///     fn process(&self, _challenge: &[u8]) -> Self::Response {
///         format!("\0{}\0{}", self.user, self.password)
///     }
/// }
/// ```
pub trait Authenticator {
    /// The response to a challenge.
    type Response: AsRef<[u8]>;

    /// Answers one challenge. An empty challenge is passed as an empty slice.
    fn process(&self, challenge: &[u8]) -> Self::Response;
}
