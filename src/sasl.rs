//! The interface shared by SASL client mechanisms.


/// A client-side SASL mechanism.
///
/// The protocol layer picks a mechanism by name and feeds it the decoded server data of every
/// continuation until the mechanism is done; the server alone decides whether the authentication
/// succeeded.
pub trait SaslMechanism {
    /// The error returned when the exchange cannot continue.
    type Error: std::error::Error;

    /// The name under which the mechanism is registered, e.g. `NTLM`.
    fn name(&self) -> &str;

    /// Whether the client sends data before the server has sent anything.
    fn has_initial_response(&self) -> bool;

    /// Advances the exchange by one step, consuming the server's data and returning the client's.
    fn respond(&mut self, server_data: &[u8]) -> Result<Vec<u8>, Self::Error>;

    /// Whether the mechanism has sent its last message.
    fn is_completed(&self) -> bool;
}
