//! The NTLM SASL mechanism: a two-step state machine turning credentials and a server challenge
//! into the Negotiate and Authenticate messages.


use tracing::{debug, trace, warn};

use crate::{Credentials, Flags};
use crate::crypto::{
    ChallengeResponse, get_ntlm_time, random_client_challenge, respond_challenge_classic,
    respond_challenge_extended, respond_challenge_ntlm_v2,
};
use crate::error::Error;
use crate::message::{AuthenticateMessage, ChallengeMessage, NegotiateMessage, OsVersion};
use crate::sasl::SaslMechanism;


/// Where an NTLM exchange stands.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum MechanismState {
    /// Nothing has been sent yet; the next step produces the Negotiate message.
    AwaitingStart,

    /// The Negotiate message has been sent; the next step consumes the server's Challenge.
    AwaitingChallenge,

    /// The Authenticate message has been sent, or the exchange failed.
    Completed,
}

/// Which domain to send in the Authenticate message when the credentials have none.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum DomainFallback {
    /// Send an empty domain.
    #[default]
    Empty,

    /// Send the target name from the server's Challenge message.
    TargetName,
}

/// How the responses to the server challenge are calculated.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ResponseScheme {
    /// The 24-byte LM and NT responses.
    #[default]
    Classic,

    /// The NTLM2 session response. The server only accepts it if
    /// [`Flags::NEGOTIATE_NTLM2_KEY`] has been negotiated.
    ExtendedSessionSecurity,

    /// The NTLMv2 response, covering the target information and a timestamp.
    NtlmV2,
}

/// Settings of an NTLM exchange beyond the credentials.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct NtlmSettings {
    /// The name of the client machine, sent in both client messages.
    pub workstation: String,

    /// The domain sent in the Negotiate message if the credentials have none.
    pub negotiate_domain: String,

    /// The flags sent in the Negotiate message.
    pub negotiate_flags: Flags,

    /// The flags sent in the Authenticate message.
    pub authenticate_flags: Flags,

    /// The OS version announced in both client messages.
    pub os_version: Option<OsVersion>,

    pub domain_fallback: DomainFallback,
    pub response_scheme: ResponseScheme,
}
impl Default for NtlmSettings {
    fn default() -> Self {
        Self {
            workstation: "workstation".to_owned(),
            negotiate_domain: "domain".to_owned(),
            negotiate_flags: Flags::NEGOTIATE_UNICODE
                | Flags::REQUEST_TARGET
                | Flags::NEGOTIATE_NTLM
                | Flags::NEGOTIATE_DOMAIN_SUPPLIED
                | Flags::NEGOTIATE_WORKSTATION_SUPPLIED,
            authenticate_flags: Flags::empty(),
            os_version: Some(OsVersion::WINDOWS_7_SP1),
            domain_fallback: DomainFallback::default(),
            response_scheme: ResponseScheme::default(),
        }
    }
}
impl NtlmSettings {
    pub fn with_workstation<S: Into<String>>(mut self, workstation: S) -> Self {
        self.workstation = workstation.into();
        self
    }

    pub fn with_negotiate_domain<S: Into<String>>(mut self, domain: S) -> Self {
        self.negotiate_domain = domain.into();
        self
    }

    pub fn with_negotiate_flags(mut self, flags: Flags) -> Self {
        self.negotiate_flags = flags;
        self
    }

    pub fn with_authenticate_flags(mut self, flags: Flags) -> Self {
        self.authenticate_flags = flags;
        self
    }

    pub fn with_os_version(mut self, os_version: Option<OsVersion>) -> Self {
        self.os_version = os_version;
        self
    }

    pub fn with_domain_fallback(mut self, domain_fallback: DomainFallback) -> Self {
        self.domain_fallback = domain_fallback;
        self
    }

    pub fn with_response_scheme(mut self, response_scheme: ResponseScheme) -> Self {
        self.response_scheme = response_scheme;
        self
    }
}


/// The NTLM SASL mechanism.
///
/// One instance performs exactly one Negotiate/Challenge/Authenticate round. It does not look at
/// the server's verdict after the Authenticate message; that is up to the surrounding protocol.
#[derive(Clone, Debug)]
pub struct NtlmMechanism {
    credentials: Credentials,
    settings: NtlmSettings,
    state: MechanismState,
}

impl NtlmMechanism {
    /// Creates a mechanism authenticating as `username` without a domain, with default settings.
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self::with_settings(Credentials::new(username, password), NtlmSettings::default())
    }

    pub fn with_settings(credentials: Credentials, settings: NtlmSettings) -> Self {
        Self {
            credentials,
            settings,
            state: MechanismState::AwaitingStart,
        }
    }

    pub fn state(&self) -> MechanismState {
        self.state
    }

    pub fn settings(&self) -> &NtlmSettings {
        &self.settings
    }

    /// Performs the next step of the exchange.
    ///
    /// The first call ignores `input` and returns the Negotiate message; the second call expects
    /// the server's Challenge message and returns the Authenticate message. Any further call fails
    /// with [`Error::IllegalState`], as does any call after a failed step.
    pub fn respond(&mut self, input: &[u8]) -> Result<Vec<u8>, Error> {
        let step = match self.state {
            MechanismState::AwaitingStart => {
                if !input.is_empty() {
                    trace!(input_len = input.len(), "ignoring server data before NTLM negotiation");
                }
                self.negotiate()
                    .map(|msg| (msg, MechanismState::AwaitingChallenge))
            },
            MechanismState::AwaitingChallenge => self.authenticate(input)
                .map(|msg| (msg, MechanismState::Completed)),
            MechanismState::Completed => {
                warn!("NTLM mechanism driven after completion");
                return Err(Error::IllegalState { state: self.state });
            },
        };

        match step {
            Ok((msg, next_state)) => {
                debug!(from = ?self.state, to = ?next_state, len = msg.len(), "NTLM step done");
                self.state = next_state;
                Ok(msg)
            },
            Err(e) => {
                warn!(state = ?self.state, error = %e, "NTLM exchange aborted");
                self.state = MechanismState::Completed;
                Err(e)
            },
        }
    }

    fn negotiate(&self) -> Result<Vec<u8>, Error> {
        let supplied_domain = if self.credentials.domain.is_empty() {
            self.settings.negotiate_domain.clone()
        } else {
            self.credentials.domain.clone()
        };
        let msg = NegotiateMessage {
            flags: self.settings.negotiate_flags,
            supplied_domain,
            supplied_workstation: self.settings.workstation.clone(),
            os_version: self.settings.os_version,
        };
        Ok(msg.to_bytes()?)
    }

    fn authenticate(&self, input: &[u8]) -> Result<Vec<u8>, Error> {
        let challenge = ChallengeMessage::try_from(input)?;
        let domain_name = self.authenticate_domain(&challenge);
        let response = self.compute_response(&challenge, &domain_name)?;

        let msg = AuthenticateMessage {
            lm_response: response.lm_response,
            nt_response: response.nt_response,
            domain_name,
            user_name: self.credentials.username.clone(),
            workstation_name: self.settings.workstation.clone(),
            // no key exchange is negotiated, so the session key stays empty
            session_key: Some(Vec::new()),
            flags: Some(self.settings.authenticate_flags),
            os_version: self.settings.os_version,
        };
        Ok(msg.to_bytes()?)
    }

    fn authenticate_domain(&self, challenge: &ChallengeMessage) -> String {
        if !self.credentials.domain.is_empty() {
            return self.credentials.domain.clone();
        }
        match self.settings.domain_fallback {
            DomainFallback::Empty => String::new(),
            DomainFallback::TargetName => challenge.target_name.clone(),
        }
    }

    fn compute_response(&self, challenge: &ChallengeMessage, domain_name: &str) -> Result<ChallengeResponse, Error> {
        let password = &self.credentials.password;
        let response = match self.settings.response_scheme {
            ResponseScheme::Classic => respond_challenge_classic(&challenge.challenge, password)?,
            ResponseScheme::ExtendedSessionSecurity => respond_challenge_extended(
                &challenge.challenge,
                random_client_challenge(),
                password,
            )?,
            ResponseScheme::NtlmV2 => {
                let creds = Credentials {
                    domain: domain_name.to_owned(),
                    ..self.credentials.clone()
                };
                // prefer the server's clock if it sent it
                let time = challenge.target_information.timestamp()
                    .unwrap_or_else(get_ntlm_time);
                respond_challenge_ntlm_v2(
                    &challenge.challenge,
                    random_client_challenge(),
                    &challenge.target_information.to_bytes()?,
                    time,
                    &creds,
                )?
            },
        };
        Ok(response)
    }
}

impl SaslMechanism for NtlmMechanism {
    type Error = Error;

    fn name(&self) -> &str {
        "NTLM"
    }

    fn has_initial_response(&self) -> bool {
        true
    }

    fn respond(&mut self, server_data: &[u8]) -> Result<Vec<u8>, Self::Error> {
        NtlmMechanism::respond(self, server_data)
    }

    fn is_completed(&self) -> bool {
        self.state == MechanismState::Completed
    }
}
