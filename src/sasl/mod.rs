//! SASL authenticators (RFC6120 section 6).
//!
//! Each stream owns one [`Authenticator`](enum.Authenticator.html) per offered mechanism. The
//! negotiator routes `<auth/>` and `<response/>` elements to the selected one and sends back
//! whatever element it answers with, or the `<failure/>` rendering of its error.

pub mod plain;
pub mod scram;

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use crate::error::{ConfigError, SaslError};
use crate::xml::Element;

pub use self::plain::PlainAuthenticator;
pub use self::scram::{ScramAuthenticator, ScramHash};

/// Progress of an exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Nothing received yet, or reset.
    Start,
    /// A challenge was sent and a response is awaited.
    Challenged,
    /// Succeeded or failed. Only `reset` leaves this phase.
    Done,
}

/// Decodes the base64 text of a SASL element.
///
/// Empty text, invalid base64 and non UTF-8 payloads are all `IncorrectEncoding`.
pub(crate) fn decode_payload(elem: &Element) -> Result<String, SaslError> {
    let text = elem.text().trim();
    if text.is_empty() {
        return Err(SaslError::IncorrectEncoding);
    }
    let bytes = STANDARD
        .decode(text)
        .map_err(|_| SaslError::IncorrectEncoding)?;
    String::from_utf8(bytes).map_err(|_| SaslError::IncorrectEncoding)
}

/// A mechanism family the server can be configured to offer.
///
/// Whether SCRAM is offered as `-PLUS` depends on the channel binding setting, not on the name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Mechanism {
    Plain,
    Scram(ScramHash),
}

impl Mechanism {
    /// Every mechanism, in the order they are advertised by default.
    pub const ALL: [Mechanism; 5] = [
        Mechanism::Scram(ScramHash::Sha3_512),
        Mechanism::Scram(ScramHash::Sha512),
        Mechanism::Scram(ScramHash::Sha256),
        Mechanism::Scram(ScramHash::Sha1),
        Mechanism::Plain,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Mechanism::Plain => "PLAIN",
            Mechanism::Scram(hash) => hash.mechanism(),
        }
    }

    /// Case-insensitive lookup. Underscores are accepted in place of dashes.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_uppercase().replace('_', "-");
        Mechanism::ALL.iter().copied().find(|m| m.name() == name)
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.name())
    }
}

impl TryFrom<String> for Mechanism {
    type Error = ConfigError;

    fn try_from(name: String) -> Result<Self, ConfigError> {
        Mechanism::from_name(&name).ok_or(ConfigError::InvalidValue {
            key: "sasl mechanism",
            value: name,
        })
    }
}

/// One mechanism's server-side state machine.
#[derive(Debug)]
pub enum Authenticator {
    Plain(PlainAuthenticator),
    Scram(ScramAuthenticator),
}

impl Authenticator {
    /// The advertised mechanism name.
    pub fn mechanism(&self) -> &'static str {
        match self {
            Authenticator::Plain(plain) => plain.mechanism(),
            Authenticator::Scram(scram) => scram.mechanism(),
        }
    }

    pub fn uses_channel_binding(&self) -> bool {
        match self {
            Authenticator::Plain(_) => false,
            Authenticator::Scram(scram) => scram.uses_channel_binding(),
        }
    }

    /// Feeds an `<auth/>` or `<response/>` element into the exchange.
    pub async fn process(&mut self, elem: &Element) -> Result<Element, SaslError> {
        match self {
            Authenticator::Plain(plain) => plain.process(elem).await,
            Authenticator::Scram(scram) => scram.process(elem).await,
        }
    }

    pub fn authenticated(&self) -> bool {
        match self {
            Authenticator::Plain(plain) => plain.authenticated(),
            Authenticator::Scram(scram) => scram.authenticated(),
        }
    }

    /// The authenticated username, empty unless `authenticated()`.
    pub fn username(&self) -> &str {
        match self {
            Authenticator::Plain(plain) => plain.username(),
            Authenticator::Scram(scram) => scram.username(),
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Authenticator::Plain(plain) => plain.phase(),
            Authenticator::Scram(scram) => scram.phase(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Authenticator::Plain(plain) => plain.reset(),
            Authenticator::Scram(scram) => scram.reset(),
        }
    }
}

impl From<PlainAuthenticator> for Authenticator {
    fn from(plain: PlainAuthenticator) -> Self {
        Authenticator::Plain(plain)
    }
}

impl From<ScramAuthenticator> for Authenticator {
    fn from(scram: ScramAuthenticator) -> Self {
        Authenticator::Scram(scram)
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_payload, Mechanism, ScramHash};
    use crate::error::{ConfigError, SaslError};
    use crate::xml::{ns, Element};

    fn auth(text: &str) -> Element {
        Element::builder("auth").namespace(ns::SASL).text(text).build()
    }

    #[test]
    fn test_decode_payload() {
        assert_eq!(decode_payload(&auth("biws")).unwrap(), "n,,");
        for text in &["", "  ", "***", "/w=="] {
            match decode_payload(&auth(text)) {
                Err(SaslError::IncorrectEncoding) => {}
                other => panic!("unexpected result for {:?}: {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_mechanism_names() {
        assert_eq!(Mechanism::from_name("plain"), Some(Mechanism::Plain));
        assert_eq!(
            Mechanism::from_name("scram_sha3_512"),
            Some(Mechanism::Scram(ScramHash::Sha3_512))
        );
        assert_eq!(
            Mechanism::from_name("SCRAM-SHA-1"),
            Some(Mechanism::Scram(ScramHash::Sha1))
        );
        assert_eq!(Mechanism::from_name("DIGEST-MD5"), None);
        assert_eq!(
            Mechanism::try_from("x-oauth2".to_string()).unwrap_err(),
            ConfigError::InvalidValue {
                key: "sasl mechanism",
                value: "x-oauth2".into()
            }
        );
    }
}
