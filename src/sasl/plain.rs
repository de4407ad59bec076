//! The PLAIN mechanism (RFC4616), verified by an external credential oracle.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};

use crate::error::SaslError;
use crate::oracle::CredentialOracle;
use crate::xml::{ns, Element};

use super::Phase;

enum State {
    Start,
    Authenticated(String),
    Failed,
}

/// Server's side of PLAIN for one stream.
///
/// The payload is `authzid NUL authcid NUL password`. The authzid is accepted but ignored.
pub struct PlainAuthenticator {
    oracle: Arc<dyn CredentialOracle>,
    state: State,
}

impl PlainAuthenticator {
    pub fn new(oracle: Arc<dyn CredentialOracle>) -> Self {
        PlainAuthenticator {
            oracle: oracle,
            state: State::Start,
        }
    }

    pub fn mechanism(&self) -> &'static str {
        "PLAIN"
    }

    pub fn authenticated(&self) -> bool {
        matches!(self.state, State::Authenticated(_))
    }

    pub fn username(&self) -> &str {
        match self.state {
            State::Authenticated(ref username) => username,
            _ => "",
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Start => Phase::Start,
            State::Authenticated(_) | State::Failed => Phase::Done,
        }
    }

    pub fn reset(&mut self) {
        self.state = State::Start;
    }

    /// Handles the single `<auth/>` element of a PLAIN exchange.
    pub async fn process(&mut self, elem: &Element) -> Result<Element, SaslError> {
        let result = if matches!(self.state, State::Start) && elem.name() == "auth" {
            self.verify(elem).await
        } else {
            debug!(element = elem.name(), "unexpected PLAIN element");
            Err(SaslError::MalformedRequest)
        };
        match result {
            Ok(username) => {
                debug!(username = %username, "PLAIN authentication succeeded");
                self.state = State::Authenticated(username);
                Ok(Element::builder("success").namespace(ns::SASL).build())
            }
            Err(err) => {
                match err {
                    SaslError::TemporaryAuthFailure(ref cause) => {
                        warn!(error = %cause, "PLAIN authentication failed temporarily")
                    }
                    _ => debug!(error = %err, "PLAIN authentication failed"),
                }
                self.state = State::Failed;
                Err(err)
            }
        }
    }

    async fn verify(&self, elem: &Element) -> Result<String, SaslError> {
        let text = elem.text().trim();
        if text.is_empty() {
            return Err(SaslError::MalformedRequest);
        }
        let payload = STANDARD
            .decode(text)
            .map_err(|_| SaslError::IncorrectEncoding)?;
        let fields: Vec<&[u8]> = payload.split(|b| *b == 0).collect();
        if fields.len() != 3 {
            return Err(SaslError::IncorrectEncoding);
        }
        let username = std::str::from_utf8(fields[1]).map_err(|_| SaslError::IncorrectEncoding)?;
        let password = std::str::from_utf8(fields[2]).map_err(|_| SaslError::IncorrectEncoding)?;

        if self.oracle.authenticate(username, password).await? {
            Ok(username.to_string())
        } else {
            Err(SaslError::NotAuthorized)
        }
    }
}

impl fmt::Debug for PlainAuthenticator {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("PlainAuthenticator")
            .field("phase", &self.phase())
            .field("username", &self.username())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use parking_lot::Mutex;

    use super::PlainAuthenticator;
    use crate::error::{OracleError, SaslError};
    use crate::oracle::CredentialOracle;
    use crate::sasl::Phase;
    use crate::xml::{ns, Element};

    #[derive(Default)]
    struct RecordingOracle {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CredentialOracle for RecordingOracle {
        async fn authenticate(&self, username: &str, password: &str) -> Result<bool, OracleError> {
            self.calls.lock().push((username.to_string(), password.to_string()));
            Ok(password == "1234")
        }
    }

    fn auth(payload: &[u8]) -> Element {
        Element::builder("auth")
            .namespace(ns::SASL)
            .attribute("mechanism", "PLAIN")
            .text(STANDARD.encode(payload))
            .build()
    }

    #[tokio::test]
    async fn test_oracle_receives_credentials() {
        let oracle = Arc::new(RecordingOracle::default());
        let mut plain = PlainAuthenticator::new(oracle.clone());
        let success = plain.process(&auth(b"admin\0ortuman\01234")).await.unwrap();
        assert_eq!(success.text(), "");
        assert_eq!(
            *oracle.calls.lock(),
            vec![("ortuman".to_string(), "1234".to_string())]
        );
    }

    #[tokio::test]
    async fn test_field_count() {
        let oracle = Arc::new(RecordingOracle::default());
        let mut plain = PlainAuthenticator::new(oracle.clone());
        for payload in &[&b"ortuman\01234"[..], &b"\0ortuman\01234\0extra"[..]] {
            plain.reset();
            match plain.process(&auth(payload)).await {
                Err(SaslError::IncorrectEncoding) => {}
                other => panic!("unexpected result: {:?}", other),
            }
        }
        assert!(oracle.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_empty_and_undecodable_payloads() {
        let mut plain = PlainAuthenticator::new(Arc::new(RecordingOracle::default()));
        let empty = Element::builder("auth").namespace(ns::SASL).build();
        match plain.process(&empty).await {
            Err(SaslError::MalformedRequest) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        plain.reset();
        let garbage = Element::builder("auth").namespace(ns::SASL).text("%%%").build();
        match plain.process(&garbage).await {
            Err(SaslError::IncorrectEncoding) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_done_until_reset() {
        let mut plain = PlainAuthenticator::new(Arc::new(RecordingOracle::default()));
        plain.process(&auth(b"\0ortuman\01234")).await.unwrap();
        assert_eq!(plain.phase(), Phase::Done);
        match plain.process(&auth(b"\0ortuman\01234")).await {
            Err(SaslError::MalformedRequest) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!plain.authenticated());

        plain.reset();
        assert_eq!(plain.phase(), Phase::Start);
        assert_eq!(plain.username(), "");
        plain.process(&auth(b"\0ortuman\01234")).await.unwrap();
        assert_eq!(plain.username(), "ortuman");
    }
}
