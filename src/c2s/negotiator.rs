use std::sync::Arc;

use tracing::{debug, info};

use super::stream::C2sStream;
use crate::error::SaslError;
use crate::sasl::Authenticator;
use crate::xml::{ns, Element};

fn failure(condition: &str) -> Element {
    Element::builder("failure")
        .namespace(ns::SASL)
        .child(Element::builder(condition).build())
        .build()
}

/// Drives SASL negotiation for one stream.
///
/// Routes `<auth/>` to the authenticator named by its `mechanism` attribute and `<response/>` to
/// the one currently selected. Every call yields the element to send back, failures included.
#[derive(Debug)]
pub struct SaslNegotiator {
    stream: Arc<C2sStream>,
    authenticators: Vec<Authenticator>,
    active: Option<usize>,
}

impl SaslNegotiator {
    /// `authenticators` are advertised in the given order.
    pub fn new(stream: Arc<C2sStream>, authenticators: Vec<Authenticator>) -> Self {
        SaslNegotiator {
            stream: stream,
            authenticators: authenticators,
            active: None,
        }
    }

    pub fn stream(&self) -> &Arc<C2sStream> {
        &self.stream
    }

    /// The `<mechanisms/>` stream feature.
    pub fn features(&self) -> Element {
        Element::builder("mechanisms")
            .namespace(ns::SASL)
            .children(
                self.authenticators
                    .iter()
                    .map(|a| Element::builder("mechanism").text(a.mechanism()).build()),
            )
            .build()
    }

    /// Processes one element of the SASL namespace.
    pub async fn process(&mut self, elem: &Element) -> Element {
        if self.stream.is_authenticated() {
            debug!(stream_id = %self.stream.id(), element = elem.name(), "SASL element after authentication");
            return SaslError::MalformedRequest.to_element();
        }
        match elem.name() {
            "auth" => {
                let mechanism = elem.attribute("mechanism").unwrap_or("");
                match self.authenticators.iter().position(|a| a.mechanism() == mechanism) {
                    Some(index) => {
                        self.authenticators[index].reset();
                        self.active = Some(index);
                        self.advance(index, elem).await
                    }
                    None => {
                        debug!(stream_id = %self.stream.id(), mechanism = %mechanism, "invalid SASL mechanism");
                        self.active = None;
                        failure("invalid-mechanism")
                    }
                }
            }
            "response" => match self.active {
                Some(index) => self.advance(index, elem).await,
                None => SaslError::MalformedRequest.to_element(),
            },
            "abort" => {
                if let Some(index) = self.active.take() {
                    self.authenticators[index].reset();
                }
                debug!(stream_id = %self.stream.id(), "SASL exchange aborted");
                failure("aborted")
            }
            _ => SaslError::MalformedRequest.to_element(),
        }
    }

    async fn advance(&mut self, index: usize, elem: &Element) -> Element {
        let authenticator = &mut self.authenticators[index];
        match authenticator.process(elem).await {
            Ok(reply) => {
                if authenticator.authenticated() {
                    self.stream.mark_authenticated(authenticator.username());
                    info!(
                        stream_id = %self.stream.id(),
                        username = %authenticator.username(),
                        mechanism = authenticator.mechanism(),
                        "stream authenticated"
                    );
                    self.active = None;
                }
                reply
            }
            Err(err) => {
                authenticator.reset();
                self.active = None;
                err.to_element()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    use super::SaslNegotiator;
    use crate::c2s::C2sStream;
    use crate::error::OracleError;
    use crate::oracle::CredentialOracle;
    use crate::sasl::{Authenticator, PlainAuthenticator};
    use crate::xml::{ns, Element};

    struct Oracle;

    #[async_trait]
    impl CredentialOracle for Oracle {
        async fn authenticate(&self, _: &str, password: &str) -> Result<bool, OracleError> {
            Ok(password == "1234")
        }
    }

    fn negotiator() -> SaslNegotiator {
        let stream = Arc::new(C2sStream::new("jackal.im", 5222));
        let plain = Authenticator::from(PlainAuthenticator::new(Arc::new(Oracle)));
        SaslNegotiator::new(stream, vec![plain])
    }

    fn auth(mechanism: &str, payload: &[u8]) -> Element {
        Element::builder("auth")
            .namespace(ns::SASL)
            .attribute("mechanism", mechanism)
            .text(STANDARD.encode(payload))
            .build()
    }

    #[tokio::test]
    async fn test_features() {
        assert_eq!(
            negotiator().features().to_string(),
            "<mechanisms xmlns=\"urn:ietf:params:xml:ns:xmpp-sasl\"><mechanism>PLAIN</mechanism></mechanisms>"
        );
    }

    #[tokio::test]
    async fn test_invalid_mechanism_and_abort() {
        let mut negotiator = negotiator();
        let reply = negotiator.process(&auth("DIGEST-MD5", b"")).await;
        assert!(reply.child("invalid-mechanism").is_some());

        let abort = Element::builder("abort").namespace(ns::SASL).build();
        assert!(negotiator.process(&abort).await.child("aborted").is_some());
        assert!(!negotiator.stream().is_authenticated());
    }

    #[tokio::test]
    async fn test_retry_after_failure() {
        let mut negotiator = negotiator();
        let reply = negotiator.process(&auth("PLAIN", b"\0ortuman\0bad")).await;
        assert!(reply.child("not-authorized").is_some());

        let reply = negotiator.process(&auth("PLAIN", b"\0ortuman\01234")).await;
        assert_eq!(reply.name(), "success");
        assert!(negotiator.stream().is_authenticated());
        assert_eq!(negotiator.stream().username(), "ortuman");

        let reply = negotiator.process(&auth("PLAIN", b"\0ortuman\01234")).await;
        assert!(reply.child("malformed-request").is_some());
    }
}
