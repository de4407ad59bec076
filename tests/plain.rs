use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use xmpp_c2s_auth::error::{OracleError, SaslError};
use xmpp_c2s_auth::oracle::CredentialOracle;
use xmpp_c2s_auth::sasl::{Authenticator, PlainAuthenticator};
use xmpp_c2s_auth::xml::{ns, Element};

/// Accepts `ortuman` / `1234` only.
struct StaticOracle;

#[async_trait]
impl CredentialOracle for StaticOracle {
    async fn authenticate(&self, username: &str, password: &str) -> Result<bool, OracleError> {
        Ok(username == "ortuman" && password == "1234")
    }
}

/// An oracle that can't be reached.
struct UnreachableOracle;

#[async_trait]
impl CredentialOracle for UnreachableOracle {
    async fn authenticate(&self, _: &str, _: &str) -> Result<bool, OracleError> {
        Err(OracleError::Status {
            code: tonic::Code::Unavailable,
            message: "connection refused".into(),
        })
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
async fn test_plain_success() {
    let mut plain = Authenticator::from(PlainAuthenticator::new(Arc::new(StaticOracle)));
    assert_eq!(plain.mechanism(), "PLAIN");
    assert!(!plain.uses_channel_binding());

    let success = plain.process(&auth(b"\0ortuman\01234")).await.unwrap();
    assert_eq!(success.name(), "success");
    assert_eq!(success.namespace(), Some(ns::SASL));
    assert!(plain.authenticated());
    assert_eq!(plain.username(), "ortuman");
}

#[tokio::test]
async fn test_plain_bad_password() {
    let mut plain = Authenticator::from(PlainAuthenticator::new(Arc::new(StaticOracle)));
    match plain.process(&auth(b"\0ortuman\0foo-password")).await {
        Err(SaslError::NotAuthorized) => {}
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(!plain.authenticated());
    assert_eq!(plain.username(), "");
}

#[tokio::test]
async fn test_plain_oracle_unreachable() {
    let mut plain = Authenticator::from(PlainAuthenticator::new(Arc::new(UnreachableOracle)));
    let err = plain.process(&auth(b"\0ortuman\01234")).await.unwrap_err();
    match err {
        SaslError::TemporaryAuthFailure(_) => {}
        ref other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(
        err.to_element().to_string(),
        "<failure xmlns=\"urn:ietf:params:xml:ns:xmpp-sasl\"><temporary-auth-failure/></failure>"
    );
    assert!(!plain.authenticated());
}
