//! External credential oracle used by the PLAIN mechanism.
//!
//! The oracle is a gRPC service with a single unary call,
//! `Authenticate(username, password) -> { authenticated }` (see
//! `proto/plain_authenticator.proto`). OK means the authority was reached, whatever the verdict;
//! `Unavailable` and `DeadlineExceeded` are transport problems.

use std::time::Duration;

use async_trait::async_trait;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info};

use crate::config::OracleConfig;
use crate::error::{ConfigError, OracleError};

/// Messages of the `plain_authenticator.v1` package.
pub mod proto {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AuthenticateRequest {
        #[prost(string, tag = "1")]
        pub username: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub password: ::prost::alloc::string::String,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct AuthenticateResponse {
        #[prost(bool, tag = "1")]
        pub authenticated: bool,
    }
}

const AUTHENTICATE_PATH: &str = "/plain_authenticator.v1.PlainAuthenticator/Authenticate";

/// Something able to tell whether a username/password pair is valid.
#[async_trait]
pub trait CredentialOracle: Send + Sync {
    /// Returns the oracle's verdict, or an error when it couldn't be reached.
    async fn authenticate(&self, username: &str, password: &str) -> Result<bool, OracleError>;
}

/// gRPC client of the credential oracle.
///
/// Holds one long-lived channel balanced over every configured address. HTTP/2 keepalive pings
/// are sent every `keepalive_interval` even while no call is in flight, so broken connections
/// are detected and re-established before the next PLAIN attempt.
#[derive(Clone, Debug)]
pub struct GrpcOracle {
    channel: Channel,
    timeout: Duration,
}

impl GrpcOracle {
    /// Builds the channel. Connections are established lazily, on first use.
    ///
    /// Must be called within a Tokio runtime.
    pub fn connect(config: &OracleConfig) -> Result<Self, ConfigError> {
        if config.addresses.is_empty() {
            return Err(ConfigError::Missing("oracle addresses"));
        }
        let mut endpoints = Vec::with_capacity(config.addresses.len());
        for address in &config.addresses {
            let endpoint = Endpoint::from_shared(address.clone())
                .map_err(|_| ConfigError::InvalidValue {
                    key: "oracle address",
                    value: address.clone(),
                })?
                .connect_timeout(config.timeout)
                .http2_keep_alive_interval(config.keepalive_interval)
                .keep_alive_timeout(config.timeout)
                .keep_alive_while_idle(true);
            endpoints.push(endpoint);
        }
        info!(addresses = ?config.addresses, "credential oracle channel configured");
        Ok(GrpcOracle {
            channel: Channel::balance_list(endpoints.into_iter()),
            timeout: config.timeout,
        })
    }

    async fn call(&self, username: &str, password: &str) -> Result<bool, OracleError> {
        let mut client = tonic::client::Grpc::new(self.channel.clone());
        client.ready().await.map_err(OracleError::Transport)?;

        let mut request = tonic::Request::new(proto::AuthenticateRequest {
            username: username.to_string(),
            password: password.to_string(),
        });
        request.set_timeout(self.timeout);
        let codec: ProstCodec<proto::AuthenticateRequest, proto::AuthenticateResponse> =
            ProstCodec::default();
        let response = client
            .unary(request, PathAndQuery::from_static(AUTHENTICATE_PATH), codec)
            .await?;
        Ok(response.into_inner().authenticated)
    }
}

#[async_trait]
impl CredentialOracle for GrpcOracle {
    async fn authenticate(&self, username: &str, password: &str) -> Result<bool, OracleError> {
        let authenticated = tokio::time::timeout(self.timeout, self.call(username, password))
            .await
            .map_err(|_| OracleError::Timeout)??;
        debug!(username = %username, authenticated = authenticated, "credential oracle answered");
        Ok(authenticated)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use prost::Message;

    use super::proto::{AuthenticateRequest, AuthenticateResponse};
    use super::{CredentialOracle, GrpcOracle};
    use crate::config::OracleConfig;
    use crate::error::{ConfigError, OracleError};

    #[test]
    fn test_wire_format() {
        let request = AuthenticateRequest {
            username: "ortuman".into(),
            password: "1234".into(),
        };
        assert_eq!(
            request.encode_to_vec(),
            b"\x0a\x07ortuman\x12\x041234".to_vec()
        );
        let response = AuthenticateResponse::decode(&b"\x08\x01"[..]).unwrap();
        assert!(response.authenticated);
        assert!(!AuthenticateResponse::decode(&b""[..]).unwrap().authenticated);
    }

    #[tokio::test]
    async fn test_invalid_configuration() {
        let mut config = OracleConfig::default();
        assert_eq!(
            GrpcOracle::connect(&config).unwrap_err(),
            ConfigError::Missing("oracle addresses")
        );
        config.addresses = vec!["not a uri".into()];
        match GrpcOracle::connect(&config) {
            Err(ConfigError::InvalidValue { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_oracle() {
        let config = OracleConfig {
            addresses: vec!["http://127.0.0.1:1".into()],
            timeout: Duration::from_millis(500),
            ..OracleConfig::default()
        };
        let oracle = GrpcOracle::connect(&config).unwrap();
        match oracle.authenticate("ortuman", "1234").await {
            Err(OracleError::Timeout)
            | Err(OracleError::Transport(_))
            | Err(OracleError::Status { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
