//! Application lifecycle: wires configuration, storage, the oracle and the registry together.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::admin::UserAdmin;
use crate::c2s::{C2sStream, SaslNegotiator, StreamRegistry};
use crate::config::Config;
use crate::error::ConfigError;
use crate::oracle::{CredentialOracle, GrpcOracle};
use crate::pepper::PepperRing;
use crate::sasl::{Authenticator, Mechanism, PlainAuthenticator, ScramAuthenticator, ScramHash};
use crate::storage::{Repository, UserRepository};
use crate::transport::{ChannelBindingType, Transport};
use crate::vault::CredentialVault;

/// A running authentication core.
pub struct App {
    config: Config,
    users: Arc<dyn UserRepository>,
    peppers: Arc<PepperRing>,
    oracle: Option<Arc<dyn CredentialOracle>>,
    registry: StreamRegistry,
    admin: UserAdmin,
    cancel: CancellationToken,
    registry_task: JoinHandle<()>,
}

impl App {
    /// Validates `config` and starts the stream registry.
    ///
    /// When PLAIN is offered and no `oracle` is supplied, a gRPC client for the configured
    /// oracle addresses is built. Must be called within a Tokio runtime.
    pub fn start<R>(
        config: Config,
        repository: Arc<R>,
        oracle: Option<Arc<dyn CredentialOracle>>,
    ) -> Result<Self, ConfigError>
    where
        R: Repository + 'static,
    {
        let peppers = Arc::new(PepperRing::new(config.peppers.clone())?);
        let oracle = match oracle {
            Some(oracle) => Some(oracle),
            None if config.sasl.mechanisms.contains(&Mechanism::Plain) => {
                Some(Arc::new(GrpcOracle::connect(&config.sasl.oracle)?) as Arc<dyn CredentialOracle>)
            }
            None => None,
        };

        let users: Arc<dyn UserRepository> = repository;
        let admin = UserAdmin::new(CredentialVault::new(users.clone(), peppers.clone()));
        let cancel = CancellationToken::new();
        let (registry, registry_task) = StreamRegistry::spawn(cancel.clone());

        info!(
            domain = %config.domain,
            listener_port = config.listener_port,
            pepper_id = %peppers.active_id(),
            mechanisms = ?config.sasl.mechanisms,
            channel_binding = config.sasl.channel_binding,
            "authentication core started"
        );
        Ok(App {
            config: config,
            users: users,
            peppers: peppers,
            oracle: oracle,
            registry: registry,
            admin: admin,
            cancel: cancel,
            registry_task: registry_task,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn admin(&self) -> &UserAdmin {
        &self.admin
    }

    /// Creates and registers the handle of a newly accepted connection.
    pub async fn accept(&self) -> Arc<C2sStream> {
        let stream = Arc::new(C2sStream::new(self.config.domain.as_str(), self.config.listener_port));
        self.registry.register(stream.clone()).await;
        stream
    }

    /// Builds fresh authenticators for every configured mechanism.
    ///
    /// SCRAM is always offered without channel binding. The `-PLUS` variant is offered ahead of it
    /// when channel binding is enabled and `transport` can provide `tls-unique` data.
    pub fn authenticators(&self, transport: Arc<dyn Transport>) -> Vec<Authenticator> {
        let channel_binding = self.config.sasl.channel_binding
            && transport
                .channel_binding_bytes(ChannelBindingType::TlsUnique)
                .is_some();
        let mut authenticators = Vec::new();
        for mechanism in &self.config.sasl.mechanisms {
            match *mechanism {
                Mechanism::Plain => {
                    if let Some(ref oracle) = self.oracle {
                        authenticators.push(Authenticator::Plain(PlainAuthenticator::new(oracle.clone())));
                    }
                }
                Mechanism::Scram(hash) => {
                    if channel_binding {
                        authenticators.push(Authenticator::Scram(self.scram(hash, true, &transport)));
                    }
                    authenticators.push(Authenticator::Scram(self.scram(hash, false, &transport)));
                }
            }
        }
        authenticators
    }

    fn scram(&self, hash: ScramHash, channel_binding: bool, transport: &Arc<dyn Transport>) -> ScramAuthenticator {
        ScramAuthenticator::new(
            hash,
            channel_binding,
            transport.clone(),
            self.users.clone(),
            self.peppers.clone(),
        )
    }

    /// SASL negotiation for `stream` over `transport`.
    pub fn negotiator(&self, stream: Arc<C2sStream>, transport: Arc<dyn Transport>) -> SaslNegotiator {
        SaslNegotiator::new(stream, self.authenticators(transport))
    }

    /// Stops the registry and waits for its task to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.registry_task.await {
            warn!(error = %err, "stream registry task failed");
        }
        info!("authentication core stopped");
    }
}
