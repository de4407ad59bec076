//! # Salted Challenge Response Authentication Mechanism (SCRAM)
//!
//! Server side of RFC5802/RFC7677 for SHA-1, SHA-256, SHA-512 and SHA3-512, with optional
//! `tls-unique` channel binding (the `-PLUS` mechanisms).
//!
//! The exchange is driven by XMPP elements: the client's first message arrives in `<auth/>` and
//! is answered with a `<challenge/>`, the final message arrives in `<response/>` and is answered
//! with `<success/>`. Salt and iteration count come from the user's
//! [`ScramBlock`](../../model/struct.ScramBlock.html). The salt sent to the client is the stored
//! salt followed by the user's pepper, so the client's PBKDF2 yields exactly the stored digest.
//!
//! A [`ScramClient`](struct.ScramClient.html) implementing the other side of the exchange is
//! provided as well.

mod client;
mod hash;
mod message;

use std::fmt;
use std::mem;
use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{SaslError, StoreError, VaultError};
use crate::model::UserRecord;
use crate::pepper::PepperRing;
use crate::storage::UserRepository;
use crate::transport::{ChannelBindingType, Transport};
use crate::xml::{ns, Element};

use super::{decode_payload, Phase};

pub use self::client::{ClientFinal, ClientFirst as ScramClient, ServerFinal, ServerFirst};
pub use self::hash::{constant_time_eq, digest, find_proofs, hash_password, hmac, ScramHash};
pub use self::message::{Attributes, ClientFirst, Gs2BindFlag};

/// Produces the server part of the nonce. The server nonce is `client-nonce + "-" + suffix`.
pub type NonceGenerator = Arc<dyn Fn() -> String + Send + Sync>;

enum State {
    /// Waiting for `<auth/>`.
    Start,
    /// Waiting for `<response/>`.
    Challenged {
        client_first: ClientFirst,
        server_nonce: String,
        server_first: String,
        user: UserRecord,
    },
    Authenticated(String),
    Failed,
}

/// Server's side of a SCRAM exchange for one stream.
pub struct ScramAuthenticator {
    hash: ScramHash,
    channel_binding: bool,
    transport: Arc<dyn Transport>,
    users: Arc<dyn UserRepository>,
    peppers: Arc<PepperRing>,
    nonce_generator: NonceGenerator,
    state: State,
}

impl ScramAuthenticator {
    /// Creates an authenticator for `hash`. With `channel_binding` set the mechanism is offered as
    /// `-PLUS` and clients requiring channel binding are accepted.
    pub fn new(
        hash: ScramHash,
        channel_binding: bool,
        transport: Arc<dyn Transport>,
        users: Arc<dyn UserRepository>,
        peppers: Arc<PepperRing>,
    ) -> Self {
        ScramAuthenticator {
            hash: hash,
            channel_binding: channel_binding,
            transport: transport,
            users: users,
            peppers: peppers,
            nonce_generator: Arc::new(|| Uuid::new_v4().to_string()),
            state: State::Start,
        }
    }

    /// Replaces the source of server nonce suffixes. Random UUIDs are used by default.
    pub fn with_nonce_generator(mut self, nonce_generator: NonceGenerator) -> Self {
        self.nonce_generator = nonce_generator;
        self
    }

    /// The SASL mechanism name, `-PLUS` suffixed when channel binding is active.
    pub fn mechanism(&self) -> &'static str {
        if self.channel_binding {
            self.hash.plus_mechanism()
        } else {
            self.hash.mechanism()
        }
    }

    pub fn uses_channel_binding(&self) -> bool {
        self.channel_binding
    }

    pub fn authenticated(&self) -> bool {
        matches!(self.state, State::Authenticated(_))
    }

    /// The authenticated username, empty unless the exchange succeeded.
    pub fn username(&self) -> &str {
        match self.state {
            State::Authenticated(ref username) => username,
            _ => "",
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Start => Phase::Start,
            State::Challenged { .. } => Phase::Challenged,
            State::Authenticated(_) | State::Failed => Phase::Done,
        }
    }

    /// Discards nonces, messages and the fetched user and waits for a new `<auth/>`.
    pub fn reset(&mut self) {
        self.state = State::Start;
    }

    /// Processes one SASL element and returns the element to answer with.
    ///
    /// Any error leaves the authenticator failed until [`reset`](#method.reset) is called. The
    /// state is moved out while a user lookup is pending, so dropping this future also leaves it
    /// failed.
    pub async fn process(&mut self, elem: &Element) -> Result<Element, SaslError> {
        if self.phase() == Phase::Done {
            debug!(mechanism = self.mechanism(), element = elem.name(), "SCRAM exchange already finished");
            return Err(SaslError::MalformedRequest);
        }
        let state = mem::replace(&mut self.state, State::Failed);
        let result = match (state, elem.name()) {
            (State::Start, "auth") => self.handle_start(elem).await,
            (State::Challenged { client_first, server_nonce, server_first, user }, "response") => {
                self.handle_challenged(elem, client_first, server_nonce, server_first, user)
            }
            (_, name) => {
                debug!(mechanism = self.mechanism(), element = name, "unexpected SASL element");
                Err(SaslError::MalformedRequest)
            }
        };
        match result {
            Ok((state, reply)) => {
                self.state = state;
                Ok(reply)
            }
            Err(err) => {
                match err {
                    SaslError::TemporaryAuthFailure(ref cause) => {
                        warn!(mechanism = self.mechanism(), error = %cause, "SCRAM authentication failed temporarily")
                    }
                    _ => debug!(mechanism = self.mechanism(), error = %err, "SCRAM authentication failed"),
                }
                Err(err)
            }
        }
    }

    async fn handle_start(&self, elem: &Element) -> Result<(State, Element), SaslError> {
        let payload = decode_payload(elem)?;
        let client_first = ClientFirst::parse(&payload, self.channel_binding)?;
        let username = client_first.username();

        let user = match self.users.fetch_user(&username).await? {
            Some(user) => user,
            None => {
                debug!(username = %username, "SCRAM user not found");
                return Err(SaslError::NotAuthorized);
            }
        };

        let mut salt = URL_SAFE_NO_PAD
            .decode(&user.scram.salt)
            .map_err(|err| SaslError::temporary(StoreError::Corrupted(format!("salt: {}", err))))?;
        let pepper = self
            .peppers
            .value_of(&user.scram.pepper_id)
            .ok_or_else(|| SaslError::temporary(VaultError::UnknownPepper(user.scram.pepper_id.clone())))?;
        salt.extend_from_slice(pepper.as_bytes());

        let server_nonce = format!("{}-{}", client_first.nonce(), (self.nonce_generator)());
        let server_first = format!(
            "r={},s={},i={}",
            server_nonce,
            STANDARD.encode(&salt),
            user.scram.iteration_count
        );

        let challenge = Element::builder("challenge")
            .namespace(ns::SASL)
            .text(STANDARD.encode(server_first.as_bytes()))
            .build();
        let state = State::Challenged {
            client_first: client_first,
            server_nonce: server_nonce,
            server_first: server_first,
            user: user,
        };
        Ok((state, challenge))
    }

    fn handle_challenged(
        &self,
        elem: &Element,
        client_first: ClientFirst,
        server_nonce: String,
        server_first: String,
        user: UserRecord,
    ) -> Result<(State, Element), SaslError> {
        let client_final = decode_payload(elem)?;

        let salted_password = URL_SAFE_NO_PAD
            .decode(self.hash.stored_digest(&user.scram))
            .map_err(|err| {
                SaslError::temporary(StoreError::Corrupted(format!("{} digest: {}", self.hash, err)))
            })?;

        let client_final_bare = format!(
            "c={},r={}",
            STANDARD.encode(self.channel_binding_input(&client_first)),
            server_nonce
        );
        let (client_proof, server_signature) = find_proofs(
            self.hash,
            &client_first.bare(),
            &server_first,
            &client_final_bare,
            &salted_password,
        );
        let expected = format!("{},p={}", client_final_bare, STANDARD.encode(&client_proof));
        if !constant_time_eq(expected.as_bytes(), client_final.as_bytes()) {
            debug!(username = %user.username, "SCRAM client proof mismatch");
            return Err(SaslError::NotAuthorized);
        }

        let server_final = format!("v={}", STANDARD.encode(&server_signature));
        let success = Element::builder("success")
            .namespace(ns::SASL)
            .text(STANDARD.encode(server_final.as_bytes()))
            .build();
        debug!(username = %user.username, mechanism = self.mechanism(), "SCRAM authentication succeeded");
        Ok((State::Authenticated(user.username), success))
    }

    /// The GS2 header followed by the transport's channel binding data when the client selected a
    /// binding type this server can obtain.
    fn channel_binding_input(&self, client_first: &ClientFirst) -> Vec<u8> {
        let mut input = client_first.gs2_header().into_bytes();
        if !self.channel_binding {
            return input;
        }
        let binding = client_first
            .bind_flag
            .channel_binding_type()
            .and_then(ChannelBindingType::from_name);
        if let Some(binding) = binding {
            if let Some(bytes) = self.transport.channel_binding_bytes(binding) {
                input.extend_from_slice(&bytes);
            }
        }
        input
    }
}

impl fmt::Debug for ScramAuthenticator {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("ScramAuthenticator")
            .field("mechanism", &self.mechanism())
            .field("phase", &self.phase())
            .field("username", &self.username())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;
    use std::sync::Arc;

    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use base64::Engine;

    use super::{hash_password, ScramAuthenticator, ScramHash};
    use crate::error::SaslError;
    use crate::model::{ScramBlock, UserRecord};
    use crate::pepper::{PepperConfig, PepperRing};
    use crate::sasl::Phase;
    use crate::storage::{MemoryRepository, UserRepository};
    use crate::transport::PlainTransport;
    use crate::xml::{ns, Element};

    const PEPPER: &str = "6ZavKvaLqSFGM5zDnFq7WWih";

    fn peppers() -> Arc<PepperRing> {
        let config = PepperConfig {
            keys: vec![("v1".to_string(), PEPPER.to_string())].into_iter().collect(),
            use_id: "v1".into(),
        };
        Arc::new(PepperRing::new(config).unwrap())
    }

    async fn repository() -> Arc<MemoryRepository> {
        let repo = Arc::new(MemoryRepository::new());
        let salt = b"0123456789abcdef0123456789abcdef".to_vec();
        let mut peppered = salt.clone();
        peppered.extend_from_slice(PEPPER.as_bytes());
        let digest = |hash| {
            URL_SAFE_NO_PAD.encode(hash_password(hash, b"1234", &peppered, NonZeroU32::new(16).unwrap()))
        };
        let user = UserRecord {
            username: "ortuman".into(),
            scram: ScramBlock {
                sha1: digest(ScramHash::Sha1),
                sha256: digest(ScramHash::Sha256),
                sha512: digest(ScramHash::Sha512),
                sha3_512: digest(ScramHash::Sha3_512),
                salt: URL_SAFE_NO_PAD.encode(&salt),
                iteration_count: 16,
                pepper_id: "v1".into(),
            },
        };
        repo.upsert_user(&user).await.unwrap();
        repo
    }

    fn auth(payload: &str) -> Element {
        Element::builder("auth")
            .namespace(ns::SASL)
            .text(STANDARD.encode(payload))
            .build()
    }

    async fn authenticator(channel_binding: bool) -> ScramAuthenticator {
        ScramAuthenticator::new(
            ScramHash::Sha256,
            channel_binding,
            Arc::new(PlainTransport),
            repository().await,
            peppers(),
        )
        .with_nonce_generator(Arc::new(|| "server".to_string()))
    }

    #[tokio::test]
    async fn test_challenge_contents() {
        let mut scram = authenticator(false).await;
        let challenge = scram.process(&auth("n,,n=ortuman,r=client")).await.unwrap();
        assert_eq!(challenge.name(), "challenge");
        assert_eq!(scram.phase(), Phase::Challenged);

        let server_first = String::from_utf8(STANDARD.decode(challenge.text()).unwrap()).unwrap();
        let mut salt = b"0123456789abcdef0123456789abcdef".to_vec();
        salt.extend_from_slice(PEPPER.as_bytes());
        assert_eq!(
            server_first,
            format!("r=client-server,s={},i=16", STANDARD.encode(&salt))
        );
    }

    #[tokio::test]
    async fn test_unexpected_element() {
        let mut scram = authenticator(false).await;
        let response = Element::builder("response").namespace(ns::SASL).text("biws").build();
        match scram.process(&response).await {
            Err(SaslError::MalformedRequest) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(scram.phase(), Phase::Done);
        assert!(!scram.authenticated());
        assert_eq!(scram.username(), "");
    }

    #[tokio::test]
    async fn test_corrupted_digest() {
        let repo = repository().await;
        let mut user = repo.fetch_user("ortuman").await.unwrap().unwrap();
        user.scram.sha256 = "not*base64url".into();
        repo.upsert_user(&user).await.unwrap();

        let mut scram = ScramAuthenticator::new(
            ScramHash::Sha256,
            false,
            Arc::new(PlainTransport),
            repo,
            peppers(),
        );
        scram.process(&auth("n,,n=ortuman,r=client")).await.unwrap();
        let response = Element::builder("response")
            .namespace(ns::SASL)
            .text(STANDARD.encode("c=biws,r=whatever,p=AAAA"))
            .build();
        match scram.process(&response).await {
            Err(SaslError::TemporaryAuthFailure(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_pepper() {
        let repo = repository().await;
        let mut user = repo.fetch_user("ortuman").await.unwrap().unwrap();
        user.scram.pepper_id = "v0".into();
        repo.upsert_user(&user).await.unwrap();

        let mut scram = ScramAuthenticator::new(
            ScramHash::Sha1,
            false,
            Arc::new(PlainTransport),
            repo,
            peppers(),
        );
        match scram.process(&auth("n,,n=ortuman,r=client")).await {
            Err(SaslError::TemporaryAuthFailure(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_unavailable() {
        let repo = repository().await;
        repo.set_unavailable(true);
        let mut scram = ScramAuthenticator::new(
            ScramHash::Sha512,
            false,
            Arc::new(PlainTransport),
            repo,
            peppers(),
        );
        match scram.process(&auth("n,,n=ortuman,r=client")).await {
            Err(SaslError::TemporaryAuthFailure(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
