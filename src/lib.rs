//! # XMPP client authentication core
//!
//! SASL authentication, credential storage and stream bookkeeping for the client-to-server side
//! of an XMPP server (RFC6120).
//!
//! * [`sasl`](sasl/index.html) holds the per-stream authenticators: SCRAM-SHA-1, SCRAM-SHA-256,
//!   SCRAM-SHA-512 and SCRAM-SHA3-512, each optionally with `tls-unique` channel binding, and
//!   PLAIN verified by an external [credential oracle](oracle/index.html).
//! * [`CredentialVault`](vault/struct.CredentialVault.html) turns passwords into peppered and
//!   salted SCRAM digests. Cleartext passwords are never stored.
//! * [`StreamRegistry`](c2s/struct.StreamRegistry.html) tracks every live stream and, once bound,
//!   the resources of each user.
//!
//! XML framing, TLS and persistent storage live outside this crate; they are reached through the
//! [`Element`](xml/struct.Element.html) model, the [`Transport`](transport/trait.Transport.html)
//! trait and the [repository traits](storage/index.html).
//!
//! # Usage
//!
//! ``` rust,no_run
//! use std::sync::Arc;
//!
//! use xmpp_c2s_auth::storage::MemoryRepository;
//! use xmpp_c2s_auth::transport::PlainTransport;
//! use xmpp_c2s_auth::xml::Element;
//! use xmpp_c2s_auth::{App, Config};
//!
//! // These functions represent your stream I/O.
//! async fn receive() -> Element {
//!     unimplemented!()
//! }
//! async fn send(_: Element) {}
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let app = App::start(Config::from_env()?, Arc::new(MemoryRepository::new()), None)?;
//!
//! // One negotiator per accepted connection.
//! let stream = app.accept().await;
//! let mut negotiator = app.negotiator(stream.clone(), Arc::new(PlainTransport));
//! send(negotiator.features()).await;
//! while !stream.is_authenticated() {
//!     let reply = negotiator.process(&receive().await).await;
//!     send(reply).await;
//! }
//!
//! app.registry().unregister(stream).await;
//! app.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod app;
pub mod c2s;
pub mod config;
pub mod error;
pub mod model;
pub mod oracle;
pub mod pepper;
pub mod sasl;
pub mod storage;
pub mod transport;
pub mod vault;
pub mod xml;

/// Length of the nonces generated by the SCRAM client.
pub const NONCE_LENGTH: usize = 24;

pub use crate::app::App;
pub use crate::config::Config;
pub use crate::error::{BindError, ConfigError, SaslError, StreamError};
