use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::registry::StreamRegistry;
use super::stream::C2sStream;
use crate::error::BindError;
use crate::model::Jid;
use crate::xml::{ns, Element};

/// What to do when a user binds a resource one of their streams already holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceConflictPolicy {
    /// Refuse the new binding with a `conflict` error.
    #[default]
    Reject,
    /// Grant the new binding and evict the stream that held the resource.
    Override,
}

/// A granted binding.
#[derive(Debug)]
pub struct Binding {
    /// Full address of the bound stream.
    pub jid: Jid,
    /// Stream evicted under `ResourceConflictPolicy::Override`. The caller closes it.
    pub replaced: Option<Arc<C2sStream>>,
}

impl Binding {
    /// The `<bind/>` payload of the result IQ.
    pub fn to_element(&self) -> Element {
        Element::builder("bind")
            .namespace(ns::BIND)
            .child(Element::builder("jid").text(self.jid.to_string()).build())
            .build()
    }
}

/// Returns the resource requested by a `<bind/>` element, empty when the client left the choice
/// to the server.
pub fn requested_resource(bind: &Element) -> &str {
    bind.child("resource").map(|r| r.text().trim()).unwrap_or("")
}

/// Binds `requested` to an authenticated stream and files it in the registry.
///
/// An empty `requested` resource is replaced by a random one. The conflict check and the filing
/// are applied by the registry task as a single step.
pub async fn bind_resource(
    registry: &StreamRegistry,
    stream: &Arc<C2sStream>,
    requested: &str,
    policy: ResourceConflictPolicy,
) -> Result<Binding, BindError> {
    if !stream.is_authenticated() {
        return Err(BindError::NotAuthenticated);
    }
    if stream.is_bound() {
        return Err(BindError::AlreadyBound);
    }
    let resource = if requested.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        requested.to_string()
    };

    let replaced = registry.bind(stream.clone(), &resource, policy).await?;
    info!(stream_id = %stream.id(), jid = %stream.jid(), replaced = replaced.is_some(), "resource bound");
    Ok(Binding {
        jid: stream.jid(),
        replaced: replaced,
    })
}
