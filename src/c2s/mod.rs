//! Client-to-server stream handling: the shared stream handle, SASL negotiation, resource
//! binding and the registry of live streams.

mod bind;
mod negotiator;
mod registry;
mod stream;

pub use self::bind::{bind_resource, requested_resource, Binding, ResourceConflictPolicy};
pub use self::negotiator::SaslNegotiator;
pub use self::registry::{StreamRegistry, QUERY_QUEUE_CAPACITY};
pub use self::stream::C2sStream;
