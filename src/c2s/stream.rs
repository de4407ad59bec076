use std::fmt;
use std::sync::atomic::{AtomicI8, AtomicU64, AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::model::Jid;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

const SECURED: u8 = 1;
const AUTHENTICATED: u8 = 1 << 1;
const COMPRESSED: u8 = 1 << 2;
const BOUND: u8 = 1 << 3;

/// A client-to-server stream as seen by the authentication core.
///
/// Shared between the connection task that owns it and the registry. Username and resource are
/// set once, and the flags only ever go from unset to set.
pub struct C2sStream {
    id: String,
    domain: String,
    listener_port: u16,
    username: OnceLock<String>,
    resource: OnceLock<String>,
    priority: AtomicI8,
    flags: AtomicU8,
}

impl C2sStream {
    /// Creates a stream with a fresh process-unique id.
    pub fn new<D: Into<String>>(domain: D, listener_port: u16) -> Self {
        let id = format!("c2s:{}", NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed));
        Self::with_id(id, domain, listener_port)
    }

    /// Creates a stream with a caller supplied id. The caller is responsible for uniqueness.
    pub fn with_id<I: Into<String>, D: Into<String>>(id: I, domain: D, listener_port: u16) -> Self {
        C2sStream {
            id: id.into(),
            domain: domain.into(),
            listener_port: listener_port,
            username: OnceLock::new(),
            resource: OnceLock::new(),
            priority: AtomicI8::new(0),
            flags: AtomicU8::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Port of the listener that accepted the connection.
    pub fn listener_port(&self) -> u16 {
        self.listener_port
    }

    /// Empty until SASL succeeds.
    pub fn username(&self) -> &str {
        self.username.get().map(String::as_str).unwrap_or("")
    }

    /// Empty until a resource is bound.
    pub fn resource(&self) -> &str {
        self.resource.get().map(String::as_str).unwrap_or("")
    }

    /// `username@domain/resource`, with the parts known so far.
    pub fn jid(&self) -> Jid {
        Jid::new(self.username(), self.domain.as_str(), self.resource())
    }

    pub fn priority(&self) -> i8 {
        self.priority.load(Ordering::Acquire)
    }

    /// Presence priority of the bound resource.
    pub fn set_priority(&self, priority: i8) {
        self.priority.store(priority, Ordering::Release);
    }

    pub fn is_secured(&self) -> bool {
        self.has(SECURED)
    }

    pub fn is_authenticated(&self) -> bool {
        self.has(AUTHENTICATED)
    }

    pub fn is_compressed(&self) -> bool {
        self.has(COMPRESSED)
    }

    pub fn is_bound(&self) -> bool {
        self.has(BOUND)
    }

    pub fn set_secured(&self) {
        self.flags.fetch_or(SECURED, Ordering::AcqRel);
    }

    pub fn set_compressed(&self) {
        self.flags.fetch_or(COMPRESSED, Ordering::AcqRel);
    }

    /// Records a successful SASL exchange. Returns `false` if the stream was already
    /// authenticated, in which case nothing changes.
    pub fn mark_authenticated(&self, username: &str) -> bool {
        if self.username.set(username.to_string()).is_err() {
            return false;
        }
        self.flags.fetch_or(AUTHENTICATED, Ordering::AcqRel);
        true
    }

    /// Records the bound resource. Returns `false` unless the stream is authenticated and not yet
    /// bound.
    pub fn mark_bound(&self, resource: &str) -> bool {
        if !self.is_authenticated() || self.resource.set(resource.to_string()).is_err() {
            return false;
        }
        self.flags.fetch_or(BOUND, Ordering::AcqRel);
        true
    }

    fn has(&self, flag: u8) -> bool {
        self.flags.load(Ordering::Acquire) & flag != 0
    }
}

impl fmt::Debug for C2sStream {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("C2sStream")
            .field("id", &self.id)
            .field("jid", &self.jid().to_string())
            .field("listener_port", &self.listener_port)
            .field("priority", &self.priority())
            .field("flags", &self.flags.load(Ordering::Acquire))
            .finish()
    }
}
