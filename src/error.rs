use std::fmt;

use thiserror::Error;

use crate::xml::{ns, Element};

/// Boxed cause carried by transient failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The SASL failure conditions this server emits.
///
/// RFC6120 section 6.5 describes the corresponding `<failure/>` children. Protocol violations map
/// to the first three kinds; `TemporaryAuthFailure` wraps backend problems (store unavailable,
/// oracle unreachable) whose cause is logged but never disclosed to the peer.
#[derive(Debug, Error)]
pub enum SaslError {
    /// The payload was empty or wasn't valid base64.
    #[error("incorrect encoding")]
    IncorrectEncoding,
    /// The decoded payload didn't follow the mechanism's message syntax.
    #[error("malformed request")]
    MalformedRequest,
    /// Credentials were rejected or the requested posture isn't allowed.
    #[error("not authorized")]
    NotAuthorized,
    /// A backend the mechanism relies on failed.
    #[error("temporary auth failure: {0}")]
    TemporaryAuthFailure(#[source] BoxError),
}

impl SaslError {
    /// Wraps any error as a `TemporaryAuthFailure`.
    pub fn temporary<E: Into<BoxError>>(err: E) -> Self {
        SaslError::TemporaryAuthFailure(err.into())
    }

    /// The name of the defined condition element.
    pub fn condition(&self) -> &'static str {
        match *self {
            SaslError::IncorrectEncoding => "incorrect-encoding",
            SaslError::MalformedRequest => "malformed-request",
            SaslError::NotAuthorized => "not-authorized",
            SaslError::TemporaryAuthFailure(_) => "temporary-auth-failure",
        }
    }

    /// Renders the `<failure/>` element sent to the peer.
    pub fn to_element(&self) -> Element {
        Element::builder("failure")
            .namespace(ns::SASL)
            .child(Element::builder(self.condition()).build())
            .build()
    }
}

impl From<StoreError> for SaslError {
    fn from(err: StoreError) -> Self {
        SaslError::temporary(err)
    }
}

impl From<OracleError> for SaslError {
    fn from(err: OracleError) -> Self {
        SaslError::temporary(err)
    }
}

/// The fields of a SCRAM client message. Used to report which part of a message was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    /// GS2 channel binding flag
    ChannelBinding,
    /// Authorization ID
    Authzid,
    /// Authcid
    Authcid,
    /// Nonce
    Nonce,
    /// Extra `key=value` attribute
    Attribute,
    /// Salt
    Salt,
    /// Iterations
    Iterations,
    /// Verify or Error
    VerifyOrError,
}

/// Errors of the client side of a SCRAM exchange.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScramClientError {
    /// The server responded with a nonce that doesn't start with our nonce.
    #[error("invalid nonce")]
    InvalidNonce,
    /// The content of the field `Field` is invalid.
    #[error("invalid field {0}")]
    InvalidField(Field),
    /// The field `Field` was expected but not found.
    #[error("expected field {0}")]
    ExpectedField(Field),
    /// The server required a mandatory extension to be present that this client doesn't support.
    #[error("unsupported extension")]
    UnsupportedExtension,
    /// The server signature didn't match. The server doesn't know the user's credentials.
    #[error("server failed validation")]
    InvalidServer,
    /// The server rejected the authentication request with a message.
    #[error("authentication error {0}")]
    Authentication(String),
}

/// Defined stream error conditions (RFC6120 section 4.9.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("invalid-xml")]
    InvalidXml,
    #[error("invalid-namespace")]
    InvalidNamespace,
    #[error("host-unknown")]
    HostUnknown,
    #[error("invalid-from")]
    InvalidFrom,
    #[error("connection-timeout")]
    ConnectionTimeout,
    #[error("unsupported-stanza-type")]
    UnsupportedStanzaType,
    #[error("unsupported-version")]
    UnsupportedVersion,
    #[error("not-authorized")]
    NotAuthorized,
    #[error("system-shutdown")]
    SystemShutdown,
    #[error("resource-constraint")]
    ResourceConstraint,
    #[error("internal-server-error")]
    InternalServerError,
}

impl StreamError {
    /// Renders the `<stream:error/>` element.
    pub fn to_element(&self) -> Element {
        Element::builder("stream:error")
            .child(
                Element::builder(self.to_string())
                    .namespace(ns::STREAMS)
                    .build(),
            )
            .build()
    }
}

/// Resource binding refusals (RFC6120 section 7.6.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum BindError {
    /// Binding was requested before SASL succeeded.
    #[error("stream is not authenticated")]
    NotAuthenticated,
    /// The stream already has a resource.
    #[error("stream is already bound")]
    AlreadyBound,
    /// Another stream of the same user holds the resource.
    #[error("resource conflict")]
    Conflict,
}

impl BindError {
    /// The stanza error condition reported to the client.
    pub fn condition(&self) -> &'static str {
        match *self {
            BindError::NotAuthenticated => "not-authorized",
            BindError::AlreadyBound => "not-allowed",
            BindError::Conflict => "conflict",
        }
    }
}

/// Failures reported by a repository implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend couldn't be reached or didn't answer in time.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// A stored record couldn't be interpreted.
    #[error("corrupted record: {0}")]
    Corrupted(String),
}

/// Start-up configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The pepper ring has no keys.
    #[error("no pepper keys configured")]
    EmptyPeppers,
    /// A pepper secret is shorter than the required minimum.
    #[error("pepper '{id}' must be at least {min} characters long")]
    ShortPepper {
        /// Offending pepper id
        id: String,
        /// Required length
        min: usize,
    },
    /// The active pepper id doesn't name a configured key.
    #[error("active pepper '{0}' is not a configured key")]
    UnknownActivePepper(String),
    /// An environment value couldn't be parsed.
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
    },
    /// A required value is missing.
    #[error("missing required value {0}")]
    Missing(&'static str),
}

/// Failures talking to the external PLAIN credential oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The channel couldn't be set up or the connection broke.
    #[error("oracle transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    /// The oracle answered with a non-OK status.
    #[error("oracle returned status {code:?}: {message}")]
    Status {
        /// gRPC status code
        code: tonic::Code,
        /// Status message
        message: String,
    },
    /// The request didn't complete before its deadline.
    #[error("oracle request timed out")]
    Timeout,
}

impl From<tonic::Status> for OracleError {
    fn from(status: tonic::Status) -> Self {
        OracleError::Status {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

/// Failures while hashing and persisting credentials.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The repository failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The OS random number generator failed.
    #[error("couldn't sample salt: {0}")]
    Entropy(#[from] rand::Error),
    /// A record references a pepper that isn't configured.
    #[error("unknown pepper id '{0}'")]
    UnknownPepper(String),
}

/// Failures of the user administration surface.
#[derive(Debug, Error)]
pub enum AdminError {
    /// The user doesn't exist.
    #[error("user '{0}' not found")]
    UserNotFound(String),
    /// The username is empty.
    #[error("invalid username")]
    InvalidUsername,
    /// Credential hashing or storage failed.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl From<StoreError> for AdminError {
    fn from(err: StoreError) -> Self {
        AdminError::Vault(VaultError::Store(err))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use self::Field::*;
        match *self {
            ChannelBinding => write!(fmt, "gs2-bind-flag"),
            Authzid => write!(fmt, "authzid"),
            Authcid => write!(fmt, "n"),
            Nonce => write!(fmt, "r"),
            Attribute => write!(fmt, "attribute"),
            Salt => write!(fmt, "s"),
            Iterations => write!(fmt, "i"),
            VerifyOrError => write!(fmt, "v"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SaslError, StoreError, StreamError};

    #[test]
    fn test_sasl_failure_element() {
        let elem = SaslError::NotAuthorized.to_element();
        assert_eq!(
            elem.to_string(),
            "<failure xmlns=\"urn:ietf:params:xml:ns:xmpp-sasl\"><not-authorized/></failure>"
        );
    }

    #[test]
    fn test_temporary_failure_hides_cause() {
        let err: SaslError = StoreError::Unavailable("db down".into()).into();
        assert_eq!(err.condition(), "temporary-auth-failure");
        assert!(!err.to_element().to_string().contains("db down"));
        assert!(err.to_string().contains("db down"));
    }

    #[test]
    fn test_stream_error_element() {
        assert_eq!(
            StreamError::HostUnknown.to_element().to_string(),
            "<stream:error><host-unknown xmlns=\"urn:ietf:params:xml:ns:xmpp-streams\"/></stream:error>"
        );
    }
}
