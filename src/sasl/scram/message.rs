use std::fmt;

use tracing::debug;

use crate::error::{Field, SaslError};

/// Rejects the message as malformed, logging which field was at fault.
macro_rules! malformed {
    ($field: expr) => {{
        debug!(field = %$field, "malformed SCRAM client message");
        return Err(SaslError::MalformedRequest);
    }};
}

/// Channel binding posture announced in the GS2 header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Gs2BindFlag {
    /// `n`: the client doesn't support channel binding.
    NotSupported,
    /// `y`: the client supports channel binding but thinks the server doesn't.
    Supported,
    /// `p` or `p=<cb-name>`: the client requires channel binding.
    Required(Option<String>),
}

impl Gs2BindFlag {
    /// Name of the channel binding type the client selected, if any.
    pub fn channel_binding_type(&self) -> Option<&str> {
        match *self {
            Gs2BindFlag::Required(Some(ref name)) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Gs2BindFlag {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Gs2BindFlag::NotSupported => fmt.write_str("n"),
            Gs2BindFlag::Supported => fmt.write_str("y"),
            Gs2BindFlag::Required(None) => fmt.write_str("p"),
            Gs2BindFlag::Required(Some(ref name)) => write!(fmt, "p={}", name),
        }
    }
}

/// Ordered `key=value` attributes of a SCRAM message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    /// Returns the value of the first attribute named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The attribute list as received, which is the `client-first-message-bare` of the exchange.
impl fmt::Display for Attributes {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                fmt.write_str(",")?;
            }
            write!(fmt, "{}={}", key, value)?;
        }
        Ok(())
    }
}

/// A parsed `client-first-message`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientFirst {
    pub bind_flag: Gs2BindFlag,
    pub authzid: Option<String>,
    pub attributes: Attributes,
}

impl ClientFirst {
    /// Parses a client's first message by splitting it on commas and analyzing each part.
    ///
    /// `p` flags are only accepted when `channel_binding` is enabled; otherwise the request isn't
    /// authorized. Any other syntax problem makes the request malformed.
    pub fn parse(data: &str, channel_binding: bool) -> Result<Self, SaslError> {
        let mut parts = data.split(',');

        // Channel binding
        let bind_flag = match parts.next() {
            Some("n") => Gs2BindFlag::NotSupported,
            Some("y") => Gs2BindFlag::Supported,
            Some(part) if part == "p" || part.starts_with("p=") => {
                if !channel_binding {
                    debug!("client requires channel binding but it isn't enabled");
                    return Err(SaslError::NotAuthorized);
                }
                match &part[1..] {
                    "" => Gs2BindFlag::Required(None),
                    name => Gs2BindFlag::Required(Some(name[1..].to_string())),
                }
            }
            _ => malformed!(Field::ChannelBinding),
        };

        // Authzid
        let authzid = match parts.next() {
            Some("") => None,
            Some(part) if part.starts_with("a=") => Some(part[2..].to_string()),
            _ => malformed!(Field::Authzid),
        };

        // Attributes
        let mut attributes = Vec::new();
        for part in parts {
            match part.find('=') {
                Some(idx) if idx > 0 => {
                    attributes.push((part[..idx].to_string(), part[idx + 1..].to_string()))
                }
                _ => malformed!(Field::Attribute),
            }
        }
        let attributes = Attributes(attributes);
        if attributes.get("n").is_none() {
            malformed!(Field::Authcid);
        }
        if attributes.get("r").is_none() {
            malformed!(Field::Nonce);
        }

        Ok(ClientFirst {
            bind_flag: bind_flag,
            authzid: authzid,
            attributes: attributes,
        })
    }

    /// The authentication identity with `=2C` and `=3D` escapes decoded.
    pub fn username(&self) -> String {
        self.attributes
            .get("n")
            .unwrap_or_default()
            .replace("=2C", ",")
            .replace("=3D", "=")
    }

    pub fn nonce(&self) -> &str {
        self.attributes.get("r").unwrap_or_default()
    }

    /// Rebuilds the GS2 header, including its trailing comma.
    pub fn gs2_header(&self) -> String {
        match self.authzid {
            Some(ref authzid) => format!("{},a={},", self.bind_flag, authzid),
            None => format!("{},,", self.bind_flag),
        }
    }

    /// The `client-first-message-bare` used in the auth message.
    pub fn bare(&self) -> String {
        self.attributes.to_string()
    }
}
