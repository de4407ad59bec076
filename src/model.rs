//! Records shared between the vault, the repositories and the C2S layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pre-computed SCRAM credentials of a user.
///
/// All four digests are `PBKDF2(password, salt || pepper, iteration_count)` with the respective
/// hash. Digests and salt are base64url encoded without padding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScramBlock {
    pub sha1: String,
    pub sha256: String,
    pub sha512: String,
    pub sha3_512: String,
    pub salt: String,
    pub iteration_count: u32,
    /// Id of the pepper the digests were derived with.
    pub pepper_id: String,
}

/// A provisioned user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub scram: ScramBlock,
}

/// Entity capabilities (XEP-0115) as cached by the server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapsRecord {
    pub node: String,
    pub ver: String,
    pub features: Vec<String>,
    /// Serialized extended service discovery form, if any.
    pub form: Option<String>,
}

/// Roster subscription state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subscription {
    None,
    From,
    To,
    Both,
    Remove,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterItem {
    /// Owner of the roster.
    pub username: String,
    /// Contact bare JID.
    pub jid: String,
    pub name: String,
    pub subscription: Subscription,
    pub ask: bool,
    pub groups: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockListItem {
    pub username: String,
    pub jid: String,
}

/// An XMPP address: `node@domain/resource`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Jid {
    node: String,
    domain: String,
    resource: String,
}

impl Jid {
    pub fn new<N, D, R>(node: N, domain: D, resource: R) -> Self
    where
        N: Into<String>,
        D: Into<String>,
        R: Into<String>,
    {
        Jid {
            node: node.into(),
            domain: domain.into(),
            resource: resource.into(),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The address without its resource part.
    pub fn to_bare(&self) -> Jid {
        Jid::new(self.node.as_str(), self.domain.as_str(), "")
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if !self.node.is_empty() {
            write!(fmt, "{}@", self.node)?;
        }
        fmt.write_str(&self.domain)?;
        if !self.resource.is_empty() {
            write!(fmt, "/{}", self.resource)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Jid;

    #[test]
    fn test_jid_display() {
        let jid = Jid::new("ortuman", "jackal.im", "balcony");
        assert_eq!(jid.to_string(), "ortuman@jackal.im/balcony");
        assert_eq!(jid.to_bare().to_string(), "ortuman@jackal.im");
        assert_eq!(Jid::new("", "jackal.im", "").to_string(), "jackal.im");
    }
}
