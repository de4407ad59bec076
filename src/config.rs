//! Server configuration.
//!
//! [`Config`](struct.Config.html) deserializes with serde from whatever format the embedding
//! binary reads, or is assembled from `XMPP_*` environment variables by
//! [`Config::from_env`](struct.Config.html#method.from_env).

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::c2s::ResourceConflictPolicy;
use crate::error::ConfigError;
use crate::pepper::PepperConfig;
use crate::sasl::Mechanism;

/// Default C2S listener port.
pub const DEFAULT_LISTENER_PORT: u16 = 5222;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Domain served to clients.
    pub domain: String,
    pub listener_port: u16,
    pub peppers: PepperConfig,
    pub sasl: SaslConfig,
    pub resource_conflict: ResourceConflictPolicy,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SaslConfig {
    /// Offered mechanisms, in advertisement order.
    pub mechanisms: Vec<Mechanism>,
    /// Offer SCRAM as `-PLUS` and accept channel binding.
    pub channel_binding: bool,
    pub oracle: OracleConfig,
}

/// Connection settings of the PLAIN credential oracle.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Endpoint URIs, e.g. `http://127.0.0.1:50051`. Calls are balanced across all of them.
    pub addresses: Vec<String>,
    /// Deadline of a single call, also used as connect timeout.
    pub timeout: Duration,
    /// HTTP/2 keepalive ping interval.
    pub keepalive_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            domain: "localhost".to_string(),
            listener_port: DEFAULT_LISTENER_PORT,
            peppers: PepperConfig::default(),
            sasl: SaslConfig::default(),
            resource_conflict: ResourceConflictPolicy::default(),
        }
    }
}

impl Default for SaslConfig {
    fn default() -> Self {
        SaslConfig {
            mechanisms: Mechanism::ALL.to_vec(),
            channel_binding: false,
            oracle: OracleConfig::default(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            addresses: Vec::new(),
            timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// * `XMPP_DOMAIN`
    /// * `XMPP_LISTENER_PORT`
    /// * `XMPP_PEPPER_KEYS` - `id:secret` pairs separated by commas (required)
    /// * `XMPP_PEPPER_USE` - active pepper id (required)
    /// * `XMPP_SASL_MECHANISMS` - comma separated mechanism names
    /// * `XMPP_SASL_CHANNEL_BINDING` - `true` or `false`
    /// * `XMPP_ORACLE_ADDRESSES` - comma separated oracle URIs
    /// * `XMPP_RESOURCE_CONFLICT` - `reject` or `override`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](#method.from_env) reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(domain) = lookup("XMPP_DOMAIN") {
            config.domain = domain;
        }
        if let Some(port) = lookup("XMPP_LISTENER_PORT") {
            config.listener_port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "XMPP_LISTENER_PORT",
                value: port.clone(),
            })?;
        }

        let keys = lookup("XMPP_PEPPER_KEYS").ok_or(ConfigError::Missing("XMPP_PEPPER_KEYS"))?;
        config.peppers.keys = parse_pepper_keys(&keys)?;
        config.peppers.use_id = lookup("XMPP_PEPPER_USE").ok_or(ConfigError::Missing("XMPP_PEPPER_USE"))?;

        if let Some(mechanisms) = lookup("XMPP_SASL_MECHANISMS") {
            config.sasl.mechanisms = split_list(&mechanisms)
                .map(|name| Mechanism::try_from(name.to_string()))
                .collect::<Result<_, _>>()?;
        }
        if let Some(flag) = lookup("XMPP_SASL_CHANNEL_BINDING") {
            config.sasl.channel_binding = flag.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "XMPP_SASL_CHANNEL_BINDING",
                value: flag.clone(),
            })?;
        }
        if let Some(addresses) = lookup("XMPP_ORACLE_ADDRESSES") {
            config.sasl.oracle.addresses = split_list(&addresses).map(str::to_string).collect();
        }
        if let Some(policy) = lookup("XMPP_RESOURCE_CONFLICT") {
            config.resource_conflict = match policy.trim() {
                "reject" => ResourceConflictPolicy::Reject,
                "override" => ResourceConflictPolicy::Override,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "XMPP_RESOURCE_CONFLICT",
                        value: policy,
                    })
                }
            };
        }
        Ok(config)
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn parse_pepper_keys(value: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    split_list(value)
        .map(|pair| match pair.split_once(':') {
            Some((id, secret)) if !id.is_empty() => Ok((id.to_string(), secret.to_string())),
            _ => Err(ConfigError::InvalidValue {
                key: "XMPP_PEPPER_KEYS",
                value: pair.to_string(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::Config;
    use crate::c2s::ResourceConflictPolicy;
    use crate::error::ConfigError;
    use crate::sasl::{Mechanism, ScramHash};

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_full_environment() {
        let config = load(&[
            ("XMPP_DOMAIN", "jackal.im"),
            ("XMPP_LISTENER_PORT", "5223"),
            ("XMPP_PEPPER_KEYS", "v1:6ZavKvaLqSFGM5zDnFq7WWih, v2:Xk3uP9qLm2Zr7tWy4Vb8Nc1D"),
            ("XMPP_PEPPER_USE", "v2"),
            ("XMPP_SASL_MECHANISMS", "scram-sha-256,PLAIN"),
            ("XMPP_SASL_CHANNEL_BINDING", "true"),
            ("XMPP_ORACLE_ADDRESSES", "http://10.0.0.1:50051,http://10.0.0.2:50051"),
            ("XMPP_RESOURCE_CONFLICT", "override"),
        ])
        .unwrap();
        assert_eq!(config.domain, "jackal.im");
        assert_eq!(config.listener_port, 5223);
        assert_eq!(config.peppers.keys.len(), 2);
        assert_eq!(config.peppers.keys["v1"], "6ZavKvaLqSFGM5zDnFq7WWih");
        assert_eq!(config.peppers.use_id, "v2");
        assert_eq!(
            config.sasl.mechanisms,
            vec![Mechanism::Scram(ScramHash::Sha256), Mechanism::Plain]
        );
        assert!(config.sasl.channel_binding);
        assert_eq!(config.sasl.oracle.addresses.len(), 2);
        assert_eq!(config.resource_conflict, ResourceConflictPolicy::Override);
    }

    #[test]
    fn test_defaults_and_errors() {
        let config = load(&[("XMPP_PEPPER_KEYS", "v1:secret"), ("XMPP_PEPPER_USE", "v1")]).unwrap();
        assert_eq!(config.listener_port, 5222);
        assert_eq!(config.sasl.mechanisms, Mechanism::ALL.to_vec());
        assert!(!config.sasl.channel_binding);

        assert_eq!(
            load(&[]).unwrap_err(),
            ConfigError::Missing("XMPP_PEPPER_KEYS")
        );
        assert_eq!(
            load(&[("XMPP_PEPPER_KEYS", "nocolon"), ("XMPP_PEPPER_USE", "v1")]).unwrap_err(),
            ConfigError::InvalidValue {
                key: "XMPP_PEPPER_KEYS",
                value: "nocolon".into()
            }
        );
        assert!(load(&[
            ("XMPP_PEPPER_KEYS", "v1:secret"),
            ("XMPP_PEPPER_USE", "v1"),
            ("XMPP_LISTENER_PORT", "70000"),
        ])
        .is_err());
    }
}
