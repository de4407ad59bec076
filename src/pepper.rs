//! Server-side pepper secrets.
//!
//! Every stored SCRAM digest is derived from `salt || pepper`. The pepper never touches the
//! database, so stolen rows alone don't allow offline guessing. Operators rotate peppers by adding
//! a new key and switching the active id: new and updated accounts use the active pepper while
//! existing records keep verifying against the id they were created with.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::error::ConfigError;

/// Minimum length of a pepper secret.
pub const MIN_PEPPER_LENGTH: usize = 24;

/// Pepper configuration as loaded at start-up.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PepperConfig {
    /// Pepper secrets by id.
    pub keys: BTreeMap<String, String>,
    /// Id of the pepper used for new digests.
    pub use_id: String,
}

/// An immutable keyed set of pepper secrets with one active entry.
#[derive(Clone)]
pub struct PepperRing {
    keys: BTreeMap<String, String>,
    active_id: String,
}

impl PepperRing {
    /// Validates `config` and builds the ring.
    pub fn new(config: PepperConfig) -> Result<Self, ConfigError> {
        if config.keys.is_empty() {
            return Err(ConfigError::EmptyPeppers);
        }
        if let Some((id, _)) = config
            .keys
            .iter()
            .find(|(_, secret)| secret.len() < MIN_PEPPER_LENGTH)
        {
            return Err(ConfigError::ShortPepper {
                id: id.clone(),
                min: MIN_PEPPER_LENGTH,
            });
        }
        if !config.keys.contains_key(&config.use_id) {
            return Err(ConfigError::UnknownActivePepper(config.use_id));
        }
        Ok(PepperRing {
            keys: config.keys,
            active_id: config.use_id,
        })
    }

    /// Returns the secret stored under `id`.
    pub fn value_of(&self, id: &str) -> Option<&str> {
        self.keys.get(id).map(String::as_str)
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    pub fn active_value(&self) -> &str {
        // The constructor guarantees the active id is a key.
        self.keys
            .get(&self.active_id)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

// Secrets stay out of logs.
impl fmt::Debug for PepperRing {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("PepperRing")
            .field("ids", &self.keys.keys().collect::<Vec<_>>())
            .field("active_id", &self.active_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{PepperConfig, PepperRing, MIN_PEPPER_LENGTH};
    use crate::error::ConfigError;

    fn config(keys: &[(&str, &str)], use_id: &str) -> PepperConfig {
        PepperConfig {
            keys: keys
                .iter()
                .map(|(id, secret)| (id.to_string(), secret.to_string()))
                .collect(),
            use_id: use_id.to_string(),
        }
    }

    #[test]
    fn test_valid_ring() {
        let ring = PepperRing::new(config(
            &[("v1", "6ZavKvaLqSFGM5zDnFq7WWih"), ("v2", "Vf4KTg1CcmzwZ8ybrTIu6WwZpGsR")],
            "v2",
        ))
        .unwrap();
        assert_eq!(ring.active_id(), "v2");
        assert_eq!(ring.active_value(), "Vf4KTg1CcmzwZ8ybrTIu6WwZpGsR");
        assert_eq!(ring.value_of("v1"), Some("6ZavKvaLqSFGM5zDnFq7WWih"));
        assert_eq!(ring.value_of("v3"), None);
    }

    #[test]
    fn test_empty_keys() {
        assert_eq!(PepperRing::new(config(&[], "v1")).unwrap_err(), ConfigError::EmptyPeppers);
    }

    #[test]
    fn test_short_key() {
        assert_eq!(
            PepperRing::new(config(&[("v1", "6ZavKvaLqSFGM5zDnFq7WWih"), ("v2", "short")], "v1"))
                .unwrap_err(),
            ConfigError::ShortPepper {
                id: "v2".into(),
                min: MIN_PEPPER_LENGTH,
            }
        );
    }

    #[test]
    fn test_unknown_active_id() {
        assert_eq!(
            PepperRing::new(config(&[("v1", "6ZavKvaLqSFGM5zDnFq7WWih")], "v9")).unwrap_err(),
            ConfigError::UnknownActivePepper("v9".into())
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let ring = PepperRing::new(config(&[("v1", "6ZavKvaLqSFGM5zDnFq7WWih")], "v1")).unwrap();
        assert!(!format!("{:?}", ring).contains("6ZavKvaLqSFGM5zDnFq7WWih"));
    }
}
