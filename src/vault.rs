//! Credential vault: turns cleartext passwords into stored SCRAM credentials.

use std::num::NonZeroU32;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use crate::error::VaultError;
use crate::model::{ScramBlock, UserRecord};
use crate::pepper::PepperRing;
use crate::sasl::scram::{hash_password, ScramHash};
use crate::storage::UserRepository;

/// PBKDF2 iterations used for every new or updated record.
pub const ITERATION_COUNT: u32 = 15_000;

/// Length of the random part of a salt.
pub const SALT_LENGTH: usize = 32;

/// Creates, rotates and looks up user credentials.
///
/// Passwords are never stored. Each write samples a fresh salt, peppers it with the active
/// pepper and stores the four SCRAM digests alongside the salt and pepper id.
#[derive(Clone)]
pub struct CredentialVault {
    users: Arc<dyn UserRepository>,
    peppers: Arc<PepperRing>,
}

impl CredentialVault {
    pub fn new(users: Arc<dyn UserRepository>, peppers: Arc<PepperRing>) -> Self {
        CredentialVault {
            users: users,
            peppers: peppers,
        }
    }

    /// Hashes `password` and stores the resulting record, replacing any previous one.
    pub async fn upsert_user(&self, username: &str, password: &str) -> Result<UserRecord, VaultError> {
        let user = UserRecord {
            username: username.to_string(),
            scram: self.derive(password)?,
        };
        self.users.upsert_user(&user).await?;
        debug!(username = %username, pepper_id = %user.scram.pepper_id, "credentials stored");
        Ok(user)
    }

    pub async fn fetch_user(&self, username: &str) -> Result<Option<UserRecord>, VaultError> {
        Ok(self.users.fetch_user(username).await?)
    }

    pub async fn delete_user(&self, username: &str) -> Result<(), VaultError> {
        Ok(self.users.delete_user(username).await?)
    }

    pub async fn user_exists(&self, username: &str) -> Result<bool, VaultError> {
        Ok(self.users.user_exists(username).await?)
    }

    fn derive(&self, password: &str) -> Result<ScramBlock, VaultError> {
        let mut salt = [0u8; SALT_LENGTH];
        OsRng.try_fill_bytes(&mut salt)?;

        let mut peppered = salt.to_vec();
        peppered.extend_from_slice(self.peppers.active_value().as_bytes());

        let iterations = NonZeroU32::new(ITERATION_COUNT).unwrap_or(NonZeroU32::MIN);
        let digest = |hash| {
            URL_SAFE_NO_PAD.encode(hash_password(hash, password.as_bytes(), &peppered, iterations))
        };
        Ok(ScramBlock {
            sha1: digest(ScramHash::Sha1),
            sha256: digest(ScramHash::Sha256),
            sha512: digest(ScramHash::Sha512),
            sha3_512: digest(ScramHash::Sha3_512),
            salt: URL_SAFE_NO_PAD.encode(salt),
            iteration_count: ITERATION_COUNT,
            pepper_id: self.peppers.active_id().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    use super::{CredentialVault, ITERATION_COUNT, SALT_LENGTH};
    use crate::pepper::{PepperConfig, PepperRing};
    use crate::sasl::scram::ScramHash;
    use crate::storage::MemoryRepository;

    fn vault(repo: Arc<MemoryRepository>) -> CredentialVault {
        let config = PepperConfig {
            keys: vec![
                ("v1".to_string(), "6ZavKvaLqSFGM5zDnFq7WWih".to_string()),
                ("v2".to_string(), "Xk3uP9qLm2Zr7tWy4Vb8Nc1D".to_string()),
            ]
            .into_iter()
            .collect(),
            use_id: "v2".into(),
        };
        CredentialVault::new(repo, Arc::new(PepperRing::new(config).unwrap()))
    }

    #[tokio::test]
    async fn test_record_layout() {
        let vault = vault(Arc::new(MemoryRepository::new()));
        let user = vault.upsert_user("ortuman", "1234").await.unwrap();
        assert_eq!(user.scram.iteration_count, ITERATION_COUNT);
        assert_eq!(user.scram.pepper_id, "v2");
        assert_eq!(URL_SAFE_NO_PAD.decode(&user.scram.salt).unwrap().len(), SALT_LENGTH);
        for hash in ScramHash::ALL.iter() {
            let digest = URL_SAFE_NO_PAD.decode(hash.stored_digest(&user.scram)).unwrap();
            assert_eq!(digest.len(), hash.key_len());
        }
        assert_eq!(vault.fetch_user("ortuman").await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn test_fresh_salt_per_write() {
        let vault = vault(Arc::new(MemoryRepository::new()));
        let first = vault.upsert_user("ortuman", "1234").await.unwrap();
        let second = vault.upsert_user("ortuman", "1234").await.unwrap();
        assert_ne!(first.scram.salt, second.scram.salt);
        assert_ne!(first.scram.sha256, second.scram.sha256);
    }

    #[tokio::test]
    async fn test_store_failures_propagate() {
        let repo = Arc::new(MemoryRepository::new());
        let vault = vault(repo.clone());
        vault.upsert_user("ortuman", "1234").await.unwrap();
        repo.set_unavailable(true);
        assert!(vault.fetch_user("ortuman").await.is_err());
        assert!(vault.upsert_user("ortuman", "1234").await.is_err());
        repo.set_unavailable(false);
        assert!(vault.user_exists("ortuman").await.unwrap());
        vault.delete_user("ortuman").await.unwrap();
        assert!(!vault.user_exists("ortuman").await.unwrap());
    }
}
