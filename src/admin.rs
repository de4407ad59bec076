//! User administration on top of the credential vault.

use tokio::sync::broadcast;
use tracing::info;

use crate::error::AdminError;
use crate::vault::CredentialVault;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notifications fired by [`UserAdmin`](struct.UserAdmin.html).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Created { username: String },
    Deleted { username: String },
}

/// Creates, updates and deletes users.
#[derive(Clone)]
pub struct UserAdmin {
    vault: CredentialVault,
    events: broadcast::Sender<UserEvent>,
}

impl UserAdmin {
    pub fn new(vault: CredentialVault) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        UserAdmin {
            vault: vault,
            events: events,
        }
    }

    /// Subscribes to user events fired from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<UserEvent> {
        self.events.subscribe()
    }

    /// Creates `username`, replacing the credentials of an existing user with the same name.
    pub async fn create_user(&self, username: &str, password: &str) -> Result<(), AdminError> {
        if username.is_empty() {
            return Err(AdminError::InvalidUsername);
        }
        self.vault.upsert_user(username, password).await?;
        info!(username = %username, "user created");
        self.fire(UserEvent::Created {
            username: username.to_string(),
        });
        Ok(())
    }

    /// Rotates the credentials of an existing user. The new record uses the active pepper.
    pub async fn change_user_password(&self, username: &str, password: &str) -> Result<(), AdminError> {
        if !self.vault.user_exists(username).await? {
            return Err(AdminError::UserNotFound(username.to_string()));
        }
        self.vault.upsert_user(username, password).await?;
        info!(username = %username, "user password changed");
        Ok(())
    }

    pub async fn delete_user(&self, username: &str) -> Result<(), AdminError> {
        if !self.vault.user_exists(username).await? {
            return Err(AdminError::UserNotFound(username.to_string()));
        }
        self.vault.delete_user(username).await?;
        info!(username = %username, "user deleted");
        self.fire(UserEvent::Deleted {
            username: username.to_string(),
        });
        Ok(())
    }

    fn fire(&self, event: UserEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{UserAdmin, UserEvent};
    use crate::error::AdminError;
    use crate::pepper::{PepperConfig, PepperRing};
    use crate::storage::MemoryRepository;
    use crate::vault::CredentialVault;

    fn admin() -> UserAdmin {
        let config = PepperConfig {
            keys: vec![("v1".to_string(), "6ZavKvaLqSFGM5zDnFq7WWih".to_string())]
                .into_iter()
                .collect(),
            use_id: "v1".into(),
        };
        let peppers = Arc::new(PepperRing::new(config).unwrap());
        UserAdmin::new(CredentialVault::new(Arc::new(MemoryRepository::new()), peppers))
    }

    #[tokio::test]
    async fn test_user_lifecycle_events() {
        let admin = admin();
        let mut events = admin.subscribe();

        admin.create_user("ortuman", "1234").await.unwrap();
        admin.change_user_password("ortuman", "4321").await.unwrap();
        admin.delete_user("ortuman").await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            UserEvent::Created {
                username: "ortuman".into()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            UserEvent::Deleted {
                username: "ortuman".into()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_users() {
        let admin = admin();
        match admin.change_user_password("noelia", "1234").await {
            Err(AdminError::UserNotFound(username)) => assert_eq!(username, "noelia"),
            other => panic!("unexpected result: {:?}", other),
        }
        match admin.delete_user("noelia").await {
            Err(AdminError::UserNotFound(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        match admin.create_user("", "1234").await {
            Err(AdminError::InvalidUsername) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
