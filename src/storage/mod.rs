//! Repository seams.
//!
//! The core only depends on these traits. SQL or key-value adapters implement them outside this
//! crate; [`MemoryRepository`] backs tests and single-node deployments.

mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{BlockListItem, CapsRecord, RosterItem, UserRecord};
use crate::xml::Element;

pub use self::memory::MemoryRepository;

/// A convenient result type for repository calls.
pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts or replaces the record keyed by its username.
    async fn upsert_user(&self, user: &UserRecord) -> Result<()>;

    async fn delete_user(&self, username: &str) -> Result<()>;

    /// Returns `Ok(None)` when the user doesn't exist.
    async fn fetch_user(&self, username: &str) -> Result<Option<UserRecord>>;

    async fn user_exists(&self, username: &str) -> Result<bool>;
}

#[async_trait]
pub trait CapabilitiesRepository: Send + Sync {
    async fn upsert_capabilities(&self, caps: &CapsRecord) -> Result<()>;

    async fn capabilities_exist(&self, node: &str, ver: &str) -> Result<bool>;

    async fn fetch_capabilities(&self, node: &str, ver: &str) -> Result<Option<CapsRecord>>;
}

/// Private XML storage (XEP-0049), keyed by user and namespace.
#[async_trait]
pub trait PrivateRepository: Send + Sync {
    async fn upsert_private(&self, private: &Element, namespace: &str, username: &str)
        -> Result<()>;

    async fn fetch_private(&self, namespace: &str, username: &str) -> Result<Option<Element>>;

    /// Removes every private element of `username`.
    async fn delete_privates(&self, username: &str) -> Result<()>;
}

#[async_trait]
pub trait RosterRepository: Send + Sync {
    async fn upsert_roster_item(&self, item: &RosterItem) -> Result<()>;

    async fn delete_roster_item(&self, username: &str, jid: &str) -> Result<()>;

    async fn fetch_roster_items(&self, username: &str) -> Result<Vec<RosterItem>>;
}

#[async_trait]
pub trait BlockListRepository: Send + Sync {
    async fn upsert_block_list_item(&self, item: &BlockListItem) -> Result<()>;

    async fn delete_block_list_item(&self, item: &BlockListItem) -> Result<()>;

    async fn fetch_block_list_items(&self, username: &str) -> Result<Vec<BlockListItem>>;
}

/// Offline message queue, in arrival order.
#[async_trait]
pub trait OfflineRepository: Send + Sync {
    async fn insert_offline_message(&self, message: &Element, username: &str) -> Result<()>;

    async fn count_offline_messages(&self, username: &str) -> Result<usize>;

    async fn fetch_offline_messages(&self, username: &str) -> Result<Vec<Element>>;

    async fn delete_offline_messages(&self, username: &str) -> Result<()>;
}

#[async_trait]
pub trait VCardRepository: Send + Sync {
    async fn upsert_vcard(&self, vcard: &Element, username: &str) -> Result<()>;

    async fn fetch_vcard(&self, username: &str) -> Result<Option<Element>>;

    async fn delete_vcard(&self, username: &str) -> Result<()>;
}

/// Every repository the server needs, behind one object.
pub trait Repository:
    UserRepository
    + CapabilitiesRepository
    + PrivateRepository
    + RosterRepository
    + BlockListRepository
    + OfflineRepository
    + VCardRepository
{
}

impl<T> Repository for T where
    T: UserRepository
        + CapabilitiesRepository
        + PrivateRepository
        + RosterRepository
        + BlockListRepository
        + OfflineRepository
        + VCardRepository
{
}
