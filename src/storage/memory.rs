use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{
    BlockListRepository, CapabilitiesRepository, OfflineRepository, PrivateRepository, Result,
    RosterRepository, UserRepository, VCardRepository,
};
use crate::error::StoreError;
use crate::model::{BlockListItem, CapsRecord, RosterItem, UserRecord};
use crate::xml::Element;

#[derive(Default)]
struct Tables {
    users: HashMap<String, UserRecord>,
    capabilities: HashMap<(String, String), CapsRecord>,
    privates: HashMap<String, HashMap<String, Element>>,
    rosters: HashMap<String, Vec<RosterItem>>,
    block_lists: HashMap<String, Vec<BlockListItem>>,
    offline: HashMap<String, Vec<Element>>,
    vcards: HashMap<String, Element>,
}

/// Process-local repository.
///
/// [`set_unavailable`](#method.set_unavailable) makes every call fail with
/// `StoreError::Unavailable`, which lets callers exercise their backend-failure paths.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles simulated backend outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory repository offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryRepository {
    async fn upsert_user(&self, user: &UserRecord) -> Result<()> {
        self.check()?;
        self.tables
            .write()
            .users
            .insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> Result<()> {
        self.check()?;
        self.tables.write().users.remove(username);
        Ok(())
    }

    async fn fetch_user(&self, username: &str) -> Result<Option<UserRecord>> {
        self.check()?;
        Ok(self.tables.read().users.get(username).cloned())
    }

    async fn user_exists(&self, username: &str) -> Result<bool> {
        self.check()?;
        Ok(self.tables.read().users.contains_key(username))
    }
}

#[async_trait]
impl CapabilitiesRepository for MemoryRepository {
    async fn upsert_capabilities(&self, caps: &CapsRecord) -> Result<()> {
        self.check()?;
        self.tables
            .write()
            .capabilities
            .insert((caps.node.clone(), caps.ver.clone()), caps.clone());
        Ok(())
    }

    async fn capabilities_exist(&self, node: &str, ver: &str) -> Result<bool> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .capabilities
            .contains_key(&(node.to_string(), ver.to_string())))
    }

    async fn fetch_capabilities(&self, node: &str, ver: &str) -> Result<Option<CapsRecord>> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .capabilities
            .get(&(node.to_string(), ver.to_string()))
            .cloned())
    }
}

#[async_trait]
impl PrivateRepository for MemoryRepository {
    async fn upsert_private(
        &self,
        private: &Element,
        namespace: &str,
        username: &str,
    ) -> Result<()> {
        self.check()?;
        self.tables
            .write()
            .privates
            .entry(username.to_string())
            .or_default()
            .insert(namespace.to_string(), private.clone());
        Ok(())
    }

    async fn fetch_private(&self, namespace: &str, username: &str) -> Result<Option<Element>> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .privates
            .get(username)
            .and_then(|privates| privates.get(namespace))
            .cloned())
    }

    async fn delete_privates(&self, username: &str) -> Result<()> {
        self.check()?;
        self.tables.write().privates.remove(username);
        Ok(())
    }
}

#[async_trait]
impl RosterRepository for MemoryRepository {
    async fn upsert_roster_item(&self, item: &RosterItem) -> Result<()> {
        self.check()?;
        let mut tables = self.tables.write();
        let items = tables.rosters.entry(item.username.clone()).or_default();
        match items.iter_mut().find(|existing| existing.jid == item.jid) {
            Some(existing) => *existing = item.clone(),
            None => items.push(item.clone()),
        }
        Ok(())
    }

    async fn delete_roster_item(&self, username: &str, jid: &str) -> Result<()> {
        self.check()?;
        if let Some(items) = self.tables.write().rosters.get_mut(username) {
            items.retain(|item| item.jid != jid);
        }
        Ok(())
    }

    async fn fetch_roster_items(&self, username: &str) -> Result<Vec<RosterItem>> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .rosters
            .get(username)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl BlockListRepository for MemoryRepository {
    async fn upsert_block_list_item(&self, item: &BlockListItem) -> Result<()> {
        self.check()?;
        let mut tables = self.tables.write();
        let items = tables.block_lists.entry(item.username.clone()).or_default();
        if !items.contains(item) {
            items.push(item.clone());
        }
        Ok(())
    }

    async fn delete_block_list_item(&self, item: &BlockListItem) -> Result<()> {
        self.check()?;
        if let Some(items) = self.tables.write().block_lists.get_mut(&item.username) {
            items.retain(|existing| existing != item);
        }
        Ok(())
    }

    async fn fetch_block_list_items(&self, username: &str) -> Result<Vec<BlockListItem>> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .block_lists
            .get(username)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl OfflineRepository for MemoryRepository {
    async fn insert_offline_message(&self, message: &Element, username: &str) -> Result<()> {
        self.check()?;
        self.tables
            .write()
            .offline
            .entry(username.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn count_offline_messages(&self, username: &str) -> Result<usize> {
        self.check()?;
        Ok(self.tables.read().offline.get(username).map_or(0, Vec::len))
    }

    async fn fetch_offline_messages(&self, username: &str) -> Result<Vec<Element>> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .offline
            .get(username)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_offline_messages(&self, username: &str) -> Result<()> {
        self.check()?;
        self.tables.write().offline.remove(username);
        Ok(())
    }
}

#[async_trait]
impl VCardRepository for MemoryRepository {
    async fn upsert_vcard(&self, vcard: &Element, username: &str) -> Result<()> {
        self.check()?;
        self.tables
            .write()
            .vcards
            .insert(username.to_string(), vcard.clone());
        Ok(())
    }

    async fn fetch_vcard(&self, username: &str) -> Result<Option<Element>> {
        self.check()?;
        Ok(self.tables.read().vcards.get(username).cloned())
    }

    async fn delete_vcard(&self, username: &str) -> Result<()> {
        self.check()?;
        self.tables.write().vcards.remove(username);
        Ok(())
    }
}
