//! Repository interface for campaign, invitation and contact records.
//!
//! The engine only depends on this trait; the in-memory implementation
//! backs tests and the default server wiring.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::model::{Campaign, Contact, Invitation};

/// Durable store for Campaign, Invitation and Contact records.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_campaign(&self, campaign: &Campaign) -> Result<()>;
    async fn save_campaign(&self, campaign: &Campaign) -> Result<()>;
    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>>;
    /// All campaigns ordered by creation time, oldest first.
    async fn list_campaigns(&self) -> Result<Vec<Campaign>>;

    async fn create_invitation(&self, invitation: &Invitation) -> Result<()>;
    async fn get_invitation(&self, id: Uuid) -> Result<Option<Invitation>>;
    async fn save_invitation(&self, invitation: &Invitation) -> Result<()>;

    /// Insert contacts, updating entries whose phone already exists.
    async fn upsert_contacts(&self, contacts: &[Contact]) -> Result<()>;
    async fn list_contacts(&self) -> Result<Vec<Contact>>;
}

/// In-memory repository guarded by async RwLocks.
#[derive(Default)]
pub struct MemoryRepository {
    campaigns: RwLock<HashMap<Uuid, Campaign>>,
    invitations: RwLock<HashMap<Uuid, Invitation>>,
    contacts: RwLock<HashMap<String, Contact>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_campaign(&self, campaign: &Campaign) -> Result<()> {
        self.campaigns
            .write()
            .await
            .insert(campaign.id, campaign.clone());
        Ok(())
    }

    async fn save_campaign(&self, campaign: &Campaign) -> Result<()> {
        self.campaigns
            .write()
            .await
            .insert(campaign.id, campaign.clone());
        Ok(())
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>> {
        Ok(self.campaigns.read().await.get(&id).cloned())
    }

    async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        let mut campaigns: Vec<Campaign> =
            self.campaigns.read().await.values().cloned().collect();
        campaigns.sort_by_key(|c| c.created_at);
        Ok(campaigns)
    }

    async fn create_invitation(&self, invitation: &Invitation) -> Result<()> {
        self.invitations
            .write()
            .await
            .insert(invitation.id, invitation.clone());
        Ok(())
    }

    async fn get_invitation(&self, id: Uuid) -> Result<Option<Invitation>> {
        Ok(self.invitations.read().await.get(&id).cloned())
    }

    async fn save_invitation(&self, invitation: &Invitation) -> Result<()> {
        self.invitations
            .write()
            .await
            .insert(invitation.id, invitation.clone());
        Ok(())
    }

    async fn upsert_contacts(&self, contacts: &[Contact]) -> Result<()> {
        let mut map = self.contacts.write().await;
        for contact in contacts {
            map.insert(contact.phone.clone(), contact.clone());
        }
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>> {
        let mut contacts: Vec<Contact> = self.contacts.read().await.values().cloned().collect();
        contacts.sort_by(|a, b| a.phone.cmp(&b.phone));
        Ok(contacts)
    }
}
