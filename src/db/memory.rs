use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

use super::store::{
    CommitReceipt, GameStore, LibrarySnapshot, SnapshotHub, UserDocuments, WriteBatch,
};
use crate::{
    error::AppResult,
    models::{ImportNotification, UserId, UserProfile},
};

/// Process-local store. Each commit holds the write lock while it applies the
/// batch to a copy of the user's documents, then swaps the copy in.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<UserId, UserDocuments>>,
    hub: SnapshotHub,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl GameStore for MemoryStore {
    async fn snapshot(&self, user: &UserId) -> AppResult<LibrarySnapshot> {
        let users = self.users.read().await;
        Ok(users.get(user).map(UserDocuments::snapshot).unwrap_or_default())
    }

    async fn profile(&self, user: &UserId) -> AppResult<UserProfile> {
        let users = self.users.read().await;
        Ok(users.get(user).map(|d| d.profile.clone()).unwrap_or_default())
    }

    async fn import_status(&self, user: &UserId) -> AppResult<Option<ImportNotification>> {
        let users = self.users.read().await;
        Ok(users.get(user).and_then(|d| d.import_status.clone()))
    }

    async fn commit(&self, user: &UserId, batch: WriteBatch) -> AppResult<CommitReceipt> {
        let mut users = self.users.write().await;

        let mut staged = users.get(user).cloned().unwrap_or_default();
        let (receipt, changes) = staged.apply(batch)?;

        let snapshot = changes
            .iter()
            .any(|c| c.touches_library())
            .then(|| staged.snapshot());
        users.insert(user.clone(), staged);
        drop(users);

        if let Some(snapshot) = snapshot {
            self.hub.publish(user, snapshot);
        }

        tracing::debug!(user = %user, changes = changes.len(), "Committed batch");
        Ok(receipt)
    }

    fn subscribe(&self, user: &UserId) -> broadcast::Receiver<LibrarySnapshot> {
        self.hub.subscribe(user)
    }
}
