use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImportState {
    Pending,
    Completed,
    Failed,
    Acknowledged,
}

/// Single per-user status record for the detached import job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportNotification {
    pub status: ImportState,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ImportNotification {
    /// Pending and written at or after `stale_before`. Older pending records
    /// belong to imports that never reported back.
    pub fn is_in_progress(&self, stale_before: DateTime<Utc>) -> bool {
        self.status == ImportState::Pending && self.timestamp >= stale_before
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Only products not already in the library
    New,
    /// Replace every PC game with the account's products
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ImportRequest {
    Titles {
        titles: Vec<String>,
    },
    StorefrontAccount {
        account: String,
        mode: ImportMode,
    },
}
