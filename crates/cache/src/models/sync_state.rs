//! Sync metadata per account partition

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The resource families a partition caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Emails,
    Events,
    Contacts,
    Folders,
}

impl Resource {
    pub const ALL: [Resource; 4] = [
        Resource::Emails,
        Resource::Events,
        Resource::Contacts,
        Resource::Folders,
    ];
}

/// Freshness cursor for one resource family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceCursor {
    /// When this resource was last successfully refreshed
    pub refreshed_at: Option<DateTime<Utc>>,
    /// Opaque pagination cursor returned by the remote provider
    pub remote_cursor: Option<String>,
}

/// Tracks sync progress for one account partition
///
/// Persisted alongside the cached records. A cached list answers a read
/// without consulting the remote provider only while its resource cursor is
/// fresher than the configured TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub account_id: String,
    /// When the account last completed a full drain-and-refresh cycle
    pub last_sync_at: Option<DateTime<Utc>>,
    pub emails: ResourceCursor,
    pub events: ResourceCursor,
    pub contacts: ResourceCursor,
    pub folders: ResourceCursor,
}

impl SyncState {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            last_sync_at: None,
            emails: ResourceCursor::default(),
            events: ResourceCursor::default(),
            contacts: ResourceCursor::default(),
            folders: ResourceCursor::default(),
        }
    }

    pub fn cursor(&self, resource: Resource) -> &ResourceCursor {
        match resource {
            Resource::Emails => &self.emails,
            Resource::Events => &self.events,
            Resource::Contacts => &self.contacts,
            Resource::Folders => &self.folders,
        }
    }

    pub fn cursor_mut(&mut self, resource: Resource) -> &mut ResourceCursor {
        match resource {
            Resource::Emails => &mut self.emails,
            Resource::Events => &mut self.events,
            Resource::Contacts => &mut self.contacts,
            Resource::Folders => &mut self.folders,
        }
    }

    /// Mark one resource as refreshed just now
    pub fn mark_refreshed(&mut self, resource: Resource, remote_cursor: Option<String>) {
        let cursor = self.cursor_mut(resource);
        cursor.refreshed_at = Some(Utc::now());
        cursor.remote_cursor = remote_cursor;
    }

    /// Mark a full cycle as completed just now
    pub fn mark_cycle_complete(&mut self) {
        self.last_sync_at = Some(Utc::now());
    }

    /// Whether a resource is fresh enough to serve reads without a remote call
    pub fn is_fresh(&self, resource: Resource, ttl_secs: u64) -> bool {
        match self.cursor(resource).refreshed_at {
            Some(at) => Utc::now() - at < Duration::seconds(ttl_secs as i64),
            None => false,
        }
    }
}
