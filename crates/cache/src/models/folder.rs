//! Cached mail folder model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known folder roles plus user-defined folders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderKind {
    Inbox,
    Sent,
    Drafts,
    Archive,
    Trash,
    Custom,
}

/// A cached mail folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedFolder {
    pub id: String,
    pub name: String,
    pub kind: FolderKind,
    pub unread_count: usize,
    /// When this record was last written into the cache
    pub cached_at: DateTime<Utc>,
}

impl CachedFolder {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: FolderKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            unread_count: 0,
            cached_at: Utc::now(),
        }
    }
}
