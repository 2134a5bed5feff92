//! Storage trait definitions

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{
    CachedContact, CachedEmail, CachedEvent, CachedFolder, ContactId, EmailId, EventId,
    OfflineAction, QueuedAction, SyncState,
};

/// Default bound applied when a filter does not set its own limit
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Filter options for email listings
#[derive(Debug, Clone, PartialEq)]
pub struct EmailFilter {
    /// Restrict to one folder
    pub folder_id: Option<String>,
    pub unread_only: bool,
    pub starred_only: bool,
    /// Restrict to messages received at or after this instant
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for EmailFilter {
    fn default() -> Self {
        Self {
            folder_id: None,
            unread_only: false,
            starred_only: false,
            since: None,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl EmailFilter {
    pub fn folder(folder_id: impl Into<String>) -> Self {
        Self {
            folder_id: Some(folder_id.into()),
            ..Self::default()
        }
    }

    /// Whether a cached record matches this filter
    pub fn matches(&self, email: &CachedEmail) -> bool {
        if let Some(folder_id) = &self.folder_id
            && &email.folder_id != folder_id
        {
            return false;
        }
        if self.unread_only && !email.is_unread {
            return false;
        }
        if self.starred_only && !email.is_starred {
            return false;
        }
        if let Some(since) = self.since
            && email.received_at < since
        {
            return false;
        }
        true
    }
}

/// Filter options for event listings
#[derive(Debug, Clone, PartialEq)]
pub struct EventFilter {
    /// Restrict to one calendar
    pub calendar_id: Option<String>,
    /// Events overlapping [start, end), when set
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            calendar_id: None,
            start: None,
            end: None,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl EventFilter {
    pub fn calendar(calendar_id: impl Into<String>) -> Self {
        Self {
            calendar_id: Some(calendar_id.into()),
            ..Self::default()
        }
    }

    /// Whether a cached record matches this filter
    pub fn matches(&self, event: &CachedEvent) -> bool {
        if let Some(calendar_id) = &self.calendar_id
            && &event.calendar_id != calendar_id
        {
            return false;
        }
        if let Some(window_end) = self.end
            && event.start >= window_end
        {
            return false;
        }
        if let Some(window_start) = self.start
            && event.end <= window_start
        {
            return false;
        }
        true
    }
}

/// What became of a failed action after `fail_action`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionFate {
    /// Left at the head for another attempt
    Retained,
    /// Removed permanently (attempt ceiling reached or terminal rejection)
    Dropped,
}

/// One account's isolated slice of local storage
///
/// Abstracts over the persistent (SQLite) and in-memory backends. One
/// partition per connected account; no read or write ever crosses
/// partitions. A read never observes a partial write: each put is atomic in
/// both backends.
///
/// Every put is an upsert by id and stamps the record's `cached_at` with the
/// time of the call.
pub trait PartitionStore: Send + Sync {
    // === Emails ===

    fn put_email(&self, email: CachedEmail) -> Result<()>;
    fn get_email(&self, id: &EmailId) -> Result<Option<CachedEmail>>;
    /// List emails, newest first, bounded by the filter's limit
    fn list_emails(&self, filter: &EmailFilter) -> Result<Vec<CachedEmail>>;
    /// Case-insensitive substring match over subject, snippet, and sender
    fn search_emails(&self, query: &str, limit: usize) -> Result<Vec<CachedEmail>>;
    /// Remove a message after a confirmed remote delete
    fn delete_email(&self, id: &EmailId) -> Result<()>;

    // === Events ===

    fn put_event(&self, event: CachedEvent) -> Result<()>;
    fn get_event(&self, calendar_id: &str, id: &EventId) -> Result<Option<CachedEvent>>;
    /// List events ordered by start time, bounded by the filter's limit
    fn list_events(&self, filter: &EventFilter) -> Result<Vec<CachedEvent>>;
    fn delete_event(&self, calendar_id: &str, id: &EventId) -> Result<()>;

    // === Contacts ===

    fn put_contact(&self, contact: CachedContact) -> Result<()>;
    fn get_contact(&self, id: &ContactId) -> Result<Option<CachedContact>>;
    fn list_contacts(&self, limit: usize) -> Result<Vec<CachedContact>>;
    /// Case-insensitive substring match over names, email, and company
    fn search_contacts(&self, query: &str, limit: usize) -> Result<Vec<CachedContact>>;

    // === Folders ===

    fn put_folder(&self, folder: CachedFolder) -> Result<()>;
    fn list_folders(&self) -> Result<Vec<CachedFolder>>;

    // === Offline action queue ===

    /// Append an action to the tail of the queue
    fn enqueue_action(&self, action: OfflineAction) -> Result<QueuedAction>;
    /// Read the head of the queue without removing it (pop-then-ack: the
    /// action stays persisted until `ack_action` confirms the replay)
    fn peek_action(&self) -> Result<Option<QueuedAction>>;
    /// Remove an action after successful replay
    fn ack_action(&self, id: i64) -> Result<()>;
    /// Record a failed replay attempt. Increments the attempt counter and
    /// drops the action once attempts reach `max_attempts`. `terminal` drops
    /// immediately regardless of the counter.
    fn fail_action(&self, id: i64, error: &str, terminal: bool, max_attempts: u32)
    -> Result<ActionFate>;
    fn queue_len(&self) -> Result<usize>;

    // === Sync metadata ===

    fn get_sync_state(&self) -> Result<Option<SyncState>>;
    fn save_sync_state(&self, state: SyncState) -> Result<()>;

    /// Clear all cached data, queued actions, and sync metadata
    fn clear(&self) -> Result<()>;
}
