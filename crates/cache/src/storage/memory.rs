//! In-memory account partition
//!
//! Used for tests and as the degraded fallback when a partition database
//! cannot be opened. Queue contents do not survive a restart, which is the
//! accepted trade-off of the degraded mode.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::Result;
use chrono::Utc;

use super::traits::{ActionFate, EmailFilter, EventFilter, PartitionStore};
use crate::models::{
    CachedContact, CachedEmail, CachedEvent, CachedFolder, ContactId, EmailId, EventId,
    OfflineAction, QueuedAction, SyncState,
};

/// In-memory implementation of PartitionStore
///
/// HashMaps protected by RwLocks; each put takes the write lock so a read
/// never observes a partial record.
pub struct MemoryPartition {
    emails: RwLock<HashMap<String, CachedEmail>>,
    /// Keyed by (calendar_id, event_id)
    events: RwLock<HashMap<(String, String), CachedEvent>>,
    contacts: RwLock<HashMap<String, CachedContact>>,
    folders: RwLock<HashMap<String, CachedFolder>>,
    queue: RwLock<VecDeque<QueuedAction>>,
    sync_state: RwLock<Option<SyncState>>,
    next_action_id: AtomicI64,
}

impl MemoryPartition {
    /// Create a new empty in-memory partition
    pub fn new() -> Self {
        Self {
            emails: RwLock::new(HashMap::new()),
            events: RwLock::new(HashMap::new()),
            contacts: RwLock::new(HashMap::new()),
            folders: RwLock::new(HashMap::new()),
            queue: RwLock::new(VecDeque::new()),
            sync_state: RwLock::new(None),
            next_action_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryPartition {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionStore for MemoryPartition {
    fn put_email(&self, mut email: CachedEmail) -> Result<()> {
        email.cached_at = Utc::now();
        self.emails
            .write()
            .unwrap()
            .insert(email.id.as_str().to_string(), email);
        Ok(())
    }

    fn get_email(&self, id: &EmailId) -> Result<Option<CachedEmail>> {
        Ok(self.emails.read().unwrap().get(id.as_str()).cloned())
    }

    fn list_emails(&self, filter: &EmailFilter) -> Result<Vec<CachedEmail>> {
        let emails = self.emails.read().unwrap();
        let mut matched: Vec<CachedEmail> = emails
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        matched.truncate(filter.limit);
        Ok(matched)
    }

    fn search_emails(&self, query: &str, limit: usize) -> Result<Vec<CachedEmail>> {
        let needle = query.to_lowercase();
        let emails = self.emails.read().unwrap();
        let mut matched: Vec<CachedEmail> = emails
            .values()
            .filter(|e| {
                e.subject.to_lowercase().contains(&needle)
                    || e.snippet.to_lowercase().contains(&needle)
                    || e.from.address.to_lowercase().contains(&needle)
                    || e.from
                        .name
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        matched.truncate(limit);
        Ok(matched)
    }

    fn delete_email(&self, id: &EmailId) -> Result<()> {
        self.emails.write().unwrap().remove(id.as_str());
        Ok(())
    }

    fn put_event(&self, mut event: CachedEvent) -> Result<()> {
        event.cached_at = Utc::now();
        let key = (event.calendar_id.clone(), event.id.as_str().to_string());
        self.events.write().unwrap().insert(key, event);
        Ok(())
    }

    fn get_event(&self, calendar_id: &str, id: &EventId) -> Result<Option<CachedEvent>> {
        let key = (calendar_id.to_string(), id.as_str().to_string());
        Ok(self.events.read().unwrap().get(&key).cloned())
    }

    fn list_events(&self, filter: &EventFilter) -> Result<Vec<CachedEvent>> {
        let events = self.events.read().unwrap();
        let mut matched: Vec<CachedEvent> = events
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.start.cmp(&b.start));
        matched.truncate(filter.limit);
        Ok(matched)
    }

    fn delete_event(&self, calendar_id: &str, id: &EventId) -> Result<()> {
        let key = (calendar_id.to_string(), id.as_str().to_string());
        self.events.write().unwrap().remove(&key);
        Ok(())
    }

    fn put_contact(&self, mut contact: CachedContact) -> Result<()> {
        contact.cached_at = Utc::now();
        self.contacts
            .write()
            .unwrap()
            .insert(contact.id.as_str().to_string(), contact);
        Ok(())
    }

    fn get_contact(&self, id: &ContactId) -> Result<Option<CachedContact>> {
        Ok(self.contacts.read().unwrap().get(id.as_str()).cloned())
    }

    fn list_contacts(&self, limit: usize) -> Result<Vec<CachedContact>> {
        let contacts = self.contacts.read().unwrap();
        let mut all: Vec<CachedContact> = contacts.values().cloned().collect();
        all.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        all.truncate(limit);
        Ok(all)
    }

    fn search_contacts(&self, query: &str, limit: usize) -> Result<Vec<CachedContact>> {
        let needle = query.to_lowercase();
        let contacts = self.contacts.read().unwrap();
        let mut matched: Vec<CachedContact> = contacts
            .values()
            .filter(|c| {
                c.display_name.to_lowercase().contains(&needle)
                    || c.given_name.to_lowercase().contains(&needle)
                    || c.family_name.to_lowercase().contains(&needle)
                    || c.email.to_lowercase().contains(&needle)
                    || c.company.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        matched.truncate(limit);
        Ok(matched)
    }

    fn put_folder(&self, mut folder: CachedFolder) -> Result<()> {
        folder.cached_at = Utc::now();
        self.folders
            .write()
            .unwrap()
            .insert(folder.id.clone(), folder);
        Ok(())
    }

    fn list_folders(&self) -> Result<Vec<CachedFolder>> {
        let folders = self.folders.read().unwrap();
        let mut all: Vec<CachedFolder> = folders.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    fn enqueue_action(&self, action: OfflineAction) -> Result<QueuedAction> {
        let queued = QueuedAction {
            id: self.next_action_id.fetch_add(1, Ordering::SeqCst),
            action,
            attempts: 0,
            last_error: None,
        };
        self.queue.write().unwrap().push_back(queued.clone());
        Ok(queued)
    }

    fn peek_action(&self) -> Result<Option<QueuedAction>> {
        Ok(self.queue.read().unwrap().front().cloned())
    }

    fn ack_action(&self, id: i64) -> Result<()> {
        self.queue.write().unwrap().retain(|a| a.id != id);
        Ok(())
    }

    fn fail_action(
        &self,
        id: i64,
        error: &str,
        terminal: bool,
        max_attempts: u32,
    ) -> Result<ActionFate> {
        let mut queue = self.queue.write().unwrap();

        let Some(pos) = queue.iter().position(|a| a.id == id) else {
            return Ok(ActionFate::Dropped);
        };

        let action = &mut queue[pos];
        action.attempts += 1;
        action.last_error = Some(error.to_string());

        if terminal || action.attempts >= max_attempts {
            queue.remove(pos);
            Ok(ActionFate::Dropped)
        } else {
            Ok(ActionFate::Retained)
        }
    }

    fn queue_len(&self) -> Result<usize> {
        Ok(self.queue.read().unwrap().len())
    }

    fn get_sync_state(&self) -> Result<Option<SyncState>> {
        Ok(self.sync_state.read().unwrap().clone())
    }

    fn save_sync_state(&self, state: SyncState) -> Result<()> {
        *self.sync_state.write().unwrap() = Some(state);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.emails.write().unwrap().clear();
        self.events.write().unwrap().clear();
        self.contacts.write().unwrap().clear();
        self.folders.write().unwrap().clear();
        self.queue.write().unwrap().clear();
        *self.sync_state.write().unwrap() = None;
        Ok(())
    }
}
