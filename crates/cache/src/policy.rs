//! Read-through and write-through policy
//!
//! The decision logic request handlers invoke. Reads consult the partition
//! first and fall back to the remote provider; successful remote results are
//! written through before responding. Mutations go remote-first and degrade
//! to the offline action queue on connectivity failures.

use anyhow::Result;
use log::{debug, warn};

use crate::error::{RejectionKind, RemoteError};
use crate::models::{
    ActionKind, CachedContact, CachedEmail, CachedEvent, CachedFolder, EmailId, EventId,
    OfflineAction,
};
use crate::remote::{
    EmailPatch, RemoteClient, TimeWindow, denormalize_event, normalize_contact, normalize_email,
    normalize_event, normalize_folder,
};
use crate::storage::{EmailFilter, EventFilter, PartitionStore};

/// How a mutation was carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Applied directly against the remote provider
    Applied,
    /// Remote unreachable; recorded in the offline action queue for replay
    Queued,
}

/// List emails, cache-first
///
/// The cache is authoritative for first-page, non-cursor reads once
/// populated. A pagination cursor always goes to the remote provider. On a
/// connectivity failure the stale cache is preferred over an error.
pub fn list_emails_through(
    store: &dyn PartitionStore,
    remote: &dyn RemoteClient,
    filter: &EmailFilter,
    cursor: Option<&str>,
) -> Result<Vec<CachedEmail>> {
    if cursor.is_none() {
        let cached = store.list_emails(filter)?;
        if !cached.is_empty() {
            debug!("Serving {} email(s) from cache", cached.len());
            return Ok(cached);
        }
    }

    match remote.fetch_emails(filter, cursor) {
        Ok(page) => {
            let mut emails = Vec::with_capacity(page.items.len());
            for item in page.items {
                let email = normalize_email(item);
                store.put_email(email.clone())?;
                emails.push(email);
            }
            Ok(emails)
        }
        Err(err) if err.is_retryable() => {
            let cached = store.list_emails(filter)?;
            if cached.is_empty() {
                Err(err.into())
            } else {
                warn!("Remote unreachable ({err}), serving stale cache");
                Ok(cached)
            }
        }
        Err(err) => Err(err.into()),
    }
}

/// Get one email by id, cache-first
pub fn get_email_through(
    store: &dyn PartitionStore,
    remote: &dyn RemoteClient,
    id: &EmailId,
) -> Result<Option<CachedEmail>> {
    if let Some(email) = store.get_email(id)? {
        return Ok(Some(email));
    }

    match remote.fetch_email(id) {
        Ok(item) => {
            let email = normalize_email(item);
            store.put_email(email.clone())?;
            Ok(Some(email))
        }
        Err(RemoteError::Rejected {
            kind: RejectionKind::NotFound,
            ..
        }) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// List folders, cache-first
pub fn list_folders_through(
    store: &dyn PartitionStore,
    remote: &dyn RemoteClient,
) -> Result<Vec<CachedFolder>> {
    let cached = store.list_folders()?;
    if !cached.is_empty() {
        return Ok(cached);
    }

    match remote.fetch_folders() {
        Ok(items) => {
            let mut folders = Vec::with_capacity(items.len());
            for item in items {
                let folder = normalize_folder(item);
                store.put_folder(folder.clone())?;
                folders.push(folder);
            }
            folders.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(folders)
        }
        Err(err) => Err(err.into()),
    }
}

/// List events in a window, cache-first
pub fn list_events_through(
    store: &dyn PartitionStore,
    remote: &dyn RemoteClient,
    calendar_id: &str,
    window: &TimeWindow,
) -> Result<Vec<CachedEvent>> {
    let filter = EventFilter {
        calendar_id: Some(calendar_id.to_string()),
        start: Some(window.start),
        end: Some(window.end),
        ..Default::default()
    };

    let cached = store.list_events(&filter)?;
    if !cached.is_empty() {
        return Ok(cached);
    }

    match remote.fetch_events(calendar_id, window, None) {
        Ok(page) => {
            let mut events = Vec::with_capacity(page.items.len());
            for item in page.items {
                let event = normalize_event(item);
                store.put_event(event.clone())?;
                events.push(event);
            }
            events.sort_by(|a, b| a.start.cmp(&b.start));
            Ok(events)
        }
        Err(err) if err.is_retryable() => {
            let cached = store.list_events(&filter)?;
            if cached.is_empty() {
                Err(err.into())
            } else {
                warn!("Remote unreachable ({err}), serving stale events");
                Ok(cached)
            }
        }
        Err(err) => Err(err.into()),
    }
}

/// List contacts, cache-first
pub fn list_contacts_through(
    store: &dyn PartitionStore,
    remote: &dyn RemoteClient,
    limit: usize,
) -> Result<Vec<CachedContact>> {
    let cached = store.list_contacts(limit)?;
    if !cached.is_empty() {
        return Ok(cached);
    }

    match remote.fetch_contacts(None) {
        Ok(page) => {
            let mut contacts = Vec::with_capacity(page.items.len());
            for item in page.items {
                let contact = normalize_contact(item);
                store.put_contact(contact.clone())?;
                contacts.push(contact);
            }
            contacts.sort_by(|a, b| a.display_name.cmp(&b.display_name));
            contacts.truncate(limit);
            Ok(contacts)
        }
        Err(err) if err.is_retryable() => {
            let cached = store.list_contacts(limit)?;
            if cached.is_empty() {
                Err(err.into())
            } else {
                Ok(cached)
            }
        }
        Err(err) => Err(err.into()),
    }
}

/// Apply a message patch, remote-first
///
/// On a connectivity failure the intent is queued for replay and the patch
/// is applied to the cached record so reads reflect it immediately.
/// Rejections surface to the caller and are never queued.
pub fn update_email_through(
    store: &dyn PartitionStore,
    remote: &dyn RemoteClient,
    id: &EmailId,
    patch: &EmailPatch,
) -> Result<MutationOutcome> {
    match remote.update_email(id, patch) {
        Ok(()) => {
            apply_patch_locally(store, id, patch)?;
            Ok(MutationOutcome::Applied)
        }
        Err(err) if err.is_retryable() => {
            for kind in actions_for_patch(patch) {
                store.enqueue_action(OfflineAction::new(kind, id.clone()))?;
            }
            apply_patch_locally(store, id, patch)?;
            debug!("Queued offline patch for {}", id.as_str());
            Ok(MutationOutcome::Queued)
        }
        Err(err) => Err(err.into()),
    }
}

/// Move a message to another folder, remote-first
pub fn move_email_through(
    store: &dyn PartitionStore,
    remote: &dyn RemoteClient,
    id: &EmailId,
    destination: &str,
) -> Result<MutationOutcome> {
    let patch = EmailPatch {
        folder_id: Some(destination.to_string()),
        ..Default::default()
    };
    update_email_through(store, remote, id, &patch)
}

/// Delete a message, remote-first
pub fn delete_email_through(
    store: &dyn PartitionStore,
    remote: &dyn RemoteClient,
    id: &EmailId,
) -> Result<MutationOutcome> {
    match remote.delete_email(id) {
        Ok(()) => {
            store.delete_email(id)?;
            Ok(MutationOutcome::Applied)
        }
        Err(err) if err.is_retryable() => {
            store.enqueue_action(OfflineAction::new(ActionKind::Delete, id.clone()))?;
            store.delete_email(id)?;
            Ok(MutationOutcome::Queued)
        }
        Err(err) => Err(err.into()),
    }
}

/// Create or update an event, remote-first with write-through
///
/// Event mutations have no offline queue entry; a connectivity failure
/// surfaces so the caller can retry.
pub fn save_event_through(
    store: &dyn PartitionStore,
    remote: &dyn RemoteClient,
    event: &CachedEvent,
    create: bool,
) -> Result<CachedEvent> {
    let wire = denormalize_event(event);
    let saved = if create {
        remote.create_event(&wire)?
    } else {
        remote.update_event(&wire)?
    };
    let cached = normalize_event(saved);
    store.put_event(cached.clone())?;
    Ok(cached)
}

/// Delete an event, remote-first with write-through
pub fn delete_event_through(
    store: &dyn PartitionStore,
    remote: &dyn RemoteClient,
    calendar_id: &str,
    id: &EventId,
) -> Result<()> {
    remote.delete_event(calendar_id, id)?;
    store.delete_event(calendar_id, id)?;
    Ok(())
}

/// The queue entries equivalent to a patch
fn actions_for_patch(patch: &EmailPatch) -> Vec<ActionKind> {
    let mut kinds = Vec::new();
    match patch.unread {
        Some(true) => kinds.push(ActionKind::MarkUnread),
        Some(false) => kinds.push(ActionKind::MarkRead),
        None => {}
    }
    match patch.starred {
        Some(true) => kinds.push(ActionKind::Star),
        Some(false) => kinds.push(ActionKind::Unstar),
        None => {}
    }
    if let Some(destination) = &patch.folder_id {
        kinds.push(ActionKind::Move {
            destination: destination.clone(),
        });
    }
    kinds
}

/// Mirror a patch onto the cached record, if present
fn apply_patch_locally(
    store: &dyn PartitionStore,
    id: &EmailId,
    patch: &EmailPatch,
) -> Result<()> {
    let Some(mut email) = store.get_email(id)? else {
        return Ok(());
    };

    if let Some(unread) = patch.unread {
        email.is_unread = unread;
    }
    if let Some(starred) = patch.starred {
        email.is_starred = starred;
    }
    if let Some(folder_id) = &patch.folder_id {
        email.folder_id = folder_id.clone();
    }

    store.put_email(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{RemoteEmail, StubRemote};
    use crate::storage::MemoryPartition;

    fn remote_email(id: &str, folder: &str) -> RemoteEmail {
        RemoteEmail {
            id: id.to_string(),
            thread_id: "t1".to_string(),
            folder_id: folder.to_string(),
            subject: format!("Subject {}", id),
            snippet: String::new(),
            from: "sender@example.com".to_string(),
            to: vec![],
            timestamp_ms: 1_700_000_000_000,
            unread: true,
            starred: false,
            has_attachments: false,
        }
    }

    #[test]
    fn test_read_through_populates_cache_once() {
        let store = MemoryPartition::new();
        let remote = StubRemote::with_emails(vec![
            remote_email("m1", "INBOX"),
            remote_email("m2", "INBOX"),
        ]);
        let filter = EmailFilter::folder("INBOX");

        let first = list_emails_through(&store, &remote, &filter, None).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(remote.calls("fetch_emails"), 1);

        // Second identical read is served from cache
        let second = list_emails_through(&store, &remote, &filter, None).unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(remote.calls("fetch_emails"), 1);
    }

    #[test]
    fn test_cursor_read_bypasses_cache() {
        let store = MemoryPartition::new();
        let remote = StubRemote::with_emails(vec![remote_email("m1", "INBOX")]);
        let filter = EmailFilter::folder("INBOX");

        list_emails_through(&store, &remote, &filter, None).unwrap();
        list_emails_through(&store, &remote, &filter, Some("page-2")).unwrap();
        assert_eq!(remote.calls("fetch_emails"), 2);
    }

    #[test]
    fn test_connectivity_failure_serves_stale_cache() {
        let store = MemoryPartition::new();
        let remote = StubRemote::with_emails(vec![remote_email("m1", "INBOX")]);
        let filter = EmailFilter::folder("INBOX");

        list_emails_through(&store, &remote, &filter, None).unwrap();

        remote.fail_with(RemoteError::connectivity("link down"));
        // Cursor path goes remote, fails, falls back to cache
        let fallback = list_emails_through(&store, &remote, &filter, Some("page-2")).unwrap();
        assert_eq!(fallback.len(), 1);
    }

    #[test]
    fn test_connectivity_failure_with_empty_cache_surfaces() {
        let store = MemoryPartition::new();
        let remote = StubRemote::new();
        remote.fail_with(RemoteError::connectivity("link down"));

        let result = list_emails_through(&store, &remote, &EmailFilter::default(), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_get_email_through_miss_then_hit() {
        let store = MemoryPartition::new();
        let remote = StubRemote::with_emails(vec![remote_email("m1", "INBOX")]);

        let email = get_email_through(&store, &remote, &EmailId::new("m1"))
            .unwrap()
            .unwrap();
        assert_eq!(email.subject, "Subject m1");
        assert_eq!(remote.calls("fetch_email"), 1);

        get_email_through(&store, &remote, &EmailId::new("m1")).unwrap();
        assert_eq!(remote.calls("fetch_email"), 1);
    }

    #[test]
    fn test_get_email_not_found_is_none() {
        let store = MemoryPartition::new();
        let remote = StubRemote::new();
        assert!(
            get_email_through(&store, &remote, &EmailId::new("missing"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_update_online_applies_remotely_and_locally() {
        let store = MemoryPartition::new();
        let remote = StubRemote::with_emails(vec![remote_email("m1", "INBOX")]);
        get_email_through(&store, &remote, &EmailId::new("m1")).unwrap();

        let patch = EmailPatch {
            unread: Some(false),
            ..Default::default()
        };
        let outcome = update_email_through(&store, &remote, &EmailId::new("m1"), &patch).unwrap();

        assert_eq!(outcome, MutationOutcome::Applied);
        assert_eq!(remote.applied_patches().len(), 1);
        assert_eq!(store.queue_len().unwrap(), 0);

        let cached = store.get_email(&EmailId::new("m1")).unwrap().unwrap();
        assert!(!cached.is_unread);
    }

    #[test]
    fn test_update_offline_queues_and_applies_locally() {
        let store = MemoryPartition::new();
        let remote = StubRemote::with_emails(vec![remote_email("m1", "INBOX")]);
        get_email_through(&store, &remote, &EmailId::new("m1")).unwrap();

        remote.fail_with(RemoteError::connectivity("offline"));
        let patch = EmailPatch {
            unread: Some(false),
            starred: Some(true),
            ..Default::default()
        };
        let outcome = update_email_through(&store, &remote, &EmailId::new("m1"), &patch).unwrap();

        assert_eq!(outcome, MutationOutcome::Queued);
        assert_eq!(store.queue_len().unwrap(), 2);

        let cached = store.get_email(&EmailId::new("m1")).unwrap().unwrap();
        assert!(!cached.is_unread);
        assert!(cached.is_starred);
    }

    #[test]
    fn test_rejection_surfaces_and_never_queues() {
        let store = MemoryPartition::new();
        let remote = StubRemote::new();
        remote.fail_with(RemoteError::rejected(
            RejectionKind::Permission,
            "read-only share",
        ));

        let patch = EmailPatch {
            starred: Some(true),
            ..Default::default()
        };
        let result = update_email_through(&store, &remote, &EmailId::new("m1"), &patch);

        assert!(result.is_err());
        assert_eq!(store.queue_len().unwrap(), 0);
    }

    #[test]
    fn test_delete_offline_queues_and_removes_locally() {
        let store = MemoryPartition::new();
        let remote = StubRemote::with_emails(vec![remote_email("m1", "INBOX")]);
        get_email_through(&store, &remote, &EmailId::new("m1")).unwrap();

        remote.fail_with(RemoteError::connectivity("offline"));
        let outcome = delete_email_through(&store, &remote, &EmailId::new("m1")).unwrap();

        assert_eq!(outcome, MutationOutcome::Queued);
        assert_eq!(store.queue_len().unwrap(), 1);
        assert!(store.get_email(&EmailId::new("m1")).unwrap().is_none());
    }

    #[test]
    fn test_move_offline_queues_move_action() {
        let store = MemoryPartition::new();
        let remote = StubRemote::with_emails(vec![remote_email("m1", "INBOX")]);
        get_email_through(&store, &remote, &EmailId::new("m1")).unwrap();

        remote.fail_with(RemoteError::connectivity("offline"));
        let outcome =
            move_email_through(&store, &remote, &EmailId::new("m1"), "ARCHIVE").unwrap();

        assert_eq!(outcome, MutationOutcome::Queued);
        let head = store.peek_action().unwrap().unwrap();
        assert_eq!(
            head.action.kind,
            ActionKind::Move {
                destination: "ARCHIVE".to_string()
            }
        );
        let cached = store.get_email(&EmailId::new("m1")).unwrap().unwrap();
        assert_eq!(cached.folder_id, "ARCHIVE");
    }

    #[test]
    fn test_actions_for_patch_move() {
        let patch = EmailPatch {
            folder_id: Some("ARCHIVE".to_string()),
            ..Default::default()
        };
        assert_eq!(
            actions_for_patch(&patch),
            vec![ActionKind::Move {
                destination: "ARCHIVE".to_string()
            }]
        );
    }
}
