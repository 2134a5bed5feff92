//! Remote record normalization
//!
//! Converts remote provider records to cached domain models. Each pairing
//! has exactly one conversion function.

use chrono::{TimeZone, Utc};

use super::{RemoteContact, RemoteEmail, RemoteEvent, RemoteFolder};
use crate::models::{
    CachedContact, CachedEmail, CachedEvent, CachedFolder, ContactId, EmailId, EventId,
    EventStatus, FolderKind, Mailbox,
};

/// Normalize a remote message to a CachedEmail
pub fn normalize_email(remote: RemoteEmail) -> CachedEmail {
    let received_at = Utc
        .timestamp_millis_opt(remote.timestamp_ms)
        .single()
        .unwrap_or_else(Utc::now);

    let to = remote
        .to
        .iter()
        .map(|raw| Mailbox::parse(raw))
        .collect();

    CachedEmail::builder(EmailId::new(remote.id), remote.folder_id)
        .thread_id(remote.thread_id)
        .subject(remote.subject)
        .snippet(remote.snippet)
        .from(Mailbox::parse(&remote.from))
        .to(to)
        .received_at(received_at)
        .unread(remote.unread)
        .starred(remote.starred)
        .has_attachments(remote.has_attachments)
        .build()
}

/// Normalize a remote event to a CachedEvent
pub fn normalize_event(remote: RemoteEvent) -> CachedEvent {
    let status = match remote.status.as_str() {
        "cancelled" => EventStatus::Cancelled,
        "tentative" => EventStatus::Tentative,
        _ => EventStatus::Confirmed,
    };

    CachedEvent {
        id: EventId::new(remote.id),
        calendar_id: remote.calendar_id,
        title: remote.title,
        description: remote.description,
        location: remote.location,
        start: remote.start,
        end: remote.end,
        is_all_day: remote.all_day,
        status,
        is_busy: remote.busy,
        participants: remote.attendees,
        cached_at: Utc::now(),
    }
}

/// Convert a cached event back to the remote wire shape
///
/// Used when replaying a locally created or edited event to the provider.
pub fn denormalize_event(event: &CachedEvent) -> RemoteEvent {
    let status = match event.status {
        EventStatus::Cancelled => "cancelled",
        EventStatus::Tentative => "tentative",
        EventStatus::Confirmed => "confirmed",
    };

    RemoteEvent {
        id: event.id.as_str().to_string(),
        calendar_id: event.calendar_id.clone(),
        title: event.title.clone(),
        description: event.description.clone(),
        location: event.location.clone(),
        start: event.start,
        end: event.end,
        all_day: event.is_all_day,
        status: status.to_string(),
        busy: event.is_busy,
        attendees: event.participants.clone(),
    }
}

/// Normalize a remote contact to a CachedContact
pub fn normalize_contact(remote: RemoteContact) -> CachedContact {
    CachedContact {
        id: ContactId::new(remote.id),
        display_name: remote.display_name,
        given_name: remote.given_name,
        family_name: remote.family_name,
        email: remote.email,
        phone: remote.phone,
        company: remote.company,
        job_title: remote.job_title,
        notes: remote.notes,
        cached_at: Utc::now(),
    }
}

/// Normalize a remote folder to a CachedFolder
pub fn normalize_folder(remote: RemoteFolder) -> CachedFolder {
    let kind = match remote.kind.as_str() {
        "inbox" => FolderKind::Inbox,
        "sent" => FolderKind::Sent,
        "drafts" => FolderKind::Drafts,
        "archive" => FolderKind::Archive,
        "trash" => FolderKind::Trash,
        _ => FolderKind::Custom,
    };

    let mut folder = CachedFolder::new(remote.id, remote.name, kind);
    folder.unread_count = remote.unread_count;
    folder
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_email() -> RemoteEmail {
        RemoteEmail {
            id: "m1".to_string(),
            thread_id: "t1".to_string(),
            folder_id: "INBOX".to_string(),
            subject: "Hello".to_string(),
            snippet: "Hello there".to_string(),
            from: "Jane Doe <jane@example.com>".to_string(),
            to: vec!["bob@example.com".to_string()],
            timestamp_ms: 1_700_000_000_000,
            unread: true,
            starred: false,
            has_attachments: true,
        }
    }

    #[test]
    fn test_normalize_email_parses_mailboxes() {
        let email = normalize_email(remote_email());
        assert_eq!(email.from.name.as_deref(), Some("Jane Doe"));
        assert_eq!(email.from.address, "jane@example.com");
        assert_eq!(email.to.len(), 1);
        assert!(email.is_unread);
        assert_eq!(email.received_at.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_normalize_event_status() {
        let mut remote = RemoteEvent {
            id: "e1".to_string(),
            calendar_id: "primary".to_string(),
            title: "Standup".to_string(),
            description: String::new(),
            location: String::new(),
            start: Utc::now(),
            end: Utc::now(),
            all_day: false,
            status: "cancelled".to_string(),
            busy: true,
            attendees: Vec::new(),
        };

        assert_eq!(
            normalize_event(remote.clone()).status,
            EventStatus::Cancelled
        );

        remote.status = "something-new".to_string();
        assert_eq!(
            normalize_event(remote).status,
            EventStatus::Confirmed
        );
    }

    #[test]
    fn test_event_round_trip() {
        let remote = RemoteEvent {
            id: "e1".to_string(),
            calendar_id: "primary".to_string(),
            title: "Review".to_string(),
            description: "weekly".to_string(),
            location: "room 2".to_string(),
            start: Utc::now(),
            end: Utc::now(),
            all_day: false,
            status: "tentative".to_string(),
            busy: true,
            attendees: vec!["a@example.com".to_string()],
        };

        let cached = normalize_event(remote.clone());
        let back = denormalize_event(&cached);
        assert_eq!(back.id, remote.id);
        assert_eq!(back.status, remote.status);
        assert_eq!(back.attendees, remote.attendees);
    }

    #[test]
    fn test_normalize_folder_kind() {
        let folder = normalize_folder(RemoteFolder {
            id: "f1".to_string(),
            name: "Inbox".to_string(),
            kind: "inbox".to_string(),
            unread_count: 4,
        });
        assert_eq!(folder.kind, FolderKind::Inbox);
        assert_eq!(folder.unread_count, 4);

        let folder = normalize_folder(RemoteFolder {
            id: "f2".to_string(),
            name: "Receipts".to_string(),
            kind: "label".to_string(),
            unread_count: 0,
        });
        assert_eq!(folder.kind, FolderKind::Custom);
    }
}
