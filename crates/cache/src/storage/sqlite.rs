//! SQLite-backed account partition
//!
//! One database file per account. SQLite handles the durability story for
//! both cached records and the offline action queue; queue order is the
//! rowid of `queued_actions`.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::traits::{ActionFate, EmailFilter, EventFilter, PartitionStore};
use crate::models::{
    ActionKind, CachedContact, CachedEmail, CachedEvent, CachedFolder, ContactId, EmailId,
    EventId, EventStatus, FolderKind, Mailbox, OfflineAction, QueuedAction, SyncState,
};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Cached emails
            CREATE TABLE emails (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                folder_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                snippet TEXT NOT NULL,
                from_name TEXT,
                from_address TEXT NOT NULL,
                to_json TEXT NOT NULL DEFAULT '[]',
                received_at TEXT NOT NULL,
                is_unread INTEGER NOT NULL DEFAULT 0,
                is_starred INTEGER NOT NULL DEFAULT 0,
                has_attachments INTEGER NOT NULL DEFAULT 0,
                cached_at TEXT NOT NULL
            );

            CREATE INDEX idx_emails_folder ON emails(folder_id, received_at DESC);
            CREATE INDEX idx_emails_received_at ON emails(received_at DESC);

            -- Cached calendar events, scoped to (calendar_id, id)
            CREATE TABLE events (
                id TEXT NOT NULL,
                calendar_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                start_at TEXT NOT NULL,
                end_at TEXT NOT NULL,
                is_all_day INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                is_busy INTEGER NOT NULL DEFAULT 0,
                participants_json TEXT NOT NULL DEFAULT '[]',
                cached_at TEXT NOT NULL,
                PRIMARY KEY (calendar_id, id)
            );

            CREATE INDEX idx_events_start ON events(calendar_id, start_at);

            -- Cached contacts
            CREATE TABLE contacts (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                given_name TEXT NOT NULL DEFAULT '',
                family_name TEXT NOT NULL DEFAULT '',
                email TEXT NOT NULL DEFAULT '',
                phone TEXT NOT NULL DEFAULT '',
                company TEXT NOT NULL DEFAULT '',
                job_title TEXT NOT NULL DEFAULT '',
                notes TEXT NOT NULL DEFAULT '',
                cached_at TEXT NOT NULL
            );

            -- Cached folders
            CREATE TABLE folders (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                unread_count INTEGER NOT NULL DEFAULT 0,
                cached_at TEXT NOT NULL
            );

            -- Offline action queue; rowid order is FIFO order
            CREATE TABLE queued_actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                target TEXT NOT NULL,
                kind_json TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                enqueued_at TEXT NOT NULL,
                last_error TEXT
            );

            -- Sync metadata, one row per account
            CREATE TABLE sync_state (
                account_id TEXT PRIMARY KEY,
                last_sync_at TEXT,
                cursors_json TEXT NOT NULL
            );
            "#,
        ),
    ])
}

/// SQLite-backed account partition
pub struct SqlitePartition {
    conn: Mutex<Connection>,
}

impl SqlitePartition {
    /// Open or create the partition database at `db_path`
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL allows concurrent readers during writes; NORMAL sync is safe
        // with WAL; foreign_keys kept on for future schema additions.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -16000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests
    #[cfg(test)]
    fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrations().to_latest(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn email_from_row(row: &Row<'_>) -> rusqlite::Result<CachedEmail> {
    let to_json: String = row.get("to_json")?;
    let received_at: String = row.get("received_at")?;
    let cached_at: String = row.get("cached_at")?;

    Ok(CachedEmail {
        id: EmailId::new(row.get::<_, String>("id")?),
        thread_id: row.get("thread_id")?,
        folder_id: row.get("folder_id")?,
        subject: row.get("subject")?,
        snippet: row.get("snippet")?,
        from: Mailbox {
            name: row.get("from_name")?,
            address: row.get("from_address")?,
        },
        to: serde_json::from_str(&to_json).unwrap_or_default(),
        received_at: parse_timestamp(&received_at),
        is_unread: row.get("is_unread")?,
        is_starred: row.get("is_starred")?,
        has_attachments: row.get("has_attachments")?,
        cached_at: parse_timestamp(&cached_at),
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<CachedEvent> {
    let status: String = row.get("status")?;
    let participants_json: String = row.get("participants_json")?;
    let start_at: String = row.get("start_at")?;
    let end_at: String = row.get("end_at")?;
    let cached_at: String = row.get("cached_at")?;

    Ok(CachedEvent {
        id: EventId::new(row.get::<_, String>("id")?),
        calendar_id: row.get("calendar_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        location: row.get("location")?,
        start: parse_timestamp(&start_at),
        end: parse_timestamp(&end_at),
        is_all_day: row.get("is_all_day")?,
        status: match status.as_str() {
            "cancelled" => EventStatus::Cancelled,
            "tentative" => EventStatus::Tentative,
            _ => EventStatus::Confirmed,
        },
        is_busy: row.get("is_busy")?,
        participants: serde_json::from_str(&participants_json).unwrap_or_default(),
        cached_at: parse_timestamp(&cached_at),
    })
}

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<CachedContact> {
    let cached_at: String = row.get("cached_at")?;
    Ok(CachedContact {
        id: ContactId::new(row.get::<_, String>("id")?),
        display_name: row.get("display_name")?,
        given_name: row.get("given_name")?,
        family_name: row.get("family_name")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        company: row.get("company")?,
        job_title: row.get("job_title")?,
        notes: row.get("notes")?,
        cached_at: parse_timestamp(&cached_at),
    })
}

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<CachedFolder> {
    let kind: String = row.get("kind")?;
    let cached_at: String = row.get("cached_at")?;
    Ok(CachedFolder {
        id: row.get("id")?,
        name: row.get("name")?,
        kind: match kind.as_str() {
            "inbox" => FolderKind::Inbox,
            "sent" => FolderKind::Sent,
            "drafts" => FolderKind::Drafts,
            "archive" => FolderKind::Archive,
            "trash" => FolderKind::Trash,
            _ => FolderKind::Custom,
        },
        unread_count: row.get::<_, i64>("unread_count")? as usize,
        cached_at: parse_timestamp(&cached_at),
    })
}

fn folder_kind_str(kind: FolderKind) -> &'static str {
    match kind {
        FolderKind::Inbox => "inbox",
        FolderKind::Sent => "sent",
        FolderKind::Drafts => "drafts",
        FolderKind::Archive => "archive",
        FolderKind::Trash => "trash",
        FolderKind::Custom => "custom",
    }
}

fn action_from_row(row: &Row<'_>) -> rusqlite::Result<QueuedAction> {
    let kind_json: String = row.get("kind_json")?;
    let enqueued_at: String = row.get("enqueued_at")?;
    let kind: ActionKind = serde_json::from_str(&kind_json).unwrap_or(ActionKind::MarkRead);

    Ok(QueuedAction {
        id: row.get("id")?,
        action: OfflineAction {
            kind,
            target: EmailId::new(row.get::<_, String>("target")?),
            enqueued_at: parse_timestamp(&enqueued_at),
        },
        attempts: row.get("attempts")?,
        last_error: row.get("last_error")?,
    })
}

impl PartitionStore for SqlitePartition {
    fn put_email(&self, email: CachedEmail) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let to_json = serde_json::to_string(&email.to)?;

        // Upsert keeps the row's identity stable and refreshes cached_at
        conn.execute(
            "INSERT INTO emails
             (id, thread_id, folder_id, subject, snippet, from_name, from_address,
              to_json, received_at, is_unread, is_starred, has_attachments, cached_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                thread_id = excluded.thread_id,
                folder_id = excluded.folder_id,
                subject = excluded.subject,
                snippet = excluded.snippet,
                from_name = excluded.from_name,
                from_address = excluded.from_address,
                to_json = excluded.to_json,
                received_at = excluded.received_at,
                is_unread = excluded.is_unread,
                is_starred = excluded.is_starred,
                has_attachments = excluded.has_attachments,
                cached_at = excluded.cached_at",
            params![
                email.id.as_str(),
                email.thread_id,
                email.folder_id,
                email.subject,
                email.snippet,
                email.from.name,
                email.from.address,
                to_json,
                email.received_at.to_rfc3339(),
                email.is_unread,
                email.is_starred,
                email.has_attachments,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    fn get_email(&self, id: &EmailId) -> Result<Option<CachedEmail>> {
        let conn = self.conn.lock().unwrap();
        let email = conn
            .query_row(
                "SELECT * FROM emails WHERE id = ?",
                [id.as_str()],
                email_from_row,
            )
            .optional()?;
        Ok(email)
    }

    fn list_emails(&self, filter: &EmailFilter) -> Result<Vec<CachedEmail>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from("SELECT * FROM emails WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(folder_id) = &filter.folder_id {
            sql.push_str(" AND folder_id = ?");
            args.push(Box::new(folder_id.clone()));
        }
        if filter.unread_only {
            sql.push_str(" AND is_unread = 1");
        }
        if filter.starred_only {
            sql.push_str(" AND is_starred = 1");
        }
        if let Some(since) = filter.since {
            sql.push_str(" AND received_at >= ?");
            args.push(Box::new(since.to_rfc3339()));
        }
        sql.push_str(" ORDER BY received_at DESC LIMIT ?");
        args.push(Box::new(filter.limit as i64));

        let mut stmt = conn.prepare(&sql)?;
        let emails = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), email_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(emails)
    }

    fn search_emails(&self, query: &str, limit: usize) -> Result<Vec<CachedEmail>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("%{}%", query.to_lowercase());

        let mut stmt = conn.prepare(
            "SELECT * FROM emails
             WHERE lower(subject) LIKE ?1
                OR lower(snippet) LIKE ?1
                OR lower(from_address) LIKE ?1
                OR lower(coalesce(from_name, '')) LIKE ?1
             ORDER BY received_at DESC
             LIMIT ?2",
        )?;

        let emails = stmt
            .query_map(params![pattern, limit as i64], email_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(emails)
    }

    fn delete_email(&self, id: &EmailId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM emails WHERE id = ?", [id.as_str()])?;
        Ok(())
    }

    fn put_event(&self, event: CachedEvent) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let participants_json = serde_json::to_string(&event.participants)?;
        let status = match event.status {
            EventStatus::Cancelled => "cancelled",
            EventStatus::Tentative => "tentative",
            EventStatus::Confirmed => "confirmed",
        };

        conn.execute(
            "INSERT INTO events
             (id, calendar_id, title, description, location, start_at, end_at,
              is_all_day, status, is_busy, participants_json, cached_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(calendar_id, id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                location = excluded.location,
                start_at = excluded.start_at,
                end_at = excluded.end_at,
                is_all_day = excluded.is_all_day,
                status = excluded.status,
                is_busy = excluded.is_busy,
                participants_json = excluded.participants_json,
                cached_at = excluded.cached_at",
            params![
                event.id.as_str(),
                event.calendar_id,
                event.title,
                event.description,
                event.location,
                event.start.to_rfc3339(),
                event.end.to_rfc3339(),
                event.is_all_day,
                status,
                event.is_busy,
                participants_json,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    fn get_event(&self, calendar_id: &str, id: &EventId) -> Result<Option<CachedEvent>> {
        let conn = self.conn.lock().unwrap();
        let event = conn
            .query_row(
                "SELECT * FROM events WHERE calendar_id = ? AND id = ?",
                params![calendar_id, id.as_str()],
                event_from_row,
            )
            .optional()?;
        Ok(event)
    }

    fn list_events(&self, filter: &EventFilter) -> Result<Vec<CachedEvent>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from("SELECT * FROM events WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(calendar_id) = &filter.calendar_id {
            sql.push_str(" AND calendar_id = ?");
            args.push(Box::new(calendar_id.clone()));
        }
        if let Some(end) = filter.end {
            sql.push_str(" AND start_at < ?");
            args.push(Box::new(end.to_rfc3339()));
        }
        if let Some(start) = filter.start {
            sql.push_str(" AND end_at > ?");
            args.push(Box::new(start.to_rfc3339()));
        }
        sql.push_str(" ORDER BY start_at ASC LIMIT ?");
        args.push(Box::new(filter.limit as i64));

        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    fn delete_event(&self, calendar_id: &str, id: &EventId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM events WHERE calendar_id = ? AND id = ?",
            params![calendar_id, id.as_str()],
        )?;
        Ok(())
    }

    fn put_contact(&self, contact: CachedContact) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO contacts
             (id, display_name, given_name, family_name, email, phone,
              company, job_title, notes, cached_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                given_name = excluded.given_name,
                family_name = excluded.family_name,
                email = excluded.email,
                phone = excluded.phone,
                company = excluded.company,
                job_title = excluded.job_title,
                notes = excluded.notes,
                cached_at = excluded.cached_at",
            params![
                contact.id.as_str(),
                contact.display_name,
                contact.given_name,
                contact.family_name,
                contact.email,
                contact.phone,
                contact.company,
                contact.job_title,
                contact.notes,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_contact(&self, id: &ContactId) -> Result<Option<CachedContact>> {
        let conn = self.conn.lock().unwrap();
        let contact = conn
            .query_row(
                "SELECT * FROM contacts WHERE id = ?",
                [id.as_str()],
                contact_from_row,
            )
            .optional()?;
        Ok(contact)
    }

    fn list_contacts(&self, limit: usize) -> Result<Vec<CachedContact>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM contacts ORDER BY display_name ASC LIMIT ?")?;
        let contacts = stmt
            .query_map([limit as i64], contact_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(contacts)
    }

    fn search_contacts(&self, query: &str, limit: usize) -> Result<Vec<CachedContact>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("%{}%", query.to_lowercase());

        let mut stmt = conn.prepare(
            "SELECT * FROM contacts
             WHERE lower(display_name) LIKE ?1
                OR lower(given_name) LIKE ?1
                OR lower(family_name) LIKE ?1
                OR lower(email) LIKE ?1
                OR lower(company) LIKE ?1
             ORDER BY display_name ASC
             LIMIT ?2",
        )?;

        let contacts = stmt
            .query_map(params![pattern, limit as i64], contact_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(contacts)
    }

    fn put_folder(&self, folder: CachedFolder) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO folders (id, name, kind, unread_count, cached_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                unread_count = excluded.unread_count,
                cached_at = excluded.cached_at",
            params![
                folder.id,
                folder.name,
                folder_kind_str(folder.kind),
                folder.unread_count as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn list_folders(&self) -> Result<Vec<CachedFolder>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM folders ORDER BY name ASC")?;
        let folders = stmt
            .query_map([], folder_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(folders)
    }

    fn enqueue_action(&self, action: OfflineAction) -> Result<QueuedAction> {
        let conn = self.conn.lock().unwrap();
        let kind_json = serde_json::to_string(&action.kind)?;

        conn.execute(
            "INSERT INTO queued_actions (target, kind_json, attempts, enqueued_at)
             VALUES (?, ?, 0, ?)",
            params![
                action.target.as_str(),
                kind_json,
                action.enqueued_at.to_rfc3339(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        Ok(QueuedAction {
            id,
            action,
            attempts: 0,
            last_error: None,
        })
    }

    fn peek_action(&self) -> Result<Option<QueuedAction>> {
        let conn = self.conn.lock().unwrap();
        let action = conn
            .query_row(
                "SELECT * FROM queued_actions ORDER BY id ASC LIMIT 1",
                [],
                action_from_row,
            )
            .optional()?;
        Ok(action)
    }

    fn ack_action(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM queued_actions WHERE id = ?", [id])?;
        Ok(())
    }

    fn fail_action(
        &self,
        id: i64,
        error: &str,
        terminal: bool,
        max_attempts: u32,
    ) -> Result<ActionFate> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let attempts: Option<u32> = tx
            .query_row(
                "SELECT attempts FROM queued_actions WHERE id = ?",
                [id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(attempts) = attempts else {
            // Already acked or dropped by a concurrent drain
            return Ok(ActionFate::Dropped);
        };

        let attempts = attempts + 1;
        let fate = if terminal || attempts >= max_attempts {
            tx.execute("DELETE FROM queued_actions WHERE id = ?", [id])?;
            ActionFate::Dropped
        } else {
            tx.execute(
                "UPDATE queued_actions SET attempts = ?, last_error = ? WHERE id = ?",
                params![attempts, error, id],
            )?;
            ActionFate::Retained
        };

        tx.commit()?;
        Ok(fate)
    }

    fn queue_len(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM queued_actions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn get_sync_state(&self) -> Result<Option<SyncState>> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(String, Option<String>, String)> = conn
            .query_row(
                "SELECT account_id, last_sync_at, cursors_json FROM sync_state LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((account_id, last_sync_at, cursors_json)) = row else {
            return Ok(None);
        };

        let mut state: SyncState =
            serde_json::from_str(&cursors_json).unwrap_or_else(|_| SyncState::new(&account_id));
        state.account_id = account_id;
        state.last_sync_at = last_sync_at.as_deref().map(parse_timestamp);

        Ok(Some(state))
    }

    fn save_sync_state(&self, state: SyncState) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let cursors_json = serde_json::to_string(&state)?;

        conn.execute(
            "INSERT OR REPLACE INTO sync_state (account_id, last_sync_at, cursors_json)
             VALUES (?, ?, ?)",
            params![
                state.account_id,
                state.last_sync_at.map(|at| at.to_rfc3339()),
                cursors_json,
            ],
        )?;

        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "DELETE FROM emails;
             DELETE FROM events;
             DELETE FROM contacts;
             DELETE FROM folders;
             DELETE FROM queued_actions;
             DELETE FROM sync_state;",
        )?;
        Ok(())
    }
}
