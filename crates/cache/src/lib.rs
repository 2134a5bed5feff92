//! Cache crate - Local cache and offline sync for mail, calendar, and contacts
//!
//! This crate provides the client's offline-first data layer:
//! - Cached domain models (CachedEmail, CachedEvent, CachedContact, CachedFolder)
//! - Per-account storage partitions (SQLite on disk, in-memory fallback)
//! - Read-through / write-through policy between cache and remote provider
//! - Durable offline action queue with FIFO replay
//! - Background sync engine with per-account workers
//! - Calendar conflict detection over cached events
//!
//! The remote provider itself is consumed only through the [`RemoteClient`]
//! trait; this crate has no transport dependencies.

pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod manager;
pub mod models;
pub mod policy;
pub mod remote;
pub mod storage;

pub use config::CacheConfig;
pub use conflict::{Conflict, find_conflicts};
pub use engine::{CycleStats, DrainStats, SyncEngine};
pub use error::{RejectionKind, RemoteError};
pub use manager::CacheManager;
pub use models::{
    ActionKind, CachedContact, CachedEmail, CachedEvent, CachedFolder, ContactId, EmailId,
    EventId, EventStatus, FolderKind, Mailbox, OfflineAction, QueuedAction, Resource,
    ResourceCursor, SyncState,
};
pub use policy::{
    MutationOutcome, delete_email_through, delete_event_through, get_email_through,
    list_contacts_through, list_emails_through, list_events_through, list_folders_through,
    move_email_through, save_event_through, update_email_through,
};
pub use remote::{
    EmailPatch, Page, RemoteClient, RemoteContact, RemoteEmail, RemoteEvent, RemoteFolder,
    RemoteResult, StubRemote, TimeWindow,
};
pub use storage::{
    ActionFate, DEFAULT_LIST_LIMIT, EmailFilter, EventFilter, MemoryPartition, PartitionStore,
    SqlitePartition,
};
