//! Domain models for cached records, offline actions, and sync metadata

mod action;
mod contact;
mod email;
mod event;
mod folder;
mod sync_state;

pub use action::{ActionKind, OfflineAction, QueuedAction};
pub use contact::{CachedContact, ContactId};
pub use email::{CachedEmail, CachedEmailBuilder, EmailId, Mailbox};
pub use event::{CachedEvent, EventId, EventStatus};
pub use folder::{CachedFolder, FolderKind};
pub use sync_state::{Resource, ResourceCursor, SyncState};
