//! Abstract contract for the remote provider API client
//!
//! The HTTP client itself lives outside this crate; the cache core consumes
//! it only through [`RemoteClient`]. Wire records are normalized into cache
//! records by exactly one conversion function each, in [`normalize`].

mod normalize;
mod stub;

pub use normalize::{
    denormalize_event, normalize_contact, normalize_email, normalize_event, normalize_folder,
};
pub use stub::StubRemote;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::models::{EmailId, EventId};
use crate::storage::EmailFilter;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// One page of results from a paginated remote listing
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Opaque cursor for the next page, if any
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }
}

/// A half-open [start, end) query window for event listings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Partial update applied to a remote message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailPatch {
    pub unread: Option<bool>,
    pub starred: Option<bool>,
    /// Destination folder for a move
    pub folder_id: Option<String>,
}

/// A message as the remote provider reports it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEmail {
    pub id: String,
    pub thread_id: String,
    pub folder_id: String,
    pub subject: String,
    pub snippet: String,
    /// Raw sender header, e.g. "Jane Doe <jane@example.com>"
    pub from: String,
    /// Raw recipient headers
    pub to: Vec<String>,
    /// Milliseconds since epoch
    pub timestamp_ms: i64,
    pub unread: bool,
    pub starred: bool,
    pub has_attachments: bool,
}

/// An event as the remote provider reports it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub id: String,
    pub calendar_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,
    /// "confirmed", "tentative", or "cancelled"
    pub status: String,
    #[serde(default)]
    pub busy: bool,
    #[serde(default)]
    pub attendees: Vec<String>,
}

/// A contact as the remote provider reports it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteContact {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub notes: String,
}

/// A folder as the remote provider reports it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFolder {
    pub id: String,
    pub name: String,
    /// "inbox", "sent", "drafts", "archive", "trash", or anything else
    pub kind: String,
    #[serde(default)]
    pub unread_count: usize,
}

/// The remote provider API surface the cache core depends on
///
/// Implementations own the transport and must bound every call to 30 seconds
/// so a foreground request never hangs indefinitely on a slow upstream.
/// Failures are classified: [`RemoteError::Connectivity`] for anything a
/// retry could heal, [`RemoteError::Rejected`] for everything the request
/// itself caused.
pub trait RemoteClient: Send + Sync {
    fn fetch_folders(&self) -> RemoteResult<Vec<RemoteFolder>>;

    fn fetch_emails(
        &self,
        filter: &EmailFilter,
        cursor: Option<&str>,
    ) -> RemoteResult<Page<RemoteEmail>>;

    fn fetch_email(&self, id: &EmailId) -> RemoteResult<RemoteEmail>;

    fn update_email(&self, id: &EmailId, patch: &EmailPatch) -> RemoteResult<()>;

    fn delete_email(&self, id: &EmailId) -> RemoteResult<()>;

    fn fetch_events(
        &self,
        calendar_id: &str,
        window: &TimeWindow,
        cursor: Option<&str>,
    ) -> RemoteResult<Page<RemoteEvent>>;

    fn create_event(&self, event: &RemoteEvent) -> RemoteResult<RemoteEvent>;

    fn update_event(&self, event: &RemoteEvent) -> RemoteResult<RemoteEvent>;

    fn delete_event(&self, calendar_id: &str, id: &EventId) -> RemoteResult<()>;

    fn fetch_contacts(&self, cursor: Option<&str>) -> RemoteResult<Page<RemoteContact>>;
}
