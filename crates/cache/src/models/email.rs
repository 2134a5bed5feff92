//! Cached email model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message (remote provider message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailId(pub String);

impl EmailId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EmailId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EmailId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A display name / address pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mailbox {
    /// Display name (e.g., "John Doe")
    pub name: Option<String>,
    /// Address (e.g., "john@example.com")
    pub address: String,
}

impl Mailbox {
    /// Create a new mailbox with just the address
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    /// Create a new mailbox with a display name
    pub fn with_name(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }

    /// Parse a mailbox from a string like "John Doe <john@example.com>"
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if let Some(angle_start) = s.rfind('<')
            && let Some(angle_end) = s.rfind('>')
            && angle_start < angle_end
        {
            let name = s[..angle_start].trim();
            let address = s[angle_start + 1..angle_end].trim();
            return Self {
                name: if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                },
                address: address.to_string(),
            };
        }

        Self {
            name: None,
            address: s.to_string(),
        }
    }

    /// Format the mailbox for display
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.address),
            None => self.address.clone(),
        }
    }
}

/// A cached email message
///
/// Created or overwritten on every successful remote fetch of the owning
/// message. `cached_at` is stamped by the store on every put.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEmail {
    /// Remote message ID
    pub id: EmailId,
    /// ID of the conversation thread this message belongs to
    pub thread_id: String,
    /// ID of the folder holding the message
    pub folder_id: String,
    /// Subject line
    pub subject: String,
    /// Plain text preview of the body
    pub snippet: String,
    /// Sender
    pub from: Mailbox,
    /// Recipients (To field)
    pub to: Vec<Mailbox>,
    /// When the message was received
    pub received_at: DateTime<Utc>,
    /// Whether the message is unread
    pub is_unread: bool,
    /// Whether the message is starred
    pub is_starred: bool,
    /// Whether the message carries attachments
    pub has_attachments: bool,
    /// When this record was last written into the cache
    pub cached_at: DateTime<Utc>,
}

impl CachedEmail {
    /// Create a new email builder
    pub fn builder(id: EmailId, folder_id: impl Into<String>) -> CachedEmailBuilder {
        CachedEmailBuilder::new(id, folder_id.into())
    }
}

/// Builder for CachedEmail instances
pub struct CachedEmailBuilder {
    id: EmailId,
    thread_id: String,
    folder_id: String,
    subject: String,
    snippet: String,
    from: Option<Mailbox>,
    to: Vec<Mailbox>,
    received_at: Option<DateTime<Utc>>,
    is_unread: bool,
    is_starred: bool,
    has_attachments: bool,
}

impl CachedEmailBuilder {
    fn new(id: EmailId, folder_id: String) -> Self {
        Self {
            id,
            thread_id: String::new(),
            folder_id,
            subject: String::new(),
            snippet: String::new(),
            from: None,
            to: Vec::new(),
            received_at: None,
            is_unread: false,
            is_starred: false,
            has_attachments: false,
        }
    }

    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = thread_id.into();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn from(mut self, from: Mailbox) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: Vec<Mailbox>) -> Self {
        self.to = to;
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    pub fn unread(mut self, is_unread: bool) -> Self {
        self.is_unread = is_unread;
        self
    }

    pub fn starred(mut self, is_starred: bool) -> Self {
        self.is_starred = is_starred;
        self
    }

    pub fn has_attachments(mut self, has_attachments: bool) -> Self {
        self.has_attachments = has_attachments;
        self
    }

    pub fn build(self) -> CachedEmail {
        CachedEmail {
            id: self.id,
            thread_id: self.thread_id,
            folder_id: self.folder_id,
            subject: self.subject,
            snippet: self.snippet,
            from: self
                .from
                .unwrap_or_else(|| Mailbox::new("unknown@unknown.invalid")),
            to: self.to,
            received_at: self.received_at.unwrap_or_else(Utc::now),
            is_unread: self.is_unread,
            is_starred: self.is_starred,
            has_attachments: self.has_attachments,
            cached_at: Utc::now(),
        }
    }
}
