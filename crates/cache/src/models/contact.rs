//! Cached contact model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a contact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(pub String);

impl ContactId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContactId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A cached contact record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedContact {
    pub id: ContactId,
    pub display_name: String,
    pub given_name: String,
    pub family_name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub job_title: String,
    pub notes: String,
    /// When this record was last written into the cache
    pub cached_at: DateTime<Utc>,
}

impl CachedContact {
    pub fn new(id: ContactId, display_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            given_name: String::new(),
            family_name: String::new(),
            email: email.into(),
            phone: String::new(),
            company: String::new(),
            job_title: String::new(),
            notes: String::new(),
            cached_at: Utc::now(),
        }
    }
}
