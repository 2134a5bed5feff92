//! Offline action queue models
//!
//! An offline action records a mutation intent that could not be applied to
//! the remote provider synchronously. Actions are persisted per account and
//! replayed strictly in enqueue order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EmailId;

/// The kind of mutation an offline action replays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    MarkRead,
    MarkUnread,
    Star,
    Unstar,
    Delete,
    Move { destination: String },
}

/// A mutation intent awaiting replay against the remote provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineAction {
    pub kind: ActionKind,
    /// The message the mutation targets
    pub target: EmailId,
    pub enqueued_at: DateTime<Utc>,
}

impl OfflineAction {
    pub fn new(kind: ActionKind, target: EmailId) -> Self {
        Self {
            kind,
            target,
            enqueued_at: Utc::now(),
        }
    }
}

/// An offline action as stored in the queue
///
/// The id is assigned by the store at enqueue time and orders the queue
/// (FIFO by ascending id). `attempts` counts failed replays; the action is
/// dropped once attempts reach the configured ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedAction {
    pub id: i64,
    pub action: OfflineAction,
    pub attempts: u32,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_round_trips_through_json() {
        let kinds = vec![
            ActionKind::MarkRead,
            ActionKind::Delete,
            ActionKind::Move {
                destination: "ARCHIVE".to_string(),
            },
        ];
        for kind in kinds {
            let json = serde_json::to_string(&kind).unwrap();
            let back: ActionKind = serde_json::from_str(&json).unwrap();
            assert_eq!(kind, back);
        }
    }
}
