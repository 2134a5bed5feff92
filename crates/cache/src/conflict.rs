//! Calendar conflict detection
//!
//! Pure functions over a page of cached events. Quadratic in the number of
//! busy events, which is bounded by a single query-window page.

use crate::models::{CachedEvent, EventId, EventStatus};

/// An unordered pair of overlapping busy events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub first: EventId,
    pub second: EventId,
}

/// Report every pairwise time-overlap among busy, non-cancelled events
///
/// Intervals are half-open, so touching endpoints do not conflict. All-day
/// events are normalized to midnight-based 24-hour intervals before the
/// overlap test.
pub fn find_conflicts(events: &[CachedEvent]) -> Vec<Conflict> {
    let busy: Vec<&CachedEvent> = events
        .iter()
        .filter(|e| e.is_busy && e.status != EventStatus::Cancelled)
        .collect();

    let mut conflicts = Vec::new();
    for (i, a) in busy.iter().enumerate() {
        let (a_start, a_end) = a.effective_interval();
        for b in &busy[i + 1..] {
            let (b_start, b_end) = b.effective_interval();
            if a_start < b_end && b_start < a_end {
                conflicts.push(Conflict {
                    first: a.id.clone(),
                    second: b.id.clone(),
                });
            }
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn timed_event(id: &str, start_hm: (u32, u32), end_hm: (u32, u32)) -> CachedEvent {
        CachedEvent {
            id: EventId::new(id),
            calendar_id: "primary".to_string(),
            title: id.to_string(),
            description: String::new(),
            location: String::new(),
            start: Utc
                .with_ymd_and_hms(2025, 5, 20, start_hm.0, start_hm.1, 0)
                .unwrap(),
            end: Utc
                .with_ymd_and_hms(2025, 5, 20, end_hm.0, end_hm.1, 0)
                .unwrap(),
            is_all_day: false,
            status: EventStatus::Confirmed,
            is_busy: true,
            participants: Vec::new(),
            cached_at: Utc::now(),
        }
    }

    #[test]
    fn test_overlapping_events_conflict() {
        let events = vec![
            timed_event("a", (10, 0), (11, 0)),
            timed_event("b", (10, 30), (11, 30)),
        ];

        let conflicts = find_conflicts(&events);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].first.as_str(), "a");
        assert_eq!(conflicts[0].second.as_str(), "b");
    }

    #[test]
    fn test_touching_endpoints_do_not_conflict() {
        let events = vec![
            timed_event("a", (10, 0), (11, 0)),
            timed_event("b", (11, 0), (12, 0)),
        ];
        assert!(find_conflicts(&events).is_empty());
    }

    #[test]
    fn test_cancelled_event_never_conflicts() {
        let mut cancelled = timed_event("a", (10, 0), (11, 0));
        cancelled.status = EventStatus::Cancelled;
        let events = vec![cancelled, timed_event("b", (10, 0), (11, 0))];
        assert!(find_conflicts(&events).is_empty());
    }

    #[test]
    fn test_free_event_never_conflicts() {
        let mut free = timed_event("a", (10, 0), (11, 0));
        free.is_busy = false;
        let events = vec![free, timed_event("b", (10, 0), (11, 0))];
        assert!(find_conflicts(&events).is_empty());
    }

    #[test]
    fn test_all_day_event_conflicts_with_timed_event() {
        let mut all_day = timed_event("a", (0, 0), (0, 0));
        all_day.is_all_day = true;

        let events = vec![all_day, timed_event("b", (14, 0), (15, 0))];
        assert_eq!(find_conflicts(&events).len(), 1);
    }

    #[test]
    fn test_three_way_overlap_reports_all_pairs() {
        let events = vec![
            timed_event("a", (9, 0), (12, 0)),
            timed_event("b", (10, 0), (11, 0)),
            timed_event("c", (10, 30), (13, 0)),
        ];
        assert_eq!(find_conflicts(&events).len(), 3);
    }
}
