//! Screen session extraction
//!
//! Pairs each lock event with the most recent unresolved unlock on the same
//! calendar day. Pending unlocks are keyed by date, so a later unlock replaces
//! an earlier unresolved one and sessions crossing midnight are never closed.

use crate::types::{RawEvent, ScreenStatus, Session};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use tracing::debug;

/// Stateful extractor holding the pending unlock per calendar day
#[derive(Debug, Default)]
pub struct SessionExtractor {
    pending_unlocks: BTreeMap<NaiveDate, DateTime<Utc>>,
    discarded_locks: usize,
}

impl SessionExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract sessions from a batch of events (sorted by timestamp, stable)
    pub fn extract(events: &[RawEvent]) -> Vec<Session> {
        let mut ordered: Vec<&RawEvent> = events.iter().collect();
        ordered.sort_by_key(|e| e.timestamp);

        let mut extractor = Self::new();
        let sessions: Vec<Session> = ordered
            .into_iter()
            .filter_map(|event| extractor.observe(event))
            .collect();

        debug!(
            sessions = sessions.len(),
            discarded_locks = extractor.discarded_locks,
            unresolved_unlocks = extractor.pending_unlocks.len(),
            "extracted screen sessions"
        );
        sessions
    }

    /// Feed one event; returns a session when a lock closes a pending unlock
    pub fn observe(&mut self, event: &RawEvent) -> Option<Session> {
        let day = event.timestamp.date_naive();

        match event.status {
            ScreenStatus::Unlock => {
                self.pending_unlocks.insert(day, event.timestamp);
                None
            }
            ScreenStatus::Lock => match self.pending_unlocks.remove(&day) {
                Some(unlocked_at) => Some(Session {
                    day,
                    unlocked_at,
                    locked_at: event.timestamp,
                    duration_minutes: elapsed_minutes(unlocked_at, event.timestamp),
                }),
                None => {
                    self.discarded_locks += 1;
                    None
                }
            },
            ScreenStatus::Other(_) => None,
        }
    }

    /// Number of lock events seen without a pending unlock
    pub fn discarded_locks(&self) -> usize {
        self.discarded_locks
    }

    /// Consume the extractor, returning unlocks that never closed
    pub fn into_unresolved(self) -> BTreeMap<NaiveDate, DateTime<Utc>> {
        self.pending_unlocks
    }
}

/// Whole elapsed seconds expressed in minutes
fn elapsed_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / 60.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 2, 4, h, m, s).unwrap()
    }

    fn event(timestamp: DateTime<Utc>, status: ScreenStatus) -> RawEvent {
        RawEvent { timestamp, status }
    }

    #[test]
    fn test_single_unlock_lock_pair() {
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let events = vec![
            event(start, ScreenStatus::Unlock),
            event(start + Duration::milliseconds(60_000), ScreenStatus::Lock),
        ];

        let sessions = SessionExtractor::extract(&events);

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration_minutes, 1.0);
        assert_eq!(sessions[0].day, start.date_naive());
    }

    #[test]
    fn test_duration_uses_whole_seconds() {
        let events = vec![
            event(at(10, 0, 0), ScreenStatus::Unlock),
            event(at(10, 1, 30) + Duration::milliseconds(900), ScreenStatus::Lock),
        ];

        let sessions = SessionExtractor::extract(&events);
        assert_eq!(sessions[0].duration_minutes, 1.5);
    }

    #[test]
    fn test_lock_without_unlock_is_dropped() {
        let events = vec![event(at(9, 0, 0), ScreenStatus::Lock)];

        let mut extractor = SessionExtractor::new();
        assert!(extractor.observe(&events[0]).is_none());
        assert_eq!(extractor.discarded_locks(), 1);
        assert!(SessionExtractor::extract(&events).is_empty());
    }

    #[test]
    fn test_second_unlock_replaces_first() {
        let events = vec![
            event(at(9, 0, 0), ScreenStatus::Unlock),
            event(at(9, 10, 0), ScreenStatus::Unlock),
            event(at(9, 15, 0), ScreenStatus::Lock),
            event(at(9, 20, 0), ScreenStatus::Lock),
        ];

        let sessions = SessionExtractor::extract(&events);

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].unlocked_at, at(9, 10, 0));
        assert_eq!(sessions[0].duration_minutes, 5.0);
    }

    #[test]
    fn test_cross_midnight_session_is_not_captured() {
        let late = Utc.with_ymd_and_hms(2022, 2, 4, 23, 50, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2022, 2, 5, 0, 10, 0).unwrap();
        let events = vec![event(late, ScreenStatus::Unlock), event(early, ScreenStatus::Lock)];

        let mut extractor = SessionExtractor::new();
        let sessions: Vec<Session> = events.iter().filter_map(|e| extractor.observe(e)).collect();

        assert!(sessions.is_empty());
        let unresolved = extractor.into_unresolved();
        assert_eq!(unresolved.get(&late.date_naive()), Some(&late));
    }

    #[test]
    fn test_other_status_codes_are_ignored() {
        let events = vec![
            event(at(8, 0, 0), ScreenStatus::Unlock),
            event(at(8, 1, 0), ScreenStatus::Other(0)),
            event(at(8, 2, 0), ScreenStatus::Other(1)),
            event(at(8, 3, 0), ScreenStatus::Lock),
        ];

        let sessions = SessionExtractor::extract(&events);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration_minutes, 3.0);
    }

    #[test]
    fn test_events_are_processed_in_timestamp_order() {
        let events = vec![
            event(at(12, 5, 0), ScreenStatus::Lock),
            event(at(12, 0, 0), ScreenStatus::Unlock),
        ];

        let sessions = SessionExtractor::extract(&events);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration_minutes, 5.0);
    }

    #[test]
    fn test_multiple_sessions_per_day() {
        let events = vec![
            event(at(8, 0, 0), ScreenStatus::Unlock),
            event(at(8, 2, 0), ScreenStatus::Lock),
            event(at(9, 0, 0), ScreenStatus::Unlock),
            event(at(9, 4, 0), ScreenStatus::Lock),
        ];

        let total: f64 = SessionExtractor::extract(&events)
            .iter()
            .map(|s| s.duration_minutes)
            .sum();
        assert_eq!(total, 6.0);
    }
}
