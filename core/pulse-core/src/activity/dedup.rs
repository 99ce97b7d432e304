//! Suppression of repeated write heartbeats at an unmoved cursor.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use pulse_protocol::Position;

pub const DEDUP_WINDOW_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSelection {
    pub position: Position,
    pub last_heartbeat_at: DateTime<Utc>,
}

/// Last write position per file. Lives for the process; never evicted.
#[derive(Debug)]
pub struct DedupGuard {
    window: Duration,
    files: HashMap<String, FileSelection>,
}

impl Default for DedupGuard {
    fn default() -> Self {
        Self::new(Duration::minutes(DEDUP_WINDOW_MINUTES))
    }
}

impl DedupGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            files: HashMap::new(),
        }
    }

    /// A write is a duplicate when the previous one for this file is older
    /// than the window and the cursor has not moved. The record is
    /// overwritten either way.
    pub fn is_duplicate(&mut self, file: &str, now: DateTime<Utc>, position: Position) -> bool {
        let duplicate = self
            .files
            .get(file)
            .map(|prior| prior.last_heartbeat_at + self.window < now && prior.position == position)
            .unwrap_or(false);

        self.files.insert(
            file.to_string(),
            FileSelection {
                position,
                last_heartbeat_at: now,
            },
        );

        duplicate
    }

    pub fn get(&self, file: &str) -> Option<&FileSelection> {
        self.files.get(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_first_write_is_never_duplicate() {
        let mut guard = DedupGuard::default();
        assert!(!guard.is_duplicate("/a.ts", t0(), Position::new(1, 1)));
        assert_eq!(guard.get("/a.ts").unwrap().last_heartbeat_at, t0());
    }

    #[test]
    fn test_recent_write_at_same_cursor_is_kept() {
        let mut guard = DedupGuard::default();
        guard.is_duplicate("/a.ts", t0(), Position::new(3, 4));
        assert!(!guard.is_duplicate(
            "/a.ts",
            t0() + Duration::seconds(5),
            Position::new(3, 4)
        ));
    }

    #[test]
    fn test_stale_write_at_same_cursor_is_suppressed() {
        let mut guard = DedupGuard::default();
        guard.is_duplicate("/a.ts", t0(), Position::new(3, 4));
        assert!(guard.is_duplicate(
            "/a.ts",
            t0() + Duration::minutes(31),
            Position::new(3, 4)
        ));
    }

    #[test]
    fn test_moved_cursor_is_never_duplicate() {
        let mut guard = DedupGuard::default();
        guard.is_duplicate("/a.ts", t0(), Position::new(3, 4));
        assert!(!guard.is_duplicate(
            "/a.ts",
            t0() + Duration::minutes(31),
            Position::new(3, 5)
        ));
    }

    #[test]
    fn test_record_is_overwritten_even_when_duplicate() {
        let mut guard = DedupGuard::default();
        let later = t0() + Duration::minutes(31);
        guard.is_duplicate("/a.ts", t0(), Position::new(0, 0));
        assert!(guard.is_duplicate("/a.ts", later, Position::new(0, 0)));
        assert_eq!(guard.get("/a.ts").unwrap().last_heartbeat_at, later);
        assert!(!guard.is_duplicate(
            "/a.ts",
            later + Duration::seconds(1),
            Position::new(0, 0)
        ));
    }
}
