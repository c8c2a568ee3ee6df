//! Date-range admission based on consensus snapshot file names.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;

/// File name layout of consensus snapshots, e.g.
/// `2015-07-31-15-00-00-consensus`.
pub const SNAPSHOT_NAME_FORMAT: &str = "%Y-%m-%d-%H-%M-%S-consensus";

/// Half-open admission window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// A window that admits every timestamp.
    pub fn unbounded() -> Self {
        Self {
            start: DateTime::<Utc>::MIN_UTC,
            end: DateTime::<Utc>::MAX_UTC,
        }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp < self.end
    }

    /// Decides from the file name alone whether an entry should be parsed.
    ///
    /// Names that do not follow [`SNAPSHOT_NAME_FORMAT`] are always admitted.
    pub fn admits(&self, path: &Path) -> bool {
        match snapshot_time(path) {
            Some(timestamp) => self.contains(timestamp),
            None => true,
        }
    }
}

impl Default for DateWindow {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Extracts the timestamp embedded in a snapshot file name.
pub fn snapshot_time(path: &Path) -> Option<DateTime<Utc>> {
    let name = path.file_name()?.to_str()?;
    NaiveDateTime::parse_from_str(name, SNAPSHOT_NAME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
