//! Frame-count stop limit

use std::fmt;

/// Number of valid pings after which a session stops on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameLimit(Option<u64>);

impl FrameLimit {
    pub const UNLIMITED: FrameLimit = FrameLimit(None);

    /// Limit from a signed count; zero or negative means unlimited.
    pub fn from_count(count: i64) -> Self {
        if count > 0 { FrameLimit(Some(count as u64)) } else { FrameLimit(None) }
    }

    pub fn get(self) -> Option<u64> {
        self.0
    }

    pub fn is_unlimited(self) -> bool {
        self.0.is_none()
    }

    /// True once `frames` valid pings have been processed.
    pub fn reached(self, frames: u64) -> bool {
        self.0.is_some_and(|limit| frames >= limit)
    }
}

impl From<i64> for FrameLimit {
    fn from(count: i64) -> Self {
        FrameLimit::from_count(count)
    }
}

impl fmt::Display for FrameLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(limit) => write!(f, "{}", limit),
            None => f.write_str("unlimited"),
        }
    }
}
