//! History visibility policy.

use chrono::{DateTime, Duration, Utc};

use crate::config::HistoryConfig;
use crate::db::Tier;

/// Default look-back for standard-tier requesters.
pub const DEFAULT_STANDARD_WINDOW_HOURS: i64 = 24;

/// Largest accepted standard-tier look-back.
pub const MAX_STANDARD_WINDOW_HOURS: i64 = 1_000_000;

/// What slice of a scope's history a requester may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryWindow {
    /// No history at all (anonymous requester).
    Nothing,
    /// Messages created at or after the cutoff.
    Since(DateTime<Utc>),
    /// The whole history of the scope.
    Everything,
}

impl HistoryWindow {
    /// Cutoff to pass to the store, or None when the window is unbounded.
    ///
    /// Returns None for `Nothing` as well; callers must check
    /// [`HistoryWindow::is_empty`] first.
    pub fn cutoff(&self) -> Option<DateTime<Utc>> {
        match self {
            HistoryWindow::Since(cutoff) => Some(*cutoff),
            _ => None,
        }
    }

    /// Whether the window admits no messages.
    pub fn is_empty(&self) -> bool {
        matches!(self, HistoryWindow::Nothing)
    }

    /// Whether a message created at `created_at` falls inside the window.
    pub fn admits(&self, created_at: &DateTime<Utc>) -> bool {
        match self {
            HistoryWindow::Nothing => false,
            HistoryWindow::Since(cutoff) => created_at >= cutoff,
            HistoryWindow::Everything => true,
        }
    }
}

/// A requester's standing access to a conversation's history.
///
/// Unlike [`HistoryWindow`] this does not depend on the clock, so a session
/// can keep it for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryAccess {
    /// No history.
    #[default]
    Denied,
    /// Messages younger than the given look-back.
    Recent(Duration),
    /// Everything.
    Full,
}

impl HistoryAccess {
    /// Window as seen at `now`.
    ///
    /// A look-back reaching before the earliest representable time covers
    /// everything.
    pub fn window(&self, now: DateTime<Utc>) -> HistoryWindow {
        match self {
            HistoryAccess::Denied => HistoryWindow::Nothing,
            HistoryAccess::Recent(look_back) => now
                .checked_sub_signed(*look_back)
                .map(HistoryWindow::Since)
                .unwrap_or(HistoryWindow::Everything),
            HistoryAccess::Full => HistoryWindow::Everything,
        }
    }
}

/// Tier-based history policy.
#[derive(Debug, Clone, Copy)]
pub struct HistoryPolicy {
    standard_window: Duration,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_STANDARD_WINDOW_HOURS))
    }
}

impl HistoryPolicy {
    /// Create a policy with the given standard-tier window.
    pub fn new(standard_window: Duration) -> Self {
        Self { standard_window }
    }

    /// Create a policy from the `[history]` config section.
    pub fn from_config(config: &HistoryConfig) -> Self {
        let hours = config
            .standard_window_hours
            .clamp(0, MAX_STANDARD_WINDOW_HOURS);
        Self::new(Duration::hours(hours))
    }

    /// The standard-tier window.
    pub fn standard_window(&self) -> Duration {
        self.standard_window
    }

    /// Access for a requester tier. `None` means no history at all.
    pub fn access(&self, requester_tier: Option<Tier>) -> HistoryAccess {
        match requester_tier {
            None => HistoryAccess::Denied,
            Some(Tier::Privileged) => HistoryAccess::Full,
            Some(Tier::Standard) => HistoryAccess::Recent(self.standard_window),
        }
    }

    /// Window for a requester at `now`. `None` means anonymous.
    pub fn window(&self, requester_tier: Option<Tier>, now: DateTime<Utc>) -> HistoryWindow {
        self.access(requester_tier).window(now)
    }
}
