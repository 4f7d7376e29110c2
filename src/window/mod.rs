use serde::Serialize;

/// Lookback applied when no parent commit can anchor the window start.
pub const FALLBACK_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// How the window start was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStrategy {
    /// Anchored at the first parent's commit timestamp.
    CommitBased,
    /// Root commit: nothing to anchor on, look back 24 hours.
    FirstCommitFallback,
    /// Parent lookup failed, look back 24 hours.
    Fallback24h,
}

impl WindowStrategy {
    pub fn label(self) -> &'static str {
        match self {
            WindowStrategy::CommitBased => "commit-based",
            WindowStrategy::FirstCommitFallback => "first-commit-24h",
            WindowStrategy::Fallback24h => "fallback-24h",
        }
    }
}

/// The development window of a commit: from its first parent's timestamp to
/// its own, both in epoch milliseconds and both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
    pub strategy: WindowStrategy,
    pub duration_hours: f64,
}

impl TimeWindow {
    pub fn contains(&self, ts_ms: i64) -> bool {
        self.start_ms <= ts_ms && ts_ms <= self.end_ms
    }
}

#[derive(Debug)]
pub enum WindowOutcome {
    Window(TimeWindow),
    /// Merge commits get no development window and no journal entry.
    MergeCommit,
}

/// Compute the development window for a commit. Git hands out second
/// resolution; everything downstream works in milliseconds.
pub fn for_commit(commit: &git2::Commit) -> WindowOutcome {
    if commit.parent_count() >= 2 {
        return WindowOutcome::MergeCommit;
    }
    let end_ms = commit.time().seconds() * 1000;
    let (start_ms, strategy) = if commit.parent_count() == 0 {
        (end_ms - FALLBACK_WINDOW_MS, WindowStrategy::FirstCommitFallback)
    } else {
        match commit.parent(0) {
            Ok(parent) => (parent.time().seconds() * 1000, WindowStrategy::CommitBased),
            Err(e) => {
                tracing::warn!(error = %e, "parent lookup failed, falling back to a 24h window");
                (end_ms - FALLBACK_WINDOW_MS, WindowStrategy::Fallback24h)
            }
        }
    };
    WindowOutcome::Window(TimeWindow {
        start_ms,
        end_ms,
        strategy,
        duration_hours: (end_ms - start_ms) as f64 / 3_600_000.0,
    })
}
