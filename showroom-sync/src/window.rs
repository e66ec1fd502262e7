//! Conflict window: a best-effort cooldown before writing shared content.
//!
//! Looks at the store's history for the last `lookback` (2 minutes). If the
//! newest commit is younger than `threshold` (30 seconds), someone else just
//! published and their rebuild may not have started yet, so the caller waits
//! a fixed `cooldown` (35 seconds) once. There is no re-check after waiting.
//!
//! This narrows the race between two near-simultaneous publishes; it does not
//! close it. The store's version-token check is the only real guard.
//!
//! Any failure reading history counts as "no recent activity": the check
//! never blocks or aborts a publish.

use std::time::Duration;

use chrono::{DateTime, Utc};

use showroom_core::{CommitRecord, WindowSettings};
use showroom_store::ContentStore;

/// How many history entries to ask for.
pub const HISTORY_LIMIT: usize = 5;

/// Result of [`ConflictWindow::check_recent_activity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecentActivity {
    Clear,
    Recent { age_secs: u64, message: String },
}

impl RecentActivity {
    pub fn has_recent(&self) -> bool {
        matches!(self, RecentActivity::Recent { .. })
    }

    /// `"<N> seconds ago"` when recent.
    pub fn message(&self) -> Option<&str> {
        match self {
            RecentActivity::Clear => None,
            RecentActivity::Recent { message, .. } => Some(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictWindow {
    lookback: Duration,
    threshold: Duration,
    cooldown: Duration,
}

impl Default for ConflictWindow {
    fn default() -> Self {
        Self::new(&WindowSettings::default())
    }
}

impl ConflictWindow {
    pub fn new(settings: &WindowSettings) -> Self {
        Self {
            lookback: Duration::from_secs(settings.lookback_secs),
            threshold: Duration::from_secs(settings.threshold_secs),
            cooldown: Duration::from_secs(settings.cooldown_secs),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Check the store for a commit younger than the threshold.
    pub async fn check_recent_activity(&self, store: &dyn ContentStore) -> RecentActivity {
        self.check_recent_activity_at(store, Utc::now()).await
    }

    /// [`check_recent_activity`](Self::check_recent_activity) with an explicit clock.
    pub async fn check_recent_activity_at(
        &self,
        store: &dyn ContentStore,
        now: DateTime<Utc>,
    ) -> RecentActivity {
        let since = chrono::Duration::from_std(self.lookback)
            .ok()
            .and_then(|lookback| now.checked_sub_signed(lookback))
            .unwrap_or_else(|| now - chrono::Duration::minutes(2));
        match store.recent_commits(since, HISTORY_LIMIT).await {
            Ok(commits) => self.classify(&commits, now),
            Err(err) => {
                tracing::warn!("conflict window check failed, continuing: {}", err);
                RecentActivity::Clear
            }
        }
    }

    /// Classify history: recent iff the newest commit is strictly younger than the threshold.
    pub fn classify(&self, commits: &[CommitRecord], now: DateTime<Utc>) -> RecentActivity {
        let Some(newest) = commits.iter().max_by_key(|c| c.author_timestamp) else {
            return RecentActivity::Clear;
        };
        let age = newest.age_at(now).to_std().unwrap_or_default();
        if age < self.threshold {
            let age_secs = age.as_secs();
            RecentActivity::Recent {
                age_secs,
                message: format!("{age_secs} seconds ago"),
            }
        } else {
            RecentActivity::Clear
        }
    }

    /// Check once; if recent, report it through `on_recent` and sleep the cooldown.
    ///
    /// Returns what the check found.
    pub async fn wait_for_clear_window<F>(
        &self,
        store: &dyn ContentStore,
        on_recent: F,
    ) -> RecentActivity
    where
        F: FnOnce(&RecentActivity) + Send,
    {
        let activity = self.check_recent_activity(store).await;
        if activity.has_recent() {
            on_recent(&activity);
            tracing::info!(
                "recent publish detected ({}), waiting {}s",
                activity.message().unwrap_or_default(),
                self.cooldown.as_secs()
            );
            tokio::time::sleep(self.cooldown).await;
        }
        activity
    }
}
