use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Lifecycle of one cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Never fetched.
    Idle,
    /// In flight with no prior data to serve.
    Loading,
    /// Latest fetch settled with data.
    Success,
    /// Latest fetch settled with an error.
    Error,
}

/// Observable state of one query, published to subscribers on every change.
///
/// During a revalidation `is_fetching` is true while `data` keeps serving
/// the previous success value (stale-while-revalidate). After a failed
/// refetch `data` likewise survives alongside the error.
#[derive(Debug)]
pub struct QueryState<T> {
    pub status: QueryStatus,
    pub data: Option<Arc<T>>,
    pub error: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub is_fetching: bool,
}

impl<T> QueryState<T> {
    pub fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            fetched_at: None,
            is_fetching: false,
        }
    }

    /// In flight with no prior data.
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    /// Human-readable age of the current data ("just now", "5m ago", ...).
    pub fn age_display(&self) -> String {
        fetched_age_display(self.fetched_at)
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

// Manual impl: `Arc<T>` clones without `T: Clone`.
impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            is_fetching: self.is_fetching,
        }
    }
}

/// Whether a result fetched at `fetched_at` has outlived `stale_after`.
/// Clock skew (a fetch timestamp in the future) counts as fresh.
pub(crate) fn outlived(fetched_at: Option<DateTime<Utc>>, stale_after: Duration) -> bool {
    match fetched_at {
        Some(t) => (Utc::now() - t)
            .to_std()
            .map(|age| age > stale_after)
            .unwrap_or(false),
        None => true,
    }
}

/// Render a fetch timestamp as a coarse age, "never" when absent.
pub fn fetched_age_display(fetched_at: Option<DateTime<Utc>>) -> String {
    let Some(t) = fetched_at else {
        return "never".to_string();
    };

    let minutes = (Utc::now() - t).num_minutes();
    if minutes < 1 {
        // Covers clock skew too
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_idle_state_has_nothing() {
        let state: QueryState<Vec<i64>> = QueryState::idle();
        assert_eq!(state.status, QueryStatus::Idle);
        assert!(state.data.is_none());
        assert!(!state.is_fetching);
    }

    #[test]
    fn test_age_display_buckets() {
        assert_eq!(fetched_age_display(None), "never");
        assert_eq!(fetched_age_display(Some(Utc::now())), "just now");
        assert_eq!(
            fetched_age_display(Some(Utc::now() - ChronoDuration::minutes(5))),
            "5m ago"
        );
        assert_eq!(
            fetched_age_display(Some(Utc::now() - ChronoDuration::minutes(95))),
            "2h ago"
        );
        assert_eq!(
            fetched_age_display(Some(Utc::now() - ChronoDuration::days(3))),
            "3d ago"
        );
    }

    #[test]
    fn test_outlived() {
        let now = Some(Utc::now());
        assert!(!outlived(now, Duration::from_secs(60)));
        assert!(outlived(
            Some(Utc::now() - ChronoDuration::seconds(61)),
            Duration::from_secs(60)
        ));
        assert!(outlived(None, Duration::from_secs(60)));
        // Future timestamp (clock skew) is fresh
        assert!(!outlived(
            Some(Utc::now() + ChronoDuration::seconds(30)),
            Duration::ZERO
        ));
    }
}
