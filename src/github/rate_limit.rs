//! GraphQL cost budget reported by GitHub.
//!
//! Every query the watcher sends selects the `rateLimit` field. GitHub answers
//! with the cost of the query alongside the points left in the current window,
//! so the budget is refreshed from every response rather than computed
//! locally.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Cost accounting from the `rateLimit` field of a GraphQL response.
///
/// `cost` is the price of the query that produced this value. Because the
/// watcher sends the same query text on every page, it is also the expected
/// cost of the next request.
///
/// # Example
///
/// ```
/// use label_watcher::github::rate_limit::RateLimitBudget;
///
/// let budget = RateLimitBudget::new(1, 4999);
/// assert!(budget.can_proceed());
/// assert!(!RateLimitBudget::new(7, 7).can_proceed());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitBudget {
    /// Points charged for the request.
    pub cost: u32,
    /// Points remaining in the current window.
    pub remaining: u32,
    /// Maximum points allowed per window.
    #[serde(default)]
    pub limit: u32,
    /// Points already used in the current window.
    #[serde(default)]
    pub used: u32,
    /// Number of nodes the request touched.
    #[serde(default)]
    pub node_count: u32,
    /// When the current window resets.
    #[serde(default)]
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitBudget {
    /// Creates a budget with only the admission-relevant values set.
    #[must_use]
    pub const fn new(cost: u32, remaining: u32) -> Self {
        Self {
            cost,
            remaining,
            limit: 0,
            used: 0,
            node_count: 0,
            reset_at: None,
        }
    }

    /// Returns true while the next request still fits in the window.
    #[must_use]
    pub const fn can_proceed(&self) -> bool {
        can_proceed(self)
    }

    /// Seconds until the window resets, or zero once it has passed or when
    /// GitHub did not report a reset time.
    #[must_use]
    pub fn seconds_until_reset(&self, now: DateTime<Utc>) -> u64 {
        self.reset_at
            .map(|reset_at| reset_at.signed_duration_since(now).num_seconds())
            .and_then(|seconds| u64::try_from(seconds).ok())
            .unwrap_or(0)
    }
}

/// Admission predicate for the next request.
///
/// A request may only be sent while its cost is strictly below the remaining
/// points; nothing else about GitHub's cost model is assumed.
#[must_use]
pub const fn can_proceed(budget: &RateLimitBudget) -> bool {
    budget.cost < budget.remaining
}
