//! Persisted run state: the last run time and every item ever notified.
//!
//! The seen-set of a repository only grows. An item number recorded once is
//! never reported as new again, even when it drops out of the recency window
//! and comes back later.

pub mod reconcile;
pub mod store;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::watch::stream::RepositoryKey;

pub use reconcile::{ReconcilePolicy, Reconciliation, reconcile};
pub use store::{FileStateStore, StateStore};

/// Item numbers already notified for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenIssues {
    /// Full name as first recorded.
    pub full_name: String,
    /// Notified item numbers.
    pub numbers: BTreeSet<String>,
}

/// State carried from one run to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedState {
    /// Start time of the last completed run.
    pub last_run_time: Option<DateTime<Utc>>,
    repositories: BTreeMap<RepositoryKey, SeenIssues>,
}

impl PersistedState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `number` was notified for `full_name` before.
    #[must_use]
    pub fn has_seen(&self, full_name: &str, number: &str) -> bool {
        self.repositories
            .get(&RepositoryKey::new(full_name))
            .is_some_and(|seen| seen.numbers.contains(number))
    }

    /// Records `number` for `full_name`.
    ///
    /// Returns `true` when the number was not recorded before.
    pub fn mark_seen(&mut self, full_name: &str, number: &str) -> bool {
        self.repositories
            .entry(RepositoryKey::new(full_name))
            .or_insert_with(|| SeenIssues {
                full_name: full_name.to_owned(),
                numbers: BTreeSet::new(),
            })
            .numbers
            .insert(number.to_owned())
    }

    /// Seen-set of `full_name`, if any item was ever recorded for it.
    #[must_use]
    pub fn seen(&self, full_name: &str) -> Option<&SeenIssues> {
        self.repositories.get(&RepositoryKey::new(full_name))
    }

    /// Number of repositories with a seen-set.
    #[must_use]
    pub fn repository_count(&self) -> usize {
        self.repositories.len()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateDocument {
    #[serde(default)]
    last_run_time: Option<DateTime<Utc>>,
    #[serde(default)]
    repos: Vec<RepositoryDocument>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryDocument {
    full_name: String,
    #[serde(default)]
    issue_numbers: Vec<String>,
}

impl Serialize for PersistedState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        StateDocument {
            last_run_time: self.last_run_time,
            repos: self
                .repositories
                .values()
                .map(|seen| RepositoryDocument {
                    full_name: seen.full_name.clone(),
                    issue_numbers: seen.numbers.iter().cloned().collect(),
                })
                .collect(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PersistedState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let document = StateDocument::deserialize(deserializer)?;
        let mut state = Self {
            last_run_time: document.last_run_time,
            repositories: BTreeMap::new(),
        };
        for repository in document.repos {
            let seen = state
                .repositories
                .entry(RepositoryKey::new(&repository.full_name))
                .or_insert_with(|| SeenIssues {
                    full_name: repository.full_name.clone(),
                    numbers: BTreeSet::new(),
                });
            seen.numbers.extend(repository.issue_numbers);
        }
        Ok(state)
    }
}
