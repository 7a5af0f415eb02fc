//! Marks fetched records against the seen-set and picks what to notify.

use crate::watch::{IssueRecord, RepositoryIssues};

use super::PersistedState;

/// How already notified items are treated in the digest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// List already notified items in the digest, marked as viewed.
    pub include_already_viewed: bool,
}

/// Result of reconciling one run's records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Every fetched record with `already_viewed` set, newest first.
    pub repositories: Vec<RepositoryIssues>,
    /// Records to hand to the notifier, grouped per repository, newest
    /// first. Repositories with nothing to list are left out.
    pub notify: Vec<RepositoryIssues>,
    /// Records not notified by any earlier run.
    pub new_items: usize,
}

impl Reconciliation {
    /// Number of records in the digest.
    #[must_use]
    pub fn notify_count(&self) -> usize {
        self.notify.iter().map(|repository| repository.issues.len()).sum()
    }
}

/// Marks every record in `repositories` against `state` and records the
/// new ones in it.
#[must_use]
pub fn reconcile(
    state: &mut PersistedState,
    repositories: Vec<RepositoryIssues>,
    policy: ReconcilePolicy,
) -> Reconciliation {
    let mut reconciliation = Reconciliation::default();
    for mut repository in repositories {
        let full_name = repository.repository.full_name();
        for record in &mut repository.issues {
            record.already_viewed = !state.mark_seen(&full_name, &record.number);
        }
        repository
            .issues
            .sort_by(|left, right| right.updated_at.cmp(&left.updated_at));

        let listed: Vec<IssueRecord> = repository
            .issues
            .iter()
            .filter(|record| policy.include_already_viewed || !record.already_viewed)
            .cloned()
            .collect();
        reconciliation.new_items += listed.iter().filter(|record| !record.already_viewed).count();
        if !listed.is_empty() {
            reconciliation.notify.push(RepositoryIssues {
                repository: repository.repository.clone(),
                issues: listed,
            });
        }
        reconciliation.repositories.push(repository);
    }
    reconciliation
}

#[cfg(test)]
mod tests {
    //! Unit tests for seen-set reconciliation.

    use chrono::{DateTime, TimeZone, Utc};
    use rstest::{fixture, rstest};

    use super::*;
    use crate::github::locator::RepositoryLocator;
    use crate::watch::{IssueKind, WatchedRepository};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, hour, 0, 0)
            .single()
            .expect("valid time")
    }

    fn record(number: &str, hour: u32) -> IssueRecord {
        IssueRecord {
            repository: "octo/widgets".to_owned(),
            number: number.to_owned(),
            kind: IssueKind::Issue,
            status: "OPEN".to_owned(),
            title: format!("Item {number}"),
            labels: vec!["bug".to_owned()],
            updated_at: at(hour),
            url: format!("https://github.com/octo/widgets/issues/{number}"),
            already_viewed: false,
        }
    }

    #[fixture]
    fn fetched() -> Vec<RepositoryIssues> {
        vec![RepositoryIssues {
            repository: WatchedRepository::new(
                RepositoryLocator::parse("octo/widgets").expect("valid repository"),
                ["bug"],
            ),
            issues: vec![record("1", 8), record("2", 11), record("3", 9)],
        }]
    }

    fn numbers(repositories: &[RepositoryIssues]) -> Vec<(String, bool)> {
        repositories
            .iter()
            .flat_map(|repository| &repository.issues)
            .map(|record| (record.number.clone(), record.already_viewed))
            .collect()
    }

    #[rstest]
    fn new_records_are_recorded_and_sorted_newest_first(fetched: Vec<RepositoryIssues>) {
        let mut state = PersistedState::new();

        let result = reconcile(&mut state, fetched, ReconcilePolicy::default());

        assert_eq!(result.new_items, 3);
        assert_eq!(
            numbers(&result.notify),
            vec![
                ("2".to_owned(), false),
                ("3".to_owned(), false),
                ("1".to_owned(), false)
            ]
        );
        assert!(state.has_seen("OCTO/widgets", "1"));
    }

    #[rstest]
    fn seen_records_are_suppressed_by_default(fetched: Vec<RepositoryIssues>) {
        let mut state = PersistedState::new();
        state.mark_seen("octo/widgets", "2");

        let result = reconcile(&mut state, fetched, ReconcilePolicy::default());

        assert_eq!(result.new_items, 2);
        assert_eq!(result.notify_count(), 2);
        assert_eq!(
            numbers(&result.repositories),
            vec![
                ("2".to_owned(), true),
                ("3".to_owned(), false),
                ("1".to_owned(), false)
            ]
        );
    }

    #[rstest]
    fn seen_records_can_be_listed_as_viewed(fetched: Vec<RepositoryIssues>) {
        let mut state = PersistedState::new();
        state.mark_seen("octo/widgets", "2");

        let result = reconcile(
            &mut state,
            fetched,
            ReconcilePolicy {
                include_already_viewed: true,
            },
        );

        assert_eq!(result.new_items, 2);
        assert_eq!(result.notify_count(), 3);
    }

    #[rstest]
    fn a_second_pass_over_the_same_records_notifies_nothing(fetched: Vec<RepositoryIssues>) {
        let mut state = PersistedState::new();
        let first = reconcile(&mut state, fetched.clone(), ReconcilePolicy::default());
        let after_first = state.clone();

        let second = reconcile(&mut state, fetched, ReconcilePolicy::default());

        assert_eq!(first.new_items, 3);
        assert_eq!(second.new_items, 0);
        assert!(second.notify.is_empty());
        assert_eq!(state, after_first);
    }
}
