//! One watch run: fetch, reconcile against the seen-set, notify.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};

use crate::github::error::WatchError;
use crate::github::gateway::GraphQlGateway;
use crate::notify::{Notifier, render};
use crate::state::{PersistedState, ReconcilePolicy, reconcile};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::watch::LabelWatcher;

/// Default overlap between consecutive incremental runs.
pub const DEFAULT_OVERLAP: TimeDelta = TimeDelta::hours(1);

/// Window used by an incremental run with no previous run recorded.
pub const FIRST_RUN_WINDOW: TimeDelta = TimeDelta::days(1);

/// Which items a run asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Items updated since the last run, minus `overlap`.
    Recent {
        /// How far before the last run time to start.
        overlap: TimeDelta,
    },
    /// Every matching item, whatever its age.
    All,
}

impl RunMode {
    /// Lower update-time bound for a run starting at `now`.
    #[must_use]
    pub fn since(self, last_run_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Recent { overlap } => Some(last_run_time.map_or(now - FIRST_RUN_WINDOW, |last| last - overlap)),
            Self::All => None,
        }
    }

    /// Short name used in logs and telemetry.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Recent { .. } => "recent",
            Self::All => "all",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Mode the run used.
    pub mode: RunMode,
    /// Update-time bound the run used.
    pub since: Option<DateTime<Utc>>,
    /// False when the fetch produced nothing usable.
    pub produced_results: bool,
    /// Whether pagination read every stream.
    pub complete: bool,
    /// Items fetched, viewed or not.
    pub fetched_items: usize,
    /// Items never notified before.
    pub new_items: usize,
    /// Whether a digest was delivered.
    pub notified: bool,
}

/// Runs the watcher and notifies about new items.
pub struct WatchService<'a, G, N, T>
where
    G: GraphQlGateway + ?Sized,
    N: Notifier + ?Sized,
    T: TelemetrySink + ?Sized,
{
    watcher: LabelWatcher<'a, G>,
    notifier: &'a N,
    telemetry: &'a T,
    policy: ReconcilePolicy,
}

impl<'a, G, N, T> WatchService<'a, G, N, T>
where
    G: GraphQlGateway + ?Sized,
    N: Notifier + ?Sized,
    T: TelemetrySink + ?Sized,
{
    /// Creates a service.
    #[must_use]
    pub const fn new(
        watcher: LabelWatcher<'a, G>,
        notifier: &'a N,
        telemetry: &'a T,
        policy: ReconcilePolicy,
    ) -> Self {
        Self {
            watcher,
            notifier,
            telemetry,
            policy,
        }
    }

    /// Fetches items for `mode`, marks them against `state`, and delivers a
    /// digest when at least one item is new.
    ///
    /// `state` is only changed when the run produced results. Its last run
    /// time advances to `now` only when the fetch read every stream, so a
    /// truncated run is retried over the same window.
    ///
    /// # Errors
    ///
    /// Returns the notifier's error when the digest could not be rendered or
    /// delivered. `state` is left as it was, so the items are reported again
    /// by the next run.
    pub async fn find_and_notify(
        &self,
        state: &mut PersistedState,
        mode: RunMode,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, WatchError> {
        let since = mode.since(state.last_run_time, now);
        tracing::info!(%mode, since = ?since, "watch run started");

        let mut summary = RunSummary {
            mode,
            since,
            produced_results: false,
            complete: false,
            fetched_items: 0,
            new_items: 0,
            notified: false,
        };
        let Some(report) = self.watcher.recent_issues_with_label(since).await else {
            tracing::warn!(%mode, "run produced no results; state left unchanged");
            self.record(&summary);
            return Ok(summary);
        };
        summary.produced_results = true;
        summary.complete = report.complete;
        summary.fetched_items = report.issue_count();

        let snapshot = state.clone();
        let reconciliation = reconcile(state, report.repositories, self.policy);
        summary.new_items = reconciliation.new_items;
        for repository in &reconciliation.repositories {
            let new = repository
                .issues
                .iter()
                .filter(|record| !record.already_viewed)
                .map(|record| record.number.as_str())
                .collect::<Vec<_>>();
            tracing::info!(
                repository = %repository.repository.full_name(),
                relevant = repository.issues.len(),
                new = ?new,
                "repository summary"
            );
        }

        if reconciliation.new_items > 0 {
            let delivered = render(&reconciliation.notify)
                .and_then(|notification| self.notifier.notify(&notification, now));
            if let Err(error) = delivered {
                tracing::error!(%error, "digest delivery failed; seen items not recorded");
                *state = snapshot;
                self.record(&summary);
                return Err(error);
            }
            summary.notified = true;
        } else {
            tracing::info!("no new items; nothing to notify");
        }

        if report.complete {
            state.last_run_time = Some(now);
        } else {
            tracing::warn!("fetch was truncated; last run time not advanced");
        }
        self.record(&summary);
        Ok(summary)
    }

    fn record(&self, summary: &RunSummary) {
        self.telemetry.record(TelemetryEvent::RunCompleted {
            mode: summary.mode.name().to_owned(),
            repositories: self.watcher.repositories().len(),
            fetched_items: summary.fetched_items,
            new_items: summary.new_items,
            complete: summary.complete,
            notified: summary.notified,
        });
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
