//! Fetching labelled issues and pull requests from many repositories.
//!
//! A run reads each repository's label list, plans one stream per watch
//! target, pages every stream through a single batched query, and completes
//! truncated item label lists. All requests go through the same
//! [`PaginationEngine`], one at a time.

pub mod aggregate;
pub mod compose;
pub mod engine;
pub mod labels;
pub mod plan;
pub mod query;
pub mod stream;

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::github::gateway::GraphQlGateway;
use crate::github::pagination::PageSize;
use crate::github::rate_limit::RateLimitBudget;

pub use aggregate::{Aggregator, IssueKind, IssueRecord, RepositoryIssues};
pub use engine::{Completion, PageSink, PaginationEngine, PaginationOutcome, PaginationQuery, PaginationState};
pub use labels::{DISCOVERY_PAGE_SIZE, LabelDiscovery, RemainingLabels};
pub use plan::{LabelCatalog, PlanDiagnostic, WatchPlan, WatchedRepository};

/// Default wait after a transient failure.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

/// Default number of items per remaining-labels request.
pub const DEFAULT_LABEL_BATCH_SIZE: usize = 20;

/// Tuning for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    /// Initial page size of every issue and pull request stream.
    pub page_size: PageSize,
    /// Labels read per item, and per page when completing them.
    pub label_page_size: PageSize,
    /// Items per remaining-labels request.
    pub label_batch_size: usize,
    /// Wait after a transient failure.
    pub backoff: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            page_size: PageSize::new(10),
            label_page_size: PageSize::new(10),
            label_batch_size: DEFAULT_LABEL_BATCH_SIZE,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Items found by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    /// Records per repository in configured order.
    pub repositories: Vec<RepositoryIssues>,
    /// False when pagination stopped before every stream was read.
    pub complete: bool,
    /// Label problems found while planning.
    pub diagnostics: Vec<PlanDiagnostic>,
    /// Last budget GitHub reported.
    pub budget: Option<RateLimitBudget>,
}

impl FetchReport {
    /// Number of records across repositories.
    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.repositories
            .iter()
            .map(|repository| repository.issues.len())
            .sum()
    }
}

/// Finds issues and pull requests carrying watched labels.
pub struct LabelWatcher<'g, G: GraphQlGateway + ?Sized> {
    gateway: &'g G,
    repositories: Vec<WatchedRepository>,
    settings: WatchSettings,
}

impl<'g, G: GraphQlGateway + ?Sized> LabelWatcher<'g, G> {
    /// Creates a watcher over `repositories`.
    #[must_use]
    pub const fn new(gateway: &'g G, repositories: Vec<WatchedRepository>, settings: WatchSettings) -> Self {
        Self {
            gateway,
            repositories,
            settings,
        }
    }

    /// Watched repositories.
    #[must_use]
    pub fn repositories(&self) -> &[WatchedRepository] {
        &self.repositories
    }

    /// Fetches every item updated after `since`, or all items when `since`
    /// is `None`.
    ///
    /// Returns `None` when nothing could be fetched: the label discovery or
    /// the cost probe failed, or the budget was exhausted before the first
    /// page. Failures later in the run yield the items read so far.
    pub async fn recent_issues_with_label(&self, since: Option<DateTime<Utc>>) -> Option<FetchReport> {
        let engine = PaginationEngine::new(self.gateway, self.settings.backoff);
        let (catalog, discovery_complete) = self.discover_labels(&engine).await?;
        let plan = WatchPlan::build(&self.repositories, &catalog);

        let document = compose::issues_document(&plan, self.settings.label_page_size.get());
        let query = PaginationQuery::new(&document, since);
        let mut aggregator = Aggregator::new(&plan, since);
        let outcome = engine
            .run(
                &query,
                PaginationState::new(plan.cursor_table(), self.settings.page_size),
                &mut aggregator,
            )
            .await;
        if !outcome.produced_results() {
            return None;
        }

        self.complete_labels(&engine, &mut aggregator).await;

        let report = FetchReport {
            repositories: aggregator.into_results(),
            complete: discovery_complete && outcome.is_complete(),
            diagnostics: plan.diagnostics.clone(),
            budget: outcome.budget,
        };
        tracing::info!(
            repositories = report.repositories.len(),
            issues = report.issue_count(),
            complete = report.complete,
            pages = outcome.pages,
            page_size = outcome.page_size.get(),
            "fetch finished"
        );
        Some(report)
    }

    /// Reads the label catalog and whether every label page was read.
    ///
    /// Returns `None` when no label page could be read.
    async fn discover_labels(&self, engine: &PaginationEngine<'g, G>) -> Option<(LabelCatalog, bool)> {
        let mut discovery = LabelDiscovery::new(&self.repositories);
        if discovery.is_empty() {
            return Some((LabelCatalog::new(), true));
        }
        let query = PaginationQuery::new(&discovery.document(), None);
        let state = PaginationState::new(discovery.cursor_table(), PageSize::new(DISCOVERY_PAGE_SIZE));
        let outcome = engine.run(&query, state, &mut discovery).await;
        let complete = outcome.is_complete();
        if !outcome.produced_results() || (outcome.pages == 0 && !complete) {
            tracing::error!(completion = ?outcome.completion, "label discovery produced no results");
            return None;
        }
        if !complete {
            tracing::warn!(
                completion = ?outcome.completion,
                "label discovery stopped early; unread labels will be reported missing"
            );
        }
        Some((discovery.into_catalog(), complete))
    }

    async fn complete_labels(&self, engine: &PaginationEngine<'g, G>, aggregator: &mut Aggregator<'_>) {
        let pending = aggregator.pending_labels();
        if pending.is_empty() {
            return;
        }
        tracing::debug!(items = pending.len(), "reading remaining item labels");
        for batch in pending.chunks(self.settings.label_batch_size.max(1)) {
            let mut remaining = RemainingLabels::new(aggregator, batch);
            if remaining.is_empty() {
                continue;
            }
            let query = PaginationQuery::new(&remaining.document(), None);
            let state = PaginationState::new(remaining.cursor_table(), self.settings.label_page_size);
            let outcome = engine.run(&query, state, &mut remaining).await;
            if !outcome.is_complete() {
                tracing::warn!(
                    completion = ?outcome.completion,
                    "remaining labels could not be read; keeping the labels already fetched"
                );
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
