//! Multi-cursor pagination over one batched query.
//!
//! The engine is a small state machine. A dry-run probe learns the query's
//! cost, then data requests are sent while the budget admits them and any
//! stream reports more pages. Gateway timeouts shrink the shared page size
//! and retry after a backoff; every other failure ends the run with the
//! pages read so far.
//!
//! State is explicit: [`PaginationEngine::step`] takes a [`PaginationState`]
//! and returns the next one, so each transition can be exercised alone.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::github::error::WatchError;
use crate::github::gateway::GraphQlGateway;
use crate::github::graphql::{GraphQlRequest, rate_limit_of};
use crate::github::pagination::PageSize;
use crate::github::rate_limit::RateLimitBudget;

use super::compose::{DRY_RUN_VARIABLE, PAGE_SIZE_VARIABLE, SINCE_VARIABLE};
use super::query::QueryDocument;
use super::stream::{CursorTable, StreamPage};

/// Receives the data of every successful response.
pub trait PageSink {
    /// Reads the streams present in `data` and reports one page per stream
    /// found.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Decode`] when a stream's payload is malformed.
    fn absorb(&mut self, data: &Value) -> Result<Vec<StreamPage>, WatchError>;
}

/// Rendered query plus the run-wide variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationQuery {
    operation: String,
    text: String,
    since: Option<Value>,
}

impl PaginationQuery {
    /// Renders `document` once for the whole run.
    ///
    /// `since` is only sent when the document declares it.
    #[must_use]
    pub fn new(document: &QueryDocument, since: Option<DateTime<Utc>>) -> Self {
        let since_value = document.declares(SINCE_VARIABLE).then(|| {
            since.map_or(Value::Null, |bound| {
                Value::String(bound.to_rfc3339_opts(SecondsFormat::Secs, true))
            })
        });
        Self {
            operation: document.operation().to_owned(),
            text: document.to_string(),
            since: since_value,
        }
    }

    /// Query text sent with every request.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Operation name, used in logs.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Builds the request for the current state.
    #[must_use]
    pub fn request(&self, dry_run: bool, page_size: PageSize, cursors: &CursorTable) -> GraphQlRequest {
        let mut variables = Map::new();
        variables.insert(DRY_RUN_VARIABLE.to_owned(), Value::Bool(dry_run));
        variables.insert(PAGE_SIZE_VARIABLE.to_owned(), Value::from(page_size.get()));
        if let Some(since) = &self.since {
            variables.insert(SINCE_VARIABLE.to_owned(), since.clone());
        }
        cursors.write_variables(&mut variables);
        GraphQlRequest::new(self.text.clone(), variables)
    }
}

/// Why pagination stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Every stream was read to its end.
    Completed,
    /// The remaining budget could not cover the next request.
    BudgetExhausted,
    /// The dry-run probe failed, so no data request was sent.
    ProbeFailed(WatchError),
    /// A data request failed, the page size floor was reached, or
    /// pagination stalled.
    Aborted(WatchError),
}

/// Position of the engine in its state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// The cost of the query is not known yet.
    Probing,
    /// Data requests are being sent.
    Fetching,
    /// A transient failure was seen; the next step waits out the backoff.
    Degrading {
        /// The failure that caused the degradation.
        failure: WatchError,
    },
    /// No further request will be sent.
    Done(Completion),
}

/// Everything that changes between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationState {
    /// Current phase.
    pub phase: Phase,
    /// Budget from the last response, `None` before the probe.
    pub budget: Option<RateLimitBudget>,
    /// Page size for the next request.
    pub page_size: PageSize,
    /// Cursor state of every stream.
    pub cursors: CursorTable,
    /// Successful data requests so far.
    pub pages: u32,
}

impl PaginationState {
    /// Initial state, probing unless there is nothing to fetch.
    #[must_use]
    pub fn new(cursors: CursorTable, page_size: PageSize) -> Self {
        let phase = if cursors.has_open() {
            Phase::Probing
        } else {
            Phase::Done(Completion::Completed)
        };
        Self {
            phase,
            budget: None,
            page_size,
            cursors,
            pages: 0,
        }
    }

    /// Returns true once no further request will be sent.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done(_))
    }

    fn finish(mut self, completion: Completion) -> Self {
        self.phase = Phase::Done(completion);
        self
    }
}

/// Final state of a pagination run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationOutcome {
    /// Why pagination stopped.
    pub completion: Completion,
    /// Successful data requests.
    pub pages: u32,
    /// Last budget observed.
    pub budget: Option<RateLimitBudget>,
    /// Page size in effect at the end.
    pub page_size: PageSize,
}

impl PaginationOutcome {
    fn from_state(state: PaginationState) -> Self {
        let completion = match state.phase {
            Phase::Done(completion) => completion,
            Phase::Probing | Phase::Fetching | Phase::Degrading { .. } => Completion::Completed,
        };
        Self {
            completion,
            pages: state.pages,
            budget: state.budget,
            page_size: state.page_size,
        }
    }

    /// Returns false when the run has nothing to report: the probe failed,
    /// or the budget ran out before any data was read.
    #[must_use]
    pub const fn produced_results(&self) -> bool {
        match self.completion {
            Completion::ProbeFailed(_) => false,
            Completion::BudgetExhausted => self.pages > 0,
            Completion::Completed | Completion::Aborted(_) => true,
        }
    }

    /// Returns true when every stream was read to its end.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.completion, Completion::Completed)
    }
}

/// Drives a batched query through a [`GraphQlGateway`].
pub struct PaginationEngine<'g, G: GraphQlGateway + ?Sized> {
    gateway: &'g G,
    backoff: Duration,
}

impl<'g, G: GraphQlGateway + ?Sized> PaginationEngine<'g, G> {
    /// Creates an engine waiting `backoff` after each transient failure.
    #[must_use]
    pub const fn new(gateway: &'g G, backoff: Duration) -> Self {
        Self { gateway, backoff }
    }

    /// Steps until done and reports the outcome.
    pub async fn run<S: PageSink + Send>(
        &self,
        query: &PaginationQuery,
        initial: PaginationState,
        sink: &mut S,
    ) -> PaginationOutcome {
        tracing::debug!(operation = query.operation(), query = query.text(), "composed query");
        let mut state = initial;
        while !state.is_done() {
            state = self.step(query, state, sink).await;
        }
        PaginationOutcome::from_state(state)
    }

    /// Performs one transition.
    pub async fn step<S: PageSink + Send>(
        &self,
        query: &PaginationQuery,
        mut state: PaginationState,
        sink: &mut S,
    ) -> PaginationState {
        match std::mem::replace(&mut state.phase, Phase::Fetching) {
            Phase::Probing => self.probe(query, state).await,
            Phase::Fetching => self.fetch(query, state, sink).await,
            Phase::Degrading { failure } => {
                tracing::debug!(
                    operation = query.operation(),
                    error = %failure,
                    backoff = ?self.backoff,
                    "waiting before retrying with a smaller page size"
                );
                tokio::time::sleep(self.backoff).await;
                state
            }
            done @ Phase::Done(_) => {
                state.phase = done;
                state
            }
        }
    }

    async fn probe(&self, query: &PaginationQuery, state: PaginationState) -> PaginationState {
        let request = query.request(true, state.page_size, &state.cursors);
        let probed = match self.gateway.execute(&request).await {
            Ok(response) => response
                .into_data()
                .and_then(|data| rate_limit_of(&data)),
            Err(error) => Err(error),
        };
        match probed {
            Ok(budget) => {
                log_budget(query, &budget);
                PaginationState {
                    budget: Some(budget),
                    ..state
                }
            }
            Err(error) => {
                tracing::error!(operation = query.operation(), error = %error, "cost probe failed");
                state.finish(Completion::ProbeFailed(error))
            }
        }
    }

    async fn fetch<S: PageSink + Send>(
        &self,
        query: &PaginationQuery,
        mut state: PaginationState,
        sink: &mut S,
    ) -> PaginationState {
        if !state.cursors.has_open() {
            return state.finish(Completion::Completed);
        }
        if let Some(budget) = &state.budget {
            if !budget.can_proceed() {
                tracing::warn!(
                    operation = query.operation(),
                    cost = budget.cost,
                    remaining = budget.remaining,
                    reset_at = ?budget.reset_at,
                    "rate limit reached; stopping with the pages read so far"
                );
                return state.finish(Completion::BudgetExhausted);
            }
        }

        let request = query.request(false, state.page_size, &state.cursors);
        let variables = Value::Object(request.variables.clone());
        tracing::debug!(
            operation = query.operation(),
            %variables,
            "sending request"
        );
        let response = match self.gateway.execute(&request).await {
            Ok(response) => response,
            Err(error) if error.is_transient() => return degrade(query, state, error),
            Err(error) => {
                tracing::error!(operation = query.operation(), error = %error, "request failed");
                return state.finish(Completion::Aborted(error));
            }
        };

        let data = match response.into_data() {
            Ok(data) => data,
            Err(error) => {
                tracing::error!(
                    operation = query.operation(),
                    error = %error,
                    details = ?error,
                    "GitHub reported query errors"
                );
                return state.finish(Completion::Aborted(error));
            }
        };

        match rate_limit_of(&data) {
            Ok(budget) => {
                log_budget(query, &budget);
                state.budget = Some(budget);
            }
            Err(error) => return state.finish(Completion::Aborted(error)),
        }

        let pages = match sink.absorb(&data) {
            Ok(pages) => pages,
            Err(error) => {
                tracing::error!(operation = query.operation(), error = %error, "response could not be read");
                return state.finish(Completion::Aborted(error));
            }
        };
        state.pages += 1;
        advance(query, state, &pages)
    }
}

fn log_budget(query: &PaginationQuery, budget: &RateLimitBudget) {
    tracing::debug!(
        operation = query.operation(),
        cost = budget.cost,
        remaining = budget.remaining,
        limit = budget.limit,
        used = budget.used,
        node_count = budget.node_count,
        reset_at = ?budget.reset_at,
        "rate limit"
    );
}

fn degrade(query: &PaginationQuery, mut state: PaginationState, failure: WatchError) -> PaginationState {
    match state.page_size.degrade() {
        Some(smaller) => {
            tracing::warn!(
                operation = query.operation(),
                error = %failure,
                page_size = smaller.get(),
                "request timed out; retrying with a smaller page size"
            );
            state.page_size = smaller;
            state.phase = Phase::Degrading { failure };
            state
        }
        None => {
            tracing::error!(
                operation = query.operation(),
                error = %failure,
                page_size = state.page_size.get(),
                "request timed out at the smallest page size; giving up"
            );
            state.finish(Completion::Aborted(failure))
        }
    }
}

fn advance(query: &PaginationQuery, mut state: PaginationState, pages: &[StreamPage]) -> PaginationState {
    let before = state.cursors.clone();
    for key in state.cursors.apply(pages) {
        tracing::warn!(
            operation = query.operation(),
            stream = ?key,
            "stream missing from the response; closing it"
        );
    }

    if !state.cursors.has_open() {
        return state.finish(Completion::Completed);
    }

    let new_items: usize = pages.iter().map(|page| page.new_items).sum();
    if new_items == 0 && state.cursors == before {
        let open_streams = state.cursors.open_streams();
        tracing::error!(
            operation = query.operation(),
            iterations = state.pages,
            open_streams,
            "pagination made no progress; aborting"
        );
        let error = WatchError::Stalled {
            iterations: state.pages,
            open_streams,
        };
        return state.finish(Completion::Aborted(error));
    }

    state.phase = Phase::Fetching;
    state
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
