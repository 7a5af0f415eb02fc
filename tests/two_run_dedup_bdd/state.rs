//! Scenario state and run helpers for the two-run dedup BDD tests.

use std::cell::RefCell;
use std::rc::Rc;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use label_watcher::telemetry::NoopTelemetrySink;
use label_watcher::{
    FileStateStore, LabelWatcher, OutboxNotifier, PersistedState, ReqwestGraphQlGateway, RunMode,
    RunSummary, StateStore, WatchError, WatchService, WatcherConfig,
};
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use wiremock::MockServer;

/// Shared runtime wrapper that can be stored in an `rstest-bdd` Slot.
#[derive(Clone)]
pub(crate) struct SharedRuntime(Rc<RefCell<Runtime>>);

impl SharedRuntime {
    fn new(runtime: Runtime) -> Self {
        Self(Rc::new(RefCell::new(runtime)))
    }

    pub(crate) fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.0.borrow().block_on(future)
    }
}

#[derive(ScenarioState, Default)]
pub(crate) struct WatchState {
    pub(crate) runtime: Slot<SharedRuntime>,
    pub(crate) server: Slot<MockServer>,
    pub(crate) workspace: Slot<TempDir>,
    pub(crate) started_at: Slot<DateTime<Utc>>,
    pub(crate) summary: Slot<RunSummary>,
}

/// Ensures the runtime, the mock server, and the scratch directory exist.
pub(crate) fn ensure_runtime_and_server(watch_state: &WatchState) -> SharedRuntime {
    if watch_state.runtime.with_ref(|_| ()).is_none() {
        let runtime = Runtime::new()
            .unwrap_or_else(|error| panic!("failed to create Tokio runtime: {error}"));
        watch_state.runtime.set(SharedRuntime::new(runtime));
    }

    let shared_runtime = watch_state
        .runtime
        .get()
        .unwrap_or_else(|| panic!("runtime not initialised after set"));

    if watch_state.server.with_ref(|_| ()).is_none() {
        watch_state
            .server
            .set(shared_runtime.block_on(MockServer::start()));
    }

    if watch_state.workspace.with_ref(|_| ()).is_none() {
        let workspace =
            TempDir::new().unwrap_or_else(|error| panic!("failed to create workspace: {error}"));
        watch_state.workspace.set(workspace);
    }

    shared_runtime
}

fn workspace_path(watch_state: &WatchState) -> Utf8PathBuf {
    watch_state
        .workspace
        .with_ref(|workspace| Utf8PathBuf::from_path_buf(workspace.path().to_path_buf()))
        .unwrap_or_else(|| panic!("workspace not initialised"))
        .unwrap_or_else(|path| panic!("non UTF-8 workspace path: {}", path.display()))
}

fn watcher_config(watch_state: &WatchState, mode: RunMode) -> WatcherConfig {
    let workspace = workspace_path(watch_state);
    let api_url = watch_state
        .server
        .with_ref(MockServer::uri)
        .unwrap_or_else(|| panic!("mock server not initialised"));
    WatcherConfig {
        token: Some("ghp_test".to_owned()),
        api_url,
        repos: vec!["octo/alpha:bug".to_owned(), "octo/beta:bug;P1".to_owned()],
        watch_pull_requests: vec!["octo/beta".to_owned()],
        page_size: 100,
        backoff_seconds: 0,
        state_path: workspace.join("state.json").into_string(),
        outbox_dir: Some(workspace.join("outbox").into_string()),
        all: mode == RunMode::All,
        ..WatcherConfig::default()
    }
}

/// Runs the watcher once, the way the binary does, and returns the summary.
pub(crate) fn run_watch(
    watch_state: &WatchState,
    mode: RunMode,
    now: DateTime<Utc>,
) -> Result<RunSummary, WatchError> {
    let runtime = watch_state
        .runtime
        .get()
        .ok_or_else(|| WatchError::Api {
            message: "runtime not initialised".to_owned(),
        })?;
    let config = watcher_config(watch_state, mode);
    let repositories = config.watched_repositories()?;
    let token = config.resolve_token()?;
    let gateway =
        ReqwestGraphQlGateway::for_token(&token, &config.api_url, config.request_timeout())?;
    let notifier = OutboxNotifier::new(config.outbox_dir.clone().unwrap_or_default());
    let telemetry = NoopTelemetrySink;
    let service = WatchService::new(
        LabelWatcher::new(&gateway, repositories, config.watch_settings()),
        &notifier,
        &telemetry,
        config.reconcile_policy(),
    );
    let store = FileStateStore::new(config.state_path.as_str());

    runtime.block_on(async {
        let mut state = store.load()?;
        let summary = service
            .find_and_notify(&mut state, config.run_mode(), now)
            .await?;
        if summary.produced_results {
            store.save(&state)?;
        }
        Ok(summary)
    })
}

/// Loads the state the last run saved.
pub(crate) fn saved_state(watch_state: &WatchState) -> PersistedState {
    let path = workspace_path(watch_state).join("state.json");
    FileStateStore::new(path)
        .load()
        .unwrap_or_else(|error| panic!("state should load: {error}"))
}

/// Number of digests in the outbox.
pub(crate) fn outbox_files(watch_state: &WatchState) -> usize {
    let outbox = workspace_path(watch_state).join("outbox");
    std::fs::read_dir(&outbox).map_or(0, |entries| entries.filter_map(Result::ok).count())
}
