//! Unit tests for run orchestration.

use std::time::Duration;

use chrono::TimeZone;
use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;
use crate::github::MockGraphQlGateway;
use crate::github::graphql::GraphQlResponse;
use crate::github::locator::RepositoryLocator;
use crate::notify::MockNotifier;
use crate::telemetry::tests::RecordingSink;
use crate::watch::{WatchSettings, WatchedRepository};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid time")
}

fn pinned(number: u64) -> Value {
    json!({ "issue": {
        "typeName": "Issue",
        "number": number,
        "issueState": "OPEN",
        "title": format!("Pinned {number}"),
        "updatedAt": "2025-06-01T11:00:00Z",
        "url": format!("https://github.com/octo/widgets/issues/{number}"),
        "labels": { "nodes": [], "pageInfo": { "endCursor": null, "hasNextPage": false } }
    }})
}

fn response(nodes: &[Value], has_next_page: bool) -> GraphQlResponse {
    GraphQlResponse::with_data(json!({
        "rateLimit": { "cost": 1, "remaining": 4000, "limit": 5000, "used": 1000, "nodeCount": 10 },
        "r0_octo_widgets": { "pinned": {
            "nodes": nodes,
            "pageInfo": { "endCursor": "c1", "hasNextPage": has_next_page }
        }}
    }))
}

/// Gateway answering the probe and every data request with `nodes`.
fn gateway_returning(nodes: Vec<Value>) -> MockGraphQlGateway {
    let mut gateway = MockGraphQlGateway::new();
    gateway
        .expect_execute()
        .returning(move |_| Ok(response(&nodes, false)));
    gateway
}

#[fixture]
fn repositories() -> Vec<WatchedRepository> {
    vec![
        WatchedRepository::new(
            RepositoryLocator::parse("octo/widgets").expect("valid repository"),
            Vec::<String>::new(),
        )
        .with_pinned(true),
    ]
}

fn settings() -> WatchSettings {
    WatchSettings {
        backoff: Duration::ZERO,
        ..WatchSettings::default()
    }
}

#[rstest]
#[case(RunMode::All, None, None)]
#[case(RunMode::Recent { overlap: DEFAULT_OVERLAP }, None, Some(now() - FIRST_RUN_WINDOW))]
#[case(
    RunMode::Recent { overlap: TimeDelta::minutes(30) },
    Some(now() - TimeDelta::hours(2)),
    Some(now() - TimeDelta::minutes(150))
)]
fn run_modes_choose_the_recency_bound(
    #[case] mode: RunMode,
    #[case] last_run_time: Option<DateTime<Utc>>,
    #[case] expected: Option<DateTime<Utc>>,
) {
    assert_eq!(mode.since(last_run_time, now()), expected);
}

#[rstest]
#[tokio::test]
async fn new_items_are_notified_and_recorded(repositories: Vec<WatchedRepository>) {
    let gateway = gateway_returning(vec![pinned(3), pinned(4)]);
    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .withf(|notification, _| notification.subject == "Label watcher - 2 issue(s)")
        .times(1)
        .returning(|_, _| Ok(()));
    let telemetry = RecordingSink::default();
    let service = WatchService::new(
        LabelWatcher::new(&gateway, repositories, settings()),
        &notifier,
        &telemetry,
        ReconcilePolicy::default(),
    );
    let mut state = PersistedState::new();

    let summary = service
        .find_and_notify(&mut state, RunMode::All, now())
        .await
        .expect("run should succeed");

    assert!(summary.notified);
    assert_eq!((summary.fetched_items, summary.new_items), (2, 2));
    assert!(state.has_seen("octo/widgets", "3"));
    assert!(state.has_seen("octo/widgets", "4"));
    assert_eq!(state.last_run_time, Some(now()));
    assert_eq!(
        telemetry.take(),
        vec![TelemetryEvent::RunCompleted {
            mode: "all".to_owned(),
            repositories: 1,
            fetched_items: 2,
            new_items: 2,
            complete: true,
            notified: true,
        }]
    );
}

#[rstest]
#[tokio::test]
async fn seen_items_are_not_notified_again(repositories: Vec<WatchedRepository>) {
    let gateway = gateway_returning(vec![pinned(3)]);
    let mut notifier = MockNotifier::new();
    notifier.expect_notify().never();
    let telemetry = RecordingSink::default();
    let service = WatchService::new(
        LabelWatcher::new(&gateway, repositories, settings()),
        &notifier,
        &telemetry,
        ReconcilePolicy::default(),
    );
    let mut state = PersistedState::new();
    state.mark_seen("octo/widgets", "3");

    let summary = service
        .find_and_notify(&mut state, RunMode::Recent { overlap: DEFAULT_OVERLAP }, now())
        .await
        .expect("run should succeed");

    assert!(!summary.notified);
    assert_eq!(summary.new_items, 0);
    assert_eq!(summary.since, Some(now() - FIRST_RUN_WINDOW));
    assert_eq!(state.seen("octo/widgets").map(|seen| seen.numbers.len()), Some(1));
}

#[rstest]
#[tokio::test]
async fn failed_delivery_leaves_state_unchanged(repositories: Vec<WatchedRepository>) {
    let gateway = gateway_returning(vec![pinned(3)]);
    let mut notifier = MockNotifier::new();
    notifier.expect_notify().times(1).returning(|_, _| {
        Err(WatchError::Io {
            message: "outbox is read-only".to_owned(),
        })
    });
    let telemetry = RecordingSink::default();
    let service = WatchService::new(
        LabelWatcher::new(&gateway, repositories, settings()),
        &notifier,
        &telemetry,
        ReconcilePolicy::default(),
    );
    let mut state = PersistedState::new();

    let result = service.find_and_notify(&mut state, RunMode::All, now()).await;

    assert!(matches!(result, Err(WatchError::Io { .. })));
    assert_eq!(state, PersistedState::new());
}

#[rstest]
#[tokio::test]
async fn runs_without_results_keep_the_last_run_time(repositories: Vec<WatchedRepository>) {
    let mut gateway = MockGraphQlGateway::new();
    gateway.expect_execute().times(1).returning(|_| {
        Err(WatchError::Authentication {
            message: "Bad credentials".to_owned(),
        })
    });
    let notifier = MockNotifier::new();
    let telemetry = RecordingSink::default();
    let service = WatchService::new(
        LabelWatcher::new(&gateway, repositories, settings()),
        &notifier,
        &telemetry,
        ReconcilePolicy::default(),
    );
    let earlier = now() - TimeDelta::hours(6);
    let mut state = PersistedState::new();
    state.last_run_time = Some(earlier);

    let summary = service
        .find_and_notify(&mut state, RunMode::Recent { overlap: DEFAULT_OVERLAP }, now())
        .await
        .expect("a failed fetch is not a run error");

    assert!(!summary.produced_results);
    assert_eq!(state.last_run_time, Some(earlier));
    assert_eq!(telemetry.take().len(), 1);
}

#[rstest]
#[tokio::test]
async fn failed_label_discovery_keeps_the_last_run_time() {
    let mut gateway = MockGraphQlGateway::new();
    gateway.expect_execute().times(2).returning(|request| {
        if request.is_dry_run() {
            return Ok(response(&[], false));
        }
        Err(WatchError::Api {
            message: "something went wrong".to_owned(),
        })
    });
    let mut notifier = MockNotifier::new();
    notifier.expect_notify().never();
    let telemetry = RecordingSink::default();
    let labelled = WatchedRepository::new(
        RepositoryLocator::parse("octo/widgets").expect("valid repository"),
        ["bug"],
    );
    let service = WatchService::new(
        LabelWatcher::new(&gateway, vec![labelled], settings()),
        &notifier,
        &telemetry,
        ReconcilePolicy::default(),
    );
    let earlier = now() - TimeDelta::hours(6);
    let mut state = PersistedState::new();
    state.last_run_time = Some(earlier);

    let summary = service
        .find_and_notify(&mut state, RunMode::Recent { overlap: DEFAULT_OVERLAP }, now())
        .await
        .expect("a failed discovery is not a run error");

    assert!(!summary.produced_results);
    assert!(!summary.complete);
    assert_eq!(state.last_run_time, Some(earlier));
}
