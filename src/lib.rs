//! Label watcher library crate.
//!
//! Watches GitHub repositories for issues and pull requests carrying chosen
//! labels, plus pinned issues. Every watched label of every repository is
//! paged through one batched GraphQL query, under GitHub's cost budget and
//! with page-size degradation on gateway timeouts. Items are recorded in a
//! persisted seen-set so each one is notified at most once.

pub mod config;
pub mod files;
pub mod github;
pub mod notify;
pub mod service;
pub mod state;
pub mod telemetry;
pub mod watch;

pub use config::WatcherConfig;
pub use github::{GraphQlGateway, PersonalAccessToken, ReqwestGraphQlGateway, WatchError};
pub use notify::{LogNotifier, Notification, Notifier, OutboxNotifier};
pub use service::{RunMode, RunSummary, WatchService};
pub use state::{FileStateStore, PersistedState, StateStore};
pub use watch::{FetchReport, IssueKind, IssueRecord, LabelWatcher, WatchSettings, WatchedRepository};
