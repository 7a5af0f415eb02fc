//! Support modules for the two-run dedup BDD tests.

pub(crate) mod harness;
pub(crate) mod state;

pub(crate) use harness::{ALPHA_ISSUES, BETA_ISSUES, BETA_PULL_REQUESTS, mount_github, mount_issue_timeouts};
pub(crate) use state::{WatchState, ensure_runtime_and_server, outbox_files, run_watch, saved_state};
