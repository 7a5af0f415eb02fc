//! Watcher configuration loaded from CLI, environment, and files.
//!
//! # Precedence
//!
//! Configuration values are loaded with the following precedence (lowest to
//! highest):
//!
//! 1. **Defaults** – Built-in defaults
//! 2. **Configuration file** – `.label-watcher.toml` in the current
//!    directory, home directory, or XDG config directory
//! 3. **Environment variables** – `LABEL_WATCHER_*`, plus `GITHUB_TOKEN` as
//!    a token fallback
//! 4. **Command-line arguments**
//!
//! # Configuration File
//!
//! ```toml
//! token = "ghp_example"
//! repos = ["octo/widgets:bug;help wanted", "octo/gadgets:P1"]
//! watch_pinned = ["octo/widgets"]
//! watch_pull_requests = ["octo/gadgets"]
//! state_path = "/var/lib/label-watcher/state.json"
//! outbox_dir = "/var/spool/label-watcher"
//! ```

use std::env;
use std::time::Duration;

use chrono::TimeDelta;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

use crate::github::error::WatchError;
use crate::github::locator::{PersonalAccessToken, RepositoryLocator};
use crate::github::pagination::PageSize;
use crate::service::RunMode;
use crate::state::ReconcilePolicy;
use crate::watch::stream::RepositoryKey;
use crate::watch::{DEFAULT_LABEL_BATCH_SIZE, WatchSettings, WatchedRepository};

const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_STATE_PATH: &str = "label-watcher-state.json";
const DEFAULT_PAGE_SIZE: u32 = 10;
const DEFAULT_OVERLAP_MINUTES: i64 = 60;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_BACKOFF_SECONDS: u64 = 10;

/// Watcher configuration supporting CLI, environment, and file sources.
///
/// # Example
///
/// ```no_run
/// use label_watcher::WatcherConfig;
/// use ortho_config::OrthoConfig;
///
/// let config = WatcherConfig::load().expect("failed to load configuration");
/// let repositories = config.watched_repositories().expect("valid repositories");
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(
    prefix = "LABEL_WATCHER",
    discovery(
        dotfile_name = ".label-watcher.toml",
        config_file_name = "label-watcher.toml",
        app_name = "label-watcher"
    )
)]
pub struct WatcherConfig {
    /// Personal access token for the GitHub API.
    ///
    /// Falls back to `GITHUB_TOKEN` when unset.
    #[ortho_config(cli_short = 't')]
    pub token: Option<String>,

    /// REST API base URL; the GraphQL endpoint is derived from it.
    #[ortho_config()]
    pub api_url: String,

    /// Watched repositories, written `owner/name:label1;label2`.
    #[ortho_config(cli_short = 'r')]
    pub repos: Vec<String>,

    /// Repositories (`owner/name`) whose pinned issues are watched.
    #[ortho_config()]
    pub watch_pinned: Vec<String>,

    /// Repositories (`owner/name`) whose pull requests are watched too.
    #[ortho_config()]
    pub watch_pull_requests: Vec<String>,

    /// Initial page size of each issue and pull request stream.
    #[ortho_config()]
    pub page_size: u32,

    /// Labels read per item.
    #[ortho_config()]
    pub label_page_size: u32,

    /// Items per remaining-labels request.
    #[ortho_config()]
    pub label_batch_size: usize,

    /// JSON file holding the seen-set and the last run time.
    #[ortho_config()]
    pub state_path: String,

    /// Directory receiving digest files. Digests are logged when unset.
    #[ortho_config()]
    pub outbox_dir: Option<String>,

    /// Fetch every matching item instead of those updated since the last
    /// run.
    #[ortho_config()]
    pub all: bool,

    /// Minutes subtracted from the last run time in incremental runs.
    #[ortho_config()]
    pub overlap_minutes: i64,

    /// List already notified items in the digest, marked as viewed.
    #[ortho_config()]
    pub include_already_viewed: bool,

    /// Per-request timeout in seconds.
    #[ortho_config()]
    pub request_timeout_seconds: u64,

    /// Wait after a gateway timeout before retrying with smaller pages.
    #[ortho_config()]
    pub backoff_seconds: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_API_URL.to_owned(),
            repos: Vec::new(),
            watch_pinned: Vec::new(),
            watch_pull_requests: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            label_page_size: DEFAULT_PAGE_SIZE,
            label_batch_size: DEFAULT_LABEL_BATCH_SIZE,
            state_path: DEFAULT_STATE_PATH.to_owned(),
            outbox_dir: None,
            all: false,
            overlap_minutes: DEFAULT_OVERLAP_MINUTES,
            include_already_viewed: false,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            backoff_seconds: DEFAULT_BACKOFF_SECONDS,
        }
    }
}

impl WatcherConfig {
    /// Resolves the token from configuration or the `GITHUB_TOKEN`
    /// environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::MissingToken`] when no source provides a
    /// non-blank value.
    pub fn resolve_token(&self) -> Result<PersonalAccessToken, WatchError> {
        let raw = self
            .token
            .clone()
            .or_else(|| env::var("GITHUB_TOKEN").ok())
            .ok_or(WatchError::MissingToken)?;
        PersonalAccessToken::new(raw)
    }

    /// Parses the repository entries and applies the pinned and pull
    /// request lists.
    ///
    /// Repositories are de-duplicated case-insensitively; labels of a
    /// repeated entry are merged into the first one. A repository listed
    /// only in `watch_pinned` is watched for pinned issues alone.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Configuration`] for a malformed entry, for a
    /// `watch_pull_requests` entry without configured labels, or when no
    /// repository is configured at all.
    pub fn watched_repositories(&self) -> Result<Vec<WatchedRepository>, WatchError> {
        let mut entries: Vec<RepositoryEntry> = Vec::new();
        for raw in &self.repos {
            let parsed = RepositoryEntry::parse(raw)?;
            match entries.iter_mut().find(|entry| entry.key == parsed.key) {
                Some(existing) => existing.labels.extend(parsed.labels),
                None => entries.push(parsed),
            }
        }

        for raw in &self.watch_pinned {
            let locator = RepositoryLocator::parse(raw)?;
            let key = RepositoryKey::new(&locator.full_name());
            match entries.iter_mut().find(|entry| entry.key == key) {
                Some(existing) => existing.pinned = true,
                None => entries.push(RepositoryEntry {
                    locator,
                    key,
                    labels: Vec::new(),
                    pinned: true,
                    pull_requests: false,
                }),
            }
        }

        for raw in &self.watch_pull_requests {
            let locator = RepositoryLocator::parse(raw)?;
            let key = RepositoryKey::new(&locator.full_name());
            let entry = entries
                .iter_mut()
                .find(|entry| entry.key == key && !entry.labels.is_empty())
                .ok_or_else(|| WatchError::Configuration {
                    message: format!("pull requests of `{raw}` are watched but it has no labels configured"),
                })?;
            entry.pull_requests = true;
        }

        if entries.is_empty() {
            return Err(WatchError::Configuration {
                message: "no repositories configured (use --repos owner/name:label)".to_owned(),
            });
        }

        Ok(entries
            .into_iter()
            .map(|entry| {
                WatchedRepository::new(entry.locator, entry.labels)
                    .with_pinned(entry.pinned)
                    .with_pull_requests(entry.pull_requests)
            })
            .collect())
    }

    /// Paging and retry settings, with page sizes clamped to the supported
    /// range.
    #[must_use]
    pub fn watch_settings(&self) -> WatchSettings {
        WatchSettings {
            page_size: PageSize::new(self.page_size),
            label_page_size: PageSize::new(self.label_page_size),
            label_batch_size: self.label_batch_size.max(1),
            backoff: Duration::from_secs(self.backoff_seconds),
        }
    }

    /// Run mode selected by `all` and `overlap_minutes`.
    #[must_use]
    pub fn run_mode(&self) -> RunMode {
        if self.all {
            RunMode::All
        } else {
            RunMode::Recent {
                overlap: TimeDelta::try_minutes(self.overlap_minutes.max(0)).unwrap_or_default(),
            }
        }
    }

    /// Digest policy for already notified items.
    #[must_use]
    pub const fn reconcile_policy(&self) -> ReconcilePolicy {
        ReconcilePolicy {
            include_already_viewed: self.include_already_viewed,
        }
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Logs what the run is going to watch.
    pub fn print_configuration(&self, repositories: &[WatchedRepository]) {
        tracing::info!(
            repositories = repositories.len(),
            mode = %self.run_mode(),
            state_path = %self.state_path,
            outbox = ?self.outbox_dir,
            "configuration loaded"
        );
        for repository in repositories {
            tracing::info!(
                repository = %repository.full_name(),
                labels = ?repository.labels(),
                pinned = repository.watch_pinned(),
                pull_requests = repository.watch_pull_requests(),
                "watching"
            );
        }
    }
}

struct RepositoryEntry {
    locator: RepositoryLocator,
    key: RepositoryKey,
    labels: Vec<String>,
    pinned: bool,
    pull_requests: bool,
}

impl RepositoryEntry {
    fn parse(raw: &str) -> Result<Self, WatchError> {
        let (repository, label_list) = raw.split_once(':').unwrap_or((raw, ""));
        let locator = RepositoryLocator::parse(repository)?;
        let labels = label_list
            .split(';')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(str::to_owned)
            .collect();
        Ok(Self {
            key: RepositoryKey::new(&locator.full_name()),
            locator,
            labels,
            pinned: false,
            pull_requests: false,
        })
    }
}
