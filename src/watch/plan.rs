//! Watch plan: configured repositories expanded into pageable streams.
//!
//! Configured label names are resolved against each repository's real label
//! list before any stream is created. A label that only differs in case
//! resolves to the repository's spelling, and the stream filters on that
//! spelling. A label that does not exist is skipped with a diagnostic while
//! the repository's other streams are kept.

use std::collections::{BTreeSet, HashMap};

use crate::github::locator::RepositoryLocator;

use super::stream::{CursorTable, RepositoryKey, StreamBinding, StreamKey};

/// A repository and the labels watched on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedRepository {
    locator: RepositoryLocator,
    labels: Vec<String>,
    watch_pinned: bool,
    watch_pull_requests: bool,
}

impl WatchedRepository {
    /// Creates a repository watching `label_names` on issues only.
    ///
    /// Labels are de-duplicated case-insensitively, keeping the first
    /// spelling and the configured order.
    #[must_use]
    pub fn new<I, S>(locator: RepositoryLocator, label_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let labels = label_names
            .into_iter()
            .map(|label| label.as_ref().trim().to_owned())
            .filter(|label| !label.is_empty() && seen.insert(label.to_lowercase()))
            .collect();
        Self {
            locator,
            labels,
            watch_pinned: false,
            watch_pull_requests: false,
        }
    }

    /// Also watch the repository's pinned issues.
    #[must_use]
    pub const fn with_pinned(mut self, enabled: bool) -> Self {
        self.watch_pinned = enabled;
        self
    }

    /// Also watch pull requests carrying the labels.
    #[must_use]
    pub const fn with_pull_requests(mut self, enabled: bool) -> Self {
        self.watch_pull_requests = enabled;
        self
    }

    /// Repository owner and name.
    #[must_use]
    pub const fn locator(&self) -> &RepositoryLocator {
        &self.locator
    }

    /// `owner/name` as configured.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.locator.full_name()
    }

    /// Case-insensitive key used for routing and persisted state.
    #[must_use]
    pub fn key(&self) -> RepositoryKey {
        RepositoryKey::new(&self.full_name())
    }

    /// Configured labels in order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Whether pinned issues are watched.
    #[must_use]
    pub const fn watch_pinned(&self) -> bool {
        self.watch_pinned
    }

    /// Whether pull requests are watched.
    #[must_use]
    pub const fn watch_pull_requests(&self) -> bool {
        self.watch_pull_requests
    }
}

/// Replaces every character outside `[A-Za-z0-9_]` with `_`.
#[must_use]
pub fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || character == '_' {
                character
            } else {
                '_'
            }
        })
        .collect()
}

/// Response alias of the repository at `index` in the configured order.
///
/// The index prefix keeps aliases unique even when two repository names
/// sanitise to the same text, and guarantees a leading letter.
#[must_use]
pub fn repository_alias(index: usize, repository: &WatchedRepository) -> String {
    format!("r{index}_{}", sanitize_identifier(&repository.full_name()))
}

/// Real label names of each repository, as read by the discovery pre-flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelCatalog {
    labels: HashMap<RepositoryKey, Vec<String>>,
}

impl LabelCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records labels for a repository, appending to any already known.
    pub fn extend<I>(&mut self, repository: &RepositoryKey, labels: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.labels
            .entry(repository.clone())
            .or_default()
            .extend(labels);
    }

    /// Labels known for a repository.
    #[must_use]
    pub fn labels_for(&self, repository: &RepositoryKey) -> &[String] {
        self.labels.get(repository).map(Vec::as_slice).unwrap_or_default()
    }

    /// Resolves a configured label against a repository's labels.
    ///
    /// An exact match wins. Otherwise a case-insensitive match is used, and
    /// when several labels only differ in case the first one listed is
    /// picked.
    #[must_use]
    pub fn resolve(&self, repository: &RepositoryKey, configured: &str) -> LabelResolution {
        let known = self.labels_for(repository);
        if known.iter().any(|label| label == configured) {
            return LabelResolution::Exact(configured.to_owned());
        }
        let lowered = configured.to_lowercase();
        let mut candidates = known
            .iter()
            .filter(|label| label.to_lowercase() == lowered)
            .cloned();
        match candidates.next() {
            Some(resolved) => LabelResolution::CaseMismatch {
                resolved,
                others: candidates.collect(),
            },
            None => LabelResolution::Missing,
        }
    }
}

/// Outcome of resolving one configured label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelResolution {
    /// The label exists with the configured spelling.
    Exact(String),
    /// The label exists with a different case.
    CaseMismatch {
        /// Spelling used by the repository.
        resolved: String,
        /// Further labels that also matched case-insensitively.
        others: Vec<String>,
    },
    /// No label matched.
    Missing,
}

/// Per-repository configuration problem found while planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanDiagnostic {
    /// A configured label does not exist; its streams were skipped.
    MissingLabel {
        /// Repository full name.
        repository: String,
        /// Label as configured.
        label: String,
    },
    /// A configured label exists with a different case.
    CaseMismatch {
        /// Repository full name.
        repository: String,
        /// Label as configured.
        configured: String,
        /// Label the streams filter on.
        resolved: String,
    },
    /// Two configured labels resolved to the same repository label.
    DuplicateLabel {
        /// Repository full name.
        repository: String,
        /// Label both entries resolved to.
        label: String,
    },
}

/// Issue and pull request streams of one resolved label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelStreams {
    /// Label name as it exists in the repository.
    pub label: String,
    /// Issues carrying the label.
    pub issues: StreamBinding,
    /// Pull requests carrying the label, when watched.
    pub pull_requests: Option<StreamBinding>,
}

/// Streams of one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryPlan {
    /// The repository being watched.
    pub repository: WatchedRepository,
    /// Response alias of the repository selection.
    pub alias: String,
    /// Pinned issues stream, when watched.
    pub pinned: Option<StreamBinding>,
    /// One entry per resolved label.
    pub labels: Vec<LabelStreams>,
}

impl RepositoryPlan {
    /// Every stream of the repository, pinned first.
    pub fn bindings(&self) -> impl Iterator<Item = &StreamBinding> {
        self.pinned.iter().chain(self.labels.iter().flat_map(|streams| {
            std::iter::once(&streams.issues).chain(streams.pull_requests.as_ref())
        }))
    }

    /// Returns true when the repository contributes no stream.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pinned.is_none() && self.labels.is_empty()
    }
}

/// Every stream of one run, grouped by repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchPlan {
    /// Repositories in configured order, including those left without
    /// streams.
    pub repositories: Vec<RepositoryPlan>,
    /// Configuration problems found while resolving labels.
    pub diagnostics: Vec<PlanDiagnostic>,
}

impl WatchPlan {
    /// Expands repositories into streams, resolving labels via `catalog`.
    #[must_use]
    pub fn build(repositories: &[WatchedRepository], catalog: &LabelCatalog) -> Self {
        let mut diagnostics = Vec::new();
        let plans = repositories
            .iter()
            .enumerate()
            .map(|(index, repository)| plan_repository(index, repository, catalog, &mut diagnostics))
            .collect();
        Self {
            repositories: plans,
            diagnostics,
        }
    }

    /// Every stream in the plan.
    pub fn bindings(&self) -> impl Iterator<Item = &StreamBinding> {
        self.repositories.iter().flat_map(RepositoryPlan::bindings)
    }

    /// Fresh cursor state with every stream included from its first page.
    #[must_use]
    pub fn cursor_table(&self) -> CursorTable {
        let mut table = CursorTable::new();
        for binding in self.bindings() {
            table.register(binding, None);
        }
        table
    }

    /// Returns true when no repository contributes a stream.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.repositories.iter().all(RepositoryPlan::is_empty)
    }
}

fn plan_repository(
    index: usize,
    repository: &WatchedRepository,
    catalog: &LabelCatalog,
    diagnostics: &mut Vec<PlanDiagnostic>,
) -> RepositoryPlan {
    let key = repository.key();
    let full_name = repository.full_name();
    let alias = repository_alias(index, repository);

    let pinned = repository.watch_pinned().then(|| {
        StreamBinding::new(
            StreamKey::Pinned {
                repository: key.clone(),
            },
            &alias,
            "pinned",
        )
    });

    let mut resolved_labels = BTreeSet::new();
    let mut labels = Vec::new();
    for configured in repository.labels() {
        let label = match catalog.resolve(&key, configured) {
            LabelResolution::Exact(label) => label,
            LabelResolution::CaseMismatch { resolved, others } => {
                tracing::warn!(
                    repository = %full_name,
                    configured = %configured,
                    resolved = %resolved,
                    ambiguous = ?others,
                    "configured label differs in case from the repository label"
                );
                diagnostics.push(PlanDiagnostic::CaseMismatch {
                    repository: full_name.clone(),
                    configured: configured.clone(),
                    resolved: resolved.clone(),
                });
                resolved
            }
            LabelResolution::Missing => {
                tracing::error!(
                    repository = %full_name,
                    label = %configured,
                    "label does not exist in the repository; skipping it"
                );
                diagnostics.push(PlanDiagnostic::MissingLabel {
                    repository: full_name.clone(),
                    label: configured.clone(),
                });
                continue;
            }
        };

        if !resolved_labels.insert(label.clone()) {
            diagnostics.push(PlanDiagnostic::DuplicateLabel {
                repository: full_name.clone(),
                label,
            });
            continue;
        }

        let position = labels.len();
        let suffix = format!("{position}_{}", sanitize_identifier(&label));
        let issues = StreamBinding::new(
            StreamKey::Issues {
                repository: key.clone(),
                label: label.clone(),
            },
            &alias,
            format!("issues_{suffix}"),
        );
        let pull_requests = repository.watch_pull_requests().then(|| {
            StreamBinding::new(
                StreamKey::PullRequests {
                    repository: key.clone(),
                    label: label.clone(),
                },
                &alias,
                format!("pullRequests_{suffix}"),
            )
        });
        labels.push(LabelStreams {
            label,
            issues,
            pull_requests,
        });
    }

    RepositoryPlan {
        repository: repository.clone(),
        alias,
        pinned,
        labels,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rstest::{fixture, rstest};

    use super::{
        LabelCatalog, LabelResolution, PlanDiagnostic, WatchPlan, WatchedRepository,
        sanitize_identifier,
    };
    use crate::github::locator::RepositoryLocator;
    use crate::watch::stream::RepositoryKey;

    fn repository(name: &str, labels: &[&str]) -> WatchedRepository {
        WatchedRepository::new(
            RepositoryLocator::parse(name).expect("valid repository"),
            labels.iter().copied(),
        )
    }

    #[fixture]
    fn catalog() -> LabelCatalog {
        let mut catalog = LabelCatalog::new();
        catalog.extend(
            &RepositoryKey::new("octo/widgets"),
            ["Bug", "good first issue", "good:first-issue", "P1"].map(str::to_owned),
        );
        catalog
    }

    #[rstest]
    #[case::plain("bug", "bug")]
    #[case::spaces("good first issue", "good_first_issue")]
    #[case::punctuation("area/ui:α", "area_ui__")]
    fn sanitises_to_the_identifier_alphabet(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize_identifier(raw), expected);
    }

    #[rstest]
    fn resolves_labels_case_insensitively(catalog: LabelCatalog) {
        let key = RepositoryKey::new("Octo/Widgets");
        assert_eq!(
            catalog.resolve(&key, "bug"),
            LabelResolution::CaseMismatch {
                resolved: "Bug".to_owned(),
                others: Vec::new(),
            }
        );
        assert_eq!(catalog.resolve(&key, "P1"), LabelResolution::Exact("P1".to_owned()));
        assert_eq!(catalog.resolve(&key, "wontfix"), LabelResolution::Missing);
    }

    #[rstest]
    fn resolved_streams_filter_on_the_repository_spelling(catalog: LabelCatalog) {
        let plan = WatchPlan::build(&[repository("octo/widgets", &["bug"])], &catalog);

        let streams = plan
            .repositories
            .first()
            .and_then(|repository| repository.labels.first())
            .expect("one label stream");
        assert_eq!(streams.label, "Bug");
        assert_eq!(
            plan.diagnostics,
            vec![PlanDiagnostic::CaseMismatch {
                repository: "octo/widgets".to_owned(),
                configured: "bug".to_owned(),
                resolved: "Bug".to_owned(),
            }]
        );
    }

    #[rstest]
    fn missing_labels_are_skipped_without_dropping_others(catalog: LabelCatalog) {
        let plan = WatchPlan::build(&[repository("octo/widgets", &["wontfix", "P1"])], &catalog);

        let labels: Vec<_> = plan
            .repositories
            .iter()
            .flat_map(|repository| repository.labels.iter().map(|streams| streams.label.as_str()))
            .collect();
        assert_eq!(labels, vec!["P1"]);
        assert_eq!(
            plan.diagnostics,
            vec![PlanDiagnostic::MissingLabel {
                repository: "octo/widgets".to_owned(),
                label: "wontfix".to_owned(),
            }]
        );
    }

    #[rstest]
    fn colliding_sanitised_labels_get_distinct_streams(catalog: LabelCatalog) {
        let watched = repository("octo/widgets", &["good first issue", "good:first-issue"])
            .with_pull_requests(true)
            .with_pinned(true);
        let plan = WatchPlan::build(&[watched], &catalog);

        let bindings: Vec<_> = plan.bindings().collect();
        assert_eq!(bindings.len(), 5, "pinned plus two labels with issues and PRs");

        let aliases: BTreeSet<_> = bindings.iter().map(|binding| binding.alias.as_str()).collect();
        let variables: BTreeSet<_> = bindings
            .iter()
            .flat_map(|binding| [binding.after_variable.as_str(), binding.include_variable.as_str()])
            .collect();
        let keys: BTreeSet<_> = bindings.iter().map(|binding| &binding.key).collect();
        assert_eq!(aliases.len(), 5);
        assert_eq!(variables.len(), 10);
        assert_eq!(keys.len(), 5);
        assert_eq!(plan.cursor_table().open_streams(), 5);
    }

    #[rstest]
    fn repositories_with_colliding_names_get_distinct_aliases() {
        let plan = WatchPlan::build(
            &[repository("a-b/c", &[]), repository("a/b-c", &[])],
            &LabelCatalog::new(),
        );

        let aliases: Vec<_> = plan
            .repositories
            .iter()
            .map(|repository| repository.alias.as_str())
            .collect();
        assert_eq!(aliases, vec!["r0_a_b_c", "r1_a_b_c"]);
        assert!(plan.is_empty());
    }

    #[rstest]
    fn duplicate_configured_labels_collapse() {
        let watched = repository("octo/widgets", &["P1", "p1", " P1 "]);
        assert_eq!(watched.labels(), ["P1".to_owned()]);
    }
}
