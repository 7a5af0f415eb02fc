//! Normalises batched responses into one record per item and repository.
//!
//! Pinned issues arrive wrapped in an `issue` object, issues and pull requests
//! arrive as connection nodes tagged with their `__typename`. Each is turned
//! into an [`IssueRecord`]. Pull request streams cannot be filtered by
//! recency server-side, so the aggregator stops reading a pull request stream
//! at the first item updated at or before the recency bound and closes it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::github::error::WatchError;
use crate::github::pagination::PageInfo;

use super::engine::PageSink;
use super::plan::{RepositoryPlan, WatchPlan, WatchedRepository};
use super::stream::{StreamBinding, StreamPage};

/// What kind of item a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A plain issue.
    Issue,
    /// A pull request.
    PullRequest,
    /// An issue pinned to the repository.
    Pinned,
}

impl IssueKind {
    /// Short label used in digests.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Issue => "Issue",
            Self::PullRequest => "PR",
            Self::Pinned => "Pinned",
        }
    }

    fn from_type_name(type_name: Option<&str>) -> Self {
        match type_name {
            Some("PullRequest") => Self::PullRequest,
            _ => Self::Issue,
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One issue or pull request matched by a watch target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueRecord {
    /// Full name of the repository the item belongs to.
    pub repository: String,
    /// Item number, the dedup key within the repository.
    pub number: String,
    /// Item kind.
    pub kind: IssueKind,
    /// State reported by GitHub, such as `OPEN` or `MERGED`.
    pub status: String,
    /// Item title.
    pub title: String,
    /// Label names.
    pub labels: Vec<String>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Web URL of the item.
    pub url: String,
    /// Set once the item is found in the persisted seen-set.
    pub already_viewed: bool,
}

/// Records of one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryIssues {
    /// The watched repository.
    pub repository: WatchedRepository,
    /// Records in the order they were first seen.
    pub issues: Vec<IssueRecord>,
}

/// An item whose label connection reported further pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLabels {
    /// Index of the repository in the plan.
    pub repository_index: usize,
    /// Item number.
    pub number: String,
    /// Whether the item is a pull request.
    pub is_pull_request: bool,
    /// Cursor after the labels already read.
    pub after: String,
}

fn number_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => Ok(number.to_string()),
        Value::String(text) => Ok(text),
        other => Err(de::Error::custom(format!(
            "expected an item number, found {other}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<Option<T>>,
    #[serde(default)]
    page_info: PageInfo,
}

/// Label connection of an item or repository.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LabelConnection {
    #[serde(default)]
    pub(crate) nodes: Vec<Option<LabelNode>>,
    #[serde(default)]
    pub(crate) page_info: PageInfo,
}

impl LabelConnection {
    pub(crate) fn into_names(self) -> (Vec<String>, PageInfo) {
        let names = self.nodes.into_iter().flatten().map(|node| node.name).collect();
        (names, self.page_info)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LabelNode {
    pub(crate) name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemNode {
    #[serde(default)]
    type_name: Option<String>,
    #[serde(deserialize_with = "number_text")]
    number: String,
    #[serde(default)]
    issue_state: Option<String>,
    #[serde(default)]
    pull_request_state: Option<String>,
    #[serde(default)]
    title: String,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    labels: Option<LabelConnection>,
}

#[derive(Debug, Deserialize)]
struct PinnedNode {
    issue: Option<ItemNode>,
}

/// Reads a non-null child field.
pub(crate) fn present<'v>(parent: &'v Value, key: &str) -> Option<&'v Value> {
    parent.get(key).filter(|value| !value.is_null())
}

/// Decodes a stream payload, naming the stream on failure.
pub(crate) fn decode<T: DeserializeOwned>(value: &Value, alias: &str) -> Result<T, WatchError> {
    T::deserialize(value).map_err(|error| WatchError::Decode {
        message: format!("stream `{alias}` is malformed: {error}"),
    })
}

#[derive(Debug, Default)]
struct Collected {
    records: Vec<IssueRecord>,
    positions: HashMap<String, usize>,
    pending: BTreeMap<String, PendingLabels>,
}

impl Collected {
    /// Adds the item unless its number was already seen; returns true when
    /// it was new.
    fn accept(
        &mut self,
        repository_index: usize,
        repository: &str,
        node: ItemNode,
        kind: IssueKind,
    ) -> bool {
        if self.positions.contains_key(&node.number) {
            return false;
        }

        let (labels, label_page) = node.labels.unwrap_or_default().into_names();
        if label_page.has_next_page {
            if let Some(after) = label_page.end_cursor {
                self.pending.insert(
                    node.number.clone(),
                    PendingLabels {
                        repository_index,
                        number: node.number.clone(),
                        is_pull_request: kind == IssueKind::PullRequest,
                        after,
                    },
                );
            }
        }

        let status = node
            .issue_state
            .or(node.pull_request_state)
            .unwrap_or_default();
        self.positions.insert(node.number.clone(), self.records.len());
        self.records.push(IssueRecord {
            repository: repository.to_owned(),
            number: node.number,
            kind,
            status,
            title: node.title,
            labels,
            updated_at: node.updated_at,
            url: node.url,
            already_viewed: false,
        });
        true
    }
}

/// Collects records from every response of a watch plan.
#[derive(Debug)]
pub struct Aggregator<'p> {
    plan: &'p WatchPlan,
    since: Option<DateTime<Utc>>,
    collected: Vec<Collected>,
}

impl<'p> Aggregator<'p> {
    /// Creates an aggregator for `plan` with an optional recency bound.
    #[must_use]
    pub fn new(plan: &'p WatchPlan, since: Option<DateTime<Utc>>) -> Self {
        Self {
            plan,
            since,
            collected: plan.repositories.iter().map(|_| Collected::default()).collect(),
        }
    }

    /// The plan being aggregated.
    #[must_use]
    pub const fn plan(&self) -> &'p WatchPlan {
        self.plan
    }

    /// Items whose labels were cut off by the label page size.
    #[must_use]
    pub fn pending_labels(&self) -> Vec<PendingLabels> {
        self.collected
            .iter()
            .flat_map(|collected| collected.pending.values().cloned())
            .collect()
    }

    /// Appends labels read by a follow-up request.
    pub fn extend_labels(&mut self, repository_index: usize, number: &str, labels: Vec<String>) {
        let Some(collected) = self.collected.get_mut(repository_index) else {
            return;
        };
        let Some(record) = collected
            .positions
            .get(number)
            .copied()
            .and_then(|position| collected.records.get_mut(position))
        else {
            return;
        };
        record.labels.extend(labels);
    }

    /// Number of records collected so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collected.iter().map(|collected| collected.records.len()).sum()
    }

    /// Returns true when nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-repository records in plan order.
    #[must_use]
    pub fn into_results(self) -> Vec<RepositoryIssues> {
        self.plan
            .repositories
            .iter()
            .zip(self.collected)
            .map(|(plan, collected)| RepositoryIssues {
                repository: plan.repository.clone(),
                issues: collected.records,
            })
            .collect()
    }
}

fn read_items(
    repository_data: &Value,
    binding: &StreamBinding,
    kind_of: impl Fn(&ItemNode) -> IssueKind,
    mut accept: impl FnMut(ItemNode, IssueKind) -> bool,
) -> Result<Option<StreamPage>, WatchError> {
    let Some(payload) = present(repository_data, &binding.alias) else {
        return Ok(None);
    };
    let connection: Connection<ItemNode> = decode(payload, &binding.alias)?;
    let mut new_items = 0;
    for node in connection.nodes.into_iter().flatten() {
        let kind = kind_of(&node);
        if accept(node, kind) {
            new_items += 1;
        }
    }
    Ok(Some(StreamPage::new(
        binding.key.clone(),
        connection.page_info,
        new_items,
    )))
}

fn read_pull_requests(
    repository_data: &Value,
    binding: &StreamBinding,
    since: Option<DateTime<Utc>>,
    mut accept: impl FnMut(ItemNode, IssueKind) -> bool,
) -> Result<Option<StreamPage>, WatchError> {
    let Some(payload) = present(repository_data, &binding.alias) else {
        return Ok(None);
    };
    let connection: Connection<ItemNode> = decode(payload, &binding.alias)?;
    let mut page = StreamPage::new(binding.key.clone(), connection.page_info, 0);
    for node in connection.nodes.into_iter().flatten() {
        if since.is_some_and(|bound| node.updated_at <= bound) {
            page.cutoff_reached = true;
            break;
        }
        if accept(node, IssueKind::PullRequest) {
            page.new_items += 1;
        }
    }
    Ok(Some(page))
}

fn read_pinned(
    repository_data: &Value,
    binding: &StreamBinding,
    mut accept: impl FnMut(ItemNode, IssueKind) -> bool,
) -> Result<Option<StreamPage>, WatchError> {
    let Some(payload) = present(repository_data, &binding.alias) else {
        return Ok(None);
    };
    let connection: Connection<PinnedNode> = decode(payload, &binding.alias)?;
    let mut new_items = 0;
    for node in connection.nodes.into_iter().flatten().filter_map(|pinned| pinned.issue) {
        if accept(node, IssueKind::Pinned) {
            new_items += 1;
        }
    }
    Ok(Some(StreamPage::new(
        binding.key.clone(),
        connection.page_info,
        new_items,
    )))
}

fn absorb_repository(
    index: usize,
    plan: &RepositoryPlan,
    repository_data: &Value,
    since: Option<DateTime<Utc>>,
    collected: &mut Collected,
) -> Result<Vec<StreamPage>, WatchError> {
    let full_name = plan.repository.full_name();
    let mut accept =
        |node: ItemNode, kind: IssueKind| collected.accept(index, &full_name, node, kind);
    let mut pages = Vec::new();

    if let Some(binding) = &plan.pinned {
        pages.extend(read_pinned(repository_data, binding, &mut accept)?);
    }
    for streams in &plan.labels {
        pages.extend(read_items(
            repository_data,
            &streams.issues,
            |node| IssueKind::from_type_name(node.type_name.as_deref()),
            &mut accept,
        )?);
        if let Some(binding) = &streams.pull_requests {
            pages.extend(read_pull_requests(repository_data, binding, since, &mut accept)?);
        }
    }
    Ok(pages)
}

impl PageSink for Aggregator<'_> {
    fn absorb(&mut self, data: &Value) -> Result<Vec<StreamPage>, WatchError> {
        let plan = self.plan;
        let since = self.since;
        let mut pages = Vec::new();
        for (index, (repository, collected)) in plan
            .repositories
            .iter()
            .zip(self.collected.iter_mut())
            .enumerate()
        {
            let Some(repository_data) = present(data, &repository.alias) else {
                continue;
            };
            pages.extend(absorb_repository(
                index,
                repository,
                repository_data,
                since,
                collected,
            )?);
        }
        Ok(pages)
    }
}

#[cfg(test)]
#[path = "aggregate_tests.rs"]
mod tests;
