//! Label discovery before planning and label completion after fetching.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::github::error::WatchError;

use super::aggregate::{Aggregator, LabelConnection, PendingLabels, decode, present};
use super::compose::{
    base_document, declare_stream, label_connection_fragment, repository_field,
    LABEL_CONNECTION_FIELDS, PAGE_SIZE_VARIABLE,
};
use super::engine::PageSink;
use super::plan::{LabelCatalog, WatchedRepository, repository_alias};
use super::query::{Argument, Field, QueryDocument};
use super::stream::{CursorTable, StreamBinding, StreamKey, StreamPage};

/// Page size of the discovery query; label lists are cheap to read.
pub const DISCOVERY_PAGE_SIZE: u32 = 100;

fn labels_field(binding: &StreamBinding) -> Field {
    Field::new("labels")
        .with_argument("first", Argument::variable(PAGE_SIZE_VARIABLE))
        .with_argument("after", Argument::variable(&binding.after_variable))
        .with_spread(LABEL_CONNECTION_FIELDS)
}

#[derive(Debug, Clone)]
struct DiscoveryTarget {
    alias: String,
    owner: String,
    name: String,
    binding: StreamBinding,
}

/// Reads the label list of every repository that watches labels.
#[derive(Debug, Clone)]
pub struct LabelDiscovery {
    targets: Vec<DiscoveryTarget>,
    catalog: LabelCatalog,
}

impl LabelDiscovery {
    /// Prepares one label stream per repository with configured labels.
    #[must_use]
    pub fn new(repositories: &[WatchedRepository]) -> Self {
        let targets = repositories
            .iter()
            .enumerate()
            .filter(|(_, repository)| !repository.labels().is_empty())
            .map(|(index, repository)| {
                let alias = repository_alias(index, repository);
                let binding = StreamBinding::new(
                    StreamKey::RepositoryLabels {
                        repository: repository.key(),
                    },
                    &alias,
                    "labels",
                );
                DiscoveryTarget {
                    owner: repository.locator().owner().as_str().to_owned(),
                    name: repository.locator().name().as_str().to_owned(),
                    alias,
                    binding,
                }
            })
            .collect();
        Self {
            targets,
            catalog: LabelCatalog::new(),
        }
    }

    /// Returns true when no repository needs its labels read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Query reading every label list, with the include guard on the
    /// repository selection.
    #[must_use]
    pub fn document(&self) -> QueryDocument {
        let mut document = base_document("RepositoryLabels");
        for target in &self.targets {
            declare_stream(&mut document, &target.binding);
            document.push_field(
                repository_field(&target.alias, &target.owner, &target.name)
                    .with_include_if(&target.binding.include_variable)
                    .with_field(labels_field(&target.binding)),
            );
        }
        document.with_fragment(label_connection_fragment())
    }

    /// Cursor state with every label stream open.
    #[must_use]
    pub fn cursor_table(&self) -> CursorTable {
        let mut table = CursorTable::new();
        for target in &self.targets {
            table.register(&target.binding, None);
        }
        table
    }

    /// The labels read so far.
    #[must_use]
    pub fn into_catalog(self) -> LabelCatalog {
        self.catalog
    }
}

impl PageSink for LabelDiscovery {
    fn absorb(&mut self, data: &Value) -> Result<Vec<StreamPage>, WatchError> {
        let mut pages = Vec::new();
        for target in &self.targets {
            let Some(labels) = present(data, &target.alias).and_then(|repository| present(repository, "labels"))
            else {
                continue;
            };
            let connection: LabelConnection = decode(labels, &target.alias)?;
            let (names, page_info) = connection.into_names();
            let new_items = names.len();
            self.catalog.extend(target.binding.key.repository(), names);
            pages.push(StreamPage::new(target.binding.key.clone(), page_info, new_items));
        }
        Ok(pages)
    }
}

#[derive(Debug, Clone)]
struct ItemTarget {
    repository_index: usize,
    number: String,
    numeric: u64,
    is_pull_request: bool,
    after: String,
    binding: StreamBinding,
}

#[derive(Debug, Clone)]
struct RepositoryGroup {
    alias: String,
    owner: String,
    name: String,
    items: Vec<ItemTarget>,
}

/// Follow-up query reading the labels that did not fit in an item's first
/// label page.
///
/// Items are fetched through `issue(number:)` or `pullRequest(number:)`
/// depending on their kind, grouped under their repository's selection.
pub struct RemainingLabels<'a, 'p> {
    aggregator: &'a mut Aggregator<'p>,
    groups: BTreeMap<usize, RepositoryGroup>,
}

impl<'a, 'p> RemainingLabels<'a, 'p> {
    /// Prepares streams for `pending`, which should be one batch.
    ///
    /// Items whose number is not numeric cannot be addressed and are
    /// skipped.
    #[must_use]
    pub fn new(aggregator: &'a mut Aggregator<'p>, pending: &[PendingLabels]) -> Self {
        let plan = aggregator.plan();
        let mut groups: BTreeMap<usize, RepositoryGroup> = BTreeMap::new();
        for item in pending {
            let Some(repository) = plan.repositories.get(item.repository_index) else {
                continue;
            };
            let Ok(number) = item.number.parse::<u64>() else {
                tracing::warn!(number = %item.number, "item number is not numeric; keeping its first labels");
                continue;
            };
            let group = groups.entry(item.repository_index).or_insert_with(|| {
                let locator = repository.repository.locator();
                RepositoryGroup {
                    alias: repository.alias.clone(),
                    owner: locator.owner().as_str().to_owned(),
                    name: locator.name().as_str().to_owned(),
                    items: Vec::new(),
                }
            });
            let binding = StreamBinding::new(
                StreamKey::ItemLabels {
                    repository: repository.repository.key(),
                    number: item.number.clone(),
                },
                &group.alias,
                format!("i{number}"),
            );
            group.items.push(ItemTarget {
                repository_index: item.repository_index,
                number: item.number.clone(),
                numeric: number,
                is_pull_request: item.is_pull_request,
                after: item.after.clone(),
                binding,
            });
        }
        Self { aggregator, groups }
    }

    /// Returns true when no item could be addressed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Query reading the remaining labels of every item in the batch.
    #[must_use]
    pub fn document(&self) -> QueryDocument {
        let mut document = base_document("RemainingItemLabels");
        for group in self.groups.values() {
            let mut repository = repository_field(&group.alias, &group.owner, &group.name);
            for target in &group.items {
                declare_stream(&mut document, &target.binding);
                let item_field = if target.is_pull_request {
                    "pullRequest"
                } else {
                    "issue"
                };
                repository = repository.with_field(
                    Field::new(item_field)
                        .with_alias(&target.binding.alias)
                        .with_argument("number", Argument::Int(target.numeric))
                        .with_include_if(&target.binding.include_variable)
                        .with_field(labels_field(&target.binding)),
                );
            }
            document.push_field(repository);
        }
        document.with_fragment(label_connection_fragment())
    }

    /// Cursor state continuing after each item's first label page.
    #[must_use]
    pub fn cursor_table(&self) -> CursorTable {
        let mut table = CursorTable::new();
        for target in self.groups.values().flat_map(|group| &group.items) {
            table.register(&target.binding, Some(target.after.clone()));
        }
        table
    }
}

impl PageSink for RemainingLabels<'_, '_> {
    fn absorb(&mut self, data: &Value) -> Result<Vec<StreamPage>, WatchError> {
        let mut pages = Vec::new();
        for group in self.groups.values() {
            let Some(repository) = present(data, &group.alias) else {
                continue;
            };
            for target in &group.items {
                let Some(labels) = present(repository, &target.binding.alias)
                    .and_then(|item| present(item, "labels"))
                else {
                    continue;
                };
                let connection: LabelConnection = decode(labels, &target.binding.alias)?;
                let (names, page_info) = connection.into_names();
                let new_items = names.len();
                self.aggregator
                    .extend_labels(target.repository_index, &target.number, names);
                pages.push(StreamPage::new(target.binding.key.clone(), page_info, new_items));
            }
        }
        Ok(pages)
    }
}
