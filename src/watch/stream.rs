//! Stream identities and their cursor state.
//!
//! A stream is one pageable connection inside a batched query: the issues or
//! pull requests carrying one label, the pinned issues of a repository, a
//! repository's label list, or the remaining labels of one item. Streams are
//! keyed by a small value type rather than by the alias text they are
//! rendered under, so two labels that sanitise to the same alias can never be
//! merged.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::{Map, Value};

use crate::github::pagination::PageInfo;

/// Case-insensitive key of a watched repository (`owner/name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryKey(String);

impl RepositoryKey {
    /// Creates a key from a repository's full name.
    #[must_use]
    pub fn new(full_name: &str) -> Self {
        Self(full_name.to_lowercase())
    }

    /// Borrow the normalised full name.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identity of one stream within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamKey {
    /// The label list of a repository, read before the watch plan exists.
    RepositoryLabels {
        /// Repository the labels belong to.
        repository: RepositoryKey,
    },
    /// Open and closed issues carrying a label.
    Issues {
        /// Repository being watched.
        repository: RepositoryKey,
        /// Label name as it exists in the repository.
        label: String,
    },
    /// Open, closed, and merged pull requests carrying a label.
    PullRequests {
        /// Repository being watched.
        repository: RepositoryKey,
        /// Label name as it exists in the repository.
        label: String,
    },
    /// Issues pinned to a repository.
    Pinned {
        /// Repository being watched.
        repository: RepositoryKey,
    },
    /// Labels of a single issue or pull request beyond its first page.
    ItemLabels {
        /// Repository the item belongs to.
        repository: RepositoryKey,
        /// Item number.
        number: String,
    },
}

impl StreamKey {
    /// Repository the stream belongs to.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryKey {
        match self {
            Self::RepositoryLabels { repository }
            | Self::Issues { repository, .. }
            | Self::PullRequests { repository, .. }
            | Self::Pinned { repository }
            | Self::ItemLabels { repository, .. } => repository,
        }
    }
}

/// Where a stream is rendered in the query and which variables drive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamBinding {
    /// Identity of the stream.
    pub key: StreamKey,
    /// Response alias of the stream's field inside its repository selection.
    pub alias: String,
    /// Name of the `String` variable carrying the continuation cursor.
    pub after_variable: String,
    /// Name of the `Boolean!` variable guarding the field.
    pub include_variable: String,
}

impl StreamBinding {
    /// Creates a binding whose variables are qualified by `scope`.
    ///
    /// `scope` is the repository alias, which is unique per run, so the
    /// variable names are unique as long as `name` is unique within the
    /// repository.
    #[must_use]
    pub fn new(key: StreamKey, scope: &str, name: impl Into<String>) -> Self {
        let alias = name.into();
        Self {
            after_variable: format!("after_{scope}_{alias}"),
            include_variable: format!("include_{scope}_{alias}"),
            key,
            alias,
        }
    }
}

/// Continuation state of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCursor {
    /// Cursor to continue after, `None` for the first page.
    pub after: Option<String>,
    /// Whether the stream is part of the next request.
    pub include: bool,
    after_variable: String,
    include_variable: String,
}

/// One page of results for a stream, as read from a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPage {
    /// Stream the page belongs to.
    pub key: StreamKey,
    /// Connection page info reported by GitHub.
    pub page_info: PageInfo,
    /// Items seen for the first time in this run.
    pub new_items: usize,
    /// Set when the client stopped reading the stream early, which closes
    /// it regardless of `page_info`.
    pub cutoff_reached: bool,
}

impl StreamPage {
    /// Creates a page that did not hit a client-side cutoff.
    #[must_use]
    pub const fn new(key: StreamKey, page_info: PageInfo, new_items: usize) -> Self {
        Self {
            key,
            page_info,
            new_items,
            cutoff_reached: false,
        }
    }
}

/// Cursor state for every stream of a batched query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CursorTable {
    cursors: BTreeMap<StreamKey, StreamCursor>,
}

impl CursorTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stream that starts included, continuing after `after`.
    pub fn register(&mut self, binding: &StreamBinding, after: Option<String>) {
        self.cursors.insert(
            binding.key.clone(),
            StreamCursor {
                after,
                include: true,
                after_variable: binding.after_variable.clone(),
                include_variable: binding.include_variable.clone(),
            },
        );
    }

    /// Cursor state for `key`.
    #[must_use]
    pub fn get(&self, key: &StreamKey) -> Option<&StreamCursor> {
        self.cursors.get(key)
    }

    /// Number of registered streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    /// Returns true when no stream is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Number of streams still reporting more pages.
    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.cursors.values().filter(|cursor| cursor.include).count()
    }

    /// Returns true while any stream still has pages to fetch.
    #[must_use]
    pub fn has_open(&self) -> bool {
        self.cursors.values().any(|cursor| cursor.include)
    }

    /// Writes every stream's cursor and include flag into `variables`.
    pub fn write_variables(&self, variables: &mut Map<String, Value>) {
        for cursor in self.cursors.values() {
            variables.insert(
                cursor.after_variable.clone(),
                cursor.after.clone().map_or(Value::Null, Value::String),
            );
            variables.insert(cursor.include_variable.clone(), Value::Bool(cursor.include));
        }
    }

    /// Advances streams from the pages of one response.
    ///
    /// Streams that were included in the request but did not appear in the
    /// response are closed so that they cannot be requested forever.
    /// Returns the keys of the streams closed that way.
    pub fn apply(&mut self, pages: &[StreamPage]) -> Vec<StreamKey> {
        let mut answered = BTreeSet::new();
        for page in pages {
            let Some(cursor) = self.cursors.get_mut(&page.key) else {
                continue;
            };
            if !cursor.include {
                continue;
            }
            if let Some(end_cursor) = &page.page_info.end_cursor {
                cursor.after = Some(end_cursor.clone());
            }
            cursor.include = page.page_info.has_next_page && !page.cutoff_reached;
            answered.insert(&page.key);
        }

        let mut closed = Vec::new();
        for (key, cursor) in &mut self.cursors {
            if cursor.include && !answered.contains(key) {
                cursor.include = false;
                closed.push(key.clone());
            }
        }
        closed
    }
}
