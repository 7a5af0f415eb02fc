//! Cursor pagination primitives for GitHub GraphQL connections.
//!
//! GraphQL connections report their position through a `pageInfo` object.
//! The watcher pages many connections at once, so each one carries its own
//! cursor while a single [`PageSize`] is shared by every connection in a
//! request.

use serde::Deserialize;

/// Largest `first:` argument GitHub accepts on a connection.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Smallest page size the watcher degrades to before giving up.
pub const MIN_PAGE_SIZE: u32 = 5;

/// Amount subtracted from the page size after each transient failure.
pub const PAGE_SIZE_STEP: u32 = 5;

/// The `pageInfo` object of a GraphQL connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Opaque cursor marking the end of the returned page.
    #[serde(default)]
    pub end_cursor: Option<String>,
    /// Whether the connection has more items after `end_cursor`.
    #[serde(default)]
    pub has_next_page: bool,
}

impl PageInfo {
    /// Creates page info for a page ending at `end_cursor`.
    #[must_use]
    pub fn new(end_cursor: Option<&str>, has_next_page: bool) -> Self {
        Self {
            end_cursor: end_cursor.map(ToOwned::to_owned),
            has_next_page,
        }
    }
}

/// Page size shared by every stream of one run.
///
/// The value only ever shrinks: each transient failure takes
/// [`PAGE_SIZE_STEP`] off until [`MIN_PAGE_SIZE`] is reached.
///
/// # Example
///
/// ```
/// use label_watcher::github::pagination::PageSize;
///
/// let size = PageSize::new(12);
/// let smaller = size.degrade().expect("12 is above the floor");
/// assert_eq!(smaller.get(), 7);
/// assert_eq!(smaller.degrade().map(PageSize::get), Some(5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSize(u32);

impl PageSize {
    /// Creates a page size, clamping it into `MIN_PAGE_SIZE..=MAX_PAGE_SIZE`.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Self(value.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE))
    }

    /// Returns the page size.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns true once no further degradation is possible.
    #[must_use]
    pub const fn at_floor(self) -> bool {
        self.0 <= MIN_PAGE_SIZE
    }

    /// Returns the next smaller page size, or `None` at the floor.
    #[must_use]
    pub fn degrade(self) -> Option<Self> {
        if self.at_floor() {
            return None;
        }
        Some(Self(
            self.0.saturating_sub(PAGE_SIZE_STEP).max(MIN_PAGE_SIZE),
        ))
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self(MAX_PAGE_SIZE)
    }
}
