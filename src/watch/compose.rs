//! Batched issue and pull request query for a watch plan.

use super::plan::{RepositoryPlan, WatchPlan};
use super::query::{Argument, Field, Fragment, QueryDocument};
use super::stream::StreamBinding;

/// Variable toggling GitHub's cost-only evaluation.
pub const DRY_RUN_VARIABLE: &str = "dryRun";
/// Variable carrying the recency bound for issue filters.
pub const SINCE_VARIABLE: &str = "since";
/// Variable carrying the shared page size.
pub const PAGE_SIZE_VARIABLE: &str = "pageSize";

const ISSUE_CONNECTION_FIELDS: &str = "issueConnectionFields";
const PINNED_CONNECTION_FIELDS: &str = "pinnedIssueConnectionFields";
const PULL_REQUEST_CONNECTION_FIELDS: &str = "pullRequestConnectionFields";
const ISSUE_FIELDS: &str = "issueFields";
const PULL_REQUEST_FIELDS: &str = "pullRequestFields";
/// Fragment selecting label names and page info of a `LabelConnection`.
pub const LABEL_CONNECTION_FIELDS: &str = "labelConnectionFields";

/// The `rateLimit` selection every query carries.
#[must_use]
pub fn rate_limit_field() -> Field {
    Field::new("rateLimit")
        .with_argument("dryRun", Argument::variable(DRY_RUN_VARIABLE))
        .with_scalars(&["cost", "limit", "nodeCount", "remaining", "resetAt", "used"])
}

/// `pageInfo { endCursor hasNextPage }`.
#[must_use]
pub fn page_info_field() -> Field {
    Field::new("pageInfo").with_scalars(&["endCursor", "hasNextPage"])
}

/// Starts a query declaring the dry-run and page-size variables.
#[must_use]
pub fn base_document(operation: &str) -> QueryDocument {
    QueryDocument::new(operation)
        .with_variable(DRY_RUN_VARIABLE, "Boolean!")
        .with_variable(PAGE_SIZE_VARIABLE, "Int!")
        .with_field(rate_limit_field())
}

/// Declares the cursor and include variables of `binding`.
pub fn declare_stream(document: &mut QueryDocument, binding: &StreamBinding) {
    document.push_variable(&binding.after_variable, "String");
    document.push_variable(&binding.include_variable, "Boolean!");
}

/// `repository(owner: .., name: ..)` aliased as `alias`.
#[must_use]
pub fn repository_field(alias: &str, owner: &str, name: &str) -> Field {
    Field::new("repository")
        .with_alias(alias)
        .with_argument("owner", Argument::string(owner))
        .with_argument("name", Argument::string(name))
}

/// Fragment selecting label names and page info of a `LabelConnection`.
#[must_use]
pub fn label_connection_fragment() -> Fragment {
    Fragment::new(LABEL_CONNECTION_FIELDS, "LabelConnection")
        .with_field(Field::new("nodes").with_scalars(&["name"]))
        .with_field(page_info_field())
}

fn paging_arguments(field: Field, binding: &StreamBinding) -> Field {
    field
        .with_argument("after", Argument::variable(&binding.after_variable))
        .with_argument("first", Argument::variable(PAGE_SIZE_VARIABLE))
}

fn newest_first() -> Argument {
    Argument::object([
        ("field", Argument::enumeration("UPDATED_AT")),
        ("direction", Argument::enumeration("DESC")),
    ])
}

fn label_filter(label: &str) -> Argument {
    Argument::List(vec![Argument::string(label)])
}

fn pinned_field(binding: &StreamBinding) -> Field {
    paging_arguments(
        Field::new("pinnedIssues").with_alias(&binding.alias),
        binding,
    )
    .with_include_if(&binding.include_variable)
    .with_spread(PINNED_CONNECTION_FIELDS)
}

fn issues_field(binding: &StreamBinding, label: &str) -> Field {
    let filter = Argument::object([
        ("labels", label_filter(label)),
        ("states", Argument::enums(&["OPEN", "CLOSED"])),
        ("since", Argument::variable(SINCE_VARIABLE)),
    ]);
    paging_arguments(
        Field::new("issues")
            .with_alias(&binding.alias)
            .with_argument("filterBy", filter),
        binding,
    )
    .with_argument("orderBy", newest_first())
    .with_include_if(&binding.include_variable)
    .with_spread(ISSUE_CONNECTION_FIELDS)
}

/// Pull requests cannot be filtered by recency server-side; the newest-first
/// order is what lets the reader stop at the recency bound.
fn pull_requests_field(binding: &StreamBinding, label: &str) -> Field {
    paging_arguments(
        Field::new("pullRequests")
            .with_alias(&binding.alias)
            .with_argument("labels", label_filter(label))
            .with_argument("states", Argument::enums(&["OPEN", "CLOSED", "MERGED"])),
        binding,
    )
    .with_argument("orderBy", newest_first())
    .with_include_if(&binding.include_variable)
    .with_spread(PULL_REQUEST_CONNECTION_FIELDS)
}

fn item_fragment(name: &str, type_condition: &str, state_alias: &str, label_page_size: u32) -> Fragment {
    Fragment::new(name, type_condition)
        .with_scalars(&["number"])
        .with_field(Field::new("state").with_alias(state_alias))
        .with_scalars(&["title", "updatedAt", "url"])
        .with_field(
            Field::new("labels")
                .with_argument("first", Argument::Int(u64::from(label_page_size)))
                .with_field(Field::new("nodes").with_scalars(&["name"]))
                .with_field(page_info_field()),
        )
}

fn connection_fragment(name: &str, type_condition: &str, item: &str) -> Fragment {
    Fragment::new(name, type_condition)
        .with_field(
            Field::new("nodes")
                .with_field(Field::new("__typename").with_alias("typeName"))
                .with_spread(item),
        )
        .with_field(page_info_field())
}

fn repository_selection(plan: &RepositoryPlan) -> Field {
    let locator = plan.repository.locator();
    let mut field = repository_field(
        &plan.alias,
        locator.owner().as_str(),
        locator.name().as_str(),
    );
    if let Some(pinned) = &plan.pinned {
        field = field.with_field(pinned_field(pinned));
    }
    for streams in &plan.labels {
        field = field.with_field(issues_field(&streams.issues, &streams.label));
        if let Some(pull_requests) = &streams.pull_requests {
            field = field.with_field(pull_requests_field(pull_requests, &streams.label));
        }
    }
    field
}

/// Builds the batched query covering every stream of `plan`.
///
/// Item labels are read with `labels(first: label_page_size)`; the rest are
/// fetched afterwards for the items that report more.
#[must_use]
pub fn issues_document(plan: &WatchPlan, label_page_size: u32) -> QueryDocument {
    let uses_issues = plan
        .repositories
        .iter()
        .any(|repository| !repository.labels.is_empty());
    let mut document = base_document("IssuesWithLabel");
    if uses_issues {
        document.push_variable(SINCE_VARIABLE, "DateTime");
    }

    let mut uses_pinned = false;
    let mut uses_pull_requests = false;
    for repository in plan.repositories.iter().filter(|candidate| !candidate.is_empty()) {
        uses_pinned |= repository.pinned.is_some();
        uses_pull_requests |= repository
            .labels
            .iter()
            .any(|streams| streams.pull_requests.is_some());
        for binding in repository.bindings() {
            declare_stream(&mut document, binding);
        }
        document.push_field(repository_selection(repository));
    }

    if uses_pinned || uses_issues {
        document = document.with_fragment(item_fragment(
            ISSUE_FIELDS,
            "Issue",
            "issueState",
            label_page_size,
        ));
    }
    if uses_pull_requests {
        document = document.with_fragment(item_fragment(
            PULL_REQUEST_FIELDS,
            "PullRequest",
            "pullRequestState",
            label_page_size,
        ));
    }
    if uses_issues {
        document = document.with_fragment(connection_fragment(
            ISSUE_CONNECTION_FIELDS,
            "IssueConnection",
            ISSUE_FIELDS,
        ));
    }
    if uses_pinned {
        document = document.with_fragment(
            Fragment::new(PINNED_CONNECTION_FIELDS, "PinnedIssueConnection")
                .with_field(
                    Field::new("nodes").with_field(
                        Field::new("issue")
                            .with_field(Field::new("__typename").with_alias("typeName"))
                            .with_spread(ISSUE_FIELDS),
                    ),
                )
                .with_field(page_info_field()),
        );
    }
    if uses_pull_requests {
        document = document.with_fragment(connection_fragment(
            PULL_REQUEST_CONNECTION_FIELDS,
            "PullRequestConnection",
            PULL_REQUEST_FIELDS,
        ));
    }
    document
}
