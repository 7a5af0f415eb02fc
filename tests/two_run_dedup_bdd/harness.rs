//! Wiremock responses imitating the GitHub GraphQL endpoint.

use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Issues of `octo/alpha` labelled `bug`.
pub(crate) const ALPHA_ISSUES: [u64; 2] = [1, 2];
/// Issues of `octo/beta`; `10` carries both `bug` and `P1`.
pub(crate) const BETA_ISSUES: [u64; 2] = [10, 11];
/// Merged pull requests of `octo/beta` labelled `bug`.
pub(crate) const BETA_PULL_REQUESTS: [u64; 1] = [12];

const UPDATED_AT: &str = "2025-05-01T10:00:00Z";

fn rate_limit() -> Value {
    json!({
        "cost": 1,
        "limit": 5000,
        "remaining": 4990,
        "used": 10,
        "nodeCount": 100,
        "resetAt": "2025-06-01T13:00:00Z"
    })
}

fn item(repository: &str, type_name: &str, number: u64, labels: &[&str]) -> Value {
    let (state_key, state, segment) = if type_name == "PullRequest" {
        ("pullRequestState", "MERGED", "pull")
    } else {
        ("issueState", "OPEN", "issues")
    };
    let names: Vec<Value> = labels.iter().map(|name| json!({ "name": name })).collect();
    json!({
        "typeName": type_name,
        "number": number,
        state_key: state,
        "title": format!("{repository} item {number}"),
        "updatedAt": UPDATED_AT,
        "url": format!("https://github.com/{repository}/{segment}/{number}"),
        "labels": {
            "nodes": names,
            "pageInfo": { "endCursor": "labels", "hasNextPage": false }
        }
    })
}

fn connection(nodes: Vec<Value>) -> Value {
    json!({
        "nodes": nodes,
        "pageInfo": { "endCursor": "end", "hasNextPage": false }
    })
}

fn label_list(names: &[&str]) -> Value {
    json!({ "labels": connection(names.iter().map(|name| json!({ "name": name })).collect()) })
}

fn labels_response() -> Value {
    json!({ "data": {
        "rateLimit": rate_limit(),
        "r0_octo_alpha": label_list(&["Bug", "docs"]),
        "r1_octo_beta": label_list(&["bug", "P1"])
    }})
}

fn issues_response() -> Value {
    let alpha: Vec<Value> = ALPHA_ISSUES
        .iter()
        .map(|number| item("octo/alpha", "Issue", *number, &["Bug"]))
        .collect();
    json!({ "data": {
        "rateLimit": rate_limit(),
        "r0_octo_alpha": {
            "issues_0_Bug": connection(alpha)
        },
        "r1_octo_beta": {
            "issues_0_bug": connection(vec![item("octo/beta", "Issue", 10, &["bug", "P1"])]),
            "issues_1_P1": connection(vec![
                item("octo/beta", "Issue", 11, &["P1"]),
                item("octo/beta", "Issue", 10, &["bug", "P1"]),
            ]),
            "pullRequests_0_bug": connection(vec![item("octo/beta", "PullRequest", 12, &["bug"])]),
            "pullRequests_1_P1": connection(Vec::new())
        }
    }})
}

/// Mounts the cost probe, label discovery, and issues responses.
pub(crate) async fn mount_github(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({ "variables": { "dryRun": true } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "rateLimit": rate_limit() } })))
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("query RepositoryLabels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(labels_response()))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("query IssuesWithLabel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issues_response()))
        .mount(server)
        .await;
}

/// Answers the next `times` issue data requests with a gateway timeout.
pub(crate) async fn mount_issue_timeouts(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("query IssuesWithLabel"))
        .and(body_partial_json(json!({ "variables": { "dryRun": false } })))
        .respond_with(ResponseTemplate::new(504).set_body_string("upstream timed out"))
        .up_to_n_times(times)
        .with_priority(2)
        .mount(server)
        .await;
}
