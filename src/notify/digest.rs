//! HTML digest of the items found by a run.
//!
//! The body is rendered with `minijinja` using HTML auto-escaping, so titles
//! and labels coming from GitHub are always escaped. When the digest lists a
//! single item it also carries a JSON-LD `ViewAction` so mail clients can
//! offer a direct link.

use minijinja::{AutoEscape, Environment, context};
use serde::Serialize;
use serde_json::json;

use crate::github::error::WatchError;
use crate::watch::RepositoryIssues;

use super::Notification;

const DIGEST_TEMPLATE: &str = r#"<html>
<head>
{%- if view_action %}
<script type="application/ld+json">{{ view_action|tojson }}</script>
{%- endif %}
</head>
<body>
{%- for repository in repositories %}
<h3>{{ repository.full_name }}</h3>
<table>
<tr><th>#</th><th>Kind</th><th>Title</th><th>Status</th><th>Labels</th></tr>
{%- for item in repository.items %}
<tr{% if item.already_viewed %} class="viewed"{% endif %}><td><a href="{{ item.url }}">{{ item.number }}</a></td><td>{{ item.kind }}</td><td>{{ item.title }}</td><td>{{ item.status }}</td><td>{{ item.labels|join(", ") }}</td></tr>
{%- endfor %}
</table>
{%- endfor %}
<p><small>label-watcher {{ version }}</small></p>
</body>
</html>
"#;

#[derive(Serialize)]
struct DigestRepository<'a> {
    full_name: String,
    items: Vec<DigestItem<'a>>,
}

#[derive(Serialize)]
struct DigestItem<'a> {
    number: &'a str,
    kind: &'static str,
    title: &'a str,
    status: &'a str,
    labels: &'a [String],
    url: &'a str,
    already_viewed: bool,
}

/// Subject line for a digest listing `count` items.
#[must_use]
pub fn subject(count: usize) -> String {
    format!("Label watcher - {count} issue(s)")
}

/// Renders the digest of `repositories`.
///
/// # Errors
///
/// Returns [`WatchError::Configuration`] when the template cannot be
/// compiled or rendered.
pub fn render(repositories: &[RepositoryIssues]) -> Result<Notification, WatchError> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::Html);
    env.add_template("digest.html", DIGEST_TEMPLATE)
        .map_err(|error| WatchError::Configuration {
            message: format!("invalid digest template: {error}"),
        })?;

    let digest: Vec<DigestRepository<'_>> = repositories
        .iter()
        .filter(|repository| !repository.issues.is_empty())
        .map(|repository| DigestRepository {
            full_name: repository.repository.full_name(),
            items: repository
                .issues
                .iter()
                .map(|record| DigestItem {
                    number: &record.number,
                    kind: record.kind.label(),
                    title: &record.title,
                    status: &record.status,
                    labels: &record.labels,
                    url: &record.url,
                    already_viewed: record.already_viewed,
                })
                .collect(),
        })
        .collect();
    let count: usize = digest.iter().map(|repository| repository.items.len()).sum();
    let view_action = match digest.as_slice() {
        [only] => match only.items.as_slice() {
            [item] => Some(json!({
                "@context": "http://schema.org",
                "@type": "EmailMessage",
                "potentialAction": {
                    "@type": "ViewAction",
                    "url": item.url,
                    "name": "View"
                },
                "description": format!("View {} #{}", only.full_name, item.number)
            })),
            _ => None,
        },
        _ => None,
    };

    let template = env
        .get_template("digest.html")
        .map_err(|error| WatchError::Configuration {
            message: format!("failed to retrieve digest template: {error}"),
        })?;
    let html_body = template
        .render(context! {
            repositories => digest,
            view_action => view_action,
            version => env!("CARGO_PKG_VERSION"),
        })
        .map_err(|error| WatchError::Configuration {
            message: format!("digest rendering failed: {error}"),
        })?;

    Ok(Notification {
        subject: subject(count),
        html_body,
        item_count: count,
    })
}

#[cfg(test)]
#[path = "digest_tests.rs"]
mod tests;
