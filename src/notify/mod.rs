//! Delivering the digest of new items.
//!
//! The core only renders the digest; delivery is a [`Notifier`]. Two are
//! provided: [`LogNotifier`] writes a summary to the log and
//! [`OutboxNotifier`] drops each digest as an HTML file into a directory,
//! where a mail relay or a human can pick it up.

pub mod digest;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};

use crate::files::ensure_dir;
use crate::github::error::WatchError;

pub use digest::{render, subject};

/// A rendered digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Subject line.
    pub subject: String,
    /// HTML document.
    pub html_body: String,
    /// Number of items listed.
    pub item_count: usize,
}

/// Delivers rendered digests.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier {
    /// Delivers `notification`, created at `now`.
    ///
    /// # Errors
    ///
    /// Returns a [`WatchError`] when the digest could not be delivered.
    fn notify(&self, notification: &Notification, now: DateTime<Utc>) -> Result<(), WatchError>;
}

/// Logs each digest instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification, now: DateTime<Utc>) -> Result<(), WatchError> {
        tracing::info!(
            subject = %notification.subject,
            items = notification.item_count,
            at = %now.to_rfc3339(),
            "digest ready"
        );
        tracing::debug!(body = %notification.html_body, "digest body");
        Ok(())
    }
}

/// Writes each digest to `<outbox>/<timestamp>.html`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxNotifier {
    directory: Utf8PathBuf,
}

impl OutboxNotifier {
    /// Creates a notifier writing into `directory`.
    #[must_use]
    pub fn new(directory: impl Into<Utf8PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Target directory.
    #[must_use]
    pub fn directory(&self) -> &Utf8Path {
        &self.directory
    }

    /// File name used for a digest created at `now`.
    #[must_use]
    pub fn file_name(now: DateTime<Utc>) -> String {
        format!("{}.html", now.format("%Y%m%dT%H%M%S%.3fZ"))
    }
}

impl Notifier for OutboxNotifier {
    fn notify(&self, notification: &Notification, now: DateTime<Utc>) -> Result<(), WatchError> {
        let dir = ensure_dir(&self.directory, "outbox")?;
        let file_name = Self::file_name(now);
        dir.write(&file_name, &notification.html_body)
            .map_err(|error| WatchError::Io {
                message: format!(
                    "failed to write digest '{}': {error}",
                    self.directory.join(&file_name)
                ),
            })?;
        tracing::info!(
            subject = %notification.subject,
            items = notification.item_count,
            path = %self.directory.join(&file_name),
            "digest written to outbox"
        );
        Ok(())
    }
}
