//! Loading and saving [`PersistedState`].

use camino::{Utf8Path, Utf8PathBuf};

use super::PersistedState;
use crate::files::{ensure_dir, open_existing_dir};
use crate::github::error::WatchError;

/// Storage for the state carried between runs.
pub trait StateStore {
    /// Reads the stored state. A store that was never written yields the
    /// empty state.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Io`] when the state exists but cannot be read
    /// or parsed.
    fn load(&self) -> Result<PersistedState, WatchError>;

    /// Replaces the stored state.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Io`] when the state cannot be written.
    fn save(&self, state: &PersistedState) -> Result<(), WatchError>;
}

/// JSON file holding the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStateStore {
    path: Utf8PathBuf,
}

impl FileStateStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn split(&self) -> Result<(&Utf8Path, &str), WatchError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        let file_name = self.path.file_name().ok_or_else(|| WatchError::Io {
            message: format!("invalid state path '{}': no file name", self.path),
        })?;
        Ok((parent, file_name))
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<PersistedState, WatchError> {
        let (parent, file_name) = self.split()?;
        let Some(dir) = open_existing_dir(parent, "state")? else {
            tracing::debug!(path = %self.path, "state directory missing; starting empty");
            return Ok(PersistedState::new());
        };
        if !dir.exists(file_name) {
            tracing::debug!(path = %self.path, "state file missing; starting empty");
            return Ok(PersistedState::new());
        }
        let content = dir.read_to_string(file_name).map_err(|error| WatchError::Io {
            message: format!("failed to read state '{}': {error}", self.path),
        })?;
        serde_json::from_str(&content).map_err(|error| WatchError::Io {
            message: format!("failed to parse state '{}': {error}", self.path),
        })
    }

    fn save(&self, state: &PersistedState) -> Result<(), WatchError> {
        let (parent, file_name) = self.split()?;
        let dir = ensure_dir(parent, "state")?;
        let json = serde_json::to_string_pretty(state).map_err(|error| WatchError::Io {
            message: format!("failed to serialise state: {error}"),
        })?;
        dir.write(file_name, json).map_err(|error| WatchError::Io {
            message: format!("failed to write state '{}': {error}", self.path),
        })?;
        tracing::debug!(path = %self.path, repositories = state.repository_count(), "state saved");
        Ok(())
    }
}
