//! Capability-scoped access to the state file and the outbox directory.

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;

use crate::github::error::WatchError;

/// Opens `path` as a directory, creating it and its parents first.
///
/// `purpose` names the directory in error messages.
///
/// # Errors
///
/// Returns [`WatchError::Io`] when the directory cannot be created or
/// opened.
pub fn ensure_dir(path: &Utf8Path, purpose: &str) -> Result<Dir, WatchError> {
    let (base, relative) = if path.as_str().is_empty() || path == Utf8Path::new(".") {
        (open_ambient(Utf8Path::new("."), purpose)?, Utf8Path::new(""))
    } else if path.is_absolute() {
        let relative = path.strip_prefix("/").map_err(|_| WatchError::Io {
            message: format!("failed to normalise {purpose} directory '{path}'"),
        })?;
        (open_ambient(Utf8Path::new("/"), purpose)?, relative)
    } else {
        (open_ambient(Utf8Path::new("."), purpose)?, path)
    };

    if relative.as_str().is_empty() {
        return Ok(base);
    }
    base.create_dir_all(relative).map_err(|error| WatchError::Io {
        message: format!("failed to create {purpose} directory '{path}': {error}"),
    })?;
    base.open_dir(relative).map_err(|error| WatchError::Io {
        message: format!("failed to open {purpose} directory '{path}': {error}"),
    })
}

/// Opens an existing directory, or `None` when it does not exist.
///
/// # Errors
///
/// Returns [`WatchError::Io`] when the directory exists but cannot be
/// opened.
pub fn open_existing_dir(path: &Utf8Path, purpose: &str) -> Result<Option<Dir>, WatchError> {
    let target = if path.as_str().is_empty() {
        Utf8Path::new(".")
    } else {
        path
    };
    match Dir::open_ambient_dir(target, ambient_authority()) {
        Ok(dir) => Ok(Some(dir)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(WatchError::Io {
            message: format!("failed to open {purpose} directory '{path}': {error}"),
        }),
    }
}

fn open_ambient(path: &Utf8Path, purpose: &str) -> Result<Dir, WatchError> {
    Dir::open_ambient_dir(path, ambient_authority()).map_err(|error| WatchError::Io {
        message: format!("failed to open base directory for {purpose}: {error}"),
    })
}

#[cfg(test)]
mod tests {
    //! Unit tests for directory creation.

    #![expect(
        clippy::panic_in_result_fn,
        reason = "Test assertions are expected to panic on failure"
    )]

    use camino::Utf8PathBuf;
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[rstest]
    fn creates_nested_absolute_directories() -> TestResult {
        let temp = TempDir::new()?;
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf())
            .map_err(|path| format!("non UTF-8 temp path: {}", path.display()))?;
        let target = root.join("a/b/c");

        let dir = ensure_dir(&target, "test")?;
        dir.write("marker.txt", "ok")?;

        assert_eq!(std::fs::read_to_string(target.join("marker.txt"))?, "ok");
        Ok(())
    }

    #[rstest]
    fn missing_directories_are_not_errors() -> TestResult {
        let temp = TempDir::new()?;
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf())
            .map_err(|path| format!("non UTF-8 temp path: {}", path.display()))?;

        assert!(open_existing_dir(&root.join("absent"), "test")?.is_none());
        assert!(open_existing_dir(&root, "test")?.is_some());
        Ok(())
    }
}
