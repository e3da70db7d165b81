//! Path resolution for daybook configuration and data files.
//!
//! All daybook data is stored in `~/.daybook/` (or `$DAYBOOK_HOME`):
//! - `config.yaml` - Main configuration file
//! - `daybook.db` - SQLite database holding the pending-change log and sync status
//! - `logs/` - Rolling log files

use std::path::PathBuf;

use crate::error::DaybookError;

/// Environment variable that overrides the data root.
pub const HOME_ENV: &str = "DAYBOOK_HOME";

/// Paths to daybook configuration and data directories.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.daybook/`
    pub root: PathBuf,
    /// Config file: `~/.daybook/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.daybook/daybook.db`
    pub database: PathBuf,
    /// Log directory: `~/.daybook/logs/`
    pub logs: PathBuf,
}

impl Paths {
    /// Create paths from `$DAYBOOK_HOME`, falling back to `~/.daybook`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither `$DAYBOOK_HOME` nor the home directory is set.
    pub fn new() -> Result<Self, DaybookError> {
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }

        let home = std::env::var("HOME").map_err(|_| {
            DaybookError::Config("Could not determine home directory".to_string())
        })?;

        Ok(Self::with_root(PathBuf::from(home).join(".daybook")))
    }

    /// Create paths with a custom root directory (useful for testing).
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("daybook.db"),
            logs: root.join("logs"),
            root,
        }
    }

    /// Ensure all directories exist, creating them if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), DaybookError> {
        for dir in [&self.root, &self.logs] {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    DaybookError::Config(format!("Failed to create directory {}: {e}", dir.display()))
                })?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_with_root() {
        let root = PathBuf::from("/tmp/test-daybook");
        let paths = Paths::with_root(root.clone());

        assert_eq!(paths.root, root);
        assert_eq!(paths.config_file, root.join("config.yaml"));
        assert_eq!(paths.database, root.join("daybook.db"));
        assert_eq!(paths.logs, root.join("logs"));
    }

    #[test]
    fn test_ensure_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().join("nested"));

        paths.ensure_dirs().unwrap();

        assert!(paths.root.exists());
        assert!(paths.logs.exists());
    }
}
