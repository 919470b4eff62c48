//! On-disk layout of everything oneshot keeps between runs.
//!
//! A single `.oneshot` folder under the OS config directory holds
//! `config.toml`, the rolling `logs/` and the `parts/` store where each
//! taught part gets its own sub-directory (plus `<part>.previous` backups).
//! Setting `ONESHOT_CONFIG_HOME` moves the whole tree, which is how the
//! integration tests and portable installs keep parts out of the user's
//! profile.

use std::path::{Path, PathBuf};

use directories::BaseDirs;
use thiserror::Error;

/// Name of the application directory that lives under the OS config root.
pub const APP_DIR_NAME: &str = ".oneshot";
/// Environment variable that relocates the config base directory.
pub const CONFIG_HOME_ENV: &str = "ONESHOT_CONFIG_HOME";
/// Sub-directory for rolling log files.
pub const LOGS_DIR_NAME: &str = "logs";
/// Sub-directory holding one folder per taught part.
pub const PARTS_DIR_NAME: &str = "parts";

/// Errors that can occur while resolving or preparing application directories.
#[derive(Debug, Error)]
pub enum AppDirError {
    /// No suitable base config directory could be resolved.
    #[error("No suitable base config directory available for application files")]
    NoBaseDir,
    /// Failed to create the application directory.
    #[error("Failed to create application directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The `.oneshot` tree rooted under some base directory.
///
/// Directories are created lazily, when first asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirs {
    root: PathBuf,
}

impl AppDirs {
    /// Resolve the tree from `ONESHOT_CONFIG_HOME` or the OS config directory.
    pub fn locate() -> Result<Self, AppDirError> {
        let base = std::env::var_os(CONFIG_HOME_ENV)
            .map(PathBuf::from)
            .or_else(|| BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf()))
            .ok_or(AppDirError::NoBaseDir)?;
        Ok(Self::under(base))
    }

    /// Lay the tree out under an explicit base directory.
    pub fn under(base: impl AsRef<Path>) -> Self {
        Self {
            root: base.as_ref().join(APP_DIR_NAME),
        }
    }

    pub fn root(&self) -> Result<PathBuf, AppDirError> {
        ensure_dir(self.root.clone())
    }

    pub fn logs(&self) -> Result<PathBuf, AppDirError> {
        ensure_dir(self.root.join(LOGS_DIR_NAME))
    }

    pub fn parts(&self) -> Result<PathBuf, AppDirError> {
        ensure_dir(self.root.join(PARTS_DIR_NAME))
    }
}

/// Return the root `.oneshot` directory, creating it if needed.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    AppDirs::locate()?.root()
}

/// Return the logs directory inside the `.oneshot` root, creating it if needed.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    AppDirs::locate()?.logs()
}

/// Return the part store directory, creating it if needed.
pub fn parts_dir() -> Result<PathBuf, AppDirError> {
    AppDirs::locate()?.parts()
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf, AppDirError> {
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
