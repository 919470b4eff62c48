//! On-disk layout of parts.
//!
//! ```text
//! <root>/<name>/
//!     Positive/Snapshot_1.png
//!     Positive/Extra_<n>.png
//!     Negative/Extra_<n>.png
//!     Box.txt
//!     features/
//!     Checkpoints/State.json
//!     Checkpoints/Metrics.txt
//!     Graphs.png
//! <root>/<name>.previous/      backup of the version replaced last
//! ```
//!
//! A re-added part is built in a hidden staging directory and only renamed
//! into place once it is complete.

use std::path::{Path, PathBuf};

use image::RgbImage;
use tempfile::TempDir;

use super::{PartError, PoolClass};
use crate::app_dirs;

pub const SNAPSHOT_FILE: &str = "Snapshot_1.png";
pub const BOX_FILE: &str = "Box.txt";
pub const FEATURES_DIR: &str = "features";
pub const CHECKPOINT_DIR: &str = "Checkpoints";
pub const CHECKPOINT_FILE: &str = "State.json";
pub const METRICS_FILE: &str = "Metrics.txt";
pub const GRAPHS_FILE: &str = "Graphs.png";
const BACKUP_SUFFIX: &str = ".previous";
const STAGING_PREFIX: &str = ".staging-";
const EXTRA_PREFIX: &str = "Extra_";
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Every path inside one part directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartPaths {
    pub root: PathBuf,
}

impl PartPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn class_dir(&self, class: PoolClass) -> PathBuf {
        self.root.join(class.dir_name())
    }

    pub fn snapshot(&self) -> PathBuf {
        self.class_dir(PoolClass::Positive).join(SNAPSHOT_FILE)
    }

    pub fn box_file(&self) -> PathBuf {
        self.root.join(BOX_FILE)
    }

    pub fn features_dir(&self) -> PathBuf {
        self.root.join(FEATURES_DIR)
    }

    pub fn checkpoint(&self) -> PathBuf {
        self.root.join(CHECKPOINT_DIR).join(CHECKPOINT_FILE)
    }

    pub fn metrics(&self) -> PathBuf {
        self.root.join(CHECKPOINT_DIR).join(METRICS_FILE)
    }

    pub fn graphs(&self) -> PathBuf {
        self.root.join(GRAPHS_FILE)
    }

    /// Create the class directories.
    pub fn create_layout(&self) -> Result<(), PartError> {
        for class in [PoolClass::Positive, PoolClass::Negative] {
            let dir = self.class_dir(class);
            std::fs::create_dir_all(&dir).map_err(|source| PartError::Io { path: dir, source })?;
        }
        Ok(())
    }

    /// Image files of one class, sorted by file name.
    pub fn class_images(&self, class: PoolClass) -> Result<Vec<PathBuf>, PartError> {
        let dir = self.class_dir(class);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir).map_err(|source| PartError::Io {
            path: dir.clone(),
            source,
        })?;
        let mut images: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        images.sort();
        Ok(images)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

pub fn save_image(image: &RgbImage, path: &Path) -> Result<(), PartError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| PartError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    image.save(path).map_err(|source| PartError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Root directory holding all parts.
#[derive(Debug, Clone)]
pub struct PartStore {
    root: PathBuf,
}

impl PartStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store under the application directory.
    pub fn open_default() -> Result<Self, PartError> {
        Ok(Self::new(app_dirs::parts_dir()?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn validate_name(name: &str) -> Result<(), PartError> {
        let reason = if name.trim().is_empty() {
            Some("name is empty")
        } else if name.contains(['/', '\\']) {
            Some("name contains a path separator")
        } else if name.starts_with('.') {
            Some("name starts with a dot")
        } else if name.ends_with(BACKUP_SUFFIX) {
            Some("name ends with the backup suffix")
        } else if name.trim() != name {
            Some("name has leading or trailing whitespace")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(PartError::InvalidName {
                name: name.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    pub fn paths(&self, name: &str) -> Result<PartPaths, PartError> {
        Self::validate_name(name)?;
        Ok(PartPaths::new(self.root.join(name)))
    }

    /// Paths of an existing part.
    pub fn existing(&self, name: &str) -> Result<PartPaths, PartError> {
        let paths = self.paths(name)?;
        if !paths.root.is_dir() {
            return Err(PartError::NotFound(name.to_string()));
        }
        Ok(paths)
    }

    fn backup_dir(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}{BACKUP_SUFFIX}"))
    }

    pub fn has_backup(&self, name: &str) -> bool {
        self.backup_dir(name).is_dir()
    }

    /// Start building a new version of `name` in a staging directory.
    ///
    /// Dropping the returned value without committing removes the staging
    /// directory and leaves the current part untouched.
    pub fn stage(&self, name: &str) -> Result<StagedPart, PartError> {
        Self::validate_name(name)?;
        std::fs::create_dir_all(&self.root).map_err(|source| PartError::Io {
            path: self.root.clone(),
            source,
        })?;
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.root)
            .map_err(|source| PartError::Io {
                path: self.root.clone(),
                source,
            })?;
        let paths = PartPaths::new(dir.path().to_path_buf());
        paths.create_layout()?;
        Ok(StagedPart {
            name: name.to_string(),
            dir,
            paths,
        })
    }

    /// Replace the part with a staged version; the replaced version becomes
    /// the backup.
    pub fn commit(&self, staged: StagedPart) -> Result<PartPaths, PartError> {
        let StagedPart { name, dir, .. } = staged;
        let target = self.root.join(&name);
        let backup = self.backup_dir(&name);
        if target.exists() {
            if backup.exists() {
                remove_dir(&backup)?;
            }
            rename(&target, &backup)?;
        }
        let staged_dir = dir.keep();
        if let Err(err) = rename(&staged_dir, &target) {
            if backup.exists()
                && !target.exists()
                && let Err(rollback) = std::fs::rename(&backup, &target)
            {
                tracing::error!(
                    "Failed to put back {} after a failed commit; previous version remains at {}: {rollback}",
                    target.display(),
                    backup.display()
                );
            }
            if let Err(cleanup) = std::fs::remove_dir_all(&staged_dir) {
                tracing::error!("Failed to remove staged part {}: {cleanup}", staged_dir.display());
            }
            return Err(err);
        }
        tracing::info!("Committed part {name:?} at {}", target.display());
        Ok(PartPaths::new(target))
    }

    /// Swap the current part with its backup.
    ///
    /// Restoring twice returns to the version in place before the first
    /// restore.
    pub fn restore(&self, name: &str) -> Result<PartPaths, PartError> {
        let target = self.paths(name)?.root;
        let backup = self.backup_dir(name);
        if !backup.is_dir() {
            return Err(PartError::NoBackup(name.to_string()));
        }
        if target.exists() {
            let swap = self.root.join(format!("{STAGING_PREFIX}{name}-swap"));
            if swap.exists() {
                remove_dir(&swap)?;
            }
            rename(&target, &swap)?;
            rename(&backup, &target)?;
            rename(&swap, &backup)?;
        } else {
            rename(&backup, &target)?;
        }
        tracing::info!("Restored previous version of part {name:?}");
        Ok(PartPaths::new(target))
    }

    /// Save `image` as the next `Extra_<n>.png` of a class.
    pub fn add_extra(&self, name: &str, class: PoolClass, image: &RgbImage) -> Result<PathBuf, PartError> {
        let paths = self.existing(name)?;
        let next = paths
            .class_images(class)?
            .iter()
            .filter_map(|path| extra_index(path))
            .max()
            .map_or(1, |max| max + 1);
        let path = paths.class_dir(class).join(format!("{EXTRA_PREFIX}{next}.png"));
        save_image(image, &path)?;
        tracing::info!("Added {class} image {}", path.display());
        Ok(path)
    }

    /// Names of committed parts, sorted.
    pub fn list(&self) -> Result<Vec<String>, PartError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.root).map_err(|source| PartError::Io {
            path: self.root.clone(),
            source,
        })?;
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| Self::validate_name(name).is_ok())
            .collect();
        names.sort();
        Ok(names)
    }
}

fn extra_index(path: &Path) -> Option<u32> {
    path.file_stem()?
        .to_str()?
        .strip_prefix(EXTRA_PREFIX)?
        .parse()
        .ok()
}

fn rename(from: &Path, to: &Path) -> Result<(), PartError> {
    std::fs::rename(from, to).map_err(|source| PartError::Io {
        path: from.to_path_buf(),
        source,
    })
}

fn remove_dir(path: &Path) -> Result<(), PartError> {
    std::fs::remove_dir_all(path).map_err(|source| PartError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// A part version being built; see [`PartStore::stage`].
#[derive(Debug)]
pub struct StagedPart {
    name: String,
    dir: TempDir,
    paths: PartPaths,
}

impl StagedPart {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn paths(&self) -> &PartPaths {
        &self.paths
    }
}
