//! Parts: named objects with their images, features and trained state.

pub mod box_record;
pub mod features;
pub mod store;

use std::path::PathBuf;

use thiserror::Error;

use crate::app_dirs::AppDirError;
pub use box_record::{format_box, parse_box, read_box, write_box};
pub use features::{FeatureError, FeaturePools};
pub use store::{PartPaths, PartStore, StagedPart};

#[derive(Debug, Error)]
pub enum PartError {
    #[error("Invalid part name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("Part {0:?} does not exist")]
    NotFound(String),
    #[error("Part {0:?} has no previous version to restore")]
    NoBackup(String),
    #[error("Part storage I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write image {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Malformed box record {path}: {content:?}")]
    MalformedBox { path: PathBuf, content: String },
    #[error(transparent)]
    Features(#[from] FeatureError),
    #[error(transparent)]
    Dir(#[from] AppDirError),
}

/// Which image pool of a part an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolClass {
    Positive,
    Negative,
}

impl PoolClass {
    pub fn dir_name(self) -> &'static str {
        match self {
            PoolClass::Positive => "Positive",
            PoolClass::Negative => "Negative",
        }
    }
}

impl std::str::FromStr for PoolClass {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "positive" | "pos" => Ok(PoolClass::Positive),
            "negative" | "neg" => Ok(PoolClass::Negative),
            other => Err(format!("unknown class {other:?} (expected positive or negative)")),
        }
    }
}

impl std::fmt::Display for PoolClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}
