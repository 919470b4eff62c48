//! Persisted model + optimizer snapshots.
//!
//! A checkpoint is a single JSON document. Writes go through a temporary
//! file in the target directory and are renamed into place, so readers see
//! either the previous checkpoint or the new one.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{ModelError, SimilarityModel, SimilarityWeights};
use super::optim::Adam;

/// Current on-disk checkpoint layout.
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to write checkpoint {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read checkpoint {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Checkpoint {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Unsupported checkpoint format {found} (expected {CHECKPOINT_FORMAT_VERSION})")]
    Version { found: u32 },
    #[error("Checkpoint weights are inconsistent: {0}")]
    Model(#[from] ModelError),
}

#[derive(Serialize)]
struct CheckpointRef<'a> {
    format_version: u32,
    model: &'a SimilarityWeights,
    optimizer: &'a Adam,
}

/// Loaded checkpoint contents.
#[derive(Debug, Clone, Deserialize)]
pub struct Checkpoint {
    format_version: u32,
    model: SimilarityWeights,
    optimizer: Adam,
}

impl Checkpoint {
    /// Rebuild the model, discarding optimizer state.
    pub fn into_model(self) -> Result<SimilarityModel, CheckpointError> {
        Ok(SimilarityModel::from_weights(self.model)?)
    }

    /// Rebuild both model and optimizer, e.g. to continue training.
    pub fn into_parts(self) -> Result<(SimilarityModel, Adam), CheckpointError> {
        let model = SimilarityModel::from_weights(self.model)?;
        let optimizer = if self.optimizer.matches(model.weights()) {
            self.optimizer
        } else {
            tracing::warn!("Optimizer state does not match model shape; starting fresh");
            model.optimizer(self.optimizer.learning_rate(), self.optimizer.weight_decay())
        };
        Ok((model, optimizer))
    }
}

/// Atomically replace the checkpoint at `path`.
pub fn save(path: &Path, model: &SimilarityModel, optimizer: &Adam) -> Result<(), CheckpointError> {
    let write_err = |source: std::io::Error| CheckpointError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(write_err)?;
    let staged = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    {
        let mut writer = BufWriter::new(staged.as_file());
        serde_json::to_writer(
            &mut writer,
            &CheckpointRef {
                format_version: CHECKPOINT_FORMAT_VERSION,
                model: model.weights(),
                optimizer,
            },
        )
        .map_err(|source| CheckpointError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(write_err)?;
    }
    staged.as_file().sync_all().map_err(write_err)?;
    staged.persist(path).map_err(|err| write_err(err.error))?;
    Ok(())
}

/// Read a checkpoint written by [`save`].
pub fn load(path: &Path) -> Result<Checkpoint, CheckpointError> {
    let file = File::open(path).map_err(|source| CheckpointError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let checkpoint: Checkpoint =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| CheckpointError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    if checkpoint.format_version != CHECKPOINT_FORMAT_VERSION {
        return Err(CheckpointError::Version {
            found: checkpoint.format_version,
        });
    }
    Ok(checkpoint)
}
