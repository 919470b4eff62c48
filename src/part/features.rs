//! Feature pools of a part on disk.
//!
//! `features/manifest.json` records the anchor embedding and pool shapes;
//! each pool is a row-major little-endian `f32` blob.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedding::Embedding;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const POSITIVE_FILE: &str = "positive.f32le";
pub const NEGATIVE_FILE: &str = "negative.f32le";
const FORMAT_VERSION: u32 = 1;
const ENCODING: &str = "f32le";

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Feature I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid feature manifest {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid feature manifest: {0}")]
    InvalidManifest(String),
    #[error("Feature blob {path} holds {actual} values, expected {expected}")]
    SizeMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    encoding: String,
    dim: usize,
    anchor: Vec<f32>,
    positive_rows: usize,
    negative_rows: usize,
    files: ManifestFiles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestFiles {
    positive: String,
    negative: String,
}

/// Anchor embedding plus the positive and negative feature pools of a part.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturePools {
    pub anchor: Embedding,
    pub positive: Array2<f32>,
    pub negative: Array2<f32>,
}

impl FeaturePools {
    /// Stack equally sized embeddings into pools.
    pub fn from_rows(anchor: Embedding, positive: &[Embedding], negative: &[Embedding]) -> Result<Self, FeatureError> {
        Ok(Self {
            positive: stack(anchor.len(), positive)?,
            negative: stack(anchor.len(), negative)?,
            anchor,
        })
    }

    pub fn dim(&self) -> usize {
        self.anchor.len()
    }

    pub fn save(&self, dir: &Path) -> Result<(), FeatureError> {
        std::fs::create_dir_all(dir).map_err(|source| io_err(dir, source))?;
        write_f32le(&dir.join(POSITIVE_FILE), &self.positive)?;
        write_f32le(&dir.join(NEGATIVE_FILE), &self.negative)?;
        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            encoding: ENCODING.to_string(),
            dim: self.dim(),
            anchor: self.anchor.as_slice().to_vec(),
            positive_rows: self.positive.nrows(),
            negative_rows: self.negative.nrows(),
            files: ManifestFiles {
                positive: POSITIVE_FILE.to_string(),
                negative: NEGATIVE_FILE.to_string(),
            },
        };
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_vec_pretty(&manifest).map_err(|source| FeatureError::Json {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|source| io_err(&path, source))
    }

    pub fn load(dir: &Path) -> Result<Self, FeatureError> {
        let path = dir.join(MANIFEST_FILE);
        let bytes = std::fs::read(&path).map_err(|source| io_err(&path, source))?;
        let manifest: Manifest = serde_json::from_slice(&bytes).map_err(|source| FeatureError::Json {
            path: path.clone(),
            source,
        })?;
        if manifest.format_version != FORMAT_VERSION || manifest.encoding != ENCODING {
            return Err(FeatureError::InvalidManifest(format!(
                "unsupported format {} / {}",
                manifest.format_version, manifest.encoding
            )));
        }
        if manifest.dim == 0 || manifest.anchor.len() != manifest.dim {
            return Err(FeatureError::InvalidManifest(format!(
                "anchor has {} values for dimension {}",
                manifest.anchor.len(),
                manifest.dim
            )));
        }
        let positive = read_f32le(&dir.join(&manifest.files.positive), manifest.positive_rows, manifest.dim)?;
        let negative = read_f32le(&dir.join(&manifest.files.negative), manifest.negative_rows, manifest.dim)?;
        Ok(Self {
            anchor: Embedding::new(manifest.anchor),
            positive,
            negative,
        })
    }
}

fn stack(dim: usize, rows: &[Embedding]) -> Result<Array2<f32>, FeatureError> {
    let mut out = Array2::<f32>::zeros((rows.len(), dim));
    for (mut row, embedding) in out.rows_mut().into_iter().zip(rows) {
        if embedding.len() != dim {
            return Err(FeatureError::InvalidManifest(format!(
                "embedding of length {} in a pool of dimension {dim}",
                embedding.len()
            )));
        }
        row.assign(&embedding.view());
    }
    Ok(out)
}

fn write_f32le(path: &Path, pool: &Array2<f32>) -> Result<(), FeatureError> {
    let file = File::create(path).map_err(|source| io_err(path, source))?;
    let mut writer = BufWriter::new(file);
    for value in pool.iter() {
        writer
            .write_all(&value.to_le_bytes())
            .map_err(|source| io_err(path, source))?;
    }
    writer.flush().map_err(|source| io_err(path, source))
}

fn read_f32le(path: &Path, rows: usize, dim: usize) -> Result<Array2<f32>, FeatureError> {
    let mut bytes = Vec::new();
    File::open(path)
        .and_then(|mut file| file.read_to_end(&mut bytes))
        .map_err(|source| io_err(path, source))?;
    let expected = rows * dim;
    if bytes.len() % 4 != 0 || bytes.len() / 4 != expected {
        return Err(FeatureError::SizeMismatch {
            path: path.to_path_buf(),
            expected,
            actual: bytes.len() / 4,
        });
    }
    let values: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Array2::from_shape_vec((rows, dim), values)
        .map_err(|err| FeatureError::InvalidManifest(err.to_string()))
}

fn io_err(path: &Path, source: std::io::Error) -> FeatureError {
    FeatureError::Io {
        path: path.to_path_buf(),
        source,
    }
}
