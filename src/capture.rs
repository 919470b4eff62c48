//! Frame sources for live inference.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Failed to open frame source {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Frame source {0} holds no images")]
    Empty(PathBuf),
}

/// Outcome of one read.
#[derive(Debug)]
pub enum FrameRead {
    Frame(RgbImage),
    /// No frame this tick; the next read may succeed.
    Missed,
    /// The source is closed or has no more frames.
    Exhausted,
}

/// Cancellable, restartable frame sequence.
pub trait FrameSource {
    /// Start (or restart) the sequence from its beginning.
    fn open(&mut self) -> Result<(), CaptureError>;

    fn read(&mut self) -> FrameRead;

    /// Stop producing frames. Releasing a released source does nothing.
    fn release(&mut self);

    fn is_open(&self) -> bool;
}

/// Frames read from the image files of a directory in file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    dir: PathBuf,
    frames: Vec<PathBuf>,
    cursor: usize,
    open: bool,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            frames: Vec::new(),
            cursor: 0,
            open: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> Result<(), CaptureError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| CaptureError::Open {
            path: self.dir.clone(),
            source,
        })?;
        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg" | "bmp"))
            })
            .collect();
        if frames.is_empty() {
            return Err(CaptureError::Empty(self.dir.clone()));
        }
        frames.sort();
        tracing::debug!("Opened {} frames from {}", frames.len(), self.dir.display());
        self.frames = frames;
        self.cursor = 0;
        self.open = true;
        Ok(())
    }

    fn read(&mut self) -> FrameRead {
        if !self.open {
            return FrameRead::Exhausted;
        }
        let Some(path) = self.frames.get(self.cursor) else {
            return FrameRead::Exhausted;
        };
        self.cursor += 1;
        match image::open(path) {
            Ok(image) => FrameRead::Frame(image.to_rgb8()),
            Err(err) => {
                tracing::warn!("Skipping unreadable frame {}: {err}", path.display());
                FrameRead::Missed
            }
        }
    }

    fn release(&mut self) {
        if self.open {
            tracing::debug!("Released frame source {}", self.dir.display());
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Shared cancellation flag for a running loop.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::tempdir;

    fn write_frames(dir: &Path, count: u8) {
        for idx in 0..count {
            RgbImage::from_pixel(4, 4, Rgb([idx, 0, 0]))
                .save(dir.join(format!("frame_{idx:03}.png")))
                .unwrap();
        }
    }

    #[test]
    fn frames_come_in_name_order_and_restart_on_reopen() {
        let dir = tempdir().unwrap();
        write_frames(dir.path(), 3);
        let mut source = ImageSequenceSource::new(dir.path());
        source.open().unwrap();
        let mut seen = Vec::new();
        while let FrameRead::Frame(frame) = source.read() {
            seen.push(frame.get_pixel(0, 0)[0]);
        }
        assert_eq!(seen, vec![0, 1, 2]);

        source.open().unwrap();
        assert!(matches!(source.read(), FrameRead::Frame(frame) if frame.get_pixel(0, 0)[0] == 0));
    }

    #[test]
    fn release_is_idempotent_and_stops_reads() {
        let dir = tempdir().unwrap();
        write_frames(dir.path(), 2);
        let mut source = ImageSequenceSource::new(dir.path());
        source.open().unwrap();
        source.release();
        source.release();
        assert!(!source.is_open());
        assert!(matches!(source.read(), FrameRead::Exhausted));
    }

    #[test]
    fn corrupt_frames_are_missed_not_fatal() {
        let dir = tempdir().unwrap();
        write_frames(dir.path(), 1);
        std::fs::write(dir.path().join("frame_000b.png"), b"not a png").unwrap();
        let mut source = ImageSequenceSource::new(dir.path());
        source.open().unwrap();
        assert!(matches!(source.read(), FrameRead::Frame(_)));
        assert!(matches!(source.read(), FrameRead::Missed));
        assert!(matches!(source.read(), FrameRead::Exhausted));
    }

    #[test]
    fn empty_directory_cannot_be_opened() {
        let dir = tempdir().unwrap();
        let mut source = ImageSequenceSource::new(dir.path());
        assert!(matches!(source.open(), Err(CaptureError::Empty(_))));
    }

    #[test]
    fn stop_handle_is_shared_between_clones() {
        let handle = StopHandle::new();
        let clone = handle.clone();
        clone.stop();
        clone.stop();
        assert!(handle.is_stopped());
    }
}
