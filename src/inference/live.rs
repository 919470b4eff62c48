use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::RgbImage;

use super::InferenceError;
use super::decision::{ConfidenceBand, Decision};
use super::session::InferenceSession;
use crate::capture::{FrameRead, FrameSource, StopHandle};

/// Receives every annotated frame of a live run.
pub trait FrameSink {
    fn present(&mut self, frame: &RgbImage, decision: &Decision) -> Result<(), InferenceError>;
}

/// Writes annotated frames as numbered PNG files.
#[derive(Debug)]
pub struct AnnotatedFrameWriter {
    dir: PathBuf,
    written: usize,
}

impl AnnotatedFrameWriter {
    pub fn create(dir: &Path) -> Result<Self, InferenceError> {
        std::fs::create_dir_all(dir).map_err(|source| InferenceError::Output {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl FrameSink for AnnotatedFrameWriter {
    fn present(&mut self, frame: &RgbImage, _decision: &Decision) -> Result<(), InferenceError> {
        let path = self.dir.join(format!("frame_{:05}.png", self.written));
        frame.save(&path).map_err(|source| InferenceError::Image { path, source })?;
        self.written += 1;
        Ok(())
    }
}

/// Counts gathered over a live run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSummary {
    pub frames: usize,
    pub missed: usize,
    pub matches: usize,
    pub possible_matches: usize,
    pub no_matches: usize,
}

impl LiveSummary {
    fn record(&mut self, band: ConfidenceBand) {
        self.frames += 1;
        match band {
            ConfidenceBand::Match => self.matches += 1,
            ConfidenceBand::PossibleMatch => self.possible_matches += 1,
            ConfidenceBand::NoMatch => self.no_matches += 1,
        }
    }
}

/// Releases the source however the loop ends.
struct OpenSource<'a>(&'a mut dyn FrameSource);

impl Drop for OpenSource<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Score frames from `source` until it is exhausted or `stop` is raised.
///
/// Each tick reads one frame, scores and annotates it, hands it to `sink`
/// and sleeps for whatever remains of `tick`. Missed frames are counted and
/// skipped.
pub fn run_live(
    session: &InferenceSession,
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    stop: &StopHandle,
    tick: Duration,
) -> Result<LiveSummary, InferenceError> {
    source.open()?;
    let mut source = OpenSource(source);
    let mut summary = LiveSummary::default();
    while !stop.is_stopped() {
        let started = Instant::now();
        match source.0.read() {
            FrameRead::Frame(frame) => {
                let annotated = session.annotate(&frame)?;
                let decision = &annotated.decision;
                if let Some(caption) = &decision.render.caption {
                    tracing::info!("Frame {}: {caption}", summary.frames);
                } else {
                    tracing::debug!("Frame {}: {} ({:.5})", summary.frames, decision.band, decision.probability);
                }
                sink.present(&annotated.image, decision)?;
                summary.record(decision.band);
            }
            FrameRead::Missed => {
                summary.missed += 1;
                tracing::debug!("Missed frame");
            }
            FrameRead::Exhausted => break,
        }
        if let Some(remaining) = tick.checked_sub(started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }
    tracing::info!(
        "Live run finished: {} frames ({} match, {} possible, {} no match), {} missed",
        summary.frames,
        summary.matches,
        summary.possible_matches,
        summary.no_matches,
        summary.missed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureError;
    use crate::config::InferenceSettings;
    use crate::ml::SimilarityModel;
    use crate::vision::{DescriptorExtractor, FeatureExtractor, embed_frame};
    use image::Rgb;

    struct ScriptedSource {
        script: Vec<Option<RgbImage>>,
        cursor: usize,
        open: bool,
        releases: usize,
    }

    impl FrameSource for ScriptedSource {
        fn open(&mut self) -> Result<(), CaptureError> {
            self.cursor = 0;
            self.open = true;
            Ok(())
        }

        fn read(&mut self) -> FrameRead {
            if !self.open || self.cursor >= self.script.len() {
                return FrameRead::Exhausted;
            }
            self.cursor += 1;
            match &self.script[self.cursor - 1] {
                Some(frame) => FrameRead::Frame(frame.clone()),
                None => FrameRead::Missed,
            }
        }

        fn release(&mut self) {
            if self.open {
                self.releases += 1;
            }
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    struct StopAfter {
        presented: usize,
        limit: usize,
        stop: StopHandle,
    }

    impl FrameSink for StopAfter {
        fn present(&mut self, _frame: &RgbImage, _decision: &Decision) -> Result<(), InferenceError> {
            self.presented += 1;
            if self.presented >= self.limit {
                self.stop.stop();
            }
            Ok(())
        }
    }

    fn session() -> InferenceSession {
        let extractor = DescriptorExtractor::default();
        let anchor = embed_frame(&extractor, &RgbImage::from_pixel(16, 16, Rgb([1, 2, 3]))).unwrap();
        let model = SimilarityModel::new(extractor.dim(), 4, 0);
        InferenceSession::new(model, anchor, None, InferenceSettings::default(), std::sync::Arc::new(extractor)).unwrap()
    }

    fn frame() -> RgbImage {
        RgbImage::from_pixel(16, 16, Rgb([50, 60, 70]))
    }

    #[test]
    fn missed_frames_are_skipped() {
        let mut source = ScriptedSource {
            script: vec![Some(frame()), None, Some(frame()), None],
            cursor: 0,
            open: false,
            releases: 0,
        };
        let stop = StopHandle::new();
        let mut sink = StopAfter {
            presented: 0,
            limit: usize::MAX,
            stop: stop.clone(),
        };
        let summary = run_live(&session(), &mut source, &mut sink, &stop, Duration::ZERO).unwrap();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.missed, 2);
        assert_eq!(summary.matches + summary.possible_matches + summary.no_matches, 2);
        assert!(!source.is_open());
        assert_eq!(source.releases, 1);
    }

    #[test]
    fn stop_handle_ends_the_loop_and_releases() {
        let mut source = ScriptedSource {
            script: vec![Some(frame()); 10],
            cursor: 0,
            open: false,
            releases: 0,
        };
        let stop = StopHandle::new();
        let mut sink = StopAfter {
            presented: 0,
            limit: 3,
            stop: stop.clone(),
        };
        let summary = run_live(&session(), &mut source, &mut sink, &stop, Duration::from_millis(1)).unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(source.releases, 1);
        stop.stop();
        source.release();
        assert_eq!(source.releases, 1);
    }

    #[test]
    fn writer_numbers_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = AnnotatedFrameWriter::create(&dir.path().join("out")).unwrap();
        let decision = crate::inference::decide(0.5, None, &InferenceSettings::default());
        writer.present(&frame(), &decision).unwrap();
        writer.present(&frame(), &decision).unwrap();
        assert_eq!(writer.written(), 2);
        assert!(dir.path().join("out").join("frame_00001.png").is_file());
    }
}
