//! Plain-text per-epoch training log kept next to the checkpoint.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::train::{EpochMetrics, TrainingReport};

/// One line per epoch, in the layout written to `Metrics.txt`.
pub fn format_epoch_line(metrics: &EpochMetrics) -> String {
    format!(
        "Epoch: {} | Train Loss: {:.5} | Valid Loss: {:.5} | Train Accs : {:.5} | Valid Accs : {:.5} | Time: {:.2} seconds",
        metrics.epoch,
        metrics.train.loss,
        metrics.valid.loss,
        metrics.train.accuracy,
        metrics.valid.accuracy,
        metrics.elapsed.as_secs_f32()
    )
}

/// Line-buffered writer that flushes after every record so the log is
/// readable while training is still running.
pub struct MetricsLog {
    writer: BufWriter<File>,
}

impl MetricsLog {
    /// Create (or truncate) the log at `path`.
    pub fn create(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }

    pub fn epoch(&mut self, metrics: &EpochMetrics) -> std::io::Result<()> {
        writeln!(self.writer, "{}", format_epoch_line(metrics))?;
        self.writer.flush()
    }

    pub fn early_stop(&mut self, epoch: usize) -> std::io::Result<()> {
        writeln!(self.writer, "Early Stopping at Epoch {epoch}")?;
        self.writer.flush()
    }

    pub fn summary(&mut self, report: &TrainingReport) -> std::io::Result<()> {
        writeln!(self.writer)?;
        if let Some(epoch) = report.best_loss_epoch {
            writeln!(self.writer, "-----> Best Validation Loss at Epoch {epoch}")?;
        }
        if let Some(epoch) = report.best_accuracy_epoch {
            writeln!(self.writer, "-----> Best Validation Accs at Epoch {epoch}")?;
        }
        writeln!(
            self.writer,
            "Time Taken [{} Epochs] : {:.2} minutes",
            report.history.len(),
            report.elapsed.as_secs_f32() / 60.0
        )?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::train::PhaseMetrics;
    use std::time::Duration;
    use tempfile::tempdir;

    fn sample(epoch: usize) -> EpochMetrics {
        EpochMetrics {
            epoch,
            train: PhaseMetrics {
                loss: 0.5,
                accuracy: 0.75,
            },
            valid: PhaseMetrics {
                loss: 0.25,
                accuracy: 1.0,
            },
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn epoch_line_layout() {
        assert_eq!(
            format_epoch_line(&sample(3)),
            "Epoch: 3 | Train Loss: 0.50000 | Valid Loss: 0.25000 | Train Accs : 0.75000 | Valid Accs : 1.00000 | Time: 1.50 seconds"
        );
    }

    #[test]
    fn create_truncates_previous_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Checkpoints").join("Metrics.txt");
        {
            let mut log = MetricsLog::create(&path).unwrap();
            log.epoch(&sample(1)).unwrap();
            log.epoch(&sample(2)).unwrap();
        }
        let mut log = MetricsLog::create(&path).unwrap();
        log.epoch(&sample(1)).unwrap();
        log.early_stop(1).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with("Early Stopping at Epoch 1\n"));
    }
}
