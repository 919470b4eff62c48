use std::path::PathBuf;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

use super::checkpoint::{self, CheckpointError};
use super::dataset::PairDataset;
use super::loss::{batch_accuracy, bce_with_logits, contrastive_batch};
use super::metrics_log::{MetricsLog, format_epoch_line};
use super::model::SimilarityModel;
use super::optim::Adam;
use super::scheduler::LrScheduler;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("The {0} dataset is empty")]
    EmptyDataset(Phase),
    #[error("{phase} dataset has {actual}-dimensional embeddings but the model expects {expected}")]
    DimensionMismatch {
        phase: Phase,
        expected: usize,
        actual: usize,
    },
    #[error("Non-finite {phase} loss in epoch {epoch}")]
    NonFiniteLoss { epoch: usize, phase: Phase },
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("Failed to write metrics log {path}: {source}")]
    MetricsLog {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Which half of an epoch is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Valid,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Phase::Train => "training",
            Phase::Valid => "validation",
        })
    }
}

#[derive(Debug, Clone)]
pub struct FitOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub margin: f32,
    /// Stop once validation loss has failed to improve more than this many
    /// consecutive epochs.
    pub early_stopping: Option<usize>,
    /// Seed for the per-epoch training shuffle.
    pub seed: u64,
    /// Where to write the best checkpoint; `None` keeps it in memory only.
    pub checkpoint_path: Option<PathBuf>,
    /// Where to write the human-readable per-epoch log.
    pub metrics_path: Option<PathBuf>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 128,
            margin: super::loss::DEFAULT_MARGIN,
            early_stopping: None,
            seed: 42,
            checkpoint_path: None,
            metrics_path: None,
        }
    }
}

/// Mean loss and accuracy over the batches of one phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseMetrics {
    pub loss: f32,
    pub accuracy: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochMetrics {
    /// One-based epoch number.
    pub epoch: usize,
    pub train: PhaseMetrics,
    pub valid: PhaseMetrics,
    pub elapsed: Duration,
}

/// What the caller should do after an epoch has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochOutcome {
    /// Validation loss is strictly below every earlier epoch.
    pub improved_loss: bool,
    /// Early stopping patience is exhausted.
    pub stop: bool,
}

/// Per-run bookkeeping: history, best epochs and the early-stopping counter.
#[derive(Debug, Clone)]
pub struct TrainingState {
    history: Vec<EpochMetrics>,
    best_valid_loss: f32,
    best_loss_epoch: Option<usize>,
    best_valid_accuracy: f32,
    best_accuracy_epoch: Option<usize>,
    patience: Option<usize>,
    stale_epochs: usize,
    stopped_at: Option<usize>,
}

impl TrainingState {
    pub fn new(patience: Option<usize>) -> Self {
        Self {
            history: Vec::new(),
            best_valid_loss: f32::INFINITY,
            best_loss_epoch: None,
            best_valid_accuracy: 0.0,
            best_accuracy_epoch: None,
            patience: patience.filter(|&p| p > 0),
            stale_epochs: 0,
            stopped_at: None,
        }
    }

    pub fn record(&mut self, metrics: EpochMetrics) -> EpochOutcome {
        let epoch = metrics.epoch;
        let improved_loss = metrics.valid.loss < self.best_valid_loss;
        if improved_loss {
            self.best_valid_loss = metrics.valid.loss;
            self.best_loss_epoch = Some(epoch);
            self.stale_epochs = 0;
        } else {
            self.stale_epochs += 1;
        }
        if metrics.valid.accuracy > self.best_valid_accuracy {
            self.best_valid_accuracy = metrics.valid.accuracy;
            self.best_accuracy_epoch = Some(epoch);
        }
        self.history.push(metrics);

        let stop = self
            .patience
            .is_some_and(|patience| self.stale_epochs > patience);
        if stop {
            self.stopped_at = Some(epoch);
        }
        EpochOutcome {
            improved_loss,
            stop,
        }
    }

    pub fn history(&self) -> &[EpochMetrics] {
        &self.history
    }

    pub fn finish(self, elapsed: Duration) -> TrainingReport {
        TrainingReport {
            history: self.history,
            best_valid_loss: self.best_valid_loss,
            best_loss_epoch: self.best_loss_epoch,
            best_valid_accuracy: self.best_valid_accuracy,
            best_accuracy_epoch: self.best_accuracy_epoch,
            stopped_early_at: self.stopped_at,
            elapsed,
        }
    }
}

/// Result of a completed training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub history: Vec<EpochMetrics>,
    pub best_valid_loss: f32,
    pub best_loss_epoch: Option<usize>,
    pub best_valid_accuracy: f32,
    pub best_accuracy_epoch: Option<usize>,
    pub stopped_early_at: Option<usize>,
    pub elapsed: Duration,
}

impl TrainingReport {
    /// Lowest validation loss seen up to and including each epoch.
    pub fn best_loss_trace(&self) -> Vec<f32> {
        self.history
            .iter()
            .scan(f32::INFINITY, |best, metrics| {
                *best = best.min(metrics.valid.loss);
                Some(*best)
            })
            .collect()
    }
}

/// Dual-loss training over a pair dataset.
///
/// Each epoch runs a training pass (shuffled, with optimizer steps) and a
/// validation pass (sequential, loss only). The best validation loss is
/// checkpointed as soon as it is reached.
pub struct TrainingLoop {
    model: SimilarityModel,
    optimizer: Adam,
    scheduler: Option<Box<dyn LrScheduler>>,
    options: FitOptions,
}

impl TrainingLoop {
    pub fn new(model: SimilarityModel, optimizer: Adam, options: FitOptions) -> Self {
        Self {
            model,
            optimizer,
            scheduler: None,
            options,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Box<dyn LrScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn model(&self) -> &SimilarityModel {
        &self.model
    }

    pub fn into_parts(self) -> (SimilarityModel, Adam) {
        (self.model, self.optimizer)
    }

    pub fn run(&mut self, train: &PairDataset, valid: &PairDataset) -> Result<TrainingReport, TrainingError> {
        self.check_dataset(Phase::Train, train)?;
        self.check_dataset(Phase::Valid, valid)?;

        let started = Instant::now();
        let mut log = match &self.options.metrics_path {
            Some(path) => Some(MetricsLog::create(path).map_err(|source| TrainingError::MetricsLog {
                path: path.clone(),
                source,
            })?),
            None => None,
        };
        let mut state = TrainingState::new(self.options.early_stopping);
        let mut rng = StdRng::seed_from_u64(self.options.seed);
        tracing::info!(
            "Training on {} pairs, validating on {} pairs for up to {} epochs",
            train.len(),
            valid.len(),
            self.options.epochs
        );

        for epoch in 1..=self.options.epochs {
            let epoch_started = Instant::now();
            let train_metrics = self.run_phase(Phase::Train, train, Some(&mut rng), epoch)?;
            let valid_metrics = self.run_phase(Phase::Valid, valid, None, epoch)?;
            let metrics = EpochMetrics {
                epoch,
                train: train_metrics,
                valid: valid_metrics,
                elapsed: epoch_started.elapsed(),
            };
            let outcome = state.record(metrics.clone());
            if outcome.improved_loss
                && let Some(path) = &self.options.checkpoint_path
            {
                checkpoint::save(path, &self.model, &self.optimizer)?;
                tracing::debug!("Checkpointed epoch {epoch} to {}", path.display());
            }
            tracing::info!("{}", format_epoch_line(&metrics));
            if let Some(log) = log.as_mut() {
                log.epoch(&metrics).map_err(|source| self.log_error(source))?;
            }
            if outcome.stop {
                tracing::info!("Early stopping at epoch {epoch}");
                if let Some(log) = log.as_mut() {
                    log.early_stop(epoch).map_err(|source| self.log_error(source))?;
                }
                break;
            }
            if let Some(scheduler) = self.scheduler.as_mut() {
                scheduler.step(valid_metrics.loss, &mut self.optimizer);
            }
        }

        let report = state.finish(started.elapsed());
        if let Some(epoch) = report.best_loss_epoch {
            tracing::info!("Best validation loss {:.5} at epoch {epoch}", report.best_valid_loss);
        }
        if let Some(epoch) = report.best_accuracy_epoch {
            tracing::info!("Best validation accuracy {:.5} at epoch {epoch}", report.best_valid_accuracy);
        }
        if let Some(log) = log.as_mut() {
            log.summary(&report).map_err(|source| self.log_error(source))?;
        }
        Ok(report)
    }

    fn check_dataset(&self, phase: Phase, dataset: &PairDataset) -> Result<(), TrainingError> {
        if dataset.is_empty() {
            return Err(TrainingError::EmptyDataset(phase));
        }
        if dataset.dim() != self.model.input_dim() {
            return Err(TrainingError::DimensionMismatch {
                phase,
                expected: self.model.input_dim(),
                actual: dataset.dim(),
            });
        }
        Ok(())
    }

    fn run_phase(
        &mut self,
        phase: Phase,
        dataset: &PairDataset,
        rng: Option<&mut StdRng>,
        epoch: usize,
    ) -> Result<PhaseMetrics, TrainingError> {
        let order = dataset.order(rng);
        let batch_size = self.options.batch_size.max(1);
        let mut losses = Vec::with_capacity(order.len().div_ceil(batch_size));
        let mut accuracies = Vec::with_capacity(losses.capacity());
        for chunk in order.chunks(batch_size) {
            let batch = dataset.batch(chunk);
            let pass = self.model.forward(&batch);
            let (contrastive, grad_diff) =
                contrastive_batch(pass.diff.view(), batch.labels.view(), self.options.margin);
            let (bce, grad_logits) = bce_with_logits(pass.logits.view(), batch.labels.view());
            let loss = contrastive + bce;
            if !loss.is_finite() {
                return Err(TrainingError::NonFiniteLoss { epoch, phase });
            }
            if phase == Phase::Train {
                let grads = self.model.backward(&batch, &pass, &grad_diff, &grad_logits);
                self.optimizer.step(self.model.weights_mut(), &grads);
            }
            losses.push(loss);
            accuracies.push(batch_accuracy(pass.logits.view(), batch.labels.view()));
        }
        Ok(PhaseMetrics {
            loss: mean(&losses),
            accuracy: mean(&accuracies),
        })
    }

    fn log_error(&self, source: std::io::Error) -> TrainingError {
        TrainingError::MetricsLog {
            path: self.options.metrics_path.clone().unwrap_or_default(),
            source,
        }
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}
