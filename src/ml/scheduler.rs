use crate::config::PlateauSettings;

use super::optim::Adam;

/// Learning-rate schedule stepped once per epoch with the validation loss.
pub trait LrScheduler {
    fn step(&mut self, validation_loss: f32, optimizer: &mut Adam);
}

/// Multiplies the learning rate by `factor` once the validation loss has not
/// improved for more than `patience` epochs.
#[derive(Debug, Clone)]
pub struct ReduceOnPlateau {
    factor: f32,
    patience: usize,
    min_lr: f32,
    best: f32,
    stale_epochs: usize,
}

impl ReduceOnPlateau {
    pub fn new(factor: f32, patience: usize, min_lr: f32) -> Self {
        Self {
            factor,
            patience,
            min_lr,
            best: f32::INFINITY,
            stale_epochs: 0,
        }
    }
}

impl From<&PlateauSettings> for ReduceOnPlateau {
    fn from(settings: &PlateauSettings) -> Self {
        Self::new(settings.factor, settings.patience, settings.min_lr)
    }
}

impl LrScheduler for ReduceOnPlateau {
    fn step(&mut self, validation_loss: f32, optimizer: &mut Adam) {
        if validation_loss < self.best {
            self.best = validation_loss;
            self.stale_epochs = 0;
            return;
        }
        self.stale_epochs += 1;
        if self.stale_epochs > self.patience {
            let reduced = (optimizer.learning_rate() * self.factor).max(self.min_lr);
            if reduced < optimizer.learning_rate() {
                tracing::info!(
                    "Reducing learning rate {:.2e} -> {:.2e}",
                    optimizer.learning_rate(),
                    reduced
                );
                optimizer.set_learning_rate(reduced);
            }
            self.stale_epochs = 0;
        }
    }
}
