// neurograph-data/src/trainer.rs

//! Mini-batch training of single-input, single-output feedforward models.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use neurograph_core::optim::{Optimizer, RmsProp, RmsPropHyperParams, RMSPROP_EPS};
use neurograph_core::{feed_buffer, FeedBuffer, Flags, Model, NeuroGraphError};

use crate::dataloader::DataLoader;
use crate::datasets::{Dataset, VecDataset};
use crate::samplers::{Sampler, SequentialSampler, SubsetRandomSampler};

/// Hyperparameters of [`train_fnn1`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub learning_rate: f32,
    pub mini_batch: usize,
    pub max_epochs: usize,
    /// Epochs without validation improvement tolerated before stopping.
    /// Also the number of warm-up epochs during which the streak is not counted.
    pub max_drop_streak: usize,
    /// Share of the examples held out for validation, in `[0, 1)`.
    pub validation_fraction: f32,
    /// RMSProp decay.
    pub decay: f32,
    pub grad_clip: Option<f32>,
    /// Fixes the shuffling; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            learning_rate: 0.001,
            mini_batch: 64,
            max_epochs: 25,
            max_drop_streak: 10,
            validation_fraction: 0.1,
            decay: 0.9,
            grad_clip: None,
            seed: None,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<(), NeuroGraphError> {
        if !(self.learning_rate > 0.0) {
            return Err(NeuroGraphError::ConfigurationError(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.mini_batch == 0 {
            return Err(NeuroGraphError::ConfigurationError(
                "mini-batch size must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(NeuroGraphError::ConfigurationError(format!(
                "validation fraction must lie in [0, 1), got {}",
                self.validation_fraction
            )));
        }
        if let Some(clip) = self.grad_clip {
            if !(clip > 0.0) {
                return Err(NeuroGraphError::ConfigurationError(format!(
                    "gradient clipping threshold must be positive, got {}",
                    clip
                )));
            }
        }
        Ok(())
    }

    fn hyper_params(&self) -> RmsPropHyperParams {
        RmsPropHyperParams {
            lr: self.learning_rate,
            decay: self.decay,
            eps: RMSPROP_EPS,
            clip: self.grad_clip,
        }
    }
}

/// Running sums over one pass.
#[derive(Debug, Default)]
struct PassStats {
    cost: f64,
    examples: usize,
    errors: usize,
    base: usize,
}

impl PassStats {
    fn mean_cost(&self) -> f32 {
        if self.examples == 0 {
            0.0
        } else {
            (self.cost / self.examples as f64) as f32
        }
    }

    fn class_error(&self) -> Option<f32> {
        (self.base > 0).then(|| self.errors as f32 / self.base as f32)
    }
}

/// Trains `model` on row-major `inputs` and `targets` and returns the number of
/// epochs run.
///
/// The model must expose one INPUT feed and one TRUTH feed (label 0) and a cost
/// node with label 0. Examples are shuffled once and a `validation_fraction`
/// share is held out. Every epoch runs RMSProp over shuffled mini-batches in
/// train mode, then measures the validation cost in eval mode. Training stops
/// after `max_epochs`, or earlier once the validation cost has failed to improve
/// `max_drop_streak` times past the warm-up. When a validation set exists, the
/// parameters and constants of the best validation epoch are restored.
///
/// The feeds are left bound to the trainer's internal buffers.
pub fn train_fnn1(
    model: &mut dyn Model,
    config: &TrainConfig,
    inputs: &[f32],
    targets: &[f32],
) -> Result<usize, NeuroGraphError> {
    config.validate()?;
    let n_in = model.dim_in()?;
    let n_out = model.dim_out()?;
    let data = VecDataset::new(inputs.to_vec(), n_in, targets.to_vec(), n_out)?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut order: Vec<usize> = (0..data.len()).collect();
    order.shuffle(&mut rng);
    let n_val = (data.len() as f64 * config.validation_fraction as f64) as usize;
    let (val_idx, train_idx) = order.split_at(n_val);
    if train_idx.is_empty() {
        return Err(NeuroGraphError::ValidationError(format!(
            "no training examples left out of {} after holding out {} for validation",
            data.len(),
            n_val
        )));
    }
    debug!(
        "train_fnn1: {} training and {} validation examples, {} -> {}",
        train_idx.len(),
        val_idx.len(),
        n_in,
        n_out
    );

    let mini = config.mini_batch.min(train_idx.len());
    let x_buf = feed_buffer(vec![0.0; mini * n_in]);
    let y_buf = feed_buffer(vec![0.0; mini * n_out]);
    model.feed_bind(Flags::INPUT, 0, vec![x_buf.clone()])?;
    model.feed_bind(Flags::TRUTH, 0, vec![y_buf.clone()])?;

    let train_sampler = match config.seed {
        Some(seed) => SubsetRandomSampler::with_seed(train_idx.to_vec(), seed),
        None => SubsetRandomSampler::new(train_idx.to_vec()),
    };
    let mut train_loader = DataLoader::new(&data, mini, train_sampler, false);
    let mut val_loader = DataLoader::new(&data, mini, SequentialSampler::over(val_idx.to_vec()), false);
    let mut optimizer = RmsProp::new(config.hyper_params())?;

    let mut best: Option<(Vec<f32>, Vec<f32>)> = None;
    let mut min_val_cost = f32::INFINITY;
    let mut drop_streak = 0;
    let mut epochs = 0;
    for epoch in 0..config.max_epochs {
        epochs = epoch + 1;

        model.switch_mode(true);
        train_loader.reset();
        let train = run_pass(model, &mut train_loader, &x_buf, &y_buf, Some(&mut optimizer))?;

        if val_idx.is_empty() {
            info!("epoch {}: training cost {:.6}", epochs, train.mean_cost());
            continue;
        }
        model.switch_mode(false);
        val_loader.reset();
        let val = run_pass(model, &mut val_loader, &x_buf, &y_buf, None)?;
        let val_cost = val.mean_cost();
        match val.class_error() {
            Some(err) => info!(
                "epoch {}: training cost {:.6}, validation cost {:.6}, class error {:.2}%",
                epochs,
                train.mean_cost(),
                val_cost,
                100.0 * err
            ),
            None => info!(
                "epoch {}: training cost {:.6}, validation cost {:.6}",
                epochs,
                train.mean_cost(),
                val_cost
            ),
        }

        if val_cost < min_val_cost {
            min_val_cost = val_cost;
            drop_streak = 0;
            best = Some((model.params().to_vec(), model.consts().to_vec()));
        } else if epoch >= config.max_drop_streak {
            drop_streak += 1;
            if drop_streak >= config.max_drop_streak {
                info!("stopping after {} epochs without improvement", drop_streak);
                break;
            }
        }
    }

    if let Some((params, consts)) = best {
        model.params_mut().copy_from_slice(&params);
        model.consts_mut().copy_from_slice(&consts);
        debug!("restored the parameters of validation cost {:.6}", min_val_cost);
    }
    model.switch_mode(false);
    Ok(epochs)
}

/// Feeds every batch of `loader` through the cost node; steps `optimizer` when given.
fn run_pass<S: Sampler>(
    model: &mut dyn Model,
    loader: &mut DataLoader<&VecDataset, S>,
    x_buf: &FeedBuffer,
    y_buf: &FeedBuffer,
    mut optimizer: Option<&mut RmsProp>,
) -> Result<PassStats, NeuroGraphError> {
    let mut stats = PassStats::default();
    loop {
        let filled = {
            let mut x = x_buf.write().map_err(|e| lock_error("input", e))?;
            let mut y = y_buf.write().map_err(|e| lock_error("truth", e))?;
            let filled = loader.next_into(&mut x, &mut y)?;
            filled
        };
        let Some(n) = filled else {
            break;
        };
        if model.batch_size() != n {
            model.set_batch_size(n)?;
        }
        let cost = model.cost(0, optimizer.is_some())?;
        if !cost.is_finite() {
            warn!("mini-batch cost is not finite: {}", cost);
        }
        match optimizer.as_deref_mut() {
            Some(opt) => opt.step(model)?,
            None => {
                let (errors, base) = model.class_error()?;
                stats.errors += errors;
                stats.base += base;
            }
        }
        stats.cost += cost as f64 * n as f64;
        stats.examples += n;
    }
    Ok(stats)
}

fn lock_error<E: std::fmt::Display>(feed: &str, e: E) -> NeuroGraphError {
    NeuroGraphError::LockError {
        lock_type: format!("{} feed buffer (write)", feed),
        reason: e.to_string(),
    }
}

#[cfg(test)]
#[path = "trainer_test.rs"]
mod tests;
