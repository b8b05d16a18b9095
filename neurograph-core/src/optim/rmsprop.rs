use crate::error::NeuroGraphError;
use crate::graph::Model;
use crate::optim::grad_clipping::clip_grad_norm;
use crate::optim::optimizer_trait::Optimizer;

/// Added to the running mean of squared gradients before the square root.
pub const RMSPROP_EPS: f32 = 1e-6;

/// One RMSProp update over flat slices.
///
/// `accum = decay * accum + (1 - decay) * g^2`, then
/// `params -= rate * g / sqrt(accum + eps)` where `rate` is `per_param_rate[i]`
/// when given and `base_rate` otherwise.
pub fn rmsprop(
    base_rate: f32,
    per_param_rate: Option<&[f32]>,
    decay: f32,
    gradient: &[f32],
    params: &mut [f32],
    accum: &mut [f32],
) {
    rmsprop_with_eps(base_rate, per_param_rate, decay, RMSPROP_EPS, gradient, params, accum)
}

pub(crate) fn rmsprop_with_eps(
    base_rate: f32,
    per_param_rate: Option<&[f32]>,
    decay: f32,
    eps: f32,
    gradient: &[f32],
    params: &mut [f32],
    accum: &mut [f32],
) {
    for (i, ((p, r), &g)) in params.iter_mut().zip(accum.iter_mut()).zip(gradient).enumerate() {
        let rate = per_param_rate.map_or(base_rate, |rates| rates[i]);
        *r = (1.0 - decay) * g * g + decay * *r;
        *p -= rate * g / (eps + *r).sqrt();
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RmsPropHyperParams {
    pub lr: f32,
    pub decay: f32,
    pub eps: f32,
    /// Gradient L2-norm threshold applied before each update.
    pub clip: Option<f32>,
}

impl Default for RmsPropHyperParams {
    fn default() -> Self {
        RmsPropHyperParams {
            lr: 0.001,
            decay: 0.9,
            eps: RMSPROP_EPS,
            clip: None,
        }
    }
}

impl RmsPropHyperParams {
    pub fn validate(&self) -> Result<(), NeuroGraphError> {
        if self.lr <= 0.0 {
            return Err(NeuroGraphError::ConfigurationError("Learning rate must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&self.decay) {
            return Err(NeuroGraphError::ConfigurationError("decay must be in [0.0, 1.0)".to_string()));
        }
        if self.eps <= 0.0 {
            return Err(NeuroGraphError::ConfigurationError("Epsilon must be positive".to_string()));
        }
        if let Some(clip) = self.clip {
            if clip <= 0.0 {
                return Err(NeuroGraphError::ConfigurationError(
                    "Gradient clipping threshold must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// RMSProp over a model's whole Parameter store.
///
/// The accumulator is created on the first step and must keep the same length.
#[derive(Debug, Clone)]
pub struct RmsProp {
    hyper: RmsPropHyperParams,
    per_param_rate: Option<Vec<f32>>,
    accum: Vec<f32>,
    iterations: u64,
}

impl RmsProp {
    pub fn new(hyper: RmsPropHyperParams) -> Result<Self, NeuroGraphError> {
        hyper.validate()?;
        Ok(RmsProp {
            hyper,
            per_param_rate: None,
            accum: Vec::new(),
            iterations: 0,
        })
    }

    /// Replaces the base rate with one rate per parameter.
    pub fn with_param_rates(mut self, rates: Vec<f32>) -> Self {
        self.per_param_rate = Some(rates);
        self
    }

    pub fn hyper_params(&self) -> &RmsPropHyperParams {
        &self.hyper
    }

    pub fn set_lr(&mut self, lr: f32) -> Result<(), NeuroGraphError> {
        let hyper = RmsPropHyperParams { lr, ..self.hyper.clone() };
        hyper.validate()?;
        self.hyper = hyper;
        Ok(())
    }

    pub fn accumulator(&self) -> &[f32] {
        &self.accum
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }
}

impl Optimizer for RmsProp {
    fn step(&mut self, model: &mut dyn Model) -> Result<(), NeuroGraphError> {
        let (_, store) = model.split_mut();
        let n = store.x.len();
        if self.accum.is_empty() {
            self.accum = vec![0.0; n];
        }
        if self.accum.len() != n {
            return Err(NeuroGraphError::ConfigurationError(format!(
                "optimizer state covers {} parameters, model has {}",
                self.accum.len(),
                n
            )));
        }
        if let Some(rates) = &self.per_param_rate {
            if rates.len() != n {
                return Err(NeuroGraphError::ConfigurationError(format!(
                    "{} per-parameter rates given for {} parameters",
                    rates.len(),
                    n
                )));
            }
        }
        if let Some(threshold) = self.hyper.clip {
            clip_grad_norm(threshold, &mut store.g);
        }
        rmsprop_with_eps(
            self.hyper.lr,
            self.per_param_rate.as_deref(),
            self.hyper.decay,
            self.hyper.eps,
            &store.g,
            &mut store.x,
            &mut self.accum,
        );
        self.iterations += 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.accum.clear();
        self.iterations = 0;
    }
}
