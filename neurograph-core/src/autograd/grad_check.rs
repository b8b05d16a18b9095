use thiserror::Error;

use crate::error::NeuroGraphError;
use crate::graph::Model;

/// Error type specifically for gradient checking failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradCheckError {
    #[error("Gradient check failed for parameter {param_index}: analytical grad {analytical:?} != numerical grad {numerical:?}. Difference: {difference:?}")]
    GradientMismatch {
        param_index: usize,
        analytical: f64,
        numerical: f64,
        difference: f64,
    },
    #[error("Numerical gradient is NaN or infinite for parameter {param_index}. Cost+: {cost_plus:?}, Cost-: {cost_minus:?}")]
    NumericalGradNonFinite {
        param_index: usize,
        cost_plus: f64,
        cost_minus: f64,
    },
    #[error("Analytical gradient is NaN or infinite for parameter {param_index}: {value:?}")]
    AnalyticalGradNonFinite { param_index: usize, value: f64 },
    #[error("Epsilon must be positive, got {0}")]
    InvalidEpsilon(f32),
    #[error("Evaluation failed during gradient check: {0}")]
    Evaluation(#[from] NeuroGraphError),
}

/// Outcome of a passing check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradCheckSummary {
    pub checked: usize,
    /// Largest `|analytical - numerical| / max(1, |analytical|, |numerical|)` seen.
    pub max_error: f64,
}

/// Compares the reverse-mode gradient of the cost node `label` against
/// centered finite differences, one parameter at a time.
///
/// Each parameter is nudged by `±epsilon` and restored afterwards. A parameter
/// fails when its scaled difference exceeds `tolerance`. Stochastic operators
/// resample on every pass in train mode, so switch the model to eval mode first.
pub fn check_grad(
    model: &mut dyn Model,
    label: i32,
    epsilon: f32,
    tolerance: f64,
) -> Result<GradCheckSummary, GradCheckError> {
    if !(epsilon > 0.0) {
        return Err(GradCheckError::InvalidEpsilon(epsilon));
    }
    model.cost(label, true)?;
    let analytical: Vec<f32> = model.grads().to_vec();

    let mut max_error = 0.0f64;
    for (i, &a) in analytical.iter().enumerate() {
        let a = a as f64;
        if !a.is_finite() {
            return Err(GradCheckError::AnalyticalGradNonFinite { param_index: i, value: a });
        }
        let original = model.params()[i];

        model.params_mut()[i] = original + epsilon;
        let plus = model.cost(label, false);
        model.params_mut()[i] = original - epsilon;
        let minus = model.cost(label, false);
        model.params_mut()[i] = original;
        let (cost_plus, cost_minus) = (plus? as f64, minus? as f64);

        let numerical = (cost_plus - cost_minus) / (2.0 * epsilon as f64);
        if !numerical.is_finite() {
            return Err(GradCheckError::NumericalGradNonFinite {
                param_index: i,
                cost_plus,
                cost_minus,
            });
        }
        let difference = (a - numerical).abs();
        let scaled = difference / 1.0f64.max(a.abs()).max(numerical.abs());
        if scaled > tolerance {
            return Err(GradCheckError::GradientMismatch {
                param_index: i,
                analytical: a,
                numerical,
                difference,
            });
        }
        max_error = max_error.max(scaled);
    }
    Ok(GradCheckSummary {
        checked: analytical.len(),
        max_error,
    })
}
