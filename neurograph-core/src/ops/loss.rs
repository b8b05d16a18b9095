// neurograph-core/src/ops/loss.rs

//! Scalar cost operators.
//!
//! Predecessor 0 is the prediction and predecessor 1 the truth. Only `Mse` sends
//! a gradient to the truth operand; the cross-entropy costs treat it as data.

use super::{Adjoint, Operand};
use crate::error::NeuroGraphError;

const TINY: f32 = 1e-9;

pub(crate) fn cost_shape(name: &str, pred: &[usize], truth: &[usize]) -> Result<Vec<usize>, NeuroGraphError> {
    let (n0, n1): (usize, usize) = (pred.iter().product(), truth.iter().product());
    if n0 != n1 || n0 == 0 {
        return Err(NeuroGraphError::ShapeMismatch {
            expected: pred.to_vec(),
            actual: truth.to_vec(),
            operation: name.to_string(),
        });
    }
    Ok(Vec::new())
}

fn rows(shape: &[usize], n: usize) -> usize {
    let last = shape.last().copied().unwrap_or(1).max(1);
    (n / last).max(1)
}

/// `y1 * ln(y1 / max(y0, TINY))`, zero when the weight `y1` is zero.
fn kl_term(y1: f32, y0: f32) -> f32 {
    if y1 == 0.0 {
        0.0
    } else {
        y1 * (y1 / y0.max(TINY)).ln()
    }
}

fn kl_slope(y1: f32, y0: f32) -> f32 {
    if y1 == 0.0 {
        0.0
    } else {
        -y1 / y0.max(TINY)
    }
}

pub(crate) fn mse_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    let (y0, y1) = (inputs[0].data, inputs[1].data);
    let n = y0.len();
    let s: f32 = y0.iter().zip(y1).map(|(a, b)| (a - b) * (a - b)).sum();
    out[0] = s / n as f32;
}

pub(crate) fn mse_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    let (y0, y1) = (adj.inputs[0].data, adj.inputs[1].data);
    let scale = 2.0 * adj.grad[0] / y0.len() as f32;
    if let Some(g0) = grads[0].as_mut() {
        for ((d, &a), &b) in g0.iter_mut().zip(y0).zip(y1) {
            *d += scale * (a - b);
        }
    }
    if let Some(g1) = grads[1].as_mut() {
        for ((d, &a), &b) in g1.iter_mut().zip(y0).zip(y1) {
            *d -= scale * (a - b);
        }
    }
}

pub(crate) fn ce_bin_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    let (y0, y1) = (inputs[0].data, inputs[1].data);
    let s: f32 = y0
        .iter()
        .zip(y1)
        .map(|(&p, &t)| kl_term(t, p) + kl_term(1.0 - t, 1.0 - p))
        .sum();
    out[0] = s / y0.len() as f32;
}

pub(crate) fn ce_bin_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    let Some(g0) = grads[0].as_mut() else {
        return;
    };
    let (y0, y1) = (adj.inputs[0].data, adj.inputs[1].data);
    let scale = adj.grad[0] / y0.len() as f32;
    for ((d, &p), &t) in g0.iter_mut().zip(y0).zip(y1) {
        *d += scale * (kl_slope(t, p) - kl_slope(1.0 - t, 1.0 - p));
    }
}

/// Prediction and truth live in [-1, 1] and are mapped to [0, 1] first.
pub(crate) fn ce_bin_neg_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    let (y0, y1) = (inputs[0].data, inputs[1].data);
    let s: f32 = y0
        .iter()
        .zip(y1)
        .map(|(&p, &t)| {
            let (p, t) = (0.5 * (1.0 + p), 0.5 * (1.0 + t));
            kl_term(t, p) + kl_term(1.0 - t, 1.0 - p)
        })
        .sum();
    out[0] = s / y0.len() as f32;
}

pub(crate) fn ce_bin_neg_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    let Some(g0) = grads[0].as_mut() else {
        return;
    };
    let (y0, y1) = (adj.inputs[0].data, adj.inputs[1].data);
    let scale = 0.5 * adj.grad[0] / y0.len() as f32;
    for ((d, &p), &t) in g0.iter_mut().zip(y0).zip(y1) {
        let (p, t) = (0.5 * (1.0 + p), 0.5 * (1.0 + t));
        *d += scale * (kl_slope(t, p) - kl_slope(1.0 - t, 1.0 - p));
    }
}

/// Averaged over rows of the last dimension, not over elements.
pub(crate) fn ce_multi_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    let (y0, y1) = (inputs[0].data, inputs[1].data);
    let s: f32 = y0.iter().zip(y1).map(|(&p, &t)| kl_term(t, p)).sum();
    out[0] = s / rows(inputs[0].shape, y0.len()) as f32;
}

pub(crate) fn ce_multi_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    let Some(g0) = grads[0].as_mut() else {
        return;
    };
    let (y0, y1) = (adj.inputs[0].data, adj.inputs[1].data);
    let scale = adj.grad[0] / rows(adj.inputs[0].shape, y0.len()) as f32;
    for ((d, &p), &t) in g0.iter_mut().zip(y0).zip(y1) {
        *d += scale * kl_slope(t, p);
    }
}
