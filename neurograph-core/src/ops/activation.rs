// neurograph-core/src/ops/activation.rs

//! Elementwise nonlinearities and softmax.
//!
//! The adjoints of `sigm`, `tanh`, `exp` and `softmax` are written in terms of the
//! node's own output, which the evaluator keeps alive until the backward pass.

use super::{Adjoint, Operand};

pub(crate) fn sigm_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    for (y, &x) in out.iter_mut().zip(inputs[0].data) {
        *y = 1.0 / (1.0 + (-x).exp());
    }
}

pub(crate) fn tanh_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    for (y, &x) in out.iter_mut().zip(inputs[0].data) {
        *y = x.tanh();
    }
}

pub(crate) fn relu_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    for (y, &x) in out.iter_mut().zip(inputs[0].data) {
        *y = if x > 0.0 { x } else { 0.0 };
    }
}

pub(crate) fn exp_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    for (y, &x) in out.iter_mut().zip(inputs[0].data) {
        *y = x.exp();
    }
}

pub(crate) fn log_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    for (y, &x) in out.iter_mut().zip(inputs[0].data) {
        *y = x.ln();
    }
}

fn last_dim(shape: &[usize]) -> usize {
    shape.last().copied().unwrap_or(1).max(1)
}

/// Numerically stable softmax over each row of the last dimension.
pub(crate) fn softmax_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    let n = last_dim(inputs[0].shape);
    for (row_in, row_out) in inputs[0].data.chunks(n).zip(out.chunks_mut(n)) {
        let max = row_in.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for (y, &x) in row_out.iter_mut().zip(row_in) {
            *y = (x - max).exp();
            sum += *y;
        }
        let inv = 1.0 / sum;
        row_out.iter_mut().for_each(|y| *y *= inv);
    }
}

pub(crate) fn sigm_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    if let Some(gx) = grads[0].as_mut() {
        for ((d, &g), &y) in gx.iter_mut().zip(adj.grad).zip(adj.value) {
            *d += g * y * (1.0 - y);
        }
    }
}

pub(crate) fn tanh_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    if let Some(gx) = grads[0].as_mut() {
        for ((d, &g), &y) in gx.iter_mut().zip(adj.grad).zip(adj.value) {
            *d += g * (1.0 - y * y);
        }
    }
}

pub(crate) fn relu_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    if let Some(gx) = grads[0].as_mut() {
        for ((d, &g), &x) in gx.iter_mut().zip(adj.grad).zip(adj.inputs[0].data) {
            if x > 0.0 {
                *d += g;
            }
        }
    }
}

pub(crate) fn exp_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    if let Some(gx) = grads[0].as_mut() {
        for ((d, &g), &y) in gx.iter_mut().zip(adj.grad).zip(adj.value) {
            *d += g * y;
        }
    }
}

pub(crate) fn log_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    if let Some(gx) = grads[0].as_mut() {
        for ((d, &g), &x) in gx.iter_mut().zip(adj.grad).zip(adj.inputs[0].data) {
            *d += g / x;
        }
    }
}

pub(crate) fn softmax_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    let Some(gx) = grads[0].as_mut() else {
        return;
    };
    let n = last_dim(adj.shape);
    let rows = gx.chunks_mut(n).zip(adj.grad.chunks(n)).zip(adj.value.chunks(n));
    for ((d, g), y) in rows {
        let dot: f32 = g.iter().zip(y).map(|(a, b)| a * b).sum();
        for ((di, &gi), &yi) in d.iter_mut().zip(g).zip(y) {
            *di += yi * (gi - dot);
        }
    }
}
