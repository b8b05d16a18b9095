// neurograph-core/src/ops/reduction.rs

use super::{shape_len, Adjoint, Operand};
use crate::error::NeuroGraphError;

pub(crate) fn same_shape(name: &str, inputs: &[&[usize]]) -> Result<Vec<usize>, NeuroGraphError> {
    let first = inputs[0];
    for s in &inputs[1..] {
        if *s != first {
            return Err(NeuroGraphError::ShapeMismatch {
                expected: first.to_vec(),
                actual: s.to_vec(),
                operation: name.to_string(),
            });
        }
    }
    Ok(first.to_vec())
}

pub(crate) fn reduce_shape(input: &[usize], axis: usize) -> Result<Vec<usize>, NeuroGraphError> {
    if axis >= input.len() {
        return Err(NeuroGraphError::ValidationError(format!(
            "reduction axis {} out of range for shape {:?}",
            axis, input
        )));
    }
    let mut out = input.to_vec();
    out.remove(axis);
    Ok(out)
}

/// Splits a shape around `axis` into (outer, axis length, inner).
pub(crate) fn split_axis(shape: &[usize], axis: usize) -> (usize, usize, usize) {
    let outer = shape_len(&shape[..axis]);
    let inner = shape_len(&shape[axis + 1..]);
    (outer, shape[axis], inner)
}

pub(crate) fn avg_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    let scale = 1.0 / inputs.len() as f32;
    out.iter_mut().for_each(|y| *y = 0.0);
    for x in inputs {
        out.iter_mut().zip(x.data).for_each(|(y, &v)| *y += v);
    }
    out.iter_mut().for_each(|y| *y *= scale);
}

pub(crate) fn avg_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    let scale = 1.0 / adj.inputs.len() as f32;
    for gx in grads.iter_mut().flatten() {
        gx.iter_mut().zip(adj.grad).for_each(|(d, &g)| *d += g * scale);
    }
}

pub(crate) fn reduce_forward(inputs: &[Operand<'_>], axis: usize, mean: bool, out: &mut [f32]) {
    let x = inputs[0];
    let (outer, n, inner) = split_axis(x.shape, axis);
    let scale = if mean && n > 0 { 1.0 / n as f32 } else { 1.0 };
    for o in 0..outer {
        for i in 0..inner {
            let mut s = 0.0;
            for k in 0..n {
                s += x.data[(o * n + k) * inner + i];
            }
            out[o * inner + i] = s * scale;
        }
    }
}

pub(crate) fn reduce_backward(
    adj: &Adjoint<'_>,
    axis: usize,
    mean: bool,
    grads: &mut [Option<Vec<f32>>],
) {
    let Some(gx) = grads[0].as_mut() else {
        return;
    };
    let (outer, n, inner) = split_axis(adj.inputs[0].shape, axis);
    let scale = if mean && n > 0 { 1.0 / n as f32 } else { 1.0 };
    for o in 0..outer {
        for i in 0..inner {
            let g = adj.grad[o * inner + i] * scale;
            for k in 0..n {
                gx[(o * n + k) * inner + i] += g;
            }
        }
    }
}
