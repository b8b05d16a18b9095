// neurograph-core/src/ops/shape.rs

use super::reduction::split_axis;
use super::{shape_len, Adjoint, Operand};
use crate::error::NeuroGraphError;

/// Resolves `dims` against the input length. At most one entry may be 0; it is
/// replaced by whatever makes the lengths agree.
pub(crate) fn reshape_shape(input: &[usize], dims: &[usize]) -> Result<Vec<usize>, NeuroGraphError> {
    let total = shape_len(input);
    let zeros = dims.iter().filter(|&&d| d == 0).count();
    let known = dims
        .iter()
        .filter(|&&d| d != 0)
        .try_fold(1usize, |acc, &d| acc.checked_mul(d));
    let mismatch = || NeuroGraphError::ShapeMismatch {
        expected: input.to_vec(),
        actual: dims.to_vec(),
        operation: "reshape".to_string(),
    };
    let Some(known) = known else {
        return Err(mismatch());
    };
    match zeros {
        0 if known == total => Ok(dims.to_vec()),
        1 if known != 0 && total % known == 0 => Ok(dims
            .iter()
            .map(|&d| if d == 0 { total / known } else { d })
            .collect()),
        0 | 1 => Err(mismatch()),
        _ => Err(NeuroGraphError::ValidationError(format!(
            "reshape can infer at most one dimension, got {:?}",
            dims
        ))),
    }
}

pub(crate) fn concat_shape(inputs: &[&[usize]], axis: usize) -> Result<Vec<usize>, NeuroGraphError> {
    let first = inputs[0];
    if axis >= first.len() {
        return Err(NeuroGraphError::ValidationError(format!(
            "concat axis {} out of range for shape {:?}",
            axis, first
        )));
    }
    let mut out = first.to_vec();
    for s in &inputs[1..] {
        let compatible = s.len() == first.len()
            && s.iter().zip(first).enumerate().all(|(d, (a, b))| d == axis || a == b);
        if !compatible {
            return Err(NeuroGraphError::ShapeMismatch {
                expected: first.to_vec(),
                actual: s.to_vec(),
                operation: "concat".to_string(),
            });
        }
        out[axis] += s[axis];
    }
    Ok(out)
}

pub(crate) fn slice_shape(
    input: &[usize],
    axis: usize,
    start: usize,
    end: usize,
) -> Result<Vec<usize>, NeuroGraphError> {
    if axis >= input.len() || start >= end || end > input[axis] {
        return Err(NeuroGraphError::ValidationError(format!(
            "slice [{}, {}) on axis {} is invalid for shape {:?}",
            start, end, axis, input
        )));
    }
    let mut out = input.to_vec();
    out[axis] = end - start;
    Ok(out)
}

pub(crate) fn reshape_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    out.copy_from_slice(&inputs[0].data[..out.len()]);
}

pub(crate) fn reshape_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    if let Some(gx) = grads[0].as_mut() {
        gx.iter_mut().zip(adj.grad).for_each(|(d, &g)| *d += g);
    }
}

pub(crate) fn concat_forward(inputs: &[Operand<'_>], axis: usize, out: &mut [f32]) {
    let (outer, _, inner) = split_axis(inputs[0].shape, axis);
    let mut pos = 0;
    for o in 0..outer {
        for x in inputs {
            let block = x.shape[axis] * inner;
            out[pos..pos + block].copy_from_slice(&x.data[o * block..(o + 1) * block]);
            pos += block;
        }
    }
}

pub(crate) fn concat_backward(adj: &Adjoint<'_>, axis: usize, grads: &mut [Option<Vec<f32>>]) {
    let (outer, _, inner) = split_axis(adj.inputs[0].shape, axis);
    let mut pos = 0;
    for o in 0..outer {
        for (x, gx) in adj.inputs.iter().zip(grads.iter_mut()) {
            let block = x.shape[axis] * inner;
            if let Some(gx) = gx.as_mut() {
                let src = &adj.grad[pos..pos + block];
                gx[o * block..(o + 1) * block]
                    .iter_mut()
                    .zip(src)
                    .for_each(|(d, &g)| *d += g);
            }
            pos += block;
        }
    }
}

pub(crate) fn slice_forward(
    inputs: &[Operand<'_>],
    axis: usize,
    start: usize,
    end: usize,
    out: &mut [f32],
) {
    let x = inputs[0];
    let (outer, n, inner) = split_axis(x.shape, axis);
    let block = (end - start) * inner;
    for o in 0..outer {
        let from = (o * n + start) * inner;
        out[o * block..(o + 1) * block].copy_from_slice(&x.data[from..from + block]);
    }
}

pub(crate) fn slice_backward(
    adj: &Adjoint<'_>,
    axis: usize,
    start: usize,
    end: usize,
    grads: &mut [Option<Vec<f32>>],
) {
    let Some(gx) = grads[0].as_mut() else {
        return;
    };
    let (outer, n, inner) = split_axis(adj.inputs[0].shape, axis);
    let block = (end - start) * inner;
    for o in 0..outer {
        let to = (o * n + start) * inner;
        gx[to..to + block]
            .iter_mut()
            .zip(&adj.grad[o * block..(o + 1) * block])
            .for_each(|(d, &g)| *d += g);
    }
}
