// neurograph-core/src/ops/switch.rs

//! Operators that read the graph's train/eval bit.

use rand::Rng;

use super::{Adjoint, ForwardCtx, Operand};
use crate::error::NeuroGraphError;

pub(crate) fn dropout_shape(input: &[usize], rate: f32) -> Result<Vec<usize>, NeuroGraphError> {
    if !(0.0..1.0).contains(&rate) {
        return Err(NeuroGraphError::ValidationError(format!(
            "dropout rate must be in [0, 1), got {}",
            rate
        )));
    }
    Ok(input.to_vec())
}

/// In train mode each element survives with probability `1 - rate` and is scaled
/// by `1 / (1 - rate)`; the applied factors are kept in `aux` for the adjoint.
/// In eval mode the operator is the identity and `aux` is cleared.
pub(crate) fn dropout_forward(
    ctx: &mut ForwardCtx<'_>,
    rate: f32,
    inputs: &[Operand<'_>],
    out: &mut [f32],
    aux: &mut Vec<f32>,
) {
    let x = inputs[0].data;
    if !ctx.is_train || rate == 0.0 {
        aux.clear();
        out.copy_from_slice(&x[..out.len()]);
        return;
    }
    let scale = 1.0 / (1.0 - rate);
    aux.clear();
    aux.extend((0..out.len()).map(|_| {
        if ctx.rng.gen::<f32>() < rate {
            0.0
        } else {
            scale
        }
    }));
    for ((y, &v), &m) in out.iter_mut().zip(x).zip(aux.iter()) {
        *y = v * m;
    }
}

pub(crate) fn dropout_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    let Some(gx) = grads[0].as_mut() else {
        return;
    };
    if adj.is_train && adj.aux.len() == adj.grad.len() {
        for ((d, &g), &m) in gx.iter_mut().zip(adj.grad).zip(adj.aux) {
            *d += g * m;
        }
    } else {
        gx.iter_mut().zip(adj.grad).for_each(|(d, &g)| *d += g);
    }
}

fn selected(is_train: bool) -> usize {
    if is_train {
        1
    } else {
        0
    }
}

pub(crate) fn switch_forward(ctx: &ForwardCtx<'_>, inputs: &[Operand<'_>], out: &mut [f32]) {
    let x = inputs[selected(ctx.is_train)].data;
    out.copy_from_slice(&x[..out.len()]);
}

pub(crate) fn switch_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    if let Some(gx) = grads[selected(adj.is_train)].as_mut() {
        gx.iter_mut().zip(adj.grad).for_each(|(d, &g)| *d += g);
    }
}
