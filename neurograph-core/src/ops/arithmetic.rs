// neurograph-core/src/ops/arithmetic.rs

//! Linear and elementwise arithmetic kernels.
//!
//! `Add`, `Sub` and `Mul` broadcast their second operand: its length must divide
//! the length of the first one, and element `i` of the output pairs `a[i]` with
//! `b[i % len(b)]`. This is how a bias of shape `[n]` is added to a batch `[B, n]`.

use super::{shape_len, Adjoint, Operand};
use crate::error::NeuroGraphError;

// --- Shape inference ---

pub(crate) fn broadcast_shape(
    name: &str,
    a: &[usize],
    b: &[usize],
) -> Result<Vec<usize>, NeuroGraphError> {
    let (n0, n1) = (shape_len(a), shape_len(b));
    if n1 == 0 || n0 % n1 != 0 {
        return Err(NeuroGraphError::ShapeMismatch {
            expected: a.to_vec(),
            actual: b.to_vec(),
            operation: name.to_string(),
        });
    }
    Ok(a.to_vec())
}

/// Rows of `x` are its first dimension (one row for rank <= 1).
fn rows_cols(shape: &[usize]) -> (usize, usize) {
    let len = shape_len(shape);
    let rows = if shape.len() <= 1 { 1 } else { shape[0] };
    if rows == 0 {
        (0, 0)
    } else {
        (rows, len / rows)
    }
}

pub(crate) fn cmul_shape(x: &[usize], w: &[usize]) -> Result<Vec<usize>, NeuroGraphError> {
    let (rows, cols) = rows_cols(x);
    if w.len() != 2 || w[1] != cols {
        return Err(NeuroGraphError::ShapeMismatch {
            expected: vec![w.first().copied().unwrap_or(0), cols],
            actual: w.to_vec(),
            operation: "cmul".to_string(),
        });
    }
    Ok(if x.len() <= 1 { vec![w[0]] } else { vec![rows, w[0]] })
}

pub(crate) fn matmul_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>, NeuroGraphError> {
    if a.len() != 2 || b.len() != 2 || a[1] != b[0] {
        return Err(NeuroGraphError::ShapeMismatch {
            expected: vec![a.get(1).copied().unwrap_or(0), b.get(1).copied().unwrap_or(0)],
            actual: b.to_vec(),
            operation: "matmul".to_string(),
        });
    }
    Ok(vec![a[0], b[1]])
}

// --- Forward ---

pub(crate) fn add_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    let (a, b) = (inputs[0].data, inputs[1].data);
    let n1 = b.len();
    for (i, y) in out.iter_mut().enumerate() {
        *y = a[i] + b[i % n1];
    }
}

pub(crate) fn sub_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    let (a, b) = (inputs[0].data, inputs[1].data);
    let n1 = b.len();
    for (i, y) in out.iter_mut().enumerate() {
        *y = a[i] - b[i % n1];
    }
}

pub(crate) fn mul_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    let (a, b) = (inputs[0].data, inputs[1].data);
    let n1 = b.len();
    for (i, y) in out.iter_mut().enumerate() {
        *y = a[i] * b[i % n1];
    }
}

pub(crate) fn cmul_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    let (x, w) = (inputs[0], inputs[1]);
    let (rows, cols) = rows_cols(x.shape);
    let m = w.shape[0];
    for r in 0..rows {
        let xr = &x.data[r * cols..(r + 1) * cols];
        for j in 0..m {
            let wj = &w.data[j * cols..(j + 1) * cols];
            out[r * m + j] = xr.iter().zip(wj).map(|(a, b)| a * b).sum();
        }
    }
}

pub(crate) fn matmul_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    let (a, b) = (inputs[0], inputs[1]);
    let (n, k, m) = (a.shape[0], a.shape[1], b.shape[1]);
    out.iter_mut().for_each(|y| *y = 0.0);
    for i in 0..n {
        for p in 0..k {
            let aip = a.data[i * k + p];
            if aip == 0.0 {
                continue;
            }
            for j in 0..m {
                out[i * m + j] += aip * b.data[p * m + j];
            }
        }
    }
}

pub(crate) fn square_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    for (y, &x) in out.iter_mut().zip(inputs[0].data) {
        *y = x * x;
    }
}

pub(crate) fn one_minus_forward(inputs: &[Operand<'_>], out: &mut [f32]) {
    for (y, &x) in out.iter_mut().zip(inputs[0].data) {
        *y = 1.0 - x;
    }
}

// --- Backward ---

/// Shared by `Add` (`sign = 1`) and `Sub` (`sign = -1`).
pub(crate) fn add_backward(adj: &Adjoint<'_>, sign: f32, grads: &mut [Option<Vec<f32>>]) {
    let g = adj.grad;
    if let Some(ga) = grads[0].as_mut() {
        ga.iter_mut().zip(g).for_each(|(d, &v)| *d += v);
    }
    if let Some(gb) = grads[1].as_mut() {
        let n1 = gb.len();
        for (i, &v) in g.iter().enumerate() {
            gb[i % n1] += sign * v;
        }
    }
}

pub(crate) fn mul_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    let (a, b) = (adj.inputs[0].data, adj.inputs[1].data);
    let n1 = b.len();
    let g = adj.grad;
    if let Some(ga) = grads[0].as_mut() {
        for (i, &v) in g.iter().enumerate() {
            ga[i] += v * b[i % n1];
        }
    }
    if let Some(gb) = grads[1].as_mut() {
        for (i, &v) in g.iter().enumerate() {
            gb[i % n1] += v * a[i];
        }
    }
}

pub(crate) fn cmul_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    let (x, w) = (adj.inputs[0], adj.inputs[1]);
    let (rows, cols) = rows_cols(x.shape);
    let m = w.shape[0];
    let g = adj.grad;
    if let Some(gx) = grads[0].as_mut() {
        for r in 0..rows {
            for j in 0..m {
                let grj = g[r * m + j];
                if grj == 0.0 {
                    continue;
                }
                let wj = &w.data[j * cols..(j + 1) * cols];
                for (d, &wv) in gx[r * cols..(r + 1) * cols].iter_mut().zip(wj) {
                    *d += grj * wv;
                }
            }
        }
    }
    if let Some(gw) = grads[1].as_mut() {
        for r in 0..rows {
            let xr = &x.data[r * cols..(r + 1) * cols];
            for j in 0..m {
                let grj = g[r * m + j];
                if grj == 0.0 {
                    continue;
                }
                for (d, &xv) in gw[j * cols..(j + 1) * cols].iter_mut().zip(xr) {
                    *d += grj * xv;
                }
            }
        }
    }
}

pub(crate) fn matmul_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    let (a, b) = (adj.inputs[0], adj.inputs[1]);
    let (n, k, m) = (a.shape[0], a.shape[1], b.shape[1]);
    let g = adj.grad;
    // dA = G · Bᵀ
    if let Some(ga) = grads[0].as_mut() {
        for i in 0..n {
            for p in 0..k {
                let mut s = 0.0;
                for j in 0..m {
                    s += g[i * m + j] * b.data[p * m + j];
                }
                ga[i * k + p] += s;
            }
        }
    }
    // dB = Aᵀ · G
    if let Some(gb) = grads[1].as_mut() {
        for i in 0..n {
            for p in 0..k {
                let aip = a.data[i * k + p];
                for j in 0..m {
                    gb[p * m + j] += aip * g[i * m + j];
                }
            }
        }
    }
}

pub(crate) fn square_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    if let Some(gx) = grads[0].as_mut() {
        let x = adj.inputs[0].data;
        for ((d, &v), &xv) in gx.iter_mut().zip(adj.grad).zip(x) {
            *d += 2.0 * xv * v;
        }
    }
}

pub(crate) fn one_minus_backward(adj: &Adjoint<'_>, grads: &mut [Option<Vec<f32>>]) {
    if let Some(gx) = grads[0].as_mut() {
        gx.iter_mut().zip(adj.grad).for_each(|(d, &v)| *d -= v);
    }
}
