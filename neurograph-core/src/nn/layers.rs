// neurograph-core/src/nn/layers.rs

//! Common layers expressed as builder calls.
//!
//! Every recipe takes the builder and the incoming node and returns the node
//! carrying the layer's output. Weights are initialised from the builder's
//! generator with [`new_weight`]; biases start at zero.

use crate::builder::GraphBuilder;
use crate::error::NeuroGraphError;
use crate::node::{Flags, NodeId};
use crate::nn::init::{new_bias, new_weight};
use crate::ops::shape_len;

/// Cost attached by [`cost_layer`], each paired with its output activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostType {
    /// Identity output, mean squared error.
    Mse,
    /// Sigmoid output, binary cross-entropy.
    CeBin,
    /// Softmax output, multi-class cross-entropy.
    CeMulti,
    /// Tanh output, binary cross-entropy on values in [-1, 1].
    CeBinNeg,
}

/// `(rows, columns)` of a node, with rows taken from dimension 0.
fn rows_cols(b: &GraphBuilder, x: NodeId) -> Result<(usize, usize), NeuroGraphError> {
    let shape = b.shape(x)?;
    let len = shape_len(shape);
    match shape.len() {
        0 | 1 => Ok((1, len)),
        _ if shape[0] == 0 => Ok((0, 0)),
        _ => Ok((shape[0], len / shape[0])),
    }
}

/// Feed leaf of shape `[1, n]` flagged INPUT.
pub fn input(b: &mut GraphBuilder, n: usize) -> Result<NodeId, NeuroGraphError> {
    let x = b.feed(&[1, n])?;
    b.set_flags(x, Flags::INPUT)?;
    Ok(x)
}

/// `x · Wᵀ + b` with `W` of shape `[n_out, n_in]`.
pub fn linear(b: &mut GraphBuilder, x: NodeId, n_out: usize) -> Result<NodeId, NeuroGraphError> {
    let (_, n_in) = rows_cols(b, x)?;
    let w = new_weight(b, n_out, n_in)?;
    let bias = new_bias(b, n_out)?;
    let y = b.cmul(x, w)?;
    b.add(y, bias)
}

pub fn dropout(b: &mut GraphBuilder, x: NodeId, rate: f32) -> Result<NodeId, NeuroGraphError> {
    b.dropout(x, rate)
}

/// `x · Wᵀ + h · Uᵀ + bias`, the gate pre-activation shared by the recurrent cells.
fn gate(b: &mut GraphBuilder, x: NodeId, n_in: usize, h: NodeId, n: usize) -> Result<NodeId, NeuroGraphError> {
    let w = new_weight(b, n, n_in)?;
    let u = new_weight(b, n, n)?;
    let bias = new_bias(b, n)?;
    let xw = b.cmul(x, w)?;
    let hu = b.cmul(h, u)?;
    let s = b.add(xw, hu)?;
    b.add(s, bias)
}

/// Simple recurrent cell: `h_t = tanh(x_t · Wᵀ + h_{t-1} · Uᵀ + b)`.
pub fn rnn(b: &mut GraphBuilder, x: NodeId, n: usize) -> Result<NodeId, NeuroGraphError> {
    let (rows, n_in) = rows_cols(b, x)?;
    let h = b.state(&[rows.max(1), n])?;
    let pre = gate(b, x, n_in, h, n)?;
    let out = b.tanh(pre)?;
    b.set_recurrence(h, out)?;
    Ok(out)
}

/// Gated recurrent unit:
///
/// ```text
/// z = sigm(x·Wzᵀ + h·Uzᵀ + bz)
/// r = sigm(x·Wrᵀ + h·Urᵀ + br)
/// s = tanh(x·Wsᵀ + (r∘h)·Usᵀ + bs)
/// h' = (1 - z)∘h + z∘s
/// ```
pub fn gru(b: &mut GraphBuilder, x: NodeId, n: usize) -> Result<NodeId, NeuroGraphError> {
    let (rows, n_in) = rows_cols(b, x)?;
    let h = b.state(&[rows.max(1), n])?;

    let z_pre = gate(b, x, n_in, h, n)?;
    let z = b.sigm(z_pre)?;
    let r_pre = gate(b, x, n_in, h, n)?;
    let r = b.sigm(r_pre)?;
    let rh = b.mul(r, h)?;
    let s_pre = gate(b, x, n_in, rh, n)?;
    let s = b.tanh(s_pre)?;

    let keep = b.one_minus(z)?;
    let kept = b.mul(keep, h)?;
    let update = b.mul(z, s)?;
    let out = b.add(kept, update)?;
    b.set_recurrence(h, out)?;
    Ok(out)
}

/// Output layer plus cost.
///
/// Adds a linear map to `n_out` units, the activation matching `cost`
/// (flagged OUTPUT), a truth feed of the same shape (flagged TRUTH) and the
/// scalar cost node, which is returned. Pass it to
/// [`Graph::new`](crate::graph::Graph::new) to finish the model.
pub fn cost_layer(b: &mut GraphBuilder, x: NodeId, n_out: usize, cost: CostType) -> Result<NodeId, NeuroGraphError> {
    let (rows, _) = rows_cols(b, x)?;
    let t = linear(b, x, n_out)?;
    let out = match cost {
        CostType::Mse => t,
        CostType::CeBin => b.sigm(t)?,
        CostType::CeMulti => b.softmax(t)?,
        CostType::CeBinNeg => b.tanh(t)?,
    };
    b.set_flags(out, Flags::OUTPUT)?;
    let truth = b.feed(&[rows.max(1), n_out])?;
    b.set_flags(truth, Flags::TRUTH)?;
    match cost {
        CostType::Mse => b.mse(out, truth),
        CostType::CeBin => b.ce_bin(out, truth),
        CostType::CeMulti => b.ce_multi(out, truth),
        CostType::CeBinNeg => b.ce_bin_neg(out, truth),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, Model};
    use crate::node::feed_buffer;
    use crate::ops::Op;

    #[test]
    fn test_mlp_shapes_and_flags() -> Result<(), NeuroGraphError> {
        let mut b = GraphBuilder::with_seed(11);
        let x = input(&mut b, 4)?;
        let h = linear(&mut b, x, 8)?;
        let h = b.relu(h)?;
        let cost = cost_layer(&mut b, h, 3, CostType::CeMulti)?;
        assert!(b.shape(cost)?.is_empty());

        let g = Graph::new(b, cost, &[])?;
        assert_eq!(g.dim_in()?, 4);
        assert_eq!(g.dim_out()?, 3);
        assert_eq!(g.size_var(), 8 * 4 + 8 + 3 * 8 + 3);
        let out = g.find(Flags::OUTPUT, 0)?;
        assert_eq!(g.nodes()[out].op, Op::Softmax);
        assert!(!g.is_rnn());
        Ok(())
    }

    #[test]
    fn test_rnn_and_gru_are_recurrent() -> Result<(), NeuroGraphError> {
        for use_gru in [false, true] {
            let mut b = GraphBuilder::with_seed(5);
            let x = input(&mut b, 2)?;
            let h = if use_gru { gru(&mut b, x, 3)? } else { rnn(&mut b, x, 3)? };
            assert_eq!(b.shape(h)?, &[1, 3]);
            let cost = cost_layer(&mut b, h, 1, CostType::Mse)?;
            let mut g = Graph::new(b, cost, &[])?;
            assert!(g.is_rnn());
            let cells = if use_gru { 3 } else { 1 };
            assert_eq!(g.size_var(), cells * (3 * 2 + 3 * 3 + 3) + 3 + 1);

            g.feed_bind(Flags::INPUT, 0, vec![feed_buffer(vec![0.5, -0.5])])?;
            g.feed_bind(Flags::TRUTH, 0, vec![feed_buffer(vec![0.0])])?;
            let c = g.cost(0, true)?;
            assert!(c.is_finite());
        }
        Ok(())
    }

    #[test]
    fn test_ce_bin_output_lies_in_unit_interval() -> Result<(), NeuroGraphError> {
        let mut b = GraphBuilder::with_seed(2);
        let x = input(&mut b, 2)?;
        let cost = cost_layer(&mut b, x, 2, CostType::CeBin)?;
        let mut g = Graph::new(b, cost, &[])?;
        let y = g.apply1(&[10.0, -10.0])?;
        assert_eq!(y.len(), 2);
        assert!(y.iter().all(|&v| (0.0..=1.0).contains(&v)));
        Ok(())
    }
}
