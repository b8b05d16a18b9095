//! Forward evaluation and reverse-mode differentiation over a [`Network`].
//!
//! Nodes are visited in index order for the forward pass and in reverse index
//! order for the adjoint pass; both passes are restricted to the ancestors of the
//! requested roots. Operator values and gradients live in each node's scratch
//! buffers; parameters and their gradients live in the collated [`Store`].

use std::sync::RwLockReadGuard;

use crate::error::NeuroGraphError;
use crate::graph::{Network, Store};
use crate::node::{Binding, Flags, Node};
use crate::ops::{Adjoint, ForwardCtx, Op, Operand};

pub mod grad_check;
pub(crate) mod topo;

/// A predecessor value, possibly held through a feed buffer's read lock.
enum Value<'a> {
    Slice(&'a [f32]),
    Feed(RwLockReadGuard<'a, Vec<f32>>, usize),
}

impl Value<'_> {
    fn as_slice(&self) -> &[f32] {
        match self {
            Value::Slice(s) => s,
            Value::Feed(guard, len) => &guard[..*len],
        }
    }
}

fn read<'a>(nodes: &'a [Node], store: &'a Store, index: usize) -> Result<Value<'a>, NeuroGraphError> {
    let node = &nodes[index];
    match &node.binding {
        Binding::Param { offset, len } => Ok(Value::Slice(&store.x[*offset..*offset + *len])),
        Binding::Const { offset, len } => Ok(Value::Slice(&store.c[*offset..*offset + *len])),
        Binding::Scratch { value, .. } => Ok(Value::Slice(value)),
        Binding::External(None) => Err(NeuroGraphError::UnboundFeed { node: index }),
        Binding::External(Some(buffer)) => {
            let guard = buffer.read().map_err(|e| NeuroGraphError::LockError {
                lock_type: "read".to_string(),
                reason: e.to_string(),
            })?;
            let needed = node.len();
            if guard.len() < needed {
                return Err(NeuroGraphError::FeedSizeMismatch {
                    node: index,
                    expected: needed,
                    actual: guard.len(),
                });
            }
            Ok(Value::Feed(guard, needed))
        }
    }
}

fn read_inputs<'a>(before: &'a [Node], store: &'a Store, preds: &[usize]) -> Result<Vec<Value<'a>>, NeuroGraphError> {
    preds.iter().map(|&p| read(before, store, p)).collect()
}

fn operands<'a>(before: &'a [Node], values: &'a [Value<'_>], preds: &[usize]) -> Vec<Operand<'a>> {
    values
        .iter()
        .zip(preds)
        .map(|(v, &p)| Operand {
            data: v.as_slice(),
            shape: &before[p].shape,
        })
        .collect()
}

/// Evaluates every masked operator node in topological order.
pub(crate) fn forward(net: &mut Network, store: &Store, mask: &[bool]) -> Result<(), NeuroGraphError> {
    let Network {
        nodes, rng, is_train, ..
    } = net;
    let mut ctx = ForwardCtx {
        is_train: *is_train,
        rng,
    };
    for i in 0..nodes.len() {
        if !mask[i] || nodes[i].op.is_leaf() {
            continue;
        }
        let (before, rest) = nodes.split_at_mut(i);
        let node = &mut rest[0];
        let values = read_inputs(before, store, &node.preds)?;
        let inputs = operands(before, &values, &node.preds);
        let Binding::Scratch { value, aux, .. } = &mut node.binding else {
            return Err(NeuroGraphError::InternalError(format!(
                "operator node {} has no scratch buffer",
                i
            )));
        };
        node.op.forward(&mut ctx, &inputs, value, aux)?;
    }
    Ok(())
}

/// Zeroes all gradients, seeds `root` with 1 and runs the adjoint rules in
/// reverse order, accumulating into predecessors that need a gradient.
pub(crate) fn backward(net: &mut Network, store: &mut Store, mask: &[bool], root: usize) -> Result<(), NeuroGraphError> {
    store.g.iter_mut().for_each(|g| *g = 0.0);
    for node in net.nodes.iter_mut() {
        if let Binding::Scratch { grad, .. } = &mut node.binding {
            grad.iter_mut().for_each(|g| *g = 0.0);
        }
    }
    match &mut net.nodes[root].binding {
        Binding::Scratch { grad, .. } if grad.len() == 1 => grad[0] = 1.0,
        _ => {
            return Err(NeuroGraphError::InternalError(format!(
                "node {} cannot be a differentiation root",
                root
            )))
        }
    }

    let is_train = net.is_train;
    let nodes = &mut net.nodes;
    for i in (0..nodes.len()).rev() {
        if !mask[i] || !nodes[i].back || nodes[i].op.is_leaf() {
            continue;
        }
        let (before, rest) = nodes.split_at_mut(i);
        let node = &rest[0];
        let Binding::Scratch { value, grad, aux } = &node.binding else {
            continue;
        };
        let pred_grads = {
            let values = read_inputs(before, store, &node.preds)?;
            let inputs = operands(before, &values, &node.preds);
            let mut pred_grads: Vec<Option<Vec<f32>>> = node
                .preds
                .iter()
                .map(|&p| before[p].back.then(|| vec![0.0; before[p].len()]))
                .collect();
            let adj = Adjoint {
                inputs: &inputs,
                value,
                shape: &node.shape,
                grad,
                aux,
                is_train,
            };
            node.op.backward(&adj, &mut pred_grads)?;
            pred_grads
        };
        for (&p, g) in node.preds.iter().zip(pred_grads) {
            let Some(g) = g else {
                continue;
            };
            let target: &mut [f32] = match &mut before[p].binding {
                Binding::Param { offset, len } => &mut store.g[*offset..*offset + *len],
                Binding::Scratch { grad, .. } => grad,
                _ => continue,
            };
            target.iter_mut().zip(&g).for_each(|(d, v)| *d += v);
        }
    }
    Ok(())
}

/// While streaming, copies each recurrence source into its state leaf.
pub(crate) fn carry_states(net: &mut Network, store: &Store) -> Result<(), NeuroGraphError> {
    if !net.streaming {
        return Ok(());
    }
    for k in 0..net.carries.len() {
        let (state, src) = net.carries[k];
        let next = read(&net.nodes, store, src)?.as_slice().to_vec();
        if let Binding::Scratch { value, .. } = &mut net.nodes[state].binding {
            let n = value.len().min(next.len());
            value[..n].copy_from_slice(&next[..n]);
        }
    }
    Ok(())
}

fn scalar(net: &Network, index: usize) -> Result<f32, NeuroGraphError> {
    match &net.nodes[index].binding {
        Binding::Scratch { value, .. } if !value.is_empty() => Ok(value[0]),
        _ => Err(NeuroGraphError::InternalError(format!(
            "node {} holds no scalar value",
            index
        ))),
    }
}

pub(crate) fn cost(
    net: &mut Network,
    store: &mut Store,
    label: i32,
    compute_gradients: bool,
) -> Result<f32, NeuroGraphError> {
    let root = net.cost_node(label)?;
    let mask = net.eval_mask(&[root]);
    forward(net, store, &mask)?;
    if compute_gradients {
        backward(net, store, &mask, root)?;
    }
    let c = scalar(net, root)?;
    carry_states(net, store)?;
    Ok(c)
}

/// Forward pass to the given roots, then the streaming carry.
pub(crate) fn eval_at(net: &mut Network, store: &Store, roots: &[usize]) -> Result<(), NeuroGraphError> {
    let mask = net.eval_mask(roots);
    forward(net, store, &mask)?;
    carry_states(net, store)
}

pub(crate) fn eval(net: &mut Network, store: &Store, flag: Flags, label: i32) -> Result<usize, NeuroGraphError> {
    let roots = crate::feed::find_all(&net.nodes, flag, label);
    if roots.is_empty() {
        return Err(NeuroGraphError::NodeNotFound { flag, label });
    }
    eval_at(net, store, &roots)?;
    Ok(roots.len())
}

fn argmax(row: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (k, &v) in row.iter().enumerate() {
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((k, v));
        }
    }
    best.map(|(k, _)| k)
}

fn read_owned(net: &Network, store: &Store, index: usize) -> Result<Vec<f32>, NeuroGraphError> {
    Ok(read(&net.nodes, store, index)?.as_slice().to_vec())
}

pub(crate) fn class_error(net: &Network, store: &Store) -> Result<(usize, usize), NeuroGraphError> {
    let (mut errors, mut base) = (0, 0);
    for node in &net.nodes {
        if !matches!(node.op, Op::CeBin | Op::CeMulti) || !node.shape.is_empty() {
            continue;
        }
        let pred_node = &net.nodes[node.preds[0]];
        let n = pred_node.shape.last().copied().unwrap_or(1).max(1);
        let pred = read_owned(net, store, node.preds[0])?;
        let truth = read_owned(net, store, node.preds[1])?;
        for (x, t) in pred.chunks(n).zip(truth.chunks(n)) {
            let t_sum: f32 = t.iter().sum();
            let t_min = t.iter().copied().fold(f32::INFINITY, f32::min);
            let x_min = x.iter().copied().fold(f32::INFINITY, f32::min);
            let x_max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            if t_sum == 1.0 && t_min >= 0.0 && x_min >= 0.0 && x_max <= 1.0 {
                base += 1;
                if argmax(x) != argmax(t) {
                    errors += 1;
                }
            }
        }
    }
    Ok((errors, base))
}

#[cfg(test)]
#[path = "autograd_test.rs"]
mod tests;
