// neurograph-core/src/builder.rs

//! Incremental graph construction.
//!
//! A [`GraphBuilder`] records node definitions in creation order, so every
//! predecessor already exists when a node is added. Shapes are inferred as soon
//! as an operator node is created; shape errors surface here rather than during
//! evaluation. [`Graph::new`](crate::graph::Graph::new) later keeps only the part
//! reachable from the cost node and lays out the stores.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::NeuroGraphError;
use crate::node::{Flags, NodeId};
use crate::ops::{check_shape, Op};

/// A node as recorded by the builder, before layout.
#[derive(Debug, Clone)]
pub(crate) struct NodeDef {
    pub(crate) op: Op,
    pub(crate) shape: Vec<usize>,
    pub(crate) flags: Flags,
    pub(crate) label: i32,
    pub(crate) preds: Vec<usize>,
    pub(crate) pre: Option<usize>,
    /// Initial contents of `Var` and `Const` leaves.
    pub(crate) values: Vec<f32>,
}

#[derive(Debug)]
pub struct GraphBuilder {
    pub(crate) defs: Vec<NodeDef>,
    pub(crate) rng: StdRng,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder {
            defs: Vec::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Builder whose initialisers and resulting graph RNG are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        GraphBuilder {
            defs: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Random generator used by the initialisers in [`crate::nn::init`].
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn shape(&self, id: NodeId) -> Result<&[usize], NeuroGraphError> {
        Ok(&self.def(id)?.shape)
    }

    fn def(&self, id: NodeId) -> Result<&NodeDef, NeuroGraphError> {
        self.defs.get(id.0).ok_or(NeuroGraphError::InvalidNode {
            index: id.0,
            len: self.defs.len(),
        })
    }

    fn def_mut(&mut self, id: NodeId) -> Result<&mut NodeDef, NeuroGraphError> {
        let len = self.defs.len();
        self.defs
            .get_mut(id.0)
            .ok_or(NeuroGraphError::InvalidNode { index: id.0, len })
    }

    fn push(&mut self, op: Op, shape: Vec<usize>, preds: Vec<usize>, values: Vec<f32>) -> NodeId {
        self.defs.push(NodeDef {
            op,
            shape,
            flags: Flags::NONE,
            label: 0,
            preds,
            pre: None,
            values,
        });
        NodeId(self.defs.len() - 1)
    }

    fn batched_leaf(&mut self, op: Op, shape: &[usize]) -> Result<NodeId, NeuroGraphError> {
        if shape.is_empty() || shape[0] == 0 {
            return Err(NeuroGraphError::ValidationError(format!(
                "{} leaf needs a non-zero batch dimension, got shape {:?}",
                op.name(),
                shape
            )));
        }
        check_shape(op.name(), shape)?;
        Ok(self.push(op, shape.to_vec(), Vec::new(), Vec::new()))
    }

    fn stored_leaf(&mut self, op: Op, shape: &[usize], values: Vec<f32>) -> Result<NodeId, NeuroGraphError> {
        if values.len() != check_shape(op.name(), shape)? {
            return Err(NeuroGraphError::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![values.len()],
                operation: op.name().to_string(),
            });
        }
        Ok(self.push(op, shape.to_vec(), Vec::new(), values))
    }

    /// External data leaf; `shape[0]` is the batch dimension.
    pub fn feed(&mut self, shape: &[usize]) -> Result<NodeId, NeuroGraphError> {
        self.batched_leaf(Op::Feed, shape)
    }

    /// Trainable leaf with its initial values.
    pub fn var(&mut self, shape: &[usize], values: Vec<f32>) -> Result<NodeId, NeuroGraphError> {
        self.stored_leaf(Op::Var, shape, values)
    }

    pub fn constant(&mut self, shape: &[usize], values: Vec<f32>) -> Result<NodeId, NeuroGraphError> {
        self.stored_leaf(Op::Const, shape, values)
    }

    /// Recurrent state input, zero until a recurrence carries a value into it.
    /// Wire it with [`set_recurrence`](Self::set_recurrence).
    pub fn state(&mut self, shape: &[usize]) -> Result<NodeId, NeuroGraphError> {
        self.batched_leaf(Op::State, shape)
    }

    /// Declares that `output`'s value becomes `state`'s value at the next time step.
    pub fn set_recurrence(&mut self, state: NodeId, output: NodeId) -> Result<(), NeuroGraphError> {
        let out_shape = self.def(output)?.shape.clone();
        let def = self.def_mut(state)?;
        if def.op != Op::State {
            return Err(NeuroGraphError::ValidationError(format!(
                "node {} is a '{}' node, only state leaves take a recurrence",
                state.0,
                def.op.name()
            )));
        }
        if def.shape != out_shape {
            return Err(NeuroGraphError::ShapeMismatch {
                expected: def.shape.clone(),
                actual: out_shape,
                operation: "recurrence".to_string(),
            });
        }
        def.pre = Some(output.0);
        Ok(())
    }

    /// Adds `flags` to the node's flag set.
    pub fn set_flags(&mut self, id: NodeId, flags: Flags) -> Result<(), NeuroGraphError> {
        self.def_mut(id)?.flags |= flags;
        Ok(())
    }

    pub fn set_label(&mut self, id: NodeId, label: i32) -> Result<(), NeuroGraphError> {
        self.def_mut(id)?.label = label;
        Ok(())
    }

    /// Adds an operator node over `preds`, inferring its shape.
    pub fn op(&mut self, op: Op, preds: &[NodeId]) -> Result<NodeId, NeuroGraphError> {
        if op.is_leaf() {
            return Err(NeuroGraphError::UnsupportedOperation(format!(
                "leaf '{}' must be created with its dedicated constructor",
                op.name()
            )));
        }
        let shape = {
            let shapes = preds
                .iter()
                .map(|&p| self.def(p).map(|d| d.shape.as_slice()))
                .collect::<Result<Vec<_>, _>>()?;
            op.infer_shape(&shapes)?
        };
        check_shape(op.name(), &shape)?;
        let preds = preds.iter().map(|p| p.0).collect();
        Ok(self.push(op, shape, preds, Vec::new()))
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Add, &[a, b])
    }

    pub fn sub(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Sub, &[a, b])
    }

    pub fn mul(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Mul, &[a, b])
    }

    /// `x · wᵀ`
    pub fn cmul(&mut self, x: NodeId, w: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::CMul, &[x, w])
    }

    pub fn matmul(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::MatMul, &[a, b])
    }

    pub fn square(&mut self, x: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Square, &[x])
    }

    pub fn one_minus(&mut self, x: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::OneMinus, &[x])
    }

    pub fn sigm(&mut self, x: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Sigm, &[x])
    }

    pub fn tanh(&mut self, x: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Tanh, &[x])
    }

    pub fn relu(&mut self, x: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Relu, &[x])
    }

    pub fn exp(&mut self, x: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Exp, &[x])
    }

    pub fn log(&mut self, x: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Log, &[x])
    }

    pub fn softmax(&mut self, x: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Softmax, &[x])
    }

    pub fn avg(&mut self, xs: &[NodeId]) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Avg, xs)
    }

    pub fn reduce_sum(&mut self, x: NodeId, axis: usize) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::ReduceSum { axis }, &[x])
    }

    pub fn reduce_mean(&mut self, x: NodeId, axis: usize) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::ReduceMean { axis }, &[x])
    }

    pub fn reshape(&mut self, x: NodeId, dims: &[usize]) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Reshape { dims: dims.to_vec() }, &[x])
    }

    pub fn concat(&mut self, xs: &[NodeId], axis: usize) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Concat { axis }, xs)
    }

    pub fn slice(&mut self, x: NodeId, axis: usize, start: usize, end: usize) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Slice { axis, start, end }, &[x])
    }

    pub fn dropout(&mut self, x: NodeId, rate: f32) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Dropout { rate }, &[x])
    }

    /// `eval` in eval mode, `train` in train mode.
    pub fn switch(&mut self, eval: NodeId, train: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Switch, &[eval, train])
    }

    pub fn mse(&mut self, pred: NodeId, truth: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::Mse, &[pred, truth])
    }

    pub fn ce_bin(&mut self, pred: NodeId, truth: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::CeBin, &[pred, truth])
    }

    pub fn ce_bin_neg(&mut self, pred: NodeId, truth: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::CeBinNeg, &[pred, truth])
    }

    pub fn ce_multi(&mut self, pred: NodeId, truth: NodeId) -> Result<NodeId, NeuroGraphError> {
        self.op(Op::CeMulti, &[pred, truth])
    }
}

#[cfg(test)]
#[path = "builder_test.rs"]
mod tests;
