//! # Operator Catalog (`ops`)
//!
//! Every node of a graph carries one [`Op`]. The set of operator kinds is closed:
//! this module is the single dispatch table mapping each kind to its
//! forward function, its adjoint (backward) function and its shape-inference
//! function. Adding a kind means adding a variant here and a row to each `match`.
//!
//! ## Structure:
//!
//! - **Leaves** (`Var`, `Const`, `Feed`, `State`) have no predecessors and are never
//!   evaluated; their values come from the collated stores, from caller buffers or
//!   from the recurrent state buffer.
//! - **Submodules** hold the kernels, grouped the same way as the catalog:
//!   [`arithmetic`], [`activation`], [`reduction`], [`shape`], [`switch`] and [`loss`].
//! - Kernels receive their predecessors as [`Operand`]s (value slice plus shape) and
//!   write into the node's own scratch buffer. Adjoint kernels *add* into the
//!   gradient buffers of the predecessors that require one.

use rand::rngs::StdRng;

use crate::error::NeuroGraphError;

pub mod activation;
pub mod arithmetic;
pub mod loss;
pub mod reduction;
pub mod shape;
pub mod switch;

#[cfg(test)]
mod reduction_test;

/// Operator kind of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Trainable leaf, stored in the Parameter store.
    Var,
    /// Fixed leaf, stored in the Constant store.
    Const,
    /// External data leaf; dimension 0 is the batch dimension.
    Feed,
    /// Recurrent state input; dimension 0 is the batch dimension.
    State,

    Add,
    Sub,
    Mul,
    /// `x · Wᵀ` with `x` of shape `[rows, n]` and `W` of shape `[m, n]`.
    CMul,
    MatMul,
    Square,
    OneMinus,

    Sigm,
    Tanh,
    Relu,
    Exp,
    Log,
    /// Softmax over the last dimension.
    Softmax,

    /// Elementwise mean of any number of same-shaped inputs.
    Avg,
    ReduceSum { axis: usize },
    ReduceMean { axis: usize },

    /// A zero entry in `dims` is inferred from the input length.
    Reshape { dims: Vec<usize> },
    Concat { axis: usize },
    Slice { axis: usize, start: usize, end: usize },

    Dropout { rate: f32 },
    /// Selects predecessor 0 in eval mode and predecessor 1 in train mode.
    Switch,

    Mse,
    CeBin,
    CeBinNeg,
    CeMulti,
}

/// A predecessor's value as seen by a kernel.
#[derive(Debug, Clone, Copy)]
pub struct Operand<'a> {
    pub data: &'a [f32],
    pub shape: &'a [usize],
}

/// Per-pass state handed to forward kernels.
pub struct ForwardCtx<'a> {
    pub is_train: bool,
    pub rng: &'a mut StdRng,
}

/// Everything an adjoint kernel may read.
pub struct Adjoint<'a> {
    pub inputs: &'a [Operand<'a>],
    pub value: &'a [f32],
    pub shape: &'a [usize],
    pub grad: &'a [f32],
    pub aux: &'a [f32],
    pub is_train: bool,
}

pub(crate) fn shape_len(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Element count of `shape`, or `None` when it overflows `usize`.
pub(crate) fn checked_shape_len(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

pub(crate) fn check_shape(name: &str, shape: &[usize]) -> Result<usize, NeuroGraphError> {
    checked_shape_len(shape).ok_or_else(|| {
        NeuroGraphError::ValidationError(format!("'{}' shape {:?} overflows the element count", name, shape))
    })
}

impl Op {
    /// Short lowercase name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Var => "var",
            Op::Const => "const",
            Op::Feed => "feed",
            Op::State => "state",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::CMul => "cmul",
            Op::MatMul => "matmul",
            Op::Square => "square",
            Op::OneMinus => "1minus",
            Op::Sigm => "sigm",
            Op::Tanh => "tanh",
            Op::Relu => "relu",
            Op::Exp => "exp",
            Op::Log => "log",
            Op::Softmax => "softmax",
            Op::Avg => "avg",
            Op::ReduceSum { .. } => "reduce_sum",
            Op::ReduceMean { .. } => "reduce_mean",
            Op::Reshape { .. } => "reshape",
            Op::Concat { .. } => "concat",
            Op::Slice { .. } => "slice",
            Op::Dropout { .. } => "dropout",
            Op::Switch => "switch",
            Op::Mse => "mse",
            Op::CeBin => "ce_bin",
            Op::CeBinNeg => "ce_bin_neg",
            Op::CeMulti => "ce_multi",
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Op::Var | Op::Const | Op::Feed | Op::State)
    }

    /// Leaves whose dimension 0 follows the batch size.
    pub fn is_batched_leaf(&self) -> bool {
        matches!(self, Op::Feed | Op::State)
    }

    /// Stable numeric code used by the persisted model layout.
    pub fn code(&self) -> u32 {
        match self {
            Op::Var => 0,
            Op::Const => 1,
            Op::Feed => 2,
            Op::State => 3,
            Op::Add => 10,
            Op::Sub => 11,
            Op::Mul => 12,
            Op::CMul => 13,
            Op::MatMul => 14,
            Op::Square => 15,
            Op::OneMinus => 16,
            Op::Sigm => 20,
            Op::Tanh => 21,
            Op::Relu => 22,
            Op::Exp => 23,
            Op::Log => 24,
            Op::Softmax => 25,
            Op::Avg => 30,
            Op::ReduceSum { .. } => 31,
            Op::ReduceMean { .. } => 32,
            Op::Reshape { .. } => 40,
            Op::Concat { .. } => 41,
            Op::Slice { .. } => 42,
            Op::Dropout { .. } => 50,
            Op::Switch => 51,
            Op::Mse => 60,
            Op::CeBin => 61,
            Op::CeBinNeg => 62,
            Op::CeMulti => 63,
        }
    }

    /// Integer and float parameters carried by the kind, in persisted order.
    pub fn params(&self) -> (Vec<i32>, Vec<f32>) {
        match self {
            Op::ReduceSum { axis } | Op::ReduceMean { axis } | Op::Concat { axis } => {
                (vec![*axis as i32], Vec::new())
            }
            Op::Reshape { dims } => (dims.iter().map(|&d| d as i32).collect(), Vec::new()),
            Op::Slice { axis, start, end } => {
                (vec![*axis as i32, *start as i32, *end as i32], Vec::new())
            }
            Op::Dropout { rate } => (Vec::new(), vec![*rate]),
            _ => (Vec::new(), Vec::new()),
        }
    }

    /// Inverse of [`Op::code`] and [`Op::params`].
    pub fn from_code(code: u32, ints: &[i32], floats: &[f32]) -> Result<Op, NeuroGraphError> {
        let corrupt = |what: &str| {
            NeuroGraphError::CorruptModel(format!("bad parameters for op code {}: {}", code, what))
        };
        let to_usize = |v: i32| usize::try_from(v).map_err(|_| corrupt("negative value"));
        let op = match code {
            0 => Op::Var,
            1 => Op::Const,
            2 => Op::Feed,
            3 => Op::State,
            10 => Op::Add,
            11 => Op::Sub,
            12 => Op::Mul,
            13 => Op::CMul,
            14 => Op::MatMul,
            15 => Op::Square,
            16 => Op::OneMinus,
            20 => Op::Sigm,
            21 => Op::Tanh,
            22 => Op::Relu,
            23 => Op::Exp,
            24 => Op::Log,
            25 => Op::Softmax,
            30 => Op::Avg,
            31 | 32 | 41 => {
                let [axis] = ints else {
                    return Err(corrupt("expected one axis"));
                };
                let axis = to_usize(*axis)?;
                match code {
                    31 => Op::ReduceSum { axis },
                    32 => Op::ReduceMean { axis },
                    _ => Op::Concat { axis },
                }
            }
            40 => Op::Reshape {
                dims: ints.iter().map(|&d| to_usize(d)).collect::<Result<_, _>>()?,
            },
            42 => {
                let [axis, start, end] = ints else {
                    return Err(corrupt("expected axis, start and end"));
                };
                Op::Slice {
                    axis: to_usize(*axis)?,
                    start: to_usize(*start)?,
                    end: to_usize(*end)?,
                }
            }
            50 => {
                let [rate] = floats else {
                    return Err(corrupt("expected a dropout rate"));
                };
                Op::Dropout { rate: *rate }
            }
            51 => Op::Switch,
            60 => Op::Mse,
            61 => Op::CeBin,
            62 => Op::CeBinNeg,
            63 => Op::CeMulti,
            other => {
                return Err(NeuroGraphError::CorruptModel(format!(
                    "unknown op code {}",
                    other
                )))
            }
        };
        Ok(op)
    }

    fn check_arity(&self, n: usize) -> Result<(), NeuroGraphError> {
        let ok = match self {
            Op::Var | Op::Const | Op::Feed | Op::State => n == 0,
            Op::Add | Op::Sub | Op::Mul | Op::CMul | Op::MatMul => n == 2,
            Op::Mse | Op::CeBin | Op::CeBinNeg | Op::CeMulti => n == 2,
            Op::Switch => n == 2,
            Op::Avg | Op::Concat { .. } => n >= 1,
            _ => n == 1,
        };
        if ok {
            Ok(())
        } else {
            Err(NeuroGraphError::ValidationError(format!(
                "operator '{}' cannot take {} predecessor(s)",
                self.name(),
                n
            )))
        }
    }

    /// Infers the output shape from the predecessors' shapes.
    pub fn infer_shape(&self, inputs: &[&[usize]]) -> Result<Vec<usize>, NeuroGraphError> {
        self.check_arity(inputs.len())?;
        match self {
            Op::Var | Op::Const | Op::Feed | Op::State => Err(NeuroGraphError::UnsupportedOperation(
                format!("leaf '{}' has no inferred shape", self.name()),
            )),
            Op::Add | Op::Sub | Op::Mul => arithmetic::broadcast_shape(self.name(), inputs[0], inputs[1]),
            Op::CMul => arithmetic::cmul_shape(inputs[0], inputs[1]),
            Op::MatMul => arithmetic::matmul_shape(inputs[0], inputs[1]),
            Op::Square
            | Op::OneMinus
            | Op::Sigm
            | Op::Tanh
            | Op::Relu
            | Op::Exp
            | Op::Log
            | Op::Softmax => Ok(inputs[0].to_vec()),
            Op::Dropout { rate } => switch::dropout_shape(inputs[0], *rate),
            Op::Avg | Op::Switch => reduction::same_shape(self.name(), inputs),
            Op::ReduceSum { axis } | Op::ReduceMean { axis } => reduction::reduce_shape(inputs[0], *axis),
            Op::Reshape { dims } => shape::reshape_shape(inputs[0], dims),
            Op::Concat { axis } => shape::concat_shape(inputs, *axis),
            Op::Slice { axis, start, end } => shape::slice_shape(inputs[0], *axis, *start, *end),
            Op::Mse | Op::CeBin | Op::CeBinNeg | Op::CeMulti => loss::cost_shape(self.name(), inputs[0], inputs[1]),
        }
    }

    /// Computes the node value from its predecessors.
    pub fn forward(
        &self,
        ctx: &mut ForwardCtx<'_>,
        inputs: &[Operand<'_>],
        out: &mut [f32],
        aux: &mut Vec<f32>,
    ) -> Result<(), NeuroGraphError> {
        match self {
            Op::Var | Op::Const | Op::Feed | Op::State => {
                return Err(NeuroGraphError::InternalError(format!(
                    "leaf '{}' cannot be evaluated",
                    self.name()
                )))
            }
            Op::Add => arithmetic::add_forward(inputs, out),
            Op::Sub => arithmetic::sub_forward(inputs, out),
            Op::Mul => arithmetic::mul_forward(inputs, out),
            Op::CMul => arithmetic::cmul_forward(inputs, out),
            Op::MatMul => arithmetic::matmul_forward(inputs, out),
            Op::Square => arithmetic::square_forward(inputs, out),
            Op::OneMinus => arithmetic::one_minus_forward(inputs, out),
            Op::Sigm => activation::sigm_forward(inputs, out),
            Op::Tanh => activation::tanh_forward(inputs, out),
            Op::Relu => activation::relu_forward(inputs, out),
            Op::Exp => activation::exp_forward(inputs, out),
            Op::Log => activation::log_forward(inputs, out),
            Op::Softmax => activation::softmax_forward(inputs, out),
            Op::Avg => reduction::avg_forward(inputs, out),
            Op::ReduceSum { axis } => reduction::reduce_forward(inputs, *axis, false, out),
            Op::ReduceMean { axis } => reduction::reduce_forward(inputs, *axis, true, out),
            Op::Reshape { .. } => shape::reshape_forward(inputs, out),
            Op::Concat { axis } => shape::concat_forward(inputs, *axis, out),
            Op::Slice { axis, start, end } => shape::slice_forward(inputs, *axis, *start, *end, out),
            Op::Dropout { rate } => switch::dropout_forward(ctx, *rate, inputs, out, aux),
            Op::Switch => switch::switch_forward(ctx, inputs, out),
            Op::Mse => loss::mse_forward(inputs, out),
            Op::CeBin => loss::ce_bin_forward(inputs, out),
            Op::CeBinNeg => loss::ce_bin_neg_forward(inputs, out),
            Op::CeMulti => loss::ce_multi_forward(inputs, out),
        }
        Ok(())
    }

    /// Adds the contribution of this node's gradient to its predecessors' gradients.
    ///
    /// `grads[k]` is `Some` exactly when predecessor `k` needs a gradient; it is
    /// sized like that predecessor's value.
    pub fn backward(
        &self,
        adj: &Adjoint<'_>,
        grads: &mut [Option<Vec<f32>>],
    ) -> Result<(), NeuroGraphError> {
        match self {
            Op::Var | Op::Const | Op::Feed | Op::State => {
                return Err(NeuroGraphError::InternalError(format!(
                    "leaf '{}' has no adjoint",
                    self.name()
                )))
            }
            Op::Add => arithmetic::add_backward(adj, 1.0, grads),
            Op::Sub => arithmetic::add_backward(adj, -1.0, grads),
            Op::Mul => arithmetic::mul_backward(adj, grads),
            Op::CMul => arithmetic::cmul_backward(adj, grads),
            Op::MatMul => arithmetic::matmul_backward(adj, grads),
            Op::Square => arithmetic::square_backward(adj, grads),
            Op::OneMinus => arithmetic::one_minus_backward(adj, grads),
            Op::Sigm => activation::sigm_backward(adj, grads),
            Op::Tanh => activation::tanh_backward(adj, grads),
            Op::Relu => activation::relu_backward(adj, grads),
            Op::Exp => activation::exp_backward(adj, grads),
            Op::Log => activation::log_backward(adj, grads),
            Op::Softmax => activation::softmax_backward(adj, grads),
            Op::Avg => reduction::avg_backward(adj, grads),
            Op::ReduceSum { axis } => reduction::reduce_backward(adj, *axis, false, grads),
            Op::ReduceMean { axis } => reduction::reduce_backward(adj, *axis, true, grads),
            Op::Reshape { .. } => shape::reshape_backward(adj, grads),
            Op::Concat { axis } => shape::concat_backward(adj, *axis, grads),
            Op::Slice { axis, start, end } => shape::slice_backward(adj, *axis, *start, *end, grads),
            Op::Dropout { .. } => switch::dropout_backward(adj, grads),
            Op::Switch => switch::switch_backward(adj, grads),
            Op::Mse => loss::mse_backward(adj, grads),
            Op::CeBin => loss::ce_bin_backward(adj, grads),
            Op::CeBinNeg => loss::ce_bin_neg_backward(adj, grads),
            Op::CeMulti => loss::ce_multi_backward(adj, grads),
        }
        Ok(())
    }
}
