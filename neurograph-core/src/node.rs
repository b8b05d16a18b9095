// neurograph-core/src/node.rs

//! Node model shared by the builder, the evaluator and the unroller.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::{Arc, RwLock};

use crate::ops::{shape_len, Op};

/// External-binding flags of a node. Bits are not exclusive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(u32);

impl Flags {
    pub const NONE: Flags = Flags(0);
    pub const INPUT: Flags = Flags(0x1);
    pub const OUTPUT: Flags = Flags(0x2);
    pub const TRUTH: Flags = Flags(0x4);
    pub const COST: Flags = Flags(0x8);

    /// True when every bit of `other` is set in `self`. The empty set is contained in anything.
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Flags {
        Flags(bits)
    }

    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let names = [
            (Flags::INPUT, "INPUT"),
            (Flags::OUTPUT, "OUTPUT"),
            (Flags::TRUTH, "TRUTH"),
            (Flags::COST, "COST"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        let unknown = self.0 & !0xf;
        if unknown != 0 {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{:#x}", unknown)?;
        }
        Ok(())
    }
}

/// Handle to a node created by a [`GraphBuilder`](crate::builder::GraphBuilder).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Caller-owned buffer aliased as a feed leaf's value.
pub type FeedBuffer = Arc<RwLock<Vec<f32>>>;

pub fn feed_buffer(data: Vec<f32>) -> FeedBuffer {
    Arc::new(RwLock::new(data))
}

/// Where a node's value (and gradient) live.
#[derive(Debug, Clone)]
pub enum Binding {
    /// Region of the Parameter store and the parallel Gradient region.
    Param { offset: usize, len: usize },
    /// Region of the Constant store.
    Const { offset: usize, len: usize },
    /// Buffers owned by the node itself, sized by shape and batch.
    Scratch {
        value: Vec<f32>,
        grad: Vec<f32>,
        aux: Vec<f32>,
    },
    /// Caller buffer installed by the feed binder.
    External(Option<FeedBuffer>),
}

impl Binding {
    pub(crate) fn scratch() -> Binding {
        Binding::Scratch {
            value: Vec::new(),
            grad: Vec::new(),
            aux: Vec::new(),
        }
    }

    /// Resizes scratch buffers to `len` and zeroes them.
    pub(crate) fn resize(&mut self, len: usize) {
        if let Binding::Scratch { value, grad, aux } = self {
            value.clear();
            value.resize(len, 0.0);
            grad.clear();
            grad.resize(len, 0.0);
            aux.clear();
        }
    }
}

/// One vertex of a computation graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub op: Op,
    pub shape: Vec<usize>,
    pub flags: Flags,
    pub label: i32,
    /// Predecessor indices; always smaller than this node's index.
    pub preds: Vec<usize>,
    /// For state leaves: the node whose value feeds this state at the next step.
    pub pre: Option<usize>,
    pub(crate) binding: Binding,
    /// Whether a gradient flows into this node.
    pub(crate) back: bool,
}

impl Node {
    pub fn len(&self) -> usize {
        shape_len(&self.shape)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of one example: `len / dim0` for rank > 1, `dim0` for rank 1 and 1 for scalars.
    pub fn example_len(&self) -> usize {
        match self.shape.len() {
            0 => 1,
            1 => self.shape[0],
            _ if self.shape[0] == 0 => 0,
            _ => self.len() / self.shape[0],
        }
    }

    pub fn requires_grad(&self) -> bool {
        self.back
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }
}
