// neurograph-core/src/graph.rs

//! Validated graphs and the [`Model`] interface shared by base and unrolled graphs.
//!
//! A [`Network`] is the node sequence plus the per-instance evaluation state
//! (batch size, mode bit, RNG, continuous-feeding state). A [`Store`] holds the
//! collated Parameter, Gradient and Constant arrays the nodes point into.
//! [`Graph`] owns both; [`Unrolled`](crate::unroll::Unrolled) owns a network and
//! borrows the store of the graph it was expanded from.

use std::iter;

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::autograd;
use crate::autograd::topo;
use crate::builder::GraphBuilder;
use crate::error::NeuroGraphError;
use crate::feed;
use crate::node::{Binding, FeedBuffer, Flags, Node, NodeId};
use crate::ops::{check_shape, Op};

/// Collated storage: trainable values `x`, their gradients `g` (parallel to `x`)
/// and constants `c`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Store {
    pub x: Vec<f32>,
    pub g: Vec<f32>,
    pub c: Vec<f32>,
}

/// Shapes the topologically ordered `nodes` take at batch size `batch`.
pub(crate) fn infer_dims(nodes: &[Node], batch: usize) -> Result<Vec<Vec<usize>>, NeuroGraphError> {
    let mut shapes: Vec<Vec<usize>> = Vec::with_capacity(nodes.len());
    for node in nodes {
        let shape = if node.op.is_leaf() {
            let mut shape = node.shape.clone();
            if node.op.is_batched_leaf() {
                if let Some(d0) = shape.first_mut() {
                    *d0 = batch;
                }
            }
            shape
        } else {
            let inputs: Vec<&[usize]> = node.preds.iter().map(|&p| shapes[p].as_slice()).collect();
            node.op.infer_shape(&inputs)?
        };
        check_shape(node.op.name(), &shape)?;
        shapes.push(shape);
    }
    Ok(shapes)
}

/// Node sequence in topological order plus evaluation state.
#[derive(Debug, Clone)]
pub struct Network {
    pub(crate) nodes: Vec<Node>,
    pub(crate) batch: usize,
    pub(crate) is_train: bool,
    pub(crate) rng: StdRng,
    /// `(state leaf, source node)` pairs copied after each pass while streaming.
    pub(crate) carries: Vec<(usize, usize)>,
    pub(crate) streaming: bool,
}

impl Network {
    /// Wraps laid-out nodes, computes gradient flow and sizes every buffer.
    pub(crate) fn from_nodes(
        mut nodes: Vec<Node>,
        rng: StdRng,
        carries: Vec<(usize, usize)>,
    ) -> Result<Network, NeuroGraphError> {
        for i in 0..nodes.len() {
            let back = match nodes[i].op {
                Op::Var => true,
                Op::Const | Op::Feed | Op::State => false,
                _ => nodes[i].preds.iter().any(|&p| nodes[p].back),
            };
            nodes[i].back = back;
        }
        let batch = nodes
            .iter()
            .find(|n| n.op.is_batched_leaf())
            .map(|n| n.shape[0])
            .unwrap_or(1);
        let mut net = Network {
            nodes,
            batch,
            is_train: false,
            rng,
            carries,
            streaming: false,
        };
        net.sync_dims(batch)?;
        Ok(net)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn batch_size(&self) -> usize {
        self.batch
    }

    pub fn is_train(&self) -> bool {
        self.is_train
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Sets dimension 0 of batched leaves, re-infers every operator shape and
    /// resizes (and zeroes) scratch buffers. Store offsets are untouched.
    ///
    /// Shapes are all inferred before any node changes, so on error the
    /// network keeps its previous batch size intact.
    pub(crate) fn sync_dims(&mut self, batch: usize) -> Result<(), NeuroGraphError> {
        let shapes = infer_dims(&self.nodes, batch)?;
        for (node, shape) in self.nodes.iter_mut().zip(shapes) {
            node.shape = shape;
            let len = node.len();
            node.binding.resize(len);
        }
        self.batch = batch;
        Ok(())
    }

    pub(crate) fn set_batch_size(&mut self, batch: usize) -> Result<(), NeuroGraphError> {
        if batch == 0 {
            return Err(NeuroGraphError::ConfigurationError(
                "batch size must be at least 1".to_string(),
            ));
        }
        if batch != self.batch {
            self.sync_dims(batch)?;
        }
        Ok(())
    }

    pub(crate) fn reset_states(&mut self) {
        for node in self.nodes.iter_mut().filter(|n| n.op == Op::State) {
            if let Binding::Scratch { value, .. } = &mut node.binding {
                value.iter_mut().for_each(|v| *v = 0.0);
            }
        }
    }

    /// Zero-dimensional COST node carrying `label`; the first one wins.
    pub(crate) fn cost_node(&self, label: i32) -> Result<usize, NeuroGraphError> {
        let matches: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.flags.contains(Flags::COST) && n.label == label && n.shape.is_empty())
            .map(|(i, _)| i)
            .collect();
        match matches.as_slice() {
            [] => Err(NeuroGraphError::NodeNotFound {
                flag: Flags::COST,
                label,
            }),
            [first] => Ok(*first),
            [first, ..] => {
                warn!(
                    "{} cost nodes carry label {}; using node {}",
                    matches.len(),
                    label,
                    first
                );
                Ok(*first)
            }
        }
    }

    /// Nodes to evaluate for `roots`, including recurrence sources while streaming.
    pub(crate) fn eval_mask(&self, roots: &[usize]) -> Vec<bool> {
        let mut all = roots.to_vec();
        if self.streaming {
            all.extend(self.carries.iter().map(|&(_, src)| src));
        }
        topo::ancestors(self.nodes.len(), &all, |i| self.nodes[i].preds.as_slice())
    }

    /// Value of a node held in the stores or in scratch. Feed leaves are read
    /// through the caller's buffer instead.
    pub(crate) fn value<'a>(&'a self, store: &'a Store, index: usize) -> Result<&'a [f32], NeuroGraphError> {
        let node = self.nodes.get(index).ok_or(NeuroGraphError::InvalidNode {
            index,
            len: self.nodes.len(),
        })?;
        match &node.binding {
            Binding::Param { offset, len } => Ok(&store.x[*offset..*offset + *len]),
            Binding::Const { offset, len } => Ok(&store.c[*offset..*offset + *len]),
            Binding::Scratch { value, .. } => Ok(value),
            Binding::External(_) => Err(NeuroGraphError::UnsupportedOperation(format!(
                "node {} is a feed leaf; read its bound buffer instead",
                index
            ))),
        }
    }
}

/// Operations available on any evaluable graph.
///
/// Implementors only expose their network and store; everything else is provided.
pub trait Model {
    fn network(&self) -> &Network;
    fn network_mut(&mut self) -> &mut Network;
    fn store(&self) -> &Store;
    fn split_mut(&mut self) -> (&mut Network, &mut Store);

    fn nodes(&self) -> &[Node] {
        self.network().nodes()
    }

    fn params(&self) -> &[f32] {
        &self.store().x
    }

    fn grads(&self) -> &[f32] {
        &self.store().g
    }

    fn consts(&self) -> &[f32] {
        &self.store().c
    }

    fn params_mut(&mut self) -> &mut [f32] {
        let store = self.split_mut().1;
        &mut store.x
    }

    fn consts_mut(&mut self) -> &mut [f32] {
        let store = self.split_mut().1;
        &mut store.c
    }

    /// Parameters for writing, gradients for reading.
    fn params_and_grads_mut(&mut self) -> (&mut [f32], &[f32]) {
        let store = self.split_mut().1;
        (&mut store.x, &store.g)
    }

    fn size_var(&self) -> usize {
        self.store().x.len()
    }

    fn size_const(&self) -> usize {
        self.store().c.len()
    }

    fn batch_size(&self) -> usize {
        self.network().batch_size()
    }

    /// Resizes batched leaves and scratch buffers. A change resets recurrent state.
    fn set_batch_size(&mut self, batch: usize) -> Result<(), NeuroGraphError> {
        self.network_mut().set_batch_size(batch)
    }

    /// Selects train (`true`) or eval (`false`) behaviour of switch operators.
    fn switch_mode(&mut self, is_train: bool) {
        self.network_mut().is_train = is_train;
    }

    fn is_train(&self) -> bool {
        self.network().is_train()
    }

    /// Reseeds the generator used by stochastic operators.
    fn seed(&mut self, seed: u64) {
        self.network_mut().rng = StdRng::seed_from_u64(seed);
    }

    /// True when some state leaf has a recurrence that can be unrolled.
    fn is_rnn(&self) -> bool {
        self.nodes().iter().any(|n| n.op == Op::State && n.pre.is_some())
    }

    /// Forward pass to the cost node with `label`, plus the reverse pass when
    /// `compute_gradients` is set. Returns the cost.
    fn cost(&mut self, label: i32, compute_gradients: bool) -> Result<f32, NeuroGraphError> {
        let (net, store) = self.split_mut();
        autograd::cost(net, store, label, compute_gradients)
    }

    /// Forward pass to every node matching `flag` and `label`; returns how many matched.
    fn eval(&mut self, flag: Flags, label: i32) -> Result<usize, NeuroGraphError> {
        let (net, store) = self.split_mut();
        autograd::eval(net, store, flag, label)
    }

    fn find(&self, flag: Flags, label: i32) -> Result<usize, NeuroGraphError> {
        feed::find(self.nodes(), flag, label)
    }

    fn find_all(&self, flag: Flags, label: i32) -> Vec<usize> {
        feed::find_all(self.nodes(), flag, label)
    }

    fn feed_dim(&self, flag: Flags, label: i32) -> Result<usize, NeuroGraphError> {
        feed::feed_dim(self.nodes(), flag, label)
    }

    /// Binds one buffer per matching feed leaf, in node order. Returns the match count.
    fn feed_bind(&mut self, flag: Flags, label: i32, buffers: Vec<FeedBuffer>) -> Result<usize, NeuroGraphError> {
        feed::feed_bind(&mut self.network_mut().nodes, flag, label, buffers)
    }

    fn dim_in(&self) -> Result<usize, NeuroGraphError> {
        self.feed_dim(Flags::INPUT, 0)
    }

    fn dim_out(&self) -> Result<usize, NeuroGraphError> {
        self.feed_dim(Flags::TRUTH, 0)
    }

    /// Zeroes recurrent state and starts carrying it from one call to the next.
    fn rnn_start(&mut self) {
        let net = self.network_mut();
        net.reset_states();
        net.streaming = true;
    }

    /// Stops carrying state and zeroes it.
    fn rnn_end(&mut self) {
        let net = self.network_mut();
        net.streaming = false;
        net.reset_states();
    }

    /// Value of a non-feed node from the last evaluation.
    fn value(&self, index: usize) -> Result<&[f32], NeuroGraphError> {
        self.network().value(self.store(), index)
    }

    /// `(errors, base)` over the last evaluation: for every cross-entropy cost
    /// node, rows whose truth is a distribution and whose prediction lies in
    /// [0, 1] count toward `base`; those whose argmaxes differ count as errors.
    fn class_error(&self) -> Result<(usize, usize), NeuroGraphError> {
        autograd::class_error(self.network(), self.store())
    }

    /// Evaluates the OUTPUT node on a single example and returns its value.
    ///
    /// Sets the batch size to 1 and rebinds the INPUT feed to a copy of `x`.
    fn apply1(&mut self, x: &[f32]) -> Result<&[f32], NeuroGraphError> {
        let out = self.find(Flags::OUTPUT, 0)?;
        self.set_batch_size(1)?;
        self.feed_bind(Flags::INPUT, 0, vec![crate::node::feed_buffer(x.to_vec())])?;
        {
            let (net, store) = self.split_mut();
            autograd::eval_at(net, store, &[out])?;
        }
        self.value(out)
    }
}

/// A validated graph owning its stores.
#[derive(Debug, Clone)]
pub struct Graph {
    pub(crate) net: Network,
    pub(crate) store: Store,
}

impl Graph {
    /// Keeps the nodes reachable from `cost` and `extra_roots`, orders them and
    /// lays out the stores. `cost` must be a zero-dimensional operator node; it
    /// receives the COST flag.
    pub fn new(builder: GraphBuilder, cost: NodeId, extra_roots: &[NodeId]) -> Result<Graph, NeuroGraphError> {
        let GraphBuilder { mut defs, mut rng } = builder;
        let n = defs.len();
        for id in iter::once(&cost).chain(extra_roots) {
            if id.0 >= n {
                return Err(NeuroGraphError::InvalidNode { index: id.0, len: n });
            }
        }
        let cost_def = &mut defs[cost.0];
        if !cost_def.shape.is_empty() || cost_def.op.is_leaf() {
            return Err(NeuroGraphError::ValidationError(format!(
                "cost node {} must be a zero-dimensional operator, got '{}' with shape {:?}",
                cost.0,
                cost_def.op.name(),
                cost_def.shape
            )));
        }
        cost_def.flags |= Flags::COST;

        let roots: Vec<usize> = iter::once(cost.0).chain(extra_roots.iter().map(|r| r.0)).collect();
        let order = topo::post_order(n, &roots, |i| defs[i].preds.as_slice(), |i| defs[i].pre);

        if let Some(&i) = order.iter().find(|&&i| defs[i].op == Op::State && defs[i].pre.is_none()) {
            return Err(NeuroGraphError::ValidationError(format!(
                "state leaf {} has no recurrence",
                i
            )));
        }

        let mut remap = vec![usize::MAX; n];
        for (new, &old) in order.iter().enumerate() {
            remap[old] = new;
        }

        let mut store = Store::default();
        let mut nodes = Vec::with_capacity(order.len());
        for &old in &order {
            let def = &mut defs[old];
            let values = std::mem::take(&mut def.values);
            let binding = match def.op {
                Op::Var => {
                    let offset = store.x.len();
                    store.x.extend_from_slice(&values);
                    Binding::Param { offset, len: values.len() }
                }
                Op::Const => {
                    let offset = store.c.len();
                    store.c.extend_from_slice(&values);
                    Binding::Const { offset, len: values.len() }
                }
                Op::Feed => Binding::External(None),
                _ => Binding::scratch(),
            };
            nodes.push(Node {
                op: def.op.clone(),
                shape: def.shape.clone(),
                flags: def.flags,
                label: def.label,
                preds: def.preds.iter().map(|&p| remap[p]).collect(),
                pre: def.pre.map(|p| remap[p]),
                binding,
                back: false,
            });
        }
        store.g = vec![0.0; store.x.len()];

        let carries = nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| node.pre.map(|p| (i, p)))
            .collect();
        let net = Network::from_nodes(nodes, StdRng::seed_from_u64(rng.gen()), carries)?;
        debug!(
            "graph built: {} of {} nodes kept, {} parameters, {} constants",
            net.nodes.len(),
            n,
            store.x.len(),
            store.c.len()
        );
        Ok(Graph { net, store })
    }

    /// Assembles a graph from already ordered nodes and their stores.
    pub(crate) fn from_parts(nodes: Vec<Node>, store: Store, rng: StdRng) -> Result<Graph, NeuroGraphError> {
        let carries = nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| node.pre.map(|p| (i, p)))
            .collect();
        let net = Network::from_nodes(nodes, rng, carries)?;
        Ok(Graph { net, store })
    }
}

impl Model for Graph {
    fn network(&self) -> &Network {
        &self.net
    }

    fn network_mut(&mut self) -> &mut Network {
        &mut self.net
    }

    fn store(&self) -> &Store {
        &self.store
    }

    fn split_mut(&mut self) -> (&mut Network, &mut Store) {
        (&mut self.net, &mut self.store)
    }
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod tests;
