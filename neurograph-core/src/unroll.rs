// neurograph-core/src/unroll.rs

//! Time-axis expansion of recurrent graphs.
//!
//! Nodes that depend on a feed or state leaf are time-variant and get one
//! replica per step; every other node is emitted once and shared, so the
//! unrolled network reuses the base graph's parameter and constant offsets.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{NeuroGraphError, UnrollError};
use crate::graph::{Graph, Model, Network, Store};
use crate::node::{Binding, Flags, Node};
use crate::ops::Op;

/// A time-expanded view of a [`Graph`]. It borrows the base graph's stores, so
/// training it trains the base graph.
#[derive(Debug)]
pub struct Unrolled<'a> {
    net: Network,
    store: &'a mut Store,
}

impl Model for Unrolled<'_> {
    fn network(&self) -> &Network {
        &self.net
    }

    fn network_mut(&mut self) -> &mut Network {
        &mut self.net
    }

    fn store(&self) -> &Store {
        &*self.store
    }

    fn split_mut(&mut self) -> (&mut Network, &mut Store) {
        (&mut self.net, &mut *self.store)
    }
}

/// Replica of `node` with its predecessors remapped and fresh buffers.
fn replicate(node: &Node, preds: Vec<usize>) -> Node {
    let binding = match &node.binding {
        Binding::Param { .. } | Binding::Const { .. } => node.binding.clone(),
        Binding::External(_) => Binding::External(None),
        Binding::Scratch { .. } => Binding::scratch(),
    };
    Node {
        op: node.op.clone(),
        shape: node.shape.clone(),
        flags: node.flags,
        label: node.label,
        preds,
        pre: None,
        binding,
        back: false,
    }
}

impl Graph {
    /// Expands the graph over `len` time steps.
    ///
    /// Replica 0 reads a zero state (or the carried state while streaming);
    /// replica `t > 0` reads replica `t - 1`'s recurrence source. Time-variant
    /// cost nodes are replaced by the average of their replicas. Feed leaves of
    /// the result start unbound: bind one buffer per step.
    pub fn unroll(&mut self, len: usize) -> Result<Unrolled<'_>, NeuroGraphError> {
        if !self.is_rnn() {
            return Err(UnrollError::NotRecurrent.into());
        }
        if len == 0 {
            return Err(UnrollError::InvalidLength(len).into());
        }
        let base = &self.net.nodes;
        let n = base.len();

        let mut variant = vec![false; n];
        for (i, node) in base.iter().enumerate() {
            variant[i] = node.op.is_batched_leaf() || node.preds.iter().any(|&p| variant[p]);
        }

        let mut nodes: Vec<Node> = Vec::new();
        let mut shared = vec![usize::MAX; n];
        for (i, node) in base.iter().enumerate().filter(|(i, _)| !variant[*i]) {
            let preds = node.preds.iter().map(|&p| shared[p]).collect();
            shared[i] = nodes.len();
            nodes.push(replicate(node, preds));
        }

        // steps[t][i]: index of base node i in replica t
        let mut steps: Vec<Vec<usize>> = Vec::with_capacity(len);
        let mut pooled: Vec<usize> = Vec::new();
        for t in 0..len {
            let mut map = vec![usize::MAX; n];
            for (i, node) in base.iter().enumerate().filter(|(i, _)| variant[*i]) {
                if node.op == Op::State && t > 0 {
                    if let Some(pre) = node.pre {
                        map[i] = if variant[pre] { steps[t - 1][pre] } else { shared[pre] };
                        continue;
                    }
                }
                let preds = node
                    .preds
                    .iter()
                    .map(|&p| if variant[p] { map[p] } else { shared[p] })
                    .collect();
                let mut replica = replicate(node, preds);
                if replica.flags.contains(Flags::COST) {
                    replica.flags.remove(Flags::COST);
                    if t == 0 {
                        pooled.push(i);
                    }
                }
                map[i] = nodes.len();
                nodes.push(replica);
            }
            steps.push(map);
        }

        for &i in &pooled {
            let node = &base[i];
            nodes.push(Node {
                op: Op::Avg,
                shape: node.shape.clone(),
                flags: node.flags,
                label: node.label,
                preds: steps.iter().map(|map| map[i]).collect(),
                pre: None,
                binding: Binding::scratch(),
                back: false,
            });
        }

        let carries = base
            .iter()
            .enumerate()
            .filter_map(|(i, node)| {
                let pre = node.pre?;
                let src = if variant[pre] { steps[len - 1][pre] } else { shared[pre] };
                Some((steps[0][i], src))
            })
            .collect();

        debug!(
            "unrolled {} nodes over {} steps into {} nodes ({} pooled costs)",
            n,
            len,
            nodes.len(),
            pooled.len()
        );
        let mut net = Network::from_nodes(nodes, StdRng::seed_from_u64(self.net.rng.gen()), carries)?;
        net.is_train = self.net.is_train;
        net.set_batch_size(self.net.batch)?;
        Ok(Unrolled {
            net,
            store: &mut self.store,
        })
    }
}

#[cfg(test)]
#[path = "unroll_test.rs"]
mod tests;
