// neurograph-core/src/feed.rs

//! Flag/label lookup and feed binding.
//!
//! A node matches `(flag, label)` when its flag set contains every bit of `flag`
//! (the empty set matches any node) and its label equals `label`.

use crate::error::NeuroGraphError;
use crate::node::{Binding, FeedBuffer, Flags, Node};
use crate::ops::Op;

fn matches(node: &Node, flag: Flags, label: i32) -> bool {
    node.flags.contains(flag) && node.label == label
}

/// Every matching node index, in node order.
pub fn find_all(nodes: &[Node], flag: Flags, label: i32) -> Vec<usize> {
    nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| matches(n, flag, label))
        .map(|(i, _)| i)
        .collect()
}

/// The unique matching node.
pub fn find(nodes: &[Node], flag: Flags, label: i32) -> Result<usize, NeuroGraphError> {
    match find_all(nodes, flag, label).as_slice() {
        [] => Err(NeuroGraphError::NodeNotFound { flag, label }),
        [index] => Ok(*index),
        all => Err(NeuroGraphError::AmbiguousNode {
            flag,
            label,
            count: all.len(),
        }),
    }
}

/// Per-example size of the unique matching node.
pub fn feed_dim(nodes: &[Node], flag: Flags, label: i32) -> Result<usize, NeuroGraphError> {
    let index = find(nodes, flag, label)?;
    Ok(nodes[index].example_len())
}

/// Aliases `buffers` as the values of the matching feed leaves, in node order.
///
/// The buffers are shared, never copied; each must hold at least
/// `example_len * batch_size` values whenever the graph is evaluated.
pub fn feed_bind(
    nodes: &mut [Node],
    flag: Flags,
    label: i32,
    buffers: Vec<FeedBuffer>,
) -> Result<usize, NeuroGraphError> {
    let targets: Vec<usize> = find_all(nodes, flag, label)
        .into_iter()
        .filter(|&i| nodes[i].op == Op::Feed)
        .collect();
    if targets.is_empty() {
        return Err(NeuroGraphError::NodeNotFound { flag, label });
    }
    if targets.len() != buffers.len() {
        return Err(NeuroGraphError::FeedCountMismatch {
            expected: targets.len(),
            actual: buffers.len(),
        });
    }
    for (&i, buffer) in targets.iter().zip(buffers) {
        nodes[i].binding = Binding::External(Some(buffer));
    }
    Ok(targets.len())
}

#[cfg(test)]
#[path = "feed_test.rs"]
mod tests;
