//! Computation-graph engine for small neural networks.
//!
//! Build a graph with [`GraphBuilder`], validate it into a [`Graph`], bind data
//! with [`Model::feed_bind`] and drive it through [`Model::cost`]. Recurrent
//! graphs can be expanded over time with [`Graph::unroll`].

pub mod autograd;
pub mod builder;
pub mod error;
pub mod feed;
pub mod graph;
pub mod io;
pub mod nn;
pub mod node;
pub mod ops;
pub mod optim;
pub mod unroll;
pub mod utils;

pub use builder::GraphBuilder;
pub use error::{NeuroGraphError, UnrollError};
pub use graph::{Graph, Model, Network, Store};
pub use node::{feed_buffer, Binding, FeedBuffer, Flags, Node, NodeId};
pub use ops::Op;
pub use unroll::Unrolled;
