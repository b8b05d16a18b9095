// neurograph-core/src/nn/mod.rs
// Layer recipes and initialisers built on top of the graph builder.

pub mod init;
pub mod layers;

pub use layers::{cost_layer, dropout, gru, input, linear, rnn, CostType};
