use rand::Rng;
use rand_distr::StandardNormal;

use crate::builder::GraphBuilder;
use crate::error::NeuroGraphError;
use crate::node::NodeId;

/// Draws `n` values from N(0, sigma^2).
pub fn normal_array<R: Rng + ?Sized>(rng: &mut R, sigma: f32, n: usize) -> Vec<f32> {
    (0..n)
        .map(|_| {
            let z: f32 = rng.sample(StandardNormal);
            z * sigma
        })
        .collect()
}

/// Trainable `[n_row, n_col]` matrix with entries from N(0, 1/n_col).
///
/// Drawn from the builder's generator, so a seeded builder gives the same weights.
pub fn new_weight(b: &mut GraphBuilder, n_row: usize, n_col: usize) -> Result<NodeId, NeuroGraphError> {
    let sigma = (1.0 / n_col.max(1) as f32).sqrt();
    let values = normal_array(b.rng(), sigma, n_row * n_col);
    b.var(&[n_row, n_col], values)
}

/// Trainable `[n]` vector of zeros.
pub fn new_bias(b: &mut GraphBuilder, n: usize) -> Result<NodeId, NeuroGraphError> {
    b.var(&[n], vec![0.0; n])
}

/// Zero-dimensional constant.
pub fn const_scalar(b: &mut GraphBuilder, x: f32) -> Result<NodeId, NeuroGraphError> {
    b.constant(&[], vec![x])
}
