use crate::error::NeuroGraphError;
use crate::graph::Model;

/// Trait defining the common interface for optimizers.
///
/// Optimizers update a model's Parameter store from the Gradient store filled
/// by the last `cost(.., true)` call.
pub trait Optimizer {
    /// Performs a single optimization step on `model`.
    fn step(&mut self, model: &mut dyn Model) -> Result<(), NeuroGraphError>;

    /// Drops accumulated state so the next step starts fresh.
    fn reset(&mut self);
}
