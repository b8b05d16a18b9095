// neurograph-data/src/samplers/traits.rs

use std::fmt::Debug;

/// Defines the order in which a [`DataLoader`](crate::dataloader::DataLoader)
/// visits the examples of a dataset.
pub trait Sampler: Debug + Send + Sync {
    /// Returns an iterator over example indices for one pass.
    ///
    /// Stateful samplers advance their generator on every call, so successive
    /// epochs see different orders while the whole run stays reproducible.
    fn iter(&self, dataset_len: usize) -> Box<dyn Iterator<Item = usize> + Send + Sync>;

    /// Number of indices one pass yields.
    fn len(&self, dataset_len: usize) -> usize;
}
