// neurograph-data/src/datasets/traits.rs

use neurograph_core::NeuroGraphError;

/// Indexed access to training examples.
pub trait Dataset {
    /// The type of a single item returned by the dataset.
    ///
    /// `Send + 'static` so loaders can move items across threads.
    type Item: Send + 'static;

    /// Returns the item at `index`.
    ///
    /// # Errors
    ///
    /// Returns `NeuroGraphError::ValidationError` if the index is out of bounds.
    fn get(&self, index: usize) -> Result<Self::Item, NeuroGraphError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<D: Dataset + ?Sized> Dataset for &D {
    type Item = D::Item;

    fn get(&self, index: usize) -> Result<Self::Item, NeuroGraphError> {
        (**self).get(index)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}
