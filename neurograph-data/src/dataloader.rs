// dataloader.rs
//! # DataLoader
//!
//! Le module `DataLoader` regroupe les exemples d'un dataset en mini-batches,
//! dans l'ordre donné par un [`Sampler`].
//!
//! ## Exemple d'utilisation basique
//!
//! ```rust
//! use neurograph_data::dataloader::DataLoader;
//! use neurograph_data::datasets::VecDataset;
//! use neurograph_data::samplers::SequentialSampler;
//!
//! let dataset = VecDataset::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 1, vec![0.0; 6], 1).unwrap();
//! let loader = DataLoader::new(dataset, 2, SequentialSampler::new(), false);
//! for batch in loader {
//!     let batch = batch.expect("Pas d'erreur attendue");
//!     assert_eq!(batch.len(), 2);
//! }
//! ```
//!
//! Pour un [`VecDataset`], [`DataLoader::next_into`] remplit directement des
//! tampons plats, prêts à être liés à un graphe.

use neurograph_core::NeuroGraphError;

use crate::datasets::{Dataset, VecDataset};
use crate::samplers::Sampler;

/// Batching loader over a dataset `D`, visiting indices from sampler `S`.
pub struct DataLoader<D: Dataset, S: Sampler> {
    pub dataset: D,
    pub batch_size: usize,
    pub sampler: S,
    /// Si vrai, le dernier batch est ignoré s'il est incomplet.
    pub drop_last: bool,
    indices_iter: Box<dyn Iterator<Item = usize> + Send + Sync>,
}

impl<D: Dataset, S: Sampler> DataLoader<D, S> {
    pub fn new(dataset: D, batch_size: usize, sampler: S, drop_last: bool) -> Self {
        let indices_iter = sampler.iter(dataset.len());
        Self {
            dataset,
            batch_size,
            sampler,
            drop_last,
            indices_iter,
        }
    }

    /// Starts a new pass over the dataset, drawing a fresh order from the sampler.
    pub fn reset(&mut self) {
        self.indices_iter = self.sampler.iter(self.dataset.len());
    }

    /// Number of batches in one pass.
    pub fn num_batches(&self) -> usize {
        if self.batch_size == 0 {
            return 0;
        }
        let n = self.sampler.len(self.dataset.len());
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    fn next_indices(&mut self) -> Option<Vec<usize>> {
        let batch: Vec<usize> = self.indices_iter.by_ref().take(self.batch_size).collect();
        if batch.is_empty() || (self.drop_last && batch.len() < self.batch_size) {
            None
        } else {
            Some(batch)
        }
    }
}

impl<D: Dataset + AsRef<VecDataset>, S: Sampler> DataLoader<D, S> {
    /// Copies the next mini-batch into `inputs` and `targets` (row-major, one
    /// example after another) and returns how many examples were written.
    ///
    /// The buffers must hold at least `batch_size` rows; trailing rows of a
    /// short last batch are left untouched. Returns `Ok(None)` at the end of the pass.
    pub fn next_into(&mut self, inputs: &mut [f32], targets: &mut [f32]) -> Result<Option<usize>, NeuroGraphError> {
        let Some(indices) = self.next_indices() else {
            return Ok(None);
        };
        let data = self.dataset.as_ref();
        let (n_in, n_out) = (data.n_in(), data.n_out());
        if inputs.len() < indices.len() * n_in || targets.len() < indices.len() * n_out {
            return Err(NeuroGraphError::ValidationError(format!(
                "batch of {} examples does not fit buffers of {} inputs and {} targets",
                indices.len(),
                inputs.len(),
                targets.len()
            )));
        }
        for (k, &i) in indices.iter().enumerate() {
            let (x, y) = data.example(i).ok_or_else(|| {
                NeuroGraphError::ValidationError(format!(
                    "sampler index {} out of bounds for dataset of length {}",
                    i,
                    data.len()
                ))
            })?;
            inputs[k * n_in..(k + 1) * n_in].copy_from_slice(x);
            targets[k * n_out..(k + 1) * n_out].copy_from_slice(y);
        }
        Ok(Some(indices.len()))
    }
}

impl<D: Dataset, S: Sampler> Iterator for DataLoader<D, S> {
    type Item = Result<Vec<D::Item>, NeuroGraphError>;

    /// Renvoie le prochain batch de données.
    fn next(&mut self) -> Option<Self::Item> {
        let indices = self.next_indices()?;
        Some(indices.into_iter().map(|i| self.dataset.get(i)).collect())
    }
}

#[cfg(test)]
#[path = "dataloader_test.rs"]
mod tests;
