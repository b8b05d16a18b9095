// neurograph-data/src/samplers/sequential_sampler.rs

use super::traits::Sampler;

/// Visits examples in a fixed order: the whole dataset, or a chosen subset.
#[derive(Debug, Clone, Default)]
pub struct SequentialSampler {
    indices: Option<Vec<usize>>,
}

impl SequentialSampler {
    pub fn new() -> Self {
        SequentialSampler { indices: None }
    }

    /// Visits exactly `indices`, in the given order.
    pub fn over(indices: Vec<usize>) -> Self {
        SequentialSampler { indices: Some(indices) }
    }
}

impl Sampler for SequentialSampler {
    fn iter(&self, dataset_len: usize) -> Box<dyn Iterator<Item = usize> + Send + Sync> {
        match &self.indices {
            Some(indices) => Box::new(indices.clone().into_iter()),
            None => Box::new(0..dataset_len),
        }
    }

    fn len(&self, dataset_len: usize) -> usize {
        self.indices.as_ref().map_or(dataset_len, Vec::len)
    }
}

#[cfg(test)]
#[path = "sequential_sampler_test.rs"]
mod tests;
