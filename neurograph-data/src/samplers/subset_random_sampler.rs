// neurograph-data/src/samplers/subset_random_sampler.rs

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::traits::Sampler;

/// Shuffles a fixed subset of indices on every pass.
#[derive(Debug)]
pub struct SubsetRandomSampler {
    indices: Vec<usize>,
    rng: Mutex<StdRng>,
}

impl SubsetRandomSampler {
    pub fn new(indices: Vec<usize>) -> Self {
        SubsetRandomSampler {
            indices,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(indices: Vec<usize>, seed: u64) -> Self {
        SubsetRandomSampler {
            indices,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl Sampler for SubsetRandomSampler {
    fn iter(&self, _dataset_len: usize) -> Box<dyn Iterator<Item = usize> + Send + Sync> {
        if self.indices.is_empty() {
            return Box::new(std::iter::empty());
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let mut shuffled = self.indices.clone();
        shuffled.shuffle(&mut *rng);
        Box::new(shuffled.into_iter())
    }

    fn len(&self, _dataset_len: usize) -> usize {
        self.indices.len()
    }
}

#[cfg(test)]
#[path = "subset_random_sampler_test.rs"]
mod tests;
