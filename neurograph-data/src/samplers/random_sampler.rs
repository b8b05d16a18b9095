// neurograph-data/src/samplers/random_sampler.rs

use std::sync::Mutex;

use log::warn;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::traits::Sampler;

/// Randomly permutes (or draws with replacement) dataset indices.
#[derive(Debug)]
pub struct RandomSampler {
    replacement: bool,
    num_samples: Option<usize>,
    rng: Mutex<StdRng>,
}

impl RandomSampler {
    /// Creates a sampler seeded from system entropy.
    ///
    /// # Arguments
    ///
    /// * `replacement`: If `true`, an index can be selected multiple times.
    /// * `num_samples`: The total number of samples to draw. If `None`, it defaults to the dataset size.
    pub fn new(replacement: bool, num_samples: Option<usize>) -> Self {
        Self::with_rng(replacement, num_samples, StdRng::from_entropy())
    }

    /// Creates a sampler whose sequence of passes is fixed by `seed`.
    pub fn with_seed(replacement: bool, num_samples: Option<usize>, seed: u64) -> Self {
        Self::with_rng(replacement, num_samples, StdRng::seed_from_u64(seed))
    }

    fn with_rng(replacement: bool, num_samples: Option<usize>, rng: StdRng) -> Self {
        RandomSampler {
            replacement,
            num_samples,
            rng: Mutex::new(rng),
        }
    }
}

impl Sampler for RandomSampler {
    fn iter(&self, dataset_len: usize) -> Box<dyn Iterator<Item = usize> + Send + Sync> {
        if dataset_len == 0 {
            return Box::new(std::iter::empty());
        }
        let n = self.num_samples.unwrap_or(dataset_len);
        // a poisoned generator is still a valid generator
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        if self.replacement {
            let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..dataset_len)).collect();
            return Box::new(indices.into_iter());
        }
        if n > dataset_len {
            warn!(
                "RandomSampler: num_samples ({}) > dataset_len ({}) without replacement; yielding nothing",
                n, dataset_len
            );
            return Box::new(std::iter::empty());
        }
        let mut indices: Vec<usize> = (0..dataset_len).collect();
        indices.shuffle(&mut *rng);
        indices.truncate(n);
        Box::new(indices.into_iter())
    }

    fn len(&self, dataset_len: usize) -> usize {
        self.num_samples.unwrap_or(dataset_len)
    }
}

#[cfg(test)]
#[path = "random_sampler_test.rs"]
mod tests;
