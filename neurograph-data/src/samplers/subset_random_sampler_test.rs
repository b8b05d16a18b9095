// neurograph-data/src/samplers/subset_random_sampler_test.rs

use super::*;
use std::collections::HashSet;

#[test]
fn test_subset_random_sampler_len_ignores_dataset_len() {
    let sampler = SubsetRandomSampler::new(vec![10, 20, 5]);
    assert_eq!(sampler.len(0), 3);
    assert_eq!(sampler.len(100), 3);
    assert_eq!(sampler.indices(), &[10, 20, 5]);
}

#[test]
fn test_subset_random_sampler_yields_each_index_once() {
    let source = vec![1, 5, 2, 8, 3];
    let sampler = SubsetRandomSampler::with_seed(source.clone(), 4);
    let out: Vec<usize> = sampler.iter(100).collect();
    assert_eq!(out.len(), source.len());
    let out_set: HashSet<usize> = out.into_iter().collect();
    assert_eq!(out_set, source.into_iter().collect::<HashSet<usize>>());
}

#[test]
fn test_subset_random_sampler_empty() {
    let sampler = SubsetRandomSampler::new(vec![]);
    assert_eq!(sampler.iter(10).next(), None);
}

#[test]
fn test_subset_random_sampler_seeded_is_reproducible() {
    let a = SubsetRandomSampler::with_seed((0..30).collect(), 9);
    let b = SubsetRandomSampler::with_seed((0..30).collect(), 9);
    for _ in 0..3 {
        assert_eq!(a.iter(0).collect::<Vec<_>>(), b.iter(0).collect::<Vec<_>>());
    }
}
