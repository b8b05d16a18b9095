// neurograph-data/src/samplers/random_sampler_test.rs

use super::*;
use std::collections::HashSet;

#[test]
fn test_random_sampler_len() {
    assert_eq!(RandomSampler::new(false, None).len(10), 10);
    assert_eq!(RandomSampler::new(false, Some(5)).len(10), 5);
}

#[test]
fn test_random_sampler_permutation() {
    let sampler = RandomSampler::with_seed(false, None, 3);
    let indices: Vec<usize> = sampler.iter(10).collect();
    assert_eq!(indices.len(), 10);
    let unique: HashSet<usize> = indices.into_iter().collect();
    assert_eq!(unique, (0..10).collect::<HashSet<usize>>());
}

#[test]
fn test_random_sampler_subset_without_replacement() {
    let sampler = RandomSampler::with_seed(false, Some(4), 3);
    let indices: Vec<usize> = sampler.iter(10).collect();
    assert_eq!(indices.len(), 4);
    let unique: HashSet<usize> = indices.iter().copied().collect();
    assert_eq!(unique.len(), 4);
    assert!(indices.iter().all(|&i| i < 10));
}

#[test]
fn test_random_sampler_too_many_without_replacement_is_empty() {
    let sampler = RandomSampler::with_seed(false, Some(10), 3);
    assert_eq!(sampler.iter(5).count(), 0);
}

#[test]
fn test_random_sampler_with_replacement_in_range() {
    let sampler = RandomSampler::with_seed(true, Some(50), 3);
    let indices: Vec<usize> = sampler.iter(4).collect();
    assert_eq!(indices.len(), 50);
    assert!(indices.iter().all(|&i| i < 4));
}

#[test]
fn test_random_sampler_seed_fixes_the_sequence_of_passes() {
    let a = RandomSampler::with_seed(false, None, 11);
    let b = RandomSampler::with_seed(false, None, 11);
    let a_passes: Vec<Vec<usize>> = (0..3).map(|_| a.iter(20).collect()).collect();
    let b_passes: Vec<Vec<usize>> = (0..3).map(|_| b.iter(20).collect()).collect();
    assert_eq!(a_passes, b_passes);
    // the generator advances between passes
    assert!(a_passes[0] != a_passes[1] || a_passes[1] != a_passes[2]);
}

#[test]
fn test_random_sampler_empty_dataset() {
    let sampler = RandomSampler::new(true, Some(3));
    assert_eq!(sampler.iter(0).count(), 0);
}
