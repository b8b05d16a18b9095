/// Checks that two slices have the same length and agree elementwise within `tolerance`.
/// Panics with the first offending index otherwise.
pub fn check_slice_near(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(actual.len(), expected.len(), "Data length mismatch");

    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        let diff = (*a - *e).abs();
        if diff > tolerance {
            panic!(
                "Data mismatch at index {}: actual={:?}, expected={:?}, diff={:?}, tolerance={:?}",
                i, a, e, diff, tolerance
            );
        }
    }
}
