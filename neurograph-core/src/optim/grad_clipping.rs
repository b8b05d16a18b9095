/// Rescales `gradient` in place so that its L2 norm does not exceed `threshold`.
///
/// The norm is accumulated in `f64`. Returns the norm measured before clipping;
/// gradients whose norm is already within the threshold are left untouched.
pub fn clip_grad_norm(threshold: f32, gradient: &mut [f32]) -> f32 {
    let sum_sq: f64 = gradient.iter().map(|&g| (g as f64) * (g as f64)).sum();
    let norm = sum_sq.sqrt();
    if norm > threshold as f64 {
        let scale = (threshold as f64 / norm) as f32;
        gradient.iter_mut().for_each(|g| *g *= scale);
    }
    norm as f32
}
