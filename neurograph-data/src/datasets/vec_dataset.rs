// neurograph-data/src/datasets/vec_dataset.rs

use neurograph_core::NeuroGraphError;

use super::traits::Dataset;

/// In-memory paired dataset: example `i` is `inputs[i*n_in..(i+1)*n_in]`
/// together with `targets[i*n_out..(i+1)*n_out]`.
#[derive(Debug, Clone, PartialEq)]
pub struct VecDataset {
    inputs: Vec<f32>,
    targets: Vec<f32>,
    n_in: usize,
    n_out: usize,
}

impl VecDataset {
    /// Wraps flat row-major example arrays.
    ///
    /// # Errors
    ///
    /// `ValidationError` when a width is zero, an array is not a whole number
    /// of rows, or the two arrays hold different example counts.
    pub fn new(inputs: Vec<f32>, n_in: usize, targets: Vec<f32>, n_out: usize) -> Result<Self, NeuroGraphError> {
        if n_in == 0 || n_out == 0 {
            return Err(NeuroGraphError::ValidationError(
                "example widths must be non-zero".to_string(),
            ));
        }
        if inputs.len() % n_in != 0 || targets.len() % n_out != 0 {
            return Err(NeuroGraphError::ValidationError(format!(
                "{} inputs are not rows of {} or {} targets are not rows of {}",
                inputs.len(),
                n_in,
                targets.len(),
                n_out
            )));
        }
        if inputs.len() / n_in != targets.len() / n_out {
            return Err(NeuroGraphError::ValidationError(format!(
                "{} input examples but {} target examples",
                inputs.len() / n_in,
                targets.len() / n_out
            )));
        }
        Ok(VecDataset {
            inputs,
            targets,
            n_in,
            n_out,
        })
    }

    /// Builds the dataset from one `Vec` per example.
    pub fn from_rows(inputs: &[Vec<f32>], targets: &[Vec<f32>]) -> Result<Self, NeuroGraphError> {
        let n_in = inputs.first().map_or(0, Vec::len);
        let n_out = targets.first().map_or(0, Vec::len);
        if inputs.iter().any(|r| r.len() != n_in) || targets.iter().any(|r| r.len() != n_out) {
            return Err(NeuroGraphError::ValidationError(
                "rows of unequal width".to_string(),
            ));
        }
        Self::new(inputs.concat(), n_in, targets.concat(), n_out)
    }

    pub fn n_in(&self) -> usize {
        self.n_in
    }

    pub fn n_out(&self) -> usize {
        self.n_out
    }

    /// Borrowed input and target rows of example `index`.
    pub fn example(&self, index: usize) -> Option<(&[f32], &[f32])> {
        if index >= self.len() {
            return None;
        }
        Some((
            &self.inputs[index * self.n_in..(index + 1) * self.n_in],
            &self.targets[index * self.n_out..(index + 1) * self.n_out],
        ))
    }
}

impl AsRef<VecDataset> for VecDataset {
    fn as_ref(&self) -> &VecDataset {
        self
    }
}

impl Dataset for VecDataset {
    type Item = (Vec<f32>, Vec<f32>);

    /// Copies the example's input and target rows.
    fn get(&self, index: usize) -> Result<Self::Item, NeuroGraphError> {
        self.example(index)
            .map(|(x, y)| (x.to_vec(), y.to_vec()))
            .ok_or_else(|| {
                NeuroGraphError::ValidationError(format!(
                    "index {} out of bounds for dataset of length {}",
                    index,
                    self.len()
                ))
            })
    }

    fn len(&self) -> usize {
        self.inputs.len() / self.n_in
    }
}

#[cfg(test)]
#[path = "vec_dataset_test.rs"]
mod tests;
