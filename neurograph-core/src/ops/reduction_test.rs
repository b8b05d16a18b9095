use approx::assert_relative_eq;

use super::reduction::*;
use super::{Adjoint, Op, Operand};
use crate::error::NeuroGraphError;
use crate::utils::testing::check_slice_near;

fn operand<'a>(data: &'a [f32], shape: &'a [usize]) -> Operand<'a> {
    Operand { data, shape }
}

#[test]
fn test_avg_of_three_inputs() {
    let (a, b, c) = ([1.0, 2.0], [3.0, 4.0], [5.0, 9.0]);
    let inputs = [operand(&a, &[2]), operand(&b, &[2]), operand(&c, &[2])];
    let mut y = [0.0; 2];
    avg_forward(&inputs, &mut y);
    check_slice_near(&y, &[3.0, 5.0], 1e-6);

    let g = [3.0, 6.0];
    let adj = Adjoint {
        inputs: &inputs,
        value: &y,
        shape: &[2],
        grad: &g,
        aux: &[],
        is_train: false,
    };
    let mut grads = vec![Some(vec![0.0; 2]), None, Some(vec![0.0; 2])];
    avg_backward(&adj, &mut grads);
    check_slice_near(grads[0].as_ref().unwrap(), &[1.0, 2.0], 1e-6);
    check_slice_near(grads[2].as_ref().unwrap(), &[1.0, 2.0], 1e-6);
}

#[test]
fn test_avg_rejects_mismatched_shapes() {
    let err = Op::Avg.infer_shape(&[&[2, 3], &[3, 2]]).unwrap_err();
    assert!(matches!(err, NeuroGraphError::ShapeMismatch { .. }));
}

#[test]
fn test_reduce_sum_and_mean_over_axes() {
    // [[1, 2, 3], [4, 5, 6]]
    let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let inputs = [operand(&x, &[2, 3])];

    assert_eq!(reduce_shape(&[2, 3], 0).unwrap(), vec![3]);
    let mut cols = [0.0; 3];
    reduce_forward(&inputs, 0, false, &mut cols);
    check_slice_near(&cols, &[5.0, 7.0, 9.0], 1e-6);

    assert_eq!(reduce_shape(&[2, 3], 1).unwrap(), vec![2]);
    let mut rows = [0.0; 2];
    reduce_forward(&inputs, 1, true, &mut rows);
    check_slice_near(&rows, &[2.0, 5.0], 1e-6);

    let g = [3.0, 6.0];
    let adj = Adjoint {
        inputs: &inputs,
        value: &rows,
        shape: &[2],
        grad: &g,
        aux: &[],
        is_train: false,
    };
    let mut grads = vec![Some(vec![0.0; 6])];
    reduce_backward(&adj, 1, true, &mut grads);
    check_slice_near(grads[0].as_ref().unwrap(), &[1.0, 1.0, 1.0, 2.0, 2.0, 2.0], 1e-6);
}

#[test]
fn test_reduce_to_scalar() {
    let x = [1.5, 2.5];
    let mut y = [0.0];
    reduce_forward(&[operand(&x, &[2])], 0, false, &mut y);
    assert_relative_eq!(y[0], 4.0);
    assert_eq!(reduce_shape(&[2], 0).unwrap(), Vec::<usize>::new());
}

#[test]
fn test_reduce_axis_out_of_range() {
    assert!(matches!(
        Op::ReduceSum { axis: 2 }.infer_shape(&[&[2, 3]]),
        Err(NeuroGraphError::ValidationError(_))
    ));
}
