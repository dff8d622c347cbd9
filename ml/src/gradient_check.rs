//! Finite difference checks for the hand written backward passes.
use crate::models::{InternalDataRepresentation, Layer};
use ndarray::{Array, ArrayD};

const EPSILON: f32 = 1e-2;

/// Fixed, non-constant upstream gradient so that every output element matters.
fn upstream(shape: &[usize]) -> ArrayD<f32> {
    let n = shape.iter().product();
    Array::from_shape_vec(
        shape.to_vec(),
        (0..n).map(|i| ((i % 7) as f32 - 3.0) / 3.0).collect(),
    )
    .unwrap()
}

/// Scalar objective sum(layer(x) * r) whose gradient w.r.t. the output is r.
fn objective(layer: &mut dyn Layer, input: &InternalDataRepresentation, r: &ArrayD<f32>) -> f32 {
    let out = layer.forward(input).unwrap();
    (&out * r).sum()
}

/// Compares input and parameter gradients of `layer` against central differences.
pub fn check_layer_gradients(layer: &mut dyn Layer, input: InternalDataRepresentation, tol: f32) {
    let out = layer.forward(&input).unwrap();
    let r = upstream(out.shape());
    let input_grad = layer.backward(&r).unwrap();
    let param_grads: Vec<ArrayD<f32>> =
        layer.parameters().iter().map(|p| p.grad.clone()).collect();

    let mut probe = input.clone();
    for idx in 0..input.len() {
        let original = probe.as_slice().unwrap()[idx];
        probe.as_slice_mut().unwrap()[idx] = original + EPSILON;
        let plus = objective(layer, &probe, &r);
        probe.as_slice_mut().unwrap()[idx] = original - EPSILON;
        let minus = objective(layer, &probe, &r);
        probe.as_slice_mut().unwrap()[idx] = original;

        let numeric = (plus - minus) / (2.0 * EPSILON);
        let analytic = input_grad.as_slice().unwrap()[idx];
        assert!(
            (numeric - analytic).abs() < tol,
            "input gradient {} differs: numeric {} vs analytic {}",
            idx,
            numeric,
            analytic
        );
    }

    for (p_idx, expected) in param_grads.iter().enumerate() {
        for idx in 0..expected.len() {
            let original = layer.parameters()[p_idx].value.as_slice().unwrap()[idx];
            layer.parameters()[p_idx].value.as_slice_mut().unwrap()[idx] = original + EPSILON;
            let plus = objective(layer, &input, &r);
            layer.parameters()[p_idx].value.as_slice_mut().unwrap()[idx] = original - EPSILON;
            let minus = objective(layer, &input, &r);
            layer.parameters()[p_idx].value.as_slice_mut().unwrap()[idx] = original;

            let numeric = (plus - minus) / (2.0 * EPSILON);
            let analytic = expected.as_slice().unwrap()[idx];
            assert!(
                (numeric - analytic).abs() < tol,
                "parameter {} gradient {} differs: numeric {} vs analytic {}",
                p_idx,
                idx,
                numeric,
                analytic
            );
        }
    }
}
