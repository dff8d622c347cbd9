//! Training objectives and evaluation metrics over a batch.
//!
//! Losses are averaged over the batch, so a loss gradient already carries the
//! 1/batch factor and the layers simply sum over examples.
use crate::{
    activation_functions::softmax, models::InternalDataRepresentation, DataPrecision, ModelError,
    ModelResult,
};
use ndarray::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
    /// Mean over all elements of (prediction - target)^2.
    MeanSquaredError,
    /// Cross entropy between softmax(logits) and (one-hot) target rows,
    /// averaged over the batch. Predictions are raw logits.
    SoftmaxCrossEntropy,
}

fn check_shapes(
    context: &str,
    predictions: &InternalDataRepresentation,
    targets: &InternalDataRepresentation,
) -> ModelResult<()> {
    if predictions.shape() != targets.shape() {
        return Err(ModelError::shape(
            context,
            predictions.shape(),
            targets.shape(),
        ));
    }
    if predictions.is_empty() {
        return Err(ModelError::EmptyDataset);
    }
    Ok(())
}

fn as_rows(array: &InternalDataRepresentation) -> ModelResult<ArrayView2<DataPrecision>> {
    Ok(array.view().into_dimensionality::<Ix2>()?)
}

/// Per-row log(sum(exp(x))) computed around the row maximum.
fn log_sum_exp(logits: &ArrayView2<DataPrecision>) -> Array1<DataPrecision> {
    logits.map_axis(Axis(1), |row| {
        let max = row.fold(DataPrecision::NEG_INFINITY, |m, &x| m.max(x));
        max + row.mapv(|x| (x - max).exp()).sum().ln()
    })
}

impl Loss {
    pub fn value(
        &self,
        predictions: &InternalDataRepresentation,
        targets: &InternalDataRepresentation,
    ) -> ModelResult<DataPrecision> {
        check_shapes("loss", predictions, targets)?;
        match self {
            Loss::MeanSquaredError => {
                Ok((predictions - targets).mapv(|d| d * d).sum() / predictions.len() as DataPrecision)
            }
            Loss::SoftmaxCrossEntropy => {
                let logits = as_rows(predictions)?;
                let targets = as_rows(targets)?;
                let lse = log_sum_exp(&logits);
                let batch = logits.len_of(Axis(0));
                let mut total = 0.0;
                for ((logit_row, target_row), norm) in
                    logits.outer_iter().zip(targets.outer_iter()).zip(lse.iter())
                {
                    total -= logit_row
                        .iter()
                        .zip(target_row.iter())
                        .map(|(z, t)| t * (z - norm))
                        .sum::<DataPrecision>();
                }
                Ok(total / batch as DataPrecision)
            }
        }
    }

    /// Gradient of `value` with respect to the predictions.
    pub fn gradient(
        &self,
        predictions: &InternalDataRepresentation,
        targets: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        check_shapes("loss gradient", predictions, targets)?;
        match self {
            Loss::MeanSquaredError => {
                let n = predictions.len() as DataPrecision;
                Ok((predictions - targets).mapv(|d| 2.0 * d / n))
            }
            Loss::SoftmaxCrossEntropy => {
                let logits = as_rows(predictions)?;
                let batch = logits.len_of(Axis(0)) as DataPrecision;
                let probabilities = softmax(&logits);
                Ok(((probabilities - as_rows(targets)?) / batch).into_dyn())
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Loss::MeanSquaredError => "mse",
            Loss::SoftmaxCrossEntropy => "softmax_cross_entropy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    MeanAbsoluteError,
    /// Percentage of rows whose argmax agrees with the target's argmax.
    Accuracy,
}

fn argmax(row: ArrayView1<DataPrecision>) -> usize {
    row.indexed_iter()
        .fold((0, DataPrecision::NEG_INFINITY), |(best, max), (i, &x)| {
            if x > max {
                (i, x)
            } else {
                (best, max)
            }
        })
        .0
}

impl Metric {
    pub fn compute(
        &self,
        predictions: &InternalDataRepresentation,
        targets: &InternalDataRepresentation,
    ) -> ModelResult<DataPrecision> {
        check_shapes("metric", predictions, targets)?;
        match self {
            Metric::MeanAbsoluteError => Ok(
                (predictions - targets).mapv(DataPrecision::abs).sum() / predictions.len() as DataPrecision,
            ),
            Metric::Accuracy => {
                let predictions = as_rows(predictions)?;
                let targets = as_rows(targets)?;
                let hits = predictions
                    .outer_iter()
                    .zip(targets.outer_iter())
                    .filter(|(p, t)| argmax(p.view()) == argmax(t.view()))
                    .count();
                Ok(100.0 * hits as DataPrecision / predictions.len_of(Axis(0)) as DataPrecision)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Metric::MeanAbsoluteError => "mae",
            Metric::Accuracy => "accuracy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mse() {
        let pred = array![[1., 2.], [3., 4.]].into_dyn();
        let target = array![[1., 0.], [3., 5.]].into_dyn();
        assert_eq!(Loss::MeanSquaredError.value(&pred, &target).unwrap(), 1.25);
        assert_eq!(
            Loss::MeanSquaredError.gradient(&pred, &target).unwrap(),
            array![[0., 1.], [0., -0.5]].into_dyn()
        );
    }

    #[test]
    fn test_mae() {
        let pred = array![[1.], [-2.]].into_dyn();
        let target = array![[0.], [2.]].into_dyn();
        assert_eq!(Metric::MeanAbsoluteError.compute(&pred, &target).unwrap(), 2.5);
    }

    #[test]
    fn test_cross_entropy_uniform_logits() {
        let logits = array![[0., 0., 0., 0.]].into_dyn();
        let target = array![[0., 1., 0., 0.]].into_dyn();
        let loss = Loss::SoftmaxCrossEntropy.value(&logits, &target).unwrap();
        assert!((loss - 4f32.ln()).abs() < 1e-6);

        let grad = Loss::SoftmaxCrossEntropy.gradient(&logits, &target).unwrap();
        assert_eq!(grad, array![[0.25, -0.75, 0.25, 0.25]].into_dyn());
    }

    #[test]
    fn test_cross_entropy_large_logits_stay_finite() {
        let logits = array![[1000., 0.], [0., 1000.]].into_dyn();
        let target = array![[1., 0.], [1., 0.]].into_dyn();
        let loss = Loss::SoftmaxCrossEntropy.value(&logits, &target).unwrap();
        assert!((loss - 500.).abs() < 1e-3);
    }

    #[test]
    fn test_accuracy() {
        let pred = array![[0.1, 0.9], [0.8, 0.2], [0.3, 0.7], [0.6, 0.4]].into_dyn();
        let target = array![[0., 1.], [0., 1.], [0., 1.], [1., 0.]].into_dyn();
        assert_eq!(Metric::Accuracy.compute(&pred, &target).unwrap(), 75.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let pred = array![[1., 2.]].into_dyn();
        let target = array![[1.], [2.]].into_dyn();
        assert!(matches!(
            Loss::MeanSquaredError.value(&pred, &target),
            Err(ModelError::Shape { .. })
        ));
    }
}
