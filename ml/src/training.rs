//! Training loops: mini-batch epochs with optional validation (`fit`) and
//! fixed-count full-batch steps with periodic reports (`fit_steps`).
use crate::{
    losses::{Loss, Metric},
    models::{InternalDataRepresentation, Sequential},
    optimizers::Optimizer,
    DataPrecision, ModelError, ModelResult,
};
use log::{debug, info};
use ndarray::{concatenate, ArrayView, Axis};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde_derive::{Deserialize, Serialize};

/// Batch size used by `predict` and `evaluate`.
const INFERENCE_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Reshuffle the training examples before every epoch.
    pub shuffle: bool,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 25,
            batch_size: 2,
            shuffle: true,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    pub loss: DataPrecision,
    pub metric: DataPrecision,
    /// Validation loss and metric, if validation data was passed.
    pub validation: Option<(DataPrecision, DataPrecision)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct History {
    pub epochs: Vec<EpochStats>,
}

impl History {
    pub fn final_loss(&self) -> Option<DataPrecision> {
        self.epochs.last().map(|e| e.loss)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step: usize,
    pub loss: DataPrecision,
    pub train_metric: DataPrecision,
    pub test_metric: Option<DataPrecision>,
}

/// A model together with the objective, metric and optimizer it is trained with.
pub struct CompiledModel {
    model: Sequential,
    loss: Loss,
    metric: Metric,
    optimizer: Box<dyn Optimizer>,
}

impl Sequential {
    pub fn compile(self, loss: Loss, metric: Metric, optimizer: Box<dyn Optimizer>) -> CompiledModel {
        CompiledModel {
            model: self,
            loss,
            metric,
            optimizer,
        }
    }
}

fn num_examples(xs: &InternalDataRepresentation, ys: &InternalDataRepresentation) -> ModelResult<usize> {
    let n = xs.shape().first().copied().unwrap_or(0);
    let m = ys.shape().first().copied().unwrap_or(0);
    if n != m {
        return Err(ModelError::shape("targets", &[n], &[m]));
    }
    if n == 0 {
        return Err(ModelError::EmptyDataset);
    }
    Ok(n)
}

impl CompiledModel {
    pub fn model(&self) -> &Sequential {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Sequential {
        &mut self.model
    }

    pub fn into_model(self) -> Sequential {
        self.model
    }

    pub fn loss(&self) -> Loss {
        self.loss
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// One forward/backward pass and parameter update.
    /// Returns loss and metric measured *before* the update.
    pub fn train_on_batch(
        &mut self,
        xs: &InternalDataRepresentation,
        ys: &InternalDataRepresentation,
    ) -> ModelResult<(DataPrecision, DataPrecision)> {
        let predictions = self.model.forward(xs)?;
        let loss = self.loss.value(&predictions, ys)?;
        let metric = self.metric.compute(&predictions, ys)?;
        let grad = self.loss.gradient(&predictions, ys)?;
        self.model.backward(&grad)?;
        self.optimizer.step(&mut self.model.parameters())?;
        Ok((loss, metric))
    }

    /// Mini-batch training for `config.epochs` epochs.
    pub fn fit(
        &mut self,
        xs: &InternalDataRepresentation,
        ys: &InternalDataRepresentation,
        config: &TrainingConfig,
        validation: Option<(&InternalDataRepresentation, &InternalDataRepresentation)>,
    ) -> ModelResult<History> {
        if config.batch_size == 0 {
            return Err(ModelError::InvalidConfig("batch size must be > 0".to_string()));
        }
        let n = num_examples(xs, ys)?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut order: Vec<usize> = (0..n).collect();
        let mut history = History { epochs: Vec::with_capacity(config.epochs) };

        info!(
            "Train on {} samples, {} epochs, batch size {}",
            n, config.epochs, config.batch_size
        );
        for epoch in 1..=config.epochs {
            if config.shuffle {
                order.shuffle(&mut rng);
            }
            let mut loss_sum = 0.0;
            let mut metric_sum = 0.0;
            for batch in order.chunks(config.batch_size) {
                let batch_xs = xs.select(Axis(0), batch);
                let batch_ys = ys.select(Axis(0), batch);
                let (loss, metric) = self.train_on_batch(&batch_xs, &batch_ys)?;
                loss_sum += loss * batch.len() as DataPrecision;
                metric_sum += metric * batch.len() as DataPrecision;
            }

            let val_stats = match validation {
                Some((val_xs, val_ys)) => Some(self.evaluate(val_xs, val_ys)?),
                None => None,
            };
            let stats = EpochStats {
                epoch,
                loss: loss_sum / n as DataPrecision,
                metric: metric_sum / n as DataPrecision,
                validation: val_stats,
            };
            match stats.validation {
                Some((val_loss, val_metric)) => info!(
                    "Epoch {}/{} - loss: {:.4} - {}: {:.4} - val_loss: {:.4} - val_{}: {:.4}",
                    epoch,
                    config.epochs,
                    stats.loss,
                    self.metric.name(),
                    stats.metric,
                    val_loss,
                    self.metric.name(),
                    val_metric
                ),
                None => info!(
                    "Epoch {}/{} - loss: {:.4} - {}: {:.4}",
                    epoch,
                    config.epochs,
                    stats.loss,
                    self.metric.name(),
                    stats.metric
                ),
            }
            history.epochs.push(stats);
        }
        Ok(history)
    }

    /// Full-batch training for `steps` steps. Every `display_step` steps (and on
    /// step 0) a report is recorded, including the metric on `test` if given,
    /// and handed to `on_report` as soon as it is available.
    pub fn fit_steps<F>(
        &mut self,
        xs: &InternalDataRepresentation,
        ys: &InternalDataRepresentation,
        steps: usize,
        display_step: usize,
        test: Option<(&InternalDataRepresentation, &InternalDataRepresentation)>,
        mut on_report: F,
    ) -> ModelResult<Vec<StepReport>>
    where
        F: FnMut(&StepReport),
    {
        if display_step == 0 {
            return Err(ModelError::InvalidConfig("display step must be > 0".to_string()));
        }
        num_examples(xs, ys)?;
        let mut reports = Vec::new();
        for step in 0..steps {
            let (loss, train_metric) = self.train_on_batch(xs, ys)?;
            if step % display_step != 0 {
                continue;
            }
            let test_metric = match test {
                Some((test_xs, test_ys)) => Some(self.evaluate(test_xs, test_ys)?.1),
                None => None,
            };
            info!(
                "Step {:04}: loss {:.2}, training {} {:.2}, test {} {}",
                step,
                loss,
                self.metric.name(),
                train_metric,
                self.metric.name(),
                test_metric.map_or_else(|| "-".to_string(), |m| format!("{:.2}", m))
            );
            let report = StepReport {
                step,
                loss,
                train_metric,
                test_metric,
            };
            on_report(&report);
            reports.push(report);
        }
        Ok(reports)
    }

    pub fn predict(&mut self, xs: &InternalDataRepresentation) -> ModelResult<InternalDataRepresentation> {
        self.model.predict(xs)
    }

    /// Loss and metric over the whole data set.
    pub fn evaluate(
        &mut self,
        xs: &InternalDataRepresentation,
        ys: &InternalDataRepresentation,
    ) -> ModelResult<(DataPrecision, DataPrecision)> {
        num_examples(xs, ys)?;
        let predictions = self.model.predict(xs)?;
        Ok((
            self.loss.value(&predictions, ys)?,
            self.metric.compute(&predictions, ys)?,
        ))
    }
}

impl Sequential {
    /// Batched inference.
    pub fn predict(&mut self, xs: &InternalDataRepresentation) -> ModelResult<InternalDataRepresentation> {
        let n = xs.shape().first().copied().unwrap_or(0);
        if n == 0 {
            return Err(ModelError::EmptyDataset);
        }
        let mut outputs = Vec::with_capacity((n + INFERENCE_BATCH_SIZE - 1) / INFERENCE_BATCH_SIZE);
        let mut start = 0;
        while start < n {
            let end = (start + INFERENCE_BATCH_SIZE).min(n);
            let batch = xs.slice_axis(Axis(0), (start..end).into()).to_owned();
            outputs.push(self.forward(&batch)?);
            start = end;
        }
        debug!("predicted {} examples in {} batches", n, outputs.len());
        let views: Vec<ArrayView<_, _>> = outputs.iter().map(|o| o.view()).collect();
        Ok(concatenate(Axis(0), &views)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        activation_functions::Activation,
        initializers::Initializer,
        models::{make_classifier, SequentialBuilder},
        optimizers::{Adam, GradientDescent},
    };
    use ndarray::{Array, Array2};

    /// y = 2x - 1 on a handful of points, learnable by a single dense unit.
    fn linear_problem() -> (InternalDataRepresentation, InternalDataRepresentation) {
        let xs = Array::from_shape_fn((8, 1), |(i, _)| i as f32 / 4.0 - 1.0);
        let ys = xs.mapv(|x| 2.0 * x - 1.0);
        (xs.into_dyn(), ys.into_dyn())
    }

    fn linear_model() -> Sequential {
        SequentialBuilder::new(&[1], 0)
            .dense(1, Activation::Linear, Initializer::Zeros)
            .unwrap()
            .build()
    }

    #[test]
    fn test_fit_reduces_loss() {
        let (xs, ys) = linear_problem();
        let mut compiled = linear_model().compile(
            Loss::MeanSquaredError,
            Metric::MeanAbsoluteError,
            Box::new(GradientDescent::new(0.1).unwrap()),
        );
        let config = TrainingConfig {
            epochs: 50,
            batch_size: 4,
            ..Default::default()
        };

        let history = compiled.fit(&xs, &ys, &config, Some((&xs, &ys))).unwrap();

        assert_eq!(history.epochs.len(), 50);
        assert!(history.final_loss().unwrap() < history.epochs[0].loss);
        let (val_loss, val_mae) = history.epochs[49].validation.unwrap();
        assert!(val_loss < 1e-2);
        assert!(val_mae < 0.1);
    }

    #[test]
    fn test_fit_is_reproducible_for_a_seed() {
        let (xs, ys) = linear_problem();
        let config = TrainingConfig {
            epochs: 3,
            ..Default::default()
        };
        let mut runs = (0..2).map(|_| {
            let mut compiled = linear_model().compile(
                Loss::MeanSquaredError,
                Metric::MeanAbsoluteError,
                Box::new(Adam::new(0.01).unwrap()),
            );
            compiled.fit(&xs, &ys, &config, None).unwrap()
        });
        assert_eq!(runs.next(), runs.next());
    }

    #[test]
    fn test_fit_rejects_bad_inputs() {
        let (xs, ys) = linear_problem();
        let mut compiled = linear_model().compile(
            Loss::MeanSquaredError,
            Metric::MeanAbsoluteError,
            Box::new(GradientDescent::new(0.1).unwrap()),
        );
        let zero_batch = TrainingConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            compiled.fit(&xs, &ys, &zero_batch, None),
            Err(ModelError::InvalidConfig(_))
        ));

        let short_ys = ys.slice_axis(Axis(0), (0..3).into()).to_owned();
        assert!(matches!(
            compiled.fit(&xs, &short_ys, &TrainingConfig::default(), None),
            Err(ModelError::Shape { .. })
        ));
    }

    #[test]
    fn test_fit_steps_reports_every_display_step() {
        // two separable classes in a flattened (2, 1) input
        let xs = Array::from_shape_vec((4, 2, 1), vec![1., 0., 0.9, 0.1, 0., 1., 0.1, 0.9])
            .unwrap()
            .into_dyn();
        let ys = Array2::from_shape_vec((4, 2), vec![1., 0., 1., 0., 0., 1., 0., 1.])
            .unwrap()
            .into_dyn();
        let mut compiled = make_classifier(2, 1, 2, 5).unwrap().compile(
            Loss::SoftmaxCrossEntropy,
            Metric::Accuracy,
            Box::new(GradientDescent::new(0.5).unwrap()),
        );

        let mut seen = Vec::new();
        let reports = compiled
            .fit_steps(&xs, &ys, 201, 50, Some((&xs, &ys)), |r| seen.push(r.step))
            .unwrap();

        let steps: Vec<usize> = reports.iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![0, 50, 100, 150, 200]);
        assert_eq!(seen, steps);
        let last = reports.last().unwrap();
        assert!(last.loss < reports[0].loss);
        assert_eq!(last.test_metric, Some(100.0));
    }

    #[test]
    fn test_predict_spans_several_batches() {
        let mut model = linear_model();
        let xs = Array::zeros((70, 1)).into_dyn();
        let out = model.predict(&xs).unwrap();
        assert_eq!(out.shape(), &[70, 1]);
    }
}
