//! Next-value prediction on a timeseries with stacked 1D convolutions.
use crate::{inputs::read_config, ExperimentResult};
use datasets::{
    statistics::PredictionReport,
    windowing::{as_columns, make_instances, split_tail, tail_size},
};
use log::{info, warn};
use ml::{
    convolutions::Padding,
    losses::{Loss, Metric},
    models::{make_regressor, RegressorLayout},
    optimizers::Adam,
    training::{History, TrainingConfig},
    ModelError,
};
use ndarray::{Array1, ArrayBase, Data, Dimension, Ix2};
use serde_derive::{Deserialize, Serialize};
use std::{
    io::Write,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressorConfig {
    /// Length of the generated ramp when no series is given.
    pub series_length: usize,
    pub window_size: usize,
    pub filter_length: usize,
    pub num_filters: usize,
    pub num_blocks: usize,
    pub padding: Padding,
    /// Share of the raw samples whose instances are held out, taken from the end.
    pub test_fraction: f64,
    pub learning_rate: f32,
    #[serde(flatten)]
    pub training: TrainingConfig,
}

impl Default for RegressorConfig {
    fn default() -> Self {
        let layout = RegressorLayout::default();
        Self {
            series_length: 1000,
            window_size: layout.window_size,
            filter_length: layout.filter_length,
            num_filters: layout.num_filters,
            num_blocks: layout.num_blocks,
            padding: layout.padding,
            test_fraction: 0.01,
            learning_rate: 0.001,
            training: TrainingConfig::default(),
        }
    }
}

impl RegressorConfig {
    pub fn from_json_file(path: &Path) -> ExperimentResult<Self> {
        read_config(path)
    }

    /// Network shape for `num_series` parallel series, predicting all of them.
    pub fn layout(&self, num_series: usize) -> RegressorLayout {
        RegressorLayout {
            window_size: self.window_size,
            filter_length: self.filter_length,
            num_input_series: num_series,
            num_outputs: num_series,
            num_filters: self.num_filters,
            num_blocks: self.num_blocks,
            padding: self.padding,
        }
    }
}

/// Optional weight files read before and written after training.
#[derive(Debug, Clone, Default)]
pub struct WeightFiles {
    pub load: Option<PathBuf>,
    pub save: Option<PathBuf>,
}

pub struct RegressionOutcome {
    pub history: History,
    pub report: PredictionReport,
}

/// Trains a regressor on `series` (a vector, or one column per series) and writes
/// the model, the instances and the predicted-vs-actual table to `out`.
pub fn evaluate_regressor<S, D, W>(
    series: &ArrayBase<S, D>,
    config: &RegressorConfig,
    weights: &WeightFiles,
    out: &mut W,
) -> ExperimentResult<RegressionOutcome>
where
    S: Data<Elem = f32>,
    D: Dimension,
    W: Write,
{
    let series = as_columns(series)?;
    let (num_samples, num_series) = series.dim();
    writeln!(
        out,
        "\n\nPhrases ({} samples by {} series):\n{}",
        num_samples, num_series, series
    )?;

    let mut model = make_regressor(&config.layout(num_series), config.training.seed)?;
    if let Some(path) = &weights.load {
        model.load_weights_from_path(path)?;
        info!("loaded weights from {}", path.display());
    }
    writeln!(
        out,
        "\n\nInput Size {:?}, Output Size {:?}, {} Conv Filter Size {}",
        model.input_shape(),
        model.output_shape()?,
        config.num_filters,
        config.filter_length
    )?;
    writeln!(out, "{}", model.summary()?)?;

    let instances = make_instances(&series, config.window_size)?;
    writeln!(
        out,
        "\n\nInput features:\n{}\n\nOutput labels:\n{}\n\nQuery vector:\n{}",
        instances.features, instances.targets, instances.query
    )?;

    let test_size = tail_size(num_samples, config.test_fraction);
    if test_size == 0 {
        warn!(
            "a test fraction of {} holds out nothing from {} samples",
            config.test_fraction, num_samples
        );
    }
    let split = split_tail(&instances, test_size)?;
    let test_xs = split.test_features.into_dyn();
    let test_ys = split.test_targets.clone().into_dyn();

    let mut compiled = model.compile(
        Loss::MeanSquaredError,
        Metric::MeanAbsoluteError,
        Box::new(Adam::new(config.learning_rate)?),
    );
    let history = compiled.fit(
        &split.train_features.into_dyn(),
        &split.train_targets.into_dyn(),
        &config.training,
        Some((&test_xs, &test_ys)),
    )?;

    let predicted = compiled
        .predict(&test_xs)?
        .into_dimensionality::<Ix2>()
        .map_err(ModelError::from)?;
    let next = compiled.predict(&instances.query.into_dyn())?;
    let report = PredictionReport::new(
        split.test_targets,
        predicted,
        Array1::from_iter(next.iter().cloned()),
    )?;
    writeln!(out, "\n\n{}", report)?;
    info!("held-out mean absolute error {:.4}", report.mae()?);

    if let Some(path) = &weights.save {
        compiled.model_mut().save_weights(path)?;
        info!("saved weights to {}", path.display());
    }
    Ok(RegressionOutcome { history, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExperimentError;
    use datasets::synthetic::linear_ramp;
    use tempfile::tempdir;

    fn small_config() -> RegressorConfig {
        RegressorConfig {
            series_length: 60,
            window_size: 8,
            filter_length: 3,
            num_filters: 2,
            num_blocks: 2,
            test_fraction: 0.1,
            training: TrainingConfig {
                epochs: 2,
                batch_size: 4,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_evaluate_prints_report() {
        let config = small_config();
        let mut out = Vec::new();

        let outcome = evaluate_regressor(
            &linear_ramp(config.series_length),
            &config,
            &WeightFiles::default(),
            &mut out,
        )
        .unwrap();

        assert_eq!(outcome.history.epochs.len(), 2);
        assert_eq!(outcome.report.actual.dim(), (6, 1));
        assert_eq!(outcome.report.actual[[0, 0]], 54.);
        assert_eq!(outcome.report.next.len(), 1);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Phrases (60 samples by 1 series)"));
        assert!(printed.contains("Total params"));
        assert!(printed.contains("actual\tpredicted\n54\t"));
        assert!(printed.contains("\nnext\t"));
    }

    #[test]
    fn test_valid_padding_default_collapses() {
        let config = RegressorConfig {
            padding: Padding::Valid,
            ..Default::default()
        };
        let result = evaluate_regressor(
            &linear_ramp(config.series_length),
            &config,
            &WeightFiles::default(),
            &mut std::io::sink(),
        );
        assert!(matches!(
            result,
            Err(ExperimentError::Model(ModelError::InvalidArchitecture(_)))
        ));
    }

    #[test]
    fn test_too_small_test_fraction() {
        let config = RegressorConfig {
            test_fraction: 0.001,
            ..small_config()
        };
        let result = evaluate_regressor(
            &linear_ramp(config.series_length),
            &config,
            &WeightFiles::default(),
            &mut std::io::sink(),
        );
        assert!(matches!(result, Err(ExperimentError::Dataset(_))));
    }

    #[test]
    fn test_saved_weights_reproduce_predictions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("regressor.npz");
        let config = small_config();
        let series = linear_ramp(config.series_length);

        let trained = evaluate_regressor(
            &series,
            &config,
            &WeightFiles {
                load: None,
                save: Some(path.clone()),
            },
            &mut std::io::sink(),
        )
        .unwrap();
        let untrained = RegressorConfig {
            training: TrainingConfig {
                epochs: 0,
                ..config.training.clone()
            },
            ..config.clone()
        };
        let reloaded = evaluate_regressor(
            &series,
            &untrained,
            &WeightFiles {
                load: Some(path),
                save: None,
            },
            &mut std::io::sink(),
        )
        .unwrap();

        assert_eq!(trained.report.predicted, reloaded.report.predicted);
        assert_eq!(trained.report.next, reloaded.report.next);
        dir.close().unwrap();
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: RegressorConfig =
            serde_json::from_str(r#"{"window_size": 10, "epochs": 3, "padding": "valid"}"#)
                .unwrap();
        assert_eq!(config.window_size, 10);
        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.training.batch_size, 2);
        assert_eq!(config.padding, Padding::Valid);
        assert_eq!(config.series_length, 1000);
    }
}
