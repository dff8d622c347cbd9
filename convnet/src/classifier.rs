//! Single dense layer classifier over whole sequences, trained by full-batch
//! gradient descent with periodic loss and accuracy reports.
use crate::{
    inputs::{read_config, NpzDataset},
    ExperimentResult,
};
use datasets::{
    encoding::{one_hot_encode, NUM_CLASSES},
    reformat::{randomize, reformat_data},
    synthetic::labelled_waveforms,
    windowing::tail_size,
    DatasetError,
};
use log::info;
use ml::{
    losses::{Loss, Metric},
    models::make_classifier,
    optimizers::GradientDescent,
    training::StepReport,
};
use ndarray::{s, Array2, Array3, Axis};
use rand::{rngs::StdRng, SeedableRng};
use serde_derive::{Deserialize, Serialize};
use std::{io::Write, path::Path};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub num_steps: usize,
    pub display_step: usize,
    pub learning_rate: f32,
    pub num_classes: usize,
    pub seed: u64,
    /// Size of the generated data set used when no archive is given.
    pub synthetic_samples: usize,
    pub synthetic_steps: usize,
    pub test_fraction: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            num_steps: 10001,
            display_step: 1000,
            learning_rate: 0.5,
            num_classes: NUM_CLASSES,
            seed: 0,
            synthetic_samples: 500,
            synthetic_steps: 32,
            test_fraction: 0.2,
        }
    }
}

impl ClassifierConfig {
    pub fn from_json_file(path: &Path) -> ExperimentResult<Self> {
        read_config(path)
    }
}

/// Shuffled (samples, steps, channels) sequences with one-hot labels.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationData {
    pub train_xs: Array3<f32>,
    pub train_ys: Array2<f32>,
    pub test_xs: Array3<f32>,
    pub test_ys: Array2<f32>,
}

impl ClassificationData {
    /// Noisy waveforms from `labelled_waveforms`, with the last `test_fraction` of the
    /// shuffled samples held out.
    pub fn synthetic(config: &ClassifierConfig) -> ExperimentResult<Self> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let (waves, labels) = labelled_waveforms(
            config.synthetic_samples,
            config.synthetic_steps,
            config.num_classes,
            config.seed,
        );
        let flat = waves
            .into_shape((config.synthetic_samples, config.synthetic_steps))
            .map_err(DatasetError::from)?;
        let (xs, ys) = reformat_data(
            &flat,
            &labels,
            config.synthetic_steps,
            1,
            config.num_classes,
            &mut rng,
        )?;

        let available = xs.len_of(Axis(0));
        let test_size = tail_size(available, config.test_fraction);
        if test_size == 0 || test_size >= available {
            return Err(DatasetError::InvalidSplit {
                test_size,
                available,
            }
            .into());
        }
        let boundary = available - test_size;
        Ok(Self {
            train_xs: xs.slice(s![..boundary, .., ..]).to_owned(),
            train_ys: ys.slice(s![..boundary, ..]).to_owned(),
            test_xs: xs.slice(s![boundary.., .., ..]).to_owned(),
            test_ys: ys.slice(s![boundary.., ..]).to_owned(),
        })
    }

    /// Reads `train_xs`, `train_ys`, `test_xs` and `test_ys` from an .npz archive.
    pub fn from_npz(path: &Path, config: &ClassifierConfig) -> ExperimentResult<Self> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut archive = NpzDataset::open(path)?;
        let mut load = |prefix: &str| -> ExperimentResult<(Array3<f32>, Array2<f32>)> {
            let xs = archive.features(prefix)?;
            let ys = one_hot_encode(&archive.labels(prefix)?, config.num_classes);
            Ok(randomize(&xs, &ys, &mut rng)?)
        };
        let (train_xs, train_ys) = load("train")?;
        let (test_xs, test_ys) = load("test")?;
        info!(
            "read {} training and {} test sequences from {}",
            train_xs.len_of(Axis(0)),
            test_xs.len_of(Axis(0)),
            path.display()
        );
        Ok(Self {
            train_xs,
            train_ys,
            test_xs,
            test_ys,
        })
    }
}

/// Trains the classifier on `data`, writing a report to `out` every `display_step` steps.
pub fn run_classifier<W: Write>(
    data: &ClassificationData,
    config: &ClassifierConfig,
    out: &mut W,
) -> ExperimentResult<Vec<StepReport>> {
    let (_, steps, channels) = data.train_xs.dim();
    let mut compiled = make_classifier(steps, channels, config.num_classes, config.seed)?.compile(
        Loss::SoftmaxCrossEntropy,
        Metric::Accuracy,
        Box::new(GradientDescent::new(config.learning_rate)?),
    );
    writeln!(out, "Initialized...\n")?;

    let mut written = Ok(());
    let reports = compiled.fit_steps(
        &data.train_xs.clone().into_dyn(),
        &data.train_ys.clone().into_dyn(),
        config.num_steps,
        config.display_step,
        Some((&data.test_xs.clone().into_dyn(), &data.test_ys.clone().into_dyn())),
        |report| {
            if written.is_ok() {
                written = writeln!(
                    out,
                    "Step {:04} :\n \t Loss: {:06.2}\n \t Training Accuracy: {:02.2} % \n\t Test Accuracy {:02.2} %",
                    report.step,
                    report.loss,
                    report.train_metric,
                    report.test_metric.unwrap_or_default()
                );
            }
        },
    )?;
    written?;
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExperimentError;
    use ndarray::{array, Array};
    use ndarray_npy::NpzWriter;
    use std::fs::File;
    use tempfile::tempdir;

    fn small_config() -> ClassifierConfig {
        ClassifierConfig {
            num_steps: 301,
            display_step: 100,
            learning_rate: 0.1,
            num_classes: 3,
            synthetic_samples: 60,
            synthetic_steps: 16,
            test_fraction: 0.25,
            seed: 7,
            ..Default::default()
        }
    }

    #[test]
    fn test_synthetic_data_split() {
        let data = ClassificationData::synthetic(&small_config()).unwrap();
        assert_eq!(data.train_xs.dim(), (45, 16, 1));
        assert_eq!(data.train_ys.dim(), (45, 3));
        assert_eq!(data.test_xs.dim(), (15, 16, 1));
        assert!(data.test_ys.sum_axis(Axis(1)).iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_synthetic_data_needs_a_test_set() {
        let config = ClassifierConfig {
            test_fraction: 0.0,
            ..small_config()
        };
        assert!(matches!(
            ClassificationData::synthetic(&config),
            Err(ExperimentError::Dataset(DatasetError::InvalidSplit { .. }))
        ));
    }

    #[test]
    fn test_run_classifier_reports() {
        let config = small_config();
        let data = ClassificationData::synthetic(&config).unwrap();
        let mut out = Vec::new();

        let reports = run_classifier(&data, &config, &mut out).unwrap();

        let steps: Vec<usize> = reports.iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![0, 100, 200, 300]);
        assert!(reports[3].loss < reports[0].loss);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.starts_with("Initialized...\n\nStep 0000 :\n \t Loss: "));
        assert!(printed.contains("Step 0300 :"));
        assert!(printed.contains("\t Test Accuracy "));
    }

    #[test]
    fn test_from_npz() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("digits.npz");
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        let xs = Array::from_shape_fn((4, 3, 2), |(i, _, _)| i as f32);
        npz.add_array("train_xs", &xs).unwrap();
        npz.add_array("train_ys", &array![0i64, 1, 2, 3]).unwrap();
        npz.add_array("test_xs", &xs.slice(s![..2, .., ..]).to_owned()).unwrap();
        npz.add_array("test_ys", &array![0i64, 1]).unwrap();
        npz.finish().unwrap();

        let data = ClassificationData::from_npz(&path, &ClassifierConfig::default()).unwrap();

        assert_eq!(data.train_xs.dim(), (4, 3, 2));
        assert_eq!(data.train_ys.dim(), (4, 10));
        assert_eq!(data.test_xs.dim(), (2, 3, 2));
        // shuffling keeps every sequence next to its label
        for (x, y) in data.train_xs.outer_iter().zip(data.train_ys.outer_iter()) {
            assert_eq!(y[x[[0, 0]] as usize], 1.0);
        }
        dir.close().unwrap();
    }
}
