//! Command line interface to the two convolutional network experiments.

use convnet::{
    classifier::{run_classifier, ClassificationData, ClassifierConfig},
    inputs::read_series,
    regressor::{evaluate_regressor, RegressorConfig, WeightFiles},
    ExperimentResult,
};
use datasets::synthetic::linear_ramp;
use env_logger::Builder;
use ml::convolutions::Padding;
use quicli::prelude::*;
use std::{io, path::PathBuf};
use structopt::StructOpt;

/// Predicts the next value of a timeseries with stacked 1D convolutions
#[derive(Debug, StructOpt)]
struct RegressOpts {
    /// Timeseries as .npy, one column per series. Defaults to the ramp f(t) = t
    #[structopt(short = "s", long = "series", parse(from_os_str))]
    series: Option<PathBuf>,
    /// JSON file with regressor settings, missing keys keep their defaults
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    config: Option<PathBuf>,
    /// Number of previous samples seen per prediction
    #[structopt(short = "w", long = "window-size")]
    window_size: Option<usize>,
    #[structopt(long = "epochs")]
    epochs: Option<usize>,
    #[structopt(long = "batch-size")]
    batch_size: Option<usize>,
    #[structopt(long = "learning-rate")]
    learning_rate: Option<f32>,
    #[structopt(long = "seed")]
    seed: Option<u64>,
    /// Convolve without padding, shrinking every block by the filter length
    #[structopt(long = "valid-padding")]
    valid_padding: bool,
    /// Loads initial weights (.npz or .json)
    #[structopt(long = "load-weights", parse(from_os_str))]
    load_weights: Option<PathBuf>,
    /// Saves the trained weights (.npz or .json)
    #[structopt(long = "save-weights", parse(from_os_str))]
    save_weights: Option<PathBuf>,
    #[structopt(flatten)]
    verbosity: Verbosity,
}

/// Trains a dense classifier over whole sequences
#[derive(Debug, StructOpt)]
struct ClassifyOpts {
    /// .npz archive with train_xs, train_ys, test_xs and test_ys. Defaults to generated waveforms
    #[structopt(short = "d", long = "data", parse(from_os_str))]
    data: Option<PathBuf>,
    /// JSON file with classifier settings, missing keys keep their defaults
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    config: Option<PathBuf>,
    #[structopt(long = "num-steps")]
    num_steps: Option<usize>,
    #[structopt(long = "display-step")]
    display_step: Option<usize>,
    #[structopt(long = "learning-rate")]
    learning_rate: Option<f32>,
    #[structopt(long = "seed")]
    seed: Option<u64>,
    #[structopt(flatten)]
    verbosity: Verbosity,
}

/// One dimensional convolutional networks for timeseries and sequence classification.
#[derive(Debug, StructOpt)]
#[structopt(name = "convnet")]
enum Convnet {
    #[structopt(
        name = "regress",
        about = "Trains a convolutional regressor on a timeseries and extrapolates one step."
    )]
    Regress(RegressOpts),
    #[structopt(
        name = "classify",
        about = "Trains a single layer classifier with gradient descent, reporting accuracy as it goes."
    )]
    Classify(ClassifyOpts),
}

/// Trait for the subcommands that convnet uses
trait ConvnetOpts {
    /// Performs the subcommand
    fn run(&self) -> CliResult;
    /// Returns the verbosity command
    fn get_verbosity(&self) -> &Verbosity;
    /// Sets up logging
    fn setup_env_logger(&self) -> CliResult {
        let mut builder = Builder::from_default_env();

        builder
            .filter(None, self.get_verbosity().log_level().to_level_filter())
            .init();

        Ok(())
    }
}

impl RegressOpts {
    /// Defaults, then the config file, then the flags.
    fn config(&self) -> ExperimentResult<RegressorConfig> {
        let mut config = match &self.config {
            Some(path) => RegressorConfig::from_json_file(path)?,
            None => RegressorConfig::default(),
        };
        if let Some(window_size) = self.window_size {
            config.window_size = window_size;
        }
        if let Some(epochs) = self.epochs {
            config.training.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.training.batch_size = batch_size;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.learning_rate = learning_rate;
        }
        if let Some(seed) = self.seed {
            config.training.seed = seed;
        }
        if self.valid_padding {
            config.padding = Padding::Valid;
        }
        Ok(config)
    }
}

impl ConvnetOpts for RegressOpts {
    fn run(&self) -> CliResult {
        let config = self.config()?;
        let series = match &self.series {
            Some(path) => read_series(path)?,
            None => {
                println!("\nSimple single melody vector prediction");
                linear_ramp(config.series_length).into_dyn()
            }
        };
        let weights = WeightFiles {
            load: self.load_weights.clone(),
            save: self.save_weights.clone(),
        };
        let stdout = io::stdout();
        evaluate_regressor(&series, &config, &weights, &mut stdout.lock())?;
        Ok(())
    }

    fn get_verbosity(&self) -> &Verbosity {
        &self.verbosity
    }
}

impl ClassifyOpts {
    /// Defaults, then the config file, then the flags.
    fn config(&self) -> ExperimentResult<ClassifierConfig> {
        let mut config = match &self.config {
            Some(path) => ClassifierConfig::from_json_file(path)?,
            None => ClassifierConfig::default(),
        };
        if let Some(num_steps) = self.num_steps {
            config.num_steps = num_steps;
        }
        if let Some(display_step) = self.display_step {
            config.display_step = display_step;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.learning_rate = learning_rate;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        Ok(config)
    }
}

impl ConvnetOpts for ClassifyOpts {
    fn run(&self) -> CliResult {
        let config = self.config()?;
        let data = match &self.data {
            Some(path) => ClassificationData::from_npz(path, &config)?,
            None => ClassificationData::synthetic(&config)?,
        };
        let stdout = io::stdout();
        run_classifier(&data, &config, &mut stdout.lock())?;
        Ok(())
    }

    fn get_verbosity(&self) -> &Verbosity {
        &self.verbosity
    }
}

impl ConvnetOpts for Convnet {
    fn run(&self) -> CliResult {
        match self {
            Convnet::Regress(c) => c.run(),
            Convnet::Classify(c) => c.run(),
        }
    }

    fn get_verbosity(&self) -> &Verbosity {
        match self {
            Convnet::Regress(c) => c.get_verbosity(),
            Convnet::Classify(c) => c.get_verbosity(),
        }
    }
}

fn main() -> CliResult {
    let args = Convnet::from_args();
    args.setup_env_logger()?;
    args.run()
}
