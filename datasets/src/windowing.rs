//! Sliding-window transform of a timeseries into supervised learning instances.
use crate::{DatasetError, DatasetResult, SamplePrecision};
use log::debug;
use ndarray::*;

/// Windowed instances of a timeseries with `series` parallel channels.
#[derive(Debug, Clone, PartialEq)]
pub struct Instances {
    /// Inputs to a predictor, shape (length - window_size, window_size, series).
    pub features: Array3<SamplePrecision>,
    /// For every row of `features`, the next value of every series, shape (length - window_size, series).
    pub targets: Array2<SamplePrecision>,
    /// The last window of the series, shape (1, window_size, series). This is what you
    /// would use to predict a hypothetical next (unprovided) value.
    pub query: Array3<SamplePrecision>,
}

impl Instances {
    pub fn len(&self) -> usize {
        self.features.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn window_size(&self) -> usize {
        self.features.len_of(Axis(1))
    }

    pub fn num_series(&self) -> usize {
        self.features.len_of(Axis(2))
    }
}

/// Promotes a timeseries to a (samples, series) matrix with time along the rows.
///
/// A vector becomes a single column. A matrix with exactly one row is taken to be a
/// single series laid out as a row vector and transposed into a column.
pub fn as_columns<S, D>(series: &ArrayBase<S, D>) -> DatasetResult<Array2<SamplePrecision>>
where
    S: Data<Elem = SamplePrecision>,
    D: Dimension,
{
    let series = series.view().into_dyn();
    match series.ndim() {
        1 => {
            let len = series.len();
            Ok(Array::from_iter(series.iter().cloned()).into_shape((len, 1))?)
        }
        2 => {
            let matrix = series.into_dimensionality::<Ix2>()?;
            if matrix.nrows() == 1 && matrix.ncols() > 1 {
                Ok(matrix.t().to_owned())
            } else {
                Ok(matrix.to_owned())
            }
        }
        rank => Err(DatasetError::UnsupportedRank(rank)),
    }
}

/// Makes input features and prediction targets from a timeseries.
///
/// `series` is either a vector or a (samples, series) matrix. Window `i` covers
/// samples `i..i + window_size` and its target is sample `i + window_size`.
pub fn make_instances<S, D>(series: &ArrayBase<S, D>, window_size: usize) -> DatasetResult<Instances>
where
    S: Data<Elem = SamplePrecision>,
    D: Dimension,
{
    let series = as_columns(series)?;
    let (length, num_series) = series.dim();
    if window_size == 0 || window_size >= length {
        return Err(DatasetError::InvalidWindowSize {
            window_size,
            length,
        });
    }

    let num_instances = length - window_size;
    let mut features = Array3::zeros((num_instances, window_size, num_series));
    for (start, mut instance) in features.outer_iter_mut().enumerate() {
        instance.assign(&series.slice(s![start..start + window_size, ..]));
    }
    let targets = series.slice(s![window_size.., ..]).to_owned();
    let query = series
        .slice(s![length - window_size.., ..])
        .to_owned()
        .insert_axis(Axis(0));

    debug!(
        "windowed {} samples x {} series into {} instances of size {}",
        length, num_series, num_instances, window_size
    );
    Ok(Instances {
        features,
        targets,
        query,
    })
}

/// Number of held-out instances for a test fraction of the raw sample count.
pub fn tail_size(num_samples: usize, fraction: f64) -> usize {
    (fraction * num_samples as f64).floor().max(0.0) as usize
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train_features: Array3<SamplePrecision>,
    pub train_targets: Array2<SamplePrecision>,
    pub test_features: Array3<SamplePrecision>,
    pub test_targets: Array2<SamplePrecision>,
}

/// Holds out the last `test_size` instances, keeping time order intact.
pub fn split_tail(instances: &Instances, test_size: usize) -> DatasetResult<TrainTestSplit> {
    let available = instances.len();
    if test_size == 0 || test_size >= available {
        return Err(DatasetError::InvalidSplit {
            test_size,
            available,
        });
    }
    let boundary = available - test_size;
    Ok(TrainTestSplit {
        train_features: instances.features.slice(s![..boundary, .., ..]).to_owned(),
        train_targets: instances.targets.slice(s![..boundary, ..]).to_owned(),
        test_features: instances.features.slice(s![boundary.., .., ..]).to_owned(),
        test_targets: instances.targets.slice(s![boundary.., ..]).to_owned(),
    })
}
