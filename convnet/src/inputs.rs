//! Reading timeseries, datasets and configuration files from disk.
use crate::{ExperimentError, ExperimentResult};
use log::debug;
use ndarray::{Array1, Array3, ArrayD, Ix1, Ix3, OwnedRepr};
use ndarray_npy::{read_npy, NpzReader, ReadNpyError};
use serde::de::DeserializeOwned;
use std::{
    ffi::OsStr,
    fs::{self, File},
    io::{Read, Seek},
    path::Path,
};

/// Reads a timeseries stored as a float32 or float64 .npy array.
pub fn read_series(path: &Path) -> ExperimentResult<ArrayD<f32>> {
    match path.extension().and_then(OsStr::to_str) {
        Some("npy") => {}
        other => {
            return Err(ExperimentError::UnsupportedInput(
                other.unwrap_or("").to_string(),
            ))
        }
    }
    match read_npy::<_, ArrayD<f32>>(path) {
        Ok(series) => Ok(series),
        Err(ReadNpyError::WrongDescriptor(_)) => {
            debug!("{} is not float32, retrying as float64", path.display());
            let series: ArrayD<f64> = read_npy(path)?;
            Ok(series.mapv(|v| v as f32))
        }
        Err(e) => Err(e.into()),
    }
}

/// Reads a JSON configuration. Missing fields take their default values.
pub fn read_config<T: DeserializeOwned>(path: &Path) -> ExperimentResult<T> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// An .npz archive written by numpy names its members "<array>.npy".
fn member_name<R: Read + Seek>(npz: &mut NpzReader<R>, name: &str) -> ExperimentResult<String> {
    let with_suffix = format!("{}.npy", name);
    npz.names()?
        .into_iter()
        .find(|n| n == name || *n == with_suffix)
        .ok_or_else(|| {
            ExperimentError::UnsupportedInput(format!("archive without an array named {}", name))
        })
}

/// Labelled sequences from an .npz archive: `<prefix>_xs` with shape
/// (samples, steps, channels) and integer labels `<prefix>_ys`.
pub struct NpzDataset<R: Read + Seek> {
    npz: NpzReader<R>,
}

impl NpzDataset<File> {
    pub fn open(path: &Path) -> ExperimentResult<Self> {
        if path.extension().and_then(OsStr::to_str) != Some("npz") {
            return Err(ExperimentError::UnsupportedInput(path.display().to_string()));
        }
        Ok(Self {
            npz: NpzReader::new(File::open(path)?)?,
        })
    }
}

impl<R: Read + Seek> NpzDataset<R> {
    pub fn features(&mut self, prefix: &str) -> ExperimentResult<Array3<f32>> {
        let name = member_name(&mut self.npz, &format!("{}_xs", prefix))?;
        Ok(self.npz.by_name::<OwnedRepr<f32>, Ix3>(&name)?)
    }

    /// Labels stored as integers, or as floats holding whole numbers. Negative labels
    /// map past the last class and therefore encode to an all-zero row.
    pub fn labels(&mut self, prefix: &str) -> ExperimentResult<Vec<usize>> {
        let name = member_name(&mut self.npz, &format!("{}_ys", prefix))?;
        let to_class = |v: i64| if v < 0 { usize::MAX } else { v as usize };
        match self.npz.by_name::<OwnedRepr<i64>, Ix1>(&name) {
            Ok(labels) => Ok(labels.iter().map(|&v| to_class(v)).collect()),
            Err(_) => {
                let labels: Array1<f32> = self.npz.by_name(&name)?;
                Ok(labels.iter().map(|&v| to_class(v.round() as i64)).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};
    use ndarray_npy::{write_npy, NpzWriter};
    use tempfile::tempdir;

    #[test]
    fn test_read_series_f32_and_f64() {
        let dir = tempdir().unwrap();
        let f32_path = dir.path().join("ramp32.npy");
        let f64_path = dir.path().join("ramp64.npy");
        write_npy(&f32_path, &array![0f32, 1., 2.]).unwrap();
        write_npy(&f64_path, &array![[0f64, 10.], [1., 11.]]).unwrap();

        assert_eq!(read_series(&f32_path).unwrap(), array![0., 1., 2.].into_dyn());
        assert_eq!(
            read_series(&f64_path).unwrap(),
            array![[0., 10.], [1., 11.]].into_dyn()
        );
        assert!(matches!(
            read_series(&dir.path().join("ramp.csv")),
            Err(ExperimentError::UnsupportedInput(_))
        ));
        dir.close().unwrap();
    }

    #[test]
    fn test_npz_dataset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.npz");
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        let xs = Array::from_shape_fn((3, 4, 1), |(i, t, _)| (i * 4 + t) as f32);
        npz.add_array("train_xs", &xs).unwrap();
        npz.add_array("train_ys", &array![2i64, -1, 0]).unwrap();
        npz.add_array("test_ys", &array![1f32, 3.]).unwrap();
        npz.finish().unwrap();

        let mut dataset = NpzDataset::open(&path).unwrap();
        assert_eq!(dataset.features("train").unwrap(), xs);
        assert_eq!(dataset.labels("train").unwrap(), vec![2, usize::MAX, 0]);
        assert_eq!(dataset.labels("test").unwrap(), vec![1, 3]);
        assert!(dataset.features("test").is_err());
        dir.close().unwrap();
    }
}
