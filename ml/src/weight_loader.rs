use crate::{models::Sequential, ModelResult, WeightPrecision};
use log::{debug, info};
use ndarray::{Array, ArrayBase, ArrayD, Dimension, IxDyn, ShapeError, StrideShape};
use ndarray_npy::{NpzReader, NpzWriter, ReadNpzError, WriteNpzError};
use serde_json::{self, Map, Value};
use std::ffi::OsStr;
use std::io::{Cursor, Read, Seek};
use std::{fs, path::Path};
use thiserror::Error;

type WeightResult<T> = Result<T, WeightError>;

#[derive(Error, Debug)]
pub enum WeightError {
    #[error("No weights with name {0} found")]
    WeightKeyError(String),
    #[error("Weight file didn't have the correct format (required: JSON dict of pairs (key, flattened array of weights))")]
    WeightFormatError,
    #[error("Weight file not found. Filesystem reported error\n {0}.")]
    WeightFileNotFoundError(#[from] std::io::Error),
    #[error("Weight file not readable. Filesystem reported error\n {0}.")]
    WeightFileNpzError(#[from] ReadNpzError),
    #[error("Weight file not writable. Filesystem reported error\n {0}.")]
    WeightFileNpzWriteError(#[from] WriteNpzError),
    #[error("Wrong shape for weight:\n {0}.")]
    WeightShapeError(#[from] ShapeError),
    #[error("Weight {name} has shape {found:?}, the model expects {expected:?}.")]
    WeightDimensionError {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("Unsupported weight file extension {0:?}, only .npz and .json are supported.")]
    WeightExtensionError(String),
}

pub trait WeightLoader {
    fn get_weight<D, Sh>(
        &mut self,
        param_name: &str,
        shape: Sh,
    ) -> WeightResult<Array<WeightPrecision, D>>
    where
        D: Dimension,
        Sh: Into<StrideShape<D>>;
}

pub struct JsonWeightLoader {
    content: Map<String, Value>,
}

impl JsonWeightLoader {
    pub fn new<P: AsRef<Path>>(path: P) -> WeightResult<JsonWeightLoader> {
        let raw_file = fs::read_to_string(path)?;
        let parsed: Value =
            serde_json::from_str(&raw_file).map_err(|_| WeightError::WeightFormatError)?;
        let content = parsed
            .as_object()
            .ok_or(WeightError::WeightFormatError)?
            .clone();
        Ok(JsonWeightLoader { content })
    }
}

impl WeightLoader for JsonWeightLoader {
    /// Returns weights with the given name from the weight loader. Weights are stored in a FLATTENED form
    /// (to facilitate working with JSON) and reshaped to the requested shape.
    fn get_weight<D, Sh>(
        &mut self,
        param_name: &str,
        shape: Sh,
    ) -> WeightResult<Array<WeightPrecision, D>>
    where
        D: Dimension,
        Sh: Into<StrideShape<D>>,
    {
        let raw_arr = self
            .content
            .get(param_name)
            .ok_or_else(|| WeightError::WeightKeyError(param_name.to_string()))?;

        let raw_value_vector = match raw_arr {
            Value::Array(v) => v,
            _ => return Err(WeightError::WeightFormatError),
        };

        let weight_vector: Result<Vec<_>, _> = raw_value_vector
            .iter()
            .map(|j| {
                j.as_f64()
                    .map(|v| v as WeightPrecision)
                    .ok_or(WeightError::WeightFormatError)
            })
            .collect();

        let weights = Array::from_shape_vec(shape, weight_vector?)?;

        Ok(weights)
    }
}

pub struct NpzWeightLoader<R>
where
    R: Seek + Read,
{
    handle: R,
}

impl NpzWeightLoader<std::fs::File> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> WeightResult<NpzWeightLoader<std::fs::File>> {
        let handle = std::fs::File::open(path)?;
        Ok(NpzWeightLoader { handle })
    }
}

impl<'a> NpzWeightLoader<Cursor<&'a [u8]>> {
    pub fn from_buffer(bytes_array: &'a [u8]) -> WeightResult<NpzWeightLoader<Cursor<&'a [u8]>>> {
        Ok(NpzWeightLoader {
            handle: Cursor::new(bytes_array),
        })
    }
}

impl<R> WeightLoader for NpzWeightLoader<R>
where
    R: Seek + Read,
{
    fn get_weight<D, Sh>(
        &mut self,
        param_name: &str,
        shape: Sh,
    ) -> WeightResult<Array<WeightPrecision, D>>
    where
        D: Dimension,
        Sh: Into<StrideShape<D>>,
    {
        // The reader in the npy package has to be mut, so we recreate it per weight.
        let mut reader = NpzReader::new(&mut self.handle)?;

        let arr: ArrayBase<_, D> = reader.by_name(param_name)?;

        let expected = shape.into();
        if arr.raw_dim() != *expected.raw_dim() {
            return Err(WeightError::WeightDimensionError {
                name: param_name.to_string(),
                expected: expected.raw_dim().slice().to_vec(),
                found: arr.shape().to_vec(),
            });
        }
        Ok(arr)
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(OsStr::to_str)
        .unwrap_or("")
        .to_lowercase()
}

impl Sequential {
    /// Overwrites every parameter of the model with the weight of the same key
    /// ("<layer>/<parameter>") from the loader.
    pub fn load_weights<L: WeightLoader>(&mut self, loader: &mut L) -> ModelResult<()> {
        for (key, param) in self.named_parameters() {
            let shape = param.value.shape().to_vec();
            let weight: ArrayD<WeightPrecision> = loader.get_weight(&key, IxDyn(&shape))?;
            if weight.shape() != shape.as_slice() {
                return Err(WeightError::WeightDimensionError {
                    name: key,
                    expected: shape,
                    found: weight.shape().to_vec(),
                }
                .into());
            }
            debug!("loaded {} {:?}", key, shape);
            param.value = weight;
        }
        Ok(())
    }

    /// Loads weights from an .npz or .json file, chosen by extension.
    pub fn load_weights_from_path<P: AsRef<Path>>(&mut self, path: P) -> ModelResult<()> {
        let path = path.as_ref();
        match extension(path).as_str() {
            "npz" => self.load_weights(&mut NpzWeightLoader::from_path(path)?)?,
            "json" => self.load_weights(&mut JsonWeightLoader::new(path)?)?,
            other => return Err(WeightError::WeightExtensionError(other.to_string()).into()),
        }
        info!("Loaded weights from {}", path.display());
        Ok(())
    }

    /// Saves all parameters to an .npz archive or a JSON dict of flattened arrays,
    /// chosen by extension.
    pub fn save_weights<P: AsRef<Path>>(&mut self, path: P) -> ModelResult<()> {
        let path = path.as_ref();
        match extension(path).as_str() {
            "npz" => {
                let mut npz = NpzWriter::new(fs::File::create(path).map_err(WeightError::from)?);
                for (key, param) in self.named_parameters() {
                    npz.add_array(key.as_str(), &param.value)
                        .map_err(WeightError::from)?;
                }
                npz.finish().map_err(WeightError::from)?;
            }
            "json" => {
                let mut content = Map::new();
                for (key, param) in self.named_parameters() {
                    let flat = param.value.iter().map(|w| Value::from(*w as f64)).collect();
                    content.insert(key, Value::Array(flat));
                }
                fs::write(path, Value::Object(content).to_string()).map_err(WeightError::from)?;
            }
            other => return Err(WeightError::WeightExtensionError(other.to_string()).into()),
        }
        info!("Saved weights to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;

    use super::*;
    use crate::models::{make_regressor, RegressorLayout};
    use ndarray::{array, Array1, Array2};
    use tempfile::tempdir;

    #[test]
    fn test_json_weight_loader() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("temp-weights.txt");
        let mut file = File::create(&file_path).unwrap();
        writeln!(
            file,
            // Rust escapes curly braces by doubling them
            "{{ \"arr1\": [0.0, 1e-3, 1.0], \"arr2\": [0.0, 1.0, 2.0, 3.0]}}"
        )
        .unwrap();

        let mut loader = JsonWeightLoader::new(file_path).unwrap();

        assert_eq!(
            loader.get_weight("arr1", 3).unwrap(),
            array![0.0, 1e-3, 1.0]
        );
        assert_eq!(
            loader.get_weight("arr2", (2, 2)).unwrap(),
            array![[0.0, 1.0], [2.0, 3.0]]
        );
        assert!(matches!(
            loader.get_weight::<ndarray::Ix1, _>("missing", 1),
            Err(WeightError::WeightKeyError(_))
        ));

        drop(file);
        dir.close().unwrap();
    }

    #[test]
    fn test_npz_weight_loader() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("temp-weights.npz");
        let file = File::create(&file_path).unwrap();
        let mut npz = NpzWriter::new(file);
        let a: Array2<f32> = array![[1., 2., 3.], [4., 5., 6.]];
        let b: Array1<f32> = array![7., 8., 9.];
        npz.add_array("a", &a).unwrap();
        npz.add_array("b", &b).unwrap();
        npz.finish().unwrap();

        let mut loader = NpzWeightLoader::from_path(&file_path).unwrap();

        assert_eq!(loader.get_weight("a", (2, 3)).unwrap(), a);
        assert_eq!(loader.get_weight("b", 3).unwrap(), b);
        assert!(matches!(
            loader.get_weight::<ndarray::Ix2, _>("a", (3, 2)),
            Err(WeightError::WeightDimensionError { .. })
        ));

        let bytes = fs::read(&file_path).unwrap();
        let mut buffered = NpzWeightLoader::from_buffer(&bytes).unwrap();
        assert_eq!(buffered.get_weight("b", 3).unwrap(), b);

        dir.close().unwrap();
    }

    fn saved_and_restored_predictions(file_name: &str) {
        let dir = tempdir().unwrap();
        let path = dir.path().join(file_name);
        let layout = RegressorLayout {
            window_size: 16,
            num_blocks: 2,
            ..Default::default()
        };
        let input = Array::from_shape_fn((3, 16, 1), |(b, t, _)| (b + t) as f32 / 10.).into_dyn();

        let mut original = make_regressor(&layout, 1).unwrap();
        original.save_weights(&path).unwrap();
        let expected = original.predict(&input).unwrap();

        let mut restored = make_regressor(&layout, 2).unwrap();
        assert_ne!(restored.predict(&input).unwrap(), expected);
        restored.load_weights_from_path(&path).unwrap();
        assert_eq!(restored.predict(&input).unwrap(), expected);

        dir.close().unwrap();
    }

    #[test]
    fn test_npz_save_load_round_trip() {
        saved_and_restored_predictions("model.npz");
    }

    #[test]
    fn test_json_save_load_round_trip() {
        saved_and_restored_predictions("model.json");
    }

    #[test]
    fn test_unknown_extension() {
        let mut model = make_regressor(&RegressorLayout::default(), 0).unwrap();
        assert!(model.save_weights("weights.bin").is_err());
    }
}
