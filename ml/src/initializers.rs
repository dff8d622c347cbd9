//! Weight initialisation schemes.
use crate::WeightPrecision;
use ndarray::{Array, ArrayD, IxDyn};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initializer {
    /// Uniform in [-limit, limit] with limit = sqrt(6 / (fan_in + fan_out)).
    GlorotUniform,
    /// Normal with mean 0, samples further than two standard deviations
    /// from the mean are drawn again.
    TruncatedNormal { stddev: WeightPrecision },
    Zeros,
}

impl Initializer {
    pub fn initialize<R: Rng + ?Sized>(
        &self,
        shape: &[usize],
        fan_in: usize,
        fan_out: usize,
        rng: &mut R,
    ) -> ArrayD<WeightPrecision> {
        let shape = IxDyn(shape);
        match *self {
            Initializer::GlorotUniform => {
                let limit = (6.0 / (fan_in + fan_out).max(1) as WeightPrecision).sqrt();
                let dist = Uniform::new_inclusive(-limit, limit);
                Array::from_shape_simple_fn(shape, || dist.sample(rng))
            }
            Initializer::TruncatedNormal { stddev } => match Normal::new(0.0, stddev) {
                Ok(dist) if stddev > 0.0 => Array::from_shape_simple_fn(shape, || loop {
                    let x: WeightPrecision = dist.sample(rng);
                    if x.abs() <= 2.0 * stddev {
                        break x;
                    }
                }),
                _ => Array::zeros(shape),
            },
            Initializer::Zeros => Array::zeros(shape),
        }
    }
}
