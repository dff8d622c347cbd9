//! Generated example data, so the experiments can run without any input files.
use crate::SamplePrecision;
use ndarray::*;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use std::f32::consts::PI;

const WAVEFORM_NOISE: SamplePrecision = 0.1;

/// The timeseries f(t) = t for t in 0..length.
pub fn linear_ramp(length: usize) -> Array1<SamplePrecision> {
    Array::range(0., length as SamplePrecision, 1.)
}

/// Noisy single-channel sinusoids, shape (num_samples, steps, 1). Sample `i` belongs
/// to class `i % num_classes` and completes `class + 1` periods over `steps` samples.
pub fn labelled_waveforms(
    num_samples: usize,
    steps: usize,
    num_classes: usize,
    seed: u64,
) -> (Array3<SamplePrecision>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let labels: Vec<usize> = (0..num_samples).map(|i| i % num_classes.max(1)).collect();

    let mut waves = Array3::zeros((num_samples, steps, 1));
    for (mut wave, &label) in waves.outer_iter_mut().zip(labels.iter()) {
        let frequency = (label + 1) as SamplePrecision;
        for (t, value) in wave.iter_mut().enumerate() {
            let phase = 2.0 * PI * frequency * t as SamplePrecision / steps as SamplePrecision;
            let noise: SamplePrecision = StandardNormal.sample(&mut rng);
            *value = phase.sin() + WAVEFORM_NOISE * noise;
        }
    }
    (waves, labels)
}
