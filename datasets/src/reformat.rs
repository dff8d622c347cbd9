//! Shaping and shuffling of classification data.
use crate::{encoding::one_hot_encode, DatasetError, DatasetResult, SamplePrecision};
use ndarray::*;
use rand::{seq::SliceRandom, Rng};

/// Applies the same random permutation to the leading axis of `dataset` and `labels`.
pub fn randomize<D, R>(
    dataset: &Array<SamplePrecision, D>,
    labels: &Array2<SamplePrecision>,
    rng: &mut R,
) -> DatasetResult<(Array<SamplePrecision, D>, Array2<SamplePrecision>)>
where
    D: RemoveAxis,
    R: Rng + ?Sized,
{
    let rows = dataset.len_of(Axis(0));
    if rows != labels.nrows() {
        return Err(DatasetError::LabelCount {
            rows,
            labels: labels.nrows(),
        });
    }
    let mut permutation: Vec<usize> = (0..rows).collect();
    permutation.shuffle(rng);
    Ok((
        dataset.select(Axis(0), &permutation),
        labels.select(Axis(0), &permutation),
    ))
}

/// Turns flat samples, one per row, into (samples, steps, channels) sequences with
/// one-hot labels, shuffled.
pub fn reformat_data<'a, V, R>(
    dataset: V,
    labels: &[usize],
    steps: usize,
    channels: usize,
    num_classes: usize,
    rng: &mut R,
) -> DatasetResult<(Array3<SamplePrecision>, Array2<SamplePrecision>)>
where
    V: AsArray<'a, SamplePrecision, Ix2>,
    R: Rng + ?Sized,
{
    let dataset: ArrayView2<SamplePrecision> = dataset.into();
    let rows = dataset.nrows();
    if rows != labels.len() {
        return Err(DatasetError::LabelCount {
            rows,
            labels: labels.len(),
        });
    }
    let sequences =
        Array::from_iter(dataset.iter().cloned()).into_shape((rows, steps, channels))?;
    let encoded = one_hot_encode(labels, num_classes);
    randomize(&sequences, &encoded, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::argmax_rows;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_randomize_keeps_pairs_aligned() {
        // the label of every row is the row's first value
        let dataset = Array::from_shape_fn((20, 3, 1), |(i, t, _)| (i + t) as f32);
        let labels = crate::encoding::one_hot_encode(&(0..20).collect::<Vec<_>>(), 20);
        let mut rng = StdRng::seed_from_u64(42);

        let (shuffled, shuffled_labels) = randomize(&dataset, &labels, &mut rng).unwrap();

        assert_ne!(shuffled, dataset);
        for (row, label) in argmax_rows(&shuffled_labels).into_iter().enumerate() {
            assert_eq!(shuffled[[row, 0, 0]], label as f32);
            assert_eq!(shuffled[[row, 2, 0]], label as f32 + 2.);
        }
    }

    #[test]
    fn test_reformat_data() {
        let flat = array![[1., 2., 3., 4.], [5., 6., 7., 8.]];
        let mut rng = StdRng::seed_from_u64(0);

        let (sequences, labels) = reformat_data(&flat, &[7, 2], 2, 2, 10, &mut rng).unwrap();

        assert_eq!(sequences.dim(), (2, 2, 2));
        assert_eq!(labels.dim(), (2, 10));
        for (row, label) in argmax_rows(&labels).into_iter().enumerate() {
            let expected_first = if label == 7 { 1. } else { 5. };
            assert_eq!(sequences[[row, 0, 0]], expected_first);
        }
    }

    #[test]
    fn test_reformat_data_checks_shapes() {
        let flat = array![[1., 2., 3.]];
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            reformat_data(&flat, &[1], 2, 2, 10, &mut rng),
            Err(DatasetError::Shape(_))
        ));
        assert!(matches!(
            reformat_data(&flat, &[1, 2], 3, 1, 10, &mut rng),
            Err(DatasetError::LabelCount { .. })
        ));
    }
}
