use crate::SamplePrecision;
use ndarray::*;

/// Number of classes of the digit datasets the classifier was built for.
pub const NUM_CLASSES: usize = 10;

/// One indicator row per label. Labels outside `0..num_classes` give an all-zero row.
pub fn one_hot_encode(labels: &[usize], num_classes: usize) -> Array2<SamplePrecision> {
    let mut encoded = Array2::zeros((labels.len(), num_classes));
    for (mut row, &label) in encoded.outer_iter_mut().zip(labels.iter()) {
        if label < num_classes {
            row[label] = 1.0;
        }
    }
    encoded
}

/// One-hot encoding with the fixed width of `NUM_CLASSES`.
pub fn one_hot_encode_digits(labels: &[usize]) -> Array2<SamplePrecision> {
    one_hot_encode(labels, NUM_CLASSES)
}

/// Index of the largest entry in every row; the first one wins ties.
pub fn argmax_rows<'a, V>(array: V) -> Vec<usize>
where
    V: AsArray<'a, SamplePrecision, Ix2>,
{
    let array: ArrayView2<SamplePrecision> = array.into();
    array
        .outer_iter()
        .map(|row| {
            row.indexed_iter()
                .fold((0, SamplePrecision::NEG_INFINITY), |(best, max), (i, &x)| {
                    if x > max {
                        (i, x)
                    } else {
                        (best, max)
                    }
                })
                .0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_hot_digits() {
        for k in 0..NUM_CLASSES {
            let encoded = one_hot_encode_digits(&[k]);
            assert_eq!(encoded.dim(), (1, 10));
            for (i, v) in encoded.row(0).iter().enumerate() {
                assert_eq!(*v, if i == k { 1.0 } else { 0.0 });
            }
        }
    }

    #[test]
    fn test_out_of_range_label_is_all_zero() {
        let encoded = one_hot_encode(&[1, 3], 3);
        assert_eq!(encoded, array![[0., 1., 0.], [0., 0., 0.]]);
    }

    #[test]
    fn test_argmax_inverts_one_hot() {
        let labels = vec![3, 0, 9, 9, 4];
        assert_eq!(argmax_rows(&one_hot_encode_digits(&labels)), labels);
        assert_eq!(argmax_rows(&array![[0.2, 0.2, 0.1]]), vec![0]);
    }
}
