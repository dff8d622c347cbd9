use crate::{encoding::argmax_rows, DatasetError, DatasetResult, SamplePrecision};
use ndarray::*;
use std::fmt::Display;

fn check_same_shape<S1, S2, D>(a: &ArrayBase<S1, D>, b: &ArrayBase<S2, D>) -> DatasetResult<()>
where
    S1: Data<Elem = SamplePrecision>,
    S2: Data<Elem = SamplePrecision>,
    D: Dimension,
{
    if a.shape() != b.shape() {
        return Err(DatasetError::ShapeMismatch(
            a.shape().to_vec(),
            b.shape().to_vec(),
        ));
    }
    if a.is_empty() {
        return Err(DatasetError::Empty);
    }
    Ok(())
}

/// Mean squared error.
pub fn mse<S1, S2, D>(orig: &ArrayBase<S1, D>, rec: &ArrayBase<S2, D>) -> DatasetResult<f64>
where
    S1: Data<Elem = SamplePrecision>,
    S2: Data<Elem = SamplePrecision>,
    D: Dimension,
{
    check_same_shape(orig, rec)?;
    let sum: f64 = Zip::from(orig)
        .and(rec)
        .fold(0.0, |acc, &a, &b| acc + (a as f64 - b as f64).powi(2));
    Ok(sum / orig.len() as f64)
}

/// Mean absolute error.
pub fn mae<S1, S2, D>(orig: &ArrayBase<S1, D>, rec: &ArrayBase<S2, D>) -> DatasetResult<f64>
where
    S1: Data<Elem = SamplePrecision>,
    S2: Data<Elem = SamplePrecision>,
    D: Dimension,
{
    check_same_shape(orig, rec)?;
    let sum: f64 = Zip::from(orig)
        .and(rec)
        .fold(0.0, |acc, &a, &b| acc + (a as f64 - b as f64).abs());
    Ok(sum / orig.len() as f64)
}

/// Percentage of rows in which predictions and (one-hot) labels have the same argmax.
pub fn accuracy<S1, S2>(
    predictions: &ArrayBase<S1, Ix2>,
    labels: &ArrayBase<S2, Ix2>,
) -> DatasetResult<f64>
where
    S1: Data<Elem = SamplePrecision>,
    S2: Data<Elem = SamplePrecision>,
{
    check_same_shape(predictions, labels)?;
    let hits = argmax_rows(predictions)
        .into_iter()
        .zip(argmax_rows(labels))
        .filter(|(p, l)| p == l)
        .count();
    Ok(100.0 * hits as f64 / predictions.nrows() as f64)
}

/// Held-out targets next to what the model predicted for them, plus the
/// extrapolation one step past the end of the series.
pub struct PredictionReport {
    pub actual: Array2<SamplePrecision>,
    pub predicted: Array2<SamplePrecision>,
    pub next: Array1<SamplePrecision>,
}

impl PredictionReport {
    pub fn new(
        actual: Array2<SamplePrecision>,
        predicted: Array2<SamplePrecision>,
        next: Array1<SamplePrecision>,
    ) -> DatasetResult<Self> {
        check_same_shape(&actual, &predicted)?;
        if next.len() != actual.ncols() {
            return Err(DatasetError::ShapeMismatch(
                vec![actual.ncols()],
                next.shape().to_vec(),
            ));
        }
        Ok(Self {
            actual,
            predicted,
            next,
        })
    }

    pub fn mae(&self) -> DatasetResult<f64> {
        mae(&self.actual, &self.predicted)
    }
}

/// Single series print as plain numbers, several series as a bracketed list.
fn format_row(row: ArrayView1<SamplePrecision>) -> String {
    if row.len() == 1 {
        row[0].to_string()
    } else {
        let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        format!("[{}]", values.join(", "))
    }
}

impl Display for PredictionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "actual\tpredicted")?;
        for (actual, predicted) in self.actual.outer_iter().zip(self.predicted.outer_iter()) {
            writeln!(f, "{}\t{}", format_row(actual), format_row(predicted))?;
        }
        write!(f, "next\t{}", format_row(self.next.view()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn mse_test() {
        let orig = array![[[0., 1.]], [[0., 1.]]];
        let rec = array![[[0., 1.]], [[0., 0.]]];
        assert_eq!(mse(&orig, &rec).unwrap(), 0.25);
        assert_eq!(mse(&rec, &orig).unwrap(), 0.25);

        let orig2 = array![[[0., 1.]], [[0., 1.]]];
        let rec2 = array![[[0., 1.]], [[2., 1.]]];
        assert_eq!(mse(&orig2, &rec2).unwrap(), 1.0);
        assert_eq!(mse(&rec2, &orig2).unwrap(), 1.0);
    }

    #[test]
    fn mae_test() {
        let orig = array![1., -1., 4.];
        let rec = array![2., 1., 4.];
        assert_eq!(mae(&orig, &rec).unwrap(), 1.0);
        assert!(matches!(
            mae(&orig, &array![1., 2.]),
            Err(DatasetError::ShapeMismatch(_, _))
        ));
    }

    #[test]
    fn accuracy_test() {
        let predictions = array![[0.9, 0.1], [0.4, 0.6], [0.7, 0.3], [0.2, 0.8]];
        let labels = array![[1., 0.], [1., 0.], [1., 0.], [0., 1.]];
        assert_eq!(accuracy(&predictions, &labels).unwrap(), 75.0);
    }

    #[test]
    fn report_display() {
        let report = PredictionReport::new(
            array![[990.], [991.]],
            array![[989.5], [991.25]],
            array![1000.5],
        )
        .unwrap();
        assert_eq!(
            report.to_string(),
            "actual\tpredicted\n990\t989.5\n991\t991.25\nnext\t1000.5"
        );
        assert_eq!(report.mae().unwrap(), 0.375);
    }

    #[test]
    fn report_display_multi_series() {
        let report =
            PredictionReport::new(array![[1., 2.]], array![[1.5, 2.5]], array![3., 4.]).unwrap();
        assert_eq!(
            report.to_string(),
            "actual\tpredicted\n[1, 2]\t[1.5, 2.5]\nnext\t[3, 4]"
        );
        assert!(PredictionReport::new(array![[1.]], array![[1.]], array![1., 2.]).is_err());
    }
}
