//! Pairwise Pearson correlation of aligned closes.

use super::align::{align, AlignedSeries};
use crate::domain::PriceSeries;
use serde::{Deserialize, Serialize};

/// Square, symmetric matrix labelled like the aligned columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub labels: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.values.get(row).and_then(|r| r.get(col)).copied()
    }

    pub fn get_by_label(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.labels.iter().position(|l| l == a)?;
        let j = self.labels.iter().position(|l| l == b)?;
        self.get(i, j)
    }
}

/// Pearson correlation over positions where both values are present.
///
/// NaN with fewer than two such points or when either side is constant.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter(|(x, y)| !x.is_nan() && !y.is_nan())
        .map(|(&x, &y)| (x, y))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }

    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return f64::NAN;
    }
    (cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0)
}

pub fn correlation_of(aligned: &AlignedSeries) -> CorrelationMatrix {
    let k = aligned.width();
    let mut values = vec![vec![f64::NAN; k]; k];
    for i in 0..k {
        values[i][i] = 1.0;
        for j in (i + 1)..k {
            let r = pearson(&aligned.columns[i], &aligned.columns[j]);
            values[i][j] = r;
            values[j][i] = r;
        }
    }
    CorrelationMatrix {
        labels: aligned.labels.clone(),
        values,
    }
}

/// Align, then correlate every pair of closes.
pub fn correlate(series: &[PriceSeries]) -> CorrelationMatrix {
    correlation_of(&align(series))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(id: &str, closes: &[f64]) -> PriceSeries {
        let points: Vec<(NaiveDate, f64)> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| (NaiveDate::from_ymd_opt(2024, 4, 1 + i as u32).unwrap(), c))
            .collect();
        PriceSeries::from_closes(id, &points)
    }

    #[test]
    fn self_correlation_is_one() {
        let a = series("A", &[1.0, 3.0, 2.0, 5.0]);
        let m = correlate(&[a.clone(), a]);
        assert_eq!(m.len(), 2);
        for i in 0..2 {
            for j in 0..2 {
                assert!((m.get(i, j).unwrap() - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn symmetric_and_signed() {
        let a = series("A", &[1.0, 2.0, 3.0, 4.0]);
        let b = series("B", &[8.0, 6.0, 4.0, 2.0]);
        let c = series("C", &[1.0, 3.0, 2.0, 4.0]);
        let m = correlate(&[a, b, c]);
        assert!((m.get_by_label("A", "B").unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(m.get(0, 2), m.get(2, 0));
        assert_eq!(m.get(1, 2), m.get(2, 1));
    }

    #[test]
    fn degenerate_pairs_are_nan() {
        let flat = series("F", &[5.0, 5.0, 5.0]);
        let a = series("A", &[1.0, 2.0, 3.0]);
        let m = correlate(&[flat, a]);
        assert!(m.get(0, 1).unwrap().is_nan());
        assert_eq!(m.get(0, 0), Some(1.0));

        let one = correlate(&[series("A", &[1.0]), series("B", &[2.0])]);
        assert!(one.get(0, 1).unwrap().is_nan());
    }

    #[test]
    fn empty_input_gives_empty_matrix() {
        assert!(correlate(&[]).is_empty());
        assert!(correlate(&[PriceSeries::empty("E")]).is_empty());
    }
}
