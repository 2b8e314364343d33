//! Least-squares efficiency curves for thermal generators.

use std::convert::Infallible;
use tns_core::{
    models::Map,
    ports::{CurveFitRepository, FitCoefficients},
};

/// Fit `input = a0 + a1·output + a2·output²` to `(output, input)` samples.
///
/// Returns `None` with fewer than three samples or when the normal equations
/// are singular (for example, every sample at the same output).
pub fn fit_quadratic(samples: &[(f64, f64)]) -> Option<FitCoefficients> {
    if samples.len() < 3 {
        return None;
    }

    // Normal equations: (XᵀX) a = Xᵀy with X = [1, x, x²]
    let mut s = [0.0; 5];
    let mut t = [0.0; 3];
    for &(x, y) in samples {
        let mut xp = 1.0;
        for (k, sk) in s.iter_mut().enumerate() {
            *sk += xp;
            if k < 3 {
                t[k] += xp * y;
            }
            xp *= x;
        }
    }
    let mut m = [
        [s[0], s[1], s[2], t[0]],
        [s[1], s[2], s[3], t[1]],
        [s[2], s[3], s[4], t[2]],
    ];

    // Gaussian elimination with partial pivoting
    let scale = m
        .iter()
        .flat_map(|row| row[..3].iter())
        .fold(0.0_f64, |acc, x| acc.max(x.abs()));
    for col in 0..3 {
        let pivot = (col..3).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() <= scale * 1e-12 {
            return None;
        }
        m.swap(col, pivot);
        for row in col + 1..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..4 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let mut a = [0.0; 3];
    for row in (0..3).rev() {
        let known = (row + 1..3).map(|k| m[row][k] * a[k]).sum::<f64>();
        a[row] = (m[row][3] - known) / m[row][row];
    }

    a.iter().all(|x| x.is_finite()).then_some(FitCoefficients {
        a0: a[0],
        a1: a[1],
        a2: a[2],
    })
}

/// A curve-fit repository computed from raw samples held in memory.
#[derive(Clone, Debug, Default)]
pub struct SampleFits {
    samples: Map<String, Vec<(f64, f64)>>,
}

impl SampleFits {
    /// Store the `(output, input)` samples for `key`, replacing earlier ones
    pub fn insert(&mut self, key: impl Into<String>, samples: Vec<(f64, f64)>) {
        self.samples.insert(key.into(), samples);
    }
}

impl FromIterator<(String, Vec<(f64, f64)>)> for SampleFits {
    fn from_iter<I: IntoIterator<Item = (String, Vec<(f64, f64)>)>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

impl CurveFitRepository for SampleFits {
    type Error = Infallible;

    async fn fit(&self, key: &str) -> Result<Option<FitCoefficients>, Self::Error> {
        Ok(self.samples.get(key).and_then(|samples| fit_quadratic(samples)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn recovers_an_exact_quadratic() {
        let truth = FitCoefficients {
            a0: 20.0,
            a1: 1.1,
            a2: 0.0005,
        };
        let samples = [0.0, 100.0, 250.0, 400.0, 900.0]
            .map(|x| (x, truth.evaluate(x)))
            .to_vec();
        let fit = fit_quadratic(&samples).unwrap();
        assert_abs_diff_eq!(fit.a0, truth.a0, epsilon = 1e-6);
        assert_abs_diff_eq!(fit.a1, truth.a1, epsilon = 1e-8);
        assert_abs_diff_eq!(fit.a2, truth.a2, epsilon = 1e-10);
    }

    #[test]
    fn too_little_data_has_no_fit() {
        assert!(fit_quadratic(&[(1.0, 2.0), (2.0, 3.0)]).is_none());
        assert!(fit_quadratic(&[(5.0, 2.0), (5.0, 3.0), (5.0, 4.0)]).is_none());
    }

    #[tokio::test]
    async fn repository_fits_on_lookup() {
        let fits: SampleFits = [(
            "boiler".to_owned(),
            vec![(0.0, 10.0), (1.0, 12.0), (2.0, 14.0), (3.0, 16.0)],
        )]
        .into_iter()
        .collect();
        let fit = fits.fit("boiler").await.unwrap().unwrap();
        assert_abs_diff_eq!(fit.evaluate(10.0), 30.0, epsilon = 1e-9);
        assert!(fits.fit("chiller").await.unwrap().is_none());
    }
}
