use serde::{Deserialize, Serialize};

/// Coefficients of `input = a0 + a1·output + a2·output²`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitCoefficients {
    /// Constant term
    pub a0: f64,
    /// Linear term
    pub a1: f64,
    /// Quadratic term
    pub a2: f64,
}

impl FitCoefficients {
    /// Input energy needed to produce `output`
    pub fn evaluate(&self, output: f64) -> f64 {
        self.a0 + output * (self.a1 + output * self.a2)
    }
}

/// Source of fitted efficiency curves for thermal generators.
pub trait CurveFitRepository {
    /// Error type for lookup failures
    type Error: std::error::Error + Send + Sync + 'static;

    /// The fitted curve stored under `key`, if there is enough data for one.
    fn fit(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<FitCoefficients>, Self::Error>> + Send;
}
