use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A point on a piecewise-linear marginal cost curve.
///
/// Power is signed: positive values are generation (or export into the
/// owning node's bus), negative values are load. A marginal price of `+∞`
/// denotes a hard physical limit rather than an economic offer: the power at
/// that vertex is delivered (or consumed) regardless of price.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// The price of one more unit of power at this point (currency per kWh)
    #[serde(with = "super::extended")]
    pub marginal_price: f64,
    /// Cumulative production cost from zero power to this point (currency per hour)
    #[serde(default)]
    pub cost: f64,
    /// Signed power (kW)
    pub power: f64,
    /// Whether the curve may be interpolated across this point towards the next vertex
    #[serde(default = "default_continuity")]
    pub continuity: bool,
    /// Optional uncertainty in the power (kW)
    #[serde(default)]
    pub power_uncertainty: f64,
}

fn default_continuity() -> bool {
    true
}

impl Vertex {
    /// Create a continuous vertex with no power uncertainty
    pub fn new(marginal_price: f64, cost: f64, power: f64) -> Self {
        Self {
            marginal_price,
            cost,
            power,
            continuity: true,
            power_uncertainty: 0.0,
        }
    }

    /// A vertex that cannot be moved by any price
    pub fn hard_limit(power: f64) -> Self {
        Self::new(f64::INFINITY, 0.0, power)
    }

    /// Replace the continuity flag
    pub fn with_continuity(mut self, continuity: bool) -> Self {
        self.continuity = continuity;
        self
    }

    /// Whether this vertex encodes a physical limit rather than an offer
    pub fn is_hard_limit(&self) -> bool {
        self.marginal_price.is_infinite()
    }

    /// Order by power, then marginal price
    pub fn cmp_power(&self, other: &Self) -> Ordering {
        self.power
            .total_cmp(&other.power)
            .then(self.marginal_price.total_cmp(&other.marginal_price))
    }

    /// Order by marginal price, then power
    pub fn cmp_price(&self, other: &Self) -> Ordering {
        self.marginal_price
            .total_cmp(&other.marginal_price)
            .then(self.power.total_cmp(&other.power))
    }
}

/// Sort vertices in place by ascending power (ties broken by price).
pub fn sort_by_power(vertices: &mut [Vertex]) {
    vertices.sort_by(Vertex::cmp_power);
}

/// Check that a vertex set describes a valid curve.
///
/// # Validation
///
/// 1. No power, price or cost is NaN
/// 2. Power is finite
/// 3. Once sorted by power, marginal price is non-decreasing along every
///    continuous segment
pub fn validate_vertices(vertices: &[Vertex]) -> Result<(), VertexError> {
    for vertex in vertices {
        if vertex.power.is_nan() || vertex.marginal_price.is_nan() || vertex.cost.is_nan() {
            return Err(VertexError::NaN);
        }
        if vertex.power.is_infinite() {
            return Err(VertexError::Infinity);
        }
    }

    let mut sorted = vertices.to_vec();
    sort_by_power(&mut sorted);
    for pair in sorted.windows(2) {
        if pair[0].continuity && pair[1].marginal_price < pair[0].marginal_price {
            return Err(VertexError::NonMonotone);
        }
    }
    Ok(())
}

/// Errors that can occur when validating a vertex set
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum VertexError {
    /// Error when any coordinate value is NaN
    #[error("NaN value encountered")]
    NaN,
    /// Error when a vertex has infinite power
    #[error("Power cannot be infinite")]
    Infinity,
    /// Error when marginal price decreases with power on a continuous segment
    #[error("Marginal price decreases with power on a continuous segment")]
    NonMonotone,
}
