use super::PhysicalModel;
use tns_core::{
    models::{EnergyType, TimeInterval, Vertex},
    ports::MarketView,
};

/// A resource that always offers the same curve, whatever the market.
#[derive(Clone, Debug, PartialEq)]
pub struct FixedCurve {
    vertices: Vec<Vertex>,
}

impl FixedCurve {
    /// Offer `vertices` in every interval
    pub fn new(vertices: Vec<Vertex>) -> Self {
        Self { vertices }
    }
}

impl PhysicalModel for FixedCurve {
    fn vertices(&self, _: EnergyType, _: &TimeInterval, _: &MarketView) -> Option<Vec<Vertex>> {
        Some(self.vertices.clone())
    }
}
