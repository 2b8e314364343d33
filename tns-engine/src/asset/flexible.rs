use super::PhysicalModel;
use crate::curve;
use tns_core::{
    models::{ComfortBand, EnergyType, Map, TimeInterval, Vertex},
    ports::MarketView,
};

/// A building that trades occupant comfort against energy cost.
///
/// Each commodity the building buys has its own comfort band. Holding the
/// set point costs the neutral load; drifting towards a bound of the band
/// shifts the load by the building's internal mass per degree.
#[derive(Clone, Debug)]
pub struct FlexibleBuilding {
    bands: Map<EnergyType, ComfortBand>,
}

impl FlexibleBuilding {
    /// A building with one comfort band per commodity
    pub fn new(bands: Map<EnergyType, ComfortBand>) -> Self {
        Self { bands }
    }
}

/// The three-vertex demand curve of one comfort band.
///
/// The price at a bound is offset from the reference price by the comfort
/// cost per kW of shifted load, `c·g / ((T_bound − T_set)·m)`. A band with no
/// room on one side puts that bound at an infinite price.
pub fn comfort_vertices(band: &ComfortBand, reference_price: f64) -> Vec<Vertex> {
    let neutral = band.neutral_load;
    let mass = band.internal_mass;
    let offset = |width: f64| {
        let shift = width * mass;
        if shift == 0.0 {
            f64::INFINITY
        } else {
            band.comfort_cost * band.comfort_gain / shift
        }
    };

    let hot = band.upper_bound - band.set_point;
    let cold = band.set_point - band.lower_bound;
    let mut vertices = vec![
        Vertex::new(reference_price, 0.0, -neutral),
        Vertex::new(
            (reference_price - offset(hot)).max(0.0),
            0.0,
            -(neutral + hot * mass),
        ),
        Vertex::new(
            reference_price + offset(cold),
            0.0,
            -(neutral - cold * mass).max(0.0),
        ),
    ];
    curve::integrate_costs(&mut vertices);
    vertices
}

impl PhysicalModel for FlexibleBuilding {
    fn vertices(
        &self,
        energy_type: EnergyType,
        _: &TimeInterval,
        market: &MarketView,
    ) -> Option<Vec<Vertex>> {
        let band = self.bands.get(&energy_type)?;
        let reference = band.reference_price.unwrap_or(market.default_price);
        Some(comfort_vertices(band, reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tns_core::models::validate_vertices;

    fn band() -> ComfortBand {
        ComfortBand {
            neutral_load: 1000.0,
            set_point: 23.0,
            upper_bound: 25.0,
            lower_bound: 21.0,
            internal_mass: 1000.0,
            comfort_cost: 100.0,
            comfort_gain: 2.0,
            reference_price: None,
        }
    }

    #[test]
    fn three_vertices_ordered_by_power() {
        let vertices = comfort_vertices(&band(), 0.05);
        assert_eq!(vertices.len(), 3);
        assert!(validate_vertices(&vertices).is_ok());

        let hot = &vertices[0];
        assert_eq!(hot.power, -3000.0);
        assert_eq!(hot.marginal_price, 0.0);

        let neutral = &vertices[1];
        assert_eq!(neutral.power, -1000.0);
        assert_eq!(neutral.marginal_price, 0.05);

        let cold = &vertices[2];
        assert_eq!(cold.power, 0.0);
        assert_abs_diff_eq!(cold.marginal_price, 0.15, epsilon = 1e-12);
    }

    #[test]
    fn closed_band_is_a_hard_bound() {
        let mut band = band();
        band.lower_bound = band.set_point;
        let vertices = comfort_vertices(&band, 0.05);
        let cold = vertices.last().unwrap();
        assert!(cold.marginal_price.is_infinite());
        assert_eq!(cold.power, -1000.0);
    }
}
