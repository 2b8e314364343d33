use super::{Observation, PhysicalModel};
use tns_core::{
    models::{EnergyType, InflexibleSpec, TimeInterval, Vertex},
    ports::{MarketView, Measurement},
};

/// A building whose electric load does not respond to price.
///
/// The load is forecast from an hour-of-day profile. A fresh measurement
/// replaces the forecast for the interval in progress.
#[derive(Clone, Debug)]
pub struct InflexibleBuilding {
    spec: InflexibleSpec,
    latest: Option<Measurement>,
}

impl InflexibleBuilding {
    /// A load following `spec`'s profile
    pub fn new(spec: InflexibleSpec) -> Self {
        Self { spec, latest: None }
    }

    /// Forecast consumption (kW, positive) for `interval` as seen at `now`
    pub fn forecast(&self, interval: &TimeInterval, now: time::OffsetDateTime) -> f64 {
        let measured = self.latest.as_ref().filter(|m| {
            interval.contains(now) && m.timestamp <= now && now - m.timestamp <= self.spec.measurement_max_age
        });
        if let Some(measurement) = measured {
            return measurement.value;
        }

        let profile = &self.spec.load_profile;
        match profile.len() {
            0 => 0.0,
            1 => profile[0],
            n => profile[usize::from(interval.start.hour()) % n],
        }
    }
}

impl PhysicalModel for InflexibleBuilding {
    fn vertices(
        &self,
        energy_type: EnergyType,
        interval: &TimeInterval,
        market: &MarketView,
    ) -> Option<Vec<Vertex>> {
        (energy_type == EnergyType::Electricity)
            .then(|| vec![Vertex::hard_limit(-self.forecast(interval, market.now))])
    }

    fn measurement_points(&self) -> Vec<String> {
        vec![self.spec.measurement_point.clone()]
    }

    fn observe(&mut self, observation: Observation) {
        if let Observation::Measurement { point, measurement } = observation {
            if point == self.spec.measurement_point {
                self.latest = Some(measurement);
            }
        }
    }
}
