use super::{Observation, PhysicalModel};
use tns_core::{
    models::{EnergyType, ThermalSpec, TimeInterval, Vertex},
    ports::{FitCoefficients, MarketView},
};
use tracing::{Level, event};

/// Step used to estimate the marginal input per kW of output
const DELTA: f64 = 1.0;

/// A boiler, chiller or gas turbine.
///
/// Fuel input is a quadratic function of output, fitted from operating data
/// when a fit is available and a constant efficiency otherwise. The offered
/// curve has a vertex at minimum and at maximum output, each priced at the
/// marginal fuel cost there.
#[derive(Clone, Debug)]
pub struct ThermalGenerator {
    output: EnergyType,
    spec: ThermalSpec,
    fit: Option<FitCoefficients>,
}

impl ThermalGenerator {
    /// A generator producing `output` with no fitted curve yet
    pub fn new(output: EnergyType, spec: ThermalSpec) -> Self {
        Self {
            output,
            spec,
            fit: None,
        }
    }

    /// Fuel input needed for `output` kW
    pub fn input(&self, output: f64) -> f64 {
        match &self.fit {
            Some(fit) => fit.evaluate(output),
            None => output / self.spec.assumed_efficiency,
        }
    }

    /// Marginal fuel cost of one more kW at `output`
    pub fn marginal_price(&self, output: f64) -> f64 {
        self.spec.fuel_price * (self.input(output + DELTA) - self.input(output)) / DELTA
    }

    fn accept(&mut self, fit: Option<FitCoefficients>) {
        let Some(fit) = fit else {
            event!(
                Level::WARN,
                key = self.spec.curve_fit.as_deref().unwrap_or_default(),
                efficiency = self.spec.assumed_efficiency,
                "no efficiency curve, assuming constant efficiency"
            );
            self.fit = None;
            return;
        };

        let candidate = Self {
            fit: Some(fit),
            ..self.clone()
        };
        let (lo, hi) = (
            candidate.marginal_price(self.spec.min_power),
            candidate.marginal_price(self.spec.max_power),
        );
        if lo.is_finite() && hi.is_finite() && lo >= 0.0 && lo <= hi {
            self.fit = Some(fit);
        } else {
            event!(
                Level::WARN,
                key = self.spec.curve_fit.as_deref().unwrap_or_default(),
                "fitted efficiency curve is not convex over the operating range, assuming constant efficiency"
            );
            self.fit = None;
        }
    }
}

impl PhysicalModel for ThermalGenerator {
    fn vertices(&self, energy_type: EnergyType, _: &TimeInterval, _: &MarketView) -> Option<Vec<Vertex>> {
        if energy_type != self.output {
            return None;
        }
        let vertex = |power: f64| {
            Vertex::new(
                self.marginal_price(power),
                self.spec.fuel_price * self.input(power),
                power,
            )
        };
        let (lo, hi) = (self.spec.min_power, self.spec.max_power);
        Some(if lo == hi {
            // a fixed output cannot be moved by price
            vec![Vertex::new(f64::INFINITY, self.spec.fuel_price * self.input(lo), lo)]
        } else {
            vec![vertex(lo), vertex(hi)]
        })
    }

    fn curve_fit_key(&self) -> Option<String> {
        self.spec.curve_fit.clone()
    }

    fn observe(&mut self, observation: Observation) {
        if let Observation::CurveFit(fit) = observation {
            self.accept(fit);
        }
    }

    fn reports_mass_flow(&self, energy_type: EnergyType) -> bool {
        energy_type == self.output && energy_type.is_thermal()
    }
}
