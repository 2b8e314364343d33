use serde::{Deserialize, Serialize};

/// The working fluid of a thermal distribution loop
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fluid {
    /// Steam heating loop
    #[default]
    Steam,
    /// Hot- or chilled-water loop
    Water,
}

impl Fluid {
    /// Specific heat (kJ/(kg·K))
    pub fn specific_heat(self) -> f64 {
        match self {
            Self::Steam => 2.014,
            Self::Water => 4.2032,
        }
    }
}

/// Physical parameters of the loop a thermal auction balances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoopParameters {
    /// Supply temperature (°C)
    pub supply_temperature: f64,
    /// Return temperature (°C)
    pub return_temperature: f64,
    /// The carrying fluid
    #[serde(default)]
    pub fluid: Fluid,
}

impl LoopParameters {
    /// Mass flow (kg/s) needed to carry `power` kW across the loop.
    ///
    /// With no temperature difference, any non-zero power needs infinite flow.
    pub fn mass_flow(&self, power: f64) -> f64 {
        let delta = self.fluid.specific_heat() * (self.supply_temperature - self.return_temperature);
        if delta == 0.0 {
            if power == 0.0 { 0.0 } else { f64::INFINITY }
        } else {
            power / delta
        }
    }
}
