use serde::{Deserialize, Serialize};

/// The commodity a market clears and a record describes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyType {
    /// Real electrical power
    #[default]
    Electricity,
    /// Heat carried by a steam or hot-water loop
    Heat,
    /// Cooling carried by a chilled-water loop
    Cooling,
}

impl EnergyType {
    /// Whether this commodity is balanced through a thermal loop auction
    pub fn is_thermal(self) -> bool {
        matches!(self, Self::Heat | Self::Cooling)
    }

    /// The physical quantity used to tag scheduled powers of this commodity
    pub fn measurement(self) -> MeasurementType {
        match self {
            Self::Electricity => MeasurementType::RealPower,
            Self::Heat => MeasurementType::Heat,
            Self::Cooling => MeasurementType::Cooling,
        }
    }
}

/// Tags the quantity an [`IntervalValue`](super::IntervalValue) carries.
///
/// Every interval-indexed value in the system is tagged so that consumers can
/// dispatch on what it measures without inspecting the owning model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementType {
    /// Real electrical power (kW)
    RealPower,
    /// Reactive electrical power (kVAR)
    ReactivePower,
    /// Thermal power delivered as heat (kW)
    Heat,
    /// Thermal power delivered as cooling (kW)
    Cooling,
    /// Marginal price (currency per kWh)
    MarginalPrice,
    /// A vertex of an active supply or demand curve
    ActiveVertex,
    /// Scheduled power for an interval (kW)
    ScheduledPower,
    /// Production cost for an interval (currency)
    ProductionCost,
    /// Dual cost for an interval (currency)
    DualCost,
    /// Headroom between maximum and scheduled power (kW)
    ReserveMargin,
    /// Whether a resource is engaged in an interval
    Engagement,
    /// Net power of a market for an interval (kW)
    NetPower,
    /// Mass flow rate on a thermal loop (kg/s)
    MassFlow,
}
