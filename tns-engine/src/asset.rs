//! Local assets: the resources and loads a node owns.
//!
//! A [`LocalAsset`] does the bookkeeping every asset shares (one ledger per
//! market, default curves, scheduling on the offered curve) and delegates
//! the shape of its curve to a [`PhysicalModel`].

mod fixed;
mod flexible;
mod inflexible;
mod thermal;

pub use fixed::FixedCurve;
pub use flexible::{FlexibleBuilding, comfort_vertices};
pub use inflexible::InflexibleBuilding;
pub use thermal::ThermalGenerator;

use crate::scheduling;
use tns_core::{
    models::{
        AssetConfig, AssetKind, EnergyType, Map, MarketId, ModelId, ModelLedger, TimeInterval,
        Vertex,
    },
    ports::{FitCoefficients, MarketView, Measurement, Schedulable},
};

/// Data fetched from external collaborators on behalf of an asset
#[derive(Clone, Debug, PartialEq)]
pub enum Observation {
    /// A reading of one measurement point
    Measurement {
        /// The measurement point
        point: String,
        /// The reading
        measurement: Measurement,
    },
    /// The fitted efficiency curve, or `None` when there is too little data
    CurveFit(Option<FitCoefficients>),
}

/// The physics behind an asset's offered curve.
pub trait PhysicalModel: Send {
    /// The curve offered for `interval` in a market for `energy_type`.
    ///
    /// `None` means the model has nothing to say, and the asset falls back to
    /// its configured default vertices.
    fn vertices(
        &self,
        energy_type: EnergyType,
        interval: &TimeInterval,
        market: &MarketView,
    ) -> Option<Vec<Vertex>>;

    /// Measurement points this model wants to see before scheduling
    fn measurement_points(&self) -> Vec<String> {
        Vec::new()
    }

    /// Key of the efficiency curve this model wants to see before scheduling
    fn curve_fit_key(&self) -> Option<String> {
        None
    }

    /// Take in fetched data
    fn observe(&mut self, _observation: Observation) {}

    /// Whether this model needs loop mass flow reported for `energy_type`
    fn reports_mass_flow(&self, _energy_type: EnergyType) -> bool {
        false
    }
}

fn build_model(kind: &AssetKind) -> Box<dyn PhysicalModel> {
    match kind {
        AssetKind::InflexibleBuilding(spec) => Box::new(InflexibleBuilding::new(spec.clone())),
        AssetKind::FlexibleBuilding { bands } => Box::new(FlexibleBuilding::new(bands.clone())),
        AssetKind::Boiler(spec) => Box::new(ThermalGenerator::new(EnergyType::Heat, spec.clone())),
        AssetKind::Chiller(spec) => {
            Box::new(ThermalGenerator::new(EnergyType::Cooling, spec.clone()))
        }
        AssetKind::GasTurbine(spec) => {
            Box::new(ThermalGenerator::new(EnergyType::Electricity, spec.clone()))
        }
        AssetKind::FixedCurve(spec) => Box::new(FixedCurve::new(spec.vertices.clone())),
    }
}

/// A resource or load owned by a node
pub struct LocalAsset {
    id: ModelId,
    default_vertices: Map<EnergyType, Vec<Vertex>>,
    model: Box<dyn PhysicalModel>,
    ledgers: Map<MarketId, ModelLedger>,
}

impl LocalAsset {
    /// Build an asset from its configuration.
    ///
    /// `markets` lists the markets (and their commodities) the asset takes
    /// part in; one ledger is kept for each.
    pub fn new<'a>(config: &AssetConfig, markets: impl IntoIterator<Item = (&'a MarketId, EnergyType)>) -> Self {
        let mut asset = Self::with_model(config.id.clone(), build_model(&config.model), markets);
        asset.default_vertices = config.default_vertices.clone();
        asset
    }

    /// An asset driven by an arbitrary physical model
    pub fn with_model<'a>(
        id: ModelId,
        model: Box<dyn PhysicalModel>,
        markets: impl IntoIterator<Item = (&'a MarketId, EnergyType)>,
    ) -> Self {
        let ledgers = markets
            .into_iter()
            .map(|(market, energy_type)| {
                let ledger = ModelLedger::new(id.clone(), market.clone(), energy_type);
                (market.clone(), ledger)
            })
            .collect();
        Self {
            id,
            default_vertices: Map::default(),
            model,
            ledgers,
        }
    }

    /// Measurement points to fetch before the next cycle
    pub fn measurement_points(&self) -> Vec<String> {
        self.model.measurement_points()
    }

    /// Efficiency curve to fetch before the next cycle
    pub fn curve_fit_key(&self) -> Option<String> {
        self.model.curve_fit_key()
    }

    /// Hand fetched data to the physical model
    pub fn observe(&mut self, observation: Observation) {
        self.model.observe(observation);
    }

    /// Mass flow (kg/s) needed to deliver the scheduled power of `interval`
    pub fn mass_flow(&self, market: &MarketId, interval: &TimeInterval) -> Option<f64> {
        self.ledgers.get(market)?.mass_flows.get(interval).copied()
    }
}

impl Schedulable for LocalAsset {
    fn id(&self) -> &ModelId {
        &self.id
    }

    fn update_vertices(&mut self, market: &MarketView) {
        let Some(ledger) = self.ledgers.get_mut(market.id) else {
            return;
        };
        for interval in market.intervals {
            let vertices = self
                .model
                .vertices(market.energy_type, interval, market)
                .or_else(|| self.default_vertices.get(&market.energy_type).cloned())
                .unwrap_or_default();
            ledger.active_vertices.set(interval, vertices);
        }
    }

    fn schedule_power(&mut self, market: &MarketView) {
        let Some(ledger) = self.ledgers.get_mut(market.id) else {
            return;
        };
        scheduling::schedule_on_curve(ledger, market);

        if let Some(params) = market.loop_parameters {
            if self.model.reports_mass_flow(market.energy_type) {
                for interval in market.intervals {
                    let power = ledger.scheduled_power(interval).unwrap_or_default();
                    ledger.mass_flows.set(interval, params.mass_flow(power));
                }
            }
        }
    }

    fn update_costs(&mut self, market: &MarketView) {
        if let Some(ledger) = self.ledgers.get_mut(market.id) {
            scheduling::update_costs(ledger, market, |_, _| 0.0);
        }
    }

    fn ledger(&self, market: &MarketId) -> Option<&ModelLedger> {
        self.ledgers.get(market)
    }

    fn ledger_mut(&mut self, market: &MarketId) -> Option<&mut ModelLedger> {
        self.ledgers.get_mut(market)
    }
}
