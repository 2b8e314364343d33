//! Static configuration of a transactive node.
//!
//! These are plain serde models. The engine turns them into live markets,
//! assets and neighbors; `validate` catches the mistakes that would otherwise
//! surface as silent mis-scheduling.

use super::{
    EnergyType, LoopParameters, Map, MarketId, ModelId, NodeId, StateTiming, Vertex, VertexError,
    validate_vertices,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

/// How a market reconciles its neighbors within a cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearingMode {
    /// Iterate prices every cycle until they stop moving
    #[default]
    Convergent,
    /// Pass bids upstream and offers downstream as intervals move through their lead states
    Sequential,
}

/// Configuration of one market (or thermal auction) run by a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Unique (per node) market identifier
    pub id: MarketId,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// The commodity being cleared
    #[serde(default)]
    pub energy_type: EnergyType,
    /// Price used before a market has cleared and when no curve has a finite price
    #[serde(default = "default_price")]
    pub default_price: f64,
    /// Relative duality gap above which a converged balance is reported as suspect
    #[serde(default = "default_duality_gap_threshold")]
    pub duality_gap_threshold: f64,
    /// How far ahead intervals are created
    #[serde(default = "default_future_horizon", with = "humantime_serde")]
    pub future_horizon: Duration,
    /// Length of each interval; must be a whole number of seconds
    #[serde(default = "default_interval_duration", with = "humantime_serde")]
    pub interval_duration: Duration,
    /// Balance at most this many of the earliest open intervals per cycle
    #[serde(default)]
    pub intervals_to_clear: Option<usize>,
    /// Markets with a lower order are balanced before markets with a higher one
    #[serde(default)]
    pub market_order: u32,
    /// Reference instant that interval starts are aligned to
    #[serde(default = "default_clearing_time", with = "time::serde::rfc3339")]
    pub market_clearing_time: OffsetDateTime,
    /// The market does nothing before this instant
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub next_market_clearing_time: Option<OffsetDateTime>,
    /// Offset before the interval start at which upstream bidding begins
    #[serde(default = "default_market_lead", with = "humantime_serde")]
    pub market_lead: Duration,
    /// Offset before the interval start at which downstream offers begin
    #[serde(default = "default_delivery_lead", with = "humantime_serde")]
    pub delivery_lead: Duration,
    /// How long an interval stays around after it ends
    #[serde(default = "default_publish_duration", with = "humantime_serde")]
    pub publish_duration: Duration,
    /// Convergent or sequential
    #[serde(default)]
    pub clearing_mode: ClearingMode,
    /// Largest price change (per interval) still considered converged
    #[serde(default = "default_price_tolerance")]
    pub price_tolerance: f64,
    /// Hard cap on balance iterations
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Present for thermal auctions
    #[serde(default)]
    pub thermal_loop: Option<LoopParameters>,
}

fn default_price() -> f64 {
    0.05
}
fn default_duality_gap_threshold() -> f64 {
    0.01
}
fn default_future_horizon() -> Duration {
    Duration::from_secs(24 * 3600)
}
fn default_interval_duration() -> Duration {
    Duration::from_secs(3600)
}
fn default_clearing_time() -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH
}
fn default_market_lead() -> Duration {
    Duration::from_secs(30 * 60)
}
fn default_delivery_lead() -> Duration {
    Duration::from_secs(10 * 60)
}
fn default_publish_duration() -> Duration {
    Duration::from_secs(15 * 60)
}
fn default_price_tolerance() -> f64 {
    0.01
}
fn default_max_iterations() -> usize {
    100
}

impl MarketConfig {
    /// A market with every optional setting at its default
    pub fn new(id: impl Into<MarketId>, energy_type: EnergyType) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            energy_type,
            default_price: default_price(),
            duality_gap_threshold: default_duality_gap_threshold(),
            future_horizon: default_future_horizon(),
            interval_duration: default_interval_duration(),
            intervals_to_clear: None,
            market_order: 0,
            market_clearing_time: default_clearing_time(),
            next_market_clearing_time: None,
            market_lead: default_market_lead(),
            delivery_lead: default_delivery_lead(),
            publish_duration: default_publish_duration(),
            clearing_mode: ClearingMode::default(),
            price_tolerance: default_price_tolerance(),
            max_iterations: default_max_iterations(),
            thermal_loop: None,
        }
    }

    /// The offsets that drive the interval state machine
    pub fn timing(&self) -> StateTiming {
        StateTiming {
            future_horizon: self.future_horizon,
            market_lead: self.market_lead,
            delivery_lead: self.delivery_lead,
            publish_duration: self.publish_duration,
        }
    }

    /// Check the settings the engine relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let duration = self.interval_duration;
        if duration.is_zero() || duration.subsec_nanos() != 0 {
            return Err(ConfigError::IntervalDuration {
                market: self.id.clone(),
                duration,
            });
        }
        if !(self.price_tolerance > 0.0) || self.max_iterations == 0 {
            return Err(ConfigError::Convergence {
                market: self.id.clone(),
            });
        }
        if self.energy_type.is_thermal() != self.thermal_loop.is_some() {
            return Err(ConfigError::ThermalLoop {
                market: self.id.clone(),
            });
        }
        Ok(())
    }
}

/// Where a neighbor sits relative to this node
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborRole {
    /// Supplies this node (closer to the bulk grid)
    Upstream,
    /// Is supplied by this node
    Downstream,
    /// Neither
    #[default]
    Peer,
}

/// A remote node (or a non-transactive supplier) this node trades with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeighborConfig {
    /// Local model identifier
    pub id: ModelId,
    /// The node at the other end; only used for transactive neighbors
    #[serde(default)]
    pub node: Option<NodeId>,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// The market this neighbor trades in
    pub market: MarketId,
    /// Whether records are exchanged at all
    #[serde(default = "default_true")]
    pub transactive: bool,
    /// Friends see the whole offered curve, others only the balance point
    #[serde(default = "default_true")]
    pub friend: bool,
    /// Decides which way bids and offers flow in sequential clearing
    #[serde(default)]
    pub role: NeighborRole,
    /// Curve used until (or instead of) received records
    #[serde(default)]
    pub default_vertices: Vec<Vertex>,
    /// Line loss factor `z` in `P − z·P²`
    #[serde(default)]
    pub effective_impedance: f64,
    /// Relative power change under which re-sending is skipped
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,
    /// Initial import level above which demand charges apply
    #[serde(default)]
    pub demand_threshold: f64,
    /// Demand charge (currency per kW per hour) above the threshold
    #[serde(default)]
    pub demand_charge_rate: f64,
}

fn default_true() -> bool {
    true
}
fn default_convergence_threshold() -> f64 {
    0.01
}

impl NeighborConfig {
    /// A transactive peer neighbor in `market` living on node `node`
    pub fn new(id: impl Into<ModelId>, market: impl Into<MarketId>, node: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            node: Some(node.into()),
            name: String::new(),
            market: market.into(),
            transactive: true,
            friend: true,
            role: NeighborRole::default(),
            default_vertices: Vec::new(),
            effective_impedance: 0.0,
            convergence_threshold: default_convergence_threshold(),
            demand_threshold: 0.0,
            demand_charge_rate: 0.0,
        }
    }
}

/// Comfort model of a flexible building for one commodity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComfortBand {
    /// Consumption (kW, positive) that holds the set point
    pub neutral_load: f64,
    /// Temperature set point (°C)
    pub set_point: f64,
    /// Warmest acceptable temperature (°C)
    pub upper_bound: f64,
    /// Coolest acceptable temperature (°C)
    pub lower_bound: f64,
    /// Power shift per degree of deviation (kW/°C)
    pub internal_mass: f64,
    /// Cost of running at a comfort bound (currency per hour)
    pub comfort_cost: f64,
    /// Scaling applied to the comfort cost
    #[serde(default = "default_comfort_gain")]
    pub comfort_gain: f64,
    /// Price paid at the set point; the market default when absent
    #[serde(default)]
    pub reference_price: Option<f64>,
}

fn default_comfort_gain() -> f64 {
    1.0
}

/// Parameters of a boiler, chiller or gas turbine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThermalSpec {
    /// Minimum output while running (kW)
    pub min_power: f64,
    /// Nameplate output (kW)
    pub max_power: f64,
    /// Price of one unit of input energy
    pub fuel_price: f64,
    /// Output over input when no fitted curve is available
    #[serde(default = "default_efficiency")]
    pub assumed_efficiency: f64,
    /// Key into the curve-fit repository
    #[serde(default)]
    pub curve_fit: Option<String>,
}

fn default_efficiency() -> f64 {
    0.8
}

/// A resource with a constant offered curve
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixedCurveSpec {
    /// The offered curve
    pub vertices: Vec<Vertex>,
}

/// A load that does not respond to price
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InflexibleSpec {
    /// Hour-of-day consumption (kW, positive): 24 values, or one constant
    pub load_profile: Vec<f64>,
    /// Measurement point that overrides the forecast for the current interval
    #[serde(default = "default_load_point")]
    pub measurement_point: String,
    /// Oldest measurement still trusted over the forecast
    #[serde(default = "default_measurement_age", with = "humantime_serde")]
    pub measurement_max_age: Duration,
}

fn default_load_point() -> String {
    "electric_load".to_owned()
}
fn default_measurement_age() -> Duration {
    Duration::from_secs(15 * 60)
}

/// The physical model behind a local asset
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetKind {
    /// A building load that ignores price
    InflexibleBuilding(InflexibleSpec),
    /// A building that trades comfort for cost
    FlexibleBuilding {
        /// One comfort band per commodity the building bids
        bands: Map<EnergyType, ComfortBand>,
    },
    /// Produces heat
    Boiler(ThermalSpec),
    /// Produces cooling
    Chiller(ThermalSpec),
    /// Produces electricity
    GasTurbine(ThermalSpec),
    /// Offers a configured curve
    FixedCurve(FixedCurveSpec),
}

impl AssetKind {
    /// Whether the model can produce vertices for `energy_type` on its own
    pub fn supports(&self, energy_type: EnergyType) -> bool {
        match self {
            Self::InflexibleBuilding(_) | Self::GasTurbine(_) => {
                energy_type == EnergyType::Electricity
            }
            Self::FixedCurve(_) => true,
            Self::FlexibleBuilding { bands } => bands.contains_key(&energy_type),
            Self::Boiler(_) => energy_type == EnergyType::Heat,
            Self::Chiller(_) => energy_type == EnergyType::Cooling,
        }
    }
}

/// A resource or load owned by a node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Unique (per node) model identifier
    pub id: ModelId,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// The market the asset is scheduled in
    pub market: MarketId,
    /// Further (thermal) markets the asset also bids into
    #[serde(default)]
    pub thermal_auctions: Vec<MarketId>,
    /// Fallback curves per commodity
    #[serde(default)]
    pub default_vertices: Map<EnergyType, Vec<Vertex>>,
    /// The physics behind the offered curve
    pub model: AssetKind,
}

impl AssetConfig {
    /// Every market this asset takes part in
    pub fn markets(&self) -> impl Iterator<Item = &MarketId> {
        std::iter::once(&self.market).chain(self.thermal_auctions.iter())
    }
}

/// A transactive node: its markets, local assets and neighbors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// The identity other nodes address records to
    pub id: NodeId,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Markets and thermal auctions run by this node
    pub markets: Vec<MarketConfig>,
    /// Resources and loads owned by this node
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
    /// Remote nodes and suppliers this node trades with
    #[serde(default)]
    pub neighbors: Vec<NeighborConfig>,
}

impl NodeConfig {
    /// Check cross-references and every configured curve
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut markets = Map::<&MarketId, EnergyType>::default();
        for market in &self.markets {
            market.validate()?;
            if markets.insert(&market.id, market.energy_type).is_some() {
                return Err(ConfigError::Duplicate(market.id.to_string()));
            }
        }

        let mut models = Map::<&ModelId, ()>::default();
        for asset in &self.assets {
            if models.insert(&asset.id, ()).is_some() {
                return Err(ConfigError::Duplicate(asset.id.to_string()));
            }
            for market in asset.markets() {
                if !markets.contains_key(market) {
                    return Err(ConfigError::UnknownMarket {
                        model: asset.id.clone(),
                        market: market.clone(),
                    });
                }
            }
            for vertices in asset.default_vertices.values() {
                check_curve(&asset.id, vertices)?;
            }
            validate_kind(&asset.id, &asset.model)?;
        }

        for neighbor in &self.neighbors {
            if models.insert(&neighbor.id, ()).is_some() {
                return Err(ConfigError::Duplicate(neighbor.id.to_string()));
            }
            if !markets.contains_key(&neighbor.market) {
                return Err(ConfigError::UnknownMarket {
                    model: neighbor.id.clone(),
                    market: neighbor.market.clone(),
                });
            }
            if neighbor.transactive && neighbor.node.is_none() {
                return Err(ConfigError::MissingNode(neighbor.id.clone()));
            }
            check_curve(&neighbor.id, &neighbor.default_vertices)?;
        }
        Ok(())
    }
}

fn check_curve(model: &ModelId, vertices: &[Vertex]) -> Result<(), ConfigError> {
    validate_vertices(vertices).map_err(|source| ConfigError::Vertices {
        model: model.clone(),
        source,
    })
}

fn validate_kind(model: &ModelId, kind: &AssetKind) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::Asset {
        model: model.clone(),
        reason: reason.to_owned(),
    };
    match kind {
        AssetKind::InflexibleBuilding(spec) => {
            if !matches!(spec.load_profile.len(), 1 | 24) {
                return Err(invalid("load profile needs 1 or 24 values"));
            }
        }
        AssetKind::FlexibleBuilding { bands } => {
            for band in bands.values() {
                if !(band.lower_bound <= band.set_point && band.set_point <= band.upper_bound) {
                    return Err(invalid("set point lies outside the comfort band"));
                }
                if !(band.internal_mass > 0.0) {
                    return Err(invalid("internal mass must be positive"));
                }
            }
        }
        AssetKind::Boiler(spec) | AssetKind::Chiller(spec) | AssetKind::GasTurbine(spec) => {
            if spec.min_power > spec.max_power || spec.min_power < 0.0 {
                return Err(invalid("power limits are inconsistent"));
            }
            if !(spec.assumed_efficiency > 0.0) {
                return Err(invalid("assumed efficiency must be positive"));
            }
        }
        AssetKind::FixedCurve(spec) => check_curve(model, &spec.vertices)?,
    }
    Ok(())
}

/// Configuration mistakes detected before a node starts
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Intervals must be a positive whole number of seconds
    #[error("market {market}: invalid interval duration {duration:?}")]
    IntervalDuration {
        /// The offending market
        market: MarketId,
        /// The configured duration
        duration: Duration,
    },
    /// Tolerance or iteration bound make convergence impossible
    #[error("market {market}: tolerance must be positive and iterations non-zero")]
    Convergence {
        /// The offending market
        market: MarketId,
    },
    /// Thermal auctions need loop parameters and only they may have them
    #[error("market {market}: thermal loop parameters do not match its energy type")]
    ThermalLoop {
        /// The offending market
        market: MarketId,
    },
    /// Two markets or models share an identifier
    #[error("duplicate identifier {0}")]
    Duplicate(String),
    /// A model refers to a market the node does not run
    #[error("{model} refers to unknown market {market}")]
    UnknownMarket {
        /// The referring model
        model: ModelId,
        /// The missing market
        market: MarketId,
    },
    /// A transactive neighbor has no remote node
    #[error("transactive neighbor {0} has no node")]
    MissingNode(ModelId),
    /// A configured curve is malformed
    #[error("{model}: invalid vertices")]
    Vertices {
        /// The model owning the curve
        model: ModelId,
        /// What is wrong with it
        #[source]
        source: VertexError,
    },
    /// Asset parameters are inconsistent
    #[error("{model}: {reason}")]
    Asset {
        /// The offending asset
        model: ModelId,
        /// What is wrong
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> NodeConfig {
        serde_json::from_value(serde_json::json!({
            "id": "campus",
            "markets": [
                { "id": "power", "interval_duration": "1h", "future_horizon": "4h" },
                {
                    "id": "steam",
                    "energy_type": "heat",
                    "thermal_loop": { "supply_temperature": 250.0, "return_temperature": 120.0 }
                }
            ],
            "assets": [
                {
                    "id": "library",
                    "market": "power",
                    "model": { "kind": "inflexible_building", "load_profile": [60.0] }
                },
                {
                    "id": "boiler",
                    "market": "steam",
                    "model": { "kind": "boiler", "min_power": 100.0, "max_power": 900.0, "fuel_price": 0.02 }
                }
            ],
            "neighbors": [
                {
                    "id": "utility",
                    "market": "power",
                    "transactive": false,
                    "default_vertices": [{ "marginal_price": 0.06, "power": 1000.0 }]
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn defaults_fill_in() {
        let node = node();
        assert!(node.validate().is_ok());
        let power = &node.markets[0];
        assert_eq!(power.max_iterations, 100);
        assert_eq!(power.price_tolerance, 0.01);
        assert_eq!(power.future_horizon, Duration::from_secs(4 * 3600));
        assert_eq!(power.clearing_mode, ClearingMode::Convergent);
        assert!(node.neighbors[0].friend);
        assert!(node.assets[1].model.supports(EnergyType::Heat));
    }

    #[test]
    fn unknown_market_is_rejected() {
        let mut node = node();
        node.assets[0].market = "gas".into();
        assert!(matches!(
            node.validate(),
            Err(ConfigError::UnknownMarket { .. })
        ));
    }

    #[test]
    fn fractional_interval_is_rejected() {
        let mut node = node();
        node.markets[0].interval_duration = Duration::from_millis(1500);
        assert!(matches!(
            node.validate(),
            Err(ConfigError::IntervalDuration { .. })
        ));
    }

    #[test]
    fn thermal_market_needs_loop() {
        let mut node = node();
        node.markets[1].thermal_loop = None;
        assert!(matches!(node.validate(), Err(ConfigError::ThermalLoop { .. })));
    }
}
