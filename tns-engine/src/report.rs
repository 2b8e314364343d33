use crate::{EngineError, market::{BalanceOutcome, Market}};
use serde::Serialize;
use time::OffsetDateTime;
use tns_core::models::{EnergyType, MarketId, MarketState, ModelId, NodeId, Vertex};

/// What one cycle did to one market
#[derive(Clone, Debug, Serialize)]
pub struct CycleReport {
    /// The node owning the market
    pub node: NodeId,
    /// The market
    pub market: MarketId,
    /// Its commodity
    pub energy_type: EnergyType,
    /// The cycle time
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    /// Result of the cycle's balance
    #[serde(flatten)]
    pub outcome: BalanceOutcome,
    /// Every active interval
    pub intervals: Vec<IntervalReport>,
    /// Every participant
    pub models: Vec<ModelReport>,
}

/// Market-level results for one interval
#[derive(Clone, Debug, Serialize)]
pub struct IntervalReport {
    /// Interval name
    pub name: String,
    /// Lifecycle stage at the cycle time
    pub state: MarketState,
    /// Cleared marginal price
    pub price: f64,
    /// Net scheduled power; `None` before the interval was first balanced
    pub net_power: Option<f64>,
    /// Whether the interval is committed for delivery
    pub committed: bool,
    /// The summed curve of every participant
    pub system_vertices: Vec<Vertex>,
}

/// One participant's schedule and costs
#[derive(Clone, Debug, Serialize)]
pub struct ModelReport {
    /// The participant
    pub id: ModelId,
    /// Production cost over the active intervals
    pub total_production_cost: f64,
    /// Dual cost over the active intervals
    pub total_dual_cost: f64,
    /// Scheduled power per interval
    pub schedule: Vec<ScheduledPower>,
}

/// A participant's schedule for one interval
#[derive(Clone, Debug, Serialize)]
pub struct ScheduledPower {
    /// Interval name
    pub interval: String,
    /// Signed scheduled power (kW)
    pub power: f64,
    /// Loop mass flow (kg/s), for thermal generators
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mass_flow: Option<f64>,
}

impl CycleReport {
    pub(crate) fn collect(node: &NodeId, market: &Market, at: OffsetDateTime) -> Result<Self, EngineError> {
        let intervals = market
            .intervals()
            .iter()
            .map(|ti| IntervalReport {
                name: ti.name.clone(),
                state: ti.market_state,
                price: market.price(ti),
                net_power: market.net_power(ti),
                committed: market.is_committed(ti),
                system_vertices: market.system_vertices(ti).to_vec(),
            })
            .collect();

        let models = market.with_ledgers(|id, ledger| ModelReport {
            id: id.clone(),
            total_production_cost: ledger.total_production_cost,
            total_dual_cost: ledger.total_dual_cost,
            schedule: market
                .intervals()
                .iter()
                .filter_map(|ti| {
                    Some(ScheduledPower {
                        interval: ti.name.clone(),
                        power: ledger.scheduled_power(ti)?,
                        mass_flow: ledger.mass_flows.get(ti).copied(),
                    })
                })
                .collect(),
        })?;

        Ok(Self {
            node: node.clone(),
            market: market.id().clone(),
            energy_type: market.energy_type(),
            at,
            outcome: market.outcome(),
            intervals,
            models,
        })
    }

    /// The cleared price of the interval named `name`
    pub fn price(&self, name: &str) -> Option<f64> {
        self.intervals.iter().find(|i| i.name == name).map(|i| i.price)
    }

    /// The participant with identifier `id`
    pub fn model(&self, id: &str) -> Option<&ModelReport> {
        self.models.iter().find(|m| m.id.as_str() == id)
    }
}
