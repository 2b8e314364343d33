use super::{EnergyType, IntervalValues, MarketId, MeasurementType, ModelId, TimeInterval, Vertex};

/// Per-market bookkeeping kept by every asset and neighbor model.
///
/// A model that participates in several markets (a chiller buys electricity
/// and sells cooling) holds one ledger for each.
#[derive(Clone, Debug)]
pub struct ModelLedger {
    /// The market these values belong to
    pub market: MarketId,
    /// The commodity of that market
    pub energy_type: EnergyType,
    /// Signed scheduled power per interval
    pub scheduled_powers: IntervalValues<f64>,
    /// The curve offered to the market per interval
    pub active_vertices: IntervalValues<Vec<Vertex>>,
    /// Production cost per interval
    pub production_costs: IntervalValues<f64>,
    /// Dual cost per interval
    pub dual_costs: IntervalValues<f64>,
    /// Reserve margin per interval
    pub reserve_margins: IntervalValues<f64>,
    /// Engagement (commitment) per interval
    pub engagement: IntervalValues<bool>,
    /// Loop mass flow per interval, reported by thermal generators
    pub mass_flows: IntervalValues<f64>,
    /// Sum of production costs over the active intervals
    pub total_production_cost: f64,
    /// Sum of dual costs over the active intervals
    pub total_dual_cost: f64,
}

impl ModelLedger {
    /// An empty ledger
    pub fn new(owner: ModelId, market: MarketId, energy_type: EnergyType) -> Self {
        Self {
            scheduled_powers: IntervalValues::new(owner.clone(), market.clone(), energy_type.measurement()),
            active_vertices: IntervalValues::new(owner.clone(), market.clone(), MeasurementType::ActiveVertex),
            production_costs: IntervalValues::new(owner.clone(), market.clone(), MeasurementType::ProductionCost),
            dual_costs: IntervalValues::new(owner.clone(), market.clone(), MeasurementType::DualCost),
            reserve_margins: IntervalValues::new(owner.clone(), market.clone(), MeasurementType::ReserveMargin),
            engagement: IntervalValues::new(owner.clone(), market.clone(), MeasurementType::Engagement),
            mass_flows: IntervalValues::new(owner, market.clone(), MeasurementType::MassFlow),
            total_production_cost: 0.0,
            total_dual_cost: 0.0,
            market,
            energy_type,
        }
    }

    /// Drop every value whose interval has left the active set
    pub fn prune(&mut self, active: &[TimeInterval]) -> usize {
        self.scheduled_powers.prune(active)
            + self.active_vertices.prune(active)
            + self.production_costs.prune(active)
            + self.dual_costs.prune(active)
            + self.reserve_margins.prune(active)
            + self.engagement.prune(active)
            + self.mass_flows.prune(active)
    }

    /// The curve last offered for `interval` (empty if none)
    pub fn vertices(&self, interval: &TimeInterval) -> &[Vertex] {
        self.active_vertices
            .get(interval)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The power last scheduled for `interval`
    pub fn scheduled_power(&self, interval: &TimeInterval) -> Option<f64> {
        self.scheduled_powers.get(interval).copied()
    }

    /// Recompute the cost totals from the per-interval values
    pub fn update_totals(&mut self) {
        self.total_production_cost = self.production_costs.total();
        self.total_dual_cost = self.dual_costs.total();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use time::macros::datetime;

    #[test]
    fn every_series_is_tagged_with_its_measurement() {
        let ledger = ModelLedger::new("chiller".into(), "cooling".into(), EnergyType::Cooling);
        assert_eq!(ledger.scheduled_powers.measurement(), MeasurementType::Cooling);
        assert_eq!(ledger.active_vertices.measurement(), MeasurementType::ActiveVertex);
        assert_eq!(ledger.engagement.measurement(), MeasurementType::Engagement);
        assert_eq!(ledger.mass_flows.measurement(), MeasurementType::MassFlow);

        let start = datetime!(2024-06-01 10:00 UTC);
        let interval = TimeInterval::new("cooling".into(), start, Duration::from_secs(3600), start, start);
        let mut ledger = ledger;
        ledger.active_vertices.set(&interval, vec![Vertex::hard_limit(-20.0)]);
        ledger.engagement.set(&interval, true);
        assert_eq!(ledger.vertices(&interval).len(), 1);
        assert_eq!(ledger.prune(&[]), 2);
        assert!(ledger.vertices(&interval).is_empty());
    }
}
