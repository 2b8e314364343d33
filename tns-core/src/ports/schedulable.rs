use crate::models::{EnergyType, LoopParameters, MarketId, ModelId, ModelLedger, TimeInterval};
use time::OffsetDateTime;

/// What a model may see of a market while scheduling against it.
///
/// `prices` is aligned with `intervals`. A market builds a fresh view for
/// every iteration, so models never hold on to market state.
#[derive(Clone, Copy, Debug)]
pub struct MarketView<'a> {
    /// The market being balanced
    pub id: &'a MarketId,
    /// Its commodity
    pub energy_type: EnergyType,
    /// The intervals being balanced
    pub intervals: &'a [TimeInterval],
    /// Current marginal price for each interval
    pub prices: &'a [f64],
    /// Price to assume before anything has cleared
    pub default_price: f64,
    /// Loop parameters of a thermal auction
    pub loop_parameters: Option<&'a LoopParameters>,
    /// The cycle time
    pub now: OffsetDateTime,
}

impl MarketView<'_> {
    /// The current price of the `index`-th interval
    pub fn price(&self, index: usize) -> f64 {
        self.prices.get(index).copied().unwrap_or(self.default_price)
    }

    /// Intervals paired with their current prices
    pub fn priced_intervals(&self) -> impl Iterator<Item = (&TimeInterval, f64)> {
        self.intervals
            .iter()
            .enumerate()
            .map(|(index, interval)| (interval, self.price(index)))
    }
}

/// The capability every market participant shares.
///
/// Local assets and neighbors are both scheduled by a market through this
/// trait. A model that bids into several markets keeps one [`ModelLedger`]
/// per market and is serialized by its owner, so at most one market schedules
/// it at a time.
pub trait Schedulable {
    /// The model identifier
    fn id(&self) -> &ModelId;

    /// Refresh the offered curve for every interval of `market`.
    fn update_vertices(&mut self, market: &MarketView);

    /// Choose a power for every interval given the current prices.
    fn schedule_power(&mut self, market: &MarketView);

    /// Decide whether the model is committed in each interval.
    fn schedule_engagement(&mut self, market: &MarketView) {
        if let Some(ledger) = self.ledger_mut(market.id) {
            for interval in market.intervals {
                let engaged = ledger
                    .scheduled_power(interval)
                    .is_some_and(|power| power != 0.0);
                ledger.engagement.set(interval, engaged);
            }
        }
    }

    /// Record the headroom between the largest offered power and the schedule.
    fn calculate_reserve_margin(&mut self, market: &MarketView) {
        if let Some(ledger) = self.ledger_mut(market.id) {
            for interval in market.intervals {
                let ceiling = ledger
                    .vertices(interval)
                    .iter()
                    .map(|vertex| vertex.power)
                    .fold(f64::NEG_INFINITY, f64::max);
                let scheduled = ledger.scheduled_power(interval).unwrap_or_default();
                let margin = if ceiling.is_finite() {
                    (ceiling - scheduled).max(0.0)
                } else {
                    0.0
                };
                ledger.reserve_margins.set(interval, margin);
            }
        }
    }

    /// Recompute production and dual costs from the schedule.
    fn update_costs(&mut self, market: &MarketView);

    /// The ledger this model keeps for `market`
    fn ledger(&self, market: &MarketId) -> Option<&ModelLedger>;

    /// Mutable access to the ledger this model keeps for `market`
    fn ledger_mut(&mut self, market: &MarketId) -> Option<&mut ModelLedger>;

    /// One scheduling pass: vertices, power, engagement, reserve margin.
    fn schedule(&mut self, market: &MarketView) {
        self.update_vertices(market);
        self.schedule_power(market);
        self.schedule_engagement(market);
        self.calculate_reserve_margin(market);
    }
}
