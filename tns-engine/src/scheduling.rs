//! Scheduling steps shared by local assets and neighbors.

use crate::curve;
use tns_core::{
    models::{ModelLedger, TimeInterval},
    ports::MarketView,
};

/// Schedule the power each interval's curve delivers at the interval's price.
pub(crate) fn schedule_on_curve(ledger: &mut ModelLedger, market: &MarketView) {
    for (interval, price) in market.priced_intervals() {
        let power = curve::production(ledger.vertices(interval), price);
        ledger.scheduled_powers.set(interval, power);
    }
}

/// Refresh production and dual costs for every interval of `market`.
///
/// The curve's production cost rate at the scheduled power, plus whatever
/// `surcharge` adds, is scaled by the interval length. The dual cost removes
/// the value of the scheduled power at the marginal price.
pub(crate) fn update_costs(
    ledger: &mut ModelLedger,
    market: &MarketView,
    surcharge: impl Fn(&TimeInterval, f64) -> f64,
) {
    for (interval, price) in market.priced_intervals() {
        let power = ledger.scheduled_power(interval).unwrap_or_default();
        let rate = curve::production_cost(ledger.vertices(interval), power) + surcharge(interval, power);
        let hours = interval.hours();
        ledger.production_costs.set(interval, rate * hours);
        ledger.dual_costs.set(interval, (rate - price * power) * hours);
    }
    ledger.update_totals();
}
