mod common;

use approx::assert_abs_diff_eq;
use common::*;
use time::macros::datetime;
use tns_core::models::{ClearingMode, MarketState, NeighborConfig, NeighborRole, NodeConfig, interval_name};
use tns_engine::{CycleReport, TransactiveNode};

fn sequential(mut config: NodeConfig, role: NeighborRole) -> TransactiveNode {
    config.markets[0].clearing_mode = ClearingMode::Sequential;
    config.neighbors[0].role = role;
    TransactiveNode::new(config).expect("valid node")
}

/// A supplier upstream of a 60 kW load
fn feeder() -> (TransactiveNode, TransactiveNode) {
    let supplier = node("a", vec![generator("gen")], vec![NeighborConfig::new("to-b", "power", "b")]);
    let consumer = node("b", vec![inflexible_load("load", 60.0)], vec![NeighborConfig::new("to-a", "power", "a")]);
    (
        sequential(supplier, NeighborRole::Downstream),
        sequential(consumer, NeighborRole::Upstream),
    )
}

fn next_hour(reports: &[CycleReport]) -> (f64, MarketState, bool) {
    let name = interval_name(datetime!(2024-06-01 11:00 UTC));
    let interval = report(reports, "power")
        .intervals
        .iter()
        .find(|i| i.name == name)
        .expect("interval is active");
    (interval.price, interval.state, interval.committed)
}

#[test_log::test(tokio::test)]
async fn bids_flow_up_and_offers_flow_down() -> anyhow::Result<()> {
    let (mut a, mut b) = feeder();
    let harness = Harness::default();
    let market_lead = datetime!(2024-06-01 10:35 UTC);
    let delivery_lead = datetime!(2024-06-01 10:52 UTC);

    // without a downstream bid the supplier only waits
    let (price, state, _) = next_hour(&harness.cycle(&mut a, market_lead).await?);
    assert_eq!(state, MarketState::MarketLead);
    assert_abs_diff_eq!(price, 0.05);

    // the consumer has no downstream neighbors, so it bids straight away
    harness.cycle(&mut b, market_lead).await?;
    let (price, _, _) = next_hour(&harness.cycle(&mut a, market_lead).await?);
    assert_abs_diff_eq!(price, 0.03, epsilon = 1e-9);

    // the offer goes back down once the interval reaches its delivery lead
    let (_, state, _) = next_hour(&harness.cycle(&mut a, delivery_lead).await?);
    assert_eq!(state, MarketState::DeliveryLead);
    let (price, _, _) = next_hour(&harness.cycle(&mut b, delivery_lead).await?);
    assert_abs_diff_eq!(price, 0.03, epsilon = 1e-9);

    // delivery commits the schedule without moving the price
    let (price, state, committed) = next_hour(&harness.cycle(&mut b, datetime!(2024-06-01 11:05 UTC)).await?);
    assert_eq!(state, MarketState::Delivery);
    assert!(committed);
    assert_abs_diff_eq!(price, 0.03, epsilon = 1e-9);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn negotiation_keeps_the_current_price() -> anyhow::Result<()> {
    let (mut a, _) = feeder();
    let reports = Harness::default().cycle(&mut a, datetime!(2024-06-01 10:35 UTC)).await?;
    let later = report(&reports, "power")
        .intervals
        .iter()
        .filter(|i| i.state == MarketState::Negotiation)
        .collect::<Vec<_>>();
    assert!(!later.is_empty());
    for interval in later {
        assert_abs_diff_eq!(interval.price, 0.05);
        assert!(interval.net_power.is_some());
    }
    Ok(())
}
