mod common;

use approx::assert_abs_diff_eq;
use common::*;
use std::{sync::atomic::Ordering, time::Duration};
use time::macros::datetime;
use tns_core::{
    models::{NodeConfig, interval_name},
    ports::Measurement,
};
use tns_engine::{EngineError, TransactiveNode};

fn local_market() -> NodeConfig {
    node("a", vec![generator("gen"), inflexible_load("load", 60.0)], Vec::new())
}

#[test_log::test(tokio::test)]
async fn local_load_clears_on_the_supply_curve() -> anyhow::Result<()> {
    let mut node = TransactiveNode::new(local_market())?;
    let reports = Harness::default().cycle(&mut node, START).await?;
    let power = report(&reports, "power");

    assert!(power.outcome.converged);
    // at balance every unit produced is consumed at the same price
    assert_abs_diff_eq!(power.outcome.duality_gap, 0.0, epsilon = 1e-9);
    let generation = power.model("gen").expect("generator is reported");
    let load = power.model("load").expect("load is reported");
    let intervals = power.intervals.len() as f64;
    assert_abs_diff_eq!(generation.total_production_cost, 0.9 * intervals, epsilon = 1e-9);
    assert_abs_diff_eq!(generation.total_dual_cost, -0.9 * intervals, epsilon = 1e-9);
    assert_abs_diff_eq!(load.total_dual_cost, 1.8 * intervals, epsilon = 1e-9);
    for interval in &power.intervals {
        assert_abs_diff_eq!(interval.price, 0.03, epsilon = 1e-9);
        assert!(!interval.system_vertices.is_empty());
    }
    Ok(())
}

#[test_log::test(tokio::test)]
async fn fresh_measurement_overrides_the_forecast() -> anyhow::Result<()> {
    let mut node = TransactiveNode::new(local_market())?;
    let harness = Harness::default();
    let measurement = Measurement {
        value: 80.0,
        timestamp: datetime!(2024-06-01 10:25 UTC),
    };
    harness
        .measurements
        .record("load".into(), "electric_load", measurement)
        .await;

    let reports = harness.cycle(&mut node, START).await?;
    let power = report(&reports, "power");
    let current = power.price(&interval_name(datetime!(2024-06-01 10:00 UTC)));
    let next = power.price(&interval_name(datetime!(2024-06-01 11:00 UTC)));
    assert_abs_diff_eq!(current.unwrap_or(f64::NAN), 0.04, epsilon = 1e-9);
    assert_abs_diff_eq!(next.unwrap_or(f64::NAN), 0.03, epsilon = 1e-9);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn stale_measurement_is_ignored() -> anyhow::Result<()> {
    let mut node = TransactiveNode::new(local_market())?;
    let harness = Harness::default();
    let measurement = Measurement {
        value: 80.0,
        timestamp: datetime!(2024-06-01 10:00 UTC),
    };
    harness
        .measurements
        .record("load".into(), "electric_load", measurement)
        .await;

    let reports = harness.cycle(&mut node, START).await?;
    let current = report(&reports, "power").price(&interval_name(datetime!(2024-06-01 10:00 UTC)));
    assert_abs_diff_eq!(current.unwrap_or(f64::NAN), 0.03, epsilon = 1e-9);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn iteration_bound_is_a_hard_cap() -> anyhow::Result<()> {
    let mut config = local_market();
    config.markets[0].max_iterations = 1;
    let mut node = TransactiveNode::new(config)?;

    let reports = Harness::default().cycle(&mut node, START).await?;
    let outcome = report(&reports, "power").outcome;
    assert!(!outcome.converged);
    assert_eq!(outcome.iterations, 1);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn only_the_earliest_intervals_are_cleared() -> anyhow::Result<()> {
    let mut config = local_market();
    config.markets[0].intervals_to_clear = Some(2);
    let mut node = TransactiveNode::new(config)?;

    let reports = Harness::default().cycle(&mut node, START).await?;
    let cleared = report(&reports, "power")
        .intervals
        .iter()
        .map(|i| i.net_power.is_some())
        .collect::<Vec<_>>();
    assert_eq!(cleared, vec![true, true, false, false]);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn market_waits_for_its_next_clearing_time() -> anyhow::Result<()> {
    let mut config = local_market();
    config.markets[0].next_market_clearing_time = Some(START + Duration::from_secs(600));
    let mut node = TransactiveNode::new(config)?;
    let harness = Harness::default();

    assert!(harness.cycle(&mut node, START).await?.is_empty());
    let later = harness.cycle(&mut node, START + Duration::from_secs(600)).await?;
    assert!(report(&later, "power").outcome.converged);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn shutdown_abandons_balancing() -> anyhow::Result<()> {
    let mut node = TransactiveNode::new(local_market())?;
    let harness = Harness::default();
    harness.shutdown.store(true, Ordering::Relaxed);

    let result = harness.cycle(&mut node, START).await;
    assert!(matches!(result, Err(EngineError::Cancelled)));
    Ok(())
}
