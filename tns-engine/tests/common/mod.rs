#![allow(dead_code)]

use std::{sync::atomic::AtomicBool, time::Duration};
use time::{OffsetDateTime, macros::datetime};
use tns_core::models::{
    AssetConfig, AssetKind, EnergyType, FixedCurveSpec, InflexibleSpec, MarketConfig,
    NeighborConfig, NodeConfig, Vertex,
};
use tns_engine::{CycleReport, EngineError, InMemoryBus, MeasurementStore, SampleFits, TransactiveNode};

pub const START: OffsetDateTime = datetime!(2024-06-01 10:30 UTC);

pub fn electric_market() -> MarketConfig {
    let mut market = MarketConfig::new("power", EnergyType::Electricity);
    market.market_clearing_time = datetime!(2024-06-01 00:00 UTC);
    market.future_horizon = Duration::from_secs(3 * 3600);
    market
}

pub fn asset(id: &str, market: &str, model: AssetKind) -> AssetConfig {
    AssetConfig {
        id: id.into(),
        name: String::new(),
        market: market.into(),
        thermal_auctions: Vec::new(),
        default_vertices: Default::default(),
        model,
    }
}

pub fn generator(id: &str) -> AssetConfig {
    asset(
        id,
        "power",
        AssetKind::FixedCurve(FixedCurveSpec {
            vertices: vec![Vertex::new(0.0, 0.0, 0.0), Vertex::new(0.05, 2.5, 100.0)],
        }),
    )
}

pub fn inflexible_load(id: &str, kw: f64) -> AssetConfig {
    asset(
        id,
        "power",
        AssetKind::InflexibleBuilding(InflexibleSpec {
            load_profile: vec![kw],
            measurement_point: "electric_load".into(),
            measurement_max_age: Duration::from_secs(15 * 60),
        }),
    )
}

pub fn node(id: &str, assets: Vec<AssetConfig>, neighbors: Vec<NeighborConfig>) -> NodeConfig {
    NodeConfig {
        id: id.into(),
        name: id.to_uppercase(),
        description: String::new(),
        markets: vec![electric_market()],
        assets,
        neighbors,
    }
}

/// A generator at node `a` feeding a 60 kW load at node `b`
pub fn two_nodes() -> (TransactiveNode, TransactiveNode) {
    let a = node("a", vec![generator("gen")], vec![NeighborConfig::new("to-b", "power", "b")]);
    let b = node("b", vec![inflexible_load("load", 60.0)], vec![NeighborConfig::new("to-a", "power", "a")]);
    (
        TransactiveNode::new(a).expect("node a is valid"),
        TransactiveNode::new(b).expect("node b is valid"),
    )
}

/// Everything a cycle talks to, kept in memory
#[derive(Default)]
pub struct Harness {
    pub bus: InMemoryBus,
    pub measurements: MeasurementStore,
    pub fits: SampleFits,
    pub shutdown: AtomicBool,
}

impl Harness {
    pub async fn cycle(&self, node: &mut TransactiveNode, now: OffsetDateTime) -> Result<Vec<CycleReport>, EngineError> {
        let endpoint = self.bus.endpoint(node.id().clone());
        node.run_cycle(now, &endpoint, &self.measurements, &self.fits, &self.shutdown)
            .await
    }
}

pub fn report<'a>(reports: &'a [CycleReport], market: &str) -> &'a CycleReport {
    reports
        .iter()
        .find(|r| r.market.as_str() == market)
        .expect("market was reported")
}
