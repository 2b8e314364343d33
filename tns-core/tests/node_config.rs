use rstest::*;
use std::time::Duration;
use time::macros::datetime;
use tns_core::models::{
    AssetKind, AuctionState, ClearingMode, ConfigError, EnergyType, Fluid, MarketState,
    NeighborRole, NodeConfig, StateTiming, TimeInterval, TransactiveRecord, decode_records,
    encode_records,
};

#[fixture]
fn campus() -> serde_json::Value {
    serde_json::json!({
        "id": "campus",
        "name": "Campus",
        "markets": [
            {
                "id": "power",
                "energy_type": "electricity",
                "interval_duration": "1h",
                "future_horizon": "6h",
                "market_clearing_time": "2024-06-01T00:00:00Z",
                "clearing_mode": "sequential"
            },
            {
                "id": "steam",
                "energy_type": "heat",
                "market_order": 1,
                "thermal_loop": { "supply_temperature": 250.0, "return_temperature": 120.0 }
            }
        ],
        "assets": [
            {
                "id": "boiler-1",
                "market": "steam",
                "model": { "kind": "boiler", "min_power": 100.0, "max_power": 900.0, "fuel_price": 0.02, "curve_fit": "boiler-1" }
            },
            {
                "id": "library",
                "market": "power",
                "thermal_auctions": ["steam"],
                "model": {
                    "kind": "flexible_building",
                    "bands": {
                        "electricity": { "neutral_load": 50.0, "set_point": 21.0, "upper_bound": 24.0, "lower_bound": 18.0, "internal_mass": 5.0, "comfort_cost": 2.0 },
                        "heat": { "neutral_load": 100.0, "set_point": 21.0, "upper_bound": 24.0, "lower_bound": 18.0, "internal_mass": 10.0, "comfort_cost": 5.0 }
                    }
                }
            }
        ],
        "neighbors": [
            {
                "id": "utility",
                "node": "substation",
                "market": "power",
                "role": "upstream",
                "default_vertices": [
                    { "marginal_price": 0.06, "power": 0.0 },
                    { "marginal_price": 0.06, "power": 2000.0 }
                ]
            }
        ]
    })
}

#[rstest]
fn campus_parses_with_defaults(campus: serde_json::Value) {
    let config: NodeConfig = serde_json::from_value(campus).unwrap();
    config.validate().unwrap();

    let power = &config.markets[0];
    assert_eq!(power.future_horizon, Duration::from_secs(6 * 3600));
    assert_eq!(power.clearing_mode, ClearingMode::Sequential);
    assert_eq!(power.max_iterations, 100);
    assert_eq!(power.market_clearing_time, datetime!(2024-06-01 00:00 UTC));

    let steam = &config.markets[1];
    assert_eq!(steam.thermal_loop.as_ref().map(|l| l.fluid), Some(Fluid::Steam));

    let library = &config.assets[1];
    assert_eq!(library.markets().count(), 2);
    assert!(library.model.supports(EnergyType::Heat));
    assert!(matches!(config.assets[0].model, AssetKind::Boiler(ref spec) if spec.assumed_efficiency == 0.8));

    let utility = &config.neighbors[0];
    assert_eq!(utility.role, NeighborRole::Upstream);
    assert!(utility.transactive && utility.friend);
}

#[rstest]
fn unknown_market_is_reported(mut campus: serde_json::Value) {
    campus["assets"][0]["market"] = "chilled-water".into();
    let config: NodeConfig = serde_json::from_value(campus).unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::UnknownMarket { .. })));
}

#[rstest]
fn thermal_auction_needs_a_loop(mut campus: serde_json::Value) {
    campus["markets"][1].as_object_mut().unwrap().remove("thermal_loop");
    let config: NodeConfig = serde_json::from_value(campus).unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::ThermalLoop { .. })));
}

#[rstest]
fn transactive_neighbor_needs_a_node(mut campus: serde_json::Value) {
    campus["neighbors"][0].as_object_mut().unwrap().remove("node");
    let config: NodeConfig = serde_json::from_value(campus).unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::MissingNode(_))));
}

#[rstest]
fn curves_with_nan_are_rejected(mut campus: serde_json::Value) {
    campus["neighbors"][0]["default_vertices"][0]["marginal_price"] = "NaN".into();
    let config: NodeConfig = serde_json::from_value(campus).unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::Vertices { .. })));
}

#[test]
fn interval_walks_through_every_state() {
    let timing = StateTiming {
        future_horizon: Duration::from_secs(6 * 3600),
        market_lead: Duration::from_secs(30 * 60),
        delivery_lead: Duration::from_secs(10 * 60),
        publish_duration: Duration::from_secs(15 * 60),
    };
    let start = datetime!(2024-06-01 12:00 UTC);
    let mut interval = TimeInterval::new(
        "power".into(),
        start,
        Duration::from_secs(3600),
        start - timing.future_horizon,
        datetime!(2024-06-01 00:00 UTC),
    );

    let mut seen = Vec::new();
    let mut now = datetime!(2024-06-01 05:00 UTC);
    while now < datetime!(2024-06-01 14:00 UTC) {
        let state = interval.revalidate(now, &timing);
        if seen.last() != Some(&state) {
            seen.push(state);
        }
        now += Duration::from_secs(5 * 60);
    }
    assert_eq!(
        seen,
        vec![
            MarketState::Inactive,
            MarketState::Negotiation,
            MarketState::MarketLead,
            MarketState::DeliveryLead,
            MarketState::Delivery,
            MarketState::Publish,
            MarketState::Expired,
        ]
    );
    assert_eq!(AuctionState::from(MarketState::MarketLead), AuctionState::Tender);
}

#[test]
fn hard_limits_cross_the_wire() {
    let raw = r#"[
        {"time_interval_name": "2024-06-01T12:00:00Z", "record_number": 0, "marginal_price": 0.03,
         "power": -60.0, "timestamp": "2024-06-01T11:00:00Z"},
        {"time_interval_name": "2024-06-01T12:00:00Z", "record_number": 1, "marginal_price": "inf",
         "power": -60.0, "timestamp": "2024-06-01T11:00:00Z", "energy_type": "electricity"}
    ]"#;
    let records: Vec<TransactiveRecord> = decode_records(raw).unwrap();
    assert!(records[0].is_balance_point());
    assert!(records[1].to_vertex().is_hard_limit());

    let again = decode_records(&encode_records(&records).unwrap()).unwrap();
    assert_eq!(again, records);
}
