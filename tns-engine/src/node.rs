use crate::{
    EngineError,
    asset::{LocalAsset, Observation},
    market::{Market, Participant},
    neighbor::NeighborModel,
    report::CycleReport,
};
use std::sync::{Arc, Mutex, MutexGuard, atomic::AtomicBool};
use time::OffsetDateTime;
use tns_core::{
    models::{
        ClearingMode, ConfigError, MarketId, MarketState, ModelId, NeighborRole, NodeConfig,
        NodeId,
    },
    ports::{CurveFitRepository, MeasurementSource, Messenger},
};
use tracing::{Instrument, Level, event, span};

struct AssetHandle {
    id: ModelId,
    model: Arc<Mutex<LocalAsset>>,
}

struct NeighborHandle {
    id: ModelId,
    market: MarketId,
    role: NeighborRole,
    node: Option<NodeId>,
    model: Arc<Mutex<NeighborModel>>,
}

/// What a cycle does to one market
#[derive(Default)]
struct Plan {
    /// Balance the market's default selection of intervals
    balance_all: bool,
    /// Schedule against current prices only
    negotiation: Vec<OffsetDateTime>,
    /// Bids ready to forward upstream
    bids: Vec<OffsetDateTime>,
    /// Offers ready to forward downstream
    offers: Vec<OffsetDateTime>,
    /// Intervals being delivered
    delivery: Vec<OffsetDateTime>,
}

impl Plan {
    fn balanced(&self) -> Vec<OffsetDateTime> {
        let mut starts = self.bids.clone();
        starts.extend(self.offers.iter().filter(|s| !self.bids.contains(s)));
        starts
    }
}

/// A deployed node: its markets, local assets and neighbors.
///
/// A node is built once from its configuration and then advanced by calling
/// [`run_cycle`](Self::run_cycle) periodically. Nodes share nothing but the
/// records they exchange through a [`Messenger`].
pub struct TransactiveNode {
    id: NodeId,
    name: String,
    markets: Vec<Market>,
    assets: Vec<AssetHandle>,
    neighbors: Vec<NeighborHandle>,
}

impl TransactiveNode {
    /// Validate `config` and build the node it describes
    pub fn new(config: NodeConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let mut markets = config
            .markets
            .into_iter()
            .map(Market::new)
            .collect::<Result<Vec<_>, _>>()?;

        let mut assets = Vec::with_capacity(config.assets.len());
        for asset in &config.assets {
            let mut joined = Vec::new();
            for id in asset.markets() {
                let Some(market) = markets.iter().find(|m| m.id() == id) else {
                    return Err(ConfigError::UnknownMarket {
                        model: asset.id.clone(),
                        market: id.clone(),
                    }
                    .into());
                };
                if !asset.model.supports(market.energy_type()) {
                    return Err(ConfigError::Asset {
                        model: asset.id.clone(),
                        reason: format!("cannot trade {:?} in {}", market.energy_type(), id),
                    }
                    .into());
                }
                joined.push((id, market.energy_type()));
            }

            let model = Arc::new(Mutex::new(LocalAsset::new(asset, joined.iter().map(|(id, e)| (*id, *e)))));
            for (id, _) in &joined {
                if let Some(market) = markets.iter_mut().find(|m| m.id() == *id) {
                    let participant: Participant = model.clone();
                    market.join(asset.id.clone(), participant);
                }
            }
            assets.push(AssetHandle {
                id: asset.id.clone(),
                model,
            });
        }

        let mut neighbors = Vec::with_capacity(config.neighbors.len());
        for neighbor in config.neighbors {
            let Some(market) = markets.iter_mut().find(|m| *m.id() == neighbor.market) else {
                return Err(ConfigError::UnknownMarket {
                    model: neighbor.id.clone(),
                    market: neighbor.market.clone(),
                }
                .into());
            };
            let handle = NeighborHandle {
                id: neighbor.id.clone(),
                market: neighbor.market.clone(),
                role: neighbor.role,
                node: neighbor.node.clone().filter(|_| neighbor.transactive),
                model: Arc::new(Mutex::new(NeighborModel::new(neighbor, market.energy_type()))),
            };
            let participant: Participant = handle.model.clone();
            market.join(handle.id.clone(), participant);
            neighbors.push(handle);
        }

        event!(
            Level::INFO,
            node = %config.id,
            markets = markets.len(),
            assets = assets.len(),
            neighbors = neighbors.len(),
            "node built"
        );

        Ok(Self {
            id: config.id,
            name: config.name,
            markets,
            assets,
            neighbors,
        })
    }

    /// The node identifier
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// The display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node's markets
    pub fn markets(&self) -> &[Market] {
        &self.markets
    }

    /// The market `id`
    pub fn market(&self, id: &str) -> Option<&Market> {
        self.markets.iter().find(|m| m.id().as_str() == id)
    }

    /// Run one cycle at `now`.
    ///
    /// The cycle brings every open market's intervals up to date, collects
    /// what neighbors have sent, refreshes measurements and curve fits,
    /// balances the markets and sends the resulting signals. Markets with the
    /// same `market_order` are balanced concurrently; lower orders go first.
    ///
    /// Unreachable neighbors and missing telemetry are logged and do not stop
    /// the cycle. A shutdown request abandons balancing with
    /// [`EngineError::Cancelled`] before anything is sent.
    pub async fn run_cycle<M, S, F>(
        &mut self,
        now: OffsetDateTime,
        messenger: &M,
        measurements: &S,
        fits: &F,
        shutdown: &AtomicBool,
    ) -> Result<Vec<CycleReport>, EngineError>
    where
        M: Messenger + Sync,
        S: MeasurementSource + Sync,
        F: CurveFitRepository + Sync,
    {
        let span = span!(Level::INFO, "cycle", node = %self.id, %now);
        async move {
            for market in self.markets.iter_mut().filter(|m| m.is_open(now)) {
                market.check_intervals(now)?;
            }

            self.receive_signals(messenger).await?;
            self.observe_assets(now, measurements, fits).await?;

            let plans = self.plan(now)?;
            self.balance_markets(now, &plans, shutdown)?;
            for handle in &self.neighbors {
                lock(&handle.id, &handle.model)?.update_demand_threshold();
            }

            self.send_signals(now, messenger, &plans).await?;

            self.markets
                .iter()
                .filter(|m| m.is_open(now))
                .map(|m| CycleReport::collect(&self.id, m, now))
                .collect()
        }
        .instrument(span)
        .await
    }

    async fn receive_signals<M: Messenger + Sync>(&self, messenger: &M) -> Result<(), EngineError> {
        for handle in &self.neighbors {
            let Some(node) = &handle.node else { continue };
            let records = match messenger.receive(node).await {
                Ok(records) => records,
                Err(err) => {
                    event!(Level::WARN, neighbor = %handle.id, error = %err, "could not receive signal");
                    continue;
                }
            };
            let Some(market) = self.markets.iter().find(|m| *m.id() == handle.market) else {
                continue;
            };
            let mut neighbor = lock(&handle.id, &handle.model)?;
            let kept = neighbor.receive_transactive_signal(records);
            neighbor.prune_records(market.intervals());
            event!(Level::DEBUG, neighbor = %handle.id, records = kept, "received signal");
        }
        Ok(())
    }

    async fn observe_assets<S, F>(&self, now: OffsetDateTime, measurements: &S, fits: &F) -> Result<(), EngineError>
    where
        S: MeasurementSource + Sync,
        F: CurveFitRepository + Sync,
    {
        for handle in &self.assets {
            let (points, fit_key) = {
                let asset = lock(&handle.id, &handle.model)?;
                (asset.measurement_points(), asset.curve_fit_key())
            };

            let mut observations = Vec::new();
            for point in points {
                match measurements.latest(&handle.id, &point, now).await {
                    Ok(Some(measurement)) => observations.push(Observation::Measurement { point, measurement }),
                    Ok(None) => {}
                    Err(err) => {
                        event!(Level::WARN, asset = %handle.id, point = %point, error = %err, "measurement unavailable")
                    }
                }
            }
            if let Some(key) = fit_key {
                match fits.fit(&key).await {
                    Ok(fit) => observations.push(Observation::CurveFit(fit)),
                    Err(err) => event!(Level::WARN, asset = %handle.id, key = %key, error = %err, "curve fit unavailable"),
                }
            }

            let mut asset = lock(&handle.id, &handle.model)?;
            for observation in observations {
                asset.observe(observation);
            }
        }
        Ok(())
    }

    fn plan(&self, now: OffsetDateTime) -> Result<Vec<Option<Plan>>, EngineError> {
        self.markets
            .iter()
            .map(|market| -> Result<Option<Plan>, EngineError> {
                if !market.is_open(now) {
                    return Ok(None);
                }
                let mut plan = Plan::default();
                let delivery = market
                    .intervals()
                    .iter()
                    .filter(|ti| ti.market_state == MarketState::Delivery)
                    .map(|ti| ti.start);
                plan.delivery.extend(delivery);

                if market.config().clearing_mode == ClearingMode::Convergent {
                    plan.balance_all = true;
                    return Ok(Some(plan));
                }

                let (upstream, downstream) = self.roles_in(market.id());
                for interval in market.intervals() {
                    match interval.market_state {
                        MarketState::Negotiation => plan.negotiation.push(interval.start),
                        MarketState::MarketLead => {
                            let mut missing = Vec::new();
                            for handle in &downstream {
                                if !lock(&handle.id, &handle.model)?.has_records(interval) {
                                    missing.push(handle.id.as_str());
                                }
                            }
                            if missing.is_empty() {
                                plan.bids.push(interval.start);
                            } else {
                                event!(
                                    Level::DEBUG,
                                    market = %market.id(),
                                    interval = %interval.name,
                                    ?missing,
                                    "waiting for downstream bids"
                                );
                            }
                        }
                        MarketState::DeliveryLead => {
                            let mut ready = true;
                            for handle in &upstream {
                                ready &= lock(&handle.id, &handle.model)?.has_records(interval);
                            }
                            if ready {
                                plan.offers.push(interval.start);
                            } else {
                                event!(
                                    Level::DEBUG,
                                    market = %market.id(),
                                    interval = %interval.name,
                                    "waiting for upstream offer"
                                );
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Some(plan))
            })
            .collect()
    }

    fn roles_in(&self, market: &MarketId) -> (Vec<&NeighborHandle>, Vec<&NeighborHandle>) {
        let in_market = self.neighbors.iter().filter(|h| h.market == *market);
        let upstream = in_market.clone().filter(|h| h.role == NeighborRole::Upstream).collect();
        let downstream = in_market.filter(|h| h.role == NeighborRole::Downstream).collect();
        (upstream, downstream)
    }

    fn balance_markets(
        &mut self,
        now: OffsetDateTime,
        plans: &[Option<Plan>],
        shutdown: &AtomicBool,
    ) -> Result<(), EngineError> {
        let mut orders = self.markets.iter().map(|m| m.config().market_order).collect::<Vec<_>>();
        orders.sort_unstable();
        orders.dedup();

        for order in orders {
            std::thread::scope(|scope| {
                let handles = self
                    .markets
                    .iter_mut()
                    .zip(plans)
                    .filter(|(market, _)| market.config().market_order == order)
                    .filter_map(|(market, plan)| Some((market, plan.as_ref()?)))
                    .map(|(market, plan)| {
                        let id = market.id().clone();
                        (id, scope.spawn(move || execute(market, plan, now, shutdown)))
                    })
                    .collect::<Vec<_>>();

                // join every thread before reporting the first failure
                let mut result = Ok(());
                for (id, handle) in handles {
                    let outcome = handle.join().unwrap_or_else(|_| Err(EngineError::Panicked(id)));
                    if result.is_ok() {
                        result = outcome;
                    }
                }
                result
            })?;
        }
        Ok(())
    }

    async fn send_signals<M: Messenger + Sync>(
        &self,
        now: OffsetDateTime,
        messenger: &M,
        plans: &[Option<Plan>],
    ) -> Result<(), EngineError> {
        for (market, plan) in self.markets.iter().zip(plans) {
            let Some(plan) = plan else { continue };
            let balanced = plan.balanced();
            for handle in self.neighbors.iter().filter(|h| h.market == *market.id()) {
                if handle.node.is_none() {
                    continue;
                }
                let starts = if plan.balance_all {
                    None
                } else {
                    let starts = match handle.role {
                        NeighborRole::Upstream => &plan.bids,
                        NeighborRole::Downstream => &plan.offers,
                        NeighborRole::Peer => &balanced,
                    };
                    if starts.is_empty() {
                        continue;
                    }
                    Some(starts.as_slice())
                };

                let offers = market.offer_excluding(&handle.id, starts)?;
                let outbound = {
                    let mut neighbor = lock(&handle.id, &handle.model)?;
                    neighbor.prep_transactive_signal(&offers, now);
                    neighbor.outbound()
                };
                let Some((to, records)) = outbound else { continue };

                let count = records.len();
                match messenger.send(&to, records).await {
                    Ok(()) => {
                        lock(&handle.id, &handle.model)?.mark_sent();
                        event!(Level::DEBUG, neighbor = %handle.id, records = count, "sent signal");
                    }
                    Err(err) => {
                        event!(Level::WARN, neighbor = %handle.id, error = %err, "could not send signal")
                    }
                }
            }
        }
        Ok(())
    }
}

fn execute(market: &mut Market, plan: &Plan, now: OffsetDateTime, shutdown: &AtomicBool) -> Result<(), EngineError> {
    if plan.balance_all {
        market.balance(now, None, shutdown)?;
    } else {
        if !plan.negotiation.is_empty() {
            market.schedule_only(now, &plan.negotiation)?;
        }
        let balanced = plan.balanced();
        if !balanced.is_empty() {
            market.balance(now, Some(&balanced), shutdown)?;
        }
    }
    if !plan.delivery.is_empty() {
        market.commit(&plan.delivery);
    }
    Ok(())
}

fn lock<'a, T>(id: &ModelId, model: &'a Mutex<T>) -> Result<MutexGuard<'a, T>, EngineError> {
    model.lock().map_err(|_| EngineError::Poisoned(id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use time::macros::datetime;
    use tns_core::models::{AssetConfig, AssetKind, FixedCurveSpec, MarketConfig, NeighborConfig, Vertex};

    fn config() -> NodeConfig {
        let mut market = MarketConfig::new("power", tns_core::models::EnergyType::Electricity);
        market.market_clearing_time = datetime!(2024-06-01 00:00 UTC);
        market.future_horizon = Duration::from_secs(3 * 3600);
        NodeConfig {
            id: "a".into(),
            name: "Node A".into(),
            description: String::new(),
            markets: vec![market],
            assets: vec![AssetConfig {
                id: "gen".into(),
                name: String::new(),
                market: "power".into(),
                thermal_auctions: Vec::new(),
                default_vertices: Default::default(),
                model: AssetKind::FixedCurve(FixedCurveSpec {
                    vertices: vec![Vertex::new(0.0, 0.0, 0.0), Vertex::new(0.05, 2.5, 100.0)],
                }),
            }],
            neighbors: vec![NeighborConfig::new("b", "power", "node-b")],
        }
    }

    #[test]
    fn models_join_their_markets() {
        let node = TransactiveNode::new(config()).unwrap();
        let market = node.market("power").unwrap();
        let joined = market.participants().map(ModelId::as_str).collect::<Vec<_>>();
        assert_eq!(joined, vec!["gen", "b"]);
    }

    #[test]
    fn unknown_market_is_rejected() {
        let mut config = config();
        config.neighbors[0].market = "steam".into();
        assert!(matches!(
            TransactiveNode::new(config),
            Err(EngineError::Config(ConfigError::UnknownMarket { .. }))
        ));
    }

    #[test]
    fn plan_balances_everything_in_convergent_mode() {
        let mut node = TransactiveNode::new(config()).unwrap();
        let now = datetime!(2024-06-01 10:30 UTC);
        node.markets[0].check_intervals(now).unwrap();
        let plans = node.plan(now).unwrap();
        let plan = plans[0].as_ref().unwrap();
        assert!(plan.balance_all);
        assert_eq!(plan.delivery, vec![datetime!(2024-06-01 10:00 UTC)]);
    }

    #[test]
    fn sequential_plan_waits_for_downstream_bids() {
        let mut config = config();
        config.markets[0].clearing_mode = ClearingMode::Sequential;
        config.markets[0].market_lead = Duration::from_secs(45 * 60);
        config.neighbors[0].role = NeighborRole::Downstream;
        let mut node = TransactiveNode::new(config).unwrap();

        // 11:00 is in market lead at 10:20
        let now = datetime!(2024-06-01 10:20 UTC);
        node.markets[0].check_intervals(now).unwrap();
        let plans = node.plan(now).unwrap();
        let plan = plans[0].as_ref().unwrap();
        assert!(plan.bids.is_empty());
        assert_eq!(
            plan.negotiation,
            vec![datetime!(2024-06-01 12:00 UTC), datetime!(2024-06-01 13:00 UTC)]
        );
    }
}
