use crate::{curve, market::Offer, scheduling};
use time::OffsetDateTime;
use tns_core::{
    models::{
        EnergyType, Map, MarketId, ModelId, ModelLedger, NeighborConfig, NeighborRole, NodeId,
        TimeInterval, TransactiveRecord, Vertex,
    },
    ports::{MarketView, Schedulable},
};
use tracing::{Level, event};

type RecordKey = (String, u32);

/// A remote node as seen from this node's market.
///
/// Inbound records from the remote node become this model's curve; power is
/// positive when it flows into this node. Outbound records carry the curve
/// the rest of this node offers the remote node.
pub struct NeighborModel {
    config: NeighborConfig,
    energy_type: EnergyType,
    ledger: ModelLedger,
    received: Map<RecordKey, TransactiveRecord>,
    sent: Map<RecordKey, TransactiveRecord>,
    prepared: Vec<TransactiveRecord>,
    converged: bool,
    demand_threshold: f64,
}

impl NeighborModel {
    /// A neighbor trading `energy_type`, with no records yet
    pub fn new(config: NeighborConfig, energy_type: EnergyType) -> Self {
        Self {
            ledger: ModelLedger::new(config.id.clone(), config.market.clone(), energy_type),
            demand_threshold: config.demand_threshold,
            received: Map::default(),
            sent: Map::default(),
            prepared: Vec::new(),
            converged: false,
            energy_type,
            config,
        }
    }

    /// The market this neighbor trades in
    pub fn market(&self) -> &MarketId {
        &self.config.market
    }

    /// The remote node, for transactive neighbors
    pub fn node(&self) -> Option<&NodeId> {
        self.config.node.as_ref().filter(|_| self.config.transactive)
    }

    /// Where the remote node sits relative to this one
    pub fn role(&self) -> NeighborRole {
        self.config.role
    }

    /// Whether the last prepared signal matched what was already sent
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Current import level above which demand charges apply
    pub fn demand_threshold(&self) -> f64 {
        self.demand_threshold
    }

    /// Store records received from the remote node.
    ///
    /// Records for another commodity are ignored. The records received for
    /// an interval replace every record held for it, so a curve that lost
    /// vertices does not keep the old tail. Returns the number of records kept.
    pub fn receive_transactive_signal(&mut self, records: Vec<TransactiveRecord>) -> usize {
        if !self.config.transactive {
            return 0;
        }
        let records = records
            .into_iter()
            .filter(|record| record.energy_type == self.energy_type)
            .collect::<Vec<_>>();
        self.received.retain_where(|(name, _), _| {
            !records.iter().any(|record| record.time_interval_name == *name)
        });

        let kept = records.len();
        for record in records {
            let key = (record.time_interval_name.clone(), record.record_number);
            self.received.insert(key, record);
        }
        kept
    }

    /// Forget records about intervals that are no longer active
    pub fn prune_records(&mut self, active: &[TimeInterval]) {
        let live = |(name, _): &RecordKey, _: &TransactiveRecord| active.iter().any(|ti| ti.name == *name);
        self.received.retain_where(live);
        self.sent.retain_where(live);
    }

    /// Whether any record has arrived for `interval`
    pub fn has_records(&self, interval: &TimeInterval) -> bool {
        self.received.keys().any(|(name, _)| *name == interval.name)
    }

    /// The curve the remote node offers for `interval`, before losses.
    ///
    /// Records numbered from 1 are the curve; a lone balance point stands in
    /// for it. Without records the configured default vertices apply.
    fn inbound_vertices(&self, interval: &TimeInterval) -> Vec<Vertex> {
        let mut records = self
            .received
            .values()
            .filter(|record| record.time_interval_name == interval.name)
            .collect::<Vec<_>>();
        records.sort_by_key(|record| record.record_number);

        let curve = records
            .iter()
            .filter(|record| !record.is_balance_point())
            .map(|record| record.to_vertex())
            .collect::<Vec<_>>();
        if !curve.is_empty() {
            return curve;
        }
        match records.first() {
            Some(balance) => vec![balance.to_vertex()],
            None => {
                if self.config.transactive {
                    event!(
                        Level::DEBUG,
                        neighbor = %self.config.id,
                        interval = %interval.name,
                        "no records yet, using default vertices"
                    );
                }
                self.config.default_vertices.clone()
            }
        }
    }

    /// Raise the demand threshold to the peak scheduled import
    pub fn update_demand_threshold(&mut self) {
        let peak = self
            .ledger
            .scheduled_powers
            .iter()
            .map(|entry| entry.value)
            .fold(f64::NEG_INFINITY, f64::max);
        if peak > self.demand_threshold {
            event!(
                Level::DEBUG,
                neighbor = %self.config.id,
                from = self.demand_threshold,
                to = peak,
                "raised demand threshold"
            );
            self.demand_threshold = peak;
        }
    }

    /// Turn this node's offers into the record set for the remote node.
    ///
    /// Record 0 is the point of the offered curve at the cleared price.
    /// Friends also receive the curve itself as records 1 onwards. The
    /// neighbor is converged when every record matches the one last sent
    /// within the configured relative threshold, in which case nothing new
    /// needs sending.
    pub fn prep_transactive_signal(&mut self, offers: &[Offer], now: OffsetDateTime) -> &[TransactiveRecord] {
        let mut prepared = Vec::new();
        for offer in offers {
            let name = offer.interval.name.as_str();
            let power = curve::production(&offer.vertices, offer.price);
            let balance = Vertex::new(offer.price, curve::production_cost(&offer.vertices, power), power);
            prepared.push(TransactiveRecord::new(name, 0, &balance, self.energy_type, now));
            if self.config.friend {
                for (number, vertex) in (1..).zip(&offer.vertices) {
                    prepared.push(TransactiveRecord::new(name, number, vertex, self.energy_type, now));
                }
            }
        }

        let threshold = self.config.convergence_threshold;
        let same_shape = offers.iter().all(|offer| {
            let name = offer.interval.name.as_str();
            count_for(prepared.iter(), name) == count_for(self.sent.values(), name)
        });
        self.converged = !prepared.is_empty()
            && same_shape
            && prepared.iter().all(|record| {
                let key = (record.time_interval_name.clone(), record.record_number);
                self.sent
                    .get(&key)
                    .is_some_and(|sent| (record.power - sent.power).abs() <= threshold * record.power.abs().max(1.0))
            });
        if self.converged {
            event!(Level::DEBUG, neighbor = %self.config.id, "signal unchanged, nothing to send");
        }

        self.prepared = prepared;
        &self.prepared
    }

    /// The remote node and the records to send it, if anything needs sending
    pub fn outbound(&self) -> Option<(NodeId, Vec<TransactiveRecord>)> {
        let node = self.node()?;
        (!self.converged && !self.prepared.is_empty()).then(|| (node.clone(), self.prepared.clone()))
    }

    /// Remember the prepared records as delivered
    pub fn mark_sent(&mut self) {
        let prepared = &self.prepared;
        self.sent.retain_where(|(name, _), _| {
            !prepared.iter().any(|record| record.time_interval_name == *name)
        });
        for record in self.prepared.drain(..) {
            let key = (record.time_interval_name.clone(), record.record_number);
            self.sent.insert(key, record);
        }
    }
}

fn count_for<'a>(records: impl Iterator<Item = &'a TransactiveRecord>, name: &str) -> usize {
    records.filter(|record| record.time_interval_name == name).count()
}

impl Schedulable for NeighborModel {
    fn id(&self) -> &ModelId {
        &self.config.id
    }

    fn update_vertices(&mut self, market: &MarketView) {
        if market.id != &self.config.market {
            return;
        }
        let z = self.config.effective_impedance;
        for interval in market.intervals {
            let mut vertices = self.inbound_vertices(interval);
            if z != 0.0 {
                for vertex in vertices.iter_mut() {
                    vertex.power -= z * vertex.power * vertex.power;
                }
            }
            self.ledger.active_vertices.set(interval, vertices);
        }
    }

    fn schedule_power(&mut self, market: &MarketView) {
        if market.id == &self.config.market {
            scheduling::schedule_on_curve(&mut self.ledger, market);
        }
    }

    fn update_costs(&mut self, market: &MarketView) {
        if market.id != &self.config.market {
            return;
        }
        let (rate, threshold) = (self.config.demand_charge_rate, self.demand_threshold);
        scheduling::update_costs(&mut self.ledger, market, |_, power| {
            if rate > 0.0 {
                rate * (power - threshold).max(0.0)
            } else {
                0.0
            }
        });
    }

    fn ledger(&self, market: &MarketId) -> Option<&ModelLedger> {
        (market == &self.config.market).then_some(&self.ledger)
    }

    fn ledger_mut(&mut self, market: &MarketId) -> Option<&mut ModelLedger> {
        (market == &self.config.market).then_some(&mut self.ledger)
    }
}
