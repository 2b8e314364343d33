use crate::{EngineError, curve};
use serde::Serialize;
use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};
use time::OffsetDateTime;
use tns_core::{
    models::{
        EnergyType, IntervalValues, MarketConfig, MarketId, MeasurementType, ModelId, ModelLedger,
        TimeInterval, Vertex,
    },
    ports::{MarketView, Schedulable},
};
use tracing::{Level, event, span};

/// A model scheduled by one or more markets.
///
/// Each model sits behind its own lock, so a model bidding into several
/// markets is scheduled by at most one of them at a time.
pub type Participant = Arc<Mutex<dyn Schedulable + Send>>;

/// Result of one call to [`Market::balance`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BalanceOutcome {
    /// Whether every price settled within tolerance
    pub converged: bool,
    /// Iterations run
    pub iterations: usize,
    /// Relative gap between production and dual cost after the last iteration
    pub duality_gap: f64,
}

/// How [`Market::check_intervals`] changed the active set
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IntervalChanges {
    /// Newly created intervals
    pub added: usize,
    /// Intervals that left the live window
    pub expired: usize,
    /// Duplicate intervals dropped
    pub duplicates: usize,
}

/// The curve a node offers a neighbor for one interval
#[derive(Clone, Debug, PartialEq)]
pub struct Offer {
    /// The interval offered
    pub interval: TimeInterval,
    /// The interval's cleared price
    pub price: f64,
    /// The summed curve of every other participant
    pub vertices: Vec<Vertex>,
}

/// A market (or thermal auction) owned by a node.
pub struct Market {
    config: MarketConfig,
    intervals: Vec<TimeInterval>,
    prices: IntervalValues<f64>,
    net_powers: IntervalValues<f64>,
    system_vertices: IntervalValues<Vec<Vertex>>,
    committed: IntervalValues<bool>,
    participants: Vec<(ModelId, Participant)>,
    outcome: BalanceOutcome,
}

impl Market {
    /// An empty market; call [`check_intervals`](Self::check_intervals) to populate it
    pub fn new(config: MarketConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let owner = ModelId::from(&config.id);
        Ok(Self {
            prices: values(&owner, &config.id, MeasurementType::MarginalPrice),
            net_powers: values(&owner, &config.id, MeasurementType::NetPower),
            system_vertices: values(&owner, &config.id, MeasurementType::ActiveVertex),
            committed: values(&owner, &config.id, MeasurementType::Engagement),
            intervals: Vec::new(),
            participants: Vec::new(),
            outcome: BalanceOutcome::default(),
            config,
        })
    }

    /// The market identifier
    pub fn id(&self) -> &MarketId {
        &self.config.id
    }

    /// The market configuration
    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// The commodity cleared
    pub fn energy_type(&self) -> EnergyType {
        self.config.energy_type
    }

    /// The active intervals, ordered by start
    pub fn intervals(&self) -> &[TimeInterval] {
        &self.intervals
    }

    /// The active interval starting at `start`
    pub fn interval(&self, start: OffsetDateTime) -> Option<&TimeInterval> {
        self.intervals.iter().find(|ti| ti.start == start)
    }

    /// Outcome of the most recent balance
    pub fn outcome(&self) -> BalanceOutcome {
        self.outcome
    }

    /// Identifiers of every participant, in joining order
    pub fn participants(&self) -> impl Iterator<Item = &ModelId> {
        self.participants.iter().map(|(id, _)| id)
    }

    /// Add a model to the market
    pub fn join(&mut self, id: ModelId, participant: Participant) {
        self.participants.push((id, participant));
    }

    /// Whether the market runs at all at `now`
    pub fn is_open(&self, now: OffsetDateTime) -> bool {
        self.config
            .next_market_clearing_time
            .is_none_or(|next| now >= next)
    }

    /// The marginal price of `interval`
    pub fn price(&self, interval: &TimeInterval) -> f64 {
        self.prices
            .get(interval)
            .copied()
            .unwrap_or(self.config.default_price)
    }

    /// Net scheduled power of `interval` after the last balance
    pub fn net_power(&self, interval: &TimeInterval) -> Option<f64> {
        self.net_powers.get(interval).copied()
    }

    /// The system curve of `interval` after the last balance
    pub fn system_vertices(&self, interval: &TimeInterval) -> &[Vertex] {
        self.system_vertices
            .get(interval)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether `interval` has been committed for delivery
    pub fn is_committed(&self, interval: &TimeInterval) -> bool {
        self.committed.get(interval).copied().unwrap_or(false)
    }

    /// Bring the active interval set in line with `now`.
    ///
    /// Interval starts are aligned to the configured market-clearing time. A
    /// start is live while its interval has not ended and it lies within the
    /// future horizon. Duplicates are reduced to one, missing intervals are
    /// created, states are recomputed, and every value tied to an interval
    /// that left the window is pruned, including the participants' ledgers.
    pub fn check_intervals(&mut self, now: OffsetDateTime) -> Result<IntervalChanges, EngineError> {
        let timing = self.config.timing();
        let live = self.live_starts(now);
        let mut changes = IntervalChanges::default();

        let mut seen = Vec::with_capacity(self.intervals.len());
        self.intervals.retain(|ti| {
            if seen.contains(&ti.start) {
                changes.duplicates += 1;
                false
            } else {
                seen.push(ti.start);
                true
            }
        });
        if changes.duplicates > 0 {
            event!(
                Level::WARN,
                market = %self.config.id,
                duplicates = changes.duplicates,
                "removed duplicate intervals"
            );
        }

        let before = self.intervals.len();
        self.intervals.retain(|ti| live.contains(&ti.start));
        changes.expired = before - self.intervals.len();

        for &start in &live {
            if !seen.contains(&start) {
                let interval = TimeInterval::new(
                    self.config.id.clone(),
                    start,
                    self.config.interval_duration,
                    start - timing.future_horizon,
                    self.config.market_clearing_time,
                );
                // new intervals start from the latest known price
                let price = self
                    .intervals
                    .iter()
                    .filter(|ti| ti.start < start)
                    .max_by_key(|ti| ti.start)
                    .and_then(|ti| self.prices.get(ti).copied())
                    .unwrap_or(self.config.default_price);
                self.prices.set(&interval, price);
                self.intervals.push(interval);
                changes.added += 1;
            }
        }

        self.intervals.sort_by_key(|ti| ti.start);
        for interval in self.intervals.iter_mut() {
            interval.revalidate(now, &timing);
        }

        let active = self.intervals.as_slice();
        self.prices.prune(active);
        self.net_powers.prune(active);
        self.system_vertices.prune(active);
        self.committed.prune(active);
        for (id, participant) in &self.participants {
            let mut model = lock(id, participant)?;
            if let Some(ledger) = model.ledger_mut(&self.config.id) {
                ledger.prune(active);
                ledger.update_totals();
            }
        }

        if changes.added > 0 || changes.expired > 0 {
            event!(
                Level::DEBUG,
                market = %self.config.id,
                added = changes.added,
                expired = changes.expired,
                active = self.intervals.len(),
                "checked intervals"
            );
        }
        Ok(changes)
    }

    fn live_starts(&self, now: OffsetDateTime) -> Vec<OffsetDateTime> {
        let step = self.config.interval_duration;
        let secs = step.as_secs() as i64;
        let anchor = self.config.market_clearing_time;
        let offset = now - anchor;
        // floor of the offset in whole seconds
        let floor = offset.whole_seconds() - i64::from(offset.subsec_nanoseconds() < 0);
        let k = floor.div_euclid(secs);
        let horizon_end = now + self.config.future_horizon;

        let mut start = anchor + time::Duration::seconds(k * secs);
        let mut starts = Vec::new();
        while start < horizon_end {
            if start + step > now {
                starts.push(start);
            }
            start += step;
        }
        starts
    }

    /// Select the intervals to work on: the given starts, or the earliest
    /// `intervals_to_clear` of the active set.
    fn selected(&self, starts: Option<&[OffsetDateTime]>) -> Vec<TimeInterval> {
        match starts {
            Some(starts) => self
                .intervals
                .iter()
                .filter(|ti| starts.contains(&ti.start))
                .cloned()
                .collect(),
            None => {
                let limit = self.config.intervals_to_clear.unwrap_or(usize::MAX);
                self.intervals.iter().take(limit).cloned().collect()
            }
        }
    }

    fn view<'a>(
        &'a self,
        intervals: &'a [TimeInterval],
        prices: &'a [f64],
        now: OffsetDateTime,
    ) -> MarketView<'a> {
        MarketView {
            id: &self.config.id,
            energy_type: self.config.energy_type,
            intervals,
            prices,
            default_price: self.config.default_price,
            loop_parameters: self.config.thermal_loop.as_ref(),
            now,
        }
    }

    fn for_each_participant(
        &self,
        mut f: impl FnMut(&mut (dyn Schedulable + Send + 'static)),
    ) -> Result<(), EngineError> {
        for (id, participant) in &self.participants {
            let mut model = lock(id, participant)?;
            f(&mut *model);
        }
        Ok(())
    }

    /// Every participant's offered curve, indexed `[participant][interval]`
    fn curves(&self, intervals: &[TimeInterval]) -> Result<Vec<Vec<Vec<Vertex>>>, EngineError> {
        self.participants
            .iter()
            .map(|(id, participant)| -> Result<Vec<Vec<Vertex>>, EngineError> {
                let model = lock(id, participant)?;
                let ledger = model.ledger(&self.config.id);
                Ok(intervals
                    .iter()
                    .map(|ti| ledger.map(|l| l.vertices(ti).to_vec()).unwrap_or_default())
                    .collect())
            })
            .collect()
    }

    fn clearing_prices(&self, intervals: &[TimeInterval], fallback: &[f64]) -> Result<Vec<f64>, EngineError> {
        let curves = self.curves(intervals)?;
        Ok((0..intervals.len())
            .map(|i| {
                let slices = curves.iter().map(|c| c[i].as_slice()).collect::<Vec<_>>();
                curve::clearing_price(&slices, fallback[i])
            })
            .collect())
    }

    fn duality_gap(&self, intervals: &[TimeInterval]) -> Result<f64, EngineError> {
        let (mut production, mut dual) = (0.0, 0.0);
        for (id, participant) in &self.participants {
            let model = lock(id, participant)?;
            if let Some(ledger) = model.ledger(&self.config.id) {
                for ti in intervals {
                    production += ledger.production_costs.get(ti).copied().unwrap_or_default();
                    dual += ledger.dual_costs.get(ti).copied().unwrap_or_default();
                }
            }
        }
        Ok(if production == 0.0 {
            0.0
        } else {
            (production - dual) / production
        })
    }

    /// Iterate scheduling and price discovery until prices settle.
    ///
    /// Each iteration schedules every participant against the current
    /// prices, clears a new price per interval from the participants'
    /// curves, and refreshes their costs at those prices. Prices have settled
    /// when none moved by more than the configured tolerance; the loop never
    /// runs more than the configured number of iterations. Afterwards every
    /// participant is scheduled once more so that schedules match the final
    /// prices, and the net powers and system curves are recorded.
    ///
    /// `starts` restricts balancing to some of the active intervals. The
    /// shutdown flag is honored between iterations.
    pub fn balance(
        &mut self,
        now: OffsetDateTime,
        starts: Option<&[OffsetDateTime]>,
        shutdown: &AtomicBool,
    ) -> Result<BalanceOutcome, EngineError> {
        let span = span!(Level::INFO, "balance", market = %self.config.id);
        let _enter = span.enter();

        let intervals = self.selected(starts);
        if intervals.is_empty() {
            self.outcome = BalanceOutcome {
                converged: true,
                ..Default::default()
            };
            return Ok(self.outcome);
        }

        let mut prices = intervals.iter().map(|ti| self.price(ti)).collect::<Vec<_>>();
        let mut last = vec![f64::INFINITY; intervals.len()];
        let mut outcome = BalanceOutcome::default();

        while !outcome.converged && outcome.iterations < self.config.max_iterations {
            if shutdown.load(Ordering::Relaxed) {
                event!(Level::WARN, iterations = outcome.iterations, "shutdown requested, abandoning balance");
                return Err(EngineError::Cancelled);
            }
            outcome.iterations += 1;

            let view = self.view(&intervals, &prices, now);
            self.for_each_participant(|model| model.schedule(&view))?;

            let cleared = self.clearing_prices(&intervals, &prices)?;
            outcome.converged = cleared
                .iter()
                .zip(&last)
                .all(|(new, old)| (new - old).abs() <= self.config.price_tolerance);

            let view = self.view(&intervals, &cleared, now);
            self.for_each_participant(|model| model.update_costs(&view))?;
            outcome.duality_gap = self.duality_gap(&intervals)?;

            event!(
                Level::DEBUG,
                iteration = outcome.iterations,
                duality_gap = outcome.duality_gap,
                converged = outcome.converged,
            );

            last.clone_from(&cleared);
            prices = cleared;
        }

        self.settle(&intervals, &prices, now)?;

        if outcome.converged {
            event!(
                Level::INFO,
                iterations = outcome.iterations,
                duality_gap = outcome.duality_gap,
                "balance converged"
            );
            if outcome.duality_gap.abs() > self.config.duality_gap_threshold {
                event!(
                    Level::WARN,
                    duality_gap = outcome.duality_gap,
                    threshold = self.config.duality_gap_threshold,
                    "prices settled with a large duality gap"
                );
            }
        } else {
            event!(
                Level::WARN,
                iterations = outcome.iterations,
                duality_gap = outcome.duality_gap,
                "balance stopped at the iteration bound"
            );
        }

        self.outcome = outcome;
        Ok(outcome)
    }

    /// Schedule once against the current prices without searching for new ones.
    pub fn schedule_only(&mut self, now: OffsetDateTime, starts: &[OffsetDateTime]) -> Result<(), EngineError> {
        let intervals = self.selected(Some(starts));
        let prices = intervals.iter().map(|ti| self.price(ti)).collect::<Vec<_>>();
        self.settle(&intervals, &prices, now)
    }

    /// The final pass shared by every balance: schedule at `prices` and record the results
    fn settle(&mut self, intervals: &[TimeInterval], prices: &[f64], now: OffsetDateTime) -> Result<(), EngineError> {
        let view = self.view(intervals, prices, now);
        self.for_each_participant(|model| {
            model.schedule(&view);
            model.update_costs(&view);
            if let Some(ledger) = model.ledger_mut(view.id) {
                ledger.update_totals();
            }
        })?;

        let curves = self.curves(intervals)?;
        let mut net = vec![0.0; intervals.len()];
        for (id, participant) in &self.participants {
            let model = lock(id, participant)?;
            if let Some(ledger) = model.ledger(&self.config.id) {
                for (i, ti) in intervals.iter().enumerate() {
                    net[i] += ledger.scheduled_power(ti).unwrap_or_default();
                }
            }
        }

        for (i, ti) in intervals.iter().enumerate() {
            let slices = curves.iter().map(|c| c[i].as_slice()).collect::<Vec<_>>();
            self.prices.set(ti, prices[i]);
            self.net_powers.set(ti, net[i]);
            self.system_vertices.set(ti, curve::system_vertices(&slices));
        }
        Ok(())
    }

    /// Map every participant's ledger for this market, in joining order
    pub(crate) fn with_ledgers<T>(
        &self,
        mut f: impl FnMut(&ModelId, &ModelLedger) -> T,
    ) -> Result<Vec<T>, EngineError> {
        let mut out = Vec::with_capacity(self.participants.len());
        for (id, participant) in &self.participants {
            let model = lock(id, participant)?;
            if let Some(ledger) = model.ledger(&self.config.id) {
                out.push(f(id, ledger));
            }
        }
        Ok(out)
    }

    /// Mark intervals as committed for delivery; they keep their last schedule.
    pub fn commit(&mut self, starts: &[OffsetDateTime]) {
        for interval in self.selected(Some(starts)) {
            if !self.is_committed(&interval) {
                event!(Level::DEBUG, market = %self.config.id, interval = %interval.name, "committed");
            }
            self.committed.set(&interval, true);
        }
    }

    /// The curve this market offers `model`: the aggregate of every other participant.
    pub fn offer_excluding(
        &self,
        model: &ModelId,
        starts: Option<&[OffsetDateTime]>,
    ) -> Result<Vec<Offer>, EngineError> {
        let intervals = self.selected(starts);
        let curves = self.curves(&intervals)?;
        let others = self
            .participants
            .iter()
            .zip(&curves)
            .filter(|((id, _), _)| id != model)
            .map(|(_, c)| c)
            .collect::<Vec<_>>();

        Ok(intervals
            .into_iter()
            .enumerate()
            .map(|(i, interval)| {
                let slices = others.iter().map(|c| c[i].as_slice()).collect::<Vec<_>>();
                Offer {
                    price: self.price(&interval),
                    vertices: curve::aggregate(&slices),
                    interval,
                }
            })
            .collect())
    }
}

fn values<T>(owner: &ModelId, market: &MarketId, measurement: MeasurementType) -> IntervalValues<T> {
    IntervalValues::new(owner.clone(), market.clone(), measurement)
}

fn lock<'a>(
    id: &ModelId,
    participant: &'a Participant,
) -> Result<MutexGuard<'a, dyn Schedulable + Send + 'static>, EngineError> {
    participant
        .lock()
        .map_err(|_| EngineError::Poisoned(id.clone()))
}
