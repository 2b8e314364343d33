use super::{Map, MarketId, MeasurementType, ModelId, TimeInterval};
use serde::Serialize;
use time::OffsetDateTime;

/// A value bound to one time interval of one market, owned by one model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IntervalValue<T> {
    /// The value itself
    pub value: T,
    /// Start of the interval this value belongs to
    #[serde(with = "time::serde::rfc3339")]
    pub interval: OffsetDateTime,
    /// Name of the interval this value belongs to
    pub interval_name: String,
    /// The market that owns the interval
    pub market: MarketId,
    /// The model (asset, neighbor or market) that produced the value
    pub owner: ModelId,
    /// What the value measures
    pub measurement: MeasurementType,
}

/// A per-interval collection holding at most one value for each interval.
#[derive(Clone, Debug)]
pub struct IntervalValues<T> {
    owner: ModelId,
    market: MarketId,
    measurement: MeasurementType,
    values: Map<OffsetDateTime, IntervalValue<T>>,
}

impl<T> IntervalValues<T> {
    /// An empty collection
    pub fn new(owner: ModelId, market: MarketId, measurement: MeasurementType) -> Self {
        Self {
            owner,
            market,
            measurement,
            values: Map::default(),
        }
    }

    /// What every value in this collection measures
    pub fn measurement(&self) -> MeasurementType {
        self.measurement
    }

    /// Insert or overwrite the value for `interval`
    pub fn set(&mut self, interval: &TimeInterval, value: T) {
        let entry = IntervalValue {
            value,
            interval: interval.start,
            interval_name: interval.name.clone(),
            market: self.market.clone(),
            owner: self.owner.clone(),
            measurement: self.measurement,
        };
        self.values.insert(interval.start, entry);
    }

    /// The value for `interval`, if one has been recorded
    pub fn get(&self, interval: &TimeInterval) -> Option<&T> {
        self.values.get(&interval.start).map(|entry| &entry.value)
    }

    /// The full entry for `interval`
    pub fn entry(&self, interval: &TimeInterval) -> Option<&IntervalValue<T>> {
        self.values.get(&interval.start)
    }

    /// Drop values whose interval is no longer in `active`, returning how many were removed
    pub fn prune(&mut self, active: &[TimeInterval]) -> usize {
        self.values
            .retain_where(|start, _| active.iter().any(|ti| ti.start == *start))
    }

    /// Iterate over the recorded entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &IntervalValue<T>> {
        self.values.values()
    }

    /// Number of recorded values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no values are recorded
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl IntervalValues<f64> {
    /// Sum of all recorded values
    pub fn total(&self) -> f64 {
        self.values.values().map(|entry| entry.value).sum()
    }
}
