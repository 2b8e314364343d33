use super::{AuctionState, MarketId, MarketState, StateTiming};
use std::time::Duration;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// A discrete clearing period of a market.
///
/// An interval is identified by its start time. Its name is derived from the
/// start and is what crosses node boundaries inside transactive records.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeInterval {
    /// The market that created this interval
    pub market: MarketId,
    /// The identity of the interval
    pub start: OffsetDateTime,
    /// The length of the interval
    pub duration: Duration,
    /// When the interval entered the negotiation horizon
    pub activation: OffsetDateTime,
    /// The market-clearing time at which this interval was created
    pub market_clearing_time: OffsetDateTime,
    /// The name, derived from the start time
    pub name: String,
    /// The current lifecycle stage
    pub market_state: MarketState,
}

impl TimeInterval {
    /// Create an interval in the inactive state
    pub fn new(
        market: MarketId,
        start: OffsetDateTime,
        duration: Duration,
        activation: OffsetDateTime,
        market_clearing_time: OffsetDateTime,
    ) -> Self {
        Self {
            market,
            name: interval_name(start),
            start,
            duration,
            activation,
            market_clearing_time,
            market_state: MarketState::Inactive,
        }
    }

    /// The (exclusive) end of the interval
    pub fn end(&self) -> OffsetDateTime {
        self.start + self.duration
    }

    /// The length of the interval in hours, used to turn cost rates into costs
    pub fn hours(&self) -> f64 {
        self.duration.as_secs_f64() / 3600.0
    }

    /// Whether `t` falls inside `[start, end)`
    pub fn contains(&self, t: OffsetDateTime) -> bool {
        self.start <= t && t < self.end()
    }

    /// Recompute the lifecycle stage at time `now`
    pub fn revalidate(&mut self, now: OffsetDateTime, timing: &StateTiming) -> MarketState {
        self.activation = self.start - timing.future_horizon;
        self.market_state = MarketState::at(now, self.start, self.end(), timing);
        self.market_state
    }

    /// The lifecycle stage in auction vocabulary
    pub fn auction_state(&self) -> AuctionState {
        self.market_state.into()
    }
}

/// The canonical name of an interval starting at `start` (RFC3339).
pub fn interval_name(start: OffsetDateTime) -> String {
    start
        .format(&Rfc3339)
        .unwrap_or_else(|_| start.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn name_is_derived_from_start() {
        let start = datetime!(2024-06-01 13:00 UTC);
        let ti = TimeInterval::new(
            "grid".into(),
            start,
            Duration::from_secs(3600),
            start,
            start,
        );
        assert_eq!(ti.name, "2024-06-01T13:00:00Z");
        assert_eq!(ti.end(), datetime!(2024-06-01 14:00 UTC));
        assert!(ti.contains(datetime!(2024-06-01 13:59 UTC)));
        assert!(!ti.contains(datetime!(2024-06-01 14:00 UTC)));
        assert_eq!(ti.hours(), 1.0);
    }
}
