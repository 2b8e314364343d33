use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

/// Lifecycle of a time interval as seen by an electrical market.
///
/// The state is a pure function of how far the current time is from the
/// interval's start; see [`MarketState::at`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketState {
    /// Not yet inside the negotiation horizon
    #[default]
    Inactive,
    /// Assets generate initial vertices; prices may still move freely
    Negotiation,
    /// Bids are gathered from downstream neighbors and forwarded upstream
    MarketLead,
    /// Offers flow from the upstream neighbor to downstream neighbors
    DeliveryLead,
    /// Power is being delivered; the schedule is committed
    Delivery,
    /// Delivery is over and results may be published
    Publish,
    /// Nothing further happens to this interval
    Expired,
}

/// Lifecycle of a time interval as seen by a thermal auction.
///
/// Auctions use their own vocabulary, but the stages correspond one-to-one to
/// those of [`MarketState`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionState {
    /// Not yet inside the negotiation horizon
    #[default]
    Inactive,
    /// Participants explore prices
    Exploring,
    /// Tenders are collected
    Tender,
    /// The transaction is settled
    Transaction,
    /// Thermal power is being delivered
    Delivery,
    /// Results may be published
    Publish,
    /// Nothing further happens to this interval
    Expired,
}

impl From<MarketState> for AuctionState {
    fn from(value: MarketState) -> Self {
        match value {
            MarketState::Inactive => Self::Inactive,
            MarketState::Negotiation => Self::Exploring,
            MarketState::MarketLead => Self::Tender,
            MarketState::DeliveryLead => Self::Transaction,
            MarketState::Delivery => Self::Delivery,
            MarketState::Publish => Self::Publish,
            MarketState::Expired => Self::Expired,
        }
    }
}

/// The offsets that drive interval state transitions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateTiming {
    /// How far ahead of its start an interval becomes negotiable
    pub future_horizon: Duration,
    /// How far ahead of its start bids are gathered
    pub market_lead: Duration,
    /// How far ahead of its start offers are distributed
    pub delivery_lead: Duration,
    /// How long after its end an interval remains publishable
    pub publish_duration: Duration,
}

impl MarketState {
    /// Determine the state of the interval `[start, end)` at time `now`.
    pub fn at(now: OffsetDateTime, start: OffsetDateTime, end: OffsetDateTime, timing: &StateTiming) -> Self {
        if now >= end + timing.publish_duration {
            Self::Expired
        } else if now >= end {
            Self::Publish
        } else if now >= start {
            Self::Delivery
        } else if now >= start - timing.delivery_lead {
            Self::DeliveryLead
        } else if now >= start - timing.market_lead {
            Self::MarketLead
        } else if now >= start - timing.future_horizon {
            Self::Negotiation
        } else {
            Self::Inactive
        }
    }

    /// Whether the interval still accepts new schedules
    pub fn is_open(self) -> bool {
        matches!(self, Self::Negotiation | Self::MarketLead | Self::DeliveryLead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::datetime;

    fn timing() -> StateTiming {
        StateTiming {
            future_horizon: Duration::from_secs(24 * 3600),
            market_lead: Duration::from_secs(30 * 60),
            delivery_lead: Duration::from_secs(10 * 60),
            publish_duration: Duration::from_secs(15 * 60),
        }
    }

    #[rstest]
    #[case(datetime!(2024-01-01 0:00 UTC), MarketState::Inactive)]
    #[case(datetime!(2024-01-01 12:00 UTC), MarketState::Negotiation)]
    #[case(datetime!(2024-01-02 11:30 UTC), MarketState::MarketLead)]
    #[case(datetime!(2024-01-02 11:55 UTC), MarketState::DeliveryLead)]
    #[case(datetime!(2024-01-02 12:00 UTC), MarketState::Delivery)]
    #[case(datetime!(2024-01-02 13:05 UTC), MarketState::Publish)]
    #[case(datetime!(2024-01-02 13:15 UTC), MarketState::Expired)]
    fn state_follows_the_clock(#[case] now: OffsetDateTime, #[case] expected: MarketState) {
        let start = datetime!(2024-01-02 12:00 UTC);
        let end = datetime!(2024-01-02 13:00 UTC);
        assert_eq!(MarketState::at(now, start, end, &timing()), expected);
    }

    #[test]
    fn auction_states_mirror_market_states() {
        assert_eq!(AuctionState::from(MarketState::Negotiation), AuctionState::Exploring);
        assert_eq!(AuctionState::from(MarketState::MarketLead), AuctionState::Tender);
        assert_eq!(AuctionState::from(MarketState::DeliveryLead), AuctionState::Transaction);
    }
}
