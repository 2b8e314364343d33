//! The negotiation engine of a transactive network node.
//!
//! A [`TransactiveNode`] owns one or more [`Market`]s. Every market balances
//! the node's local assets against its neighbors: participants schedule
//! themselves at the current prices, a new price is cleared from their
//! curves, and the loop repeats until prices settle. The curves offered to
//! each neighbor then leave the node as transactive records.
//!
//! Curve arithmetic lives in [`curve`]; the collaborators a node talks to are
//! the ports of `tns_core`, with in-memory implementations in [`bus`] and
//! [`fit`].

pub mod asset;
pub mod bus;
pub mod curve;
mod error;
pub mod fit;
pub mod market;
pub mod neighbor;
pub mod node;
pub mod report;
mod scheduling;

pub use asset::LocalAsset;
pub use bus::{BusEndpoint, InMemoryBus, MeasurementStore};
pub use error::EngineError;
pub use fit::SampleFits;
pub use market::{BalanceOutcome, Market, Offer, Participant};
pub use neighbor::NeighborModel;
pub use node::TransactiveNode;
pub use report::CycleReport;
