#![warn(missing_docs)]
//! Models and ports for a transactive network node.
//!
//! A transactive node negotiates power exchange with its neighbors through
//! price-quantity signals. This crate holds the vocabulary shared by every
//! implementation of such a node: time intervals, vertices of marginal cost
//! curves, the transactive record that travels between nodes, configuration,
//! and the traits that external collaborators must satisfy.

/// Core domain models for transactive negotiation.
///
/// The models in this module are primarily data structures with minimal
/// business logic. Curve arithmetic and the balancing algorithm live in the
/// engine crate, which consumes these types.
pub mod models;

/// Interface traits for transactive nodes.
///
/// These are the "ports" that separate the negotiation engine from the
/// message bus, telemetry services and efficiency data that feed it. The
/// engine is written against these traits so that transports and data sources
/// can be swapped without touching the balancing logic.
pub mod ports;
