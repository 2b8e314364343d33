//! In-memory implementations of the messaging and telemetry ports.
//!
//! These let a whole network of nodes run inside one process, which is how
//! the simulator and the integration tests drive the engine.

use std::{
    convert::Infallible,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use time::OffsetDateTime;
use tns_core::{
    models::{EnergyType, Map, ModelId, NodeId, TransactiveRecord},
    ports::{Measurement, MeasurementSource, Messenger},
};
use tokio::sync::RwLock;

type Mailbox = Map<(EnergyType, String, u32), TransactiveRecord>;

#[derive(Default)]
struct Shared {
    mailboxes: RwLock<Map<(NodeId, NodeId), Mailbox>>,
    closed: AtomicBool,
}

/// A message bus shared by every node of an in-process network.
///
/// Each (sender, receiver) pair has a mailbox holding the latest record for
/// every energy type, interval name and record number. Re-sending a record
/// replaces the earlier one, so repeated delivery is harmless.
#[derive(Clone)]
pub struct InMemoryBus {
    shared: Arc<Shared>,
    retention: Duration,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(Duration::from_secs(48 * 3600))
    }
}

impl InMemoryBus {
    /// A bus that forgets records older than `retention` relative to the newest sent
    pub fn new(retention: Duration) -> Self {
        Self {
            shared: Arc::default(),
            retention,
        }
    }

    /// The bus as seen by `node`
    pub fn endpoint(&self, node: impl Into<NodeId>) -> BusEndpoint {
        BusEndpoint {
            bus: self.clone(),
            node: node.into(),
        }
    }

    /// Refuse all further traffic, as if the transport went down
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Relaxed);
    }

    /// Resume traffic after [`close`](Self::close)
    pub fn reopen(&self) {
        self.shared.closed.store(false, Ordering::Relaxed);
    }

    fn check_open(&self) -> Result<(), BusError> {
        if self.shared.closed.load(Ordering::Relaxed) {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }
}

/// One node's connection to an [`InMemoryBus`]
#[derive(Clone)]
pub struct BusEndpoint {
    bus: InMemoryBus,
    node: NodeId,
}

impl Messenger for BusEndpoint {
    type Error = BusError;

    async fn send(&self, to: &NodeId, records: Vec<TransactiveRecord>) -> Result<(), Self::Error> {
        self.bus.check_open()?;
        let newest = records.iter().map(|record| record.timestamp).max();

        let mut mailboxes = self.bus.shared.mailboxes.write().await;
        let mailbox = mailboxes
            .entry((self.node.clone(), to.clone()))
            .or_default();
        // a record set replaces everything held for the intervals it covers
        mailbox.retain_where(|(energy_type, name, _), _| {
            !records
                .iter()
                .any(|record| record.energy_type == *energy_type && record.time_interval_name == *name)
        });
        for record in records {
            let key = (
                record.energy_type,
                record.time_interval_name.clone(),
                record.record_number,
            );
            mailbox.insert(key, record);
        }
        if let Some(newest) = newest {
            let cutoff = newest - self.bus.retention;
            mailbox.retain_where(|_, record| record.timestamp >= cutoff);
        }
        Ok(())
    }

    async fn receive(&self, from: &NodeId) -> Result<Vec<TransactiveRecord>, Self::Error> {
        self.bus.check_open()?;
        let mailboxes = self.bus.shared.mailboxes.read().await;
        Ok(mailboxes
            .get(&(from.clone(), self.node.clone()))
            .map(|mailbox| mailbox.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// Transport failures of the in-memory bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The bus was closed
    #[error("message bus is closed")]
    Closed,
}

/// Telemetry held in memory, keyed by asset and measurement point.
#[derive(Default)]
pub struct MeasurementStore {
    series: RwLock<Map<(ModelId, String), Vec<Measurement>>>,
}

impl MeasurementStore {
    /// Add a reading
    pub async fn record(&self, asset: ModelId, point: impl Into<String>, measurement: Measurement) {
        let mut series = self.series.write().await;
        let readings = series.entry((asset, point.into())).or_default();
        let at = readings.partition_point(|m| m.timestamp <= measurement.timestamp);
        readings.insert(at, measurement);
    }
}

impl MeasurementSource for MeasurementStore {
    type Error = Infallible;

    async fn latest(
        &self,
        asset: &ModelId,
        point: &str,
        as_of: OffsetDateTime,
    ) -> Result<Option<Measurement>, Self::Error> {
        let series = self.series.read().await;
        Ok(series
            .get(&(asset.clone(), point.to_owned()))
            .and_then(|readings| {
                let end = readings.partition_point(|m| m.timestamp <= as_of);
                end.checked_sub(1).map(|i| readings[i].clone())
            }))
    }
}
