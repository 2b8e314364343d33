//! A network of nodes sharing one in-memory bus.

use serde::{Deserialize, Serialize};
use std::{sync::atomic::AtomicBool, time::Duration};
use time::OffsetDateTime;
use tns_core::{
    models::{Map, ModelId, NodeConfig},
    ports::Measurement,
};
use tns_engine::{CycleReport, EngineError, InMemoryBus, MeasurementStore, SampleFits, TransactiveNode};
use tracing::{Level, event};

/// The nodes to simulate and the data that feeds them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Every node, cycled in this order
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    /// Telemetry available from the start
    #[serde(default)]
    pub measurements: Vec<MeasurementSeed>,

    /// Operating samples `(output, input)` keyed by curve-fit name
    #[serde(default)]
    pub curve_fits: Map<String, Vec<(f64, f64)>>,

    /// How long the bus keeps records
    #[serde(default = "default_retention", with = "humantime_serde")]
    pub retention: Duration,
}

fn default_retention() -> Duration {
    Duration::from_secs(48 * 3600)
}

/// A measurement loaded into the store before the first cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementSeed {
    /// The measured asset
    pub asset: ModelId,
    /// The measurement point
    pub point: String,
    /// The reading
    #[serde(flatten)]
    pub measurement: Measurement,
}

/// Every node's reports for one cycle time
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    /// The cycle time
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    /// One report per node and open market
    pub reports: Vec<CycleReport>,
}

impl CycleSummary {
    /// Log one line per market
    pub fn log(&self) {
        for report in &self.reports {
            event!(
                Level::INFO,
                node = %report.node,
                market = %report.market,
                converged = report.outcome.converged,
                iterations = report.outcome.iterations,
                duality_gap = report.outcome.duality_gap,
                intervals = report.intervals.len(),
            );
        }
    }
}

/// Nodes and the in-memory collaborators they share
pub struct Network {
    nodes: Vec<TransactiveNode>,
    bus: InMemoryBus,
    measurements: MeasurementStore,
    fits: SampleFits,
}

impl Network {
    /// Build every node and seed the collaborators
    pub async fn build(config: NetworkConfig) -> Result<Self, EngineError> {
        let nodes = config
            .nodes
            .into_iter()
            .map(TransactiveNode::new)
            .collect::<Result<Vec<_>, _>>()?;

        let measurements = MeasurementStore::default();
        for seed in config.measurements {
            measurements.record(seed.asset, seed.point, seed.measurement).await;
        }

        event!(Level::INFO, nodes = nodes.len(), "network built");
        Ok(Self {
            nodes,
            bus: InMemoryBus::new(config.retention),
            measurements,
            fits: config.curve_fits.into_iter().collect(),
        })
    }

    /// The simulated nodes
    pub fn nodes(&self) -> &[TransactiveNode] {
        &self.nodes
    }

    /// Run one cycle of every node at `now`
    pub async fn cycle(&mut self, now: OffsetDateTime, shutdown: &AtomicBool) -> Result<CycleSummary, EngineError> {
        let mut reports = Vec::new();
        for node in self.nodes.iter_mut() {
            let endpoint = self.bus.endpoint(node.id().clone());
            reports.extend(
                node.run_cycle(now, &endpoint, &self.measurements, &self.fits, shutdown)
                    .await?,
            );
        }
        Ok(CycleSummary { at: now, reports })
    }

    /// Run `cycles` cycles starting at `start`, `step` apart
    pub async fn simulate(
        &mut self,
        start: OffsetDateTime,
        step: Duration,
        cycles: usize,
        shutdown: &AtomicBool,
    ) -> Result<Vec<CycleSummary>, EngineError> {
        let mut summaries = Vec::with_capacity(cycles);
        let mut now = start;
        for _ in 0..cycles {
            let summary = self.cycle(now, shutdown).await?;
            summary.log();
            summaries.push(summary);
            now += step;
        }
        Ok(summaries)
    }
}
