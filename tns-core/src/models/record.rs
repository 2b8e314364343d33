use super::{EnergyType, Vertex};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One point of a transactive signal.
///
/// A node sends one set of records per neighbor and active interval. Record
/// number 0 is the currently cleared balance point; records numbered from 1
/// are the vertices of the offered curve. Records are immutable once created,
/// and receivers treat a later record with the same interval name and record
/// number as a replacement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactiveRecord {
    /// Name of the interval this record is about
    pub time_interval_name: String,
    /// 0 for the balance point, 1.. for curve vertices
    pub record_number: u32,
    /// Marginal price (currency per kWh)
    #[serde(with = "super::extended")]
    pub marginal_price: f64,
    /// Signed power (kW), positive towards the receiver
    pub power: f64,
    /// Power uncertainty (kW)
    #[serde(default)]
    pub power_uncertainty: f64,
    /// Production cost rate at this point
    #[serde(default)]
    pub cost: f64,
    /// Optional electrical detail, zero when unused
    #[serde(default)]
    pub reactive_power: f64,
    /// Uncertainty in the reactive power
    #[serde(default)]
    pub reactive_power_uncertainty: f64,
    /// Voltage at the point of exchange
    #[serde(default)]
    pub voltage: f64,
    /// Uncertainty in the voltage
    #[serde(default)]
    pub voltage_uncertainty: f64,
    /// When the record was created
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// The commodity described
    #[serde(default)]
    pub energy_type: EnergyType,
}

impl TransactiveRecord {
    /// Build a record from a vertex of an offered curve
    pub fn new(
        time_interval_name: impl Into<String>,
        record_number: u32,
        vertex: &Vertex,
        energy_type: EnergyType,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            time_interval_name: time_interval_name.into(),
            record_number,
            marginal_price: vertex.marginal_price,
            power: vertex.power,
            power_uncertainty: vertex.power_uncertainty,
            cost: vertex.cost,
            reactive_power: 0.0,
            reactive_power_uncertainty: 0.0,
            voltage: 0.0,
            voltage_uncertainty: 0.0,
            timestamp,
            energy_type,
        }
    }

    /// Whether this record carries the cleared balance point
    pub fn is_balance_point(&self) -> bool {
        self.record_number == 0
    }

    /// The curve vertex this record describes
    pub fn to_vertex(&self) -> Vertex {
        Vertex {
            marginal_price: self.marginal_price,
            cost: self.cost,
            power: self.power,
            continuity: true,
            power_uncertainty: self.power_uncertainty,
        }
    }
}

/// Encode a record set for the wire.
pub fn encode_records(records: &[TransactiveRecord]) -> Result<String, RecordError> {
    Ok(serde_json::to_string(records)?)
}

/// Decode a record set received from the wire.
pub fn decode_records(raw: &str) -> Result<Vec<TransactiveRecord>, RecordError> {
    let records: Vec<TransactiveRecord> = serde_json::from_str(raw)?;
    for record in &records {
        if record.power.is_nan() || record.marginal_price.is_nan() {
            return Err(RecordError::NaN {
                interval: record.time_interval_name.clone(),
                record_number: record.record_number,
            });
        }
    }
    Ok(records)
}

/// Errors when moving records across the wire
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The payload could not be (de)serialized
    #[error("malformed record payload: {0}")]
    Json(#[from] serde_json::Error),
    /// A record carries a NaN power or price
    #[error("record {record_number} for {interval} contains NaN")]
    NaN {
        /// Interval name of the offending record
        interval: String,
        /// Record number of the offending record
        record_number: u32,
    },
}
