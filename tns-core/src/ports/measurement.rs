use crate::models::ModelId;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A timestamped reading of one measurement point
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// The measured value
    pub value: f64,
    /// When the value was measured
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Access to telemetry for local assets.
pub trait MeasurementSource {
    /// Error type for telemetry failures
    type Error: std::error::Error + Send + Sync + 'static;

    /// The most recent reading of `point` on `asset` taken no later than `as_of`.
    fn latest(
        &self,
        asset: &ModelId,
        point: &str,
        as_of: OffsetDateTime,
    ) -> impl Future<Output = Result<Option<Measurement>, Self::Error>> + Send;
}
