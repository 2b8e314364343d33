mod config;
mod energy;
mod float;
mod interval;
mod interval_value;
mod ledger;
mod map;
mod record;
mod state;
mod thermal;
mod vertex;

pub use config::*;
pub use energy::{EnergyType, MeasurementType};
pub use float::extended;
pub use interval::{TimeInterval, interval_name};
pub use interval_value::{IntervalValue, IntervalValues};
pub use ledger::ModelLedger;
pub use map::Map;
pub use record::{RecordError, TransactiveRecord, decode_records, encode_records};
pub use state::{AuctionState, MarketState, StateTiming};
pub use thermal::{Fluid, LoopParameters};
pub use vertex::{Vertex, VertexError, sort_by_power, validate_vertices};

use std::fmt;

macro_rules! string_wrapper {
    ($struct:ident) => {
        #[derive(
            Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        #[doc = concat!("A newtype wrapper for ", stringify!($struct))]
        pub struct $struct(String);

        impl $struct {
            /// Borrow the underlying identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $struct {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $struct {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $struct {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_wrapper!(NodeId);
string_wrapper!(MarketId);
string_wrapper!(ModelId);

impl From<&MarketId> for ModelId {
    /// Markets own interval values too, so they need an owner identity of their own
    fn from(value: &MarketId) -> Self {
        Self(value.0.clone())
    }
}
