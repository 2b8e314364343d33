mod curve_fit;
mod measurement;
mod messenger;
mod schedulable;

pub use curve_fit::{CurveFitRepository, FitCoefficients};
pub use measurement::{Measurement, MeasurementSource};
pub use messenger::Messenger;
pub use schedulable::{MarketView, Schedulable};
