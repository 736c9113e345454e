//! Stateless alert rules evaluated once per asset per cycle.

mod run;
mod threshold;

pub use run::RunDetector;
pub use threshold::ThresholdDetector;
