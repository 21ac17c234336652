pub mod checker;
pub mod prober;

pub use checker::{HealthChecker, ProbeOutcome};
