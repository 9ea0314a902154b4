//! Shared vocabulary for the health sensor simulator: the vital-sign
//! parameter table, the `Reading` snapshot, settings, and the statistical
//! helpers every other crate builds on.

pub mod config;
pub mod error;
pub mod math;
pub mod reading;
pub mod telemetry;
pub mod vital_signs;

pub use config::{DetectionConfig, Settings};
pub use error::{VitalsError, VitalsResult};
pub use reading::Reading;
pub use vital_signs::{ParameterSpec, PhysiologicalState, VitalSign};
