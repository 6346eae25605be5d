//! Square-root attitude and gyro-bias propagation for three attitude
//! parametrizations, compared side by side on a discrete-event simulation.
//!
//! A [`Simulator`] advances the true attitude of a rotating vehicle and
//! publishes noisy gyro samples. Three [`AttitudeEstimator`]s, one per
//! parametrization ([`MrpRiekf`], [`QuatRiekf`] and [`Mekf`]), propagate their
//! state and lower-triangular covariance factor from each sample. Everything
//! published is recorded by a [`Logger`] and can be summarized with
//! [`analysis::summarize`].
//!
//! ```
//! use attitude_bank::{analysis, run_scenario, ScenarioConfig, ESTIMATORS};
//!
//! # fn main() -> attitude_bank::Result<()> {
//! let config = ScenarioConfig {
//!     t_final: 0.1,
//!     ..ScenarioConfig::default()
//! };
//! let log = run_scenario(&config)?;
//! for name in ESTIMATORS {
//!     let summary = analysis::summarize(&log, name)?;
//!     assert!(summary.max_norm_error < 1e-6);
//! }
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod bus;
pub mod equations;
mod error;
pub mod estimator;
pub mod integrate;
pub mod logger;
pub mod msgs;
pub mod params;
pub mod rotation;
pub mod scenario;
pub mod scheduler;
pub mod simulator;

pub use equations::{AttitudeEquations, Mekf, MrpRiekf, QuatRiekf};
pub use error::{Error, Result};
pub use estimator::AttitudeEstimator;
pub use logger::{Log, Logger};
pub use params::{EstimatorParameters, RateProfile, ScenarioConfig, SimulatorParameters};
pub use scenario::{run_batch, run_scenario, ESTIMATORS};
pub use simulator::Simulator;
