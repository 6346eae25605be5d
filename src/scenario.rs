//! Wiring of a complete run: one simulator, the three estimators and a
//! logger on a fresh [`Core`].

use rayon::prelude::*;

use crate::equations::{AttitudeEquations, Mekf, MrpRiekf, QuatRiekf};
use crate::error::Result;
use crate::estimator::AttitudeEstimator;
use crate::logger::{Log, Logger};
use crate::params::ScenarioConfig;
use crate::scheduler::Core;
use crate::simulator::Simulator;

/// Names of the estimators wired into every scenario, in subscription order.
pub const ESTIMATORS: [&str; 3] = [MrpRiekf::NAME, QuatRiekf::NAME, Mekf::NAME];

/// Run one simulation until `config.t_final` and return everything that was
/// published.
///
/// ```
/// use attitude_bank::{run_scenario, ScenarioConfig};
///
/// # fn main() -> attitude_bank::Result<()> {
/// let config = ScenarioConfig {
///     t_final: 0.05,
///     ..ScenarioConfig::default()
/// };
/// let log = run_scenario(&config)?;
/// assert_eq!(log.topic("imu")?.len(), log.topic("mekf_state")?.len());
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter) for
/// an invalid configuration and
/// [`Error::NonFinite`](crate::Error::NonFinite) if an estimator diverges.
pub fn run_scenario(config: &ScenarioConfig) -> Result<Log> {
    config.validate()?;

    let mut core = Core::new();
    let logger = Logger::attach(core.bus());
    let simulator = Simulator::new(core.bus(), &config.simulator)?;

    AttitudeEstimator::new(core.bus(), MrpRiekf, config.estimator.clone())?.attach(core.bus())?;
    AttitudeEstimator::new(core.bus(), QuatRiekf, config.estimator.clone())?.attach(core.bus())?;
    AttitudeEstimator::new(core.bus(), Mekf, config.estimator.clone())?.attach(core.bus())?;

    core.spawn(simulator);
    log::info!(
        "running scenario with seed {} until t = {}",
        config.simulator.seed,
        config.t_final
    );
    core.run(config.t_final)?;
    log::info!("scenario finished with {} messages", logger.len());

    Ok(logger.log())
}

/// Run independent scenarios in parallel, one [`Core`] per scenario.
///
/// The results are in the order of `configs`; a failing scenario does not
/// affect the others.
#[must_use]
pub fn run_batch(configs: &[ScenarioConfig]) -> Vec<Result<Log>> {
    configs.par_iter().map(run_scenario).collect()
}
