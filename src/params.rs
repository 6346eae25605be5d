//! Configuration of the simulator, the estimators and a scenario, plus the
//! runtime parameters that can be changed over the `params` topic.

use std::{cell::Cell, f64::consts::PI, rc::Rc};

use nalgebra::Vector3;

use crate::error::{Error, Result};
use crate::msgs::Params;

/// Name of the runtime parameter holding the gyro measurement noise.
pub const SIM_W_GYRO: &str = "sim/w_gyro";

/// Name of the runtime parameter holding the simulator step period.
pub const SIM_DT: &str = "sim/dt";

/// A runtime parameter of type `f32`, shared between the component that
/// reads it and the `params` subscription that updates it.
#[derive(Debug, Clone)]
pub struct Param {
    name: &'static str,
    value: Rc<Cell<f32>>,
    valid: fn(f32) -> bool,
}

impl Param {
    /// Create a parameter accepting every finite value.
    #[must_use]
    pub fn new(name: &'static str, value: f32) -> Self {
        Self::with_check(name, value, f32::is_finite)
    }

    /// Create a parameter that only accepts values for which `valid` holds.
    #[must_use]
    pub fn with_check(name: &'static str, value: f32, valid: fn(f32) -> bool) -> Self {
        Self {
            name,
            value: Rc::new(Cell::new(value)),
            valid,
        }
    }

    /// The current value.
    #[must_use]
    pub fn get(&self) -> f32 {
        self.value.get()
    }

    /// Apply the matching entry of a parameter update, if any.
    ///
    /// Returns `true` if the value changed. Values rejected by the
    /// parameter's check are ignored with a warning.
    #[allow(clippy::cast_possible_truncation)]
    pub fn update(&self, msg: &Params) -> bool {
        let Some(&value) = msg.values.get(self.name) else {
            return false;
        };
        let value = value as f32;
        if !(self.valid)(value) {
            log::warn!("ignoring invalid value {value} for `{}`", self.name);
            return false;
        }
        self.value.set(value);
        log::debug!("`{}` set to {value}", self.name);
        true
    }
}

/// Body rate profile driven through the simulated vehicle.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RateProfile {
    /// Each axis follows $a (1 + \sin(2 \pi f_i t + \phi_i))$.
    Sinusoidal {
        /// Amplitude $a$ in rad/s.
        amplitude: f64,
        /// Per-axis frequencies $f_i$ in Hz.
        frequencies: Vector3<f64>,
        /// Per-axis phases $\phi_i$ in rad.
        phases: Vector3<f64>,
    },
    /// A constant body rate in rad/s.
    Constant(Vector3<f64>),
}

impl RateProfile {
    /// The true body rate at time `t`.
    #[must_use]
    pub fn rate(&self, t: f64) -> Vector3<f64> {
        match self {
            Self::Sinusoidal {
                amplitude,
                frequencies,
                phases,
            } => Vector3::from_fn(|i, _| {
                amplitude * (1.0 + (2.0 * PI * frequencies[i] * t + phases[i]).sin())
            }),
            Self::Constant(omega) => *omega,
        }
    }
}

impl Default for RateProfile {
    fn default() -> Self {
        Self::Sinusoidal {
            amplitude: 10.0,
            frequencies: Vector3::new(0.1, 0.2, 0.3),
            phases: Vector3::new(1.0, 2.0, 3.0),
        }
    }
}

/// Parameters of the truth [`Simulator`](crate::simulator::Simulator).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulatorParameters {
    /// Step period in seconds (`sim/dt`).
    pub dt: f32,
    /// Standard deviation of the noise added to the published gyro
    /// measurement, in rad/s (`sim/w_gyro`).
    pub w_gyro: f32,
    /// Standard deviation of the process noise driving the true kinematics:
    /// additive gyro noise and bias random walk.
    pub process_noise_std: f64,
    /// Seed of the noise generator.
    pub seed: u64,
    /// True body rate.
    pub profile: RateProfile,
}

impl Default for SimulatorParameters {
    fn default() -> Self {
        Self {
            dt: 1.0 / 200.0,
            w_gyro: 0.1,
            process_noise_std: 1e-3,
            seed: 0,
            profile: RateProfile::default(),
        }
    }
}

impl SimulatorParameters {
    /// Parameters with every noise source switched off.
    #[must_use]
    pub fn noiseless() -> Self {
        Self {
            w_gyro: 0.0,
            process_noise_std: 0.0,
            ..Self::default()
        }
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !valid_dt(self.dt) {
            return Err(Error::InvalidParameter {
                name: SIM_DT,
                value: f64::from(self.dt),
            });
        }
        if !valid_std(self.w_gyro) {
            return Err(Error::InvalidParameter {
                name: SIM_W_GYRO,
                value: f64::from(self.w_gyro),
            });
        }
        if !(self.process_noise_std >= 0.0 && self.process_noise_std.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "process_noise_std",
                value: self.process_noise_std,
            });
        }
        Ok(())
    }
}

pub(crate) fn valid_dt(dt: f32) -> bool {
    dt > 0.0 && dt.is_finite()
}

pub(crate) fn valid_std(std: f32) -> bool {
    std >= 0.0 && std.is_finite()
}

/// Parameters of an [`AttitudeEstimator`](crate::estimator::AttitudeEstimator).
///
/// These are fixed when the estimator is built and are not runtime
/// parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EstimatorParameters {
    /// Assumed gyro white noise standard deviation, in rad/s.
    pub std_gyro: f64,
    /// Assumed gyro bias random walk spectral density, in rad/s/√s.
    pub sn_gyro_rw: f64,
    /// Step used in place of a non-positive measurement interval, in
    /// seconds.
    pub default_dt: f64,
}

impl Default for EstimatorParameters {
    fn default() -> Self {
        Self {
            std_gyro: 1e-2,
            sn_gyro_rw: 1e-2,
            default_dt: 1.0 / 200.0,
        }
    }
}

impl EstimatorParameters {
    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("std_gyro", self.std_gyro), ("sn_gyro_rw", self.sn_gyro_rw)] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(Error::InvalidParameter { name, value });
            }
        }
        if !(self.default_dt > 0.0 && self.default_dt.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "default_dt",
                value: self.default_dt,
            });
        }
        Ok(())
    }
}

/// Everything needed to reproduce one simulation run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScenarioConfig {
    /// Final virtual time in seconds; the run stops when the clock gets there.
    pub t_final: f64,
    /// Truth simulator configuration.
    pub simulator: SimulatorParameters,
    /// Configuration shared by the three estimators.
    pub estimator: EstimatorParameters,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            t_final: 10.0,
            simulator: SimulatorParameters::default(),
            estimator: EstimatorParameters::default(),
        }
    }
}

impl ScenarioConfig {
    /// The same scenario with a different noise seed.
    #[must_use]
    pub fn with_seed(&self, seed: u64) -> Self {
        let mut config = self.clone();
        config.simulator.seed = seed;
        config
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !(self.t_final > 0.0 && self.t_final.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "t_final",
                value: self.t_final,
            });
        }
        self.simulator.validate()?;
        self.estimator.validate()
    }
}
