//! Truth simulation of the vehicle attitude and gyro bias.

use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::bus::{Bus, Publisher};
use crate::equations::{AttitudeEquations, MrpRiekf, State};
use crate::error::Result;
use crate::msgs::{Imu, Params, VehicleState};
use crate::params::{
    valid_dt, valid_std, Param, RateProfile, SimulatorParameters, SIM_DT, SIM_W_GYRO,
};
use crate::scheduler::{Context, Process, Yield};

/// Topic carrying the true vehicle state.
pub const SIM_STATE_TOPIC: &str = "sim_state";

/// Topic carrying the noisy gyro measurements.
pub const IMU_TOPIC: &str = "imu";

/// Topic carrying runtime parameter updates.
pub const PARAMS_TOPIC: &str = "params";

/// A scheduled process advancing the true MRP state under a body rate
/// profile and stochastic process noise.
///
/// Every cycle publishes the truth on [`SIM_STATE_TOPIC`] and a corrupted
/// gyro sample on [`IMU_TOPIC`], then sleeps for `sim/dt`.
pub struct Simulator {
    equations: MrpRiekf,
    x: State,
    rng: ChaCha8Rng,
    profile: RateProfile,
    process_noise_std: f64,
    w_gyro: Param,
    dt: Param,
    pub_state: Publisher<VehicleState>,
    pub_imu: Publisher<Imu>,
}

impl Simulator {
    /// Advertise the simulator topics on `bus` and subscribe to parameter
    /// updates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`](crate::Error::SchemaMismatch) if one
    /// of the topics is already bound to another schema.
    pub fn new(bus: &Bus, params: &SimulatorParameters) -> Result<Self> {
        let equations = MrpRiekf;
        let w_gyro = Param::with_check(SIM_W_GYRO, params.w_gyro, valid_std);
        let dt = Param::with_check(SIM_DT, params.dt, valid_dt);

        let handles = [w_gyro.clone(), dt.clone()];
        bus.subscribe(PARAMS_TOPIC, move |_, msg: &Params| {
            for param in &handles {
                param.update(msg);
            }
            Ok(())
        })?;

        Ok(Self {
            x: equations.constants().0,
            equations,
            rng: ChaCha8Rng::seed_from_u64(params.seed),
            profile: params.profile.clone(),
            process_noise_std: params.process_noise_std,
            w_gyro,
            dt,
            pub_state: bus.advertise(SIM_STATE_TOPIC)?,
            pub_imu: bus.advertise(IMU_TOPIC)?,
        })
    }

    /// The current true state.
    #[must_use]
    pub fn state(&self) -> &State {
        &self.x
    }

    /// Current value of `sim/w_gyro`.
    #[must_use]
    pub fn w_gyro(&self) -> f32 {
        self.w_gyro.get()
    }

    /// Current value of `sim/dt`.
    #[must_use]
    pub fn dt(&self) -> f32 {
        self.dt.get()
    }

    fn noise(&mut self, std: f64) -> Vector3<f64> {
        // always draw so the stream does not depend on the noise levels
        let n = Vector3::from_fn(|_, _| self.rng.sample::<f64, _>(StandardNormal));
        n * std
    }
}

impl Process for Simulator {
    fn resume(&mut self, ctx: &Context<'_>) -> Result<Yield> {
        let t = ctx.now;
        let dt = f64::from(self.dt.get());
        let omega = self.profile.rate(t);

        let w_gyro = self.noise(self.process_noise_std);
        let w_bias = self.noise(self.process_noise_std);
        self.x = self
            .equations
            .simulate(t, &self.x, &omega, &w_gyro, &w_bias, dt);

        let (q, b) = self.equations.get_state(&self.x);
        ctx.bus.publish(
            &self.pub_state,
            &VehicleState {
                time: t,
                q,
                b,
                omega,
            },
        )?;

        let gyro = omega + self.noise(f64::from(self.w_gyro.get()));
        ctx.bus.publish(&self.pub_imu, &Imu { time: t, gyro })?;

        Ok(Yield::Timeout(dt))
    }
}
