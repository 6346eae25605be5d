//! Propagation-only attitude estimator driven by gyro samples.

use std::{cell::RefCell, rc::Rc, time::Instant};

use crate::bus::{Bus, Publisher};
use crate::equations::{AttitudeEquations, CovarianceFactor, State, N_X};
use crate::error::{Error, Result};
use crate::msgs::{EstimatorStatus, Imu, VehicleState};
use crate::params::EstimatorParameters;
use crate::simulator::IMU_TOPIC;

/// Topic on which the estimator named `name` publishes its attitude.
#[must_use]
pub fn state_topic(name: &str) -> String {
    format!("{name}_state")
}

/// Topic on which the estimator named `name` publishes its status.
#[must_use]
pub fn status_topic(name: &str) -> String {
    format!("{name}_status")
}

/// Dead-reckoning estimator for one parametrization.
///
/// On every [`Imu`] message the state mean and the square-root covariance
/// factor are propagated with [`AttitudeEquations::predict`]; there is no
/// measurement update. The result is published as a [`VehicleState`] on
/// `<name>_state` and as an [`EstimatorStatus`] on `<name>_status`, where
/// `name` is [`AttitudeEquations::NAME`].
pub struct AttitudeEstimator<E> {
    equations: E,
    params: EstimatorParameters,
    x: State,
    w: CovarianceFactor,
    t_last_imu: f64,
    last_dt: Option<f64>,
    pub_state: Publisher<VehicleState>,
    pub_status: Publisher<EstimatorStatus>,
}

impl<E: AttitudeEquations + 'static> AttitudeEstimator<E> {
    /// Advertise the output topics of the estimator on `bus`.
    ///
    /// The estimator does not receive any data until it is
    /// [attached](Self::attach).
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if an output topic is already bound
    /// to another schema.
    pub fn new(bus: &Bus, equations: E, params: EstimatorParameters) -> Result<Self> {
        let (x, w) = equations.constants();
        Ok(Self {
            pub_state: bus.advertise(&state_topic(E::NAME))?,
            pub_status: bus.advertise(&status_topic(E::NAME))?,
            equations,
            params,
            x,
            w,
            t_last_imu: 0.0,
            last_dt: None,
        })
    }

    /// Subscribe the estimator to the `imu` topic.
    ///
    /// The returned handle gives access to the estimator once the run is
    /// over.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if `imu` is bound to another schema.
    pub fn attach(self, bus: &Bus) -> Result<Rc<RefCell<Self>>> {
        let estimator = Rc::new(RefCell::new(self));
        let handle = Rc::clone(&estimator);
        bus.subscribe(IMU_TOPIC, move |bus, msg: &Imu| {
            handle.borrow_mut().handle_imu(bus, msg)
        })?;
        log::debug!("estimator `{}` attached", E::NAME);
        Ok(estimator)
    }
}

impl<E: AttitudeEquations> AttitudeEstimator<E> {
    /// Name of the estimator, also the prefix of its topics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        E::NAME
    }

    /// Current state mean.
    #[must_use]
    pub fn state(&self) -> &State {
        &self.x
    }

    /// Current lower-triangular covariance factor.
    #[must_use]
    pub fn factor(&self) -> &CovarianceFactor {
        &self.w
    }

    /// Step used by the most recent prediction, if any.
    #[must_use]
    pub fn last_step(&self) -> Option<f64> {
        self.last_dt
    }

    /// Propagate the filter with one gyro sample and publish the result.
    ///
    /// A non-positive interval since the previous sample is replaced by
    /// [`EstimatorParameters::default_dt`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NonFinite`] if the propagated state or factor is not
    /// finite. The offending messages are still published first. Errors
    /// raised by downstream subscribers are passed through.
    #[allow(clippy::cast_possible_truncation)]
    pub fn handle_imu(&mut self, bus: &Bus, msg: &Imu) -> Result<()> {
        let t = msg.time;
        let mut dt = t - self.t_last_imu;
        self.t_last_imu = t;
        if dt <= 0.0 {
            log::debug!(
                "`{}`: non-positive step {dt} at t = {t}, using {}",
                E::NAME,
                self.params.default_dt
            );
            dt = self.params.default_dt;
        }
        self.last_dt = Some(dt);

        let start = Instant::now();
        let (x, w) = self.equations.predict(
            t,
            &self.x,
            &self.w,
            &msg.gyro,
            self.params.std_gyro,
            self.params.sn_gyro_rw,
            dt,
        );
        let (q, b) = self.equations.get_state(&x);
        let elapsed = start.elapsed().as_secs_f64();
        self.x = x;
        self.w = w;

        bus.publish(
            &self.pub_state,
            &VehicleState {
                time: t,
                q,
                b,
                omega: msg.gyro,
            },
        )?;
        bus.publish(
            &self.pub_status,
            &EstimatorStatus {
                time: t,
                n_x: N_X as u32,
                x: self.x.iter().copied().collect(),
                w: self.w.diagonal().iter().copied().collect(),
                elapsed,
            },
        )?;

        let finite = |v: &f64| v.is_finite();
        if !(self.x.iter().all(finite) && self.w.iter().all(finite)) {
            log::error!("`{}` diverged at t = {t}", E::NAME);
            return Err(Error::NonFinite {
                name: E::NAME.to_owned(),
                time: t,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equations::{Mekf, MrpRiekf, QuatRiekf};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn imu(time: f64, gyro: Vector3<f64>) -> Imu {
        Imu { time, gyro }
    }

    fn setup<E: AttitudeEquations + 'static>(
        equations: E,
    ) -> (Bus, Publisher<Imu>, Rc<RefCell<AttitudeEstimator<E>>>) {
        let bus = Bus::new();
        let publisher = bus.advertise::<Imu>(IMU_TOPIC).unwrap();
        let estimator = AttitudeEstimator::new(&bus, equations, EstimatorParameters::default())
            .unwrap()
            .attach(&bus)
            .unwrap();
        (bus, publisher, estimator)
    }

    #[test]
    fn topics_are_named_after_the_parametrization() {
        let (bus, _, _) = setup(MrpRiekf);
        AttitudeEstimator::new(&bus, QuatRiekf, EstimatorParameters::default()).unwrap();
        AttitudeEstimator::new(&bus, Mekf, EstimatorParameters::default()).unwrap();

        assert_eq!(
            bus.topics(),
            vec![
                "imu",
                "mekf_state",
                "mekf_status",
                "mrp_state",
                "mrp_status",
                "quat_state",
                "quat_status"
            ]
        );
    }

    #[test]
    fn publishes_state_and_status_per_sample() {
        let (bus, publisher, _) = setup(QuatRiekf);
        let statuses = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&statuses);
        bus.subscribe("quat_status", move |_, msg: &EstimatorStatus| {
            sink.borrow_mut().push(msg.clone());
            Ok(())
        })
        .unwrap();

        let gyro = Vector3::new(0.1, -0.2, 0.3);
        bus.publish(&publisher, &imu(0.0, gyro)).unwrap();
        bus.publish(&publisher, &imu(0.005, gyro)).unwrap();

        let statuses = statuses.borrow();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[1].n_x, 7);
        assert_eq!(statuses[1].x.len(), 7);
        assert_eq!(statuses[1].w.len(), 6);
        assert!(statuses[1].elapsed >= 0.0);
        assert!(statuses[1].w.iter().all(|w| *w > 1e-3));
    }

    #[test]
    fn degenerate_step_falls_back_to_default() {
        let (bus, publisher, estimator) = setup(Mekf);
        let gyro = Vector3::new(0.0, 0.0, 1.0);

        bus.publish(&publisher, &imu(0.0, gyro)).unwrap();
        assert_eq!(estimator.borrow().last_step(), Some(1.0 / 200.0));

        bus.publish(&publisher, &imu(0.01, gyro)).unwrap();
        assert_relative_eq!(estimator.borrow().last_step().unwrap(), 0.01);

        // duplicate, then out of order
        bus.publish(&publisher, &imu(0.01, gyro)).unwrap();
        assert_eq!(estimator.borrow().last_step(), Some(1.0 / 200.0));
        bus.publish(&publisher, &imu(0.005, gyro)).unwrap();
        assert_eq!(estimator.borrow().last_step(), Some(1.0 / 200.0));

        let estimator = estimator.borrow();
        assert!(estimator.state().iter().all(|v| v.is_finite()));
        assert!(estimator.factor().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn non_finite_state_is_published_then_reported() {
        let (bus, publisher, _) = setup(MrpRiekf);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.subscribe("mrp_state", move |_, msg: &VehicleState| {
            sink.borrow_mut().push(msg.q);
            Ok(())
        })
        .unwrap();

        let err = bus
            .publish(&publisher, &imu(0.0, Vector3::new(f64::NAN, 0.0, 0.0)))
            .unwrap_err();

        assert!(matches!(err, Error::NonFinite { ref name, .. } if name == "mrp"));
        assert_eq!(seen.borrow().len(), 1);
        assert!(seen.borrow()[0].coords.iter().any(|v| v.is_nan()));
    }
}
