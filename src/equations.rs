//! Filter equations for the three attitude parametrizations.
//!
//! Every parametrization shares the same 7-element state layout, a 4-element
//! rotation block followed by the 3-element gyro bias, and the same 6-element
//! error state, 3 rotation errors followed by 3 bias errors. They differ in
//! how the rotation block evolves, how it is projected back onto its
//! manifold after a step, and in the linearized error dynamics $F$:
//!
//! | filter | rotation block | $F$ |
//! |---|---|---|
//! | [`MrpRiekf`] | MRP + shadow flag | $\begin{bmatrix} 0 & -R(x) \\\\ 0 & 0 \end{bmatrix}$ |
//! | [`QuatRiekf`] | unit quaternion | $\begin{bmatrix} 0 & -R(x) \\\\ 0 & 0 \end{bmatrix}$ |
//! | [`Mekf`] | unit quaternion | $\begin{bmatrix} -[\omega - b]_\times & -I \\\\ 0 & 0 \end{bmatrix}$ |
//!
//! The right-invariant filters have rotation-error dynamics that do not
//! depend on the angular rate, while the multiplicative filter injects its
//! error through the exponential map and picks up a rate-dependent term.

use nalgebra::{Matrix3, Matrix6, Quaternion, SVector, Vector3, Vector4, Vector6};

use crate::integrate::{rk4, sqrt_covariance_derivative};
use crate::rotation::{
    dcm_from_mrp, dcm_from_quaternion, mrp_derivative, quaternion_derivative,
    quaternion_from_mrp, quaternion_from_vector, quaternion_to_vector, shadow_if_required,
    so3_exp, Mrp,
};

/// Dimension of the filter state.
pub const N_X: usize = 7;

/// Dimension of the error state.
pub const N_E: usize = 6;

/// Diagonal of the initial covariance factor.
pub const INITIAL_FACTOR: f64 = 1e-3;

/// Filter state: rotation block (4) followed by gyro bias (3).
pub type State = SVector<f64, N_X>;

/// Lower-triangular square root of the error covariance, $P = W W^T$.
pub type CovarianceFactor = Matrix6<f64>;

/// Continuous-time process noise covariance
/// $Q = \mathrm{diag}(\sigma_g^2 I_3, \sigma_{rw}^2 I_3)$ with
/// $\sigma_{rw} = \mathrm{sn}_{rw} / \sqrt{dt}$.
#[must_use]
pub fn process_noise(std_gyro: f64, sn_gyro_rw: f64, dt: f64) -> Matrix6<f64> {
    let std_gyro_rw = sn_gyro_rw / dt.sqrt();
    let g = std_gyro.powi(2);
    let rw = std_gyro_rw.powi(2);
    Matrix6::from_diagonal(&Vector6::new(g, g, g, rw, rw, rw))
}

fn rotation_block(x: &State) -> Vector4<f64> {
    x.fixed_rows::<4>(0).into_owned()
}

fn bias_block(x: &State) -> Vector3<f64> {
    x.fixed_rows::<3>(4).into_owned()
}

fn assemble(rotation: &Vector4<f64>, bias: &Vector3<f64>) -> State {
    let mut x = State::zeros();
    x.fixed_rows_mut::<4>(0).copy_from(rotation);
    x.fixed_rows_mut::<3>(4).copy_from(bias);
    x
}

fn normalize_quaternion_block(x: State) -> State {
    let q = rotation_block(&x);
    assemble(&(q / q.norm()), &bias_block(&x))
}

fn block_jacobian(rotation_rotation: &Matrix3<f64>, rotation_bias: &Matrix3<f64>) -> Matrix6<f64> {
    let mut f = Matrix6::zeros();
    f.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation_rotation);
    f.fixed_view_mut::<3, 3>(0, 3).copy_from(rotation_bias);
    f
}

/// Closed-form predict and simulate functions of one attitude
/// parametrization.
///
/// Implementors describe the rotation kinematics and the error model; the
/// provided methods assemble them into the RK4 state step, the square-root
/// covariance step and the reporting helpers.
///
/// None of these functions fail: non-finite inputs propagate to non-finite
/// outputs and are left for the caller to detect.
pub trait AttitudeEquations {
    /// Short name used for topic names and reporting.
    const NAME: &'static str;

    /// Initial state: identity rotation and zero bias.
    fn initial_state(&self) -> State;

    /// Time derivative of the rotation block under the body rate `omega`.
    fn rotation_derivative(&self, rotation: &Vector4<f64>, omega: &Vector3<f64>) -> Vector4<f64>;

    /// Map a freshly integrated state back onto the rotation manifold.
    fn project(&self, x: State) -> State;

    /// Nonlinear error dynamics $\dot\eta = f(\omega, \eta, x, w_b)$.
    fn error_dynamics(
        &self,
        x: &State,
        omega: &Vector3<f64>,
        eta: &Vector6<f64>,
        w_bias: &Vector3<f64>,
    ) -> Vector6<f64>;

    /// Jacobian of [`Self::error_dynamics`] with respect to $\eta$ at
    /// $\eta = 0$.
    fn error_jacobian(&self, x: &State, omega: &Vector3<f64>) -> Matrix6<f64>;

    /// The attitude quaternion held by a state.
    fn quaternion(&self, x: &State) -> Quaternion<f64>;

    /// Initial state and covariance factor $W_0 = 10^{-3} I$.
    fn constants(&self) -> (State, CovarianceFactor) {
        (
            self.initial_state(),
            CovarianceFactor::identity() * INITIAL_FACTOR,
        )
    }

    /// State derivative with additive gyro noise `w_gyro` and bias random
    /// walk noise `w_bias`.
    fn state_derivative(
        &self,
        x: &State,
        omega: &Vector3<f64>,
        w_gyro: &Vector3<f64>,
        w_bias: &Vector3<f64>,
    ) -> State {
        let rate = omega - bias_block(x) + w_gyro;
        assemble(&self.rotation_derivative(&rotation_block(x), &rate), w_bias)
    }

    /// Advance the true stochastic kinematics by one RK4 step.
    fn simulate(
        &self,
        t: f64,
        x: &State,
        omega: &Vector3<f64>,
        w_gyro: &Vector3<f64>,
        w_bias: &Vector3<f64>,
        dt: f64,
    ) -> State {
        let x1 = rk4(
            |_, x| self.state_derivative(x, omega, w_gyro, w_bias),
            t,
            *x,
            dt,
        );
        self.project(x1)
    }

    /// Propagate the state mean and the covariance factor by one RK4 step.
    ///
    /// The Jacobian $F$ and the noise covariance $Q$ are evaluated once at
    /// the start of the step.
    #[allow(clippy::too_many_arguments)]
    fn predict(
        &self,
        t: f64,
        x: &State,
        w: &CovarianceFactor,
        omega: &Vector3<f64>,
        std_gyro: f64,
        sn_gyro_rw: f64,
        dt: f64,
    ) -> (State, CovarianceFactor) {
        let zero = Vector3::zeros();
        let x1 = rk4(
            |_, x| self.state_derivative(x, omega, &zero, &zero),
            t,
            *x,
            dt,
        );

        let f = self.error_jacobian(x, omega);
        let q = process_noise(std_gyro, sn_gyro_rw, dt);
        let w1 = rk4(|_, w| sqrt_covariance_derivative(w, &f, &q), t, *w, dt);

        (self.project(x1), w1)
    }

    /// Attitude quaternion and gyro bias estimate of a state.
    fn get_state(&self, x: &State) -> (Quaternion<f64>, Vector3<f64>) {
        (self.quaternion(x), bias_block(x))
    }
}

/// Right-invariant filter on modified Rodrigues parameters.
///
/// The rotation block is `(r1, r2, r3, s)` with `s` the shadow flag; every
/// step ends with a switch to the shadow set if $|r| > 1$.
#[derive(Debug, Clone, Copy, Default)]
pub struct MrpRiekf;

impl AttitudeEquations for MrpRiekf {
    const NAME: &'static str = "mrp";

    fn initial_state(&self) -> State {
        assemble(&Mrp::identity().to_vector(), &Vector3::zeros())
    }

    fn rotation_derivative(&self, rotation: &Vector4<f64>, omega: &Vector3<f64>) -> Vector4<f64> {
        let r_dot = mrp_derivative(&Mrp::from_vector(rotation), omega);
        Vector4::new(r_dot.x, r_dot.y, r_dot.z, 0.0)
    }

    fn project(&self, x: State) -> State {
        let r = shadow_if_required(&Mrp::from_vector(&rotation_block(&x)));
        assemble(&r.to_vector(), &bias_block(&x))
    }

    fn error_dynamics(
        &self,
        x: &State,
        _omega: &Vector3<f64>,
        eta: &Vector6<f64>,
        w_bias: &Vector3<f64>,
    ) -> Vector6<f64> {
        let r = Mrp::from_vector(&rotation_block(x));
        let eta_r_dot = -dcm_from_mrp(&r) * eta.fixed_rows::<3>(3);
        Vector6::new(
            eta_r_dot.x,
            eta_r_dot.y,
            eta_r_dot.z,
            w_bias.x,
            w_bias.y,
            w_bias.z,
        )
    }

    fn error_jacobian(&self, x: &State, _omega: &Vector3<f64>) -> Matrix6<f64> {
        let r = Mrp::from_vector(&rotation_block(x));
        block_jacobian(&Matrix3::zeros(), &-dcm_from_mrp(&r))
    }

    fn quaternion(&self, x: &State) -> Quaternion<f64> {
        quaternion_from_mrp(&Mrp::from_vector(&rotation_block(x)))
    }
}

/// Right-invariant filter on unit quaternions.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuatRiekf;

impl AttitudeEquations for QuatRiekf {
    const NAME: &'static str = "quat";

    fn initial_state(&self) -> State {
        State::from_column_slice(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
    }

    fn rotation_derivative(&self, rotation: &Vector4<f64>, omega: &Vector3<f64>) -> Vector4<f64> {
        quaternion_to_vector(&quaternion_derivative(&quaternion_from_vector(rotation), omega))
    }

    fn project(&self, x: State) -> State {
        normalize_quaternion_block(x)
    }

    fn error_dynamics(
        &self,
        x: &State,
        _omega: &Vector3<f64>,
        eta: &Vector6<f64>,
        w_bias: &Vector3<f64>,
    ) -> Vector6<f64> {
        let eta_r_dot = -dcm_from_quaternion(&self.quaternion(x)) * eta.fixed_rows::<3>(3);
        Vector6::new(
            eta_r_dot.x,
            eta_r_dot.y,
            eta_r_dot.z,
            w_bias.x,
            w_bias.y,
            w_bias.z,
        )
    }

    fn error_jacobian(&self, x: &State, _omega: &Vector3<f64>) -> Matrix6<f64> {
        block_jacobian(
            &Matrix3::zeros(),
            &-dcm_from_quaternion(&self.quaternion(x)),
        )
    }

    fn quaternion(&self, x: &State) -> Quaternion<f64> {
        quaternion_from_vector(&rotation_block(x))
    }
}

/// Multiplicative extended Kalman filter on unit quaternions.
///
/// Shares the state propagation of [`QuatRiekf`]; only the error model
/// differs. The rotation error is injected as $\exp(\eta_r)$, giving
/// $\dot\eta_r = -(I - \exp(\eta_r))(\omega - b) - \exp(\eta_r)\eta_b$.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mekf;

impl AttitudeEquations for Mekf {
    const NAME: &'static str = "mekf";

    fn initial_state(&self) -> State {
        QuatRiekf.initial_state()
    }

    fn rotation_derivative(&self, rotation: &Vector4<f64>, omega: &Vector3<f64>) -> Vector4<f64> {
        QuatRiekf.rotation_derivative(rotation, omega)
    }

    fn project(&self, x: State) -> State {
        normalize_quaternion_block(x)
    }

    fn error_dynamics(
        &self,
        x: &State,
        omega: &Vector3<f64>,
        eta: &Vector6<f64>,
        w_bias: &Vector3<f64>,
    ) -> Vector6<f64> {
        let rate = omega - bias_block(x);
        let eta_exp = so3_exp(&eta.fixed_rows::<3>(0).into_owned());
        let eta_r_dot = -(Matrix3::identity() - eta_exp) * rate - eta_exp * eta.fixed_rows::<3>(3);
        Vector6::new(
            eta_r_dot.x,
            eta_r_dot.y,
            eta_r_dot.z,
            w_bias.x,
            w_bias.y,
            w_bias.z,
        )
    }

    fn error_jacobian(&self, x: &State, omega: &Vector3<f64>) -> Matrix6<f64> {
        let rate = omega - bias_block(x);
        block_jacobian(&-rate.cross_matrix(), &-Matrix3::identity())
    }

    fn quaternion(&self, x: &State) -> Quaternion<f64> {
        QuatRiekf.quaternion(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::f64::consts::PI;

    const DT: f64 = 0.005;

    fn numeric_jacobian<E: AttitudeEquations>(
        eqs: &E,
        x: &State,
        omega: &Vector3<f64>,
    ) -> Matrix6<f64> {
        let h = 1e-7;
        let zero = Vector3::zeros();
        let mut jac = Matrix6::zeros();
        for j in 0..N_E {
            let mut plus = Vector6::zeros();
            plus[j] = h;
            let minus = -plus;
            let column = (eqs.error_dynamics(x, omega, &plus, &zero)
                - eqs.error_dynamics(x, omega, &minus, &zero))
                / (2.0 * h);
            jac.set_column(j, &column);
        }
        jac
    }

    fn rotated_state<E: AttitudeEquations>(eqs: &E) -> State {
        let omega = Vector3::new(0.3, -0.8, 1.1);
        let mut x = eqs.initial_state();
        x[4] = 0.01;
        x[5] = -0.02;
        x[6] = 0.005;
        let zero = Vector3::zeros();
        for _ in 0..100 {
            x = eqs.simulate(0.0, &x, &omega, &zero, &zero, DT);
        }
        x
    }

    fn check_jacobian<E: AttitudeEquations>(eqs: &E) {
        let x = rotated_state(eqs);
        let omega = Vector3::new(2.0, -1.0, 0.5);
        assert_relative_eq!(
            eqs.error_jacobian(&x, &omega),
            numeric_jacobian(eqs, &x, &omega),
            epsilon = 1e-6
        );
    }

    #[test]
    fn closed_form_jacobians_match_error_dynamics() {
        check_jacobian(&MrpRiekf);
        check_jacobian(&QuatRiekf);
        check_jacobian(&Mekf);
    }

    fn check_no_drift_at_rest<E: AttitudeEquations>(eqs: &E) {
        let (mut x, mut w) = eqs.constants();
        let zero = Vector3::zeros();
        for k in 0..200 {
            (x, w) = eqs.predict(f64::from(k) * DT, &x, &w, &zero, 1e-2, 1e-2, DT);
        }
        let (q, b) = eqs.get_state(&x);
        assert_relative_eq!(
            quaternion_to_vector(&q),
            Vector4::new(1.0, 0.0, 0.0, 0.0),
            epsilon = 1e-9
        );
        assert_eq!(b, Vector3::zeros());
    }

    #[test]
    fn identity_start_does_not_drift_without_excitation() {
        check_no_drift_at_rest(&MrpRiekf);
        check_no_drift_at_rest(&QuatRiekf);
        check_no_drift_at_rest(&Mekf);
    }

    fn half_turn_about_z<E: AttitudeEquations>(eqs: &E) -> Quaternion<f64> {
        let (mut x, mut w) = eqs.constants();
        let omega = Vector3::new(0.0, 0.0, PI);
        for k in 0..200 {
            (x, w) = eqs.predict(f64::from(k) * DT, &x, &w, &omega, 1e-2, 1e-2, DT);
        }
        eqs.get_state(&x).0
    }

    #[test]
    fn constant_rate_reaches_half_turn() {
        let expected = Vector4::new(0.0, 0.0, 0.0, 1.0);
        let mrp = quaternion_to_vector(&half_turn_about_z(&MrpRiekf));
        let quat = quaternion_to_vector(&half_turn_about_z(&QuatRiekf));
        let mekf = quaternion_to_vector(&half_turn_about_z(&Mekf));

        assert_relative_eq!(mrp, expected, epsilon = 1e-6);
        assert_relative_eq!(quat, expected, epsilon = 1e-6);
        assert_relative_eq!(mrp, quat, epsilon = 1e-6);
        assert_relative_eq!(mekf, quat, epsilon = 1e-12);
    }

    #[test]
    fn mrp_stays_inside_unit_ball() {
        let eqs = MrpRiekf;
        let (mut x, mut w) = eqs.constants();
        let omega = Vector3::new(3.0, -2.0, 4.0);
        let mut switched = false;
        for k in 0..1000 {
            (x, w) = eqs.predict(f64::from(k) * DT, &x, &w, &omega, 1e-2, 1e-2, DT);
            assert!(x.fixed_rows::<3>(0).norm() <= 1.0);
            switched |= x[3].abs() > 0.5;
        }
        assert!(switched, "a 5 s spin at 5.4 rad/s must cross the shadow boundary");
    }

    #[test]
    fn rk4_state_step_converges_with_fourth_order() {
        let eqs = QuatRiekf;
        let omega = Vector3::new(1.0, -2.0, 3.0);
        let zero = Vector3::zeros();
        let exact = nalgebra::UnitQuaternion::from_scaled_axis(omega);

        let error = |dt: f64, steps: u32| {
            let mut x = eqs.initial_state();
            for k in 0..steps {
                x = eqs.simulate(f64::from(k) * dt, &x, &omega, &zero, &zero, dt);
            }
            (quaternion_to_vector(&eqs.quaternion(&x)) - quaternion_to_vector(exact.quaternion()))
                .norm()
        };

        let ratio = error(0.05, 20) / error(0.025, 40);
        assert!((14.0..18.0).contains(&ratio), "ratio {ratio}");
    }

    fn check_factor_shape<E: AttitudeEquations>(eqs: &E) {
        let (mut x, mut w) = eqs.constants();
        for k in 0..2000 {
            let t = f64::from(k) * DT;
            let omega = Vector3::new(
                10.0 * (1.0 + (2.0 * PI * 0.1 * t + 1.0).sin()),
                10.0 * (1.0 + (2.0 * PI * 0.2 * t + 2.0).sin()),
                10.0 * (1.0 + (2.0 * PI * 0.3 * t + 3.0).sin()),
            );
            (x, w) = eqs.predict(t, &x, &w, &omega, 1e-2, 1e-2, DT);
            for i in 0..N_E {
                assert!(w[(i, i)] >= 0.0, "{} diagonal {i} at step {k}", E::NAME);
                for j in (i + 1)..N_E {
                    assert!(w[(i, j)].abs() <= 0.0, "{} upper entry ({i}, {j})", E::NAME);
                }
            }
            let q = eqs.quaternion(&x);
            assert!((q.norm() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn covariance_factor_stays_lower_triangular() {
        check_factor_shape(&MrpRiekf);
        check_factor_shape(&QuatRiekf);
        check_factor_shape(&Mekf);
    }

    #[test]
    fn simulate_integrates_bias_random_walk() {
        let eqs = QuatRiekf;
        let x0 = eqs.initial_state();
        let w_bias = Vector3::new(1e-3, -2e-3, 3e-3);
        let x1 = eqs.simulate(0.0, &x0, &Vector3::zeros(), &Vector3::zeros(), &w_bias, 0.5);
        assert_relative_eq!(eqs.get_state(&x1).1, w_bias * 0.5, epsilon = 1e-15);
    }

    #[test]
    fn process_noise_scales_random_walk_with_step() {
        let q = process_noise(1e-2, 1e-2, 0.005);
        assert_relative_eq!(q[(0, 0)], 1e-4, epsilon = 1e-18);
        assert_relative_eq!(q[(5, 5)], 1e-4 / 0.005, epsilon = 1e-12);
        assert_abs_diff_eq!(q[(0, 1)], 0.0);
    }

    #[test]
    fn non_finite_input_propagates() {
        let eqs = Mekf;
        let (x, w) = eqs.constants();
        let omega = Vector3::new(f64::NAN, 0.0, 0.0);
        let (x1, _) = eqs.predict(0.0, &x, &w, &omega, 1e-2, 1e-2, DT);
        assert!(x1.iter().any(|v| !v.is_finite()));
    }
}
