//! Fixed-step integration shared by the state and covariance propagation.

use nalgebra::{Matrix6, SMatrix};

/// One step of the classical 4th-order Runge-Kutta scheme.
///
/// `f(t, y)` is evaluated at $t$, twice at $t + dt/2$ and at $t + dt$, and
/// the stages are combined with weights $1/6, 1/3, 1/3, 1/6$. The local
/// truncation error is $O(dt^5)$.
///
/// Works for any statically sized matrix, so the same routine advances a
/// state vector and a covariance factor.
///
/// # Example
///
/// ```
/// use attitude_bank::integrate::rk4;
/// use nalgebra::Vector1;
///
/// // dy/dt = y, y(0) = 1
/// let y = rk4(|_, y| *y, 0.0, Vector1::new(1.0), 0.1);
/// assert!((y[0] - 0.1_f64.exp()).abs() < 1e-7);
/// ```
#[must_use]
pub fn rk4<const R: usize, const C: usize, F>(
    f: F,
    t: f64,
    y: SMatrix<f64, R, C>,
    dt: f64,
) -> SMatrix<f64, R, C>
where
    F: Fn(f64, &SMatrix<f64, R, C>) -> SMatrix<f64, R, C>,
{
    let half = dt / 2.0;
    let k1 = f(t, &y);
    let k2 = f(t + half, &(y + k1 * half));
    let k3 = f(t + half, &(y + k2 * half));
    let k4 = f(t + dt, &(y + k3 * dt));
    y + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
}

/// Time derivative of a lower-triangular square-root covariance factor.
///
/// The unconstrained square-root derivative
/// $A = F W + \frac{1}{2} Q W^{-T}$ satisfies
/// $A W^T + W A^T = F P + P F^T + Q$ for $P = W W^T$, but is not triangular.
/// It is projected back onto the lower-triangular form with
/// $\dot{W} = W \, \Phi(W^{-1} A + (W^{-1} A)^T)$, where $\Phi$ keeps the
/// strictly lower part and halves the diagonal. The projected derivative
/// produces the same $\dot{P}$, stays lower-triangular and scales each
/// diagonal entry by itself, so a positive diagonal stays positive.
///
/// The full covariance is never formed. A singular `W` yields a NaN
/// derivative.
#[must_use]
pub fn sqrt_covariance_derivative(
    w: &Matrix6<f64>,
    f: &Matrix6<f64>,
    q: &Matrix6<f64>,
) -> Matrix6<f64> {
    let Some(w_inv) = w.solve_lower_triangular(&Matrix6::identity()) else {
        return Matrix6::from_element(f64::NAN);
    };
    let a = f * w + q * w_inv.transpose() * 0.5;
    let m = w_inv * a;
    w * tril_half_diagonal(&(m + m.transpose()))
}

/// $\Phi(M)$: strictly lower part of `m` plus half of its diagonal.
fn tril_half_diagonal(m: &Matrix6<f64>) -> Matrix6<f64> {
    let mut phi = m.lower_triangle();
    phi.set_diagonal(&(m.diagonal() * 0.5));
    phi
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Vector1, Vector6};

    fn integrate_exp(dt: f64, steps: usize) -> f64 {
        let mut y = Vector1::new(1.0);
        let mut t = 0.0;
        for _ in 0..steps {
            y = rk4(|_, y| *y, t, y, dt);
            t += dt;
        }
        y[0]
    }

    #[test]
    fn local_error_is_fifth_order() {
        let e1 = (integrate_exp(0.2, 1) - 0.2_f64.exp()).abs();
        let e2 = (integrate_exp(0.1, 1) - 0.1_f64.exp()).abs();
        let ratio = e1 / e2;
        assert!((28.0..36.0).contains(&ratio), "ratio {ratio}");
    }

    #[test]
    fn global_error_is_fourth_order() {
        let e1 = (integrate_exp(0.1, 10) - 1_f64.exp()).abs();
        let e2 = (integrate_exp(0.05, 20) - 1_f64.exp()).abs();
        let ratio = e1 / e2;
        assert!((14.0..18.0).contains(&ratio), "ratio {ratio}");
    }

    #[test]
    fn time_argument_is_forwarded() {
        // dy/dt = t, exact for a polynomial of degree <= 4
        let y = rk4(|t, _| Vector1::new(t), 1.0, Vector1::new(0.0), 0.5);
        assert_relative_eq!(y[0], 0.5 * (1.5_f64.powi(2) - 1.0), epsilon = 1e-14);
    }

    #[test]
    fn factor_derivative_reproduces_diffusion() {
        // with F = 0 each diagonal entry follows d(w^2)/dt = q
        let w = Matrix6::identity() * 1e-3;
        let q = Matrix6::from_diagonal(&Vector6::new(1e-4, 1e-4, 1e-4, 2e-2, 2e-2, 2e-2));
        let w_dot = sqrt_covariance_derivative(&w, &Matrix6::zeros(), &q);

        for i in 0..6 {
            assert_relative_eq!(2.0 * w[(i, i)] * w_dot[(i, i)], q[(i, i)], epsilon = 1e-15);
        }
        assert_eq!(w_dot, w_dot.lower_triangle());
    }

    #[test]
    fn factor_derivative_matches_covariance_riccati() {
        let w = Matrix6::new(
            2.0, 0.0, 0.0, 0.0, 0.0, 0.0, //
            0.3, 1.5, 0.0, 0.0, 0.0, 0.0, //
            -0.2, 0.1, 1.2, 0.0, 0.0, 0.0, //
            0.4, 0.0, 0.2, 0.9, 0.0, 0.0, //
            0.1, -0.3, 0.0, 0.1, 0.8, 0.0, //
            0.0, 0.2, 0.1, -0.1, 0.05, 0.7,
        ) * 1e-2;
        let f = Matrix6::from_fn(|i, j| ((i * 7 + j * 3) % 5) as f64 - 2.0);
        let q = Matrix6::from_diagonal(&Vector6::new(1e-4, 1e-4, 1e-4, 2e-2, 2e-2, 2e-2));

        let w_dot = sqrt_covariance_derivative(&w, &f, &q);
        let p = w * w.transpose();
        let p_dot = w_dot * w.transpose() + w * w_dot.transpose();

        assert_eq!(w_dot, w_dot.lower_triangle());
        assert_relative_eq!(p_dot, f * p + p * f.transpose() + q, epsilon = 1e-12);
    }

    #[test]
    fn singular_factor_yields_nan() {
        let w_dot =
            sqrt_covariance_derivative(&Matrix6::zeros(), &Matrix6::zeros(), &Matrix6::identity());
        assert!(w_dot.iter().any(|v| v.is_nan()));
    }
}
