//! Rotation algebra on SO(3): quaternions, modified Rodrigues parameters
//! (MRP) and direction cosine matrices.
//!
//! Quaternions use the Hamilton convention with the scalar part first when
//! stored in a state vector, $q = (w, x, y, z)$. All direction cosine matrices
//! map body-frame vectors into the reference frame, i.e. $v_n = R v_b$, and
//! all angular rates are expressed in the body frame.

use nalgebra::{Matrix3, Quaternion, Rotation3, Vector3, Vector4};

/// A set of modified Rodrigues parameters together with its shadow flag.
///
/// The flag records how many times (mod 2) the parameters were switched to
/// the shadow set. It does not change the rotation, but it selects the sign
/// of the quaternion returned by [`quaternion_from_mrp`], which keeps the
/// reported quaternion continuous across a switch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mrp {
    /// The three Rodrigues parameters $r = \hat{e} \tan(\theta / 4)$.
    pub r: Vector3<f64>,
    /// Whether this is the shadow set.
    pub shadow: bool,
}

impl Mrp {
    /// The identity rotation.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            r: Vector3::zeros(),
            shadow: false,
        }
    }

    /// Unpack an MRP from the 4-element block `(r1, r2, r3, s)` of a state
    /// vector. Any non-zero `s` marks the shadow set.
    #[must_use]
    pub fn from_vector(v: &Vector4<f64>) -> Self {
        Self {
            r: v.xyz(),
            shadow: v.w.abs() > 0.5,
        }
    }

    /// Pack this MRP into a 4-element state block.
    #[must_use]
    pub fn to_vector(&self) -> Vector4<f64> {
        Vector4::new(self.r.x, self.r.y, self.r.z, f64::from(u8::from(self.shadow)))
    }
}

/// Convert between the scalar-first state layout and a nalgebra quaternion.
#[must_use]
pub fn quaternion_from_vector(v: &Vector4<f64>) -> Quaternion<f64> {
    Quaternion::new(v[0], v[1], v[2], v[3])
}

/// Convert a nalgebra quaternion to the scalar-first state layout.
#[must_use]
pub fn quaternion_to_vector(q: &Quaternion<f64>) -> Vector4<f64> {
    Vector4::new(q.w, q.i, q.j, q.k)
}

/// Quaternion kinematics $\dot{q} = \frac{1}{2} q \otimes (0, \omega)$.
#[must_use]
pub fn quaternion_derivative(q: &Quaternion<f64>, omega: &Vector3<f64>) -> Quaternion<f64> {
    q * Quaternion::from_imag(*omega) * 0.5
}

/// MRP kinematics
/// $\dot{r} = \frac{1}{4}\left((1 - r^T r) I + 2 [r]_\times + 2 r r^T\right)\omega$.
///
/// The shadow flag is a discrete state and does not evolve.
#[must_use]
pub fn mrp_derivative(r: &Mrp, omega: &Vector3<f64>) -> Vector3<f64> {
    let r = &r.r;
    ((1.0 - r.norm_squared()) * omega + 2.0 * r.cross(omega) + 2.0 * r * r.dot(omega)) * 0.25
}

/// Switch to the shadow set when $|r| > 1$.
///
/// The shadow set $r' = -r / |r|^2$ describes the same rotation, so after
/// this call $|r| \le 1$ always holds and the parametrization stays away from
/// its singularity at a rotation of $2\pi$.
#[must_use]
pub fn shadow_if_required(r: &Mrp) -> Mrp {
    let n_sq = r.r.norm_squared();
    if n_sq > 1.0 {
        Mrp {
            r: -r.r / n_sq,
            shadow: !r.shadow,
        }
    } else {
        *r
    }
}

/// Rotation matrix of a (not necessarily normalized) quaternion.
///
/// The quaternion is normalized before conversion; a zero or non-finite
/// quaternion yields a non-finite matrix.
#[must_use]
pub fn dcm_from_quaternion(q: &Quaternion<f64>) -> Matrix3<f64> {
    let q = *q / q.norm();
    let (w, x, y, z) = (q.w, q.i, q.j, q.k);
    Matrix3::new(
        1.0 - 2.0 * (y * y + z * z),
        2.0 * (x * y - w * z),
        2.0 * (x * z + w * y),
        2.0 * (x * y + w * z),
        1.0 - 2.0 * (x * x + z * z),
        2.0 * (y * z - w * x),
        2.0 * (x * z - w * y),
        2.0 * (y * z + w * x),
        1.0 - 2.0 * (x * x + y * y),
    )
}

/// Rotation matrix of an MRP,
/// $R = I + \frac{8 [r]_\times^2 + 4 (1 - r^T r) [r]_\times}{(1 + r^T r)^2}$.
#[must_use]
pub fn dcm_from_mrp(r: &Mrp) -> Matrix3<f64> {
    let n_sq = r.r.norm_squared();
    let skew = r.r.cross_matrix();
    Matrix3::identity() + (skew * skew * 8.0 + skew * (4.0 * (1.0 - n_sq))) / (1.0 + n_sq).powi(2)
}

/// Quaternion of an MRP. The sign is flipped for the shadow set.
#[must_use]
pub fn quaternion_from_mrp(r: &Mrp) -> Quaternion<f64> {
    let n_sq = r.r.norm_squared();
    let den = 1.0 + n_sq;
    let q = Quaternion::from_parts((1.0 - n_sq) / den, r.r * (2.0 / den));
    if r.shadow {
        -q
    } else {
        q
    }
}

/// Exponential map from $\mathfrak{so}(3)$ to a rotation matrix.
#[must_use]
pub fn so3_exp(v: &Vector3<f64>) -> Matrix3<f64> {
    Rotation3::new(*v).into_inner()
}
