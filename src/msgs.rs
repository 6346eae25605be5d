//! Fixed-layout messages exchanged over the [`Bus`](crate::bus::Bus).
//!
//! Every topic is bound to exactly one [`Schema`]. Typed publishers and
//! subscribers use the [`Message`] trait to move between a concrete record
//! and the type-erased [`Payload`] seen by taps such as the logger.

use std::collections::BTreeMap;

use nalgebra::{Quaternion, Vector3};

/// Identifies the record type carried by a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Schema {
    /// [`Imu`]
    Imu,
    /// [`VehicleState`]
    VehicleState,
    /// [`EstimatorStatus`]
    EstimatorStatus,
    /// [`Params`]
    Params,
}

/// A gyroscope sample.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Imu {
    /// Virtual time of the sample in seconds.
    pub time: f64,
    /// Measured body rate in rad/s.
    pub gyro: Vector3<f64>,
}

/// Attitude, bias and rate of the vehicle, either true or estimated.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VehicleState {
    /// Virtual time in seconds.
    pub time: f64,
    /// Attitude quaternion. Estimated quaternions are reported as computed,
    /// without renormalization.
    pub q: Quaternion<f64>,
    /// Gyro bias in rad/s.
    pub b: Vector3<f64>,
    /// Body rate in rad/s.
    pub omega: Vector3<f64>,
}

/// Internal state of an estimator after a predict step.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EstimatorStatus {
    /// Virtual time in seconds.
    pub time: f64,
    /// Number of state entries in [`Self::x`].
    pub n_x: u32,
    /// Full filter state.
    pub x: Vec<f64>,
    /// Diagonal of the covariance factor.
    pub w: Vec<f64>,
    /// Wall-clock time spent in the predict step, in seconds.
    pub elapsed: f64,
}

/// A parameter update notification.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Params {
    /// Virtual time of the update in seconds.
    pub time: f64,
    /// New values keyed by parameter name, e.g. `sim/w_gyro`.
    pub values: BTreeMap<String, f64>,
}

impl Params {
    /// Build an update that sets a single parameter.
    #[must_use]
    pub fn single(time: f64, name: &str, value: f64) -> Self {
        Self {
            time,
            values: BTreeMap::from([(name.to_owned(), value)]),
        }
    }
}

/// Any message, as seen by schema-agnostic consumers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Payload {
    /// See [`Imu`].
    Imu(Imu),
    /// See [`VehicleState`].
    VehicleState(VehicleState),
    /// See [`EstimatorStatus`].
    EstimatorStatus(EstimatorStatus),
    /// See [`Params`].
    Params(Params),
}

impl Payload {
    /// The schema of the wrapped record.
    #[must_use]
    pub fn schema(&self) -> Schema {
        match self {
            Self::Imu(_) => Schema::Imu,
            Self::VehicleState(_) => Schema::VehicleState,
            Self::EstimatorStatus(_) => Schema::EstimatorStatus,
            Self::Params(_) => Schema::Params,
        }
    }

    /// Timestamp of the wrapped record.
    #[must_use]
    pub fn time(&self) -> f64 {
        match self {
            Self::Imu(m) => m.time,
            Self::VehicleState(m) => m.time,
            Self::EstimatorStatus(m) => m.time,
            Self::Params(m) => m.time,
        }
    }
}

/// A record type with a fixed schema.
pub trait Message: Clone + 'static {
    /// The schema of this record type.
    const SCHEMA: Schema;

    /// Wrap into a type-erased payload.
    fn into_payload(self) -> Payload;

    /// Borrow the record back out of a payload, if the schema matches.
    fn from_payload(payload: &Payload) -> Option<&Self>;
}

macro_rules! impl_message {
    ($ty:ident) => {
        impl Message for $ty {
            const SCHEMA: Schema = Schema::$ty;

            fn into_payload(self) -> Payload {
                Payload::$ty(self)
            }

            fn from_payload(payload: &Payload) -> Option<&Self> {
                match payload {
                    Payload::$ty(m) => Some(m),
                    _ => None,
                }
            }
        }
    };
}

impl_message!(Imu);
impl_message!(VehicleState);
impl_message!(EstimatorStatus);
impl_message!(Params);
