//! Post-run comparison of the estimators against the truth.

use nalgebra::{Quaternion, UnitQuaternion};

use crate::error::{Error, Result};
use crate::estimator::{state_topic, status_topic};
use crate::logger::Log;
use crate::msgs::{EstimatorStatus, VehicleState};
use crate::simulator::SIM_STATE_TOPIC;

/// Rotation angle in radians between two attitudes.
///
/// Both quaternions are normalized first and `q` and `-q` describe the same
/// attitude, so the result is in $[0, \pi]$.
#[must_use]
pub fn attitude_error(estimate: &Quaternion<f64>, truth: &Quaternion<f64>) -> f64 {
    UnitQuaternion::new_normalize(*estimate).angle_to(&UnitQuaternion::new_normalize(*truth))
}

/// How one estimator tracked the truth over a run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EstimatorSummary {
    /// Estimator name.
    pub name: String,
    /// Number of predictions.
    pub samples: usize,
    /// Largest $||q| - 1|$ over the run.
    pub max_norm_error: f64,
    /// Attitude error of the last estimate, in radians.
    pub final_attitude_error: f64,
    /// Norm of the bias error of the last estimate, in rad/s.
    pub final_bias_error: f64,
    /// Mean wall-clock time of a prediction, in seconds.
    pub mean_elapsed: f64,
}

/// Compare the estimator `name` against the truth recorded in `log`.
///
/// Estimates and truth are paired in publication order.
///
/// # Errors
///
/// Returns [`Error::UnknownTopic`] if the log lacks the truth or one of the
/// estimator topics.
#[allow(clippy::cast_precision_loss)]
pub fn summarize(log: &Log, name: &str) -> Result<EstimatorSummary> {
    let truth = log.series::<VehicleState>(SIM_STATE_TOPIC)?;
    let estimates = log.series::<VehicleState>(&state_topic(name))?;
    let statuses = log.series::<EstimatorStatus>(&status_topic(name))?;

    let last_truth = estimates.len().checked_sub(1).and_then(|i| truth.get(i));
    let (Some(last), Some(last_truth)) = (estimates.last(), last_truth) else {
        return Err(Error::UnknownTopic(SIM_STATE_TOPIC.to_owned()));
    };

    let max_norm_error = estimates
        .iter()
        .map(|m| (m.q.norm() - 1.0).abs())
        .fold(0.0, f64::max);
    let mean_elapsed =
        statuses.iter().map(|s| s.elapsed).sum::<f64>() / statuses.len().max(1) as f64;

    Ok(EstimatorSummary {
        name: name.to_owned(),
        samples: estimates.len(),
        max_norm_error,
        final_attitude_error: attitude_error(&last.q, &last_truth.q),
        final_bias_error: (last.b - last_truth.b).norm(),
        mean_elapsed,
    })
}
