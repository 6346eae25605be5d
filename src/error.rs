//! Errors raised while wiring or running a simulation.

use thiserror::Error;

use crate::msgs::Schema;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while wiring or running a simulation.
#[derive(Debug, Error)]
pub enum Error {
    /// A publisher or subscriber disagrees with the schema already bound to
    /// a topic.
    #[error("topic `{topic}` carries {expected:?} messages, not {found:?}")]
    SchemaMismatch {
        /// The topic name.
        topic: String,
        /// The schema the topic was registered with.
        expected: Schema,
        /// The schema that was offered.
        found: Schema,
    },
    /// A subscriber received a publication while it was still handling an
    /// earlier one.
    #[error("re-entrant delivery on topic `{topic}`")]
    ReentrantDelivery {
        /// The topic being delivered.
        topic: String,
    },
    /// An estimator produced a non-finite state or covariance factor.
    #[error("non-finite state in `{name}` at t = {time}")]
    NonFinite {
        /// Name of the component that diverged.
        name: String,
        /// Virtual time of the offending measurement.
        time: f64,
    },
    /// A process asked to be suspended for a negative or non-finite delay.
    #[error("invalid timeout {delay} requested at t = {time}")]
    InvalidTimeout {
        /// The requested delay in seconds.
        delay: f64,
        /// Virtual time of the request.
        time: f64,
    },
    /// A configuration value is outside of its valid range.
    #[error("invalid parameter `{name}`: {value}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },
    /// A recorded log has no entries for the requested topic.
    #[error("no such topic `{0}`")]
    UnknownTopic(String),
}
