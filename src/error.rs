use rusoto_core::RusotoError;
use rusoto_ec2::RebootInstancesError;
use rusoto_sns::PublishError;
use thiserror::Error;

use crate::handler::Outcome;

#[derive(Debug, Error, PartialEq)]
pub enum AlarmHandlerError {
    #[error("failed to parse event payload: {0}")]
    Parse(String),
    #[error("metric `{metric}` has a non-numeric value: {raw}")]
    InvalidMetricValue { metric: String, raw: String },
    #[error("event came from log group `{actual}`, expected `{expected}`")]
    UnexpectedSource { expected: String, actual: String },
    #[error("metric `{metric}` not found in {inspected} log event(s)")]
    MissingField { metric: String, inspected: usize },
    #[error("invalid configuration `{key}`: {reason}")]
    Configuration { key: &'static str, reason: String },
    #[error("failed to publish notification: {0}")]
    Notification(String),
    #[error("recovery mechanism unavailable: {0}")]
    RecoveryMechanismUnavailable(String),
    #[error("recovery action not found: {0}")]
    RecoveryActionNotFound(String),
    #[error("recovery action failed: {0}")]
    RecoveryActionFailure(String),
}

impl AlarmHandlerError {
    pub fn configuration(key: &'static str, reason: impl Into<String>) -> Self {
        AlarmHandlerError::Configuration {
            key,
            reason: reason.into(),
        }
    }

    /// Classification reported to the caller when this error ends an invocation.
    pub fn outcome(&self) -> Outcome {
        match *self {
            AlarmHandlerError::Parse(_)
            | AlarmHandlerError::InvalidMetricValue { .. }
            | AlarmHandlerError::UnexpectedSource { .. } => Outcome::ParseError,
            AlarmHandlerError::MissingField { .. } => Outcome::MissingField,
            AlarmHandlerError::Configuration { .. } => Outcome::ConfigError,
            AlarmHandlerError::Notification(_)
            | AlarmHandlerError::RecoveryMechanismUnavailable(_)
            | AlarmHandlerError::RecoveryActionNotFound(_)
            | AlarmHandlerError::RecoveryActionFailure(_) => Outcome::AlertRecoveryFailed,
        }
    }
}

impl From<serde_json::Error> for AlarmHandlerError {
    fn from(e: serde_json::Error) -> AlarmHandlerError {
        AlarmHandlerError::Parse(e.to_string())
    }
}

impl From<base64::DecodeError> for AlarmHandlerError {
    fn from(e: base64::DecodeError) -> AlarmHandlerError {
        AlarmHandlerError::Parse(format!("invalid base64 data: {}", e))
    }
}

impl From<RusotoError<PublishError>> for AlarmHandlerError {
    fn from(e: RusotoError<PublishError>) -> AlarmHandlerError {
        AlarmHandlerError::Notification(e.to_string())
    }
}

impl From<RusotoError<RebootInstancesError>> for AlarmHandlerError {
    fn from(e: RusotoError<RebootInstancesError>) -> AlarmHandlerError {
        AlarmHandlerError::RecoveryActionFailure(format!("RebootInstances: {}", e))
    }
}
