//! Decoding of CloudWatch Logs subscription events.
//!
//! CloudWatch delivers `{"awslogs": {"data": "..."}}` where `data` is a
//! base64 encoded, gzip compressed JSON document listing the log events of
//! one batch. A plain JSON object is also accepted and treated as a single
//! log message, which is how the function is invoked by hand.

use std::io::Read;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::Value;

use crate::error::AlarmHandlerError;

const CONTROL_MESSAGE: &str = "CONTROL_MESSAGE";

#[derive(Debug, Deserialize)]
struct SubscriptionEnvelope {
    awslogs: AwsLogs,
}

#[derive(Debug, Deserialize)]
struct AwsLogs {
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogsData {
    #[serde(default)]
    message_type: Option<String>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    log_group: Option<String>,
    #[serde(default)]
    log_stream: Option<String>,
    #[serde(default)]
    log_events: Vec<LogEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    pub message: String,
}

impl LogEntry {
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
    }
}

/// One invocation's worth of log messages plus where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub message_type: Option<String>,
    pub owner: Option<String>,
    pub log_group: Option<String>,
    pub log_stream: Option<String>,
    pub entries: Vec<LogEntry>,
}

impl AlertEvent {
    pub fn from_payload(payload: &Value) -> Result<Self, AlarmHandlerError> {
        if !payload.is_object() {
            return Err(AlarmHandlerError::Parse(
                "event payload is not a JSON object".to_string(),
            ));
        }
        if payload.get("awslogs").is_some() {
            let envelope = SubscriptionEnvelope::deserialize(payload)?;
            return Self::from_subscription_data(&envelope.awslogs.data);
        }

        Ok(AlertEvent {
            message_type: None,
            owner: None,
            log_group: None,
            log_stream: None,
            entries: vec![LogEntry {
                id: None,
                timestamp: None,
                message: payload.to_string(),
            }],
        })
    }

    fn from_subscription_data(data: &str) -> Result<Self, AlarmHandlerError> {
        let compressed = STANDARD.decode(data.trim())?;
        let mut uncompressed = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut uncompressed)
            .map_err(|e| AlarmHandlerError::Parse(format!("invalid gzip data: {}", e)))?;
        let logs: LogsData = serde_json::from_slice(&uncompressed)?;

        Ok(AlertEvent {
            message_type: logs.message_type,
            owner: logs.owner,
            log_group: logs.log_group,
            log_stream: logs.log_stream,
            entries: logs.log_events,
        })
    }

    pub fn is_control_message(&self) -> bool {
        self.message_type.as_deref() == Some(CONTROL_MESSAGE)
    }

    /// Rejects events from a log group other than `expected`. Events without
    /// a source, such as direct invocations, pass.
    pub fn verify_source(&self, expected: &str) -> Result<(), AlarmHandlerError> {
        match self.log_group.as_deref() {
            Some(actual) if actual != expected => Err(AlarmHandlerError::UnexpectedSource {
                expected: expected.to_string(),
                actual: actual.to_string(),
            }),
            _ => Ok(()),
        }
    }
}
