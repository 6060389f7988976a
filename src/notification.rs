use async_trait::async_trait;

use crate::config::HandlerConfig;
use crate::error::AlarmHandlerError;
use crate::log_event::AlertEvent;
use crate::metric::MetricSample;

/// SNS rejects subjects longer than this.
const MAX_SUBJECT_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub subject: String,
    pub message: String,
}

impl Notification {
    pub fn threshold_exceeded(
        config: &HandlerConfig,
        event: &AlertEvent,
        sample: &MetricSample,
    ) -> Self {
        let mut message = format!(
            "{}{} exceeds threshold ({}): {}",
            config.message_prefix, sample.name, config.threshold, sample.value
        );
        if let Some(log_group) = &event.log_group {
            message.push_str(&format!("\nLog group: {}", log_group));
        }
        if let Some(log_stream) = &event.log_stream {
            message.push_str(&format!("\nLog stream: {}", log_stream));
        }
        if let Some(observed_at) = sample.observed_at {
            message.push_str(&format!("\nObserved at: {}", observed_at.to_rfc3339()));
        }

        Notification {
            subject: config.subject.chars().take(MAX_SUBJECT_CHARS).collect(),
            message,
        }
    }
}

#[async_trait]
pub trait Notify: Send + Sync {
    /// Delivers `notification`, returning the channel's message id if it has one.
    async fn notify(
        &self,
        notification: &Notification,
    ) -> Result<Option<String>, AlarmHandlerError>;
}

#[cfg(test)]
mod tests {
    use crate::config::{HandlerConfig, RecoveryConfig};
    use crate::log_event::AlertEvent;
    use crate::metric::MetricSample;
    use crate::notification::Notification;
    use chrono::{TimeZone, Utc};

    fn config(subject: &str) -> HandlerConfig {
        HandlerConfig {
            metric_name: "CPUUtilization".to_string(),
            log_group: None,
            threshold: 80.0,
            topic_arn: "arn:aws:sns:ap-northeast-1:123456789012:server-alerts".to_string(),
            subject: subject.to_string(),
            message_prefix: "Server Metric Alert: ".to_string(),
            recovery: RecoveryConfig::Disabled,
        }
    }

    fn event(log_group: Option<&str>) -> AlertEvent {
        AlertEvent {
            message_type: None,
            owner: None,
            log_group: log_group.map(|group| group.to_string()),
            log_stream: log_group.map(|_| "i-1234567890abcdef0".to_string()),
            entries: vec![],
        }
    }

    #[test]
    fn test_message_contains_value_and_threshold() {
        let sample = MetricSample {
            name: "CPUUtilization".to_string(),
            value: 85.0,
            observed_at: None,
        };
        let notification = Notification::threshold_exceeded(
            &config("[Warning] High Server Metric Alert"),
            &event(None),
            &sample,
        );

        assert_eq!(notification.subject, "[Warning] High Server Metric Alert");
        assert_eq!(
            notification.message,
            "Server Metric Alert: CPUUtilization exceeds threshold (80): 85"
        );
    }

    #[test]
    fn test_message_includes_source() {
        let sample = MetricSample {
            name: "CPUUtilization".to_string(),
            value: 91.5,
            observed_at: Some(Utc.with_ymd_and_hms(2020, 12, 1, 15, 0, 0).unwrap()),
        };
        let notification = Notification::threshold_exceeded(
            &config("alert"),
            &event(Some("ServerMetricsLogGroup")),
            &sample,
        );

        assert_eq!(
            notification.message,
            "Server Metric Alert: CPUUtilization exceeds threshold (80): 91.5\n\
             Log group: ServerMetricsLogGroup\n\
             Log stream: i-1234567890abcdef0\n\
             Observed at: 2020-12-01T15:00:00+00:00"
        );
    }

    #[test]
    fn test_subject_is_truncated() {
        let sample = MetricSample {
            name: "CPUUtilization".to_string(),
            value: 85.0,
            observed_at: None,
        };
        let long_subject = "x".repeat(150);
        let notification =
            Notification::threshold_exceeded(&config(&long_subject), &event(None), &sample);
        assert_eq!(notification.subject.chars().count(), 100);
    }
}
