use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::HandlerConfig;
use crate::error::AlarmHandlerError;
use crate::log_event::AlertEvent;
use crate::metric::{extract_metric, MetricSample};
use crate::notification::{Notification, Notify};
use crate::recovery::Recover;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum Outcome {
    Normal,
    AlertRecovered,
    AlertRecoveryFailed,
    ParseError,
    MissingField,
    ConfigError,
}

impl Outcome {
    pub fn status_code(self) -> u16 {
        match self {
            Outcome::Normal | Outcome::AlertRecovered => 200,
            Outcome::ParseError | Outcome::MissingField => 400,
            Outcome::AlertRecoveryFailed | Outcome::ConfigError => 500,
        }
    }
}

/// Result returned to the Lambda runtime for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerOutput {
    pub status_code: u16,
    pub outcome: Outcome,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl HandlerOutput {
    fn new(outcome: Outcome, body: impl Into<String>) -> Self {
        HandlerOutput {
            status_code: outcome.status_code(),
            outcome,
            body: body.into(),
            metric_value: None,
            threshold: None,
        }
    }

    pub fn rejected(error: &AlarmHandlerError) -> Self {
        Self::new(error.outcome(), error.to_string())
    }

    fn with_sample(mut self, sample: &MetricSample, threshold: f64) -> Self {
        self.metric_value = Some(sample.value);
        self.threshold = Some(threshold);
        self
    }
}

pub struct EventHandler {
    config: HandlerConfig,
    notifier: Box<dyn Notify>,
    recovery: Box<dyn Recover>,
}

impl EventHandler {
    pub fn new(
        config: HandlerConfig,
        notifier: Box<dyn Notify>,
        recovery: Box<dyn Recover>,
    ) -> Self {
        EventHandler {
            config,
            notifier,
            recovery,
        }
    }

    /// Classifies one event and, when the threshold is exceeded, notifies and
    /// runs the recovery action. Every failure is reported in the output.
    pub async fn handle(&self, payload: &Value) -> HandlerOutput {
        let event = match AlertEvent::from_payload(payload) {
            Ok(event) => event,
            Err(e) => {
                error!(error = %e, "rejecting event");
                return HandlerOutput::rejected(&e);
            }
        };

        if event.is_control_message() {
            info!(owner = ?event.owner, "control message acknowledged");
            return HandlerOutput::new(Outcome::Normal, "Control message acknowledged");
        }

        if let Some(expected) = &self.config.log_group {
            if let Err(e) = event.verify_source(expected) {
                error!(error = %e, "rejecting event");
                return HandlerOutput::rejected(&e);
            }
        }

        info!(
            log_group = ?event.log_group,
            log_stream = ?event.log_stream,
            log_events = event.entries.len(),
            "processing log events"
        );

        let sample = match extract_metric(&event, &self.config.metric_name) {
            Ok(sample) => sample,
            Err(e) => {
                error!(error = %e, metric = %self.config.metric_name, "could not extract metric");
                return HandlerOutput::rejected(&e);
            }
        };

        let threshold = self.config.threshold;
        if !sample.exceeds(threshold) {
            info!(
                metric = %sample.name,
                value = sample.value,
                threshold,
                "metric within normal range"
            );
            return HandlerOutput::new(
                Outcome::Normal,
                format!("{} is within normal range", sample.name),
            )
            .with_sample(&sample, threshold);
        }

        warn!(
            metric = %sample.name,
            value = sample.value,
            threshold,
            "alarm triggered"
        );

        let notification = Notification::threshold_exceeded(&self.config, &event, &sample);
        if let Err(e) = self.notifier.notify(&notification).await {
            error!(error = %e, topic_arn = %self.config.topic_arn, "notification failed, continuing with recovery");
        }

        let action = self.recovery.describe();
        match self.recovery.recover().await {
            Ok(report) => {
                info!(action = %report.action, exit_code = ?report.exit_code, "recovery succeeded");
                HandlerOutput::new(
                    Outcome::AlertRecovered,
                    format!("{} exceeded threshold, recovered with {}", sample.name, report.action),
                )
                .with_sample(&sample, threshold)
            }
            Err(e) => {
                error!(error = %e, action = %action, "recovery failed");
                HandlerOutput::new(Outcome::AlertRecoveryFailed, e.to_string())
                    .with_sample(&sample, threshold)
            }
        }
    }
}
