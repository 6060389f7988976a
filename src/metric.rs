use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::error::AlarmHandlerError;
use crate::log_event::AlertEvent;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub observed_at: Option<DateTime<Utc>>,
}

impl MetricSample {
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.value > threshold
    }
}

/// Returns the metric from the first log message that carries `metric_name`.
///
/// Messages that are not JSON objects, and messages whose value for the field
/// is not a finite number, are skipped. An invalid value is only reported
/// when no later message carries a usable one.
pub fn extract_metric(
    event: &AlertEvent,
    metric_name: &str,
) -> Result<MetricSample, AlarmHandlerError> {
    let mut parsed = 0usize;
    let mut invalid: Option<AlarmHandlerError> = None;
    for entry in &event.entries {
        let fields = match serde_json::from_str::<Value>(&entry.message) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) | Err(_) => {
                warn!(message = %entry.message, "log message is not a JSON object, skipping");
                continue;
            }
        };
        parsed += 1;

        let raw = match fields.get(metric_name) {
            Some(raw) => raw,
            None => continue,
        };
        let value = match numeric_value(raw) {
            Some(value) => value,
            None => {
                warn!(metric = metric_name, raw = %raw, "metric value is not a number, skipping");
                invalid.get_or_insert_with(|| AlarmHandlerError::InvalidMetricValue {
                    metric: metric_name.to_string(),
                    raw: raw.to_string(),
                });
                continue;
            }
        };

        return Ok(MetricSample {
            name: metric_name.to_string(),
            value,
            observed_at: entry.observed_at(),
        });
    }

    if let Some(e) = invalid {
        return Err(e);
    }
    if parsed == 0 && !event.entries.is_empty() {
        return Err(AlarmHandlerError::Parse(format!(
            "none of the {} log message(s) is a JSON object",
            event.entries.len()
        )));
    }
    Err(AlarmHandlerError::MissingField {
        metric: metric_name.to_string(),
        inspected: event.entries.len(),
    })
}

fn numeric_value(raw: &Value) -> Option<f64> {
    let value = match raw {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}
