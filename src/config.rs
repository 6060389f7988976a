use std::path::PathBuf;
use std::time::Duration;

use crate::error::AlarmHandlerError;

const DEFAULT_METRIC_NAME: &str = "CPUUtilization";
const DEFAULT_SUBJECT: &str = "[Warning] High Server Metric Alert";
const DEFAULT_MESSAGE_PREFIX: &str = "Server Metric Alert: ";
const DEFAULT_SCRIPT_PATH: &str = "/opt/restart_service.sh";
const DEFAULT_TIMEOUT_SECONDS: u64 = 15;

pub const METRIC_NAME_KEY: &str = "METRIC_NAME_TO_MONITOR";
pub const LOG_GROUP_KEY: &str = "LOG_GROUP_NAME";
pub const THRESHOLD_KEY: &str = "ALARM_THRESHOLD";
pub const LEGACY_THRESHOLD_KEY: &str = "ALARM_THRESHOLD_CPU";
pub const TOPIC_ARN_KEY: &str = "SNS_TOPIC_ARN";
pub const SUBJECT_KEY: &str = "NOTIFICATION_SUBJECT";
pub const MESSAGE_PREFIX_KEY: &str = "NOTIFICATION_MESSAGE_PREFIX";
pub const STRATEGY_KEY: &str = "RECOVERY_STRATEGY";
pub const SCRIPT_PATH_KEY: &str = "RECOVERY_SCRIPT_PATH";
pub const SERVICE_NAME_KEY: &str = "RECOVERY_SERVICE_NAME";
pub const SERVICE_MANAGER_KEY: &str = "RECOVERY_SERVICE_MANAGER";
pub const INSTANCE_IDS_KEY: &str = "RECOVERY_INSTANCE_IDS";
pub const TIMEOUT_KEY: &str = "RECOVERY_TIMEOUT_SECONDS";

/// Which corrective action runs when the threshold is exceeded.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryConfig {
    Script { path: PathBuf, timeout: Duration },
    ServiceRestart {
        service: String,
        service_manager: Option<PathBuf>,
        timeout: Duration,
    },
    Ec2Reboot { instance_ids: Vec<String> },
    Disabled,
}

/// Immutable per-process settings. Loaded once at cold start and shared by
/// every invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerConfig {
    pub metric_name: String,
    pub log_group: Option<String>,
    pub threshold: f64,
    pub topic_arn: String,
    pub subject: String,
    pub message_prefix: String,
    pub recovery: RecoveryConfig,
}

impl HandlerConfig {
    pub fn from_env() -> Result<Self, AlarmHandlerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AlarmHandlerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset.
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let (threshold_key, raw_threshold) = match get(THRESHOLD_KEY) {
            Some(value) => (THRESHOLD_KEY, value),
            None => match get(LEGACY_THRESHOLD_KEY) {
                Some(value) => (LEGACY_THRESHOLD_KEY, value),
                None => {
                    return Err(AlarmHandlerError::configuration(
                        THRESHOLD_KEY,
                        "must be set",
                    ))
                }
            },
        };
        let threshold = parse_threshold(threshold_key, &raw_threshold)?;

        let topic_arn = get(TOPIC_ARN_KEY)
            .ok_or_else(|| AlarmHandlerError::configuration(TOPIC_ARN_KEY, "must be set"))?;
        if !topic_arn.starts_with("arn:") {
            return Err(AlarmHandlerError::configuration(
                TOPIC_ARN_KEY,
                format!("`{}` is not an ARN", topic_arn),
            ));
        }

        let recovery = recovery_config(&get)?;

        Ok(HandlerConfig {
            metric_name: get(METRIC_NAME_KEY).unwrap_or_else(|| DEFAULT_METRIC_NAME.to_string()),
            log_group: get(LOG_GROUP_KEY),
            threshold,
            topic_arn,
            subject: get(SUBJECT_KEY).unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            // The prefix is concatenated verbatim, so keep its trailing space.
            message_prefix: lookup(MESSAGE_PREFIX_KEY)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_MESSAGE_PREFIX.to_string()),
            recovery,
        })
    }
}

fn parse_threshold(key: &'static str, raw: &str) -> Result<f64, AlarmHandlerError> {
    let threshold = raw.parse::<f64>().map_err(|_| {
        AlarmHandlerError::configuration(key, format!("`{}` is not a number", raw))
    })?;
    if !threshold.is_finite() {
        return Err(AlarmHandlerError::configuration(
            key,
            format!("`{}` is not a finite number", raw),
        ));
    }
    Ok(threshold)
}

fn recovery_config<G>(get: &G) -> Result<RecoveryConfig, AlarmHandlerError>
where
    G: Fn(&str) -> Option<String>,
{
    let strategy = get(STRATEGY_KEY).unwrap_or_else(|| "script".to_string());
    match strategy.to_ascii_lowercase().as_str() {
        "script" => Ok(RecoveryConfig::Script {
            path: PathBuf::from(
                get(SCRIPT_PATH_KEY).unwrap_or_else(|| DEFAULT_SCRIPT_PATH.to_string()),
            ),
            timeout: timeout(get)?,
        }),
        "service" => Ok(RecoveryConfig::ServiceRestart {
            service: get(SERVICE_NAME_KEY).ok_or_else(|| {
                AlarmHandlerError::configuration(
                    SERVICE_NAME_KEY,
                    "must be set when RECOVERY_STRATEGY=service",
                )
            })?,
            service_manager: get(SERVICE_MANAGER_KEY).map(PathBuf::from),
            timeout: timeout(get)?,
        }),
        "ec2-reboot" => {
            let instance_ids: Vec<String> = get(INSTANCE_IDS_KEY)
                .unwrap_or_default()
                .split(',')
                .map(|id| id.trim())
                .filter(|id| !id.is_empty())
                .map(|id| id.to_string())
                .collect();
            if instance_ids.is_empty() {
                return Err(AlarmHandlerError::configuration(
                    INSTANCE_IDS_KEY,
                    "must list at least one instance when RECOVERY_STRATEGY=ec2-reboot",
                ));
            }
            Ok(RecoveryConfig::Ec2Reboot { instance_ids })
        }
        "none" => Ok(RecoveryConfig::Disabled),
        other => Err(AlarmHandlerError::configuration(
            STRATEGY_KEY,
            format!(
                "unknown strategy `{}` (expected script, service, ec2-reboot or none)",
                other
            ),
        )),
    }
}

fn timeout<G>(get: &G) -> Result<Duration, AlarmHandlerError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(TIMEOUT_KEY) {
        None => Ok(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
        Some(raw) => match raw.parse::<u64>() {
            Ok(seconds) if seconds > 0 => Ok(Duration::from_secs(seconds)),
            _ => Err(AlarmHandlerError::configuration(
                TIMEOUT_KEY,
                format!("`{}` is not a positive number of seconds", raw),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{HandlerConfig, RecoveryConfig};
    use crate::error::AlarmHandlerError;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    const TOPIC: &str = "arn:aws:sns:ap-northeast-1:123456789012:server-alerts";

    fn load(pairs: &[(&str, &str)]) -> Result<HandlerConfig, AlarmHandlerError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        HandlerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("ALARM_THRESHOLD", "80"), ("SNS_TOPIC_ARN", TOPIC)]).unwrap();
        assert_eq!(
            config,
            HandlerConfig {
                metric_name: "CPUUtilization".to_string(),
                log_group: None,
                threshold: 80.0,
                topic_arn: TOPIC.to_string(),
                subject: "[Warning] High Server Metric Alert".to_string(),
                message_prefix: "Server Metric Alert: ".to_string(),
                recovery: RecoveryConfig::Script {
                    path: PathBuf::from("/opt/restart_service.sh"),
                    timeout: Duration::from_secs(15),
                },
            }
        );
    }

    #[test]
    fn test_legacy_threshold_key() {
        let config = load(&[("ALARM_THRESHOLD_CPU", "92.5"), ("SNS_TOPIC_ARN", TOPIC)]).unwrap();
        assert_eq!(config.threshold, 92.5);
    }

    #[test]
    fn test_missing_threshold() {
        let result = load(&[("SNS_TOPIC_ARN", TOPIC)]);
        assert_eq!(
            result.unwrap_err(),
            AlarmHandlerError::configuration("ALARM_THRESHOLD", "must be set")
        );
    }

    #[test]
    fn test_non_numeric_threshold() {
        let result = load(&[("ALARM_THRESHOLD", "eighty"), ("SNS_TOPIC_ARN", TOPIC)]);
        match result.unwrap_err() {
            AlarmHandlerError::Configuration { key, .. } => assert_eq!(key, "ALARM_THRESHOLD"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_threshold() {
        let result = load(&[("ALARM_THRESHOLD", "NaN"), ("SNS_TOPIC_ARN", TOPIC)]);
        assert!(matches!(
            result,
            Err(AlarmHandlerError::Configuration { key: "ALARM_THRESHOLD", .. })
        ));
    }

    #[test]
    fn test_missing_topic() {
        let result = load(&[("ALARM_THRESHOLD", "80")]);
        assert!(matches!(
            result,
            Err(AlarmHandlerError::Configuration { key: "SNS_TOPIC_ARN", .. })
        ));
    }

    #[test]
    fn test_topic_must_be_arn() {
        let result = load(&[("ALARM_THRESHOLD", "80"), ("SNS_TOPIC_ARN", "server-alerts")]);
        assert!(matches!(
            result,
            Err(AlarmHandlerError::Configuration { key: "SNS_TOPIC_ARN", .. })
        ));
    }

    #[test]
    fn test_service_strategy() {
        let config = load(&[
            ("ALARM_THRESHOLD", "80"),
            ("SNS_TOPIC_ARN", TOPIC),
            ("RECOVERY_STRATEGY", "service"),
            ("RECOVERY_SERVICE_NAME", "nginx"),
            ("RECOVERY_TIMEOUT_SECONDS", "30"),
        ])
        .unwrap();
        assert_eq!(
            config.recovery,
            RecoveryConfig::ServiceRestart {
                service: "nginx".to_string(),
                service_manager: None,
                timeout: Duration::from_secs(30),
            }
        );
    }

    #[test]
    fn test_service_manager_override() {
        let config = load(&[
            ("ALARM_THRESHOLD", "80"),
            ("SNS_TOPIC_ARN", TOPIC),
            ("RECOVERY_STRATEGY", "service"),
            ("RECOVERY_SERVICE_NAME", "nginx"),
            ("RECOVERY_SERVICE_MANAGER", "/bin/systemctl"),
        ])
        .unwrap();
        assert_eq!(
            config.recovery,
            RecoveryConfig::ServiceRestart {
                service: "nginx".to_string(),
                service_manager: Some(PathBuf::from("/bin/systemctl")),
                timeout: Duration::from_secs(15),
            }
        );
    }

    #[test]
    fn test_service_strategy_requires_name() {
        let result = load(&[
            ("ALARM_THRESHOLD", "80"),
            ("SNS_TOPIC_ARN", TOPIC),
            ("RECOVERY_STRATEGY", "service"),
        ]);
        assert!(matches!(
            result,
            Err(AlarmHandlerError::Configuration { key: "RECOVERY_SERVICE_NAME", .. })
        ));
    }

    #[test]
    fn test_ec2_reboot_strategy() {
        let config = load(&[
            ("ALARM_THRESHOLD", "80"),
            ("SNS_TOPIC_ARN", TOPIC),
            ("RECOVERY_STRATEGY", "ec2-reboot"),
            ("RECOVERY_INSTANCE_IDS", "i-1234567890abcdef0, i-0fedcba0987654321,"),
        ])
        .unwrap();
        assert_eq!(
            config.recovery,
            RecoveryConfig::Ec2Reboot {
                instance_ids: vec![
                    "i-1234567890abcdef0".to_string(),
                    "i-0fedcba0987654321".to_string(),
                ],
            }
        );
    }

    #[test]
    fn test_unknown_strategy() {
        let result = load(&[
            ("ALARM_THRESHOLD", "80"),
            ("SNS_TOPIC_ARN", TOPIC),
            ("RECOVERY_STRATEGY", "scale-out"),
        ]);
        assert!(matches!(
            result,
            Err(AlarmHandlerError::Configuration { key: "RECOVERY_STRATEGY", .. })
        ));
    }

    #[test]
    fn test_invalid_timeout() {
        let result = load(&[
            ("ALARM_THRESHOLD", "80"),
            ("SNS_TOPIC_ARN", TOPIC),
            ("RECOVERY_TIMEOUT_SECONDS", "0"),
        ]);
        assert!(matches!(
            result,
            Err(AlarmHandlerError::Configuration { key: "RECOVERY_TIMEOUT_SECONDS", .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("ALARM_THRESHOLD", "75"),
            ("SNS_TOPIC_ARN", TOPIC),
            ("METRIC_NAME_TO_MONITOR", "MemoryUtilization"),
            ("LOG_GROUP_NAME", "ServerMetricsLogGroup"),
            ("NOTIFICATION_SUBJECT", "Memory alert"),
            ("NOTIFICATION_MESSAGE_PREFIX", "ALERT "),
            ("RECOVERY_STRATEGY", "none"),
        ])
        .unwrap();
        assert_eq!(config.metric_name, "MemoryUtilization");
        assert_eq!(config.log_group, Some("ServerMetricsLogGroup".to_string()));
        assert_eq!(config.subject, "Memory alert");
        assert_eq!(config.message_prefix, "ALERT ");
        assert_eq!(config.recovery, RecoveryConfig::Disabled);
    }
}
