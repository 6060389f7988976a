mod config;
mod ec2_instance_client;
mod error;
mod handler;
mod log_event;
mod metric;
mod notification;
mod recovery;
mod sns_notification_client;

use anyhow::anyhow;
use lambda_runtime::{service_fn, LambdaEvent};
use rusoto_core::Region;
use rusoto_ec2::Ec2Client;
use rusoto_sns::SnsClient;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{HandlerConfig, RecoveryConfig};
use crate::ec2_instance_client::Ec2InstanceClient;
use crate::error::AlarmHandlerError;
use crate::handler::{EventHandler, HandlerOutput};
use crate::recovery::{NoopRecovery, Recover, ScriptRecovery, ServiceRestartRecovery};
use crate::sns_notification_client::SnsNotificationClient;

/// Configuration is read once per cold start. When it is invalid every
/// invocation reports the failure instead of evaluating its event.
enum Invocation {
    Ready(EventHandler),
    Misconfigured(AlarmHandlerError),
}

impl Invocation {
    async fn handle(&self, event: LambdaEvent<Value>) -> HandlerOutput {
        info!(request_id = %event.context.request_id, "invocation started");
        let output = match self {
            Invocation::Ready(handler) => handler.handle(&event.payload).await,
            Invocation::Misconfigured(e) => {
                error!(error = %e, "event not evaluated");
                HandlerOutput::rejected(e)
            }
        };
        info!(outcome = ?output.outcome, status_code = output.status_code, "invocation finished");
        output
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let invocation = match HandlerConfig::from_env() {
        Ok(config) => {
            info!(
                metric = %config.metric_name,
                threshold = config.threshold,
                log_group = ?config.log_group,
                recovery = ?config.recovery,
                "configuration loaded"
            );
            Invocation::Ready(build_handler(config))
        }
        Err(e) => {
            error!(error = %e, "configuration rejected");
            Invocation::Misconfigured(e)
        }
    };

    let invocation = &invocation;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        Ok::<HandlerOutput, lambda_runtime::Error>(invocation.handle(event).await)
    }))
    .await
    .map_err(|e| anyhow!(e))
}

fn build_handler(config: HandlerConfig) -> EventHandler {
    let notifier = SnsNotificationClient::new_with_client(
        SnsClient::new(Region::default()),
        config.topic_arn.clone(),
    );
    let recovery: Box<dyn Recover> = match &config.recovery {
        RecoveryConfig::Script { path, timeout } => {
            Box::new(ScriptRecovery::new(path.clone(), *timeout))
        }
        RecoveryConfig::ServiceRestart {
            service,
            service_manager: Some(service_manager),
            timeout,
        } => Box::new(ServiceRestartRecovery::with_service_manager(
            service.clone(),
            service_manager.clone(),
            *timeout,
        )),
        RecoveryConfig::ServiceRestart {
            service,
            service_manager: None,
            timeout,
        } => Box::new(ServiceRestartRecovery::new(service.clone(), *timeout)),
        RecoveryConfig::Ec2Reboot { instance_ids } => Box::new(Ec2InstanceClient::new_with_client(
            Ec2Client::new(Region::default()),
            instance_ids.clone(),
        )),
        RecoveryConfig::Disabled => Box::new(NoopRecovery),
    };
    EventHandler::new(config, Box::new(notifier), recovery)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // CloudWatch Logs timestamps every line already.
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}
