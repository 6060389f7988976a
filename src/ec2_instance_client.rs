use async_trait::async_trait;
use rusoto_ec2::{Ec2, Ec2Client, RebootInstancesRequest};
use tracing::info;

use crate::error::AlarmHandlerError;
use crate::recovery::{Recover, RecoveryReport};

/// Recovers by rebooting a fixed set of instances through the EC2 API.
pub struct Ec2InstanceClient {
    client: Ec2Client,
    instance_ids: Vec<String>,
}

#[async_trait]
impl Recover for Ec2InstanceClient {
    fn describe(&self) -> String {
        format!("ec2 reboot {}", self.instance_ids.join(","))
    }

    async fn recover(&self) -> Result<RecoveryReport, AlarmHandlerError> {
        if self.instance_ids.is_empty() {
            return Err(AlarmHandlerError::RecoveryActionNotFound(
                "no instances to reboot".to_string(),
            ));
        }

        let request = RebootInstancesRequest {
            instance_ids: self.instance_ids.clone(),
            ..RebootInstancesRequest::default()
        };
        self.client.reboot_instances(request).await?;
        info!(instance_ids = ?self.instance_ids, "reboot requested");

        Ok(RecoveryReport {
            action: self.describe(),
            exit_code: None,
            stdout: format!("reboot requested for {}", self.instance_ids.join(", ")),
            stderr: String::new(),
        })
    }
}

impl Ec2InstanceClient {
    pub fn new_with_client(client: Ec2Client, instance_ids: Vec<String>) -> Self {
        Ec2InstanceClient {
            client,
            instance_ids,
        }
    }
}
