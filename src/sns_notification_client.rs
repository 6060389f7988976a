use async_trait::async_trait;
use rusoto_sns::{PublishInput, Sns, SnsClient};
use tracing::info;

use crate::error::AlarmHandlerError;
use crate::notification::{Notification, Notify};

pub struct SnsNotificationClient {
    client: SnsClient,
    topic_arn: String,
}

#[async_trait]
impl Notify for SnsNotificationClient {
    async fn notify(&self, notification: &Notification) -> Result<Option<String>, AlarmHandlerError> {
        let response = self
            .client
            .publish(PublishInput {
                topic_arn: Some(self.topic_arn.clone()),
                subject: Some(notification.subject.clone()),
                message: notification.message.clone(),
                ..Default::default()
            })
            .await?;
        info!(
            topic_arn = %self.topic_arn,
            message_id = ?response.message_id,
            subject = %notification.subject,
            "notification published"
        );
        Ok(response.message_id)
    }
}

impl SnsNotificationClient {
    pub fn new_with_client(client: SnsClient, topic_arn: impl Into<String>) -> Self {
        SnsNotificationClient {
            client,
            topic_arn: topic_arn.into(),
        }
    }
}
