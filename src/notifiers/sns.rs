//! Amazon SNS notifier: publishes the alert payload to an SNS topic.

use super::alert_payload;
use crate::core::{EvalContext, Notifier, NotifierBase, NotifierConfig};
use crate::error::NotifyError;
use crate::registry::{NotifierPlugin, SettingDescriptor};
use crate::suppression::SuppressionPolicy;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sns::error::DisplayErrorContext;
use aws_sdk_sns::Client;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info, instrument};

pub const TYPE: &str = "amazonsns";

/// Subject line of every published message.
pub const SUBJECT: &str = "Alert Notification";

const SETTINGS: &[SettingDescriptor] = &[
    SettingDescriptor {
        key: "region",
        label: "Region",
        placeholder: "ap-northeast-1",
        required: false,
    },
    SettingDescriptor {
        key: "destination",
        label: "Topic ARN",
        placeholder: "arn:aws:sns:REGION:ACCOUNTID:TOPICNAME",
        required: true,
    },
];

pub fn plugin() -> NotifierPlugin {
    NotifierPlugin {
        kind: TYPE,
        name: "Amazon SNS",
        description: "Sends notifications to an Amazon SNS topic",
        settings: SETTINGS,
        factory: build,
    }
}

fn build(config: &NotifierConfig, policy: SuppressionPolicy) -> Result<Arc<dyn Notifier>, NotifyError> {
    let notifier = SnsNotifier::new(config, policy)?;
    Ok(Arc::new(notifier))
}

/// Publishes a message to an SNS topic.
#[async_trait]
pub trait SnsPublisher: Send + Sync {
    async fn publish(&self, topic_arn: &str, subject: &str, message: String)
        -> Result<(), NotifyError>;
}

/// `SnsPublisher` backed by the AWS SDK.
///
/// The SDK client is created on first publish so that construction stays
/// synchronous and free of network access.
pub struct AwsSnsPublisher {
    region: Option<String>,
    client: OnceCell<Client>,
}

impl AwsSnsPublisher {
    pub fn new(region: Option<String>) -> Self {
        Self {
            region,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> &Client {
        self.client
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest());
                if let Some(region) = &self.region {
                    loader = loader.region(Region::new(region.clone()));
                }
                Client::new(&loader.load().await)
            })
            .await
    }
}

#[async_trait]
impl SnsPublisher for AwsSnsPublisher {
    async fn publish(
        &self,
        topic_arn: &str,
        subject: &str,
        message: String,
    ) -> Result<(), NotifyError> {
        self.client()
            .await
            .publish()
            .topic_arn(topic_arn)
            .subject(subject)
            .message(message)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

pub struct SnsNotifier {
    base: NotifierBase,
    topic_arn: String,
    region: Option<String>,
    publisher: Arc<dyn SnsPublisher>,
}

impl SnsNotifier {
    /// Builds a notifier publishing through the AWS SDK.
    pub fn new(config: &NotifierConfig, policy: SuppressionPolicy) -> Result<Self, NotifyError> {
        let (topic_arn, region) = parse_settings(config)?;
        let publisher = Arc::new(AwsSnsPublisher::new(
            region
                .clone()
                .or_else(|| region_from_arn(&topic_arn).map(str::to_string)),
        ));
        Ok(Self {
            base: NotifierBase::new(config, policy),
            topic_arn,
            region,
            publisher,
        })
    }

    /// Builds a notifier publishing through `publisher`.
    pub fn with_publisher(
        config: &NotifierConfig,
        policy: SuppressionPolicy,
        publisher: Arc<dyn SnsPublisher>,
    ) -> Result<Self, NotifyError> {
        let (topic_arn, region) = parse_settings(config)?;
        Ok(Self {
            base: NotifierBase::new(config, policy),
            topic_arn,
            region,
            publisher,
        })
    }

    pub fn topic_arn(&self) -> &str {
        &self.topic_arn
    }

    /// The explicitly configured region, if any.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

fn parse_settings(config: &NotifierConfig) -> Result<(String, Option<String>), NotifyError> {
    let topic_arn = config
        .setting("destination")
        .or_else(|| config.setting("url"))
        .ok_or_else(|| NotifyError::validation("Could not find destination property in settings"))?
        .to_string();
    let region = config.setting("region").map(str::to_string);
    Ok((topic_arn, region))
}

/// Extracts the region from `arn:aws:sns:REGION:ACCOUNT:TOPIC`.
pub fn region_from_arn(arn: &str) -> Option<&str> {
    let parts: Vec<&str> = arn.split(':').collect();
    if parts.len() == 6 && parts[0] == "arn" && !parts[3].is_empty() {
        Some(parts[3])
    } else {
        None
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    #[instrument(skip_all, fields(rule_id = ctx.rule_id, notifier = %self.base.name))]
    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError> {
        info!("Executing Amazon SNS notification");

        let message = serde_json::to_string(&alert_payload(ctx))?;
        if let Err(e) = self.publisher.publish(&self.topic_arn, SUBJECT, message).await {
            error!(error = %e, topic = %self.topic_arn, "Failed to publish to SNS topic");
            return Err(e);
        }
        Ok(())
    }
}
