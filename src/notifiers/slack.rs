//! A notifier that posts to a Slack incoming webhook.

use crate::core::{EvalContext, Notifier, NotifierBase, NotifierConfig};
use crate::error::NotifyError;
use crate::formatting::{SlackTextFormatter, TextFormatter};
use crate::registry::{NotifierPlugin, SettingDescriptor};
use crate::suppression::SuppressionPolicy;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

pub const TYPE: &str = "slack";

const SETTINGS: &[SettingDescriptor] = &[
    SettingDescriptor {
        key: "url",
        label: "Webhook URL",
        placeholder: "https://hooks.slack.com/services/...",
        required: true,
    },
    SettingDescriptor {
        key: "recipient",
        label: "Recipient",
        placeholder: "#alerts",
        required: false,
    },
    SettingDescriptor {
        key: "mention",
        label: "Mention",
        placeholder: "@channel",
        required: false,
    },
];

pub fn plugin() -> NotifierPlugin {
    NotifierPlugin {
        kind: TYPE,
        name: "Slack",
        description: "Sends notifications to a Slack incoming webhook",
        settings: SETTINGS,
        factory: build,
    }
}

fn build(config: &NotifierConfig, policy: SuppressionPolicy) -> Result<Arc<dyn Notifier>, NotifyError> {
    let notifier = SlackNotifier::new(config, policy)?;
    Ok(Arc::new(notifier))
}

/// A client for sending messages to a Slack webhook.
pub struct SlackNotifier {
    base: NotifierBase,
    webhook_url: String,
    recipient: Option<String>,
    formatter: Box<dyn TextFormatter>,
    client: reqwest::Client,
}

impl SlackNotifier {
    /// Creates a new `SlackNotifier`.
    pub fn new(config: &NotifierConfig, policy: SuppressionPolicy) -> Result<Self, NotifyError> {
        Self::with_timeout(config, policy, Duration::from_secs(10))
    }

    /// Creates a new `SlackNotifier` whose HTTP requests give up after `timeout`.
    pub fn with_timeout(
        config: &NotifierConfig,
        policy: SuppressionPolicy,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let webhook_url = config
            .setting("url")
            .ok_or_else(|| NotifyError::validation("Could not find url property in settings"))?
            .to_string();
        let formatter = SlackTextFormatter {
            mention: config.setting("mention").map(str::to_string),
        };
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::validation(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base: NotifierBase::new(config, policy),
            webhook_url,
            recipient: config.setting("recipient").map(str::to_string),
            formatter: Box::new(formatter),
            client,
        })
    }

    fn payload(&self, ctx: &EvalContext) -> Value {
        let mut payload = json!({ "text": self.formatter.format(ctx) });
        if let Some(recipient) = &self.recipient {
            payload["channel"] = Value::String(recipient.clone());
        }
        payload
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    /// Formats and sends the evaluation to the configured Slack webhook.
    #[instrument(skip_all, fields(rule_id = ctx.rule_id, notifier = %self.base.name))]
    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError> {
        info!("Sending Slack notification.");
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&self.payload(ctx))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP request to Slack failed");
                NotifyError::from(e)
            })?;

        if response.status().is_success() {
            info!("Successfully sent notification to Slack.");
            Ok(())
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(
                status = %status,
                body = %text,
                "Failed to send Slack notification"
            );
            Err(NotifyError::Transport(format!(
                "Slack returned status {}, body: {}",
                status, text
            )))
        }
    }
}

#[cfg(test)]
mod slack_notifier_tests {
    use super::*;
    use crate::core::AlertState;
    use std::collections::HashMap;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_config(url: &str, extra: &[(&str, &str)]) -> NotifierConfig {
        let mut settings = HashMap::from([("url".to_string(), url.to_string())]);
        for (k, v) in extra {
            settings.insert(k.to_string(), v.to_string());
        }
        NotifierConfig {
            id: 9,
            kind: TYPE.to_string(),
            name: "slack-ops".to_string(),
            is_default: false,
            enabled: true,
            settings,
        }
    }

    #[tokio::test]
    async fn test_slack_notifier_send_success() {
        // Arrange
        let server = MockServer::start().await;
        let ctx = EvalContext::new(42, "cpu-high", AlertState::Alerting);
        let expected_body = json!({
            "text": SlackTextFormatter::default().format(&ctx),
            "channel": "#alerts",
        });

        Mock::given(method("POST"))
            .and(path("/webhook"))
            .and(body_json(&expected_body))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = create_config(&format!("{}/webhook", server.uri()), &[("recipient", "#alerts")]);
        let notifier = SlackNotifier::new(&config, SuppressionPolicy::default()).unwrap();

        // Act
        let result = notifier.notify(&ctx).await;

        // Assert
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_slack_notifier_handles_server_error() {
        // Arrange
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = create_config(&format!("{}/webhook", server.uri()), &[]);
        let notifier = SlackNotifier::new(&config, SuppressionPolicy::default()).unwrap();

        // Act
        let result = notifier
            .notify(&EvalContext::new(1, "r", AlertState::Alerting))
            .await;

        // Assert
        assert!(matches!(result, Err(NotifyError::Transport(_))));
    }

    #[tokio::test]
    async fn test_slack_notifier_handles_timeout() {
        // Arrange
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let config = create_config(&format!("{}/webhook", server.uri()), &[]);
        let notifier = SlackNotifier::with_timeout(
            &config,
            SuppressionPolicy::default(),
            Duration::from_millis(200),
        )
        .unwrap();

        // Act
        let result = notifier
            .notify(&EvalContext::new(1, "r", AlertState::Alerting))
            .await;

        // Assert
        assert!(matches!(result, Err(NotifyError::Transport(_))));
    }

    #[test]
    fn test_missing_url_fails_validation() {
        let mut config = create_config("", &[]);
        config.settings.clear();
        let result = SlackNotifier::new(&config, SuppressionPolicy::default());
        assert!(matches!(result, Err(NotifyError::Validation { .. })));
    }
}
