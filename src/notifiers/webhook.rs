//! Generic HTTP webhook notifier.

use super::alert_payload;
use crate::core::{EvalContext, Notifier, NotifierBase, NotifierConfig};
use crate::error::NotifyError;
use crate::registry::{NotifierPlugin, SettingDescriptor};
use crate::suppression::SuppressionPolicy;
use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, warn};

pub const TYPE: &str = "webhook";

const SETTINGS: &[SettingDescriptor] = &[
    SettingDescriptor {
        key: "url",
        label: "Url",
        placeholder: "https://example.com/alerts",
        required: true,
    },
    SettingDescriptor {
        key: "httpMethod",
        label: "Http Method",
        placeholder: "POST",
        required: false,
    },
    SettingDescriptor {
        key: "username",
        label: "Username",
        placeholder: "",
        required: false,
    },
    SettingDescriptor {
        key: "password",
        label: "Password",
        placeholder: "",
        required: false,
    },
];

pub fn plugin() -> NotifierPlugin {
    NotifierPlugin {
        kind: TYPE,
        name: "Webhook",
        description: "Sends HTTP POST or PUT requests to a URL",
        settings: SETTINGS,
        factory: build,
    }
}

fn build(config: &NotifierConfig, policy: SuppressionPolicy) -> Result<Arc<dyn Notifier>, NotifyError> {
    let notifier = WebhookNotifier::new(config, policy)?;
    Ok(Arc::new(notifier))
}

pub struct WebhookNotifier {
    base: NotifierBase,
    url: String,
    method: Method,
    credentials: Option<(String, String)>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(config: &NotifierConfig, policy: SuppressionPolicy) -> Result<Self, NotifyError> {
        let url = config
            .setting("url")
            .ok_or_else(|| NotifyError::validation("Could not find url property in settings"))?
            .to_string();

        let method = match config.setting("httpMethod").map(str::to_ascii_uppercase) {
            None => Method::POST,
            Some(m) if m == "POST" => Method::POST,
            Some(m) if m == "PUT" => Method::PUT,
            Some(other) => {
                return Err(NotifyError::validation(format!(
                    "unsupported httpMethod '{}', expected POST or PUT",
                    other
                )))
            }
        };

        let credentials = config
            .setting("username")
            .map(|user| (user.to_string(), config.setting("password").unwrap_or_default().to_string()));

        Ok(Self {
            base: NotifierBase::new(config, policy),
            url,
            method,
            credentials,
            client: reqwest::Client::new(),
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError> {
        debug!(channel = "webhook", rule_id = ctx.rule_id, url = %self.url, "Sending notification");

        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .json(&alert_payload(ctx));
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await?;
        if response.status().is_success() {
            debug!(channel = "webhook", "Notification sent successfully");
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(
            channel = "webhook",
            status = %status,
            body = %body,
            "Webhook request failed"
        );
        Err(NotifyError::Transport(format!("webhook returned {status}: {body}")))
    }
}
