use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info, instrument};

use crate::Target;
use crate::config::{Alert, Webhook};
use crate::discord::{DiscordManager, MessageBuilder};
use crate::monitors::resources::AlertCandidate;
use crate::storage::Severity;

/// Upper bound for one outbound notification request
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends newly raised alerts to the configured destination
#[derive(Debug, Clone)]
pub struct AlertManager {
    client: Client,
    alert_config: Alert,
    discord_manager: DiscordManager,
}

impl AlertManager {
    pub fn new(alert_config: Alert) -> reqwest::Result<Self> {
        Self::with_timeout(alert_config, NOTIFY_TIMEOUT)
    }

    /// Every request, including connecting, gives up after `timeout`
    pub fn with_timeout(alert_config: Alert, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            discord_manager: DiscordManager::new(client.clone()),
            client,
            alert_config,
        })
    }

    #[instrument(skip_all, fields(target = %target.name, kind = %candidate.kind))]
    pub async fn send_alert(&self, target: &Target, candidate: &AlertCandidate) {
        match &self.alert_config {
            Alert::Discord(discord) => {
                let embed = self.discord_manager.build_alert_embed(target, candidate);
                let mut message_builder = MessageBuilder::new().add_embed(embed);
                if let Some(user_id) = &discord.user_id {
                    message_builder = message_builder.content(format!(
                        "{} ({} ~ {:.1}%) <@{user_id}>",
                        severity_emoji(candidate.severity),
                        target.display(),
                        candidate.value
                    ));
                }

                self.discord_manager
                    .send_message(discord, &message_builder.build())
                    .await;
            }
            Alert::Webhook(webhook) => {
                let message = format_message(target, candidate);
                self.send_webhook_alert(webhook, target, candidate, &message)
                    .await;
            }
        }
    }

    #[instrument(skip_all)]
    async fn send_webhook_alert(
        &self,
        webhook: &Webhook,
        target: &Target,
        candidate: &AlertCandidate,
        message: &str,
    ) {
        let payload = json!({
            "message": message,
            "target": target.display(),
            "type": candidate.kind,
            "severity": candidate.severity,
            "timestamp": Utc::now().to_rfc3339()
        });

        match self.client.post(&webhook.url).json(&payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent webhook alert");
                } else {
                    error!("Webhook alert failed with status: {}", response.status());
                }
            }
            Err(e) => {
                error!("Failed to send webhook alert: {}", e);
            }
        }
    }
}

fn severity_emoji(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "🔥",
        Severity::Warning => "⚠️",
    }
}

fn format_message(target: &Target, candidate: &AlertCandidate) -> String {
    let level = match candidate.severity {
        Severity::Critical => "Critical",
        Severity::Warning => "Warning",
    };
    format!(
        "{} **{} {} Alert**: Target `{}`: {}",
        severity_emoji(candidate.severity),
        level,
        candidate.kind.label(),
        target.display(),
        candidate.message
    )
}
