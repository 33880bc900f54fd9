use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::Target;
use crate::config::Discord;
use crate::monitors::resources::AlertCandidate;
use crate::storage::Severity;

const COLOR_RED: u32 = 15158332;
const COLOR_ORANGE: u32 = 15105570;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscordManager {
    client: Client,
}

impl DiscordManager {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn build_alert_embed(&self, target: &Target, candidate: &AlertCandidate) -> Embed {
        let label = candidate.kind.label();
        let (title, color) = match candidate.severity {
            Severity::Critical => (format!("🔥 Critical {label} Alert"), COLOR_RED),
            Severity::Warning => (format!("⚠️ {label} Warning"), COLOR_ORANGE),
        };

        Embed {
            title: Some(title),
            description: Some(format!(
                "Target **{}**: {}",
                target.name, candidate.message
            )),
            color: Some(color),
            fields: vec![
                EmbedField {
                    name: format!("📈 Current {label} Usage"),
                    value: format!("{:.1}%", candidate.value),
                    inline: true,
                },
                EmbedField {
                    name: "⚠️ Threshold".to_string(),
                    value: format!("{}%", candidate.threshold),
                    inline: true,
                },
                EmbedField {
                    name: "📊 Status".to_string(),
                    value: self.create_progress_bar(candidate.value, candidate.threshold as f32),
                    inline: false,
                },
            ],
            footer: Some(EmbedFooter {
                text: format!("Target: {} | {}", target.name, target.address),
            }),
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }

    fn create_progress_bar(&self, current: f32, limit: f32) -> String {
        let percentage = (current / limit) * 100.0;
        let filled = ((current / limit) * 10.0) as usize;
        let empty = 10 - filled.min(10);

        let bar = "█".repeat(filled.min(10)) + &"░".repeat(empty);
        let status_emoji = if percentage >= 100.0 {
            "🔴"
        } else if percentage >= 80.0 {
            "🟠"
        } else {
            "🟢"
        };

        format!("{} `{}` {:.1}% of threshold", status_emoji, bar, percentage)
    }

    #[instrument(skip(self, discord, message))]
    pub async fn send_message(&self, discord: &Discord, message: &Message) {
        match self.client.post(&discord.url).json(message).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent Discord message");
                } else {
                    error!("Discord message failed with status: {}", response.status());
                    if let Ok(error_text) = response.text().await {
                        error!("Discord API error response: {}", error_text);
                    }
                }
            }
            Err(e) => {
                error!("Failed to send Discord message: {}", e);
            }
        }
    }
}
