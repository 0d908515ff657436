use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Serialize;

use super::{Notification, Notifier};
use crate::error::NotifyError;
use crate::ingest::retry::{with_retries_when, RetryPolicy};

const DESCRIPTION_MAX_CHARS: usize = 50;
const EMBED_COLOR: u32 = 0x3498db;
const PERIOD_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::new(2, Duration::from_millis(500)),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry.max_retries = retries;
        self
    }

    async fn post_once(
        &self,
        payload: &DiscordWebhookPayload,
        attachment: Option<&(String, Vec<u8>)>,
    ) -> Result<(), NotifyError> {
        let req = self.client.post(&self.webhook).timeout(self.timeout);
        let req = match attachment {
            None => req.json(payload),
            Some((filename, bytes)) => {
                let json = serde_json::to_string(payload)
                    .map_err(|e| NotifyError::Transport(format!("encode payload: {e}")))?;
                let file = Part::bytes(bytes.clone())
                    .file_name(filename.clone())
                    .mime_str("image/png")
                    .map_err(|e| NotifyError::Transport(e.to_string()))?;
                req.multipart(Form::new().text("payload_json", json).part("files[0]", file))
            }
        };

        let rsp = req
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        let status = rsp.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        let attachment = match &n.artifact {
            Some(path) => match read_attachment(path).await {
                Ok(a) => Some(a),
                Err(e) => {
                    tracing::warn!(
                        target: "notify",
                        feed = n.feed.as_str(),
                        item_id = %n.item.id,
                        error = %e,
                        "sending without image"
                    );
                    None
                }
            },
            None => None,
        };
        let payload = build_payload(n, attachment.as_ref().map(|(name, _)| name.as_str()));

        with_retries_when(
            &self.retry,
            "discord webhook",
            NotifyError::is_retryable,
            |_| self.post_once(&payload, attachment.as_ref()),
        )
        .await?;

        tracing::info!(
            target: "notify",
            feed = n.feed.as_str(),
            item_id = %n.item.id,
            "discord notification sent"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

async fn read_attachment(path: &Path) -> Result<(String, Vec<u8>), NotifyError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| NotifyError::Attachment {
            path: path.to_path_buf(),
            source,
        })?;
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact.png".to_string());
    Ok((name, bytes))
}

pub(crate) fn truncate_description(body: &str) -> String {
    if body.chars().count() > DESCRIPTION_MAX_CHARS {
        let head: String = body.chars().take(DESCRIPTION_MAX_CHARS).collect();
        format!("{head}...")
    } else {
        body.to_string()
    }
}

fn build_payload(n: &Notification, attachment_name: Option<&str>) -> DiscordWebhookPayload {
    let mut fields = vec![EmbedField {
        name: "Link".to_string(),
        value: format!("[View post]({})", n.item_url),
        inline: false,
    }];
    if !n.item.published_at.is_empty() {
        fields.push(EmbedField {
            name: "Date".to_string(),
            value: n.item.published_at.clone(),
            inline: true,
        });
    }
    if let Some(period) = &n.item.period {
        fields.push(EmbedField {
            name: "Starts".to_string(),
            value: format!("**{}**", period.starts_at.format(PERIOD_FORMAT)),
            inline: true,
        });
        fields.push(EmbedField {
            name: "Ends".to_string(),
            value: format!("**{}**", period.ends_at.format(PERIOD_FORMAT)),
            inline: true,
        });
    }
    fields.push(EmbedField {
        name: "Board".to_string(),
        value: n.feed_url.clone(),
        inline: true,
    });

    DiscordWebhookPayload {
        content: None,
        embeds: vec![DiscordEmbed {
            title: format!("[New {}] {}", n.category, n.item.title),
            description: truncate_description(n.item.body.as_deref().unwrap_or_default()),
            url: Some(n.item_url.clone()),
            color: EMBED_COLOR,
            fields,
            image: attachment_name.map(|name| EmbedImage {
                url: format!("attachment://{name}"),
            }),
        }],
    }
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct EmbedImage {
    url: String,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    color: u32,
    fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedImage>,
}

#[derive(Debug, Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}
