use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Telegram `sendMessage` text limit (UTF-8 characters).
pub const MESSAGE_LIMIT: usize = 4096;

pub fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let truncated: String = text.chars().take(limit.saturating_sub(3)).collect();
    format!("{truncated}...")
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiReply<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramApi {
    client: reqwest::Client,
    token: String,
}

impl TelegramApi {
    pub fn new(token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.to_string(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.token, method)
    }

    fn check<T>(reply: ApiReply<T>, method: &str) -> anyhow::Result<T> {
        if !reply.ok {
            anyhow::bail!(
                "telegram {} failed: {}",
                method,
                reply.description.unwrap_or_else(|| "unknown error".into())
            );
        }
        reply
            .result
            .with_context(|| format!("telegram {} returned no result", method))
    }

    pub async fn get_updates(&self, offset: i64, timeout_sec: u64) -> anyhow::Result<Vec<Update>> {
        let reply: ApiReply<Vec<Update>> = self
            .client
            .get(self.url("getUpdates"))
            .query(&[("offset", offset.to_string()), ("timeout", timeout_sec.to_string())])
            .timeout(std::time::Duration::from_secs(timeout_sec + 15))
            .send()
            .await
            .context("getUpdates request failed")?
            .json()
            .await
            .context("getUpdates returned malformed JSON")?;
        Self::check(reply, "getUpdates")
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        debug!("Sending message to chat {}", chat_id);
        let reply: ApiReply<serde_json::Value> = self
            .client
            .post(self.url("sendMessage"))
            .json(&json!({
                "chat_id": chat_id,
                "text": truncate_message(text, MESSAGE_LIMIT),
                "parse_mode": "HTML",
            }))
            .send()
            .await
            .context("sendMessage request failed")?
            .json()
            .await
            .context("sendMessage returned malformed JSON")?;
        Self::check(reply, "sendMessage").map(|_| ())
    }

    pub async fn send_video(
        &self,
        chat_id: i64,
        video: &Path,
        caption: &str,
    ) -> anyhow::Result<()> {
        debug!("Uploading {} to chat {}", video.display(), chat_id);
        let bytes = tokio::fs::read(video)
            .await
            .with_context(|| format!("failed to read {}", video.display()))?;
        let file_name = video
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video.mp4")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", truncate_message(caption, 1024))
            .text("parse_mode", "HTML")
            .text("supports_streaming", "true")
            .part(
                "video",
                reqwest::multipart::Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str("video/mp4")?,
            );

        let reply: ApiReply<serde_json::Value> = self
            .client
            .post(self.url("sendVideo"))
            .multipart(form)
            .send()
            .await
            .context("sendVideo request failed")?
            .json()
            .await
            .context("sendVideo returned malformed JSON")?;
        Self::check(reply, "sendVideo").map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_truncated_to_the_limit() {
        let long = "a".repeat(5000);
        let cut = truncate_message(&long, MESSAGE_LIMIT);
        assert_eq!(cut.chars().count(), MESSAGE_LIMIT);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_message("hi", MESSAGE_LIMIT), "hi");
    }

    #[test]
    fn update_payload_parses() {
        let raw = r#"{"update_id": 5, "message": {"chat": {"id": 42}, "text": "/generate main"}}"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert_eq!(update.update_id, 5);
        assert_eq!(update.message.unwrap().chat.id, 42);
    }
}
