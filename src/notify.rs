use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::queue::JobRecord;
use crate::telegram::TelegramApi;

#[async_trait]
pub trait ChatDelivery: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<()>;
    async fn send_video(&self, chat_id: i64, video: &Path, caption: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl ChatDelivery for TelegramApi {
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.send_message(chat_id, text).await
    }

    async fn send_video(&self, chat_id: i64, video: &Path, caption: &str) -> anyhow::Result<()> {
        TelegramApi::send_video(self, chat_id, video, caption).await
    }
}

/// Progress/outcome messages back to the requester. Every send is
/// best-effort: a delivery failure is logged and never surfaced to the
/// worker, which has already committed the job's terminal state.
#[derive(Clone)]
pub struct Notifier {
    delivery: Arc<dyn ChatDelivery>,
}

impl Notifier {
    pub fn new(delivery: Arc<dyn ChatDelivery>) -> Self {
        Self { delivery }
    }

    pub async fn notify_started(&self, job: &JobRecord) {
        let text = format!(
            "{} <b>Video generation started</b>\n\nJob ID: <code>{}</code>\n\u{23f3} This takes a minute or two...",
            job.params.emoji(),
            job.id
        );
        if let Err(e) = self.delivery.send_text(job.requester, &text).await {
            warn!("Failed to send start notification for {}: {e:#}", job.id);
        }
    }

    pub async fn notify_completed(&self, job: &JobRecord) {
        let Some(result) = &job.result else {
            warn!("Completed job {} has no result to deliver", job.id);
            return;
        };
        if let Err(e) = self
            .delivery
            .send_video(job.requester, &result.video_path, &result.caption)
            .await
        {
            warn!("Failed to send video for {}: {e:#}", job.id);
            // Fall back to a plain text notice so the user still hears back.
            let text = format!("\u{2705} Video is ready!\nJob ID: <code>{}</code>", job.id);
            if let Err(e) = self.delivery.send_text(job.requester, &text).await {
                warn!("Failed to send completion fallback for {}: {e:#}", job.id);
            }
        }
    }

    pub async fn notify_failed(&self, job: &JobRecord) {
        let reason: String = job
            .error
            .as_deref()
            .unwrap_or("unknown error")
            .chars()
            .take(200)
            .collect();
        let text = format!(
            "\u{26a0}\u{fe0f} <b>Video generation failed</b>\n\nJob ID: <code>{}</code>\nError: <code>{}</code>\n\nSend the command again to retry.",
            job.id, reason
        );
        if let Err(e) = self.delivery.send_text(job.requester, &text).await {
            warn!("Failed to send failure notification for {}: {e:#}", job.id);
        }
    }
}
