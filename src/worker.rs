use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

use crate::channels::JsonChannelStore;
use crate::ffmpeg::{truncate_log, Ffmpeg};
use crate::notify::Notifier;
use crate::queue::{JobOutcome, JobRecord, JobStatus, TaskQueue};

/// Cap stored error descriptions well under the chat message limit.
const ERROR_CAP: usize = 3500;

/// Telegram bot API upload ceiling, with headroom.
const DELIVERY_SIZE_MB: u64 = 48;

#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &JobRecord, scratch: &Path) -> anyhow::Result<JobOutcome>;
}

/// The single long-lived queue consumer. Jobs execute strictly one at a
/// time, in submission order; every iteration commits a terminal state and
/// removes its scratch directory no matter how the pipeline exited.
pub struct Worker {
    queue: Arc<TaskQueue>,
    runner: Arc<dyn JobRunner>,
    notifier: Notifier,
    ffmpeg: Ffmpeg,
    channels: Arc<JsonChannelStore>,
    work_root: PathBuf,
    output_root: PathBuf,
}

impl Worker {
    pub fn new(
        queue: Arc<TaskQueue>,
        runner: Arc<dyn JobRunner>,
        notifier: Notifier,
        ffmpeg: Ffmpeg,
        channels: Arc<JsonChannelStore>,
        work_root: &Path,
        output_root: &Path,
    ) -> Self {
        Self {
            queue,
            runner,
            notifier,
            ffmpeg,
            channels,
            work_root: work_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
        }
    }

    pub async fn run(self, mut rx: UnboundedReceiver<String>) {
        info!("Worker started");
        while let Some(job_id) = rx.recv().await {
            // Nothing may escape an iteration; an uncaught error here would
            // stall every job behind it.
            if let Err(e) = self.process(&job_id).await {
                error!("Worker iteration failed for {}: {e:#}", job_id);
            }
        }
        info!("Worker stopped");
    }

    async fn process(&self, job_id: &str) -> anyhow::Result<()> {
        let Some(job) = self.queue.mark_running(job_id) else {
            warn!("Dequeued unknown job {}", job_id);
            return Ok(());
        };
        info!("Starting {} job {}", job.params.kind_label(), job.id);
        self.notifier.notify_started(&job).await;

        let scratch = self.work_root.join(format!("scratch_{job_id}"));
        // Scratch setup failing is a job failure like any other; bailing out
        // here would leave the record stuck in Running with no notification.
        let outcome = match std::fs::create_dir_all(&scratch) {
            Ok(()) => match self.runner.run(&job, &scratch).await {
                Ok(out) => self.finalize(&job, out, &scratch).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("failed to create scratch dir {}", scratch.display()))),
        };

        let record = match outcome {
            Ok(out) => {
                if let Some(channel) = &job.channel {
                    // Best-effort counter; a failure never fails the job.
                    if let Err(e) = self.channels.increment_generated(channel) {
                        warn!("Could not bump counter for channel '{channel}': {e:#}");
                    }
                }
                self.queue.complete(job_id, out)
            }
            Err(e) => {
                let reason = truncate_log(&format!("{e:#}"), ERROR_CAP);
                error!("Job {} failed: {}", job_id, reason);
                self.queue.fail(job_id, reason)
            }
        };

        if let Some(record) = record {
            match record.status {
                JobStatus::Completed => self.notifier.notify_completed(&record).await,
                JobStatus::Failed => self.notifier.notify_failed(&record).await,
                _ => {}
            }
        }

        if scratch.exists() {
            if let Err(e) = std::fs::remove_dir_all(&scratch) {
                warn!("Could not remove scratch dir {}: {}", scratch.display(), e);
            }
        }
        Ok(())
    }

    /// Post-generation step: fit the delivery size ceiling, then move the
    /// artifact out of the scratch dir before it is deleted.
    async fn finalize(
        &self,
        job: &JobRecord,
        out: JobOutcome,
        scratch: &Path,
    ) -> anyhow::Result<JobOutcome> {
        let sized = self
            .ffmpeg
            .ensure_delivery_size(&out.video_path, &scratch.join("final_tg.mp4"), DELIVERY_SIZE_MB)
            .await?;

        let dest_dir = self.output_root.join(job.params.kind_label());
        std::fs::create_dir_all(&dest_dir)?;
        let dest = dest_dir.join(format!("{}.mp4", job.id));
        std::fs::copy(&sized, &dest)?;
        info!("Artifact stored at {}", dest.display());

        Ok(JobOutcome {
            video_path: dest,
            caption: out.caption,
        })
    }
}
