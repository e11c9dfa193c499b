mod animation;
mod args;
mod audio;
mod backgrounds;
mod card;
mod channels;
mod ffmpeg;
mod notify;
mod pipeline;
mod queue;
mod story;
mod subtitle;
mod telegram;
mod tts;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::animation::LavfiAnimationProvider;
use crate::args::Args;
use crate::backgrounds::BackgroundStore;
use crate::card::CardRenderer;
use crate::channels::JsonChannelStore;
use crate::ffmpeg::Ffmpeg;
use crate::notify::Notifier;
use crate::pipeline::MediaPipeline;
use crate::queue::TaskQueue;
use crate::story::OpenAiStoryProvider;
use crate::telegram::TelegramApi;
use crate::tts::PiperSynthesizer;
use crate::worker::Worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info") // set to "debug" for more logs
        .init();

    info!("Starting shorts generation bot");

    let args = Args::parse();
    let token = std::env::var("BOT_TOKEN").context("BOT_TOKEN is not set")?;
    let openai_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    if openai_key.is_empty() {
        warn!("OPENAI_API_KEY is not set; story generation will fail");
    }

    let ffmpeg = Ffmpeg::new(&args.ffmpeg, &args.ffprobe);

    let font = match &args.font {
        Some(path) => path.clone(),
        None => CardRenderer::find_system_font()
            .context("no usable font found; pass one with --font")?,
    };
    info!("Using card font {}", font.display());
    let card = Arc::new(CardRenderer::from_font_file(&font)?);

    let story = Arc::new(OpenAiStoryProvider::new(
        &args.openai_base,
        &openai_key,
        &args.model,
        args.prompts.as_deref(),
    ));
    let tts = Arc::new(PiperSynthesizer::new(&args.piper, &args.piper_models));
    let animations = Arc::new(LavfiAnimationProvider::new(ffmpeg.clone()));
    let backgrounds = BackgroundStore::new(&args.assets, ffmpeg.clone());
    let channels = Arc::new(JsonChannelStore::new(&args.channels));

    let pipeline = Arc::new(MediaPipeline::new(
        ffmpeg.clone(),
        story,
        tts,
        animations,
        backgrounds,
        card,
        &args.assets,
    ));

    let api = Arc::new(TelegramApi::new(&token));
    let notifier = Notifier::new(Arc::clone(&api) as Arc<dyn notify::ChatDelivery>);

    let (queue, rx) = TaskQueue::new();
    let queue = Arc::new(queue);

    let worker = Worker::new(
        Arc::clone(&queue),
        pipeline,
        notifier,
        ffmpeg,
        Arc::clone(&channels),
        &args.work_root,
        &args.output,
    );
    tokio::spawn(worker.run(rx));

    info!("Polling for commands");
    let mut offset = 0i64;
    loop {
        let updates = match api.get_updates(offset, args.poll_timeout).await {
            Ok(updates) => updates,
            Err(e) => {
                error!("getUpdates failed: {e:#}");
                sleep(Duration::from_secs(5)).await;
                continue;
            }
        };
        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else { continue };
            let Some(text) = message.text.as_deref() else { continue };
            let chat_id = message.chat.id;

            let reply = handle_command(text, chat_id, &queue, &channels);
            if let Err(e) = api.send_message(chat_id, &reply).await {
                warn!("Failed to reply to chat {}: {e:#}", chat_id);
            }
        }
    }
}

fn handle_command(
    text: &str,
    chat_id: i64,
    queue: &TaskQueue,
    channels: &JsonChannelStore,
) -> String {
    let mut parts = text.split_whitespace();
    let command = parts.next().unwrap_or("");
    let arg = parts.next();

    match command {
        "/start" | "/help" => help_text(),
        "/generate" => match arg {
            None => "Usage: /generate &lt;channel&gt;\nUse /channels to list them.".to_string(),
            Some(name) => match channels.get(name) {
                Err(e) => {
                    error!("Channel lookup failed: {e:#}");
                    "\u{26a0}\u{fe0f} Could not read channel configuration.".to_string()
                }
                Ok(None) => format!(
                    "Unknown channel '{}'. Use /channels to list them.",
                    name
                ),
                Ok(Some(config)) => {
                    let job = queue.submit(
                        chat_id,
                        Some(config.name.clone()),
                        config.job_params(),
                    );
                    let position = queue.position_of(&job.id).unwrap_or(1);
                    format!(
                        "{} <b>Queued for '{}'</b>\n\nJob ID: <code>{}</code>\nQueue position: {}\n\nCheck it with /status {}",
                        job.params.emoji(),
                        config.name,
                        job.id,
                        position,
                        job.id
                    )
                }
            },
        },
        "/status" => match arg {
            None => "Usage: /status &lt;job_id&gt;".to_string(),
            Some(job_id) => match queue.get(job_id) {
                None => format!("No job with ID <code>{}</code>.", job_id),
                Some(job) => {
                    let mut lines = format!(
                        "Job <code>{}</code>\nStatus: <b>{}</b>",
                        job.id,
                        job.status.as_str()
                    );
                    if let Some(pos) = queue.position_of(&job.id) {
                        lines.push_str(&format!("\nQueue position: {pos}"));
                    }
                    if let Some(err) = &job.error {
                        let short: String = err.chars().take(200).collect();
                        lines.push_str(&format!("\nError: <code>{short}</code>"));
                    }
                    lines
                }
            },
        },
        "/jobs" => {
            let jobs = queue.list_for(chat_id, None);
            if jobs.is_empty() {
                return "You have no jobs yet. Start one with /generate.".to_string();
            }
            let mut out = String::from("<b>Your jobs</b> (newest first):\n");
            for job in jobs.iter().take(10) {
                out.push_str(&format!(
                    "\n<code>{}</code> \u{2014} {} ({})",
                    job.id,
                    job.params.kind_label(),
                    job.status.as_str()
                ));
            }
            out
        }
        "/queue" => {
            let stats = queue.stats();
            format!(
                "<b>Queue</b>\nPending: {}\nRunning: {}\nCompleted: {}\nFailed: {}",
                stats.pending, stats.running, stats.completed, stats.failed
            )
        }
        "/channels" => match channels.list() {
            Err(e) => {
                error!("Channel listing failed: {e:#}");
                "\u{26a0}\u{fe0f} Could not read channel configurations.".to_string()
            }
            Ok(list) if list.is_empty() => {
                "No channels configured yet. Add them to the channels file.".to_string()
            }
            Ok(list) => {
                let mut out = String::from("<b>Channels</b>:\n");
                for channel in list {
                    out.push_str(&format!(
                        "\n<code>{}</code> \u{2014} {} videos generated",
                        channel.name, channel.generated_total
                    ));
                }
                out
            }
        },
        _ => help_text(),
    }
}

fn help_text() -> String {
    [
        "<b>Shorts generation bot</b>",
        "",
        "/generate &lt;channel&gt; \u{2014} queue a video for a channel",
        "/status &lt;job_id&gt; \u{2014} check one job",
        "/jobs \u{2014} your recent jobs",
        "/queue \u{2014} queue totals",
        "/channels \u{2014} configured channels",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::JobParams;

    fn fixtures() -> (Arc<TaskQueue>, JsonChannelStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonChannelStore::new(&dir.path().join("channels.json"));
        // Receiver dropped: jobs are recorded but never picked up, which is
        // exactly what command handling tests want.
        let (queue, _rx) = TaskQueue::new();
        (Arc::new(queue), store, dir)
    }

    #[test]
    fn generate_requires_known_channel() {
        let (queue, store, _dir) = fixtures();
        let reply = handle_command("/generate nope", 1, &queue, &store);
        assert!(reply.contains("Unknown channel 'nope'"));
        assert_eq!(queue.stats().total, 0);
    }

    #[test]
    fn generate_queues_and_reports_position() {
        let (queue, store, _dir) = fixtures();
        store
            .upsert(crate::channels::ChannelConfig {
                name: "main".into(),
                language: "en".into(),
                story_kind: crate::queue::StoryKind::LifeStory,
                prompt_preset: "default".into(),
                voice: None,
                voice_name: None,
                speech_speed: 1.0,
                background: crate::queue::BackgroundMode::Animation,
                fps: 24,
                target_sec: 60,
                subs_lang: None,
                cuts: None,
                banner: None,
                generated_total: 0,
            })
            .unwrap();

        let reply = handle_command("/generate main", 42, &queue, &store);
        assert!(reply.contains("Queued for 'main'"));
        assert!(reply.contains("Queue position: 1"));
        assert_eq!(queue.stats().pending, 1);

        let job = &queue.list_for(42, None)[0];
        assert!(matches!(job.params, JobParams::NarratedStory { .. }));
        assert_eq!(job.channel.as_deref(), Some("main"));
    }

    #[test]
    fn status_reports_state_and_unknown_ids() {
        let (queue, store, _dir) = fixtures();
        let job = queue.submit(
            5,
            None,
            JobParams::ClipExtraction {
                kind: "cartoons".into(),
                collection: "classics".into(),
                min_sec: 30,
                max_sec: 60,
                banner: None,
            },
        );

        let reply = handle_command(&format!("/status {}", job.id), 5, &queue, &store);
        assert!(reply.contains("pending"));
        assert!(reply.contains("Queue position: 1"));

        let reply = handle_command("/status job_0_999", 5, &queue, &store);
        assert!(reply.contains("No job"));
    }

    #[test]
    fn jobs_lists_only_the_callers_jobs() {
        let (queue, store, _dir) = fixtures();
        queue.submit(
            1,
            None,
            JobParams::ClipExtraction {
                kind: "cartoons".into(),
                collection: "classics".into(),
                min_sec: 30,
                max_sec: 60,
                banner: None,
            },
        );
        let mine = handle_command("/jobs", 1, &queue, &store);
        assert!(mine.contains("cuts"));
        let theirs = handle_command("/jobs", 2, &queue, &store);
        assert!(theirs.contains("no jobs"));
    }

    #[test]
    fn unknown_commands_fall_back_to_help() {
        let (queue, store, _dir) = fixtures();
        let reply = handle_command("/frobnicate", 1, &queue, &store);
        assert!(reply.contains("/generate"));
    }
}
