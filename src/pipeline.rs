use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use tracing::info;

use crate::animation::AnimationProvider;
use crate::audio;
use crate::backgrounds::{cut_window, BackgroundStore};
use crate::card::{CardRenderer, CardTheme};
use crate::ffmpeg::Ffmpeg;
use crate::queue::{BackgroundMode, BannerConfig, JobOutcome, JobParams, JobRecord, StoryKind};
use crate::story::{split_title_body, StoryTextProvider};
use crate::subtitle::build_srt_by_text_length;
use crate::tts::{clamp_speed, SpeechSynthesizer};
use crate::worker::JobRunner;

pub struct MediaPipeline {
    ffmpeg: Ffmpeg,
    story: Arc<dyn StoryTextProvider>,
    tts: Arc<dyn SpeechSynthesizer>,
    animations: Arc<dyn AnimationProvider>,
    backgrounds: BackgroundStore,
    card: Arc<CardRenderer>,
    assets_root: PathBuf,
}

impl MediaPipeline {
    pub fn new(
        ffmpeg: Ffmpeg,
        story: Arc<dyn StoryTextProvider>,
        tts: Arc<dyn SpeechSynthesizer>,
        animations: Arc<dyn AnimationProvider>,
        backgrounds: BackgroundStore,
        card: Arc<CardRenderer>,
        assets_root: &Path,
    ) -> Self {
        Self {
            ffmpeg,
            story,
            tts,
            animations,
            backgrounds,
            card,
            assets_root: assets_root.to_path_buf(),
        }
    }

    async fn run_cuts(
        &self,
        kind: &str,
        collection: &str,
        min_sec: u32,
        max_sec: u32,
        banner: Option<&BannerConfig>,
        scratch: &Path,
    ) -> anyhow::Result<JobOutcome> {
        let videos = self.backgrounds.collection_videos(kind, collection);
        if videos.is_empty() {
            anyhow::bail!(
                "No source videos in collection '{}'. Upload clips or pick another collection in the channel settings.",
                collection
            );
        }

        let src = {
            let mut rng = rand::rng();
            videos.choose(&mut rng).cloned().unwrap()
        };
        let picked = src
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("source")
            .to_string();
        info!("Cutting from {} ({} candidates)", picked, videos.len());

        let total = self.ffmpeg.probe_duration(&src).await?;
        let (start, seg) = {
            let mut rng = rand::rng();
            cut_window(total, min_sec, max_sec, &mut rng)
        };
        info!("Segment window: start {:.1}s, length {:.0}s of {:.1}s", start, seg, total);

        let segment = scratch.join("cut_source.mp4");
        self.ffmpeg
            .cut_segment_copy(&src, start, seg, &segment)
            .await?;

        let banner_arg = banner.map(|b| {
            (
                self.assets_root.join("banners").join("cuts").join(&b.file),
                b.position,
            )
        });
        let final_path = scratch.join("cut_final_1080x1920.mp4");
        self.ffmpeg
            .compose_vertical_blur(
                &segment,
                banner_arg.as_ref().map(|(p, pos)| (p.as_path(), *pos)),
                &final_path,
            )
            .await?;

        Ok(JobOutcome {
            video_path: final_path,
            caption: cuts_caption(collection, &picked, seg),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_story(
        &self,
        kind: StoryKind,
        language: &str,
        target_sec: u32,
        preset: &str,
        voice: Option<&str>,
        voice_name: Option<&str>,
        speed: f64,
        background: BackgroundMode,
        fps: u32,
        subs_lang: Option<&str>,
        scratch: &Path,
    ) -> anyhow::Result<JobOutcome> {
        // 1) Narration text; the title-on-first-line convention comes from
        // the provider contract.
        let text = self.story.generate(preset, language, target_sec).await?;
        let (title, body) = split_title_body(&text);
        let tts_text = format!("{title}. {body}");

        // 2) Speech first: the measured audio duration drives every later
        // stage, the requested duration is only a hint to the text model.
        let audio_path = scratch.join("voice.wav");
        self.tts
            .synthesize(&tts_text, voice, language, clamp_speed(speed), &audio_path)
            .await?;
        let measured = match audio::wav_duration_seconds(&audio_path) {
            Ok(d) => d,
            Err(_) => self.ffmpeg.probe_duration(&audio_path).await?,
        };
        let dur = measured.max(1.0);
        info!("Narration measured at {:.2}s", dur);

        // 3) Card frames timed to the measured duration.
        let frames_dir = scratch.join("frames");
        let frames = {
            let card = Arc::clone(&self.card);
            let (dir, title, body) = (frames_dir.clone(), title.clone(), body.clone());
            tokio::task::spawn_blocking(move || {
                card.render_frames(&dir, &title, &body, fps, dur, &CardTheme::default())
            })
            .await??
        };
        info!("Rendered {} overlay frames", frames);

        // 4) Background visual for the same duration.
        let bg_clip = match background {
            BackgroundMode::StockVideo => {
                self.backgrounds.random_segment(dur, scratch, "story").await?
            }
            BackgroundMode::Animation => {
                self.animations
                    .render(None, dur + 1.0, &scratch.join("animation_bg.mp4"))
                    .await?
            }
        };

        // 5) Composition per background mode.
        let pattern = frames_dir.join("frame_%05d.png").display().to_string();
        let composed = scratch.join("composed.mp4");
        match background {
            BackgroundMode::StockVideo => {
                self.ffmpeg
                    .compose_card_over_blur(&bg_clip, &pattern, dur, fps, &composed)
                    .await?
            }
            BackgroundMode::Animation => {
                self.ffmpeg
                    .compose_card_over_animation(&bg_clip, &pattern, dur, fps, &composed)
                    .await?
            }
        }

        // 6) Optional subtitles + final mux.
        let srt_path = match subs_lang {
            Some(_) => {
                let path = scratch.join("subs.srt");
                build_srt_by_text_length(&tts_text, dur, &path)?;
                Some(path)
            }
            None => None,
        };

        let final_path = scratch.join("final.mp4");
        self.ffmpeg
            .mux_av_with_optional_subs(
                &composed,
                &audio_path,
                srt_path.as_deref(),
                Some(&title),
                &final_path,
            )
            .await?;

        Ok(JobOutcome {
            video_path: final_path,
            caption: story_caption(kind, language, voice_name, &title),
        })
    }
}

#[async_trait]
impl JobRunner for MediaPipeline {
    async fn run(&self, job: &JobRecord, scratch: &Path) -> anyhow::Result<JobOutcome> {
        match &job.params {
            JobParams::ClipExtraction {
                kind,
                collection,
                min_sec,
                max_sec,
                banner,
            } => {
                self.run_cuts(kind, collection, *min_sec, *max_sec, banner.as_ref(), scratch)
                    .await
            }
            JobParams::NarratedStory {
                kind,
                language,
                target_sec,
                preset,
                voice,
                voice_name,
                speed,
                background,
                fps,
                subs_lang,
            } => {
                self.run_story(
                    *kind,
                    language,
                    *target_sec,
                    preset,
                    voice.as_deref(),
                    voice_name.as_deref(),
                    *speed,
                    *background,
                    *fps,
                    subs_lang.as_deref(),
                    scratch,
                )
                .await
            }
        }
    }
}

fn cuts_caption(collection: &str, picked: &str, seg: f64) -> String {
    format!(
        "\u{2702}\u{fe0f} <b>Cut is ready!</b>\n\nCollection: {}\nSource: {}\nDuration: {}s",
        collection, picked, seg as u64
    )
}

fn story_caption(kind: StoryKind, language: &str, voice_name: Option<&str>, title: &str) -> String {
    format!(
        "{} <b>{}</b>\n\u{1f310} {} | \u{1f3a4} {}\n\n{}",
        kind.emoji(),
        kind.label(),
        language.to_uppercase(),
        voice_name.unwrap_or("Default"),
        title
    )
}
