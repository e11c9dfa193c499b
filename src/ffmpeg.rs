use std::ffi::OsStr;
use std::path::Path;

use anyhow::Context;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::queue::BannerPosition;

const LOG_CAP: usize = 6000;

pub fn truncate_log(log: &str, cap: usize) -> String {
    if log.len() <= cap {
        return log.to_string();
    }
    let mut end = cap;
    while !log.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &log[..end])
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
}

impl Ffmpeg {
    pub fn new(ffmpeg_bin: &str, ffprobe_bin: &str) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.to_string(),
            ffprobe_bin: ffprobe_bin.to_string(),
        }
    }

    async fn run<S: AsRef<OsStr>>(&self, bin: &str, args: &[S]) -> anyhow::Result<String> {
        let shown: Vec<String> = args
            .iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .collect();
        debug!("Running {} {}", bin, shown.join(" "));

        let output = Command::new(bin)
            .args(args)
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", bin))?;

        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            anyhow::bail!(
                "transcoder failed. CMD: {} {}\nLOG:\n{}",
                bin,
                shown.join(" "),
                truncate_log(&log, LOG_CAP)
            );
        }
        Ok(log)
    }

    pub async fn ffmpeg<S: AsRef<OsStr>>(&self, args: &[S]) -> anyhow::Result<String> {
        self.run(&self.ffmpeg_bin, args).await
    }

    pub async fn probe_duration(&self, path: &Path) -> anyhow::Result<f64> {
        let out = self
            .run(
                &self.ffprobe_bin,
                &[
                    "-v",
                    "error",
                    "-show_entries",
                    "format=duration",
                    "-of",
                    "json",
                    &path.display().to_string(),
                ],
            )
            .await?;
        Ok(parse_probe_duration(&out))
    }

    /// Sub-clip without re-encoding (the cuts fast path).
    pub async fn cut_segment_copy(
        &self,
        src: &Path,
        start: f64,
        duration: f64,
        out: &Path,
    ) -> anyhow::Result<()> {
        self.ffmpeg(&[
            "-y",
            "-ss",
            &format!("{:.3}", start.max(0.0)),
            "-i",
            &src.display().to_string(),
            "-t",
            &format!("{:.3}", duration.max(0.1)),
            "-c",
            "copy",
            &out.display().to_string(),
        ])
        .await?;
        Ok(())
    }

    /// Background segment cut with re-encode, stripping audio.
    pub async fn cut_segment_reencode(
        &self,
        src: &Path,
        start: f64,
        duration: f64,
        out: &Path,
    ) -> anyhow::Result<()> {
        self.ffmpeg(&[
            "-y",
            "-ss",
            &format!("{:.3}", start.max(0.0)),
            "-i",
            &src.display().to_string(),
            "-t",
            &format!("{:.3}", duration.max(0.1)),
            "-an",
            "-vf",
            "setsar=1",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
            &out.display().to_string(),
        ])
        .await?;
        Ok(())
    }

    /// 9:16 vertical composition: blurred cover-crop of the clip behind a
    /// centered uncropped copy, optionally with a banner overlay. A banner
    /// file that does not exist degrades to the no-banner graph.
    pub async fn compose_vertical_blur(
        &self,
        src: &Path,
        banner: Option<(&Path, BannerPosition)>,
        out: &Path,
    ) -> anyhow::Result<()> {
        let banner = match banner {
            Some((path, pos)) if path.exists() => Some((path, pos)),
            Some((path, _)) => {
                warn!("Banner file {} not found; composing without it", path.display());
                None
            }
            None => None,
        };

        let filter = vertical_blur_filter(banner.map(|(_, pos)| pos));
        let mut args: Vec<String> = vec!["-y".into(), "-i".into(), src.display().to_string()];
        if let Some((path, _)) = banner {
            args.push("-i".into());
            args.push(path.display().to_string());
        }
        args.extend(
            [
                "-filter_complex",
                &filter,
                "-r",
                "30",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-crf",
                "22",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
                "-c:a",
                "aac",
                "-b:a",
                "128k",
                "-ar",
                "48000",
                &out.display().to_string(),
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        self.ffmpeg(&args).await?;
        Ok(())
    }

    /// Stock-video story composition: blurred full-bleed base, unblurred
    /// bottom half, card frames over the bottom half.
    pub async fn compose_card_over_blur(
        &self,
        bg_video: &Path,
        frames_pattern: &str,
        duration: f64,
        fps: u32,
        out: &Path,
    ) -> anyhow::Result<()> {
        let d = format!("{:.3}", duration);
        let filter = format!(
            "[0:v]scale=1080:1920:flags=fast_bilinear,setsar=1,trim=0:{d},setpts=PTS-STARTPTS,boxblur=20:2[base];\
             [0:v]scale=1080:960:flags=fast_bilinear,setsar=1,trim=0:{d},setpts=PTS-STARTPTS[bot];\
             [1:v]scale=1080:960:flags=fast_bilinear,setsar=1[card];\
             [base][bot]overlay=x=0:y=960:format=auto[tmp];\
             [tmp][card]overlay=x=0:y=0:format=auto[v]"
        );
        self.compose_frames(bg_video, frames_pattern, &d, fps, &filter, out)
            .await
    }

    /// Animation story composition: animation cover-cropped into the top
    /// half of a black canvas, card flush to the bottom, no blur.
    pub async fn compose_card_over_animation(
        &self,
        bg_video: &Path,
        frames_pattern: &str,
        duration: f64,
        fps: u32,
        out: &Path,
    ) -> anyhow::Result<()> {
        let d = format!("{:.3}", duration);
        let filter = format!(
            "[0:v]scale=1080:960:force_original_aspect_ratio=increase,crop=1080:960,setsar=1,trim=0:{d},setpts=PTS-STARTPTS[anim];\
             [1:v]scale=1080:-1:flags=lanczos,setsar=1[card];\
             color=black:s=1080x1920:d={d},format=yuv420p[bg];\
             [bg][anim]overlay=x=0:y=0:format=auto[tmp1];\
             [tmp1][card]overlay=x=(W-w)/2:y=H-h:format=auto[v]"
        );
        self.compose_frames(bg_video, frames_pattern, &d, fps, &filter, out)
            .await
    }

    async fn compose_frames(
        &self,
        bg_video: &Path,
        frames_pattern: &str,
        d: &str,
        fps: u32,
        filter: &str,
        out: &Path,
    ) -> anyhow::Result<()> {
        let fps_s = fps.to_string();
        self.ffmpeg(&[
            "-y",
            "-threads",
            "0",
            "-stream_loop",
            "-1",
            "-i",
            &bg_video.display().to_string(),
            "-framerate",
            &fps_s,
            "-i",
            frames_pattern,
            "-t",
            d,
            "-filter_complex",
            filter,
            "-map",
            "[v]",
            "-r",
            &fps_s,
            "-c:v",
            "libx264",
            "-preset",
            "ultrafast",
            "-tune",
            "stillimage",
            "-crf",
            "23",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
            &out.display().to_string(),
        ])
        .await?;
        Ok(())
    }

    /// Final mux: video stream copied, audio re-encoded, subtitles muxed as
    /// mov_text when an SRT file is present and non-empty.
    pub async fn mux_av_with_optional_subs(
        &self,
        video: &Path,
        audio: &Path,
        srt: Option<&Path>,
        title: Option<&str>,
        out: &Path,
    ) -> anyhow::Result<bool> {
        let srt = srt.filter(|p| p.exists() && p.metadata().map(|m| m.len() > 0).unwrap_or(false));

        let mut args: Vec<String> = vec![
            "-y".into(),
            "-threads".into(),
            "0".into(),
            "-i".into(),
            video.display().to_string(),
            "-i".into(),
            audio.display().to_string(),
        ];
        if let Some(srt) = srt {
            args.push("-i".into());
            args.push(srt.display().to_string());
        }
        args.extend(["-map", "0:v:0", "-map", "1:a:0"].iter().map(|s| s.to_string()));
        if srt.is_some() {
            args.push("-map".into());
            args.push("2:s:0".into());
        }
        args.extend(
            [
                "-c:v",
                "copy",
                "-c:a",
                "aac",
                "-b:a",
                "128k",
                "-ar",
                "48000",
                "-movflags",
                "+faststart",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        if srt.is_some() {
            args.push("-c:s".into());
            args.push("mov_text".into());
        }
        if let Some(title) = title {
            args.push("-metadata".into());
            args.push(format!("title={}", title));
        }
        args.push(out.display().to_string());

        self.ffmpeg(&args).await?;
        Ok(srt.is_some())
    }

    /// One-shot low-bitrate re-encode when the artifact exceeds the chat
    /// delivery ceiling; returns the input untouched when it already fits.
    pub async fn ensure_delivery_size(
        &self,
        input: &Path,
        output: &Path,
        target_mb: u64,
    ) -> anyhow::Result<std::path::PathBuf> {
        let size_mb = input.metadata().map(|m| m.len() / (1024 * 1024)).unwrap_or(0);
        if size_mb <= target_mb {
            return Ok(input.to_path_buf());
        }
        warn!("Artifact is {} MB, re-encoding to fit {} MB", size_mb, target_mb);
        self.ffmpeg(&[
            "-y",
            "-threads",
            "0",
            "-i",
            &input.display().to_string(),
            "-vf",
            "scale=1080:1920:flags=fast_bilinear:force_original_aspect_ratio=decrease,fps=30,format=yuv420p",
            "-c:v",
            "libx264",
            "-preset",
            "ultrafast",
            "-crf",
            "33",
            "-maxrate",
            "1.2M",
            "-bufsize",
            "2.4M",
            "-c:a",
            "aac",
            "-b:a",
            "96k",
            "-ar",
            "48000",
            "-movflags",
            "+faststart",
            &output.display().to_string(),
        ])
        .await?;
        Ok(output.to_path_buf())
    }
}

pub fn parse_probe_duration(json_out: &str) -> f64 {
    serde_json::from_str::<serde_json::Value>(json_out)
        .ok()
        .and_then(|v| {
            v.get("format")?
                .get("duration")?
                .as_str()?
                .parse::<f64>()
                .ok()
        })
        .unwrap_or(0.0)
}

pub fn vertical_blur_filter(banner: Option<BannerPosition>) -> String {
    let base = "[0:v]split=2[v][vb];\
         [vb]scale=1080:1920:force_original_aspect_ratio=increase,\
         crop=1080:1920,\
         boxblur=luma_radius=40:luma_power=1:chroma_radius=40[bg];\
         [v]scale=1080:-2:force_original_aspect_ratio=decrease,setsar=1[fg];\
         [bg][fg]overlay=(W-w)/2:(H-h)/2:format=auto";
    match banner {
        None => base.to_string(),
        Some(pos) => {
            // Banner scaled to 25% of the 1080 px frame width.
            let placement = match pos {
                BannerPosition::Top => "(W-w)/2:50",
                BannerPosition::Bottom => "(W-w)/2:H-h-50",
                BannerPosition::Center => "(W-w)/2:(H-h)/2",
            };
            format!(
                "{base}[composed];[1:v]scale=270:-1,format=rgba[banner];\
                 [composed][banner]overlay={placement}:format=auto"
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_duration_parses_float_seconds() {
        let out = r#"{"format": {"duration": "612.480000"}}"#;
        assert!((parse_probe_duration(out) - 612.48).abs() < 1e-9);
    }

    #[test]
    fn probe_duration_defaults_to_zero_on_garbage() {
        assert_eq!(parse_probe_duration("not json"), 0.0);
        assert_eq!(parse_probe_duration(r#"{"format": {}}"#), 0.0);
        assert_eq!(parse_probe_duration(r#"{"format": {"duration": "abc"}}"#), 0.0);
    }

    #[test]
    fn no_banner_filter_matches_base_graph() {
        let without = vertical_blur_filter(None);
        assert!(without.contains("boxblur"));
        assert!(!without.contains("banner"));
    }

    #[test]
    fn banner_filter_places_overlay_per_anchor() {
        let top = vertical_blur_filter(Some(BannerPosition::Top));
        assert!(top.ends_with("overlay=(W-w)/2:50:format=auto"));
        let bottom = vertical_blur_filter(Some(BannerPosition::Bottom));
        assert!(bottom.contains("H-h-50"));
        let center = vertical_blur_filter(Some(BannerPosition::Center));
        assert!(center.contains("(H-h)/2:format=auto"));
    }

    #[test]
    fn log_truncation_caps_length() {
        let long = "x".repeat(10_000);
        let cut = truncate_log(&long, 6000);
        assert!(cut.len() < 6100);
        assert!(cut.ends_with("[truncated]"));
        assert_eq!(truncate_log("short", 6000), "short");
    }
}
