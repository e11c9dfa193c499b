use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use tracing::info;

use crate::ffmpeg::Ffmpeg;

#[async_trait]
pub trait AnimationProvider: Send + Sync {
    /// Renders a procedural background of roughly the requested duration.
    /// Duration is advisory; implementations may round up.
    async fn render(
        &self,
        style: Option<&str>,
        duration: f64,
        out_path: &Path,
    ) -> anyhow::Result<PathBuf>;
}

/// Fixed catalog of procedural styles, each an ffmpeg lavfi generator tuned
/// for a 1080x1920 vertical canvas.
const STYLES: [(&str, &str); 4] = [
    (
        "gradient_flow",
        "gradients=s=1080x1920:n=5:speed=0.03:type=spiral",
    ),
    (
        "mandelbrot_zoom",
        "mandelbrot=s=1080x1920:rate=30:end_scale=0.00002:inner=period",
    ),
    (
        "cellular",
        "life=s=1080x1920:rate=30:mold=10:ratio=0.12:death_color=#10041c:life_color=#7fdbff",
    ),
    (
        "plasma",
        "gradients=s=1080x1920:n=8:speed=0.08:type=radial",
    ),
];

pub fn available_styles() -> Vec<&'static str> {
    STYLES.iter().map(|(name, _)| *name).collect()
}

pub struct LavfiAnimationProvider {
    ffmpeg: Ffmpeg,
}

impl LavfiAnimationProvider {
    pub fn new(ffmpeg: Ffmpeg) -> Self {
        Self { ffmpeg }
    }

    fn pick_style(style: Option<&str>) -> (&'static str, &'static str) {
        if let Some(wanted) = style {
            if let Some(found) = STYLES.iter().find(|(name, _)| *name == wanted) {
                return *found;
            }
        }
        let mut rng = rand::rng();
        *STYLES.as_slice().choose(&mut rng).unwrap()
    }
}

#[async_trait]
impl AnimationProvider for LavfiAnimationProvider {
    async fn render(
        &self,
        style: Option<&str>,
        duration: f64,
        out_path: &Path,
    ) -> anyhow::Result<PathBuf> {
        let (name, source) = Self::pick_style(style);
        // Round up so composition never runs out of background.
        let duration = duration.ceil().max(1.0);
        info!("Rendering '{}' animation for {:.0}s", name, duration);

        self.ffmpeg
            .ffmpeg(&[
                "-y",
                "-f",
                "lavfi",
                "-i",
                source,
                "-t",
                &format!("{:.3}", duration),
                "-r",
                "30",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-crf",
                "23",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
                &out_path.display().to_string(),
            ])
            .await?;
        Ok(out_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_style_is_honored() {
        let (name, _) = LavfiAnimationProvider::pick_style(Some("cellular"));
        assert_eq!(name, "cellular");
    }

    #[test]
    fn unknown_style_falls_back_to_catalog() {
        let (name, _) = LavfiAnimationProvider::pick_style(Some("vaporwave"));
        assert!(available_styles().contains(&name));
        let (name, _) = LavfiAnimationProvider::pick_style(None);
        assert!(available_styles().contains(&name));
    }
}
