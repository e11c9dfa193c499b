use std::path::{Path, PathBuf};

use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::info;

use crate::ffmpeg::Ffmpeg;

const VIDEO_EXTS: [&str; 4] = ["mp4", "mov", "mkv", "webm"];

pub fn list_videos(dir: &Path) -> Vec<PathBuf> {
    let mut vids = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return vids,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if ext.map_or(false, |e| VIDEO_EXTS.contains(&e.as_str())) {
            vids.push(path);
        }
    }
    vids.sort();
    vids
}

/// Segment window for a cuts job. Duration floor is 30 seconds regardless of
/// what the channel config asks for; a short source is taken from offset 0.
pub fn cut_window<R: Rng>(total: f64, min_sec: u32, max_sec: u32, rng: &mut R) -> (f64, f64) {
    let mn = 30.0_f64.max(min_sec as f64);
    let mx = mn.max(max_sec as f64);
    let seg = if total > mn + 2.0 {
        mx.min((total as u64).saturating_sub(2) as f64)
    } else {
        mn
    };
    let seg = seg.clamp(mn, mx);
    let start = if total <= seg + 1.0 {
        0.0
    } else {
        rng.random_range(0.0..=(total - seg - 0.2).max(0.0))
    };
    (start, seg)
}

/// Start offset for a stock background slice; sources shorter than the
/// narration are taken whole and looped at compose time.
pub fn bg_start<R: Rng>(total: f64, duration: f64, rng: &mut R) -> f64 {
    if total <= duration + 0.5 {
        0.0
    } else {
        let max_start = (total - duration - 0.5).max(0.0);
        rng.random_range(0.0..=max_start)
    }
}

pub struct BackgroundStore {
    assets_root: PathBuf,
    ffmpeg: Ffmpeg,
}

impl BackgroundStore {
    pub fn new(assets_root: &Path, ffmpeg: Ffmpeg) -> Self {
        Self {
            assets_root: assets_root.to_path_buf(),
            ffmpeg,
        }
    }

    /// Videos inside a cuts collection, e.g. `assets/cartoons/<collection>`.
    pub fn collection_videos(&self, kind: &str, collection: &str) -> Vec<PathBuf> {
        list_videos(&self.assets_root.join(kind).join(collection))
    }

    fn candidates(&self, scope: &str) -> Vec<PathBuf> {
        let pool = self.assets_root.join("bg").join(scope);
        let mut vids = list_videos(&pool);
        if vids.is_empty() {
            let fallback = self.assets_root.join("bg").join("default.mp4");
            if fallback.exists() {
                vids.push(fallback);
            }
        }
        vids
    }

    /// Picks a random stock video and cuts a random slice of the requested
    /// duration into the scratch dir.
    pub async fn random_segment(
        &self,
        duration: f64,
        scratch: &Path,
        scope: &str,
    ) -> anyhow::Result<PathBuf> {
        let candidates = self.candidates(scope);
        if candidates.is_empty() {
            anyhow::bail!(
                "No background videos available for '{}'. Upload some through the bot settings.",
                scope
            );
        }
        let src = {
            let mut rng = rand::rng();
            candidates.choose(&mut rng).cloned().unwrap()
        };
        info!("Picked background {}", src.display());

        let total = self.ffmpeg.probe_duration(&src).await?;
        let start = {
            let mut rng = rand::rng();
            bg_start(total, duration, &mut rng)
        };

        let out = scratch.join("bg_clip.mp4");
        self.ffmpeg
            .cut_segment_reencode(&src, start, duration, &out)
            .await?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn short_source_starts_at_zero_with_floored_length() {
        let mut rng = StdRng::seed_from_u64(7);
        // 60s source, 180..240s requested: window clamps to the min bound.
        let (start, seg) = cut_window(60.0, 180, 240, &mut rng);
        assert_eq!(start, 0.0);
        assert_eq!(seg, 180.0);
    }

    #[test]
    fn window_never_degenerates() {
        let mut rng = StdRng::seed_from_u64(1);
        for total in [5.0, 29.0, 31.0, 61.0, 200.0, 610.0] {
            for (mn, mx) in [(0, 0), (10, 20), (180, 240), (240, 180)] {
                let (start, seg) = cut_window(total, mn, mx, &mut rng);
                assert!(seg >= 30.0, "segment below the 30s floor");
                assert!(start >= 0.0);
            }
        }
    }

    #[test]
    fn long_source_window_fits_in_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let (start, seg) = cut_window(600.0, 180, 240, &mut rng);
        assert!((180.0..=240.0).contains(&seg));
        assert!(start + seg <= 600.0);
    }

    #[test]
    fn bg_start_is_zero_for_short_sources() {
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(bg_start(10.0, 30.0, &mut rng), 0.0);
        let start = bg_start(300.0, 30.0, &mut rng);
        assert!(start >= 0.0 && start <= 269.5);
    }

    #[test]
    fn list_videos_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("b.webm"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let vids = list_videos(dir.path());
        assert_eq!(vids.len(), 2);
    }
}
