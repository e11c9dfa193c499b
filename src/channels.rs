use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::queue::{BackgroundMode, BannerConfig, JobParams, StoryKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CutsConfig {
    pub kind: String,
    pub collection: String,
    #[serde(default = "default_min_sec")]
    pub min_sec: u32,
    #[serde(default = "default_max_sec")]
    pub max_sec: u32,
}

fn default_min_sec() -> u32 {
    180
}

fn default_max_sec() -> u32 {
    240
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default = "default_lang")]
    pub language: String,
    #[serde(default = "default_story_kind")]
    pub story_kind: StoryKind,
    #[serde(default = "default_preset")]
    pub prompt_preset: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub voice_name: Option<String>,
    #[serde(default = "default_speed")]
    pub speech_speed: f64,
    #[serde(default = "default_background")]
    pub background: BackgroundMode,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_target_sec")]
    pub target_sec: u32,
    #[serde(default)]
    pub subs_lang: Option<String>,
    #[serde(default)]
    pub cuts: Option<CutsConfig>,
    #[serde(default)]
    pub banner: Option<BannerConfig>,
    #[serde(default)]
    pub generated_total: u64,
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_story_kind() -> StoryKind {
    StoryKind::LifeStory
}

fn default_preset() -> String {
    "default".to_string()
}

fn default_speed() -> f64 {
    1.1
}

fn default_background() -> BackgroundMode {
    BackgroundMode::StockVideo
}

fn default_fps() -> u32 {
    30
}

fn default_target_sec() -> u32 {
    75
}

impl ChannelConfig {
    /// A channel with a cuts config is a cuts channel; everything else is a
    /// narrated story channel.
    pub fn job_params(&self) -> JobParams {
        match &self.cuts {
            Some(cuts) => JobParams::ClipExtraction {
                kind: cuts.kind.clone(),
                collection: cuts.collection.clone(),
                min_sec: cuts.min_sec,
                max_sec: cuts.max_sec,
                banner: self.banner.clone(),
            },
            None => JobParams::NarratedStory {
                kind: self.story_kind,
                language: self.language.clone(),
                target_sec: self.target_sec,
                preset: self.prompt_preset.clone(),
                voice: self.voice.clone(),
                voice_name: self.voice_name.clone(),
                speed: self.speech_speed,
                background: self.background,
                fps: self.fps,
                subs_lang: self.subs_lang.clone(),
            },
        }
    }
}

/// Channel documents in a single JSON file, loaded on demand and rewritten
/// whole on mutation. Channel name is the uniqueness key.
pub struct JsonChannelStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonChannelStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> anyhow::Result<HashMap<String, ChannelConfig>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let data = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let channels: Vec<ChannelConfig> =
            serde_json::from_str(&data).context("invalid channels file")?;
        Ok(channels.into_iter().map(|c| (c.name.clone(), c)).collect())
    }

    fn save(&self, channels: &HashMap<String, ChannelConfig>) -> anyhow::Result<()> {
        let mut list: Vec<&ChannelConfig> = channels.values().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        let data = serde_json::to_string_pretty(&list)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, data)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> anyhow::Result<Option<ChannelConfig>> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.load()?.remove(name))
    }

    pub fn list(&self) -> anyhow::Result<Vec<ChannelConfig>> {
        let _guard = self.lock.lock().unwrap();
        let mut channels: Vec<ChannelConfig> = self.load()?.into_values().collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(channels)
    }

    pub fn upsert(&self, config: ChannelConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut channels = self.load()?;
        channels.insert(config.name.clone(), config);
        self.save(&channels)
    }

    /// Best-effort generation counter; callers log-and-discard the error.
    pub fn increment_generated(&self, name: &str) -> anyhow::Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut channels = self.load()?;
        let channel = channels
            .get_mut(name)
            .with_context(|| format!("unknown channel '{name}'"))?;
        channel.generated_total += 1;
        info!(
            "Channel '{}' has generated {} videos",
            name, channel.generated_total
        );
        self.save(&channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story_channel(name: &str) -> ChannelConfig {
        ChannelConfig {
            name: name.to_string(),
            language: "en".into(),
            story_kind: StoryKind::Horror,
            prompt_preset: "horror".into(),
            voice: None,
            voice_name: None,
            speech_speed: 1.1,
            background: BackgroundMode::Animation,
            fps: 30,
            target_sec: 75,
            subs_lang: Some("en".into()),
            cuts: None,
            banner: None,
            generated_total: 0,
        }
    }

    #[test]
    fn upsert_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonChannelStore::new(&dir.path().join("channels.json"));
        store.upsert(story_channel("spooky")).unwrap();

        let loaded = store.get("spooky").unwrap().unwrap();
        assert_eq!(loaded.prompt_preset, "horror");
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn increment_persists_counter() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonChannelStore::new(&dir.path().join("channels.json"));
        store.upsert(story_channel("c")).unwrap();
        store.increment_generated("c").unwrap();
        store.increment_generated("c").unwrap();
        assert_eq!(store.get("c").unwrap().unwrap().generated_total, 2);
        assert!(store.increment_generated("missing").is_err());
    }

    #[test]
    fn cuts_channel_maps_to_clip_extraction_params() {
        let mut cfg = story_channel("cutter");
        cfg.cuts = Some(CutsConfig {
            kind: "cartoons".into(),
            collection: "classics".into(),
            min_sec: 180,
            max_sec: 240,
        });
        match cfg.job_params() {
            JobParams::ClipExtraction { collection, min_sec, .. } => {
                assert_eq!(collection, "classics");
                assert_eq!(min_sec, 180);
            }
            _ => panic!("expected cuts params"),
        }
        match story_channel("s").job_params() {
            JobParams::NarratedStory { kind, .. } => assert_eq!(kind, StoryKind::Horror),
            _ => panic!("expected story params"),
        }
    }
}
