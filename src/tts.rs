use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{error, info};

/// Provider-safe speech speed range; values outside are clamped before the
/// synthesis call.
pub const SPEED_MIN: f64 = 0.7;
pub const SPEED_MAX: f64 = 1.2;

pub fn clamp_speed(speed: f64) -> f64 {
    speed.clamp(SPEED_MIN, SPEED_MAX)
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        lang: &str,
        speed: f64,
        out_path: &Path,
    ) -> anyhow::Result<()>;
}

/// Piper neural TTS driven over stdin. A voice id names a `<voice>.onnx`
/// model under the models dir; unknown voices fall back to a per-language
/// default.
pub struct PiperSynthesizer {
    binary: String,
    models_dir: PathBuf,
    default_en: String,
    default_ru: String,
}

impl PiperSynthesizer {
    pub fn new(binary: &str, models_dir: &Path) -> Self {
        Self {
            binary: binary.to_string(),
            models_dir: models_dir.to_path_buf(),
            default_en: "en_US-amy-medium".to_string(),
            default_ru: "ru_RU-irina-medium".to_string(),
        }
    }

    fn model_path(&self, voice: Option<&str>, lang: &str) -> PathBuf {
        let name = match voice {
            Some(v) if self.models_dir.join(format!("{v}.onnx")).exists() => v.to_string(),
            _ => {
                if lang.to_ascii_lowercase().starts_with("ru") {
                    self.default_ru.clone()
                } else {
                    self.default_en.clone()
                }
            }
        };
        self.models_dir.join(format!("{name}.onnx"))
    }
}

#[async_trait]
impl SpeechSynthesizer for PiperSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        lang: &str,
        speed: f64,
        out_path: &Path,
    ) -> anyhow::Result<()> {
        let model = self.model_path(voice, lang);
        let speed = clamp_speed(speed);
        // Piper's length_scale stretches audio, so speed inverts it.
        let length_scale = format!("{:.3}", 1.0 / speed);
        info!(
            "Synthesizing {} chars with model {} (speed {:.2})",
            text.len(),
            model.display(),
            speed
        );

        let mut child = Command::new(&self.binary)
            .args([
                "--model",
                &model.display().to_string(),
                "--length_scale",
                &length_scale,
                "--output_file",
                &out_path.display().to_string(),
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to spawn piper")?;

        {
            let stdin = child
                .stdin
                .as_mut()
                .context("failed to open piper stdin")?;
            stdin.write_all(text.as_bytes()).await?;
        }

        let status = child.wait().await?;
        if !status.success() {
            error!("Piper TTS failed for {}", out_path.display());
            anyhow::bail!("speech synthesis provider (piper) returned non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_is_clamped_to_safe_range() {
        assert_eq!(clamp_speed(0.1), 0.7);
        assert_eq!(clamp_speed(5.0), 1.2);
        assert_eq!(clamp_speed(1.1), 1.1);
    }

    #[test]
    fn unknown_voice_falls_back_to_language_default() {
        let dir = tempfile::tempdir().unwrap();
        let synth = PiperSynthesizer::new("piper", dir.path());
        let en = synth.model_path(Some("no-such-voice"), "en");
        assert!(en.ends_with("en_US-amy-medium.onnx"));
        let ru = synth.model_path(None, "ru");
        assert!(ru.ends_with("ru_RU-irina-medium.onnx"));

        std::fs::write(dir.path().join("custom.onnx"), b"model").unwrap();
        let custom = synth.model_path(Some("custom"), "en");
        assert!(custom.ends_with("custom.onnx"));
    }
}
