use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
pub struct Args {
    /// Root directory for backgrounds, banners and cuts collections.
    #[clap(long, default_value = "./assets")]
    pub assets: PathBuf,

    /// Where finished videos are stored, under a per-kind subdirectory.
    #[clap(long, default_value = "./output")]
    pub output: PathBuf,

    /// Parent directory for per-job scratch directories.
    #[clap(long, default_value = "./work")]
    pub work_root: PathBuf,

    /// JSON file with channel configurations.
    #[clap(long, default_value = "./channels.json")]
    pub channels: PathBuf,

    /// TTF/OTF font for story cards; falls back to common system fonts.
    #[clap(long)]
    pub font: Option<PathBuf>,

    #[clap(long, default_value = "ffmpeg")]
    pub ffmpeg: String,

    #[clap(long, default_value = "ffprobe")]
    pub ffprobe: String,

    #[clap(long, default_value = "piper")]
    pub piper: String,

    /// Directory with piper .onnx voice models.
    #[clap(long, default_value = "./tts")]
    pub piper_models: PathBuf,

    /// Optional JSON file overriding the built-in prompt presets.
    #[clap(long)]
    pub prompts: Option<PathBuf>,

    #[clap(long, default_value = "https://api.openai.com/v1")]
    pub openai_base: String,

    #[clap(long, default_value = "gpt-4o-mini")]
    pub model: String,

    /// Long-poll timeout for getUpdates, in seconds.
    #[clap(long, default_value_t = 30)]
    pub poll_timeout: u64,
}
