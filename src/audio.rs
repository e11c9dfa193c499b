use std::path::Path;

use hound::WavReader;

pub fn wav_duration_seconds(path: &Path) -> anyhow::Result<f64> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    Ok(frames / spec.sample_rate as f64)
}

#[cfg(test)]
pub fn write_silent_wav(path: &Path, seconds: f64) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for _ in 0..(seconds * spec.sample_rate as f64) as usize {
        writer.write_sample(0_i16)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_wav_duration() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("t.wav");
        write_silent_wav(&wav, 2.5).unwrap();
        let dur = wav_duration_seconds(&wav).unwrap();
        assert!((dur - 2.5).abs() < 0.01);
    }
}
