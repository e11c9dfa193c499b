use std::fs::File;
use std::io::Write;
use std::path::Path;

use regex::Regex;

const MIN_CUE_SEC: f64 = 1.2;

pub fn split_into_sentences(text: &str) -> Vec<String> {
    let re = Regex::new(r"(?s)([^.!?]+[.!?]+)|([^.!?]+$)").unwrap();
    let mut sentences = Vec::new();
    for cap in re.captures_iter(text) {
        let s = cap.get(0).unwrap().as_str().trim();
        if !s.is_empty() {
            sentences.push(s.to_string());
        }
    }
    if sentences.is_empty() {
        return vec![text.trim().to_string()];
    }
    sentences
}

/// Cue timing is a documented approximation: each sentence gets a share of
/// the measured narration duration proportional to its character count, with
/// a 1.2s floor, renormalized back to the total. Not forced alignment.
pub fn build_cues(text: &str, total_duration: f64) -> Vec<(f64, f64, String)> {
    let sentences = split_into_sentences(text);
    let lengths: Vec<f64> = sentences
        .iter()
        .map(|s| (s.chars().count().max(10)) as f64)
        .collect();
    let total_len: f64 = lengths.iter().sum();
    let mut alloc: Vec<f64> = lengths
        .iter()
        .map(|l| (total_duration * l / total_len).max(MIN_CUE_SEC))
        .collect();

    let alloc_sum: f64 = alloc.iter().sum();
    if alloc_sum > 0.0 {
        let scale = total_duration / alloc_sum;
        for a in alloc.iter_mut() {
            *a *= scale;
        }
    }

    let mut cues = Vec::with_capacity(sentences.len());
    let mut cur = 0.0;
    for (s, d) in sentences.into_iter().zip(alloc) {
        cues.push((cur, cur + d, s));
        cur += d;
    }
    cues
}

pub fn build_srt_by_text_length(
    text: &str,
    total_duration: f64,
    out_path: &Path,
) -> anyhow::Result<()> {
    write_srt(out_path, &build_cues(text, total_duration))
}

pub fn write_srt(path: &Path, entries: &[(f64, f64, String)]) -> anyhow::Result<()> {
    let mut f = File::create(path)?;
    for (i, (start, end, text)) in entries.iter().enumerate() {
        writeln!(f, "{}", i + 1)?;
        writeln!(f, "{} --> {}", format_srt_time(*start), format_srt_time(*end))?;
        for line in wrap_text(text, 80) {
            writeln!(f, "{}", line)?;
        }
        writeln!(f)?;
    }
    Ok(())
}

fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let total_min = total_sec / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

fn wrap_text(s: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in s.split_whitespace() {
        if current.len() + word.len() + 1 > width && !current.is_empty() {
            lines.push(current.clone());
            current.clear();
            current.push_str(word);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_sentence_terminators() {
        let s = split_into_sentences("Sentence one. Sentence two! And three?");
        assert_eq!(s.len(), 3);
        assert_eq!(s[0], "Sentence one.");
        assert_eq!(s[2], "And three?");
    }

    #[test]
    fn unterminated_text_is_one_sentence() {
        let s = split_into_sentences("no punctuation here");
        assert_eq!(s, vec!["no punctuation here".to_string()]);
    }

    #[test]
    fn cues_sum_to_total_duration() {
        let cues = build_cues("My Title. Sentence one. Sentence two.", 10.0);
        assert_eq!(cues.len(), 3);
        let total: f64 = cues.iter().map(|(s, e, _)| e - s).sum();
        assert!((total - 10.0).abs() < 1e-6);
        assert!((cues.last().unwrap().1 - 10.0).abs() < 1e-6);
        // Cues are contiguous.
        assert_eq!(cues[0].1, cues[1].0);
    }

    #[test]
    fn longer_sentences_get_more_time() {
        let cues = build_cues(
            "Hi there everyone. This one is a dramatically longer sentence than the first.",
            20.0,
        );
        assert!(cues[1].1 - cues[1].0 > cues[0].1 - cues[0].0);
    }

    #[test]
    fn srt_output_has_numbered_cues() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.srt");
        build_srt_by_text_length("One. Two.", 10.0, &path).unwrap();
        let srt = std::fs::read_to_string(&path).unwrap();
        assert!(srt.starts_with("1\n00:00:00,000 --> "));
        assert!(srt.contains("\n2\n"));
        assert!(srt.contains("00:00:10,000"));
    }

    #[test]
    fn srt_time_formatting() {
        assert_eq!(format_srt_time(0.0), "00:00:00,000");
        assert_eq!(format_srt_time(61.5), "00:01:01,500");
        assert_eq!(format_srt_time(3601.042), "01:00:01,042");
    }
}
