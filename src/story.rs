use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

#[async_trait]
pub trait StoryTextProvider: Send + Sync {
    /// Returns narration text whose first line is the title and the rest is
    /// the body. May take tens of seconds.
    async fn generate(&self, preset: &str, lang: &str, target_sec: u32) -> anyhow::Result<String>;
}

/// First line is the title, everything after the first newline is the body.
/// An empty body is legal.
pub fn split_title_body(text: &str) -> (String, String) {
    let mut parts = text.splitn(2, '\n');
    let title = parts.next().unwrap_or("").trim();
    let body = parts.next().unwrap_or("").trim();
    let title = if title.is_empty() { "Untitled" } else { title };
    (title.to_string(), body.to_string())
}

pub fn strip_markdown(text: &str) -> String {
    let bold = Regex::new(r"\*\*([^*]+)\*\*").unwrap();
    let italic = Regex::new(r"\*([^*]+)\*").unwrap();
    let under = Regex::new(r"__([^_]+)__").unwrap();
    let code = Regex::new(r"`([^`]+)`").unwrap();
    let heading = Regex::new(r"(?m)^#{1,6}\s+").unwrap();
    let link = Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap();

    let text = bold.replace_all(text, "$1");
    let text = under.replace_all(&text, "$1");
    let text = italic.replace_all(&text, "$1");
    let text = code.replace_all(&text, "$1");
    let text = heading.replace_all(&text, "");
    let text = link.replace_all(&text, "$1");
    text.replace("**", "")
        .replace("__", "")
        .replace("~~", "")
        .replace(['<', '>'], "")
}

fn fallback_prompt(preset: &str, lang: &str) -> String {
    let ru = lang.to_ascii_lowercase().starts_with("ru");
    let prompt = match preset {
        "facts" => {
            if ru {
                "Расскажи один факт или феномен, который заставит задуматься. \
                 Объясняй как другу за чашкой кофе, с живыми примерами, без морали в конце."
            } else {
                "Tell about one fact or phenomenon that makes you think. \
                 Explain it like you would to a friend over coffee, with real examples, no moral at the end."
            }
        }
        "horror" => {
            if ru {
                "Расскажи страшную историю от первого лица. Нагнетай атмосферу деталями, \
                 финал должен оставить мурашки."
            } else {
                "Tell a first-person horror story. Build dread through specific details; \
                 the ending should leave goosebumps."
            }
        }
        "history" => {
            if ru {
                "Расскажи малоизвестный исторический эпизод так, будто делишься находкой с другом. \
                 Конкретные люди, конкретные детали, никакого учебника."
            } else {
                "Tell a little-known historical episode as if sharing a discovery with a friend. \
                 Real people, concrete details, nothing textbook-like."
            }
        }
        "news" => {
            if ru {
                "Перескажи любопытную свежую новость из науки или технологий с энтузиазмом, \
                 простым языком, без сухого новостного стиля."
            } else {
                "Retell a curious recent science or technology story with enthusiasm, \
                 in plain words, no dry newsroom style."
            }
        }
        _ => {
            if ru {
                "Напиши захватывающую историю из жизни от первого лица. Начни с неожиданной \
                 ситуации, развивай интригу через детали и диалоги, финал с поворотом. \
                 Короткие предложения, без морали."
            } else {
                "Write a captivating first-person life story. Start with an unexpected situation, \
                 build intrigue through details and dialogue, end on a twist. \
                 Short sentences, no moral lessons."
            }
        }
    };
    prompt.to_string()
}

fn sys_prompt(lang: &str) -> &'static str {
    if lang.to_ascii_lowercase().starts_with("ru") {
        "Ты рассказчик с миллионами слушателей. Пишешь от первого лица, живым разговорным \
         языком, с конкретными деталями и настоящими эмоциями. Строго на русском языке."
    } else {
        "You are a storyteller with millions of listeners. Write in the first person, in a \
         natural conversational voice, with concrete details and honest emotion."
    }
}

fn user_prompt(theme_prompt: &str, lang: &str, target_sec: u32) -> String {
    if lang.to_ascii_lowercase().starts_with("ru") {
        format!(
            "{theme_prompt}\n\nФОРМАТ ВЫВОДА:\n\
             - Длина: 250-380 слов (примерно {target_sec} секунд озвучки)\n\
             - Первая строка — заголовок, дальше — тело истории\n\
             - Только чистый текст: без Markdown и спецсимволов"
        )
    } else {
        format!(
            "{theme_prompt}\n\nOUTPUT FORMAT:\n\
             - Length: 250-380 words (roughly a {target_sec}s read)\n\
             - First line is the title, then the story body\n\
             - Plain text only: no Markdown, no special symbols"
        )
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct PromptDoc {
    preset: String,
    lang: String,
    text: String,
}

/// Story text over an OpenAI-compatible chat-completions endpoint. Prompt
/// presets can be overridden per (preset, language) from a JSON document
/// file; built-in prompts cover the rest.
pub struct OpenAiStoryProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    prompts: HashMap<String, String>,
}

impl OpenAiStoryProvider {
    pub fn new(base_url: &str, api_key: &str, model: &str, prompts_file: Option<&Path>) -> Self {
        let mut prompts = HashMap::new();
        if let Some(path) = prompts_file {
            match std::fs::read_to_string(path)
                .ok()
                .and_then(|data| serde_json::from_str::<Vec<PromptDoc>>(&data).ok())
            {
                Some(docs) => {
                    for doc in docs {
                        prompts.insert(format!("{}:{}", doc.preset, doc.lang), doc.text);
                    }
                    info!("Loaded {} prompt overrides from {}", prompts.len(), path.display());
                }
                None => warn!("No usable prompt overrides at {}", path.display()),
            }
        }
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            prompts,
        }
    }

    fn theme_prompt(&self, preset: &str, lang: &str) -> String {
        self.prompts
            .get(&format!("{preset}:{lang}"))
            .cloned()
            .unwrap_or_else(|| fallback_prompt(preset, lang))
    }
}

#[async_trait]
impl StoryTextProvider for OpenAiStoryProvider {
    async fn generate(&self, preset: &str, lang: &str, target_sec: u32) -> anyhow::Result<String> {
        let theme = self.theme_prompt(preset, lang);
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": sys_prompt(lang)},
                {"role": "user", "content": user_prompt(&theme, lang, target_sec)},
            ],
            "temperature": 1.3,
            "max_tokens": 900,
            "presence_penalty": 0.6,
            "frequency_penalty": 0.5,
            "top_p": 0.95,
        });

        info!("Requesting story text (preset {}, lang {}, ~{}s)", preset, lang, target_sec);
        let resp: ChatResponse = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("story text provider request failed")?
            .error_for_status()
            .context("story text provider returned an error status")?
            .json()
            .await
            .context("story text provider returned malformed JSON")?;

        let content = resp
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .context("story text provider returned no choices")?;

        let text = strip_markdown(&content);
        // Guarantee the title-on-first-line convention even if the model
        // returned a single block.
        if !text.contains('\n') {
            return Ok(format!("Story\n\n{text}"));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_first_line_rest_is_body() {
        let (title, body) = split_title_body("My Title\n\nSentence one. Sentence two.");
        assert_eq!(title, "My Title");
        assert_eq!(body, "Sentence one. Sentence two.");
    }

    #[test]
    fn empty_body_is_legal() {
        let (title, body) = split_title_body("Just a headline");
        assert_eq!(title, "Just a headline");
        assert_eq!(body, "");
    }

    #[test]
    fn blank_text_falls_back_to_untitled() {
        let (title, body) = split_title_body("");
        assert_eq!(title, "Untitled");
        assert_eq!(body, "");
    }

    #[test]
    fn markdown_is_stripped() {
        let cleaned = strip_markdown("## Title\n\n**bold** and *italic* and `code` and [a](http://x)");
        assert_eq!(cleaned, "Title\n\nbold and italic and code and a");
    }

    #[test]
    fn every_kind_has_a_fallback_prompt() {
        for preset in ["default", "horror", "facts", "history", "news"] {
            for lang in ["en", "ru"] {
                assert!(!fallback_prompt(preset, lang).is_empty());
            }
        }
    }
}
