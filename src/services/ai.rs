use crate::config::{ApiConfig, TranslationConfig};
use crate::error::{Error, Result};
use crate::model::entry::TranslationItem;
use crate::services::ai_types::{BatchFailure, TranslationOutcome};
use crate::services::glossary::Glossary;
use crate::services::text;

use rand::{thread_rng, Rng};
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::json;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use std::{thread, time::Duration};

/// Upper bound of one backoff step before jitter.
const MAX_BACKOFF_MS: u64 = 60_000;

const SYSTEM_PROMPT: &str =
    "You are a professional game localizer. You translate mod text for Factorio.";

pub struct AiTranslator {
    client: Client,
    api: ApiConfig,
    target_language: String,
    game_context: String,
    batch_size: usize,
    max_workers: usize,
    retry_base: Duration,
}

fn numbered_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(\d+)\s*[.:：、)）]\s*(?:(?i:translation)\s*[:：]|中文翻译\s*[:：]|翻译\s*[:：])?\s*(.*)$",
        )
        .expect("static regex")
    })
}

fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(?i:translation)\s*[:：]|中文翻译\s*[:：]|翻译\s*[:：])\s*")
            .expect("static regex")
    })
}

impl AiTranslator {
    pub fn new(api: &ApiConfig, translation: &TranslationConfig) -> Result<AiTranslator> {
        if api.api_key.trim().is_empty() {
            return Err(Error::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()?;

        Ok(AiTranslator {
            client,
            api: api.clone(),
            target_language: translation.target_language.clone(),
            game_context: translation.game_context.clone(),
            batch_size: translation.batch_size.max(1),
            max_workers: translation.max_workers.max(1),
            retry_base: Duration::from_millis(api.retry_delay_ms),
        })
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let base = u64::try_from(self.retry_base.as_millis()).unwrap_or(MAX_BACKOFF_MS);
        let factor = 2_u64.saturating_pow(u32::try_from(attempt).unwrap_or(u32::MAX));
        let delay = base.saturating_mul(factor).min(MAX_BACKOFF_MS);
        let jitter: u64 = thread_rng().gen_range(0..=delay / 4);
        Duration::from_millis(delay + jitter)
    }

    /// Splits `items` into batches and runs them on up to `max_workers`
    /// threads. A batch that fails leaves `None` in its slots.
    pub fn translate_items(&self, items: &[TranslationItem], glossary: &Glossary) -> TranslationOutcome {
        if items.is_empty() {
            return TranslationOutcome::default();
        }

        let batches: Vec<&[TranslationItem]> = items.chunks(self.batch_size).collect();
        let total = batches.len();
        tracing::info!("{} items in {} batches", items.len(), total);

        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<Result<Vec<Option<String>>>>>> =
            Mutex::new((0..total).map(|_| None).collect());

        thread::scope(|s| {
            for _ in 0..self.max_workers.min(total) {
                s.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(batch) = batches.get(i) else {
                        break;
                    };

                    let res = self.translate_batch(batch, glossary);
                    match &res {
                        Ok(_) => tracing::info!("batch {}/{} done", i + 1, total),
                        Err(e) => tracing::warn!("batch {}/{} failed: {e}", i + 1, total),
                    }

                    let mut guard = slots.lock().unwrap_or_else(|p| p.into_inner());
                    guard[i] = Some(res);
                });
            }
        });

        let slots = slots.into_inner().unwrap_or_else(|p| p.into_inner());

        let mut outcome = TranslationOutcome::default();
        for (i, (slot, batch)) in slots.into_iter().zip(&batches).enumerate() {
            match slot {
                Some(Ok(translations)) => outcome.translations.extend(translations),
                Some(Err(e)) => {
                    outcome.failures.push(BatchFailure {
                        batch: i + 1,
                        items: batch.len(),
                        error: e.to_string(),
                    });
                    outcome.translations.extend(batch.iter().map(|_| None));
                }
                None => {
                    outcome.failures.push(BatchFailure {
                        batch: i + 1,
                        items: batch.len(),
                        error: "batch was not processed".into(),
                    });
                    outcome.translations.extend(batch.iter().map(|_| None));
                }
            }
        }

        outcome
    }

    /// One API call for `batch`. Replies that are empty or lost a
    /// placeholder of their source come back as `None`.
    pub fn translate_batch(
        &self,
        batch: &[TranslationItem],
        glossary: &Glossary,
    ) -> Result<Vec<Option<String>>> {
        let terms = glossary.relevant_terms(batch.iter().map(|i| i.source.as_str()));
        let prompt = build_prompt(batch, &terms, &self.target_language, &self.game_context);

        let reply = self.request(&prompt)?;
        let parsed = parse_batch_response(&reply, batch.len());

        Ok(parsed
            .into_iter()
            .zip(batch)
            .map(|(t, item)| {
                let t = t?;
                let missing = text::missing_variables(&item.source, &t);
                if missing.is_empty() {
                    Some(t)
                } else {
                    tracing::warn!(
                        "[{}] {}: reply dropped {}, rejected",
                        item.section,
                        item.key,
                        missing.join(", ")
                    );
                    None
                }
            })
            .collect())
    }

    fn request(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.api.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "stream": false,
            "temperature": self.api.temperature,
            "top_p": self.api.top_p,
            "max_tokens": self.api.max_tokens
        });

        let mut last_err = String::new();

        for attempt in 0..self.api.max_retries {
            if attempt > 0 {
                thread::sleep(self.backoff(attempt - 1));
            }

            let resp = match self
                .client
                .post(&self.api.url)
                .bearer_auth(&self.api.api_key)
                .json(&body)
                .send()
            {
                Ok(r) => r,
                Err(e) => {
                    last_err = e.to_string();
                    tracing::debug!("attempt {} failed: {last_err}", attempt + 1);
                    continue;
                }
            };

            let status = resp.status();
            let text = match resp.text() {
                Ok(t) => t,
                Err(e) => {
                    last_err = e.to_string();
                    continue;
                }
            };

            if !status.is_success() {
                let msg = extract_error_message(status, &text);
                if !should_retry_http(status) {
                    return Err(Error::Api(msg));
                }
                tracing::debug!("attempt {} failed: {msg}", attempt + 1);
                last_err = msg;
                continue;
            }

            match message_content(&text) {
                Ok(content) => return Ok(content),
                Err(e) => {
                    tracing::debug!("attempt {} failed: {e}", attempt + 1);
                    last_err = e;
                }
            }
        }

        Err(Error::Api(format!(
            "giving up after {} attempts: {last_err}",
            self.api.max_retries
        )))
    }
}

fn message_content(body: &str) -> std::result::Result<String, String> {
    let v: serde_json::Value =
        serde_json::from_str(body).map_err(|_| "invalid JSON from API".to_string())?;

    v.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| "invalid API response: missing choices[0].message.content".to_string())
}

fn should_retry_http(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn extract_error_message(status: StatusCode, body_text: &str) -> String {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(body_text) {
        if let Some(msg) = v
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return format!("HTTP {}: {}", status.as_u16(), msg);
        }
        if let Some(msg) = v.get("message").and_then(|m| m.as_str()) {
            return format!("HTTP {}: {}", status.as_u16(), msg);
        }
    }

    let trimmed = body_text.trim();
    let snippet = match trimmed.char_indices().nth(400) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    };

    format!("HTTP {}: {}", status.as_u16(), snippet)
}

pub fn build_prompt(
    items: &[TranslationItem],
    terms: &[&crate::services::glossary::GlossaryTerm],
    target_language: &str,
    game_context: &str,
) -> String {
    let mut p = String::new();

    p.push_str(&format!(
        "Translate the following game text from English into {target_language}.\n\n"
    ));
    p.push_str("Rules:\n");
    p.push_str("1. Keep the exact technical meaning and the game's terminology.\n");
    p.push_str(
        "2. Keep rich-text tags such as [color=red], [item=...], [fluid=...], [entity=...], \
         [font=...] and [img=...] exactly as they are.\n",
    );
    p.push_str(
        "3. Game variables like __ENTITY__, __ITEM__, __1__ or __REMARK_COLOR_BEGIN__ are \
         never translated and must appear unchanged.\n",
    );
    p.push_str("4. Make the text lively and fitting for a game, without losing accuracy or tone.\n");
    p.push_str("5. Keep the text fluent and readable, on a single line.\n");
    if !terms.is_empty() {
        p.push_str("6. Translate the glossary terms below exactly as given.\n");
    }

    if !game_context.trim().is_empty() {
        p.push_str(&format!("\nGame context: {}\n", game_context.trim()));
    }

    if !terms.is_empty() {
        p.push_str("\nGlossary:\n");
        for t in terms {
            p.push_str(&format!("- {}: {}\n", t.source, t.target));
        }
    }

    p.push_str("\nReply with exactly one line per item, keeping the numbering:\n");
    p.push_str("1. Translation: <translation of item 1>\n");
    p.push_str("2. Translation: <translation of item 2>\n");
    p.push_str("...\n\nTexts:\n");

    for (i, item) in items.iter().enumerate() {
        if item.section.is_empty() {
            p.push_str(&format!("{}. Key: {}\n", i + 1, item.key));
        } else {
            p.push_str(&format!(
                "{}. Section: {}, Key: {}\n",
                i + 1,
                item.section,
                item.key
            ));
        }
        p.push_str(&format!("   Source: {}\n\n", item.source.trim()));
    }

    p
}

/// Maps a numbered reply back onto `expected` slots.
pub fn parse_batch_response(reply: &str, expected: usize) -> Vec<Option<String>> {
    let mut out: Vec<Option<String>> = vec![None; expected];
    let mut matched = false;

    for line in reply.lines() {
        let Some(caps) = numbered_line_re().captures(line) else {
            continue;
        };
        let Ok(n) = caps[1].parse::<usize>() else {
            continue;
        };
        if n == 0 || n > expected {
            continue;
        }

        matched = true;
        let t = caps[2].trim();
        if !t.is_empty() {
            out[n - 1] = Some(t.to_string());
        }
    }

    if matched {
        return out;
    }

    let lines: Vec<&str> = reply
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if lines.len() == expected {
        for (slot, line) in out.iter_mut().zip(lines) {
            let t = label_re().replace(line, "");
            let t = t.trim();
            if !t.is_empty() {
                *slot = Some(t.to_string());
            }
        }
    }

    out
}
