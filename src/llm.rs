//! HTTP-backed implementation of [`LlmBackend`]: builds a two-image
//! adjudication prompt, calls a chat-completion endpoint with retries,
//! and extracts a yes/no verdict from the response.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::error::{Error, Result};
use crate::options::{LlmBackend, LlmContext};
use crate::types::Frame;

#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        LlmConfig {
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-3-5-sonnet-latest".to_string(),
            timeout: Duration::from_secs(40),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

pub struct HttpLlmBackend {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpLlmBackend {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::LlmTransport(e.to_string()))?;
        Ok(HttpLlmBackend { client, config })
    }
}

#[derive(Debug)]
enum Outcome {
    Verdict(Option<bool>),
    Retry,
}

#[async_trait]
impl LlmBackend for HttpLlmBackend {
    #[instrument(skip(self, ctx), fields(node_frame = ctx.frame.index))]
    async fn judge(&self, ctx: LlmContext<'_>) -> Result<Option<bool>> {
        let Some((image_a, image_b)) = select_image_pair(ctx.frame, ctx.prev_frame, ctx.next_frame) else {
            return Ok(None);
        };

        let data_url_a = encode_data_url(image_a)?;
        let data_url_b = encode_data_url(image_b)?;
        let system = system_prompt();
        let user = user_prompt(ctx.frame, &ctx.prompt);

        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = self.call_once(&system, &user, &data_url_a, &data_url_b).await;
            match result {
                Ok(Outcome::Verdict(v)) => return Ok(v),
                Ok(Outcome::Retry) if attempts < self.config.max_retries => {
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Ok(Outcome::Retry) => return Ok(None),
                Err(e) if attempts < self.config.max_retries => {
                    warn!(target: "dagverify::llm", error = %e, attempt = attempts, "llm call failed, retrying");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => {
                    warn!(target: "dagverify::llm", error = %e, "llm call exhausted retries");
                    return Ok(None);
                }
            }
        }
    }
}

impl HttpLlmBackend {
    async fn call_once(
        &self,
        system: &str,
        user: &str,
        image_a: &str,
        image_b: &str,
    ) -> Result<Outcome> {
        let request = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: 512,
            system: system.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: vec![
                    Content::Image { source: ImageSource::from_data_url(image_a) },
                    Content::Image { source: ImageSource::from_data_url(image_b) },
                    Content::Text { text: user.to_string() },
                ],
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::LlmTransport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::LlmTransport(format!(
                "llm endpoint returned status {}",
                response.status()
            )));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| Error::LlmProtocol(e.to_string()))?;

        let text = body
            .content
            .iter()
            .find_map(|c| match c {
                Content::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .unwrap_or("");

        if text.trim().is_empty() {
            return Ok(Outcome::Retry);
        }

        Ok(interpret_response(text))
    }
}

/// Prefer (current, next); otherwise (previous, current); otherwise give
/// up (`None`), which the caller treats as an unknown verdict.
fn select_image_pair<'a>(
    current: &'a Frame,
    prev: Option<&'a Frame>,
    next: Option<&'a Frame>,
) -> Option<(&'a Path, &'a Path)> {
    if let (Some(cur_img), Some(next_img)) = (&current.image, next.and_then(|f| f.image.as_ref())) {
        return Some((cur_img.as_path(), next_img.as_path()));
    }
    if let (Some(prev_img), Some(cur_img)) = (prev.and_then(|f| f.image.as_ref()), &current.image) {
        return Some((prev_img.as_path(), cur_img.as_path()));
    }
    None
}

fn encode_data_url(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(format!("data:image/jpeg;base64,{}", BASE64.encode(bytes)))
}

fn system_prompt() -> String {
    "You are verifying whether a mobile app reached a specific milestone during an \
     automated interaction trace. Prefer what you see in the screenshots over the \
     recorded reasoning or action text, which may be wrong. Judge strictly against the \
     criterion given to you, and respond with JSON only in the form \
     {\"result\": \"yes\"|\"no\", \"reason\": \"...\"}."
        .to_string()
}

fn user_prompt(frame: &Frame, criterion: &str) -> String {
    format!(
        "Task: {}\nCriterion to verify: {}\nRecorded reasoning (advisory, possibly wrong): {}\n\
         Recorded action (advisory, possibly wrong): {}\n\
         Answer strictly as JSON: {{\"result\": \"yes\"|\"no\", \"reason\": \"...\"}}",
        frame.task_description,
        criterion,
        frame.reasoning.clone().unwrap_or_default(),
        frame
            .action
            .as_ref()
            .map(|a| a.type_name().to_string())
            .unwrap_or_default(),
    )
}

#[derive(Debug, Deserialize)]
struct Verdict {
    result: String,
    #[allow(dead_code)]
    #[serde(default)]
    reason: String,
}

fn interpret_response(text: &str) -> Outcome {
    match extract_json(text) {
        Some(verdict) => match verdict.result.trim().to_lowercase().as_str() {
            "yes" => Outcome::Verdict(Some(true)),
            "no" => Outcome::Verdict(Some(false)),
            "" => Outcome::Retry,
            _ => Outcome::Verdict(None),
        },
        None => text_fallback(text),
    }
}

/// Three-tier extraction: (1) direct parse; (2) fenced ```json block;
/// (3) first balanced `{...}` object.
fn extract_json(text: &str) -> Option<Verdict> {
    if let Ok(v) = serde_json::from_str::<Verdict>(text.trim()) {
        return Some(v);
    }

    let fenced = Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").unwrap();
    if let Some(caps) = fenced.captures(text) {
        if let Ok(v) = serde_json::from_str::<Verdict>(&caps[1]) {
            return Some(v);
        }
    }

    if let Some(obj) = first_balanced_object(text) {
        if let Ok(v) = serde_json::from_str::<Verdict>(&obj) {
            return Some(v);
        }
    }

    None
}

fn first_balanced_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// When every JSON extraction tier fails: "yes" present without "no"
/// yields true, "no" without "yes" yields false, otherwise retry.
fn text_fallback(text: &str) -> Outcome {
    let lower = text.to_lowercase();
    let has_yes = lower.contains("yes");
    let has_no = lower.contains("no");
    if has_yes && !has_no {
        Outcome::Verdict(Some(true))
    } else if has_no && !has_yes {
        Outcome::Verdict(Some(false))
    } else {
        Outcome::Retry
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Content {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize, Deserialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: String,
    media_type: String,
    data: String,
}

impl ImageSource {
    fn from_data_url(data_url: &str) -> Self {
        let data = data_url.split(',').nth(1).unwrap_or("").to_string();
        ImageSource {
            kind: "base64".to_string(),
            media_type: "image/jpeg".to_string(),
            data,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<Content>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_json_parses() {
        let outcome = interpret_response(r#"{"result": "yes", "reason": "button visible"}"#);
        assert!(matches!(outcome, Outcome::Verdict(Some(true))));
    }

    #[test]
    fn fenced_json_parses() {
        let outcome = interpret_response("```json\n{\"result\": \"no\", \"reason\": \"not found\"}\n```");
        assert!(matches!(outcome, Outcome::Verdict(Some(false))));
    }

    #[test]
    fn balanced_brace_extraction_ignores_surrounding_prose() {
        let outcome = interpret_response("Sure, here you go: {\"result\": \"yes\", \"reason\": \"ok\"} thanks!");
        assert!(matches!(outcome, Outcome::Verdict(Some(true))));
    }

    #[test]
    fn malformed_json_falls_back_to_text_heuristic() {
        let outcome = interpret_response("the answer is yes, definitely");
        assert!(matches!(outcome, Outcome::Verdict(Some(true))));
    }

    #[test]
    fn ambiguous_text_retries() {
        let outcome = interpret_response("not sure, could be either");
        assert!(matches!(outcome, Outcome::Retry));
    }

    #[test]
    fn empty_result_field_retries() {
        let outcome = interpret_response(r#"{"result": "", "reason": "unclear"}"#);
        assert!(matches!(outcome, Outcome::Retry));
    }
}
