//! Groq inference client.
//!
//! Talks to Groq's OpenAI-compatible chat completions endpoint. Analysis
//! calls are cached by content hash with a TTL so repeated requests for the
//! same PR or snippet don't burn inference quota.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};

const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

struct CacheEntry {
    text: String,
    at: Instant,
}

/// Groq API client.
pub struct GroqClient {
    api_key: String,
    model: String,
    http: reqwest::Client,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl GroqClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: "mixtral-8x7b-32768".to_string(),
            http: reqwest::Client::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Single-turn completion, uncached.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": &self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.3,
            "max_tokens": 2000,
        });

        let resp = self
            .http
            .post(GROQ_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to call Groq API")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Groq API error {status}: {body}");
        }

        let parsed: ChatResponse = resp.json().await.context("Failed to parse Groq response")?;
        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Groq usage"
            );
        }
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("Groq response had no choices")
    }

    /// Completion cached by (kind, content) for [`CACHE_TTL`].
    pub async fn analyze(&self, kind: &str, system: &str, content: &str) -> Result<String> {
        let key = cache_key(kind, content);
        if let Some(hit) = self.cache_get(&key) {
            tracing::debug!(kind, "Analysis cache hit");
            return Ok(hit);
        }

        let text = self.complete(system, content).await?;
        self.cache.lock().unwrap().insert(
            key,
            CacheEntry {
                text: text.clone(),
                at: Instant::now(),
            },
        );
        Ok(text)
    }

    fn cache_get(&self, key: &str) -> Option<String> {
        let mut cache = self.cache.lock().unwrap();
        match cache.get(key) {
            Some(entry) if entry.at.elapsed() < CACHE_TTL => Some(entry.text.clone()),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }
}

fn cache_key(kind: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_separate_kinds_and_content() {
        let a = cache_key("pr", "diff");
        let b = cache_key("code", "diff");
        let c = cache_key("pr", "other");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, cache_key("pr", "diff"));
    }

    #[test]
    fn chat_response_decodes() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"looks fine"}}],
                "usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
        )
        .unwrap();
        assert_eq!(parsed.choices[0].message.content, "looks fine");
        assert_eq!(parsed.usage.unwrap().completion_tokens, 5);
    }
}
