use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
	pub role: String,
	pub content: String,
}
impl ChatMessage {
	pub fn system(content: impl Into<String>) -> Self {
		Self { role: "system".to_string(), content: content.into() }
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self { role: "user".to_string(), content: content.into() }
	}

	pub fn assistant(content: impl Into<String>) -> Self {
		Self { role: "assistant".to_string(), content: content.into() }
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
	pub messages: Vec<ChatMessage>,
	pub temperature: f32,
	pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
	pub text: String,
	pub prompt_tokens: u32,
	pub completion_tokens: u32,
}
impl Completion {
	pub fn total_tokens(&self) -> u32 {
		self.prompt_tokens.saturating_add(self.completion_tokens)
	}
}

pub async fn complete(
	cfg: &atelier_config::LlmProviderConfig,
	request: &CompletionRequest,
) -> Result<Completion> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": request.temperature,
		"max_tokens": request.max_tokens,
		"messages": request.messages,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_completion_response(json)
}

fn parse_completion_response(json: Value) -> Result<Completion> {
	let text = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Completion response is missing choices[0].message.content.".to_string(),
		})?;
	let usage = json.get("usage");
	let prompt_tokens = usage_count(usage, "prompt_tokens");
	let completion_tokens = usage_count(usage, "completion_tokens");

	Ok(Completion { text: text.to_string(), prompt_tokens, completion_tokens })
}

fn usage_count(usage: Option<&Value>, key: &str) -> u32 {
	usage
		.and_then(|u| u.get(key))
		.and_then(|v| v.as_u64())
		.map(|v| u32::try_from(v).unwrap_or(u32::MAX))
		.unwrap_or(0)
}
