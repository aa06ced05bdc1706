pub mod completion;
pub mod embedding;
pub mod rerank;

mod error;

pub use completion::{ChatMessage, Completion, CompletionRequest};
pub use error::{Error, Result};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_non_string_default_headers() {
		let mut default_headers = Map::new();

		default_headers.insert("x-retry".to_string(), Value::from(3));

		let err = auth_headers("key", &default_headers).expect_err("Expected header error.");

		assert!(matches!(err, Error::InvalidConfig { .. }));
	}

	#[test]
	fn merges_bearer_and_default_headers() {
		let mut default_headers = Map::new();

		default_headers.insert("x-org".to_string(), Value::from("atelier"));

		let headers = auth_headers("key", &default_headers).expect("Headers must build.");

		assert_eq!(headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()), Some("Bearer key"));
		assert_eq!(headers.get("x-org").and_then(|v| v.to_str().ok()), Some("atelier"));
	}
}
