use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atelier_config::Config;
use atelier_domain::{FilterSpec, Intent};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
	#[serde(alias = "bm25")]
	Keyword,
	#[serde(alias = "semantic")]
	Vector,
	Hybrid,
}
impl Strategy {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Keyword => "keyword",
			Self::Vector => "vector",
			Self::Hybrid => "hybrid",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"keyword" | "bm25" => Some(Self::Keyword),
			"vector" | "semantic" => Some(Self::Vector),
			"hybrid" => Some(Self::Hybrid),
			_ => None,
		}
	}
}

/// Per-request overrides. Anything left unset resolves from configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryParams {
	pub use_retrieval: Option<bool>,
	pub strategy: Option<Strategy>,
	pub top_k: Option<u32>,
	pub simplified: Option<bool>,
	pub use_rerank: Option<bool>,
	pub rerank_query_override: Option<String>,
	pub alpha: Option<f32>,
	pub k_rrf: Option<u32>,
	pub deadline_ms: Option<u64>,
}

/// A validated request. Only [`Query::build`] constructs one.
#[derive(Debug, Clone)]
pub struct Query {
	text: String,
	identity_id: String,
	use_retrieval: bool,
	strategy: Strategy,
	top_k: u32,
	simplified: bool,
	use_rerank: bool,
	rerank_query_override: Option<String>,
	alpha: f32,
	k_rrf: u32,
	deadline_ms: u64,
}
impl Query {
	pub fn build(cfg: &Config, text: &str, identity_id: &str, params: &QueryParams) -> Result<Self> {
		let text = text.trim();

		if text.is_empty() {
			return Err(invalid("query text must be non-empty."));
		}

		let identity_id = identity_id.trim();

		if identity_id.is_empty() {
			return Err(invalid("identity_id must be non-empty."));
		}

		let strategy = match params.strategy {
			Some(strategy) => strategy,
			None => Strategy::parse(&cfg.retrieval.default_strategy).ok_or_else(|| {
				invalid(&format!(
					"retrieval.default_strategy {} is not supported.",
					cfg.retrieval.default_strategy
				))
			})?,
		};
		let top_k = params.top_k.unwrap_or(cfg.retrieval.top_k);

		if top_k == 0 {
			return Err(invalid("top_k must be greater than zero."));
		}

		let alpha = params.alpha.unwrap_or(cfg.retrieval.alpha);

		if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
			return Err(invalid("alpha must be in the range 0.0-1.0."));
		}

		let k_rrf = params.k_rrf.unwrap_or(cfg.retrieval.k_rrf);

		if k_rrf == 0 {
			return Err(invalid("k_rrf must be greater than zero."));
		}

		let deadline_ms = params.deadline_ms.unwrap_or(cfg.pipeline.deadline_ms);

		if deadline_ms == 0 {
			return Err(invalid("deadline_ms must be greater than zero."));
		}

		let rerank_query_override = params
			.rerank_query_override
			.as_deref()
			.map(str::trim)
			.filter(|value| !value.is_empty())
			.map(str::to_string);

		Ok(Self {
			text: text.to_string(),
			identity_id: identity_id.to_string(),
			use_retrieval: params.use_retrieval.unwrap_or(true),
			strategy,
			top_k,
			simplified: params.simplified.unwrap_or(false),
			use_rerank: params.use_rerank.unwrap_or(false),
			rerank_query_override,
			alpha,
			k_rrf,
			deadline_ms,
		})
	}

	pub fn text(&self) -> &str {
		&self.text
	}

	pub fn identity_id(&self) -> &str {
		&self.identity_id
	}

	pub fn use_retrieval(&self) -> bool {
		self.use_retrieval
	}

	pub fn strategy(&self) -> Strategy {
		self.strategy
	}

	pub fn top_k(&self) -> u32 {
		self.top_k
	}

	pub fn simplified(&self) -> bool {
		self.simplified
	}

	pub fn use_rerank(&self) -> bool {
		self.use_rerank
	}

	/// Text sent to the relevance scorer: the override when present, the query otherwise.
	pub fn rerank_text(&self) -> &str {
		self.rerank_query_override.as_deref().unwrap_or(&self.text)
	}

	pub fn alpha(&self) -> f32 {
		self.alpha
	}

	pub fn k_rrf(&self) -> u32 {
		self.k_rrf
	}

	pub fn deadline_ms(&self) -> u64 {
		self.deadline_ms
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
	pub prompt_tokens: u32,
	pub completion_tokens: u32,
	pub total_tokens: u32,
}

/// What retrieval actually ran for a request.
///
/// With retrieval disabled only `use_retrieval` is meaningful and every other field is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalConfigUsed {
	pub use_retrieval: bool,
	pub route: Option<Intent>,
	pub strategy: Option<Strategy>,
	pub top_k: Option<u32>,
	pub alpha: Option<f32>,
	pub k_rrf: Option<u32>,
	pub simplified: bool,
	pub rerank: bool,
	pub filters: FilterSpec,
	pub result_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
	pub answer_text: String,
	pub token_usage: TokenUsage,
	/// Tokens spent on routing and filter extraction.
	pub retrieval_tokens: u32,
	pub retrieval_config_used: RetrievalConfigUsed,
	pub trace_id: Uuid,
}

fn invalid(message: &str) -> Error {
	Error::InvalidParameter { message: message.to_string() }
}

#[cfg(test)]
mod tests {
	use super::Strategy;

	#[test]
	fn strategy_names_accept_aliases() {
		assert_eq!(Strategy::parse("BM25"), Some(Strategy::Keyword));
		assert_eq!(Strategy::parse(" semantic "), Some(Strategy::Vector));
		assert_eq!(Strategy::parse("hybrid"), Some(Strategy::Hybrid));
		assert_eq!(Strategy::parse("dense"), None);
	}
}
