use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub retrieval: Retrieval,
	pub pipeline: Pipeline,
	#[serde(default)]
	pub routing: Routing,
	pub filters: Filters,
	pub generation: Generation,
	pub session: Session,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub products_collection: String,
	pub faq_collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub rerank: ProviderConfig,
	pub llm: LlmProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Chat-completion endpoint shared by routing, filter extraction and answer generation.
///
/// Sampling parameters are chosen per stage, so they are not part of the provider.
#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Retrieval {
	/// One of keyword, vector, or hybrid.
	pub default_strategy: String,
	pub top_k: u32,
	/// Keyword weight for hybrid fusion. The vector list receives `1 - alpha`.
	pub alpha: f32,
	pub k_rrf: u32,
}

#[derive(Debug, Deserialize)]
pub struct Pipeline {
	/// Upper bound for any single external call.
	pub stage_timeout_ms: u64,
	/// Whole-request deadline used when the caller does not supply one.
	pub deadline_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Routing {
	pub max_tokens: u32,
}
impl Default for Routing {
	fn default() -> Self {
		Self { max_tokens: 10 }
	}
}

#[derive(Debug, Deserialize)]
pub struct Filters {
	#[serde(default = "default_filter_max_tokens")]
	pub max_tokens: u32,
	#[serde(default)]
	pub categorical: Vec<CategoricalAttribute>,
	#[serde(default)]
	pub numeric: Vec<NumericAttribute>,
}

#[derive(Debug, Deserialize)]
pub struct CategoricalAttribute {
	pub name: String,
	/// Allowed values. An empty list accepts any string the model returns.
	#[serde(default)]
	pub values: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct NumericAttribute {
	pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct Generation {
	pub system_prompt: String,
	pub temperature: f32,
	pub max_tokens: u32,
	/// Token budget for conversation history inside a single generation prompt.
	pub history_token_budget: u32,
}

#[derive(Debug, Deserialize)]
pub struct Session {
	pub context_window_tokens: u32,
}

fn default_filter_max_tokens() -> u32 {
	1_500
}
