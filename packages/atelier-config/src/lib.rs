mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	CategoricalAttribute, Config, EmbeddingProviderConfig, Filters, Generation, LlmProviderConfig,
	NumericAttribute, Pipeline, ProviderConfig, Providers, Qdrant, Retrieval, Routing, Service,
	Session, Storage,
};

use std::{collections::HashSet, fs, path::Path};

pub const STRATEGIES: [&str; 3] = ["keyword", "vector", "hybrid"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.qdrant.products_collection.trim().is_empty()
		|| cfg.storage.qdrant.faq_collection.trim().is_empty()
	{
		return Err(Error::Validation {
			message: "storage.qdrant collections must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.products_collection == cfg.storage.qdrant.faq_collection {
		return Err(Error::Validation {
			message: "storage.qdrant.products_collection and storage.qdrant.faq_collection must differ."
				.to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("rerank", &cfg.providers.rerank.api_key),
		("llm", &cfg.providers.llm.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}
	for (label, timeout_ms) in [
		("embedding", cfg.providers.embedding.timeout_ms),
		("rerank", cfg.providers.rerank.timeout_ms),
		("llm", cfg.providers.llm.timeout_ms),
	] {
		if timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("Provider {label} timeout_ms must be greater than zero."),
			});
		}
	}

	if !STRATEGIES.contains(&cfg.retrieval.default_strategy.as_str()) {
		return Err(Error::Validation {
			message: "retrieval.default_strategy must be one of keyword, vector, or hybrid."
				.to_string(),
		});
	}
	if cfg.retrieval.top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.top_k must be greater than zero.".to_string(),
		});
	}
	if !cfg.retrieval.alpha.is_finite() {
		return Err(Error::Validation {
			message: "retrieval.alpha must be a finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.retrieval.alpha) {
		return Err(Error::Validation {
			message: "retrieval.alpha must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.retrieval.k_rrf == 0 {
		return Err(Error::Validation {
			message: "retrieval.k_rrf must be greater than zero.".to_string(),
		});
	}
	if cfg.pipeline.stage_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "pipeline.stage_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.pipeline.deadline_ms == 0 {
		return Err(Error::Validation {
			message: "pipeline.deadline_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.routing.max_tokens == 0 {
		return Err(Error::Validation {
			message: "routing.max_tokens must be greater than zero.".to_string(),
		});
	}
	if cfg.filters.max_tokens == 0 {
		return Err(Error::Validation {
			message: "filters.max_tokens must be greater than zero.".to_string(),
		});
	}

	let mut seen = HashSet::new();

	for name in cfg
		.filters
		.categorical
		.iter()
		.map(|attr| attr.name.as_str())
		.chain(cfg.filters.numeric.iter().map(|attr| attr.name.as_str()))
	{
		if name.trim().is_empty() {
			return Err(Error::Validation {
				message: "filters attribute names must be non-empty.".to_string(),
			});
		}
		if !seen.insert(name) {
			return Err(Error::Validation {
				message: format!("filters attribute {name} is declared more than once."),
			});
		}
	}

	if cfg.generation.system_prompt.trim().is_empty() {
		return Err(Error::Validation {
			message: "generation.system_prompt must be non-empty.".to_string(),
		});
	}
	if !cfg.generation.temperature.is_finite() || !(0.0..=2.0).contains(&cfg.generation.temperature)
	{
		return Err(Error::Validation {
			message: "generation.temperature must be in the range 0.0-2.0.".to_string(),
		});
	}
	if cfg.generation.max_tokens == 0 {
		return Err(Error::Validation {
			message: "generation.max_tokens must be greater than zero.".to_string(),
		});
	}
	if cfg.session.context_window_tokens == 0 {
		return Err(Error::Validation {
			message: "session.context_window_tokens must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let strategy = cfg.retrieval.default_strategy.trim().to_lowercase();

	cfg.retrieval.default_strategy = match strategy.as_str() {
		"bm25" => "keyword".to_string(),
		"semantic" => "vector".to_string(),
		_ => strategy,
	};

	for attr in &mut cfg.filters.categorical {
		attr.name = attr.name.trim().to_string();
		attr.values.retain(|value| !value.trim().is_empty());
	}
	for attr in &mut cfg.filters.numeric {
		attr.name = attr.name.trim().to_string();
	}
}
