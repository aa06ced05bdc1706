use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use atelier_config::{CategoricalAttribute, Config, Error, NumericAttribute};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_toml_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");
	let table = root
		.as_table_mut()
		.expect("Template config must be a table.")
		.get_mut(section)
		.and_then(Value::as_table_mut)
		.expect("Template config must include the requested section.");

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("atelier_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_payload(payload: String) -> atelier_config::Result<Config> {
	let path = write_temp_config(payload);
	let result = atelier_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn base_config() -> Config {
	toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse test config.")
}

#[test]
fn sample_config_loads() {
	let cfg = load_payload(SAMPLE_CONFIG_TEMPLATE_TOML.to_string())
		.expect("Sample config must be valid.");

	assert_eq!(cfg.retrieval.default_strategy, "vector");
	assert_eq!(cfg.retrieval.k_rrf, 60);
	assert_eq!(cfg.filters.categorical.len(), 4);
	assert_eq!(cfg.filters.numeric[0].name, "price");
	assert_eq!(cfg.routing.max_tokens, 10);
}

#[test]
fn default_strategy_is_normalized_before_validation() {
	let payload = sample_toml_with("retrieval", "default_strategy", Value::from(" Hybrid "));
	let cfg = load_payload(payload).expect("Mixed-case strategy must be accepted.");

	assert_eq!(cfg.retrieval.default_strategy, "hybrid");
}

#[test]
fn strategy_aliases_resolve_to_canonical_names() {
	for (alias, canonical) in [("bm25", "keyword"), ("Semantic", "vector")] {
		let payload = sample_toml_with("retrieval", "default_strategy", Value::from(alias));
		let cfg = load_payload(payload).expect("Strategy alias must be accepted.");

		assert_eq!(cfg.retrieval.default_strategy, canonical);
	}
}

#[test]
fn unknown_strategy_is_rejected() {
	let payload = sample_toml_with("retrieval", "default_strategy", Value::from("fuzzy"));
	let err = load_payload(payload).expect_err("Expected strategy validation error.");

	assert!(
		err.to_string()
			.contains("retrieval.default_strategy must be one of keyword, vector, or hybrid."),
		"Unexpected error: {err}"
	);
}

#[test]
fn alpha_must_be_within_unit_range() {
	let payload = sample_toml_with("retrieval", "alpha", Value::Float(1.5));
	let err = load_payload(payload).expect_err("Expected alpha validation error.");

	assert!(
		err.to_string().contains("retrieval.alpha must be in the range 0.0-1.0."),
		"Unexpected error: {err}"
	);
}

#[test]
fn k_rrf_must_be_positive() {
	let payload = sample_toml_with("retrieval", "k_rrf", Value::Integer(0));
	let err = load_payload(payload).expect_err("Expected k_rrf validation error.");

	assert!(err.to_string().contains("retrieval.k_rrf must be greater than zero."));
}

#[test]
fn parse_errors_keep_the_path() {
	let path = write_temp_config("[service\nlog_level = 1".to_string());
	let result = atelier_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	match result {
		Err(Error::ParseConfig { path: reported, .. }) => assert_eq!(reported, path),
		other => panic!("Expected parse error, got {other:?}."),
	}
}

#[test]
fn embedding_dimensions_must_match_vector_dim() {
	let mut cfg = base_config();

	cfg.providers.embedding.dimensions = 768;

	let err = atelier_config::validate(&cfg).expect_err("Expected dimension mismatch error.");

	assert!(err.to_string().contains("must match storage.qdrant.vector_dim"));
}

#[test]
fn provider_api_keys_must_be_present() {
	let mut cfg = base_config();

	cfg.providers.rerank.api_key = "  ".to_string();

	let err = atelier_config::validate(&cfg).expect_err("Expected api key validation error.");

	assert_eq!(err.to_string(), "Provider rerank api_key must be non-empty.");
}

#[test]
fn filter_attributes_must_be_unique_across_kinds() {
	let mut cfg = base_config();

	cfg.filters.categorical.push(CategoricalAttribute { name: "price".to_string(), values: vec![] });

	let err = atelier_config::validate(&cfg).expect_err("Expected duplicate attribute error.");

	assert!(err.to_string().contains("filters attribute price is declared more than once."));
}

#[test]
fn filters_may_be_empty() {
	let mut cfg = base_config();

	cfg.filters.categorical.clear();
	cfg.filters.numeric = Vec::<NumericAttribute>::new();

	assert!(atelier_config::validate(&cfg).is_ok());
}

#[test]
fn context_window_must_be_positive() {
	let mut cfg = base_config();

	cfg.session.context_window_tokens = 0;

	assert!(atelier_config::validate(&cfg).is_err());
}
