pub mod filter;
pub mod generate;
pub mod pipeline;
pub mod request;
pub mod rerank;
pub mod retrieval;
pub mod router;
pub mod store;
pub mod trace;

mod error;

use std::{future::Future, pin::Pin, sync::Arc};

use atelier_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, ProviderConfig};
use atelier_domain::SessionRegistry;
use atelier_providers::{Completion, CompletionRequest, completion, embedding, rerank as rerank_api};

pub use error::{Error, Result};
pub use generate::{ContextBundle, ContextSource};
pub use pipeline::Degradation;
pub use request::{AnswerResponse, Query, QueryParams, RetrievalConfigUsed, Strategy, TokenUsage};
pub use retrieval::{CandidateSource, FusedResult, RankedCandidate};
pub use store::DocumentStore;
pub use trace::{AttributeValue, LogTracer, RecordingTracer, Span, SpanContext, SpanRecord, Tracer};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait RerankProvider
where
	Self: Send + Sync,
{
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f32>>>;
}

pub trait LlmProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		request: &'a CompletionRequest,
	) -> BoxFuture<'a, Result<Completion>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub rerank: Arc<dyn RerankProvider>,
	pub llm: Arc<dyn LlmProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		rerank: Arc<dyn RerankProvider>,
		llm: Arc<dyn LlmProvider>,
	) -> Self {
		Self { embedding, rerank, llm }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), rerank: provider.clone(), llm: provider }
	}
}

pub struct AtelierService {
	pub cfg: Config,
	pub store: Arc<dyn DocumentStore>,
	pub providers: Providers,
	pub tracer: Arc<dyn Tracer>,
}
impl AtelierService {
	pub fn new(cfg: Config, store: Arc<dyn DocumentStore>) -> Self {
		Self::with_providers(cfg, store, Providers::default())
	}

	pub fn with_providers(cfg: Config, store: Arc<dyn DocumentStore>, providers: Providers) -> Self {
		Self { cfg, store, providers, tracer: Arc::new(LogTracer) }
	}

	pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
		self.tracer = tracer;

		self
	}

	/// An empty registry sized to the configured context window.
	pub fn session_registry(&self) -> SessionRegistry {
		SessionRegistry::new(self.cfg.session.context_window_tokens)
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}
impl RerankProvider for DefaultProviders {
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(async move { Ok(rerank_api::rerank(cfg, query, docs).await?) })
	}
}
impl LlmProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		request: &'a CompletionRequest,
	) -> BoxFuture<'a, Result<Completion>> {
		Box::pin(async move { Ok(completion::complete(cfg, request).await?) })
	}
}
