use std::{future::Future, time::Duration};

use tokio::time::{self, Instant};

use atelier_domain::{
	ConversationSession, ConversationTurn, Corpus, FilterSpec, Intent, Role, SessionRegistry,
	tokens,
};

use crate::{
	AnswerResponse, AtelierService, ContextBundle, ContextSource, Error, Query, QueryParams,
	RankedCandidate, Result, RetrievalConfigUsed, Span, SpanContext, Strategy,
	filter::FilterExtraction,
};

/// Non-fatal stage failures. The stage substitutes a default and the request continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
	RoutingFailure,
	FilterExtractionFailure,
	RetrievalTimeout,
	RetrievalFailure,
	EmptyRetrievalResult,
	RerankDegraded,
}
impl Degradation {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::RoutingFailure => "routing_failure",
			Self::FilterExtractionFailure => "filter_extraction_failure",
			Self::RetrievalTimeout => "retrieval_timeout",
			Self::RetrievalFailure => "retrieval_failure",
			Self::EmptyRetrievalResult => "empty_retrieval_result",
			Self::RerankDegraded => "rerank_degraded",
		}
	}
}

enum StageError {
	Timeout,
	Failed(Error),
}
impl StageError {
	fn detail(&self) -> String {
		match self {
			Self::Timeout => "stage timed out".to_string(),
			Self::Failed(err) => err.to_string(),
		}
	}
}

/// Request deadline plus the per-stage cap on external calls.
struct Deadline {
	started: Instant,
	budget: Duration,
	stage_timeout: Duration,
}
impl Deadline {
	fn start(deadline_ms: u64, stage_timeout_ms: u64) -> Self {
		Self {
			started: Instant::now(),
			budget: Duration::from_millis(deadline_ms),
			stage_timeout: Duration::from_millis(stage_timeout_ms),
		}
	}

	/// Time available to the next stage, or `PipelineTimeout` once the request is out of time.
	fn stage_budget(&self, stage: &str) -> Result<Duration> {
		let remaining = self.budget.saturating_sub(self.started.elapsed());

		if remaining.is_zero() {
			return Err(Error::PipelineTimeout { stage: stage.to_string() });
		}

		Ok(remaining.min(self.stage_timeout))
	}
}

struct RetrievedContext {
	bundle: ContextBundle,
	config_used: RetrievalConfigUsed,
	retrieval_tokens: u32,
}

impl AtelierService {
	/// Answers one query for one identity and records the exchange in its session.
	///
	/// The session is only updated when an answer is produced.
	pub async fn answer_query(
		&self,
		sessions: &mut SessionRegistry,
		query_text: &str,
		identity_id: &str,
		params: &QueryParams,
	) -> Result<AnswerResponse> {
		let query = Query::build(&self.cfg, query_text, identity_id, params)?;
		let deadline = Deadline::start(query.deadline_ms(), self.cfg.pipeline.stage_timeout_ms);
		let mut root = self.tracer.start_span("answer_query", None);

		root.set_attribute("identity_id", query.identity_id());
		root.set_attribute("use_retrieval", query.use_retrieval());
		root.set_attribute("simplified", query.simplified());

		let ctx = root.context();
		let result = self.run_pipeline(sessions, &query, &deadline, &ctx).await;

		match &result {
			Ok(response) => {
				root.set_attribute("retrieval_tokens", response.retrieval_tokens);
				root.set_attribute("total_tokens", response.token_usage.total_tokens);
			},
			Err(err) => {
				root.set_attribute("error", err.to_string());
				tracing::error!(error = %err, trace_id = %ctx.trace_id, "Query failed.");
			},
		}

		self.tracer.export(root.end());

		result
	}

	async fn run_pipeline(
		&self,
		sessions: &mut SessionRegistry,
		query: &Query,
		deadline: &Deadline,
		ctx: &SpanContext,
	) -> Result<AnswerResponse> {
		let history = sessions
			.get(query.identity_id())
			.map(ConversationSession::snapshot)
			.unwrap_or_default();
		let retrieved = if query.use_retrieval() {
			self.retrieve_context(query, deadline, ctx).await?
		} else {
			let mut span = self.tracer.start_span("direct", Some(ctx));

			span.set_attribute("use_retrieval", false);
			self.tracer.export(span.end());

			RetrievedContext {
				bundle: ContextBundle::direct(),
				config_used: RetrievalConfigUsed::default(),
				retrieval_tokens: 0,
			}
		};
		let budget = deadline.stage_budget("generate")?;
		let mut span = self.tracer.start_span("generate", Some(ctx));

		span.set_attribute("context_source", retrieved.bundle.source().as_str());
		span.set_attribute("context_count", retrieved.bundle.len());
		span.set_attribute("history_turns", history.len());

		let generated =
			match bounded(budget, self.generate(query.text(), &retrieved.bundle, &history)).await {
				Ok(generated) => generated,
				Err(err) => {
					let err = match err {
						StageError::Timeout => Error::GenerationFailure {
							message: "Generation timed out.".to_string(),
						},
						StageError::Failed(err) => err,
					};

					span.set_attribute("error", err.to_string());
					self.tracer.export(span.end());

					return Err(err);
				},
			};

		span.set_attribute("prompt_tokens", generated.usage.prompt_tokens);
		span.set_attribute("completion_tokens", generated.usage.completion_tokens);
		self.tracer.export(span.end());

		let session = sessions.session_mut(query.identity_id());
		let assistant_tokens = if generated.usage.completion_tokens > 0 {
			generated.usage.completion_tokens
		} else {
			tokens::estimate_tokens(&generated.text)
		};
		let mut evicted = session.append(ConversationTurn::estimated(Role::User, query.text()));

		evicted += session.append(ConversationTurn::new(
			Role::Assistant,
			generated.text.clone(),
			assistant_tokens,
		));

		tracing::debug!(
			identity_id = query.identity_id(),
			turns = session.len(),
			evicted,
			"Session updated."
		);

		Ok(AnswerResponse {
			answer_text: generated.text,
			token_usage: generated.usage,
			retrieval_tokens: retrieved.retrieval_tokens,
			retrieval_config_used: retrieved.config_used,
			trace_id: ctx.trace_id,
		})
	}

	async fn retrieve_context(
		&self,
		query: &Query,
		deadline: &Deadline,
		ctx: &SpanContext,
	) -> Result<RetrievedContext> {
		let mut retrieval_tokens = 0_u32;
		let budget = deadline.stage_budget("routing")?;
		let mut span = self.tracer.start_span("routing", Some(ctx));

		span.set_attribute("simplified", query.simplified());

		let (intent, routed) =
			match bounded(budget, self.route(query.text(), query.simplified())).await {
				Ok(decision) => {
					retrieval_tokens += decision.total_tokens;

					span.set_attribute("recognized", decision.recognized);
					span.set_attribute("total_tokens", decision.total_tokens);

					(decision.intent, true)
				},
				Err(err) => {
					degrade(&mut span, Degradation::RoutingFailure, &err.detail());

					(Intent::Product, false)
				},
			};

		span.set_attribute("label", intent.as_str());
		self.tracer.export(span.end());

		let mut config_used = RetrievalConfigUsed {
			use_retrieval: true,
			route: Some(intent),
			strategy: Some(query.strategy()),
			top_k: Some(query.top_k()),
			simplified: query.simplified(),
			..Default::default()
		};

		if query.strategy() == Strategy::Hybrid {
			config_used.alpha = Some(query.alpha());
			config_used.k_rrf = Some(query.k_rrf());
		}

		let bundle = match intent {
			Intent::Faq => {
				let filters = FilterSpec::empty();
				let candidates = self
					.retrieve_stage("faq_retrieve", Corpus::Faq, query, &filters, deadline, ctx)
					.await?;

				ContextBundle::from_candidates(ContextSource::Faq, &candidates, query.top_k())
			},
			Intent::Product => {
				let filters =
					self.filter_stage(query, routed, deadline, ctx, &mut retrieval_tokens).await?;
				let mut candidates = self
					.retrieve_stage("retrieve", Corpus::Products, query, &filters, deadline, ctx)
					.await?;

				if query.use_rerank() && !candidates.is_empty() {
					candidates = self.rerank_stage(query, candidates, deadline, ctx).await?;
				}

				config_used.rerank = query.use_rerank();
				config_used.filters = filters;

				ContextBundle::from_candidates(ContextSource::Products, &candidates, query.top_k())
			},
		};

		config_used.result_count = bundle.len();

		Ok(RetrievedContext { bundle, config_used, retrieval_tokens })
	}

	async fn filter_stage(
		&self,
		query: &Query,
		routed: bool,
		deadline: &Deadline,
		ctx: &SpanContext,
		retrieval_tokens: &mut u32,
	) -> Result<FilterSpec> {
		let budget = deadline.stage_budget("filter_extract")?;
		let mut span = self.tracer.start_span("filter_extract", Some(ctx));

		if query.simplified() || !routed {
			span.set_attribute("skipped", true);
			span.set_attribute("skip_reason", if routed { "simplified" } else { "routing_failure" });
			span.set_attribute("filter_count", 0_usize);
			self.tracer.export(span.end());

			return Ok(FilterSpec::empty());
		}

		let filters = match bounded(budget, self.extract_filters(query.text())).await {
			Ok(FilterExtraction { spec, total_tokens }) => {
				*retrieval_tokens += total_tokens;

				span.set_attribute("total_tokens", total_tokens);

				spec.unwrap_or_else(|| {
					degrade(
						&mut span,
						Degradation::FilterExtractionFailure,
						"model output is not a JSON object",
					);

					FilterSpec::empty()
				})
			},
			Err(err) => {
				degrade(&mut span, Degradation::FilterExtractionFailure, &err.detail());

				FilterSpec::empty()
			},
		};

		span.set_attribute("filter_count", filters.len());
		self.tracer.export(span.end());

		Ok(filters)
	}

	async fn retrieve_stage(
		&self,
		name: &str,
		corpus: Corpus,
		query: &Query,
		filters: &FilterSpec,
		deadline: &Deadline,
		ctx: &SpanContext,
	) -> Result<Vec<RankedCandidate>> {
		let budget = deadline.stage_budget(name)?;
		let mut span = self.tracer.start_span(name, Some(ctx));

		span.set_attribute("corpus", corpus.as_str());
		span.set_attribute("strategy", query.strategy().as_str());
		span.set_attribute("top_k", query.top_k());
		span.set_attribute("filter_count", filters.len());

		let retrieval = self.retrieve(
			corpus,
			query.strategy(),
			query.text(),
			filters,
			query.top_k(),
			query.alpha(),
			query.k_rrf(),
		);
		let candidates = match bounded(budget, retrieval).await {
			Ok(outcome) => {
				if !outcome.failed_sources.is_empty() {
					let failed: Vec<&str> =
						outcome.failed_sources.iter().map(|source| source.as_str()).collect();

					degrade(&mut span, Degradation::RetrievalFailure, &failed.join(","));
				}

				outcome.candidates
			},
			Err(StageError::Timeout) => {
				degrade(&mut span, Degradation::RetrievalTimeout, "stage timed out");

				Vec::new()
			},
			Err(err) => {
				degrade(&mut span, Degradation::RetrievalFailure, &err.detail());

				Vec::new()
			},
		};

		if candidates.is_empty() && !span.has_attribute(DEGRADATION_KEY) {
			degrade(&mut span, Degradation::EmptyRetrievalResult, "no candidates");
		}

		span.set_attribute("result_count", candidates.len());
		self.tracer.export(span.end());

		Ok(candidates)
	}

	async fn rerank_stage(
		&self,
		query: &Query,
		candidates: Vec<RankedCandidate>,
		deadline: &Deadline,
		ctx: &SpanContext,
	) -> Result<Vec<RankedCandidate>> {
		let budget = deadline.stage_budget("rerank")?;
		let mut span = self.tracer.start_span("rerank", Some(ctx));

		span.set_attribute("candidate_count", candidates.len());
		span.set_attribute("query_override", query.rerank_text() != query.text());

		let result = bounded(budget, self.rerank(query.rerank_text(), &candidates)).await;
		let out = match result {
			Ok(reranked) => reranked,
			Err(err) => {
				degrade(&mut span, Degradation::RerankDegraded, &err.detail());

				candidates
			},
		};

		span.set_attribute("result_count", out.len());
		self.tracer.export(span.end());

		Ok(out)
	}
}

const DEGRADATION_KEY: &str = "degradation";

async fn bounded<T, F>(budget: Duration, fut: F) -> Result<T, StageError>
where
	F: Future<Output = Result<T>>,
{
	match time::timeout(budget, fut).await {
		Ok(Ok(value)) => Ok(value),
		Ok(Err(err)) => Err(StageError::Failed(err)),
		Err(_) => Err(StageError::Timeout),
	}
}

fn degrade(span: &mut Span, kind: Degradation, detail: &str) {
	tracing::warn!(stage = span.name(), degradation = kind.as_str(), detail, "Stage degraded.");

	span.set_attribute(DEGRADATION_KEY, kind.as_str());
	span.set_attribute("degradation_detail", detail);
}
