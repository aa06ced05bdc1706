use std::{
	io::{self, BufRead, Write},
	path::{Path, PathBuf},
	sync::Arc,
};

use clap::Parser;
use color_eyre::eyre;
use tracing_subscriber::EnvFilter;

use atelier_config::Config;
use atelier_domain::{Corpus, SessionRegistry};
use atelier_service::{
	AnswerResponse, AtelierService, DocumentStore, QueryParams, RecordingTracer, Strategy,
	TokenUsage,
};
use atelier_storage::{MemoryStore, QdrantStore};

const EMBED_BATCH: usize = 32;
const EXIT_COMMANDS: [&str; 3] = ["quit", "exit", "end"];

#[derive(Debug, Parser)]
#[command(
	version = atelier_cli::VERSION,
	rename_all = "kebab",
	styles = atelier_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Serve retrieval from a local JSON catalog instead of Qdrant.
	#[arg(long, value_name = "FILE")]
	pub catalog: Option<PathBuf>,
	#[arg(long, short = 'i', value_name = "ID", default_value = "local")]
	pub identity: String,
	#[arg(long, value_name = "NAME", value_parser = parse_strategy)]
	pub strategy: Option<Strategy>,
	#[arg(long, value_name = "N")]
	pub top_k: Option<u32>,
	#[arg(long, value_name = "WEIGHT")]
	pub alpha: Option<f32>,
	#[arg(long, value_name = "N")]
	pub k_rrf: Option<u32>,
	#[arg(long)]
	pub simplified: bool,
	#[arg(long)]
	pub rerank: bool,
	#[arg(long, value_name = "TEXT", requires = "rerank")]
	pub rerank_query: Option<String>,
	#[arg(long)]
	pub no_retrieval: bool,
	#[arg(long, value_name = "MS")]
	pub deadline_ms: Option<u64>,
	/// Print finished spans as JSON lines after every answer.
	#[arg(long)]
	pub trace: bool,
	/// Answer a single question and exit.
	#[arg(long, short = 'q', value_name = "TEXT")]
	pub query: Option<String>,
}
impl Args {
	fn query_params(&self) -> QueryParams {
		QueryParams {
			use_retrieval: Some(!self.no_retrieval),
			strategy: self.strategy,
			top_k: self.top_k,
			simplified: Some(self.simplified),
			use_rerank: Some(self.rerank),
			rerank_query_override: self.rerank_query.clone(),
			alpha: self.alpha,
			k_rrf: self.k_rrf,
			deadline_ms: self.deadline_ms,
		}
	}
}

struct Chat {
	service: AtelierService,
	sessions: SessionRegistry,
	params: QueryParams,
	identity: String,
	tracer: Option<Arc<RecordingTracer>>,
	last_usage: Option<(TokenUsage, u32)>,
}
impl Chat {
	async fn ask(&mut self, text: &str) -> color_eyre::Result<()> {
		let result =
			self.service.answer_query(&mut self.sessions, text, &self.identity, &self.params).await;

		match &result {
			Ok(response) => {
				print_answer(response);

				self.last_usage = Some((response.token_usage, response.retrieval_tokens));
			},
			Err(err) => println!("{}", err.user_message()),
		}

		self.flush_spans()?;

		result.map(|_| ()).map_err(Into::into)
	}

	fn flush_spans(&self) -> color_eyre::Result<()> {
		let Some(tracer) = &self.tracer else { return Ok(()) };

		for span in tracer.take() {
			println!("{}", serde_json::to_string(&span)?);
		}

		Ok(())
	}

	fn stats(&self) {
		match self.sessions.get(&self.identity) {
			Some(session) => println!(
				"{} turns, {} of {} tokens.",
				session.len(),
				session.total_tokens(),
				session.budget()
			),
			None => println!("No conversation yet."),
		}

		if let Some((usage, retrieval_tokens)) = self.last_usage {
			println!(
				"Last answer: {} prompt + {} completion tokens, {} retrieval tokens.",
				usage.prompt_tokens, usage.completion_tokens, retrieval_tokens
			);
		}
	}
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = atelier_config::load(&args.config)?;

	init_tracing(&config)?;

	let store: Arc<dyn DocumentStore> = match &args.catalog {
		Some(path) => Arc::new(load_catalog(&config, path).await?),
		None => Arc::new(QdrantStore::new(&config.storage.qdrant)?),
	};
	let tracer = args.trace.then(|| Arc::new(RecordingTracer::new()));
	let mut service = AtelierService::new(config, store);

	if let Some(tracer) = &tracer {
		service = service.with_tracer(tracer.clone());
	}

	let sessions = service.session_registry();
	let mut chat = Chat {
		service,
		sessions,
		params: args.query_params(),
		identity: args.identity.clone(),
		tracer,
		last_usage: None,
	};

	if let Some(query) = &args.query {
		return chat.ask(query).await;
	}

	repl(&mut chat).await
}

async fn repl(chat: &mut Chat) -> color_eyre::Result<()> {
	let stdin = io::stdin();
	let mut lines = stdin.lock().lines();

	println!("Ask about the catalog. Commands: clear, stats, quit.");

	loop {
		print!("> ");
		io::stdout().flush()?;

		let Some(line) = lines.next() else { break };
		let line = line?;
		let input = line.trim();

		if input.is_empty() {
			continue;
		}

		match input.to_ascii_lowercase().as_str() {
			command if EXIT_COMMANDS.contains(&command) => break,
			"clear" => {
				chat.sessions.remove(&chat.identity);

				println!("Conversation cleared.");
			},
			"stats" => chat.stats(),
			_ =>
				if let Err(err) = chat.ask(input).await {
					tracing::debug!(error = %err, "Query failed.");
				},
		}
	}

	Ok(())
}

/// Loads a JSON catalog and embeds every document that ships without a vector.
async fn load_catalog(config: &Config, path: &Path) -> color_eyre::Result<MemoryStore> {
	let mut store = MemoryStore::load(path)?;

	for corpus in [Corpus::Products, Corpus::Faq] {
		let missing = store.missing_vectors(corpus);

		for batch in missing.chunks(EMBED_BATCH) {
			let texts: Vec<String> = batch.iter().map(|document| document.render()).collect();
			let vectors =
				atelier_providers::embedding::embed(&config.providers.embedding, &texts).await?;

			if vectors.len() != batch.len() {
				return Err(eyre::eyre!(
					"Embedding provider returned {} vectors for {} documents.",
					vectors.len(),
					batch.len()
				));
			}

			for (document, vector) in batch.iter().zip(vectors) {
				store.set_vector(corpus, &document.id, vector)?;
			}
		}

		if !missing.is_empty() {
			tracing::info!(corpus = corpus.as_str(), embedded = missing.len(), "Catalog embedded.");
		}
	}

	tracing::info!(
		products = store.len(Corpus::Products),
		faq = store.len(Corpus::Faq),
		"Catalog loaded."
	);

	Ok(store)
}

fn print_answer(response: &AnswerResponse) {
	let used = &response.retrieval_config_used;

	println!("{}", response.answer_text);
	println!(
		"[trace {} | route {} | strategy {} | results {} | tokens {} + {} retrieval]",
		response.trace_id,
		used.route.map_or("none", |intent| intent.as_str()),
		used.strategy.map_or("none", Strategy::as_str),
		used.result_count,
		response.token_usage.total_tokens,
		response.retrieval_tokens,
	);
}

fn parse_strategy(raw: &str) -> Result<Strategy, String> {
	Strategy::parse(raw).ok_or_else(|| format!("unknown strategy `{raw}`"))
}

fn init_tracing(config: &Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();

	Ok(())
}
