use std::{fmt::Write as _, sync::Arc};

use serde::Serialize;

use atelier_config::Generation;
use atelier_domain::{ConversationTurn, Document, Role};
use atelier_providers::{ChatMessage, CompletionRequest};

use crate::{AtelierService, Error, RankedCandidate, Result, TokenUsage};

pub const NO_RETRIEVAL_MARKER: &str = "No catalog retrieval was performed for this question.";
pub const NOTHING_FOUND_MARKER: &str = "No matching catalog entries were found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
	Direct,
	Faq,
	Products,
}
impl ContextSource {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Direct => "direct",
			Self::Faq => "faq",
			Self::Products => "products",
		}
	}
}

/// Documents handed to generation, in the order the model should weigh them.
#[derive(Debug, Clone)]
pub struct ContextBundle {
	source: ContextSource,
	documents: Vec<Arc<Document>>,
}
impl ContextBundle {
	pub fn direct() -> Self {
		Self { source: ContextSource::Direct, documents: Vec::new() }
	}

	pub fn from_candidates(source: ContextSource, candidates: &[RankedCandidate], top_k: u32) -> Self {
		let documents = candidates
			.iter()
			.take(top_k as usize)
			.map(|candidate| Arc::clone(&candidate.document))
			.collect();

		Self { source, documents }
	}

	pub fn source(&self) -> ContextSource {
		self.source
	}

	pub fn documents(&self) -> &[Arc<Document>] {
		&self.documents
	}

	pub fn len(&self) -> usize {
		self.documents.len()
	}

	pub fn is_empty(&self) -> bool {
		self.documents.is_empty()
	}
}

#[derive(Debug, Clone)]
pub struct Generated {
	pub text: String,
	pub usage: TokenUsage,
}

impl AtelierService {
	/// One completion grounded in `bundle`. Every failure is a [`Error::GenerationFailure`].
	pub async fn generate(
		&self,
		query: &str,
		bundle: &ContextBundle,
		history: &[ConversationTurn],
	) -> Result<Generated> {
		let cfg = &self.cfg.generation;
		let request = CompletionRequest {
			messages: build_generation_messages(cfg, query, bundle, history),
			temperature: cfg.temperature,
			max_tokens: cfg.max_tokens,
		};
		let completion = self
			.providers
			.llm
			.complete(&self.cfg.providers.llm, &request)
			.await
			.map_err(|err| Error::GenerationFailure { message: err.to_string() })?;

		if completion.text.trim().is_empty() {
			return Err(Error::GenerationFailure {
				message: "Completion provider returned an empty answer.".to_string(),
			});
		}

		let usage = TokenUsage {
			prompt_tokens: completion.prompt_tokens,
			completion_tokens: completion.completion_tokens,
			total_tokens: completion.total_tokens(),
		};

		Ok(Generated { text: completion.text, usage })
	}
}

/// The newest turns whose token counts fit in `budget`, oldest first.
pub fn history_window(history: &[ConversationTurn], budget: u32) -> &[ConversationTurn] {
	let mut used = 0_u64;
	let mut start = history.len();

	for (idx, turn) in history.iter().enumerate().rev() {
		used += u64::from(turn.token_count);

		if used > u64::from(budget) {
			break;
		}

		start = idx;
	}

	&history[start..]
}

pub fn build_generation_messages(
	cfg: &Generation,
	query: &str,
	bundle: &ContextBundle,
	history: &[ConversationTurn],
) -> Vec<ChatMessage> {
	let mut messages = vec![ChatMessage::system(cfg.system_prompt.clone())];

	for turn in history_window(history, cfg.history_token_budget) {
		messages.push(match turn.role {
			Role::User => ChatMessage::user(turn.text.clone()),
			Role::Assistant => ChatMessage::assistant(turn.text.clone()),
		});
	}

	messages.push(ChatMessage::user(build_answer_prompt(query, bundle)));

	messages
}

fn build_answer_prompt(query: &str, bundle: &ContextBundle) -> String {
	match bundle.source() {
		ContextSource::Direct => format!(
			"{NO_RETRIEVAL_MARKER}\nAnswer the following question based on your general knowledge. \
Do not make up specific company policies or information.\n\nQuestion: {query}"
		),
		_ if bundle.is_empty() => format!(
			"{NOTHING_FOUND_MARKER}\nTell the customer that nothing in the store matched and suggest \
rephrasing the request. Do not invent products or policies.\n\nUser Query: {query}"
		),
		ContextSource::Faq => format!(
			"You will be provided with a query for a clothing store regarding FAQ, together with \
relevant FAQ entries from the store. They are ordered in decreasing relevance, so the first is the \
most relevant FAQ and the last is the least relevant. Answer the query based on them. You might use \
more than one question and answer. Only answer the question and do not mention that you have \
access to a FAQ.\n<FAQ>\n{context}</FAQ>\nQuery: {query}",
			context = render_context(bundle)
		),
		ContextSource::Products => format!(
			"You will be provided with a list of products from our catalog. Based on these products, \
answer the user's query. Provide specific product recommendations with their IDs and names.\n\n\
<PRODUCTS>\n{context}</PRODUCTS>\n\nUser Query: {query}\n\n\
Provide helpful recommendations based on the available products above.",
			context = render_context(bundle)
		),
	}
}

/// One rendered line per document.
pub fn render_context(bundle: &ContextBundle) -> String {
	let mut out = String::new();

	for document in bundle.documents() {
		let _ = writeln!(out, "{}", document.render());
	}

	out
}

#[cfg(test)]
mod tests {
	use serde_json::{Map, Value};

	use atelier_domain::Corpus;

	use super::*;
	use crate::CandidateSource;

	fn generation() -> Generation {
		Generation {
			system_prompt: "You are a store assistant.".to_string(),
			temperature: 0.2,
			max_tokens: 256,
			history_token_budget: 10,
		}
	}

	fn candidate(id: &str, corpus: Corpus, title: &str, text: &str) -> RankedCandidate {
		let mut attributes = Map::new();

		if corpus == Corpus::Products {
			attributes.insert("baseColour".to_string(), Value::from("Blue"));
		}

		RankedCandidate {
			doc_id: id.to_string(),
			source: CandidateSource::Vector,
			rank: 1,
			score: 1.0,
			document: Arc::new(Document {
				id: id.to_string(),
				corpus,
				title: title.to_string(),
				text: text.to_string(),
				attributes,
			}),
		}
	}

	#[test]
	fn history_keeps_newest_turns_within_budget() {
		let history = vec![
			ConversationTurn::new(Role::User, "old", 6),
			ConversationTurn::new(Role::Assistant, "middle", 4),
			ConversationTurn::new(Role::User, "new", 5),
		];
		let window = history_window(&history, 10);

		assert_eq!(window.len(), 2);
		assert_eq!(window[0].text, "middle");
		assert!(history_window(&history, 3).is_empty());
	}

	#[test]
	fn direct_prompt_has_no_context_and_the_marker() {
		let messages =
			build_generation_messages(&generation(), "What is linen?", &ContextBundle::direct(), &[]);
		let prompt = &messages[1].content;

		assert_eq!(messages.len(), 2);
		assert_eq!(messages[0].role, "system");
		assert!(prompt.starts_with(NO_RETRIEVAL_MARKER));
		assert!(!prompt.contains("<PRODUCTS>"));
	}

	#[test]
	fn empty_bundle_uses_nothing_found_marker() {
		let bundle = ContextBundle::from_candidates(ContextSource::Products, &[], 5);
		let messages = build_generation_messages(&generation(), "red boots", &bundle, &[]);

		assert!(messages[1].content.starts_with(NOTHING_FOUND_MARKER));
	}

	#[test]
	fn product_context_lists_ids_and_attributes() {
		let candidates = [
			candidate("p1", Corpus::Products, "Oxford Shirt", ""),
			candidate("p2", Corpus::Products, "Denim Jacket", ""),
		];
		let bundle = ContextBundle::from_candidates(ContextSource::Products, &candidates, 1);
		let history = [ConversationTurn::new(Role::User, "hi", 2)];
		let messages = build_generation_messages(&generation(), "blue shirt", &bundle, &history);
		let prompt = &messages[2].content;

		assert_eq!(messages[1].content, "hi");
		assert!(prompt.contains("Product ID: p1. Product name: Oxford Shirt. baseColour: Blue."));
		assert!(!prompt.contains("p2"));
		assert!(prompt.contains("User Query: blue shirt"));
	}

	#[test]
	fn faq_context_is_labelled_by_relevance() {
		let candidates = [candidate("f1", Corpus::Faq, "Do you ship abroad?", "Yes, to the EU.")];
		let bundle = ContextBundle::from_candidates(ContextSource::Faq, &candidates, 5);
		let prompt = build_answer_prompt("shipping?", &bundle);

		assert!(prompt.contains("decreasing relevance"));
		assert!(prompt.contains("Question: Do you ship abroad? Answer: Yes, to the EU."));
	}
}
