use std::{fmt::Write as _, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corpus {
	Products,
	Faq,
}
impl Corpus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Products => "products",
			Self::Faq => "faq",
		}
	}
}

/// A catalog entry as held by the document store.
///
/// For FAQ entries `title` carries the question and `text` the answer. For products `title` is
/// the display name and `text` an optional description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
	pub id: String,
	pub corpus: Corpus,
	pub title: String,
	#[serde(default)]
	pub text: String,
	#[serde(default)]
	pub attributes: Map<String, Value>,
}
impl Document {
	/// Text handed to the pairwise relevance scorer.
	pub fn rerank_text(&self) -> String {
		let mut out = self.title.clone();

		match self.corpus {
			Corpus::Faq => {
				push_word(&mut out, &self.text);
			},
			Corpus::Products => {
				for value in self.attributes.values() {
					if let Some(text) = scalar_text(value) {
						push_word(&mut out, &text);
					}
				}
			},
		}

		out
	}

	/// One context line for the generation prompt.
	pub fn render(&self) -> String {
		match self.corpus {
			Corpus::Faq => {
				let mut out = format!("Question: {} Answer: {}", self.title, self.text);

				if let Some(kind) = self.attributes.get("type").and_then(scalar_text) {
					let _ = write!(out, " Type: {kind}");
				}

				out
			},
			Corpus::Products => {
				let mut out = format!("Product ID: {}. Product name: {}.", self.id, self.title);

				for (key, value) in &self.attributes {
					if let Some(text) = scalar_text(value) {
						let _ = write!(out, " {key}: {text}.");
					}
				}
				if !self.text.trim().is_empty() {
					let _ = write!(out, " {}", self.text.trim());
				}

				out
			},
		}
	}
}

/// One store search result. The payload is shared, never copied per candidate.
#[derive(Debug, Clone)]
pub struct StoreHit {
	pub score: f32,
	pub document: Arc<Document>,
}

pub(crate) fn scalar_text(value: &Value) -> Option<String> {
	match value {
		Value::String(text) => Some(text.clone()),
		Value::Number(number) => Some(number.to_string()),
		Value::Bool(flag) => Some(flag.to_string()),
		Value::Array(items) => {
			let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();

			if parts.is_empty() { None } else { Some(parts.join(", ")) }
		},
		_ => None,
	}
}

fn push_word(out: &mut String, text: &str) {
	let trimmed = text.trim();

	if trimmed.is_empty() {
		return;
	}
	if !out.is_empty() {
		out.push(' ');
	}

	out.push_str(trimmed);
}
